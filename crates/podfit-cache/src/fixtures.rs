//! Builders for pod and node objects used in tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, Node, NodeCondition, NodeSpec, NodeStatus, Pod,
    PodAffinity, PodSpec, ResourceRequirements, Taint,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::DEFAULT_RESERVATION_ANNOTATION;

fn resource_list(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), Quantity((*v).to_string())))
        .collect()
}

/// Builds pods with just the fields the cache reads.
#[derive(Debug, Clone)]
pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    /// Start a pod with the given namespace and name.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec::default()),
            ..Default::default()
        };
        Self { pod }
    }

    fn spec(&mut self) -> &mut PodSpec {
        self.pod.spec.get_or_insert_with(PodSpec::default)
    }

    /// Bind the pod to a node.
    #[must_use]
    pub fn node(mut self, node_name: &str) -> Self {
        self.spec().node_name = Some(node_name.to_string());
        self
    }

    /// Append a container with the given requests.
    #[must_use]
    pub fn container(mut self, requests: &[(&str, &str)]) -> Self {
        let index = self.spec().containers.len();
        self.spec().containers.push(Container {
            name: format!("c{index}"),
            resources: Some(ResourceRequirements {
                requests: Some(resource_list(requests)),
                ..Default::default()
            }),
            ..Default::default()
        });
        self
    }

    /// Add a host port to the last container, creating one if needed.
    #[must_use]
    pub fn host_port(mut self, host_ip: &str, protocol: &str, port: i32) -> Self {
        let spec = self.spec();
        if spec.containers.is_empty() {
            spec.containers.push(Container {
                name: "c0".to_string(),
                ..Default::default()
            });
        }
        if let Some(container) = spec.containers.last_mut() {
            container
                .ports
                .get_or_insert_with(Vec::new)
                .push(ContainerPort {
                    container_port: port,
                    host_port: Some(port),
                    host_ip: (!host_ip.is_empty()).then(|| host_ip.to_string()),
                    protocol: (!protocol.is_empty()).then(|| protocol.to_string()),
                    ..Default::default()
                });
        }
        self
    }

    /// Give the pod an (empty) pod affinity term.
    #[must_use]
    pub fn affinity(mut self) -> Self {
        self.spec().affinity = Some(Affinity {
            pod_affinity: Some(PodAffinity::default()),
            ..Default::default()
        });
        self
    }

    /// Set an arbitrary annotation.
    #[must_use]
    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Join the named reservation with the given reserved amounts.
    #[must_use]
    pub fn reservation(self, name: &str, requests: &[(&str, &str)]) -> Self {
        let value = serde_json::json!({
            "name": name,
            "requests": resource_list(requests),
        });
        self.annotation(DEFAULT_RESERVATION_ANNOTATION, &value.to_string())
    }

    /// Finish the pod.
    #[must_use]
    pub fn build(self) -> Arc<Pod> {
        Arc::new(self.pod)
    }
}

/// Builds nodes with allocatable resources, taints and conditions.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    /// Start a node with the given name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let node = Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus::default()),
        };
        Self { node }
    }

    /// Set allocatable resources.
    #[must_use]
    pub fn allocatable(mut self, entries: &[(&str, &str)]) -> Self {
        self.node
            .status
            .get_or_insert_with(NodeStatus::default)
            .allocatable = Some(resource_list(entries));
        self
    }

    /// Add a taint.
    #[must_use]
    pub fn taint(mut self, key: &str, effect: &str) -> Self {
        self.node
            .spec
            .get_or_insert_with(NodeSpec::default)
            .taints
            .get_or_insert_with(Vec::new)
            .push(Taint {
                key: key.to_string(),
                effect: effect.to_string(),
                ..Default::default()
            });
        self
    }

    /// Add a condition.
    #[must_use]
    pub fn condition(mut self, type_: &str, status: &str) -> Self {
        self.node
            .status
            .get_or_insert_with(NodeStatus::default)
            .conditions
            .get_or_insert_with(Vec::new)
            .push(NodeCondition {
                type_: type_.to_string(),
                status: status.to_string(),
                ..Default::default()
            });
        self
    }

    /// Finish the node.
    #[must_use]
    pub fn build(self) -> Arc<Node> {
        Arc::new(self.node)
    }
}
