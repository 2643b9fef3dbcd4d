//! Pod helpers used by per-node accounting.
//!
//! This module derives everything `NodeInfo` needs from a pod object: its
//! stable key, its reservation request, its summed container requests, its
//! host ports and whether it carries inter-pod affinity terms.

use k8s_openapi::api::core::v1::Pod;
use podfit_core::{names, quantity, Resource, ResourceList};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::NonZeroDefaults;
use crate::{CacheError, Result};

/// Reservation name meaning "not part of any reservation".
pub const NO_RESERVATION: &str = "None";

/// Return the `namespace/name` key of a pod, or `name` when it has no namespace.
///
/// # Errors
///
/// Returns [`CacheError::InvalidPodKey`] if the pod has no name.
pub fn pod_key(pod: &Pod) -> Result<String> {
    let name = pod
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CacheError::InvalidPodKey("pod has no name".to_string()))?;
    match namespace_of(pod) {
        "" => Ok(name.to_string()),
        namespace => Ok(format!("{namespace}/{name}")),
    }
}

/// Name of the node the pod is bound to, empty if unbound.
#[must_use]
pub fn node_name_of(pod: &Pod) -> &str {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .unwrap_or("")
}

/// Whether two pods share name and namespace. A missing namespace equals
/// the empty one, as in [`pod_key`].
#[must_use]
pub fn same_identity(a: &Pod, b: &Pod) -> bool {
    a.metadata.name == b.metadata.name && namespace_of(a) == namespace_of(b)
}

fn namespace_of(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("")
}

/// A pod's request to join a named reservation pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Name of the reservation pool.
    pub name: String,
    /// Reserved amounts. Only `cpu` and `memory` are honoured.
    #[serde(default)]
    pub requests: ResourceList,
}

impl ReservationRequest {
    /// Whether CPU is reservation-backed.
    #[must_use]
    pub fn reserves_cpu(&self) -> bool {
        self.requests.contains_key(names::CPU)
    }

    /// Whether memory is reservation-backed.
    #[must_use]
    pub fn reserves_memory(&self) -> bool {
        self.requests.contains_key(names::MEMORY)
    }

    /// Whether any dimension is reservation-backed.
    #[must_use]
    pub fn reserves_any(&self) -> bool {
        self.reserves_cpu() || self.reserves_memory()
    }

    /// The request as a resource aggregate.
    #[must_use]
    pub fn resource(&self) -> Resource {
        Resource::from_list(&self.requests)
    }
}

/// Read the reservation request stored under `annotation`.
///
/// Returns `None` when the annotation is absent, malformed, or names the
/// [`NO_RESERVATION`] pool.
#[must_use]
pub fn reservation_of(pod: &Pod, annotation: &str) -> Option<ReservationRequest> {
    let raw = pod.metadata.annotations.as_ref()?.get(annotation)?;
    let request: ReservationRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                pod = ?pod.metadata.name,
                error = %e,
                "Ignoring malformed resource reservation annotation"
            );
            return None;
        }
    };
    if request.name == NO_RESERVATION {
        return None;
    }
    Some(request)
}

/// The summed container requests of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodResourceRequest {
    /// Sum of all container requests.
    pub resource: Resource,
    /// CPU with defaults substituted for containers that request none.
    pub non_zero_milli_cpu: i64,
    /// Memory with defaults substituted for containers that request none.
    pub non_zero_memory: i64,
}

/// Sum the requests of every container of `pod`.
#[must_use]
pub fn compute_pod_resource_request(pod: &Pod, defaults: &NonZeroDefaults) -> PodResourceRequest {
    let empty = ResourceList::new();
    let mut result = PodResourceRequest::default();
    for container in pod.spec.iter().flat_map(|s| &s.containers) {
        let requests = container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .unwrap_or(&empty);
        result.resource.add(requests);

        let (cpu, memory) = non_zero_requests(requests, defaults);
        result.non_zero_milli_cpu += cpu;
        result.non_zero_memory += memory;
    }
    result
}

/// CPU and memory of a single container for scoring, substituting `defaults`
/// when a request is missing. Accelerators and scalar resources get no default.
#[must_use]
pub fn non_zero_requests(requests: &ResourceList, defaults: &NonZeroDefaults) -> (i64, i64) {
    let cpu = match requests.get(names::CPU) {
        None => defaults.milli_cpu,
        Some(q) => quantity::parse(q)
            .and_then(|p| p.milli_value())
            .unwrap_or(0),
    };
    let memory = match requests.get(names::MEMORY) {
        None => defaults.memory,
        Some(q) => quantity::parse(q).and_then(|p| p.value()).unwrap_or(0),
    };
    (cpu, memory)
}

/// Whether the pod declares pod affinity or pod anti-affinity terms.
#[must_use]
pub fn has_pod_affinity_constraints(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .is_some_and(|a| a.pod_affinity.is_some() || a.pod_anti_affinity.is_some())
}

/// A host port claimed by a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPort<'a> {
    /// Host IP, empty for all addresses.
    pub host_ip: &'a str,
    /// Protocol, empty for TCP.
    pub protocol: &'a str,
    /// Host port, zero when unset.
    pub port: i32,
}

/// Every container port of the pod, including those without a host port.
pub fn host_ports(pod: &Pod) -> impl Iterator<Item = HostPort<'_>> {
    pod.spec
        .iter()
        .flat_map(|s| &s.containers)
        .flat_map(|c| c.ports.iter().flatten())
        .map(|p| HostPort {
            host_ip: p.host_ip.as_deref().unwrap_or(""),
            protocol: p.protocol.as_deref().unwrap_or(""),
            port: p.host_port.unwrap_or(0),
        })
}
