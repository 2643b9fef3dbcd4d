//! Lock-guarded map of node infos.
//!
//! `NodeInfo` itself is not synchronized. The store serializes writers
//! behind one lock for every node and hands readers either a clone of a
//! single node or an incrementally refreshed [`Snapshot`] of all of them.
//!
//! Every successful mutation stamps the touched entry with a revision drawn
//! from one store-wide counter. Snapshots compare those revisions, never
//! `NodeInfo::generation`, which restarts at zero when a node info is
//! evicted and created again.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::node_info::NodeInfo;
use crate::pod::{node_name_of, pod_key};
use crate::{CacheError, Result};

#[derive(Debug)]
struct Entry {
    info: NodeInfo,
    revision: u64,
}

#[derive(Debug, Default)]
struct Nodes {
    entries: HashMap<String, Entry>,
    revision: u64,
}

impl Nodes {
    fn entry(&mut self, name: String, config: &Arc<CacheConfig>) -> &mut Entry {
        self.entries.entry(name).or_insert_with(|| Entry {
            info: NodeInfo::with_shared_config(Arc::clone(config)),
            revision: 0,
        })
    }

    fn stamp(&mut self, name: &str) {
        self.revision += 1;
        if let Some(entry) = self.entries.get_mut(name) {
            entry.revision = self.revision;
        }
    }

    fn add_pod(&mut self, pod: Arc<Pod>, config: &Arc<CacheConfig>) -> Result<()> {
        let node = node_name_of(&pod).to_string();
        if node.is_empty() {
            return Err(CacheError::PodNotAssigned(pod_key(&pod)?));
        }
        let result = self.entry(node.clone(), config).info.add_pod(pod);
        match result {
            Ok(()) => {
                self.stamp(&node);
                Ok(())
            }
            Err(e) => {
                self.evict_if_empty(&node);
                Err(e)
            }
        }
    }

    fn remove_pod(&mut self, pod: &Pod) -> Result<()> {
        let node = node_name_of(pod);
        let entry = self
            .entries
            .get_mut(node)
            .ok_or_else(|| CacheError::NodeNotFound(node.to_string()))?;
        entry.info.remove_pod(pod)?;
        if !self.evict_if_empty(node) {
            self.stamp(node);
        }
        Ok(())
    }

    fn evict_if_empty(&mut self, node: &str) -> bool {
        let empty = self
            .entries
            .get(node)
            .is_some_and(|e| e.info.node().is_none() && e.info.pods().is_empty());
        if empty {
            self.entries.remove(node);
            debug!(node = %node, "Evicted empty node info");
        }
        empty
    }
}

/// Node infos keyed by node name.
#[derive(Debug, Default)]
pub struct NodeStore {
    config: Arc<CacheConfig>,
    nodes: RwLock<Nodes>,
}

/// Point-in-time copies of the node infos of a [`NodeStore`].
///
/// Refreshed in place by [`NodeStore::update_snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: HashMap<String, (u64, NodeInfo)>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The copied node info of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name).map(|(_, info)| info)
    }

    /// Number of node infos held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot holds no node info.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of every node info held.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }
}

fn node_name(node: &Node) -> Result<&str> {
    node.metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(CacheError::UnnamedNode)
}

impl NodeStore {
    /// Create an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose node infos share `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `config` fails validation.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            nodes: RwLock::new(Nodes::default()),
        })
    }

    /// Account a bound pod on its node, creating the node info on demand.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::PodNotAssigned`] if the pod has no node name,
    /// or an error from [`NodeInfo::add_pod`].
    pub fn add_pod(&self, pod: Arc<Pod>) -> Result<()> {
        self.nodes.write().add_pod(pod, &self.config)
    }

    /// Remove a pod from its node, dropping the node info once it has
    /// neither a node object nor pods.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NodeNotFound`] if no state is held for the
    /// pod's node, or an error from [`NodeInfo::remove_pod`].
    pub fn remove_pod(&self, pod: &Pod) -> Result<()> {
        self.nodes.write().remove_pod(pod)
    }

    /// Replace `old` with `new` under one write lock.
    ///
    /// `new` is checked before `old` is removed, so on error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPodKey`] or [`CacheError::PodNotAssigned`]
    /// if `new` cannot be accounted, or the error of removing `old`.
    pub fn update_pod(&self, old: &Pod, new: Arc<Pod>) -> Result<()> {
        let key = pod_key(&new)?;
        if node_name_of(&new).is_empty() {
            return Err(CacheError::PodNotAssigned(key));
        }
        let mut nodes = self.nodes.write();
        nodes.remove_pod(old)?;
        nodes.add_pod(new, &self.config)
    }

    /// Attach or refresh a node object.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnnamedNode`] if the node has no name.
    pub fn set_node(&self, node: Arc<Node>) -> Result<()> {
        let name = node_name(&node)?.to_string();
        let mut nodes = self.nodes.write();
        nodes.entry(name.clone(), &self.config).info.set_node(node);
        nodes.stamp(&name);
        Ok(())
    }

    /// Detach a node object. The node info stays while pods remain on it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NodeNotFound`] if the node is unknown, or
    /// [`CacheError::UnnamedNode`] if it has no name.
    pub fn remove_node(&self, node: &Node) -> Result<()> {
        let name = node_name(node)?;
        let mut nodes = self.nodes.write();
        let entry = nodes
            .entries
            .get_mut(name)
            .ok_or_else(|| CacheError::NodeNotFound(name.to_string()))?;
        entry.info.remove_node();
        let pods = entry.info.pods().len();
        if pods == 0 {
            nodes.entries.remove(name);
        } else {
            nodes.stamp(name);
            info!(node = %name, pods, "Node removed with pods still accounted");
        }
        Ok(())
    }

    /// Clone the node info of `name`.
    #[must_use]
    pub fn node_info(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.read().entries.get(name).map(|e| e.info.clone())
    }

    /// Bring `snapshot` in line with the store.
    ///
    /// Only entries whose revision changed are cloned again; entries for
    /// evicted nodes are dropped. Returns the number of entries re-cloned.
    pub fn update_snapshot(&self, snapshot: &mut Snapshot) -> usize {
        let nodes = self.nodes.read();
        let mut refreshed = 0;
        for (name, entry) in &nodes.entries {
            let stale = snapshot
                .nodes
                .get(name)
                .is_none_or(|(revision, _)| *revision != entry.revision);
            if stale {
                snapshot
                    .nodes
                    .insert(name.clone(), (entry.revision, entry.info.clone()));
                refreshed += 1;
            }
        }
        snapshot
            .nodes
            .retain(|name, _| nodes.entries.contains_key(name));
        debug!(refreshed, total = snapshot.len(), "Updated node info snapshot");
        refreshed
    }

    /// Number of node infos held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().entries.len()
    }

    /// Whether the store holds no node info.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().entries.is_empty()
    }

    /// Names of every node info held.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.read().entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{NodeBuilder, PodBuilder};

    #[test]
    fn pods_route_by_node_name() {
        let store = NodeStore::new();
        store
            .add_pod(PodBuilder::new("ns", "a").node("n1").container(&[("cpu", "1")]).build())
            .unwrap();
        store
            .add_pod(PodBuilder::new("ns", "b").node("n2").build())
            .unwrap();

        assert_eq!(store.len(), 2);
        let n1 = store.node_info("n1").unwrap();
        assert_eq!(n1.requested_resource().milli_cpu, 1000);
        // Created by a pod event, so no node object yet.
        assert!(n1.node().is_none());
    }

    #[test]
    fn unbound_pod_is_rejected() {
        let store = NodeStore::new();
        let err = store.add_pod(PodBuilder::new("ns", "a").build()).unwrap_err();
        assert!(matches!(err, CacheError::PodNotAssigned(ref key) if key == "ns/a"));
        assert!(store.is_empty());
    }

    #[test]
    fn unnamed_pod_leaves_no_empty_node_info() {
        let store = NodeStore::new();
        let mut pod = Pod::clone(&PodBuilder::new("ns", "a").node("n1").build());
        pod.metadata.name = None;
        assert!(store.add_pod(Arc::new(pod)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn node_info_evicted_after_node_and_pods_gone() {
        let store = NodeStore::new();
        let node = NodeBuilder::new("n1").allocatable(&[("cpu", "4")]).build();
        let pod = PodBuilder::new("ns", "a").node("n1").build();

        store.set_node(Arc::clone(&node)).unwrap();
        store.add_pod(Arc::clone(&pod)).unwrap();

        store.remove_node(&node).unwrap();
        let info = store.node_info("n1").unwrap();
        assert!(info.node().is_none());
        assert_eq!(info.pods().len(), 1);

        store.remove_pod(&pod).unwrap();
        assert!(store.node_info("n1").is_none());
        assert!(matches!(
            store.remove_pod(&pod),
            Err(CacheError::NodeNotFound(_))
        ));
    }

    #[test]
    fn remove_empty_node_evicts_immediately() {
        let store = NodeStore::new();
        let node = NodeBuilder::new("n1").build();
        store.set_node(Arc::clone(&node)).unwrap();
        store.remove_node(&node).unwrap();
        assert!(store.is_empty());
        assert!(store.remove_node(&node).unwrap_err().is_not_found());
    }

    #[test]
    fn unnamed_node_is_rejected() {
        let store = NodeStore::new();
        let err = store.set_node(Arc::new(Node::default())).unwrap_err();
        assert!(matches!(err, CacheError::UnnamedNode));
    }

    #[test]
    fn with_config_validates() {
        let config = CacheConfig {
            reservation_annotation: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            NodeStore::with_config(config),
            Err(CacheError::Config(_))
        ));

        let mut config = CacheConfig::default();
        config.non_zero.milli_cpu = -5;
        assert!(NodeStore::with_config(config).is_err());

        let mut config = CacheConfig::default();
        config.non_zero.milli_cpu = 10;
        let store = NodeStore::with_config(config).unwrap();
        store
            .add_pod(PodBuilder::new("ns", "a").node("n1").container(&[]).build())
            .unwrap();
        assert_eq!(store.node_info("n1").unwrap().non_zero_request().milli_cpu, 10);
    }

    #[test]
    fn update_pod_replaces_requests() {
        let store = NodeStore::new();
        let old = PodBuilder::new("ns", "a").node("n1").container(&[("cpu", "1")]).build();
        let new = PodBuilder::new("ns", "a").node("n1").container(&[("cpu", "2")]).build();
        store.add_pod(Arc::clone(&old)).unwrap();
        store.update_pod(&old, new).unwrap();

        let info = store.node_info("n1").unwrap();
        assert_eq!(info.pods().len(), 1);
        assert_eq!(info.requested_resource().milli_cpu, 2000);
    }

    #[test]
    fn update_pod_moves_between_nodes() {
        let store = NodeStore::new();
        let old = PodBuilder::new("ns", "a").node("n1").container(&[("cpu", "1")]).build();
        let new = PodBuilder::new("ns", "a").node("n2").container(&[("cpu", "1")]).build();
        store.add_pod(Arc::clone(&old)).unwrap();
        store.update_pod(&old, new).unwrap();

        assert!(store.node_info("n1").is_none());
        assert_eq!(store.node_info("n2").unwrap().pods().len(), 1);
    }

    #[test]
    fn failed_update_pod_keeps_old_pod() {
        let store = NodeStore::new();
        let old = PodBuilder::new("ns", "a").node("n1").container(&[("cpu", "1")]).build();
        store.add_pod(Arc::clone(&old)).unwrap();

        let unbound = PodBuilder::new("ns", "a").container(&[("cpu", "2")]).build();
        let err = store.update_pod(&old, unbound).unwrap_err();
        assert!(matches!(err, CacheError::PodNotAssigned(ref key) if key == "ns/a"));

        let mut unnamed = Pod::clone(&PodBuilder::new("ns", "a").node("n1").build());
        unnamed.metadata.name = None;
        assert!(matches!(
            store.update_pod(&old, Arc::new(unnamed)),
            Err(CacheError::InvalidPodKey(_))
        ));

        let info = store.node_info("n1").unwrap();
        assert_eq!(info.pods().len(), 1);
        assert_eq!(info.requested_resource().milli_cpu, 1000);
    }

    #[test]
    fn snapshot_reclones_only_changed_nodes() {
        let store = NodeStore::new();
        store.set_node(NodeBuilder::new("n1").build()).unwrap();
        store.set_node(NodeBuilder::new("n2").build()).unwrap();

        let mut snapshot = Snapshot::new();
        assert_eq!(store.update_snapshot(&mut snapshot), 2);
        assert_eq!(store.update_snapshot(&mut snapshot), 0);

        store
            .add_pod(PodBuilder::new("ns", "a").node("n2").build())
            .unwrap();
        assert_eq!(store.update_snapshot(&mut snapshot), 1);
        assert_eq!(snapshot.get("n2").unwrap().pods().len(), 1);
        assert!(snapshot.get("n1").unwrap().pods().is_empty());

        store.remove_node(&NodeBuilder::new("n1").build()).unwrap();
        assert_eq!(store.update_snapshot(&mut snapshot), 0);
        assert!(snapshot.get("n1").is_none());
        assert_eq!(snapshot.node_names(), vec!["n2".to_string()]);

        let mut names = store.node_names();
        names.sort();
        assert_eq!(names, vec!["n2".to_string()]);
    }

    #[test]
    fn snapshot_refreshes_recreated_node() {
        let store = NodeStore::new();
        let small = NodeBuilder::new("n1").allocatable(&[("cpu", "4")]).build();
        store.set_node(Arc::clone(&small)).unwrap();

        let mut snapshot = Snapshot::new();
        store.update_snapshot(&mut snapshot);
        assert_eq!(snapshot.get("n1").unwrap().generation(), 1);

        // Evicted, then created again at the same per-instance generation.
        store.remove_node(&small).unwrap();
        store
            .set_node(NodeBuilder::new("n1").allocatable(&[("cpu", "32")]).build())
            .unwrap();
        assert_eq!(store.node_info("n1").unwrap().generation(), 1);

        assert_eq!(store.update_snapshot(&mut snapshot), 1);
        assert_eq!(
            snapshot.get("n1").unwrap().allocatable_resource().milli_cpu,
            32_000
        );
    }

    #[test]
    fn failed_remove_does_not_dirty_snapshot() {
        let store = NodeStore::new();
        store.set_node(NodeBuilder::new("n1").build()).unwrap();
        let mut snapshot = Snapshot::new();
        store.update_snapshot(&mut snapshot);

        assert!(store
            .remove_pod(&PodBuilder::new("ns", "missing").node("n1").build())
            .is_err());
        assert_eq!(store.update_snapshot(&mut snapshot), 0);
    }
}
