//! Node-level aggregated information.
//!
//! [`NodeInfo`] keeps the running totals a scheduler needs to test whether a
//! pod fits on a node: requested resources of every pod bound (or assumed)
//! there, scoring totals, allocatable capacity, reservation ceilings, used
//! host ports, and cached taints and pressure conditions.
//!
//! Node and pod objects are shared with the layer that owns them and are
//! never modified here. Cloning a `NodeInfo` copies every total and index
//! and shares only those objects, so a clone can be mutated freely for
//! preemption what-if checks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use podfit_core::Resource;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::CacheConfig;
use crate::pod::{
    compute_pod_resource_request, has_pod_affinity_constraints, host_ports, node_name_of,
    pod_key, reservation_of, same_identity, ReservationRequest,
};
use crate::ports::HostPortInfo;
use crate::reservation::ResourceReservation;
use crate::{CacheError, Result};

const MEMORY_PRESSURE: &str = "MemoryPressure";
const DISK_PRESSURE: &str = "DiskPressure";
const PID_PRESSURE: &str = "PIDPressure";

/// Status of a node condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition is not reported.
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Parse a condition status from its Kubernetes string.
    #[must_use]
    pub fn from_k8s_status(status: &str) -> Self {
        match status {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

/// Aggregated state of a single node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    config: Arc<CacheConfig>,

    node: Option<Arc<Node>>,

    pods: Vec<Arc<Pod>>,
    pods_with_affinity: Vec<Arc<Pod>>,
    used_ports: HostPortInfo,

    /// Requests of every pod on the node, assumed pods included.
    requested_resource: Resource,
    non_zero_request: Resource,
    allocatable_resource: Resource,

    taints: Vec<Taint>,
    memory_pressure_condition: ConditionStatus,
    disk_pressure_condition: ConditionStatus,
    pid_pressure_condition: ConditionStatus,

    /// Bumped on every change so callers can skip re-cloning.
    generation: i64,

    /// Sum of the ceilings of every reservation on the node.
    reserved_resource: Resource,
    resource_reservations: HashMap<String, ResourceReservation>,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self::with_shared_config(Arc::new(CacheConfig::default()))
    }
}

impl NodeInfo {
    /// Create an empty node info with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty node info sharing `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `config` fails validation.
    pub fn with_config(config: Arc<CacheConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_shared_config(config))
    }

    /// Create an empty node info from an already validated `config`.
    pub(crate) fn with_shared_config(config: Arc<CacheConfig>) -> Self {
        Self {
            config,
            node: None,
            pods: Vec::new(),
            pods_with_affinity: Vec::new(),
            used_ports: HostPortInfo::new(),
            requested_resource: Resource::default(),
            non_zero_request: Resource::default(),
            allocatable_resource: Resource::default(),
            taints: Vec::new(),
            memory_pressure_condition: ConditionStatus::Unknown,
            disk_pressure_condition: ConditionStatus::Unknown,
            pid_pressure_condition: ConditionStatus::Unknown,
            generation: 0,
            reserved_resource: Resource::default(),
            resource_reservations: HashMap::new(),
        }
    }

    /// Create a node info with `pods` already accounted.
    ///
    /// # Errors
    ///
    /// Returns an error if a pod has no name.
    pub fn with_pods(pods: impl IntoIterator<Item = Arc<Pod>>) -> Result<Self> {
        let mut info = Self::new();
        for pod in pods {
            info.add_pod(pod)?;
        }
        Ok(info)
    }

    /// The node object, if one is attached.
    #[must_use]
    pub fn node(&self) -> Option<&Arc<Node>> {
        self.node.as_ref()
    }

    /// Name of the attached node, empty if none.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.node
            .as_ref()
            .and_then(|n| n.metadata.name.as_deref())
            .unwrap_or("")
    }

    /// All pods on this node, assumed pods included. Order is unspecified.
    #[must_use]
    pub fn pods(&self) -> &[Arc<Pod>] {
        &self.pods
    }

    /// Pods with pod affinity or anti-affinity terms.
    #[must_use]
    pub fn pods_with_affinity(&self) -> &[Arc<Pod>] {
        &self.pods_with_affinity
    }

    /// Host ports claimed by the pods on this node.
    #[must_use]
    pub fn used_ports(&self) -> &HostPortInfo {
        &self.used_ports
    }

    /// Number of pods the node accepts.
    #[must_use]
    pub fn allowed_pod_number(&self) -> i64 {
        self.allocatable_resource.allowed_pod_number
    }

    /// Cached taints of the node.
    #[must_use]
    pub fn taints(&self) -> &[Taint] {
        &self.taints
    }

    /// Cached memory pressure condition.
    #[must_use]
    pub fn memory_pressure_condition(&self) -> ConditionStatus {
        self.memory_pressure_condition
    }

    /// Cached disk pressure condition.
    #[must_use]
    pub fn disk_pressure_condition(&self) -> ConditionStatus {
        self.disk_pressure_condition
    }

    /// Cached PID pressure condition.
    #[must_use]
    pub fn pid_pressure_condition(&self) -> ConditionStatus {
        self.pid_pressure_condition
    }

    /// Aggregated requests of pods on this node, excluding reservation-backed dimensions.
    #[must_use]
    pub fn requested_resource(&self) -> Resource {
        self.requested_resource.clone()
    }

    /// Aggregated requests with scoring defaults substituted.
    #[must_use]
    pub fn non_zero_request(&self) -> Resource {
        self.non_zero_request.clone()
    }

    /// Allocatable resources of the node.
    #[must_use]
    pub fn allocatable_resource(&self) -> Resource {
        self.allocatable_resource.clone()
    }

    /// Override the allocatable resources.
    pub fn set_allocatable_resource(&mut self, allocatable: Resource) {
        self.allocatable_resource = allocatable;
        self.generation += 1;
    }

    /// Sum of the ceilings of every reservation on this node.
    #[must_use]
    pub fn reserved_resource(&self) -> Resource {
        self.reserved_resource.clone()
    }

    /// Look up a reservation by name.
    #[must_use]
    pub fn resource_reservation(&self, name: &str) -> Option<&ResourceReservation> {
        self.resource_reservations.get(name)
    }

    /// Used resources of a reservation, zero if it does not exist.
    #[must_use]
    pub fn reservation_used(&self, name: &str) -> Resource {
        self.resource_reservation(name)
            .map(ResourceReservation::used_resource)
            .unwrap_or_default()
    }

    /// Ceiling of a reservation, zero if it does not exist.
    #[must_use]
    pub fn reservation_reserved(&self, name: &str) -> Resource {
        self.resource_reservation(name)
            .map(ResourceReservation::reserved_resource)
            .unwrap_or_default()
    }

    /// Names of the reservations present on this node.
    pub fn reservation_names(&self) -> impl Iterator<Item = &str> {
        self.resource_reservations.keys().map(String::as_str)
    }

    /// Change counter of this instance.
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Account a pod on this node.
    ///
    /// CPU and memory of a pod that reserves them are charged to its
    /// reservation's used resource; everything else goes to the node's
    /// requested resource.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidPodKey`] if the pod has no name. Nothing
    /// is changed in that case.
    pub fn add_pod(&mut self, pod: Arc<Pod>) -> Result<()> {
        let key = pod_key(&pod)?;
        let reservation = reservation_of(&pod, &self.config.reservation_annotation);
        let request = compute_pod_resource_request(&pod, &self.config.non_zero);
        let res = &request.resource;

        let (reserves_cpu, reserves_memory) = reservation
            .as_ref()
            .map_or((false, false), |r| (r.reserves_cpu(), r.reserves_memory()));

        if let Some(reservation) = reservation.as_ref().filter(|r| r.reserves_any()) {
            let pool = self
                .resource_reservations
                .entry(reservation.name.clone())
                .or_default();
            self.reserved_resource.remove_reserved(pool.reserved());
            pool.add_pod(&key, reservation);
            self.reserved_resource.add_reserved(pool.reserved());

            let used = pool.used_mut();
            if reserves_cpu {
                used.milli_cpu += res.milli_cpu;
            }
            if reserves_memory {
                used.memory += res.memory;
            }
        }

        if !reserves_cpu {
            self.requested_resource.milli_cpu += res.milli_cpu;
        }
        if !reserves_memory {
            self.requested_resource.memory += res.memory;
        }
        self.requested_resource.accelerator_count += res.accelerator_count;
        self.requested_resource.ephemeral_storage += res.ephemeral_storage;
        for (name, quantity) in res.scalar_resources.iter().flatten() {
            self.requested_resource.add_scalar(name, *quantity);
        }
        self.non_zero_request.milli_cpu += request.non_zero_milli_cpu;
        self.non_zero_request.memory += request.non_zero_memory;

        if has_pod_affinity_constraints(&pod) {
            self.pods_with_affinity.push(Arc::clone(&pod));
        }
        self.update_used_ports(&pod, true);
        self.pods.push(pod);

        self.generation += 1;
        debug!(pod = %key, node = %self.node_name(), generation = self.generation, "Added pod to node info");
        Ok(())
    }

    /// Remove a pod from this node, reversing its `add_pod`.
    ///
    /// The pod is located by its `namespace/name` key; the totals are
    /// reversed from the copy recorded at add time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::PodNotFound`] if no pod with the same key is on
    /// this node, or [`CacheError::InvalidPodKey`] if the pod has no name.
    /// Nothing is changed in either case.
    pub fn remove_pod(&mut self, pod: &Pod) -> Result<()> {
        let key = pod_key(pod)?;
        let Some(index) = position_of(&self.pods, &key) else {
            return Err(CacheError::PodNotFound {
                pod: key,
                node: self.node_name().to_string(),
            });
        };

        if let Some(i) = position_of(&self.pods_with_affinity, &key) {
            self.pods_with_affinity.swap_remove(i);
        }
        let removed = self.pods.swap_remove(index);

        let reservation = reservation_of(&removed, &self.config.reservation_annotation);
        let request = compute_pod_resource_request(&removed, &self.config.non_zero);
        let res = &request.resource;

        let (reserves_cpu, reserves_memory) = reservation
            .as_ref()
            .map_or((false, false), |r| (r.reserves_cpu(), r.reserves_memory()));

        if let Some(reservation) = reservation.as_ref().filter(|r| r.reserves_any()) {
            if let Some(pool) = self.remove_from_reservation(&key, reservation) {
                let used = pool.used_mut();
                if reserves_cpu {
                    used.milli_cpu -= res.milli_cpu;
                }
                if reserves_memory {
                    used.memory -= res.memory;
                }
            }
        }

        if !reserves_cpu {
            self.requested_resource.milli_cpu -= res.milli_cpu;
        }
        if !reserves_memory {
            self.requested_resource.memory -= res.memory;
        }
        self.requested_resource.accelerator_count -= res.accelerator_count;
        self.requested_resource.ephemeral_storage -= res.ephemeral_storage;
        for (name, quantity) in res.scalar_resources.iter().flatten() {
            self.requested_resource.add_scalar(name, -*quantity);
        }
        self.non_zero_request.milli_cpu -= request.non_zero_milli_cpu;
        self.non_zero_request.memory -= request.non_zero_memory;

        self.update_used_ports(&removed, false);

        self.generation += 1;
        debug!(pod = %key, node = %self.node_name(), generation = self.generation, "Removed pod from node info");
        Ok(())
    }

    /// Take `key` out of its reservation and refold the ceiling into the node
    /// total. Returns the reservation unless it was deleted with its last member.
    fn remove_from_reservation(
        &mut self,
        key: &str,
        reservation: &ReservationRequest,
    ) -> Option<&mut ResourceReservation> {
        let Some(pool) = self.resource_reservations.get_mut(&reservation.name) else {
            error!(reservation = %reservation.name, pod = %key, "Reservation is not found");
            return None;
        };

        self.reserved_resource.remove_reserved(pool.reserved());
        pool.remove_pod(key, reservation);
        if pool.is_empty() {
            self.resource_reservations.remove(&reservation.name);
            debug!(reservation = %reservation.name, "Deleted empty reservation");
            return None;
        }
        self.reserved_resource.add_reserved(pool.reserved());
        self.resource_reservations.get_mut(&reservation.name)
    }

    fn update_used_ports(&mut self, pod: &Pod, add: bool) {
        for port in host_ports(pod) {
            if add {
                self.used_ports.add(port.host_ip, port.protocol, port.port);
            } else {
                self.used_ports.remove(port.host_ip, port.protocol, port.port);
            }
        }
    }

    /// Attach or refresh the node object and its derived capacity, taints and conditions.
    pub fn set_node(&mut self, node: Arc<Node>) {
        self.allocatable_resource = node
            .status
            .as_ref()
            .and_then(|s| s.allocatable.as_ref())
            .map(Resource::from_list)
            .unwrap_or_default();

        self.taints = node
            .spec
            .as_ref()
            .and_then(|s| s.taints.clone())
            .unwrap_or_default();

        self.memory_pressure_condition = ConditionStatus::Unknown;
        self.disk_pressure_condition = ConditionStatus::Unknown;
        self.pid_pressure_condition = ConditionStatus::Unknown;
        for condition in node
            .status
            .iter()
            .flat_map(|s| s.conditions.iter().flatten())
        {
            let status = ConditionStatus::from_k8s_status(&condition.status);
            match condition.type_.as_str() {
                MEMORY_PRESSURE => self.memory_pressure_condition = status,
                DISK_PRESSURE => self.disk_pressure_condition = status,
                PID_PRESSURE => self.pid_pressure_condition = status,
                _ => {}
            }
        }

        self.node = Some(node);
        self.generation += 1;
        debug!(node = %self.node_name(), generation = self.generation, "Set node on node info");
    }

    /// Detach the node object.
    ///
    /// Pods and totals are kept: pod deletions arrive on a separate watch and
    /// may still be pending when the node deletion is observed.
    pub fn remove_node(&mut self) {
        debug!(node = %self.node_name(), pods = self.pods.len(), "Removing node from node info");
        self.node = None;
        self.allocatable_resource = Resource::default();
        self.taints = Vec::new();
        self.memory_pressure_condition = ConditionStatus::Unknown;
        self.disk_pressure_condition = ConditionStatus::Unknown;
        self.pid_pressure_condition = ConditionStatus::Unknown;
        self.generation += 1;
    }

    /// Keep only the pods that are still live from this node's point of view.
    ///
    /// Pods bound to other nodes pass through. Pods bound to this node pass
    /// only if a pod with the same key is still accounted here, which masks
    /// pods removed from a clone during preemption simulation.
    #[must_use]
    pub fn filter_out_pods(&self, pods: &[Arc<Pod>]) -> Vec<Arc<Pod>> {
        if self.node.is_none() {
            return pods.to_vec();
        }
        let node_name = self.node_name();
        pods.iter()
            .filter(|p| {
                node_name_of(p) != node_name
                    || pod_key(p).is_ok_and(|key| position_of(&self.pods, &key).is_some())
            })
            .cloned()
            .collect()
    }

    /// Single-pod variant of [`filter_out_pods`](Self::filter_out_pods).
    ///
    /// Returns false only if the pod is bound to this node and no pod with
    /// the same name and namespace is accounted here.
    #[must_use]
    pub fn filter(&self, pod: &Pod) -> bool {
        if self.node.is_none() || node_name_of(pod) != self.node_name() {
            return true;
        }
        self.pods.iter().any(|p| same_identity(p, pod))
    }
}

fn position_of(pods: &[Arc<Pod>], key: &str) -> Option<usize> {
    pods.iter()
        .position(|p| pod_key(p).is_ok_and(|k| k == key))
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pod_keys: Vec<String> = self
            .pods
            .iter()
            .filter_map(|p| pod_key(p).ok())
            .collect();
        write!(
            f,
            "NodeInfo{{node: {:?}, pods: {:?}, requested: [{}], reserved: [{}], non-zero: [{}], allocatable: [{}], used ports: {}, generation: {}",
            self.node_name(),
            pod_keys,
            self.requested_resource,
            self.reserved_resource,
            self.non_zero_request,
            self.allocatable_resource,
            self.used_ports.len(),
            self.generation
        )?;
        let mut names: Vec<_> = self.resource_reservations.keys().collect();
        names.sort();
        for name in names {
            write!(f, ", reservation {name}: {}", self.resource_reservations[name])?;
        }
        write!(f, "}}")
    }
}
