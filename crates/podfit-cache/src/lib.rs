//! Per-node resource accounting for the podfit scheduler cache.
//!
//! This crate provides [`NodeInfo`], the aggregate a scheduler consults to
//! decide whether a pod fits on a node. It handles:
//!
//! - Incremental accounting of pod requests as pods arrive and leave
//! - Named reservation pools that report a high-water mark instead of a sum
//! - Host port, affinity, taint and pressure condition indices
//! - Deep cloning for preemption what-if simulation
//! - Generation counters for cheap staleness checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Watch layer (node / pod events)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          NodeStore                               │
//! │        RwLock<HashMap<node name, NodeInfo>> + snapshots          │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          NodeInfo                                │
//! │  ┌────────────┐ ┌──────────────┐ ┌────────────┐ ┌────────────┐  │
//! │  │ Requested/ │ │ Reservations │ │ Host ports │ │ Taints and │  │
//! │  │ non-zero   │ │ (max ceiling)│ │            │ │ conditions │  │
//! │  └────────────┘ └──────────────┘ └────────────┘ └────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
//! use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
//! use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
//! use podfit_cache::NodeInfo;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let requests = BTreeMap::from([("cpu".to_string(), Quantity("250m".to_string()))]);
//! let pod = Arc::new(Pod {
//!     metadata: ObjectMeta {
//!         name: Some("web".to_string()),
//!         namespace: Some("default".to_string()),
//!         ..Default::default()
//!     },
//!     spec: Some(PodSpec {
//!         containers: vec![Container {
//!             name: "app".to_string(),
//!             resources: Some(ResourceRequirements {
//!                 requests: Some(requests),
//!                 ..Default::default()
//!             }),
//!             ..Default::default()
//!         }],
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! });
//!
//! let mut info = NodeInfo::new();
//! info.add_pod(Arc::clone(&pod))?;
//! assert_eq!(info.requested_resource().milli_cpu, 250);
//!
//! // Simulate evicting the pod without touching live state.
//! let mut what_if = info.clone();
//! what_if.remove_pod(&pod)?;
//! assert!(what_if.pods().is_empty());
//! assert_eq!(info.pods().len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod node_info;
pub mod pod;
pub mod ports;
pub mod reservation;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use config::{CacheConfig, NonZeroDefaults};
pub use error::{CacheError, Result};
pub use node_info::{ConditionStatus, NodeInfo};
pub use pod::{PodResourceRequest, ReservationRequest};
pub use ports::{HostPortInfo, ProtocolPort};
pub use reservation::ResourceReservation;
pub use store::{NodeStore, Snapshot};

pub use podfit_core::Resource;
