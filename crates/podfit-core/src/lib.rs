//! Core resource types for the podfit scheduler cache.
//!
//! This crate provides the leaf types the per-node cache is built from:
//!
//! - **Quantities**: parsing and canonical formatting of Kubernetes resource
//!   quantities into fixed-point integers
//! - **Resource names**: classification of well-known, extended and huge-page
//!   resource names
//! - **Resource**: an aggregate of scalar compute quantities that accumulates
//!   container requests
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
//! use podfit_core::Resource;
//!
//! let mut requests = BTreeMap::new();
//! requests.insert("cpu".to_string(), Quantity("1500m".to_string()));
//! requests.insert("memory".to_string(), Quantity("1Gi".to_string()));
//!
//! let resource = Resource::from_list(&requests);
//! assert_eq!(resource.milli_cpu, 1500);
//! assert_eq!(resource.memory, 1 << 30);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod names;
pub mod quantity;
pub mod resource;

pub use error::{CoreError, QuantityError, Result};
pub use quantity::{Format, ParsedQuantity};
pub use resource::{Resource, ResourceList};
