//! Aggregated compute resources.
//!
//! [`Resource`] stores every well-known resource as a plain integer so that
//! per-node totals can be updated without touching quantity strings on the
//! hot path. Extended and huge-page resources are kept in a lazily allocated
//! scalar map.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, QuantityError};
use crate::names;
use crate::quantity::{self, format_milli_quantity, format_quantity, Format};

/// A resource list as found in container requests and node allocatable.
pub type ResourceList = BTreeMap<String, Quantity>;

/// A collection of compute resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// CPU in thousandths of a core.
    pub milli_cpu: i64,
    /// Memory in bytes.
    pub memory: i64,
    /// Accelerator devices.
    pub accelerator_count: i64,
    /// Ephemeral storage in bytes.
    pub ephemeral_storage: i64,
    /// Number of pods the node accepts. Only meaningful for allocatable.
    pub allowed_pod_number: i64,
    /// Extended, huge-page and other scalar resources.
    ///
    /// `None` means no scalar resource was ever recorded, which is distinct
    /// from a map holding zero values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar_resources: Option<BTreeMap<String, i64>>,
}

impl Resource {
    /// Create a resource from a resource list.
    #[must_use]
    pub fn from_list(list: &ResourceList) -> Self {
        let mut resource = Self::default();
        resource.add(list);
        resource
    }

    /// Add every recognised entry of `list`.
    ///
    /// Entries that fail to parse are skipped with a warning; names that are
    /// neither well-known nor scalar are ignored.
    pub fn add(&mut self, list: &ResourceList) {
        for (name, quantity) in list {
            if let Err(e) = self.add_quantity(name, quantity) {
                warn!(resource = %name, error = %e, "Skipping unparseable resource quantity");
            }
        }
    }

    /// Add a single named quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuantity`] if the quantity cannot be decoded.
    pub fn add_quantity(&mut self, name: &str, quantity: &Quantity) -> crate::Result<()> {
        let invalid = |source: QuantityError| CoreError::InvalidQuantity {
            name: name.to_string(),
            source,
        };
        let parsed = quantity::parse(quantity).map_err(invalid)?;

        match name {
            names::CPU => self.milli_cpu += parsed.milli_value().map_err(invalid)?,
            names::MEMORY => self.memory += parsed.value().map_err(invalid)?,
            names::ACCELERATOR => self.accelerator_count += parsed.value().map_err(invalid)?,
            names::PODS => self.allowed_pod_number += parsed.value().map_err(invalid)?,
            names::EPHEMERAL_STORAGE => {
                self.ephemeral_storage += parsed.value().map_err(invalid)?;
            }
            other if names::is_scalar_resource_name(other) => {
                self.add_scalar(other, parsed.value().map_err(invalid)?);
            }
            _ => {}
        }
        Ok(())
    }

    /// Add the CPU and memory of `other`. Used for reservation ceilings only.
    pub fn add_reserved(&mut self, other: &Resource) {
        self.milli_cpu += other.milli_cpu;
        self.memory += other.memory;
    }

    /// Subtract the CPU and memory of `other`. Used for reservation ceilings only.
    pub fn remove_reserved(&mut self, other: &Resource) {
        self.milli_cpu -= other.milli_cpu;
        self.memory -= other.memory;
    }

    /// Read a scalar resource, zero if never recorded.
    #[must_use]
    pub fn scalar(&self, name: &str) -> i64 {
        self.scalar_resources
            .as_ref()
            .and_then(|m| m.get(name).copied())
            .unwrap_or(0)
    }

    /// Add `quantity` to a scalar resource.
    pub fn add_scalar(&mut self, name: &str, quantity: i64) {
        let current = self.scalar(name);
        self.set_scalar(name, current + quantity);
    }

    /// Overwrite a scalar resource, allocating the map on first use.
    pub fn set_scalar(&mut self, name: &str, quantity: i64) {
        self.scalar_resources
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), quantity);
    }

    /// Whether every field is zero. An allocated but all-zero scalar map counts as zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.milli_cpu == 0
            && self.memory == 0
            && self.accelerator_count == 0
            && self.ephemeral_storage == 0
            && self.allowed_pod_number == 0
            && self
                .scalar_resources
                .as_ref()
                .is_none_or(|m| m.values().all(|v| *v == 0))
    }

    /// Convert back to a resource list.
    ///
    /// Memory, storage and pod count use the binary convention; CPU and
    /// accelerators use the decimal one. Scalar resources are binary for
    /// huge pages and decimal otherwise.
    #[must_use]
    pub fn to_resource_list(&self) -> ResourceList {
        let mut list = ResourceList::new();
        list.insert(
            names::CPU.to_string(),
            format_milli_quantity(self.milli_cpu, Format::DecimalSI),
        );
        list.insert(
            names::MEMORY.to_string(),
            format_quantity(self.memory, Format::BinarySI),
        );
        list.insert(
            names::ACCELERATOR.to_string(),
            format_quantity(self.accelerator_count, Format::DecimalSI),
        );
        list.insert(
            names::PODS.to_string(),
            format_quantity(self.allowed_pod_number, Format::BinarySI),
        );
        list.insert(
            names::EPHEMERAL_STORAGE.to_string(),
            format_quantity(self.ephemeral_storage, Format::BinarySI),
        );
        for (name, value) in self.scalar_resources.iter().flatten() {
            let format = if names::is_huge_page_resource_name(name) {
                Format::BinarySI
            } else {
                Format::DecimalSI
            };
            list.insert(name.clone(), format_quantity(*value, format));
        }
        list
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={}m memory={} accelerators={} ephemeral-storage={} pods={}",
            self.milli_cpu,
            self.memory,
            self.accelerator_count,
            self.ephemeral_storage,
            self.allowed_pod_number
        )?;
        for (name, value) in self.scalar_resources.iter().flatten() {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}
