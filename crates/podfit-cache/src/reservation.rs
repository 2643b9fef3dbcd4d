//! Named reservation pools.
//!
//! A reservation pools CPU and memory for a group of pods. The amount the
//! pool reports as reserved is the largest single member request per
//! dimension, not the sum, so members share one slice of capacity. What the
//! members actually consume is summed separately in the used resource.

use std::collections::HashMap;
use std::fmt;

use podfit_core::{names, Resource};
use tracing::error;

use crate::pod::ReservationRequest;

/// State of one named reservation on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceReservation {
    used: Resource,
    reserved: Resource,
    per_pod: HashMap<String, Resource>,
}

impl ResourceReservation {
    /// Create an empty reservation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources consumed by members for reservation-backed dimensions.
    #[must_use]
    pub fn used_resource(&self) -> Resource {
        self.used.clone()
    }

    /// Current ceiling: per-dimension max of member requests.
    #[must_use]
    pub fn reserved_resource(&self) -> Resource {
        self.reserved.clone()
    }

    /// Number of member pods.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.per_pod.len()
    }

    /// Whether the reservation has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.per_pod.is_empty()
    }

    /// Whether the pod with `key` is a member.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.per_pod.contains_key(key)
    }

    pub(crate) fn reserved(&self) -> &Resource {
        &self.reserved
    }

    pub(crate) fn used_mut(&mut self) -> &mut Resource {
        &mut self.used
    }

    /// Record a member and raise the ceiling where its request exceeds it.
    pub(crate) fn add_pod(&mut self, key: &str, request: &ReservationRequest) {
        let declared = request.resource();

        for name in request.requests.keys() {
            match name.as_str() {
                names::CPU => {
                    self.reserved.milli_cpu = self.reserved.milli_cpu.max(declared.milli_cpu);
                }
                names::MEMORY => {
                    self.reserved.memory = self.reserved.memory.max(declared.memory);
                }
                other => {
                    error!(
                        reservation = %request.name,
                        resource = %other,
                        "Resource reservation for this resource is not supported"
                    );
                }
            }
        }

        self.per_pod.insert(key.to_string(), declared);
    }

    /// Drop a member and recompute the ceiling of every dimension it defined.
    ///
    /// A request above the ceiling means the pool is inconsistent; that is
    /// logged and the ceiling is left as is.
    pub(crate) fn remove_pod(&mut self, key: &str, request: &ReservationRequest) {
        let declared = match self.per_pod.remove(key) {
            Some(declared) => declared,
            None => {
                error!(
                    reservation = %request.name,
                    pod = %key,
                    "Pod is not a member of the reservation"
                );
                request.resource()
            }
        };

        for name in request.requests.keys() {
            match name.as_str() {
                names::CPU => {
                    if declared.milli_cpu > self.reserved.milli_cpu {
                        error!(reservation = %request.name, pod = %key, pool = %self, "Resource reservation corrupted");
                    } else if declared.milli_cpu == self.reserved.milli_cpu {
                        self.reserved.milli_cpu =
                            self.per_pod.values().map(|r| r.milli_cpu).max().unwrap_or(0).max(0);
                    }
                }
                names::MEMORY => {
                    if declared.memory > self.reserved.memory {
                        error!(reservation = %request.name, pod = %key, pool = %self, "Resource reservation corrupted");
                    } else if declared.memory == self.reserved.memory {
                        self.reserved.memory =
                            self.per_pod.values().map(|r| r.memory).max().unwrap_or(0).max(0);
                    }
                }
                other => {
                    error!(
                        reservation = %request.name,
                        resource = %other,
                        "Resource reservation for this resource is not supported"
                    );
                }
            }
        }
    }
}

impl fmt::Display for ResourceReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "used: [{}] reserved: [{}]", self.used, self.reserved)?;
        let mut members: Vec<_> = self.per_pod.iter().collect();
        members.sort_by(|a, b| a.0.cmp(b.0));
        for (key, declared) in members {
            write!(f, " [{key} cpu={}m memory={}]", declared.milli_cpu, declared.memory)?;
        }
        Ok(())
    }
}
