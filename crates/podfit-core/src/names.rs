//! Resource name constants and classification.
//!
//! The cache routes every entry of a resource list by name: the well-known
//! names map onto dedicated fields of [`Resource`](crate::Resource), scalar
//! names land in the scalar map, everything else is ignored.

/// CPU, in cores. Parsed to milli-units.
pub const CPU: &str = "cpu";
/// Memory, in bytes.
pub const MEMORY: &str = "memory";
/// Number of pods a node accepts.
pub const PODS: &str = "pods";
/// Local ephemeral storage, in bytes.
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";
/// Accelerator devices, counted as whole units.
pub const ACCELERATOR: &str = "alpha.kubernetes.io/nvidia-gpu";

const HUGE_PAGES_PREFIX: &str = "hugepages-";
const ATTACHABLE_VOLUMES_PREFIX: &str = "attachable-volumes-";
const NATIVE_NAMESPACE: &str = "kubernetes.io/";
const REQUESTS_PREFIX: &str = "requests.";

/// Whether `name` is a huge-page resource such as `hugepages-2Mi`.
#[must_use]
pub fn is_huge_page_resource_name(name: &str) -> bool {
    name.starts_with(HUGE_PAGES_PREFIX)
}

/// Whether `name` is an attachable-volume limit such as `attachable-volumes-aws-ebs`.
#[must_use]
pub fn is_attachable_volume_resource_name(name: &str) -> bool {
    name.starts_with(ATTACHABLE_VOLUMES_PREFIX)
}

/// Whether `name` lives in the `kubernetes.io/` namespace.
#[must_use]
pub fn is_prefixed_native_resource(name: &str) -> bool {
    name.contains(NATIVE_NAMESPACE)
}

/// Whether `name` is a native resource: unqualified or in the `kubernetes.io/` namespace.
#[must_use]
pub fn is_native_resource(name: &str) -> bool {
    !name.contains('/') || is_prefixed_native_resource(name)
}

/// Whether `name` is a vendor-qualified extended resource such as `example.com/fpga`.
#[must_use]
pub fn is_extended_resource_name(name: &str) -> bool {
    if is_native_resource(name) || name.starts_with(REQUESTS_PREFIX) {
        return false;
    }
    is_qualified_name(&format!("{REQUESTS_PREFIX}{name}"))
}

/// Whether `name` is accounted in the scalar resource map.
#[must_use]
pub fn is_scalar_resource_name(name: &str) -> bool {
    is_extended_resource_name(name)
        || is_huge_page_resource_name(name)
        || is_prefixed_native_resource(name)
        || is_attachable_volume_resource_name(name)
}

/// Validates `[prefix/]name` where prefix is a DNS subdomain and name is at
/// most 63 alphanumerics, `-`, `_` or `.`, starting and ending alphanumeric.
fn is_qualified_name(value: &str) -> bool {
    let (prefix, name) = match value.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, value),
    };
    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return false;
        }
    }
    if name.is_empty() || name.len() > 63 || name.contains('/') {
        return false;
    }
    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_alphanumeric();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(value: &str) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    value.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes.len() <= 63
            && edge_ok(bytes[0])
            && edge_ok(bytes[bytes.len() - 1])
            && bytes
                .iter()
                .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names_are_not_scalar() {
        assert!(!is_scalar_resource_name(CPU));
        assert!(!is_scalar_resource_name(MEMORY));
        assert!(!is_scalar_resource_name(PODS));
        assert!(!is_scalar_resource_name(EPHEMERAL_STORAGE));
    }

    #[test]
    fn extended_resources() {
        assert!(is_extended_resource_name("example.com/fpga"));
        assert!(is_extended_resource_name("nvidia.com/gpu"));
        assert!(!is_extended_resource_name("kubernetes.io/something"));
        assert!(!is_extended_resource_name("unqualified"));
        assert!(!is_extended_resource_name("requests.example.com/fpga"));
        assert!(!is_extended_resource_name("Bad_Domain/fpga"));
    }

    #[test]
    fn scalar_resources() {
        assert!(is_scalar_resource_name("hugepages-2Mi"));
        assert!(is_scalar_resource_name("attachable-volumes-aws-ebs"));
        assert!(is_scalar_resource_name("scalar.kubernetes.io/foo"));
        assert!(is_scalar_resource_name(ACCELERATOR));
        assert!(is_scalar_resource_name("example.com/fpga"));
        assert!(!is_scalar_resource_name("storage"));
    }

    #[test]
    fn huge_pages() {
        assert!(is_huge_page_resource_name("hugepages-1Gi"));
        assert!(!is_huge_page_resource_name("example.com/hugepages-1Gi"));
    }
}
