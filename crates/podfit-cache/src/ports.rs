//! Index of host ports in use on a node.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Host IP standing for every address of the node.
pub const DEFAULT_BIND_ALL_HOST_IP: &str = "0.0.0.0";

/// Protocol assumed when a container port declares none.
pub const DEFAULT_PROTOCOL: &str = "TCP";

/// A protocol and port pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolPort {
    /// Transport protocol, e.g. `TCP`.
    pub protocol: String,
    /// Port number.
    pub port: i32,
}

impl ProtocolPort {
    /// Create a pair, defaulting an empty protocol to TCP.
    #[must_use]
    pub fn new(protocol: &str, port: i32) -> Self {
        let protocol = if protocol.is_empty() {
            DEFAULT_PROTOCOL
        } else {
            protocol
        };
        Self {
            protocol: protocol.to_string(),
            port,
        }
    }
}

impl fmt::Display for ProtocolPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.port)
    }
}

/// Used host ports, keyed by host IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPortInfo {
    ports: BTreeMap<String, BTreeSet<ProtocolPort>>,
}

fn sanitize_ip(ip: &str) -> &str {
    if ip.is_empty() {
        DEFAULT_BIND_ALL_HOST_IP
    } else {
        ip
    }
}

impl HostPortInfo {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a host port. Ports `<= 0` mean "no host port" and are ignored.
    pub fn add(&mut self, ip: &str, protocol: &str, port: i32) {
        if port <= 0 {
            return;
        }
        self.ports
            .entry(sanitize_ip(ip).to_string())
            .or_default()
            .insert(ProtocolPort::new(protocol, port));
    }

    /// Release a host port, dropping the IP once it holds no ports.
    pub fn remove(&mut self, ip: &str, protocol: &str, port: i32) {
        if port <= 0 {
            return;
        }
        let ip = sanitize_ip(ip);
        if let Some(set) = self.ports.get_mut(ip) {
            set.remove(&ProtocolPort::new(protocol, port));
            if set.is_empty() {
                self.ports.remove(ip);
            }
        }
    }

    /// Whether binding `ip:protocol/port` would clash with a recorded port.
    ///
    /// The wildcard address clashes with the same port on any IP.
    #[must_use]
    pub fn check_conflict(&self, ip: &str, protocol: &str, port: i32) -> bool {
        if port <= 0 {
            return false;
        }
        let ip = sanitize_ip(ip);
        let wanted = ProtocolPort::new(protocol, port);

        if ip == DEFAULT_BIND_ALL_HOST_IP {
            return self.ports.values().any(|set| set.contains(&wanted));
        }
        [ip, DEFAULT_BIND_ALL_HOST_IP]
            .iter()
            .filter_map(|key| self.ports.get(*key))
            .any(|set| set.contains(&wanted))
    }

    /// Number of recorded (ip, protocol, port) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ports.values().map(BTreeSet::len).sum()
    }

    /// Whether no port is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Iterate over `(ip, protocol/port)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProtocolPort)> {
        self.ports
            .iter()
            .flat_map(|(ip, set)| set.iter().map(move |pp| (ip.as_str(), pp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_applies_defaults() {
        let mut ports = HostPortInfo::new();
        ports.add("", "", 8080);
        ports.add("127.0.0.1", "UDP", 53);
        ports.add("127.0.0.1", "TCP", 0);

        assert_eq!(ports.len(), 2);
        let entries: Vec<_> = ports.iter().map(|(ip, pp)| format!("{ip} {pp}")).collect();
        assert_eq!(entries, vec!["0.0.0.0 TCP/8080", "127.0.0.1 UDP/53"]);
    }

    #[test]
    fn remove_drops_empty_ips() {
        let mut ports = HostPortInfo::new();
        ports.add("10.0.0.1", "TCP", 80);
        ports.add("10.0.0.1", "TCP", 443);

        ports.remove("10.0.0.1", "", 80);
        assert_eq!(ports.len(), 1);
        ports.remove("10.0.0.1", "TCP", 443);
        assert!(ports.is_empty());
        assert_eq!(ports, HostPortInfo::new());

        // Removing something never added is a no-op.
        ports.remove("10.0.0.2", "TCP", 22);
        assert!(ports.is_empty());
    }

    #[test]
    fn conflicts_respect_wildcard() {
        let mut ports = HostPortInfo::new();
        ports.add("10.0.0.1", "TCP", 80);

        assert!(ports.check_conflict("10.0.0.1", "TCP", 80));
        assert!(ports.check_conflict("", "TCP", 80));
        assert!(!ports.check_conflict("10.0.0.2", "TCP", 80));
        assert!(!ports.check_conflict("10.0.0.1", "UDP", 80));

        ports.add("0.0.0.0", "UDP", 53);
        assert!(ports.check_conflict("192.168.1.1", "UDP", 53));
        assert!(!ports.check_conflict("192.168.1.1", "UDP", 0));
    }
}
