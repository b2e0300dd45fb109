// Inventory module for host management

mod static_inv;

pub use static_inv::*;

use std::path::Path;
use std::time::Duration;

use crate::output::errors::TodError;

/// Connection settings shared by hosts that do not override them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDefaults {
    pub port: u16,
    pub protocol: String,
    pub timeout: Duration,
}

impl Default for HostDefaults {
    fn default() -> Self {
        HostDefaults {
            port: 22,
            protocol: "tcp".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// A single dispatch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    /// Bound on the reachability probe and the SSH handshake
    pub timeout: Duration,
    pub priority: u32,
    pub threads: u32,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Host::with_defaults(name, &HostDefaults::default())
    }

    pub fn with_defaults(name: impl Into<String>, defaults: &HostDefaults) -> Self {
        Host {
            name: name.into(),
            port: defaults.port,
            protocol: defaults.protocol.clone(),
            timeout: defaults.timeout,
            priority: 1,
            threads: 1,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    /// Share of the command batch this host should receive
    pub fn weight(&self) -> u64 {
        u64::from(self.priority) * u64::from(self.threads)
    }

    /// `hostname:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.name.contains(':') && !self.name.starts_with('[') {
            format!("[{}]:{}", self.name, self.port)
        } else {
            format!("{}:{}", self.name, self.port)
        }
    }
}

/// The complete inventory, hosts in declaration order
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub hosts: Vec<Host>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    /// Load inventory from a YAML file
    pub fn from_file(path: &Path, defaults: &HostDefaults) -> Result<Self, TodError> {
        parse_inventory_file(path, defaults)
    }

    /// Create inventory from a pipe-delimited host list, as read from stdin
    ///
    /// Example: "web1|web2|10.0.0.7"
    pub fn from_host_list(list: &str, defaults: &HostDefaults) -> Result<Self, TodError> {
        let mut inv = Inventory::new();

        for name in list.trim().split('|') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            inv.add_host(Host::with_defaults(name, defaults))?;
        }

        if inv.is_empty() {
            return Err(TodError::Config {
                message: "No host names found in host list".to_string(),
                suggestion: Some("Pipe hosts as 'host1|host2|host3'".to_string()),
            });
        }

        Ok(inv)
    }

    pub fn add_host(&mut self, host: Host) -> Result<(), TodError> {
        if self.get_host(&host.name).is_some() {
            return Err(TodError::config(format!(
                "Host '{}' is declared more than once",
                host.name
            )));
        }
        self.hosts.push(host);
        Ok(())
    }

    pub fn get_host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn into_hosts(self) -> Vec<Host> {
        self.hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_list_shares_defaults() {
        let defaults = HostDefaults {
            port: 22,
            protocol: "tcp".to_string(),
            timeout: Duration::from_secs(5),
        };

        let inv = Inventory::from_host_list("a|b|c", &defaults).unwrap();

        let names: Vec<&str> = inv.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        for host in &inv.hosts {
            assert_eq!(host.port, 22);
            assert_eq!(host.protocol, "tcp");
            assert_eq!(host.priority, 1);
            assert_eq!(host.threads, 1);
            assert_eq!(host.weight(), 1);
        }
    }

    #[test]
    fn test_host_list_trims_input() {
        let inv = Inventory::from_host_list("  web1 | web2||\n", &HostDefaults::default()).unwrap();
        assert_eq!(inv.len(), 2);
        assert!(inv.get_host("web2").is_some());
    }

    #[test]
    fn test_host_list_rejects_empty_and_duplicates() {
        assert!(matches!(
            Inventory::from_host_list(" \n", &HostDefaults::default()),
            Err(TodError::Config { .. })
        ));
        assert!(matches!(
            Inventory::from_host_list("a|a", &HostDefaults::default()),
            Err(TodError::Config { .. })
        ));
    }

    #[test]
    fn test_host_address() {
        assert_eq!(Host::new("web1").with_port(2222).address(), "web1:2222");
        assert_eq!(Host::new("::1").address(), "[::1]:22");
    }

    #[test]
    fn test_weight() {
        let host = Host::new("big").with_priority(3).with_threads(4);
        assert_eq!(host.weight(), 12);
    }
}
