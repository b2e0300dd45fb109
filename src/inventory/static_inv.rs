// Static YAML inventory parser

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value as YamlValue;

use super::{Host, HostDefaults, Inventory};
use crate::output::errors::TodError;

/// Per-host fields of the YAML inventory; unset fields fall back to defaults
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HostEntry {
    port: Option<u16>,
    priority: Option<u32>,
    threads: Option<u32>,
    protocol: Option<String>,
    /// Seconds
    timeout: Option<u64>,
}

/// Parse inventory from a YAML file
pub fn parse_inventory_file(path: &Path, defaults: &HostDefaults) -> Result<Inventory, TodError> {
    let content = std::fs::read_to_string(path).map_err(|e| TodError::Config {
        message: format!("Failed to read inventory file {}: {}", path.display(), e),
        suggestion: Some("Check the --inventory path".to_string()),
    })?;

    parse_inventory(&content, defaults)
}

/// Parse inventory from a YAML string
///
/// The document is a mapping from hostname to connection settings:
///
/// ```yaml
/// web1:
///   port: 2222
///   priority: 2
///   threads: 4
/// web2: {}
/// ```
pub fn parse_inventory(content: &str, defaults: &HostDefaults) -> Result<Inventory, TodError> {
    let yaml: YamlValue = serde_yaml::from_str(content).map_err(|e| TodError::Config {
        message: format!("Invalid inventory YAML: {}", e),
        suggestion: Some("Check inventory file syntax".to_string()),
    })?;

    let map = match yaml {
        YamlValue::Mapping(map) => map,
        _ => {
            return Err(TodError::Config {
                message: "Inventory must be a YAML mapping of hostnames".to_string(),
                suggestion: Some("Start with 'hostname:' followed by its settings".to_string()),
            });
        }
    };

    let mut inventory = Inventory::new();

    for (key, value) in map {
        let name = match key {
            YamlValue::String(s) => s,
            YamlValue::Number(n) => n.to_string(),
            other => {
                return Err(TodError::config(format!(
                    "Invalid host name in inventory: {:?}",
                    other
                )))
            }
        };

        let entry: HostEntry = if value.is_null() {
            HostEntry::default()
        } else {
            serde_yaml::from_value(value).map_err(|e| TodError::Config {
                message: format!("Invalid settings for host '{}': {}", name, e),
                suggestion: Some(
                    "Allowed keys are port, priority, threads, protocol and timeout".to_string(),
                ),
            })?
        };

        inventory.add_host(entry_to_host(name, entry, defaults)?)?;
    }

    if inventory.is_empty() {
        return Err(TodError::config("Inventory does not declare any host"));
    }

    Ok(inventory)
}

fn entry_to_host(name: String, entry: HostEntry, defaults: &HostDefaults) -> Result<Host, TodError> {
    let mut host = Host::with_defaults(name, defaults);

    if let Some(port) = entry.port {
        host = host.with_port(port);
    }
    if let Some(protocol) = entry.protocol {
        host = host.with_protocol(protocol);
    }
    if let Some(timeout) = entry.timeout {
        host = host.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(priority) = entry.priority {
        host = host.with_priority(priority);
    }
    if let Some(threads) = entry.threads {
        host = host.with_threads(threads);
    }

    if host.priority == 0 || host.threads == 0 {
        return Err(TodError::Config {
            message: format!("Host '{}' has a zero priority or thread count", host.name),
            suggestion: Some("Use values of at least 1, or leave them unset".to_string()),
        });
    }

    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_parse_inventory_with_defaults() {
        let yaml = r#"
web1:
  port: 2222
  priority: 3
  protocol: tcp4
  timeout: 2
web2:
  threads: 4
web3:
"#;

        let inv = parse_inventory(yaml, &HostDefaults::default()).unwrap();

        // Declaration order is preserved
        let names: Vec<&str> = inv.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["web1", "web2", "web3"]);

        assert_eq!(
            inv.hosts[0],
            Host::new("web1")
                .with_port(2222)
                .with_priority(3)
                .with_protocol("tcp4")
                .with_timeout(Duration::from_secs(2))
        );
        assert_eq!(inv.hosts[1].weight(), 4);
        assert_eq!(inv.hosts[2], Host::new("web3"));
    }

    #[test]
    fn test_parse_inventory_errors() {
        let defaults = HostDefaults::default();

        assert!(matches!(
            parse_inventory("- web1\n- web2\n", &defaults),
            Err(TodError::Config { .. })
        ));
        assert!(matches!(
            parse_inventory("web1:\n  prot: 22\n", &defaults),
            Err(TodError::Config { .. })
        ));
        assert!(matches!(
            parse_inventory("web1:\n  threads: 0\n", &defaults),
            Err(TodError::Config { .. })
        ));
        assert!(matches!(
            parse_inventory("web1: [\n", &defaults),
            Err(TodError::Config { .. })
        ));
    }

    #[test]
    fn test_parse_inventory_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db1:\n  port: 2200").unwrap();

        let inv = parse_inventory_file(file.path(), &HostDefaults::default()).unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.hosts[0].port, 2200);

        let missing = parse_inventory_file(Path::new("/nonexistent/hosts.yaml"), &HostDefaults::default());
        assert!(matches!(missing, Err(TodError::Config { .. })));
    }
}
