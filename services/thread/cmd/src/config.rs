//! Configuration handling for the Thread node simulation.
//!
//! Values come from the YAML config file, then `THREAD_*` environment
//! variables, then command line flags (applied in `main`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;
use thread_mle::config::parse_eui64;
use thread_mle::ThreadConfig;
use thread_wire::{BorderRouterEntry, BorderRouterFlags, HasRouteEntry, PrefixEntry};
use tracing::{info, warn};

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Run parameters
    pub simulation: RunConfig,
    /// Radio model
    pub radio: RadioConfig,
    /// Interface defaults shared by every node
    pub interface: ThreadConfig,
    /// Explicit nodes; when empty `simulation.node_count` nodes are laid out on a line
    pub nodes: Vec<NodeSpec>,
}

/// Timing of the run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Simulated time advanced per step
    #[serde(with = "duration_str")]
    pub tick: Duration,
    /// Total simulated time
    #[serde(with = "duration_str")]
    pub duration: Duration,
    /// Pace steps against the wall clock
    pub realtime: bool,
    /// Seed of the radio and of the per-node random sources
    pub seed: u64,
    /// Nodes generated when no explicit nodes are configured
    pub node_count: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            duration: Duration::from_secs(120),
            realtime: false,
            seed: 1,
            node_count: 4,
        }
    }
}

/// Broadcast radio model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Received signal strength at distance zero, dBm
    pub rssi_dbm: i8,
    /// Path loss per distance unit, dB
    pub attenuation_db: f32,
    /// Frames weaker than this are not received, dBm
    pub sensitivity_dbm: i8,
    /// Probability a frame is dropped
    pub loss: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            rssi_dbm: -40,
            attenuation_db: 12.0,
            sensitivity_dbm: -100,
            loss: 0.0,
        }
    }
}

/// One simulated node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    /// Extended address; defaults to `02:00:00:00:00:00:00:<n>`
    pub eui64: Option<String>,
    /// Overrides `interface.router_eligible`
    pub router_eligible: Option<bool>,
    /// Overrides `interface.rx_on_idle`
    pub rx_on_idle: Option<bool>,
    /// Overrides `interface.full_network_data`
    pub full_network_data: Option<bool>,
    /// Position on the plane, distance units
    pub position: Option<(f32, f32)>,
    /// Delay before the node starts attaching
    #[serde(with = "duration_str")]
    pub start_delay: Duration,
    /// Prefixes this node serves as a border router
    pub prefixes: Vec<PrefixSpec>,
}

/// A prefix served by a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixSpec {
    /// Prefix address
    pub prefix: Ipv6Addr,
    /// Prefix length in bits
    pub length: u8,
    /// Carried in stable network data
    #[serde(default = "default_true")]
    pub stable: bool,
    /// Addresses are autoconfigured from the prefix
    #[serde(default)]
    pub slaac: bool,
    /// The node is a default route
    #[serde(default)]
    pub default_route: bool,
    /// The node has an external route to the prefix
    #[serde(default)]
    pub external_route: bool,
}

fn default_true() -> bool {
    true
}

impl PrefixSpec {
    /// Prefix entry with the node's short address stamped into its sub-entries
    pub fn to_entry(&self, rloc16: u16) -> PrefixEntry {
        let mut entry = PrefixEntry::new(self.prefix.octets(), self.length, self.stable);
        let mut flags = BorderRouterFlags::ON_MESH;
        if self.slaac {
            flags |= BorderRouterFlags::SLAAC | BorderRouterFlags::PREFERRED;
        }
        if self.default_route {
            flags |= BorderRouterFlags::DEFAULT_ROUTE;
        }
        entry.border_routers.push(BorderRouterEntry {
            rloc16,
            flags,
            stable: self.stable,
        });
        if self.external_route {
            entry.has_routes.push(HasRouteEntry {
                rloc16,
                preference: 0,
                stable: self.stable,
            });
        }
        entry
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation: RunConfig::default(),
            radio: RadioConfig::default(),
            interface: ThreadConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = serde_yaml::from_str::<Self>(&content)
                    .with_context(|| format!("parsing {}", path.display()))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_environment_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `THREAD_*` overrides; `lookup` returns the variable's value
    pub fn apply_environment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(count) = lookup("THREAD_NODES").and_then(|v| v.parse().ok()) {
            self.simulation.node_count = count;
            info!("Node count overridden by environment: {}", count);
        }
        if let Some(tick) = lookup("THREAD_TICK").and_then(|v| humantime::parse_duration(&v).ok()) {
            self.simulation.tick = tick;
            info!("Tick overridden by environment: {:?}", tick);
        }
        if let Some(duration) =
            lookup("THREAD_DURATION").and_then(|v| humantime::parse_duration(&v).ok())
        {
            self.simulation.duration = duration;
            info!("Duration overridden by environment: {:?}", duration);
        }
        if let Some(seed) = lookup("THREAD_SEED").and_then(|v| v.parse().ok()) {
            self.simulation.seed = seed;
            info!("Seed overridden by environment: {}", seed);
        }
        if let Some(channel) = lookup("THREAD_CHANNEL").and_then(|v| v.parse().ok()) {
            self.interface.channel = channel;
            info!("Channel overridden by environment: {}", channel);
        }
        if let Some(pan_id) = lookup("THREAD_PAN_ID").and_then(|v| parse_u16(&v)) {
            self.interface.pan_id = pan_id;
            info!("PAN id overridden by environment: {:#06x}", pan_id);
        }
        if let Some(loss) = lookup("THREAD_LOSS").and_then(|v| v.parse().ok()) {
            self.radio.loss = loss;
            info!("Radio loss overridden by environment: {}", loss);
        }
    }

    /// Node list, generating a line of nodes when none are configured
    pub fn node_specs(&self) -> Vec<NodeSpec> {
        if !self.nodes.is_empty() {
            return self.nodes.clone();
        }
        (0..self.simulation.node_count)
            .map(|i| NodeSpec {
                position: Some((i as f32, 0.0)),
                start_delay: Duration::from_millis(i as u64 * 500),
                ..NodeSpec::default()
            })
            .collect()
    }

    /// Interface configuration of node `index`
    pub fn interface_config(&self, index: usize, spec: &NodeSpec) -> Result<ThreadConfig> {
        let mut config = self.interface.clone();
        config.eui64 = match &spec.eui64 {
            Some(s) => parse_eui64(s).with_context(|| format!("invalid eui64 {s}"))?,
            None => {
                let mut eui64 = [0x02, 0, 0, 0, 0, 0, 0, 0];
                eui64[6..].copy_from_slice(&((index + 1) as u16).to_be_bytes());
                eui64
            }
        };
        if let Some(v) = spec.router_eligible {
            config.router_eligible = v;
        }
        if let Some(v) = spec.rx_on_idle {
            config.rx_on_idle = v;
        }
        if let Some(v) = spec.full_network_data {
            config.full_network_data = v;
        }
        config.rng_seed = Some(self.simulation.seed.wrapping_add(index as u64 + 1));
        Ok(config)
    }
}

fn parse_u16(s: &str) -> Option<u16> {
    match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.simulation.tick, Duration::from_millis(50));
        assert_eq!(config.simulation.node_count, 4);
        assert_eq!(config.interface.channel, 11);
        assert_eq!(config.node_specs().len(), 4);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
simulation:
  tick: 20ms
  duration: 2m
  seed: 9
radio:
  loss: 0.1
interface:
  channel: 15
  max_child_count: 2
nodes:
  - eui64: "02:00:00:00:00:00:00:aa"
    position: [0, 0]
  - router_eligible: false
    rx_on_idle: false
    start_delay: 3s
    prefixes:
      - prefix: "fd00:1::"
        length: 64
        slaac: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = SimulationConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.simulation.tick, Duration::from_millis(20));
        assert_eq!(config.simulation.duration, Duration::from_secs(120));
        assert_eq!(config.radio.loss, 0.1);
        assert_eq!(config.interface.channel, 15);
        assert_eq!(config.interface.max_child_count, 2);
        assert_eq!(config.interface.leader_weighting, 64);

        let specs = config.node_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].start_delay, Duration::from_secs(3));
        assert!(specs[1].prefixes[0].stable);

        let first = config.interface_config(0, &specs[0]).unwrap();
        assert_eq!(first.eui64[7], 0xaa);
        assert_eq!(first.rng_seed, Some(10));
        let second = config.interface_config(1, &specs[1]).unwrap();
        assert_eq!(second.eui64, [0x02, 0, 0, 0, 0, 0, 0, 2]);
        assert!(!second.router_eligible);
        assert!(second.device_mode().is_sleepy());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulationConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.simulation.seed, 1);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"simulation: [not, a, map]").unwrap();
        assert!(SimulationConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("THREAD_NODES", "7"),
            ("THREAD_TICK", "10ms"),
            ("THREAD_PAN_ID", "0x1234"),
            ("THREAD_CHANNEL", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut config = SimulationConfig::default();
        config.apply_environment_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.simulation.node_count, 7);
        assert_eq!(config.simulation.tick, Duration::from_millis(10));
        assert_eq!(config.interface.pan_id, 0x1234);
        assert_eq!(config.interface.channel, 11);
    }

    #[test]
    fn test_prefix_entry_stamping() {
        let spec = PrefixSpec {
            prefix: "fd00:1::".parse().unwrap(),
            length: 64,
            stable: true,
            slaac: true,
            default_route: false,
            external_route: true,
        };
        let entry = spec.to_entry(0x0400);
        assert_eq!(entry.prefix_length, 64);
        assert_eq!(entry.border_routers[0].rloc16, 0x0400);
        assert!(entry.border_routers[0].flags.contains(BorderRouterFlags::SLAAC));
        assert!(!entry.border_routers[0].flags.contains(BorderRouterFlags::DEFAULT_ROUTE));
        assert_eq!(entry.has_routes[0].rloc16, 0x0400);
    }
}
