//! Per-interface Thread configuration.

use crate::error::MleError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::Ipv6Addr;
use thread_wire::address::CHILD_ID_BITS;
use thread_wire::DeviceMode;

/// Persisted state used for fast resynchronisation after a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncRecord {
    /// Short address held before the reset
    pub rloc16: u16,
    /// Parent extended address, for children
    #[serde(default, with = "eui64_opt")]
    pub parent_mac64: Option<[u8; 8]>,
}

/// Thread interface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Extended MAC address
    #[serde(with = "eui64")]
    pub eui64: [u8; 8],
    /// May become a router
    pub router_eligible: bool,
    /// Receiver on while idle; false makes a sleepy end device
    pub rx_on_idle: bool,
    /// Wants full, not only stable, network data
    pub full_network_data: bool,
    /// MAC device table size; one slot is reserved
    pub device_table_size: usize,
    /// REEDs upgrade while fewer routers than this are active
    pub router_upgrade_threshold: u8,
    /// Routers may downgrade while more routers than this are active
    pub router_downgrade_threshold: u8,
    /// Maximum children of a router
    pub max_child_count: usize,
    /// Lowest child ID handed out
    pub child_id_min: u16,
    /// Highest child ID handed out
    pub child_id_max: u16,
    /// Weighting used when forming a partition
    pub leader_weighting: u8,
    /// Target weighting of a domain-security (CCM) router
    pub ccm_target_weighting: Option<u8>,
    /// Lifetime of router neighbor links, seconds
    pub router_link_lifetime_secs: u32,
    /// Child timeout requested from the parent, seconds
    pub child_timeout_secs: u32,
    /// First parent request window (routers only), milliseconds
    pub parent_request_routers_ms: u64,
    /// Second parent request window (routers and REEDs), milliseconds
    pub parent_request_reeds_ms: u64,
    /// Random delay before scanning, milliseconds
    pub attach_jitter_ms: u64,
    /// Wait for a resynchronisation answer, milliseconds
    pub resync_timeout_ms: u64,
    /// Base delay between orphan scans, milliseconds
    pub orphan_backoff_ms: u64,
    /// REED advertisement interval, milliseconds
    pub reed_advertisement_interval_ms: u64,
    /// REED advertisement jitter, milliseconds
    pub reed_advertisement_jitter_ms: u64,
    /// Router advertisement trickle minimum interval, milliseconds
    pub trickle_imin_ms: u64,
    /// Router advertisement trickle maximum interval, milliseconds
    pub trickle_imax_ms: u64,
    /// Minimum gap between merge advertisements, milliseconds
    pub merge_advertisement_interval_ms: u64,
    /// Upgrade/downgrade poll jitter, milliseconds
    pub router_selection_jitter_ms: u64,
    /// Lifetime of an outstanding challenge, milliseconds
    pub challenge_timeout_ms: u64,
    /// Mesh-local prefix; the upper 64 bits are used
    pub mesh_local_prefix: Ipv6Addr,
    /// Radio channel
    pub channel: u16,
    /// PAN identifier
    pub pan_id: u16,
    /// Active operational dataset timestamp, seconds
    pub active_timestamp: Option<u64>,
    /// Pending operational dataset timestamp, seconds
    pub pending_timestamp: Option<u64>,
    /// Key sequence used in security headers
    pub key_sequence: u32,
    /// State for resynchronisation after a reset
    pub resync: Option<ResyncRecord>,
    /// Seed for the interface random source
    pub rng_seed: Option<u64>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            eui64: [0x02, 0, 0, 0, 0, 0, 0, 1],
            router_eligible: true,
            rx_on_idle: true,
            full_network_data: true,
            device_table_size: 32,
            router_upgrade_threshold: 16,
            router_downgrade_threshold: 23,
            max_child_count: 10,
            child_id_min: 1,
            child_id_max: 511,
            leader_weighting: 64,
            ccm_target_weighting: None,
            router_link_lifetime_secs: 100,
            child_timeout_secs: 240,
            parent_request_routers_ms: 750,
            parent_request_reeds_ms: 1250,
            attach_jitter_ms: 200,
            resync_timeout_ms: 2000,
            orphan_backoff_ms: 30_000,
            reed_advertisement_interval_ms: 570_000,
            reed_advertisement_jitter_ms: 60_000,
            trickle_imin_ms: 1000,
            trickle_imax_ms: 32_000,
            merge_advertisement_interval_ms: 10_000,
            router_selection_jitter_ms: 120_000,
            challenge_timeout_ms: 3000,
            mesh_local_prefix: Ipv6Addr::new(0xfd00, 0x0db8, 0, 0, 0, 0, 0, 0),
            channel: 11,
            pan_id: 0xface,
            active_timestamp: None,
            pending_timestamp: None,
            key_sequence: 0,
            resync: None,
            rng_seed: None,
        }
    }
}

impl ThreadConfig {
    /// Mode TLV value for this configuration
    pub fn device_mode(&self) -> DeviceMode {
        let mut mode = DeviceMode::SECURE_DATA_REQUESTS;
        if self.rx_on_idle {
            mode |= DeviceMode::RX_ON_IDLE;
        }
        if self.router_eligible {
            mode |= DeviceMode::FULL_THREAD_DEVICE;
        }
        if self.full_network_data {
            mode |= DeviceMode::FULL_NETWORK_DATA;
        }
        mode
    }

    /// Check values that end up in protocol fields. Child IDs must fit the
    /// child bits of an RLOC16.
    pub fn validate(&self) -> Result<(), MleError> {
        let max_child_id = (1u16 << CHILD_ID_BITS) - 1;
        if self.child_id_min == 0
            || self.child_id_max > max_child_id
            || self.child_id_min > self.child_id_max
        {
            return Err(MleError::InvalidConfig(format!(
                "child id range {}..={} outside 1..={}",
                self.child_id_min, self.child_id_max, max_child_id
            )));
        }
        Ok(())
    }

    /// Upper 64 bits of the mesh-local prefix
    pub fn mesh_local_prefix_bytes(&self) -> [u8; 8] {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.mesh_local_prefix.octets()[..8]);
        prefix
    }
}

/// Format an EUI-64 as colon-separated hex
pub fn format_eui64(eui64: &[u8; 8]) -> String {
    eui64
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse a colon-separated or plain hex EUI-64
pub fn parse_eui64(s: &str) -> Option<[u8; 8]> {
    let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 16 {
        return None;
    }
    let mut out = [0u8; 8];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

mod eui64 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8; 8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_eui64(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 8], D::Error> {
        let s = String::deserialize(d)?;
        parse_eui64(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid eui64 {s}")))
    }
}

mod eui64_opt {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<[u8; 8]>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&format_eui64(v)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 8]>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => parse_eui64(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid eui64 {s}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        let config = ThreadConfig::default();
        assert_eq!(config.device_mode(), DeviceMode::router());

        let sed = ThreadConfig {
            rx_on_idle: false,
            router_eligible: false,
            full_network_data: false,
            ..ThreadConfig::default()
        };
        assert!(sed.device_mode().is_sleepy());
        assert!(!sed.device_mode().is_ffd());
    }

    #[test]
    fn test_child_id_range_validation() {
        assert!(ThreadConfig::default().validate().is_ok());
        for (min, max) in [(1, 0x200), (0, 10), (20, 10), (1, 0x400)] {
            let config = ThreadConfig {
                child_id_min: min,
                child_id_max: max,
                ..ThreadConfig::default()
            };
            assert!(matches!(config.validate(), Err(MleError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_eui64_parse() {
        let eui = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        assert_eq!(parse_eui64("00:11:22:33:44:55:66:77"), Some(eui));
        assert_eq!(parse_eui64("0011223344556677"), Some(eui));
        assert_eq!(parse_eui64("00:11"), None);
        assert_eq!(parse_eui64("zz11223344556677"), None);
        assert_eq!(format_eui64(&eui), "00:11:22:33:44:55:66:77");
    }

    #[test]
    fn test_json_partial_config() {
        let config: ThreadConfig = serde_json::from_str(
            r#"{"eui64": "02:00:00:00:00:00:00:09", "max_child_count": 1,
                "resync": {"rloc16": 1025, "parent_mac64": "02:00:00:00:00:00:00:01"}}"#,
        )
        .unwrap();
        assert_eq!(config.eui64[7], 9);
        assert_eq!(config.max_child_count, 1);
        assert_eq!(config.leader_weighting, 64);
        let resync = config.resync.unwrap();
        assert_eq!(resync.rloc16, 0x0401);
        assert_eq!(resync.parent_mac64.unwrap()[7], 1);
        assert_eq!(config.mesh_local_prefix_bytes(), [0xfd, 0, 0x0d, 0xb8, 0, 0, 0, 0]);
    }
}
