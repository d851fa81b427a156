//! Partition comparison.
//!
//! Decides, from a heard Leader Data and Route64, whether a node stays in
//! its partition or moves to the heard one. Everything here is a pure
//! function of its inputs.

use serde::{Deserialize, Serialize};
use thread_wire::{is_greater_u8, LeaderData, Route64};
use tracing::debug;

/// Outcome of comparing two different partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionDecision {
    /// Move to the heard partition
    Adopt,
    /// Stay in the local partition
    Reject,
}

/// Outcome of validating heard Leader Data against the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderDataValidation {
    /// Same partition, nothing newer
    SameOrOlder,
    /// Same partition, newer network data available
    NetworkDataUpdated,
    /// Different partition that wins; reattach to it
    Merge,
    /// Different partition that loses
    Reject,
    /// Same partition, newer data, but this node is the leader
    ConflictingLeader,
}

/// Partition a node has just left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousPartition {
    /// Partition ID
    pub partition_id: u32,
    /// Weighting
    pub weighting: u8,
    /// Router ID sequence heard last
    pub id_sequence: u8,
}

impl PreviousPartition {
    /// Record the partition being left
    pub fn from_leader_data(leader_data: &LeaderData, id_sequence: u8) -> Self {
        Self {
            partition_id: leader_data.partition_id,
            weighting: leader_data.weighting,
            id_sequence,
        }
    }

    /// Whether a heard advertisement repeats this partition without the
    /// router-ID sequence having moved forward
    pub fn suppresses(&self, heard: &LeaderData, route_sequence: Option<u8>) -> bool {
        heard.partition_id == self.partition_id
            && heard.weighting == self.weighting
            && route_sequence.map_or(true, |seq| !is_greater_u8(seq, self.id_sequence))
    }
}

/// Local side of a partition comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPartition {
    /// Local Leader Data
    pub leader_data: LeaderData,
    /// Routers in the local partition
    pub active_routers: u8,
    /// Target weighting when acting as a domain-security (CCM) router
    pub ccm_target_weighting: Option<u8>,
    /// Partition recently left
    pub previous: Option<PreviousPartition>,
    /// Whether this node is the leader
    pub is_leader: bool,
}

impl LocalPartition {
    /// Whether the local partition has at most one router
    pub fn is_singleton(&self) -> bool {
        self.active_routers <= 1
    }
}

/// Whether two Leader Data name the same partition
pub fn partition_match(local: &LeaderData, heard: &LeaderData) -> bool {
    local.partition_id == heard.partition_id && local.weighting == heard.weighting
}

/// Compare a heard partition with the local one
pub fn partition_process(
    local: &LocalPartition,
    heard_active_routers: u8,
    heard: &LeaderData,
    route: Option<&Route64>,
) -> PartitionDecision {
    if let Some(previous) = &local.previous {
        if previous.suppresses(heard, route.map(|r| r.id_sequence)) {
            debug!(
                "Partition {:#010x} was just left, dropping",
                heard.partition_id
            );
            return PartitionDecision::Reject;
        }
    }

    if let Some(target) = local.ccm_target_weighting {
        if heard.weighting < target {
            return PartitionDecision::Reject;
        }
        if heard.weighting > target {
            return PartitionDecision::Adopt;
        }
    }

    let heard_singleton = heard_active_routers <= 1;

    if heard_active_routers == 0 && local.is_singleton() {
        return PartitionDecision::Adopt;
    }

    if !heard_singleton && local.is_singleton() {
        return PartitionDecision::Adopt;
    }
    if heard_singleton && !local.is_singleton() {
        return PartitionDecision::Reject;
    }

    let mine = &local.leader_data;
    if heard.weighting != mine.weighting {
        return if heard.weighting > mine.weighting {
            PartitionDecision::Adopt
        } else {
            PartitionDecision::Reject
        };
    }
    if heard.partition_id > mine.partition_id {
        return PartitionDecision::Adopt;
    }

    PartitionDecision::Reject
}

/// Validate heard Leader Data
pub fn leader_data_validation(
    local: &LocalPartition,
    heard: &LeaderData,
    route: Option<&Route64>,
) -> LeaderDataValidation {
    let mine = &local.leader_data;
    if !partition_match(mine, heard) {
        let heard_routers = route.map_or(0, Route64::active_router_count);
        return match partition_process(local, heard_routers, heard, route) {
            PartitionDecision::Adopt => LeaderDataValidation::Merge,
            PartitionDecision::Reject => LeaderDataValidation::Reject,
        };
    }

    if is_greater_u8(heard.data_version, mine.data_version)
        || is_greater_u8(heard.stable_data_version, mine.stable_data_version)
    {
        if local.is_leader {
            return LeaderDataValidation::ConflictingLeader;
        }
        return LeaderDataValidation::NetworkDataUpdated;
    }

    LeaderDataValidation::SameOrOlder
}

/// Leader Data to store when adopting a heard partition. Versions are set
/// one behind so the next Data Response is taken as newer.
pub fn adopted_leader_data(heard: &LeaderData) -> LeaderData {
    LeaderData {
        data_version: heard.data_version.wrapping_sub(1),
        stable_data_version: heard.stable_data_version.wrapping_sub(1),
        ..*heard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thread_wire::RouteEntry;

    fn leader(partition_id: u32, weighting: u8) -> LeaderData {
        LeaderData {
            partition_id,
            weighting,
            data_version: 10,
            stable_data_version: 3,
            leader_router_id: 2,
        }
    }

    fn local(partition_id: u32, weighting: u8, active_routers: u8) -> LocalPartition {
        LocalPartition {
            leader_data: leader(partition_id, weighting),
            active_routers,
            ccm_target_weighting: None,
            previous: None,
            is_leader: false,
        }
    }

    fn route(seq: u8, ids: &[u8]) -> Route64 {
        let mut r = Route64::new(seq);
        for &id in ids {
            r.push(RouteEntry {
                router_id: id,
                link_quality_out: 3,
                link_quality_in: 3,
                route_cost: 1,
            });
        }
        r
    }

    #[test]
    fn test_partition_match_needs_both_fields() {
        let p = leader(5, 64);
        assert!(partition_match(&p, &p));
        assert!(!partition_match(&p, &leader(5, 65)));
        assert!(!partition_match(&p, &leader(6, 64)));
    }

    #[test]
    fn test_higher_weighting_adopted() {
        let me = local(5, 64, 1);
        let heard = leader(9, 128);
        assert_eq!(
            partition_process(&me, 1, &heard, None),
            PartitionDecision::Adopt
        );
        let me = local(5, 128, 1);
        assert_eq!(
            partition_process(&me, 1, &leader(9, 64), None),
            PartitionDecision::Reject
        );
    }

    #[test]
    fn test_partition_id_tiebreak() {
        let me = local(5, 64, 3);
        assert_eq!(
            partition_process(&me, 3, &leader(6, 64), None),
            PartitionDecision::Adopt
        );
        assert_eq!(
            partition_process(&me, 3, &leader(4, 64), None),
            PartitionDecision::Reject
        );
        assert_eq!(
            partition_process(&me, 3, &leader(0xffff_fff0, 64), None),
            PartitionDecision::Adopt
        );
    }

    #[test]
    fn test_singleton_rules() {
        let singleton = local(100, 64, 1);
        assert_eq!(
            partition_process(&singleton, 0, &leader(1, 0), None),
            PartitionDecision::Adopt
        );
        assert_eq!(
            partition_process(&singleton, 4, &leader(1, 0), None),
            PartitionDecision::Adopt
        );
        let big = local(1, 0, 4);
        assert_eq!(
            partition_process(&big, 1, &leader(100, 255), None),
            PartitionDecision::Reject
        );
    }

    #[test]
    fn test_ccm_weighting_gate() {
        let mut me = local(1, 64, 5);
        me.ccm_target_weighting = Some(64);
        assert_eq!(
            partition_process(&me, 1, &leader(2, 80), None),
            PartitionDecision::Adopt
        );
        assert_eq!(
            partition_process(&me, 10, &leader(2, 32), None),
            PartitionDecision::Reject
        );
        assert_eq!(
            partition_process(&me, 5, &leader(2, 64), None),
            PartitionDecision::Adopt
        );
    }

    #[test]
    fn test_identical_inputs_same_decision() {
        let me = local(5, 64, 2);
        let heard = leader(5, 64);
        let r = route(1, &[0, 1]);
        let first = partition_process(&me, 2, &heard, Some(&r));
        for _ in 0..10 {
            assert_eq!(partition_process(&me, 2, &heard, Some(&r)), first);
        }
        assert_eq!(first, PartitionDecision::Reject);
    }

    #[test]
    fn test_previous_partition_suppressed() {
        let mut me = local(20, 64, 1);
        me.previous = Some(PreviousPartition {
            partition_id: 7,
            weighting: 1,
            id_sequence: 3,
        });
        let heard = leader(7, 1);
        let stale = route(3, &[0, 1, 2]);
        assert_eq!(
            leader_data_validation(&me, &heard, Some(&stale)),
            LeaderDataValidation::Reject
        );
        let advanced = route(4, &[0, 1, 2]);
        assert_eq!(
            leader_data_validation(&me, &heard, Some(&advanced)),
            LeaderDataValidation::Merge
        );
    }

    #[test]
    fn test_leader_data_validation_versions() {
        let mut me = local(5, 64, 3);
        let mut heard = leader(5, 64);
        assert_eq!(
            leader_data_validation(&me, &heard, None),
            LeaderDataValidation::SameOrOlder
        );
        heard.data_version = 11;
        assert_eq!(
            leader_data_validation(&me, &heard, None),
            LeaderDataValidation::NetworkDataUpdated
        );
        me.is_leader = true;
        assert_eq!(
            leader_data_validation(&me, &heard, None),
            LeaderDataValidation::ConflictingLeader
        );
        heard.data_version = 9;
        assert_eq!(
            leader_data_validation(&me, &heard, None),
            LeaderDataValidation::SameOrOlder
        );
    }

    #[test]
    fn test_adopted_versions_wrap() {
        let mut heard = leader(1, 64);
        heard.data_version = 0;
        let adopted = adopted_leader_data(&heard);
        assert_eq!(adopted.data_version, 255);
        assert_eq!(adopted.stable_data_version, 2);
        assert!(is_greater_u8(heard.data_version, adopted.data_version));
        assert!(partition_match(&adopted, &heard));
    }
}
