//! Top-level attach state machine.
//!
//! [`transition`] is a pure function of the current [`AttachState`], a
//! [`BootstrapContext`] snapshot and one [`BootstrapEvent`]. It returns the
//! next state and the [`BootstrapAction`]s the interface must carry out, in
//! order. Nothing here touches timers, tables or the transport.

use crate::event::{ConnectionError, RestartStrategy};
use crate::state::AttachState;
use serde::{Deserialize, Serialize};
use thread_wire::LeaderData;

/// Parent-request round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentRound {
    /// Only active routers answer
    Routers,
    /// Routers and REEDs answer
    RoutersAndReeds,
}

/// Facts about the interface the transitions depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapContext {
    /// May become router or leader
    pub router_eligible: bool,
    /// A persisted resync record exists
    pub has_resync: bool,
    /// Leader Data of a partition to reattach to is still held
    pub had_partition: bool,
    /// A better partition was heard and should be joined
    pub merge_target: Option<LeaderData>,
    /// Attaching on announced link parameters
    pub announce_active: bool,
}

/// Inputs of the attach state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapEvent {
    /// Interface brought up, or the orphan backoff elapsed
    Start,
    /// Start-up jitter elapsed
    ScanDone,
    /// Resynchronisation answered
    ResyncSucceeded {
        /// Resumed as router
        as_router: bool,
    },
    /// Resynchronisation not answered
    ResyncFailed,
    /// A parent-request window closed
    ParentWindowExpired {
        /// Round that closed
        round: ParentRound,
        /// A usable parent answered
        candidate_found: bool,
    },
    /// Child ID Response accepted
    ChildIdAccepted,
    /// Child ID Request unanswered
    ChildIdTimeout,
    /// Router selection found an upgrade worthwhile
    UpgradeAllowed,
    /// Router selection found a downgrade worthwhile
    DowngradeAllowed,
    /// Leader granted a router ID
    RouterIdGranted,
    /// Leader refused a router ID, or the request failed
    RouterIdDenied,
    /// A newer announce was heard
    AnnounceActive,
    /// A connection error was raised
    ConnectionError(ConnectionError),
}

/// Effects the interface carries out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapAction {
    /// Report the error to observers
    NotifyConnectionError(ConnectionError),
    /// Forget partition, neighbors, routes and router ID
    ResetState,
    /// Leave the current role without forgetting the partition
    Detach,
    /// Remember the partition being left for advertisement suppression
    RecordPreviousPartition,
    /// Restrict parent selection to this partition
    SetMergeTarget(LeaderData),
    /// Drop any merge restriction
    ClearMergeTarget,
    /// Keep the current router ID for the next request
    RememberRouterId,
    /// Give the router ID back to the leader
    ReleaseRouterId,
    /// Drop the persisted resync record
    ForgetResync,
    /// Queue a fresh `Start`
    Restart,
    /// Arm the start-up jitter
    StartScanTimer,
    /// Arm the orphan backoff
    StartOrphanBackoff,
    /// Send the resynchronisation request
    SendResync,
    /// Send a Parent Request and open its window
    SendParentRequest(ParentRound),
    /// Send a Child ID Request to the selected parent
    SendChildIdRequest,
    /// Form a singleton partition
    BecomeLeader,
    /// Take the child or REED role
    BecomeChild,
    /// Take the router role
    BecomeRouter,
    /// Ask the leader for a router ID
    RequestRouterId,
    /// Keep advertising as REED
    StartReedAdvertisement,
    /// Switch to the announced channel and PAN
    ApplyAnnounce,
    /// Switch back to the channel and PAN before the announce
    RestoreLinkParams,
    /// Drop queued Child ID Requests
    ClearPendingChildIds,
}

use BootstrapAction as A;

/// First parent-request state after a scan
fn attach_state(ctx: &BootstrapContext) -> AttachState {
    if ctx.merge_target.is_some() {
        AttachState::PartitionMerge
    } else if ctx.had_partition {
        AttachState::Reattach
    } else {
        AttachState::AttachAny
    }
}

fn exhausted(ctx: &BootstrapContext, state: AttachState) -> (AttachState, Vec<BootstrapAction>) {
    match state {
        AttachState::Reattach => (
            AttachState::ReattachRetry,
            vec![A::SendParentRequest(ParentRound::Routers)],
        ),
        AttachState::PartitionMerge => (
            AttachState::AttachAny,
            vec![A::ClearMergeTarget, A::SendParentRequest(ParentRound::Routers)],
        ),
        _ if ctx.announce_active => (
            AttachState::Reattach,
            vec![A::RestoreLinkParams, A::SendParentRequest(ParentRound::Routers)],
        ),
        _ if ctx.router_eligible => (AttachState::ConnectedRouter, vec![A::BecomeLeader]),
        _ => {
            let error = ConnectionError::NoThreadNetworkAvailable;
            (
                AttachState::NetworkDiscover,
                vec![A::NotifyConnectionError(error), A::StartOrphanBackoff],
            )
        }
    }
}

fn connection_error(error: ConnectionError) -> (AttachState, Vec<BootstrapAction>) {
    let notify = A::NotifyConnectionError(error);
    match error.restart_strategy() {
        RestartStrategy::FullReset => (
            AttachState::NetworkDiscover,
            vec![notify, A::ClearPendingChildIds, A::ResetState, A::Restart],
        ),
        RestartStrategy::TargetedReattach => {
            let target = match error {
                ConnectionError::PartitionMerge { leader_data } => Some(leader_data),
                _ => None,
            };
            let mut actions = vec![
                notify,
                A::ClearPendingChildIds,
                A::RecordPreviousPartition,
                A::RememberRouterId,
                A::Detach,
            ];
            if let Some(target) = target {
                actions.push(A::SetMergeTarget(target));
            }
            actions.push(A::SendParentRequest(ParentRound::Routers));
            (AttachState::PartitionMerge, actions)
        }
        RestartStrategy::DowngradeAndRetry => (
            AttachState::Reattach,
            vec![
                notify,
                A::ClearPendingChildIds,
                A::ReleaseRouterId,
                A::Detach,
                A::SendParentRequest(ParentRound::Routers),
            ],
        ),
        RestartStrategy::OrphanScan => (
            AttachState::NetworkDiscover,
            vec![notify, A::ClearPendingChildIds, A::Detach, A::StartOrphanBackoff],
        ),
    }
}

/// Next state and actions for `event` in `state`. Events that do not apply
/// to `state` leave it unchanged with no actions.
pub fn transition(
    ctx: &BootstrapContext,
    state: AttachState,
    event: BootstrapEvent,
) -> (AttachState, Vec<BootstrapAction>) {
    use AttachState as S;
    use BootstrapEvent as E;

    match (state, event) {
        (_, E::ConnectionError(error)) => connection_error(error),

        (S::NetworkDiscover, E::Start) => (S::Scan, vec![A::StartScanTimer]),

        (S::Scan, E::ScanDone) if ctx.has_resync => (S::MleSynch, vec![A::SendResync]),
        (S::Scan, E::ScanDone) => (
            attach_state(ctx),
            vec![A::SendParentRequest(ParentRound::Routers)],
        ),

        (S::MleSynch, E::ResyncSucceeded { as_router: true }) => {
            (S::ConnectedRouter, vec![A::BecomeRouter])
        }
        (S::MleSynch, E::ResyncSucceeded { as_router: false }) => {
            (S::Connected, vec![A::BecomeChild])
        }
        (S::MleSynch, E::ResyncFailed) => (S::Scan, vec![A::ForgetResync, A::StartScanTimer]),

        (s, E::ParentWindowExpired { round, candidate_found }) if s.is_parent_request() => {
            if candidate_found {
                (S::ChildIdRequest, vec![A::SendChildIdRequest])
            } else if round == ParentRound::Routers {
                (s, vec![A::SendParentRequest(ParentRound::RoutersAndReeds)])
            } else {
                exhausted(ctx, s)
            }
        }

        (S::ChildIdRequest, E::ChildIdAccepted) => (S::Connected, vec![A::BecomeChild]),
        (S::ChildIdRequest, E::ChildIdTimeout) => (
            attach_state(ctx),
            vec![A::SendParentRequest(ParentRound::Routers)],
        ),

        (S::Connected, E::UpgradeAllowed) if ctx.router_eligible => {
            (S::Connected, vec![A::RequestRouterId])
        }
        (S::Connected, E::RouterIdGranted) => (S::ConnectedRouter, vec![A::BecomeRouter]),
        (S::Connected, E::RouterIdDenied) => (S::Connected, vec![A::StartReedAdvertisement]),

        (S::ConnectedRouter, E::DowngradeAllowed) => {
            connection_error(ConnectionError::NetworkReattach)
        }

        (S::Connected | S::ConnectedRouter, E::AnnounceActive) => (
            S::AttachAny,
            vec![
                A::ClearPendingChildIds,
                A::RememberRouterId,
                A::Detach,
                A::ApplyAnnounce,
                A::SendParentRequest(ParentRound::Routers),
            ],
        ),

        (s, _) => (s, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BootstrapContext {
        BootstrapContext {
            router_eligible: true,
            ..BootstrapContext::default()
        }
    }

    fn leader_data() -> LeaderData {
        LeaderData {
            partition_id: 9,
            weighting: 64,
            data_version: 1,
            stable_data_version: 1,
            leader_router_id: 3,
        }
    }

    #[test]
    fn test_attach_any_to_child() {
        let c = ctx();
        let (s, a) = transition(&c, AttachState::NetworkDiscover, BootstrapEvent::Start);
        assert_eq!(s, AttachState::Scan);
        assert_eq!(a, vec![A::StartScanTimer]);

        let (s, a) = transition(&c, s, BootstrapEvent::ScanDone);
        assert_eq!(s, AttachState::AttachAny);
        assert_eq!(a, vec![A::SendParentRequest(ParentRound::Routers)]);

        let (s, a) = transition(
            &c,
            s,
            BootstrapEvent::ParentWindowExpired {
                round: ParentRound::Routers,
                candidate_found: false,
            },
        );
        assert_eq!(s, AttachState::AttachAny);
        assert_eq!(a, vec![A::SendParentRequest(ParentRound::RoutersAndReeds)]);

        let (s, a) = transition(
            &c,
            s,
            BootstrapEvent::ParentWindowExpired {
                round: ParentRound::RoutersAndReeds,
                candidate_found: true,
            },
        );
        assert_eq!(s, AttachState::ChildIdRequest);
        assert_eq!(a, vec![A::SendChildIdRequest]);

        let (s, a) = transition(&c, s, BootstrapEvent::ChildIdAccepted);
        assert_eq!(s, AttachState::Connected);
        assert_eq!(a, vec![A::BecomeChild]);
    }

    #[test]
    fn test_exhausted_rounds() {
        let expire = BootstrapEvent::ParentWindowExpired {
            round: ParentRound::RoutersAndReeds,
            candidate_found: false,
        };
        let (s, a) = transition(&ctx(), AttachState::AttachAny, expire);
        assert_eq!(s, AttachState::ConnectedRouter);
        assert_eq!(a, vec![A::BecomeLeader]);

        let end_device = BootstrapContext::default();
        let (s, a) = transition(&end_device, AttachState::AttachAny, expire);
        assert_eq!(s, AttachState::NetworkDiscover);
        assert!(a.contains(&A::NotifyConnectionError(
            ConnectionError::NoThreadNetworkAvailable
        )));
        assert!(a.contains(&A::StartOrphanBackoff));

        let (s, _) = transition(&ctx(), AttachState::Reattach, expire);
        assert_eq!(s, AttachState::ReattachRetry);
        let (s, _) = transition(&ctx(), s, expire);
        assert_eq!(s, AttachState::ConnectedRouter);

        let (s, a) = transition(&ctx(), AttachState::PartitionMerge, expire);
        assert_eq!(s, AttachState::AttachAny);
        assert_eq!(a[0], A::ClearMergeTarget);
    }

    #[test]
    fn test_scan_branches() {
        let resync = BootstrapContext {
            has_resync: true,
            ..ctx()
        };
        let (s, a) = transition(&resync, AttachState::Scan, BootstrapEvent::ScanDone);
        assert_eq!(s, AttachState::MleSynch);
        assert_eq!(a, vec![A::SendResync]);

        let (s, a) = transition(&resync, s, BootstrapEvent::ResyncFailed);
        assert_eq!(s, AttachState::Scan);
        assert_eq!(a, vec![A::ForgetResync, A::StartScanTimer]);

        let (s, _) = transition(
            &resync,
            AttachState::MleSynch,
            BootstrapEvent::ResyncSucceeded { as_router: true },
        );
        assert_eq!(s, AttachState::ConnectedRouter);

        let merge = BootstrapContext {
            merge_target: Some(leader_data()),
            had_partition: true,
            ..ctx()
        };
        let (s, _) = transition(&merge, AttachState::Scan, BootstrapEvent::ScanDone);
        assert_eq!(s, AttachState::PartitionMerge);

        let reattach = BootstrapContext {
            had_partition: true,
            ..ctx()
        };
        let (s, _) = transition(&reattach, AttachState::Scan, BootstrapEvent::ScanDone);
        assert_eq!(s, AttachState::Reattach);
    }

    #[test]
    fn test_connection_error_restart_map() {
        for error in [
            ConnectionError::ParentConnectDown,
            ConnectionError::NetworkKick,
            ConnectionError::LeaderConflict,
        ] {
            let (s, a) = transition(&ctx(), AttachState::ConnectedRouter, BootstrapEvent::ConnectionError(error));
            assert_eq!(s, AttachState::NetworkDiscover);
            assert!(a.contains(&A::ResetState));
            assert!(a.contains(&A::Restart));
        }

        let merge = ConnectionError::PartitionMerge {
            leader_data: leader_data(),
        };
        let (s, a) = transition(&ctx(), AttachState::ConnectedRouter, BootstrapEvent::ConnectionError(merge));
        assert_eq!(s, AttachState::PartitionMerge);
        assert!(a.contains(&A::RecordPreviousPartition));
        assert!(a.contains(&A::RememberRouterId));
        assert!(a.contains(&A::SetMergeTarget(leader_data())));
        assert!(!a.contains(&A::ResetState));

        let (s, a) = transition(
            &ctx(),
            AttachState::ConnectedRouter,
            BootstrapEvent::ConnectionError(ConnectionError::NetworkReattach),
        );
        assert_eq!(s, AttachState::Reattach);
        assert!(a.contains(&A::ReleaseRouterId));

        let (s, a) = transition(
            &ctx(),
            AttachState::Connected,
            BootstrapEvent::ConnectionError(ConnectionError::NoThreadNetworkAvailable),
        );
        assert_eq!(s, AttachState::NetworkDiscover);
        assert!(a.contains(&A::StartOrphanBackoff));
    }

    #[test]
    fn test_router_upgrade_and_downgrade() {
        let (s, a) = transition(&ctx(), AttachState::Connected, BootstrapEvent::UpgradeAllowed);
        assert_eq!(s, AttachState::Connected);
        assert_eq!(a, vec![A::RequestRouterId]);

        let (s, a) = transition(&ctx(), AttachState::Connected, BootstrapEvent::RouterIdDenied);
        assert_eq!(s, AttachState::Connected);
        assert_eq!(a, vec![A::StartReedAdvertisement]);

        let (s, _) = transition(&ctx(), AttachState::Connected, BootstrapEvent::RouterIdGranted);
        assert_eq!(s, AttachState::ConnectedRouter);

        let (s, a) = transition(&ctx(), AttachState::ConnectedRouter, BootstrapEvent::DowngradeAllowed);
        assert_eq!(s, AttachState::Reattach);
        assert!(a.contains(&A::ReleaseRouterId));
    }

    #[test]
    fn test_announce_and_restore() {
        let (s, a) = transition(&ctx(), AttachState::Connected, BootstrapEvent::AnnounceActive);
        assert_eq!(s, AttachState::AttachAny);
        assert!(a.contains(&A::ApplyAnnounce));

        let announcing = BootstrapContext {
            announce_active: true,
            ..ctx()
        };
        let (s, a) = transition(
            &announcing,
            AttachState::AttachAny,
            BootstrapEvent::ParentWindowExpired {
                round: ParentRound::RoutersAndReeds,
                candidate_found: false,
            },
        );
        assert_eq!(s, AttachState::Reattach);
        assert_eq!(a[0], A::RestoreLinkParams);
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let (s, a) = transition(&ctx(), AttachState::Scan, BootstrapEvent::ChildIdAccepted);
        assert_eq!(s, AttachState::Scan);
        assert!(a.is_empty());
        let (s, a) = transition(&ctx(), AttachState::ConnectedRouter, BootstrapEvent::Start);
        assert_eq!(s, AttachState::ConnectedRouter);
        assert!(a.is_empty());
    }
}
