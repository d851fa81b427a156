use super::*;
use crate::builder;
use crate::event::{RouterIdResponse, RxInfo};
use crate::state::ChallengePurpose;
use crate::testing::{RecordingIpv6, RecordingManagement, RecordingMle};
use thread_wire::{
    rloc16_from_router_id, tlv, BorderRouterEntry, BorderRouterFlags, Channel, DeviceMode,
    MleCommand, MleMessage, Route64, RouteEntry, ScanMask, TlvType,
};

type TestInterface = ThreadInterface<RecordingMle, RecordingIpv6, RecordingManagement>;

fn mac(n: u8) -> [u8; 8] {
    [0x02, 0, 0, 0, 0, 0, 0, n]
}

fn node(n: u8, router_eligible: bool) -> TestInterface {
    let config = ThreadConfig {
        eui64: mac(n),
        router_eligible,
        rng_seed: Some(n as u64),
        ..ThreadConfig::default()
    };
    ThreadInterface::new(
        config,
        RecordingMle::default(),
        RecordingIpv6::default(),
        RecordingManagement::default(),
    )
    .unwrap()
}

fn leader_data(partition_id: u32, weighting: u8, leader_router_id: u8) -> LeaderData {
    LeaderData {
        partition_id,
        weighting,
        data_version: 10,
        stable_data_version: 3,
        leader_router_id,
    }
}

/// Put `iface` in a partition as router `own` with `others` allocated
fn make_router(iface: &mut TestInterface, ld: LeaderData, own: u8, others: &[u8]) {
    iface.leader_data = Some(ld);
    for id in std::iter::once(own).chain(others.iter().copied()) {
        iface.routers.allocate(Some(id)).unwrap();
    }
    iface.routers.set_local_router_id(Some(own));
    iface.set_rloc16(rloc16_from_router_id(own));
    iface.state = AttachState::ConnectedRouter;
    iface.role = if ld.leader_router_id == own {
        DeviceRole::Leader
    } else {
        DeviceRole::Router
    };
}

fn receive(iface: &mut TestInterface, from: u8, built: Result<MessageBuilder, WireError>) {
    let message = built
        .unwrap()
        .security(SecurityHeader::mle(0, 1))
        .build();
    deliver(iface, from, message);
}

fn deliver(iface: &mut TestInterface, from: u8, message: MleMessage) {
    let rx = RxInfo {
        source: link_local_from_mac64(&mac(from)),
        destination: LINK_LOCAL_ALL_NODES,
        rssi: -50,
        link_frame_counter: 0,
    };
    iface.handle_event(Event::MleReceived { rx, message });
}

/// Hand the last `command` sent by `from` to `to`
fn relay(from: &TestInterface, from_n: u8, to: &mut TestInterface, command: MleCommand) {
    let message = from
        .mle
        .sent_of(command)
        .last()
        .map(|m| m.message.clone())
        .unwrap();
    deliver(to, from_n, message);
}

fn connection_errors(notifications: &[Notification]) -> Vec<ConnectionError> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::ConnectionError(e) => Some(*e),
            _ => None,
        })
        .collect()
}

fn route_with(sequence: u8, entries: &[RouteEntry]) -> Route64 {
    let mut route = Route64::new(sequence);
    for entry in entries {
        route.push(*entry);
    }
    route
}

/// Known router neighbor `n` holding `router_id`
fn add_router_neighbor(iface: &mut TestInterface, n: u8, router_id: u8) -> NeighborIndex {
    let (index, _) = iface.neighbors.allocate_or_get(mac(n), true).unwrap();
    let entry = iface.neighbors.get_mut(index).unwrap();
    entry.mac16 = rloc16_from_router_id(router_id);
    entry.set_mode(DeviceMode::router());
    entry.connected_device = true;
    iface.neighbors.refresh(index, 100, 0);
    index
}

fn served_prefix(first: u8, stable: bool, rloc16: u16) -> PrefixEntry {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&[0xfd, first, 0, 0, 0, 0, 0, 1]);
    let mut prefix = PrefixEntry::new(bytes, 64, stable);
    prefix.border_routers.push(BorderRouterEntry {
        rloc16,
        flags: BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
        stable,
    });
    prefix
}

fn form_partition(iface: &mut TestInterface) {
    iface.handle_event(Event::Start);
    iface.handle_event(Event::Tick { now_ms: 300 });
    iface.handle_event(Event::Tick { now_ms: 1100 });
    iface.handle_event(Event::Tick { now_ms: 2400 });
}

#[test]
fn test_lone_router_forms_partition() {
    let mut a = node(1, true);
    form_partition(&mut a);

    assert_eq!(a.state(), AttachState::ConnectedRouter);
    assert_eq!(a.role(), DeviceRole::Leader);
    assert!(is_router_rloc16(a.rloc16()));
    let ld = *a.leader_data().unwrap();
    assert_eq!(rloc16_from_router_id(ld.leader_router_id), a.rloc16());
    assert_eq!(a.mle().sent_of(MleCommand::ParentRequest).len(), 2);
    assert!(a
        .take_notifications()
        .iter()
        .any(|n| matches!(n, Notification::PartitionChanged { .. })));
}

#[test]
fn test_end_device_attaches_to_leader() {
    let mut leader = node(1, true);
    form_partition(&mut leader);
    let mut child = node(2, false);

    child.handle_event(Event::Start);
    child.handle_event(Event::Tick { now_ms: 300 });
    assert_eq!(child.state(), AttachState::AttachAny);
    relay(&child, 2, &mut leader, MleCommand::ParentRequest);
    relay(&leader, 1, &mut child, MleCommand::ParentResponse);

    child.handle_event(Event::Tick { now_ms: 1100 });
    assert_eq!(child.state(), AttachState::ChildIdRequest);
    relay(&child, 2, &mut leader, MleCommand::ChildIdRequest);
    assert_eq!(leader.child_count(), 1);
    relay(&leader, 1, &mut child, MleCommand::ChildIdResponse);

    assert_eq!(child.state(), AttachState::Connected);
    assert_eq!(child.role(), DeviceRole::Child);
    assert_eq!(child.parent().unwrap().rloc16, leader.rloc16());
    assert_eq!(child.rloc16() & 0xfc00, leader.rloc16());
    assert_ne!(child.rloc16() & 0x01ff, 0);
    assert_eq!(
        child.leader_data().unwrap().partition_id,
        leader.leader_data().unwrap().partition_id
    );
}

#[test]
fn test_same_partition_advertisement_refreshes_router() {
    let ld = leader_data(5, 64, 2);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2, 5]);

    let (index, _) = a.neighbors.allocate_or_get(mac(2), true).unwrap();
    a.neighbors.get_mut(index).unwrap().mac16 = rloc16_from_router_id(2);
    a.neighbors.refresh(index, 100, 0);
    a.neighbors.get_mut(index).unwrap().lifetime_remaining = 10;
    let neighbors_before = a.neighbors.len();

    let route = route_with(
        a.routers.id_sequence(),
        &[
            RouteEntry {
                router_id: 0,
                link_quality_out: 3,
                link_quality_in: 3,
                route_cost: 1,
            },
            RouteEntry {
                router_id: 2,
                link_quality_out: 0,
                link_quality_in: 0,
                route_cost: 1,
            },
            RouteEntry {
                router_id: 5,
                link_quality_out: 0,
                link_quality_in: 0,
                route_cost: 2,
            },
        ],
    );
    receive(
        &mut a,
        2,
        builder::advertisement(rloc16_from_router_id(2), &ld, Some(&route)),
    );

    assert_eq!(a.neighbors.len(), neighbors_before);
    assert_eq!(a.neighbors.find_by_mac64(&mac(2)), Some(index));
    let entry = a.neighbors.get(index).unwrap();
    assert_eq!(entry.lifetime_remaining, a.config.router_link_lifetime_secs);
    assert!(a.mle.sent_of(MleCommand::LinkRequest).is_empty());

    let b = a.routers.get(2).unwrap();
    assert_eq!(b.link_quality_in, 3);
    assert_eq!(b.link_quality_out, 3);
    let far = a.routers.get(5).unwrap();
    assert_eq!(far.next_hop, Some(2));
    assert_eq!(far.route_cost, 3);

    assert!(connection_errors(&a.take_notifications()).is_empty());
    assert_eq!(a.state(), AttachState::ConnectedRouter);
}

#[test]
fn test_heavier_partition_triggers_single_merge() {
    let own = leader_data(5, 64, 0);
    let mut a = node(1, true);
    make_router(&mut a, own, 0, &[]);

    let heard = leader_data(9, 128, 1);
    let route = route_with(
        7,
        &[
            RouteEntry {
                router_id: 1,
                link_quality_out: 0,
                link_quality_in: 0,
                route_cost: 1,
            },
            RouteEntry {
                router_id: 4,
                link_quality_out: 0,
                link_quality_in: 0,
                route_cost: 1,
            },
        ],
    );
    receive(
        &mut a,
        2,
        builder::advertisement(rloc16_from_router_id(1), &heard, Some(&route)),
    );

    let errors = connection_errors(&a.take_notifications());
    assert_eq!(
        errors,
        vec![ConnectionError::PartitionMerge { leader_data: heard }]
    );
    assert_eq!(a.leader_data(), Some(&own));
    assert_eq!(a.state(), AttachState::PartitionMerge);
    assert_eq!(a.merge_target, Some(heard));
    assert_eq!(a.mle.sent_of(MleCommand::ParentRequest).len(), 1);
}

#[test]
fn test_child_id_request_rejected_when_full() {
    let mut a = node(1, true);
    a.config.max_child_count = 1;
    a.child_ids = ChildIdAllocator::new(1, 511, 1);
    make_router(&mut a, leader_data(5, 64, 0), 0, &[]);

    let mode = DeviceMode::RX_ON_IDLE | DeviceMode::SECURE_DATA_REQUESTS;
    for requester in [2u8, 3] {
        receive(
            &mut a,
            requester,
            builder::parent_request(mode, &[requester; 8], ScanMask::ROUTERS),
        );
    }
    let responses: Vec<(Ipv6Addr, Vec<u8>)> = a
        .mle
        .sent_of(MleCommand::ParentResponse)
        .iter()
        .map(|m| {
            let challenge = tlv::find(&m.message.payload, TlvType::Challenge).unwrap();
            (m.destination, challenge.to_vec())
        })
        .collect();
    assert_eq!(responses.len(), 2);

    for (requester, (destination, challenge)) in [2u8, 3].into_iter().zip(&responses) {
        assert_eq!(*destination, link_local_from_mac64(&mac(requester)));
        receive(
            &mut a,
            requester,
            builder::child_id_request(&builder::ChildIdRequest {
                response: challenge,
                link_frame_counter: 0,
                mle_frame_counter: 0,
                mode,
                timeout_secs: 240,
                addresses: &[],
                timestamps: builder::DatasetTimestamps::default(),
            }),
        );
    }

    assert_eq!(a.child_count(), 1);
    assert_eq!(a.mle.sent_of(MleCommand::ChildIdResponse).len(), 1);
    let rejects = a.mle.sent_of(MleCommand::LinkReject);
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].destination, link_local_from_mac64(&mac(3)));
    assert!(a.neighbors.find_by_mac64(&mac(3)).is_none());
    assert!(a.neighbors.find_by_mac64(&mac(2)).is_some());
}

#[test]
fn test_left_partition_readvertisement_suppressed() {
    let mut a = node(1, true);
    let current = leader_data(9, 64, 0);
    make_router(&mut a, current, 0, &[]);
    let left = leader_data(7, 1, 1);
    a.previous_partition = Some(PreviousPartition::from_leader_data(&left, 3));

    let entries = [1u8, 2, 3].map(|router_id| RouteEntry {
        router_id,
        link_quality_out: 0,
        link_quality_in: 0,
        route_cost: 1,
    });
    receive(
        &mut a,
        2,
        builder::advertisement(rloc16_from_router_id(1), &left, Some(&route_with(3, &entries))),
    );
    assert!(connection_errors(&a.take_notifications()).is_empty());
    assert_eq!(a.leader_data(), Some(&current));
    assert_eq!(a.state(), AttachState::ConnectedRouter);

    // a moved sequence means the partition is alive again
    receive(
        &mut a,
        2,
        builder::advertisement(rloc16_from_router_id(1), &left, Some(&route_with(4, &entries))),
    );
    assert_eq!(
        connection_errors(&a.take_notifications()),
        vec![ConnectionError::PartitionMerge { leader_data: left }]
    );
}

#[test]
fn test_leader_assigns_router_ids_and_network_data() {
    let mut a = node(1, true);
    form_partition(&mut a);
    let before = *a.leader_data().unwrap();

    a.handle_event(Event::RouterIdRequest {
        requester: mac(2),
        requested: Some(7),
    });
    match &a.management().replies[0].1 {
        RouterIdResponse::Granted {
            router_id, route, ..
        } => {
            assert_eq!(*router_id, 7);
            assert!(route.is_allocated(7));
        }
        other => panic!("unexpected reply {:?}", other),
    }

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 1]);
    let mut prefix = PrefixEntry::new(bytes, 64, true);
    prefix.border_routers.push(thread_wire::BorderRouterEntry {
        rloc16: rloc16_from_router_id(7),
        flags: thread_wire::BorderRouterFlags::ON_MESH | thread_wire::BorderRouterFlags::SLAAC,
        stable: true,
    });
    a.handle_event(Event::NetworkDataRegistration {
        rloc16: rloc16_from_router_id(7),
        prefixes: vec![prefix],
    });
    let after = *a.leader_data().unwrap();
    assert_eq!(after.data_version, before.data_version.wrapping_add(1));
    assert_eq!(after.stable_data_version, before.stable_data_version.wrapping_add(1));
    assert_eq!(a.network_data().prefixes().len(), 1);
    assert_eq!(a.derived().addresses.len(), 1);
    assert!(!a.mle.sent_of(MleCommand::DataResponse).is_empty());

    a.handle_event(Event::RouterIdRelease { router_id: 7 });
    assert!(a.network_data().is_empty());
    assert!(!a.routers().is_allocated(7));
}

#[test]
fn test_parent_loss_restarts_discovery() {
    let mut leader = node(1, true);
    form_partition(&mut leader);
    let mut child = node(2, false);
    child.handle_event(Event::Start);
    child.handle_event(Event::Tick { now_ms: 300 });
    relay(&child, 2, &mut leader, MleCommand::ParentRequest);
    relay(&leader, 1, &mut child, MleCommand::ParentResponse);
    child.handle_event(Event::Tick { now_ms: 1100 });
    relay(&child, 2, &mut leader, MleCommand::ChildIdRequest);
    relay(&leader, 1, &mut child, MleCommand::ChildIdResponse);
    assert_eq!(child.state(), AttachState::Connected);
    child.take_notifications();

    child.handle_event(Event::Tick {
        now_ms: 1100 + 240 * 1000 + 1000,
    });
    let errors = connection_errors(&child.take_notifications());
    assert_eq!(errors, vec![ConnectionError::ParentConnectDown]);
    assert_eq!(child.role(), DeviceRole::Detached);
    assert!(child.parent().is_none());
    assert!(child.leader_data().is_none());
}

#[test]
fn test_unmatched_challenge_ignored() {
    let mut a = node(1, true);
    form_partition(&mut a);
    a.challenges
        .record([9; 8], Some(mac(4)), ChallengePurpose::ParentResponse, 10_000);
    let mode = DeviceMode::RX_ON_IDLE;
    receive(
        &mut a,
        3,
        builder::child_id_request(&builder::ChildIdRequest {
            response: &[9; 8],
            link_frame_counter: 0,
            mle_frame_counter: 0,
            mode,
            timeout_secs: 240,
            addresses: &[],
            timestamps: builder::DatasetTimestamps::default(),
        }),
    );
    assert_eq!(a.child_count(), 0);
    assert!(a.mle.sent_of(MleCommand::ChildIdResponse).is_empty());
}

#[test]
fn test_link_request_refreshes_neighbor_lifetime() {
    let ld = leader_data(5, 64, 0);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2, 3]);
    let lifetime = a.config.router_link_lifetime_secs;

    let b = add_router_neighbor(&mut a, 2, 2);
    a.neighbors.refresh(b, 10, 0);
    receive(
        &mut a,
        2,
        builder::link_request(Some(rloc16_from_router_id(2)), Some(&ld), &[7; 8], true),
    );
    let entry = a.neighbors.get(b).unwrap();
    assert_eq!(entry.link_lifetime, lifetime);
    assert_eq!(entry.lifetime_remaining, lifetime);

    receive(
        &mut a,
        3,
        builder::link_request(Some(rloc16_from_router_id(3)), Some(&ld), &[8; 8], true),
    );
    let c = a.neighbors.find_by_mac64(&mac(3)).unwrap();
    assert_eq!(a.neighbors.get(c).unwrap().link_lifetime, lifetime);
    assert_eq!(a.mle.sent_of(MleCommand::LinkAcceptAndRequest).len(), 1);

    a.handle_event(Event::Tick { now_ms: 1000 });
    assert_eq!(a.neighbors.get(c).unwrap().lifetime_remaining, lifetime - 1);
    assert_eq!(a.neighbors.get(b).unwrap().lifetime_remaining, lifetime - 1);
    assert!(a.mle.removed_devices.is_empty());
}

#[test]
fn test_data_exchange_refreshes_neighbor_lifetime() {
    let ld = leader_data(5, 64, 2);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    let b = add_router_neighbor(&mut a, 2, 2);

    a.neighbors.get_mut(b).unwrap().lifetime_remaining = 10;
    receive(
        &mut a,
        2,
        builder::data_request(&[TlvType::NetworkData], DatasetTimestamps::default()),
    );
    assert_eq!(a.neighbors.get(b).unwrap().lifetime_remaining, 100);
    let responses = a.mle.sent_of(MleCommand::DataResponse);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].destination, link_local_from_mac64(&mac(2)));

    a.neighbors.get_mut(b).unwrap().lifetime_remaining = 10;
    let same = a.network_data().clone();
    receive(
        &mut a,
        2,
        builder::data_response(
            rloc16_from_router_id(2),
            &ld,
            &same,
            DatasetTimestamps::default(),
        ),
    );
    assert_eq!(a.neighbors.get(b).unwrap().lifetime_remaining, 100);
}

#[test]
fn test_data_response_acceptance() {
    let ld = leader_data(5, 64, 2);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    add_router_neighbor(&mut a, 2, 2);
    let leader = rloc16_from_router_id(2);
    let one = NetworkData::from_prefixes(&[served_prefix(1, true, leader)]).unwrap();

    // same versions and nothing asked for
    receive(
        &mut a,
        2,
        builder::data_response(leader, &ld, &one, DatasetTimestamps::default()),
    );
    assert!(a.network_data().is_empty());
    assert!(a.mle.sent_of(MleCommand::DataResponse).is_empty());

    a.network_data_requested = true;
    receive(
        &mut a,
        2,
        builder::data_response(leader, &ld, &one, DatasetTimestamps::default()),
    );
    assert_eq!(a.network_data(), &one);
    assert!(!a.network_data_requested);
    let propagated = a.mle.sent_of(MleCommand::DataResponse);
    assert_eq!(propagated.len(), 1);
    assert_eq!(propagated[0].destination, LINK_LOCAL_ALL_NODES);

    let newer = LeaderData {
        data_version: 11,
        ..ld
    };
    let two = NetworkData::from_prefixes(&[
        served_prefix(1, true, leader),
        served_prefix(2, false, leader),
    ])
    .unwrap();
    receive(
        &mut a,
        2,
        builder::data_response(leader, &newer, &two, DatasetTimestamps::default()),
    );
    assert_eq!(a.network_data(), &two);
    assert_eq!(a.leader_data().unwrap().data_version, 11);
    assert_eq!(a.network_data().prefixes().len(), 2);
}

#[test]
fn test_data_response_from_stranger_ignored() {
    let ld = leader_data(5, 64, 2);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    let newer = LeaderData {
        data_version: 11,
        ..ld
    };
    let nd = NetworkData::from_prefixes(&[served_prefix(1, true, 0x0800)]).unwrap();
    receive(
        &mut a,
        4,
        builder::data_response(0x0800, &newer, &nd, DatasetTimestamps::default()),
    );
    assert!(a.network_data().is_empty());
    assert_eq!(a.leader_data(), Some(&ld));
}

#[test]
fn test_leader_hearing_newer_data_resets() {
    let ld = leader_data(5, 64, 0);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    add_router_neighbor(&mut a, 2, 2);

    let newer = LeaderData {
        data_version: 11,
        ..ld
    };
    let nd = NetworkData::from_prefixes(&[served_prefix(1, true, 0x0800)]).unwrap();
    receive(
        &mut a,
        2,
        builder::data_response(0x0800, &newer, &nd, DatasetTimestamps::default()),
    );

    assert_eq!(
        connection_errors(&a.take_notifications()),
        vec![ConnectionError::LeaderConflict]
    );
    assert!(a.leader_data().is_none());
    assert!(a.network_data().is_empty());
    assert_eq!(a.role(), DeviceRole::Detached);
    assert!(a.neighbors.find_by_mac64(&mac(2)).is_none());
}

#[test]
fn test_pending_timestamp_followed() {
    let ld = leader_data(5, 64, 2);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    add_router_neighbor(&mut a, 2, 2);
    let timestamps = DatasetTimestamps {
        active: None,
        pending: Some(Timestamp::new(20, 0)),
    };
    let nd = a.network_data().clone();
    let leader = rloc16_from_router_id(2);

    receive(&mut a, 2, builder::data_response(leader, &ld, &nd, timestamps));
    assert_eq!(a.pending_timestamp(), None);
    let requests = a.mle.sent_of(MleCommand::DataRequest);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].destination, link_local_from_mac64(&mac(2)));
    let wanted = tlv::find(&requests[0].message.payload, TlvType::TlvRequest).unwrap();
    assert!(wanted.contains(&(TlvType::PendingDataset as u8)));
    assert!(!wanted.contains(&(TlvType::ActiveDataset as u8)));

    receive(&mut a, 2, builder::data_response(leader, &ld, &nd, timestamps));
    assert_eq!(a.pending_timestamp(), Some(Timestamp::new(20, 0)));
    assert_eq!(a.mle.sent_of(MleCommand::DataRequest).len(), 1);
}

#[test]
fn test_older_announce_answered_on_its_channel() {
    let mut a = node(1, true);
    make_router(&mut a, leader_data(5, 64, 0), 0, &[]);
    a.active_timestamp = Some(Timestamp::new(10, 0));

    receive(&mut a, 2, builder::announce(15, 0x1234, Timestamp::new(5, 0)));

    let announces = a.mle.sent_of(MleCommand::Announce);
    assert_eq!(announces.len(), 1);
    assert_eq!(announces[0].channel, Some(15));
    assert_eq!(announces[0].destination, LINK_LOCAL_ALL_NODES);
    let payload = &announces[0].message.payload;
    assert_eq!(Channel::read(payload).unwrap().channel, a.channel());
    assert_eq!(
        Timestamp::read(payload, TlvType::ActiveTimestamp),
        Some(Timestamp::new(10, 0))
    );
    assert_eq!(a.state(), AttachState::ConnectedRouter);
}

#[test]
fn test_newer_announce_moves_then_restores() {
    let mut a = node(1, true);
    make_router(&mut a, leader_data(5, 64, 0), 0, &[]);
    a.active_timestamp = Some(Timestamp::new(10, 0));
    let (channel, pan_id) = (a.channel(), a.pan_id());

    receive(&mut a, 2, builder::announce(15, 0x1234, Timestamp::new(20, 0)));
    assert_eq!(a.state(), AttachState::AttachAny);
    assert_eq!(a.role(), DeviceRole::Detached);
    assert_eq!((a.channel(), a.pan_id()), (15, 0x1234));
    assert_eq!(a.mle.link_params, Some((15, 0x1234)));
    assert_eq!(a.mle.sent_of(MleCommand::ParentRequest).len(), 1);

    a.handle_event(Event::Tick { now_ms: 800 });
    assert_eq!(a.mle.sent_of(MleCommand::ParentRequest).len(), 2);
    a.handle_event(Event::Tick { now_ms: 2100 });

    assert_eq!(a.state(), AttachState::Reattach);
    assert_eq!((a.channel(), a.pan_id()), (channel, pan_id));
    assert_eq!(a.mle.link_params, Some((channel, pan_id)));
    assert!(a.announce.is_none());
    assert_eq!(a.active_timestamp(), Some(Timestamp::new(10, 0)));
    assert_eq!(a.mle.sent_of(MleCommand::ParentRequest).len(), 3);
}

#[test]
fn test_newer_announce_same_network_adopts_timestamp() {
    let mut a = node(1, true);
    make_router(&mut a, leader_data(5, 64, 0), 0, &[]);
    a.active_timestamp = Some(Timestamp::new(10, 0));
    let (channel, pan_id) = (a.channel(), a.pan_id());

    receive(&mut a, 2, builder::announce(channel, pan_id, Timestamp::new(12, 0)));
    assert_eq!(a.active_timestamp(), Some(Timestamp::new(12, 0)));
    assert_eq!(a.state(), AttachState::ConnectedRouter);
    assert!(a.announce.is_none());
}

#[test]
fn test_sleepy_children_get_unicast_network_data() {
    let mut a = node(1, true);
    make_router(&mut a, leader_data(5, 64, 0), 0, &[]);
    let children = [
        (1u8, DeviceMode::SECURE_DATA_REQUESTS, false),
        (
            2,
            DeviceMode::SECURE_DATA_REQUESTS | DeviceMode::FULL_NETWORK_DATA,
            true,
        ),
        (3, DeviceMode::RX_ON_IDLE | DeviceMode::SECURE_DATA_REQUESTS, true),
    ];
    for (k, mode, full) in children {
        let rloc16 = (a.rloc16() & 0xfc00) | k as u16;
        let (index, _) = a.neighbors.allocate_or_get(mac(10 + k), true).unwrap();
        let entry = a.neighbors.get_mut(index).unwrap();
        entry.mac16 = rloc16;
        entry.set_mode(mode);
        a.neighbors.refresh(index, 240, 0);
        a.neighbor_class.set_request_full_data(index, full);
    }

    let own = a.rloc16();
    a.handle_event(Event::NetworkDataRegistration {
        rloc16: own,
        prefixes: vec![served_prefix(1, true, own), served_prefix(2, false, own)],
    });
    let full = a.network_data().clone();
    let stable = full.stable_subset();
    assert!(stable.len() < full.len());

    let responses = a.mle.sent_of(MleCommand::DataResponse);
    assert_eq!(
        responses
            .iter()
            .filter(|m| m.destination == LINK_LOCAL_ALL_NODES)
            .count(),
        1
    );
    let unicast: Vec<(Ipv6Addr, Vec<u8>)> = responses
        .iter()
        .filter(|m| m.destination != LINK_LOCAL_ALL_NODES)
        .map(|m| {
            let raw = tlv::find(&m.message.payload, TlvType::NetworkData).unwrap();
            (m.destination, raw.to_vec())
        })
        .collect();
    assert_eq!(unicast.len(), 2);
    let to = |n: u8| {
        unicast
            .iter()
            .find(|(d, _)| *d == link_local_from_mac64(&mac(n)))
            .map(|(_, raw)| raw.clone())
            .unwrap()
    };
    assert_eq!(to(11), stable.as_bytes().to_vec());
    assert_eq!(to(12), full.as_bytes().to_vec());
    assert!(unicast
        .iter()
        .all(|(d, _)| *d != link_local_from_mac64(&mac(13))));
}

#[test]
fn test_link_accept_establishes_router_link() {
    let ld = leader_data(5, 64, 0);
    let mut a = node(1, true);
    make_router(&mut a, ld, 0, &[2]);
    a.challenges
        .record([4; 8], Some(mac(2)), ChallengePurpose::LinkRequest, 10_000);

    let source = rloc16_from_router_id(2);
    receive(
        &mut a,
        2,
        builder::link_accept(&builder::LinkAccept {
            response: &[4; 8],
            challenge: Some(&[6; 8]),
            source,
            leader_data: &ld,
            link_frame_counter: 3,
            mle_frame_counter: 3,
            link_margin: 20,
            route: None,
        }),
    );

    let index = a.neighbors.find_by_mac64(&mac(2)).unwrap();
    let entry = a.neighbors.get(index).unwrap();
    assert_eq!(entry.mac16, source);
    assert!(entry.is_router());
    assert!(entry.connected_device);
    assert_eq!(entry.link_lifetime, a.config.router_link_lifetime_secs);
    assert_eq!(entry.link_frame_counter, 3);
    assert!(a.mle.devices.contains(&(index, source, mac(2))));

    let accepts = a.mle.sent_of(MleCommand::LinkAccept);
    assert_eq!(accepts.len(), 1);
    assert_eq!(
        tlv::find(&accepts[0].message.payload, TlvType::Response),
        Some(&[6u8; 8][..])
    );

    // the challenge is spent
    receive(
        &mut a,
        3,
        builder::link_accept(&builder::LinkAccept {
            response: &[4; 8],
            challenge: None,
            source: rloc16_from_router_id(3),
            leader_data: &ld,
            link_frame_counter: 0,
            mle_frame_counter: 0,
            link_margin: 20,
            route: None,
        }),
    );
    assert!(a.neighbors.find_by_mac64(&mac(3)).is_none());
}

#[test]
fn test_child_update_keepalive_round_trip() {
    let mut leader = node(1, true);
    form_partition(&mut leader);
    let mut child = node(2, false);
    child.handle_event(Event::Start);
    child.handle_event(Event::Tick { now_ms: 300 });
    relay(&child, 2, &mut leader, MleCommand::ParentRequest);
    relay(&leader, 1, &mut child, MleCommand::ParentResponse);
    child.handle_event(Event::Tick { now_ms: 1100 });
    relay(&child, 2, &mut leader, MleCommand::ChildIdRequest);
    relay(&leader, 1, &mut child, MleCommand::ChildIdResponse);
    assert_eq!(child.state(), AttachState::Connected);

    let index = leader.neighbors.find_by_mac64(&mac(2)).unwrap();
    leader.neighbors.get_mut(index).unwrap().lifetime_remaining = 5;

    child.child_keepalive();
    let transaction = child
        .mle
        .last_transaction(MleCommand::ChildUpdateRequest)
        .unwrap();
    relay(&child, 2, &mut leader, MleCommand::ChildUpdateRequest);

    let responses = leader.mle.sent_of(MleCommand::ChildUpdateResponse);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].destination, link_local_from_mac64(&mac(2)));
    let entry = leader.neighbors.get(index).unwrap();
    assert_eq!(entry.lifetime_remaining, child.config.child_timeout_secs);

    relay(&leader, 1, &mut child, MleCommand::ChildUpdateResponse);
    assert!(child.mle.cancelled.contains(&transaction));
    assert_eq!(child.state(), AttachState::Connected);
    assert!(connection_errors(&child.take_notifications()).is_empty());
}

#[test]
fn test_reed_child_id_request_gated_by_upgrade() {
    let mut a = node(1, true);
    a.leader_data = Some(leader_data(5, 64, 1));
    a.routers.allocate(Some(1)).unwrap();
    a.set_rloc16(0x0401);
    a.state = AttachState::Connected;
    a.role = DeviceRole::Reed;
    a.config.router_upgrade_threshold = 1;

    let mode = DeviceMode::RX_ON_IDLE | DeviceMode::SECURE_DATA_REQUESTS;
    let request = |response: &[u8; 8]| {
        builder::child_id_request(&builder::ChildIdRequest {
            response,
            link_frame_counter: 0,
            mle_frame_counter: 0,
            mode,
            timeout_secs: 240,
            addresses: &[],
            timestamps: DatasetTimestamps::default(),
        })
    };

    a.challenges
        .record([5; 8], Some(mac(3)), ChallengePurpose::ParentResponse, 10_000);
    receive(&mut a, 3, request(&[5; 8]));
    let rejects = a.mle.sent_of(MleCommand::LinkReject);
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].destination, link_local_from_mac64(&mac(3)));
    assert!(a.management().router_id_requests.is_empty());
    assert!(a.pending_child_ids.is_empty());

    a.config.router_upgrade_threshold = 16;
    a.challenges
        .record([6; 8], Some(mac(3)), ChallengePurpose::ParentResponse, 10_000);
    receive(&mut a, 3, request(&[6; 8]));
    assert_eq!(a.management().router_id_requests.len(), 1);
    assert_eq!(a.pending_child_ids.len(), 1);
    assert_eq!(a.mle.sent_of(MleCommand::LinkReject).len(), 1);
}

#[test]
fn test_out_of_range_child_ids_refused() {
    let config = ThreadConfig {
        eui64: mac(1),
        child_id_max: 0x200,
        ..ThreadConfig::default()
    };
    let result = TestInterface::new(
        config,
        RecordingMle::default(),
        RecordingIpv6::default(),
        RecordingManagement::default(),
    );
    assert!(matches!(result, Err(MleError::InvalidConfig(_))));
}

#[test]
fn test_child_id_response_carries_missing_timestamps() {
    let mut leader = node(1, true);
    form_partition(&mut leader);
    leader.active_timestamp = Some(Timestamp::new(7, 0));
    leader.pending_timestamp = Some(Timestamp::new(9, 0));
    let mut child = node(2, false);
    child.active_timestamp = Some(Timestamp::new(7, 0));

    child.handle_event(Event::Start);
    child.handle_event(Event::Tick { now_ms: 300 });
    relay(&child, 2, &mut leader, MleCommand::ParentRequest);
    relay(&leader, 1, &mut child, MleCommand::ParentResponse);
    child.handle_event(Event::Tick { now_ms: 1100 });
    relay(&child, 2, &mut leader, MleCommand::ChildIdRequest);

    let responses = leader.mle.sent_of(MleCommand::ChildIdResponse);
    let payload = &responses[0].message.payload;
    assert_eq!(Timestamp::read(payload, TlvType::ActiveTimestamp), None);
    assert_eq!(
        Timestamp::read(payload, TlvType::PendingTimestamp),
        Some(Timestamp::new(9, 0))
    );

    relay(&leader, 1, &mut child, MleCommand::ChildIdResponse);
    assert_eq!(child.state(), AttachState::Connected);
    assert_eq!(child.active_timestamp(), Some(Timestamp::new(7, 0)));
    assert_eq!(child.pending_timestamp(), Some(Timestamp::new(9, 0)));
}
