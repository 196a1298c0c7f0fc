// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A peer advertising more services than the configured ceiling aborts
//! discovery and leaves the peer `Invalid` rather than retaining an
//! over-capacity database, and the connection-count ceiling rejects a
//! new peer outright.

use gattc_cache::{
    cache::GattCache,
    cfg::config::Config,
    error::CacheError,
    handle::AttHandle,
    peer::CacheState,
    store::ServiceKind,
    transport::{BdAddr, ConnHandle, DiscoveredService},
    uuid::GattUuid,
};

use crate::integration_tests::common::{MockEventQueue, MockHostConnections, MockPersistence, MockTransport};

fn two_services() -> Vec<DiscoveredService> {
    vec![
        DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(9),
            uuid: GattUuid::Uuid16(0x1800),
        },
        DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(10),
            end_handle: AttHandle(19),
            uuid: GattUuid::Uuid16(0x1801),
        },
    ]
}

#[tokio::test]
async fn discovery_exceeding_max_services_leaves_the_peer_invalid() {
    let addr = BdAddr::public([10; 6]);
    let conn = ConnHandle(0);
    let transport = MockTransport::new(two_services(), [0u8; 16]);
    let host = MockHostConnections::new(vec![(conn, addr, false)]);
    let queue = MockEventQueue::new();
    let persistence_backend = MockPersistence::new();
    let mut cfg = Config::default();
    cfg.max_services = 1;
    let mut cache = GattCache::new(transport, host, queue, persistence_backend, &cfg);

    let err = cache.create(conn).await.unwrap_err();
    assert!(matches!(err, CacheError::OutOfMemory(_)));
    assert_eq!(cache.registry_state(conn), Some(CacheState::Invalid));
}

#[tokio::test]
async fn a_new_connection_past_max_connections_is_rejected() {
    let transport = MockTransport::new(vec![], [0u8; 16]);
    let host = MockHostConnections::new(vec![
        (ConnHandle(0), BdAddr::public([1; 6]), false),
        (ConnHandle(1), BdAddr::public([2; 6]), false),
    ]);
    let queue = MockEventQueue::new();
    let persistence_backend = MockPersistence::new();
    let mut cfg = Config::default();
    cfg.max_connections = 1;
    let mut cache = GattCache::new(transport, host, queue, persistence_backend, &cfg);

    cache.create(ConnHandle(0)).await.expect("first connection must be accepted");
    let err = cache.create(ConnHandle(1)).await.unwrap_err();
    assert!(matches!(err, CacheError::OutOfMemory(_)));
}
