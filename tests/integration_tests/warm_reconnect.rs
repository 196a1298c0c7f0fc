// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reconnecting to a peer with a persisted record either confirms it
//! via a Database Hash read (unbonded, hash matches), falls back to
//! full rediscovery (unbonded, hash differs), or skips the hash read
//! entirely (bonded).

use gattc_cache::{
    cache::GattCache,
    cfg::config::Config,
    handle::AttHandle,
    peer::CacheState,
    persistence,
    store::{CharProperties, CharacteristicRecord, ServiceKind},
    transport::{BdAddr, ConnHandle, DiscoveredService, PersistenceBackend},
    uuid::GattUuid,
};

use crate::integration_tests::common::{MockEventQueue, MockHostConnections, MockPersistence, MockTransport};

fn seed_record(addr: BdAddr, hash: [u8; 16]) -> Vec<u8> {
    let mut store = gattc_cache::store::AttributeStore::new();
    let idx = store.insert_service(gattc_cache::store::ServiceRecord::new(
        ServiceKind::Primary,
        AttHandle(1),
        AttHandle(9),
        GattUuid::Uuid16(0x1800),
    ));
    store
        .insert_characteristic(idx, CharacteristicRecord {
            definition_handle: AttHandle(2),
            value_handle: AttHandle(3),
            properties: CharProperties::READ,
            uuid: GattUuid::Uuid16(0x2A00),
            descriptors: Vec::new(),
        })
        .expect("characteristic attach must succeed");
    persistence::encode(addr, &hash, &store)
}

#[tokio::test]
async fn matching_hash_reaches_verified_without_rediscovery() {
    let addr = BdAddr::public([3; 6]);
    let conn = ConnHandle(0);
    let hash = [0x11; 16];

    let persistence_backend = MockPersistence::new();
    persistence_backend
        .save(addr, seed_record(addr, hash))
        .await
        .expect("seed save must succeed");

    let transport = MockTransport::new(
        vec![DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(9),
            uuid: GattUuid::Uuid16(0x1800),
        }],
        hash,
    );
    let host = MockHostConnections::new(vec![(conn, addr, false)]);
    let queue = MockEventQueue::new();
    let cfg = Config::default();
    let mut cache = GattCache::new(transport.clone(), host, queue, persistence_backend, &cfg);

    cache.create(conn).await.expect("create must succeed");

    assert_eq!(cache.registry_state(conn), Some(CacheState::Verified));
    assert_eq!(
        transport.primary_discovery_call_count(),
        0,
        "a matching hash must never trigger primary service discovery"
    );
}

#[tokio::test]
async fn mismatched_hash_falls_back_to_full_rediscovery() {
    let addr = BdAddr::public([4; 6]);
    let conn = ConnHandle(1);
    let stale_hash = [0x22; 16];
    let current_hash = [0x33; 16];

    let persistence_backend = MockPersistence::new();
    persistence_backend
        .save(addr, seed_record(addr, stale_hash))
        .await
        .expect("seed save must succeed");

    let transport = MockTransport::new(
        vec![DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(9),
            uuid: GattUuid::Uuid16(0x1800),
        }],
        current_hash,
    )
    .with_characteristics(AttHandle(1), vec![CharacteristicRecord {
        definition_handle: AttHandle(2),
        value_handle: AttHandle(3),
        properties: CharProperties::READ,
        uuid: GattUuid::Uuid16(0x2A00),
        descriptors: Vec::new(),
    }]);
    let host = MockHostConnections::new(vec![(conn, addr, false)]);
    let queue = MockEventQueue::new();
    let cfg = Config::default();
    let mut cache = GattCache::new(transport.clone(), host, queue, persistence_backend, &cfg);

    cache.create(conn).await.expect("create must succeed");

    assert_eq!(cache.registry_state(conn), Some(CacheState::Verified));
    assert_eq!(
        transport.primary_discovery_call_count(),
        1,
        "a mismatched hash must trigger exactly one rediscovery pass"
    );
}

#[tokio::test]
async fn bonded_peer_skips_the_hash_read_entirely() {
    let addr = BdAddr::public([5; 6]);
    let conn = ConnHandle(2);
    // A hash that would fail to match if it were ever compared — the
    // point of this test is that the bonded shortcut never reads it.
    let persisted_hash = [0x44; 16];
    let live_hash = [0x55; 16];

    let persistence_backend = MockPersistence::new();
    persistence_backend
        .save(addr, seed_record(addr, persisted_hash))
        .await
        .expect("seed save must succeed");

    let transport = MockTransport::new(
        vec![DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(9),
            uuid: GattUuid::Uuid16(0x1800),
        }],
        live_hash,
    );
    let host = MockHostConnections::new(vec![(conn, addr, true)]);
    let queue = MockEventQueue::new();
    let cfg = Config::default();
    let mut cache = GattCache::new(transport.clone(), host, queue, persistence_backend, &cfg);

    cache.create(conn).await.expect("create must succeed");

    assert_eq!(cache.registry_state(conn), Some(CacheState::Verified));
    assert_eq!(
        transport.primary_discovery_call_count(),
        0,
        "a bonded peer must skip both the hash read and rediscovery"
    );
    let svc = cache.get_service_with_uuid(conn, &GattUuid::Uuid16(0x1800));
    assert_eq!(svc.len(), 1);
    assert_eq!(svc[0].characteristics.len(), 1);
}
