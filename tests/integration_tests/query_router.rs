// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Query Router's `search_*` surface against a fully discovered,
//! `Verified` peer: every query type dispatches through the event queue
//! and terminates with `QueryEvent::Done`, and the eager structural
//! getters agree with it.

use std::sync::{Arc, Mutex};

use gattc_cache::{
    cache::GattCache,
    cfg::config::Config,
    error::CacheError,
    handle::{AttHandle, AttHandleRange},
    query::QueryEvent,
    store::{AttrKind, CharProperties, CharacteristicRecord, DescriptorRecord, IncludedServiceRecord, ServiceKind},
    transport::{BdAddr, ConnHandle, DiscoveredService},
    uuid::GattUuid,
};

use crate::integration_tests::common::{MockEventQueue, MockHostConnections, MockPersistence, MockTransport};

async fn discovered_cache() -> (GattCache<MockTransport, MockHostConnections, MockEventQueue, MockPersistence>, MockEventQueue, ConnHandle) {
    let addr = BdAddr::public([8; 6]);
    let conn = ConnHandle(0);
    let transport = MockTransport::new(
        vec![DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(20),
            uuid: GattUuid::Uuid16(0x1800),
        }],
        [0u8; 16],
    )
    .with_includes(AttHandle(1), vec![IncludedServiceRecord {
        handle: AttHandle(2),
        included_start_handle: AttHandle(10),
        included_end_handle: AttHandle(15),
        uuid: GattUuid::Uuid16(0x1801),
    }])
    .with_characteristics(AttHandle(1), vec![CharacteristicRecord {
        definition_handle: AttHandle(3),
        value_handle: AttHandle(4),
        properties: CharProperties::READ,
        uuid: GattUuid::Uuid16(0x2A00),
        descriptors: Vec::new(),
    }])
    .with_descriptors(AttHandle(5), vec![DescriptorRecord {
        handle: AttHandle(6),
        uuid: GattUuid::Uuid16(0x2902),
    }]);
    let host = MockHostConnections::new(vec![(conn, addr, false)]);
    let queue = MockEventQueue::new();
    let persistence_backend = MockPersistence::new();
    let cfg = Config::default();
    let mut cache = GattCache::new(transport, host, queue.clone(), persistence_backend, &cfg);
    cache.create(conn).await.expect("create must succeed");
    (cache, queue, conn)
}

fn count_events<F>(events: Vec<QueryEvent>, pred: F) -> usize
where
    F: Fn(&QueryEvent) -> bool,
{
    events.iter().filter(|ev| pred(ev)).count()
}

fn collect_into(sink_events: &Arc<Mutex<Vec<QueryEvent>>>) -> gattc_cache::query::Sink {
    let events = sink_events.clone();
    Box::new(move |ev| events.lock().expect("events mutex poisoned").push(ev))
}

#[tokio::test]
async fn search_included_services_finds_the_discovered_include() {
    let (mut cache, queue, conn) = discovered_cache().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    cache
        .search_included_services(conn, AttHandle(1), collect_into(&events))
        .await
        .expect("search_included_services must be accepted");
    queue.run_all();
    let events = events.lock().expect("events mutex poisoned").drain(..).collect::<Vec<_>>();
    assert_eq!(count_events(events, |ev| matches!(ev, QueryEvent::IncludedService(_))), 1);
}

#[tokio::test]
async fn search_all_characteristics_finds_the_discovered_characteristic() {
    let (mut cache, queue, conn) = discovered_cache().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    cache
        .search_all_characteristics(conn, AttHandle(1), collect_into(&events))
        .await
        .expect("search_all_characteristics must be accepted");
    queue.run_all();
    let events = events.lock().expect("events mutex poisoned").drain(..).collect::<Vec<_>>();
    assert_eq!(count_events(events, |ev| matches!(ev, QueryEvent::Characteristic(_))), 1);
}

#[tokio::test]
async fn search_characteristics_by_uuid_matches_on_type() {
    let (mut cache, queue, conn) = discovered_cache().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    cache
        .search_characteristics_by_uuid(conn, GattUuid::Uuid16(0x2A00), collect_into(&events))
        .await
        .expect("search_characteristics_by_uuid must be accepted");
    queue.run_all();
    let events = events.lock().expect("events mutex poisoned").drain(..).collect::<Vec<_>>();
    assert_eq!(count_events(events, |ev| matches!(ev, QueryEvent::Characteristic(_))), 1);

    let events2 = Arc::new(Mutex::new(Vec::new()));
    cache
        .search_characteristics_by_uuid(conn, GattUuid::Uuid16(0xDEAD), collect_into(&events2))
        .await
        .expect("search_characteristics_by_uuid must be accepted");
    queue.run_all();
    let events2 = events2.lock().expect("events mutex poisoned").drain(..).collect::<Vec<_>>();
    assert_eq!(count_events(events2, |ev| matches!(ev, QueryEvent::Characteristic(_))), 0);
}

#[tokio::test]
async fn search_all_descriptors_finds_the_discovered_descriptor() {
    let (mut cache, queue, conn) = discovered_cache().await;
    let events = Arc::new(Mutex::new(Vec::new()));
    cache
        .search_all_descriptors(conn, AttHandle(1), AttHandle(4), collect_into(&events))
        .await
        .expect("search_all_descriptors must be accepted");
    queue.run_all();
    let events = events.lock().expect("events mutex poisoned").drain(..).collect::<Vec<_>>();
    assert_eq!(count_events(events, |ev| matches!(ev, QueryEvent::Descriptor(_))), 1);
}

#[tokio::test]
async fn search_calls_are_rejected_when_caching_is_disabled() {
    let addr = BdAddr::public([9; 6]);
    let conn = ConnHandle(0);
    let transport = MockTransport::new(
        vec![DiscoveredService {
            kind: ServiceKind::Primary,
            start_handle: AttHandle(1),
            end_handle: AttHandle(20),
            uuid: GattUuid::Uuid16(0x1800),
        }],
        [0u8; 16],
    );
    let host = MockHostConnections::new(vec![(conn, addr, false)]);
    let queue = MockEventQueue::new();
    let persistence_backend = MockPersistence::new();
    let mut cfg = Config::default();
    cfg.caching_enabled = false;
    let mut cache = GattCache::new(transport, host, queue, persistence_backend, &cfg);

    let events = Arc::new(Mutex::new(Vec::new()));
    let err = cache
        .search_services(conn, collect_into(&events))
        .await
        .expect_err("search_services must be rejected when caching is disabled");
    assert!(matches!(err, CacheError::NotSupported));
}

#[tokio::test]
async fn eager_structural_getters_agree_with_the_discovered_database() {
    let (cache, _queue, conn) = discovered_cache().await;
    // Two services (the primary one plus the secondary service inserted
    // reactively from its include relationship), one include, one
    // characteristic, one descriptor.
    assert_eq!(cache.attr_count(conn), 5);

    let whole = AttHandleRange::whole_database();
    assert_eq!(cache.get_db_size_in_range(conn, whole), 5);
    assert_eq!(cache.get_db_with_operation(conn, whole, AttrKind::Characteristic).len(), 1);
    assert_eq!(cache.get_db_with_operation(conn, whole, AttrKind::Descriptor).len(), 1);

    let svcs = cache.get_service_with_uuid(conn, &GattUuid::Uuid16(0x1800));
    assert_eq!(svcs.len(), 1);
}
