// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared mock collaborators for the integration tests: a scripted
//! [`AttTransport`], a fixed [`HostConnections`] directory, an
//! immediately-drainable [`EventQueue`], and an in-memory
//! [`PersistenceBackend`].

use std::{
    cell::RefCell,
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use gattc_cache::{
    error::{PeerError, PersistenceError},
    handle::AttHandle,
    store::{CharacteristicRecord, DescriptorRecord, IncludedServiceRecord},
    transport::{
        AttTransport, BdAddr, ConnHandle, DeferredEvent, DiscoveredService, EventQueue,
        HostConnectionInfo, HostConnections, PersistenceBackend,
    },
    uuid::GattUuid,
};

/// A scripted peer database: canned responses for every discovery/read
/// procedure, plus a call counter so tests can assert a rediscovery did or
/// did not happen.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

struct MockTransportInner {
    services: Vec<DiscoveredService>,
    includes: HashMap<AttHandle, Vec<IncludedServiceRecord>>,
    characteristics: HashMap<AttHandle, Vec<CharacteristicRecord>>,
    descriptors: HashMap<AttHandle, Vec<DescriptorRecord>>,
    database_hash: [u8; 16],
    primary_discovery_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(services: Vec<DiscoveredService>, database_hash: [u8; 16]) -> Self {
        MockTransport {
            inner: Arc::new(MockTransportInner {
                services,
                includes: HashMap::new(),
                characteristics: HashMap::new(),
                descriptors: HashMap::new(),
                database_hash,
                primary_discovery_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_characteristics(mut self, start: AttHandle, chars: Vec<CharacteristicRecord>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the transport is shared")
            .characteristics
            .insert(start, chars);
        self
    }

    pub fn with_includes(mut self, start: AttHandle, includes: Vec<IncludedServiceRecord>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the transport is shared")
            .includes
            .insert(start, includes);
        self
    }

    pub fn with_descriptors(mut self, start: AttHandle, descriptors: Vec<DescriptorRecord>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the transport is shared")
            .descriptors
            .insert(start, descriptors);
        self
    }

    pub fn primary_discovery_call_count(&self) -> usize {
        self.inner.primary_discovery_calls.load(Ordering::SeqCst)
    }
}

impl AttTransport for MockTransport {
    async fn discover_all_primary_services(
        &self,
        _conn: ConnHandle,
    ) -> Result<Vec<DiscoveredService>, PeerError> {
        self.inner.primary_discovery_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.services.clone())
    }

    async fn find_included_services(
        &self,
        _conn: ConnHandle,
        start: AttHandle,
        _end: AttHandle,
    ) -> Result<Vec<IncludedServiceRecord>, PeerError> {
        Ok(self.inner.includes.get(&start).cloned().unwrap_or_default())
    }

    async fn discover_all_characteristics(
        &self,
        _conn: ConnHandle,
        start: AttHandle,
        _end: AttHandle,
    ) -> Result<Vec<CharacteristicRecord>, PeerError> {
        Ok(self.inner.characteristics.get(&start).cloned().unwrap_or_default())
    }

    async fn discover_all_descriptors(
        &self,
        _conn: ConnHandle,
        start: AttHandle,
        _end: AttHandle,
    ) -> Result<Vec<DescriptorRecord>, PeerError> {
        Ok(self.inner.descriptors.get(&start).cloned().unwrap_or_default())
    }

    async fn read_by_uuid(
        &self,
        _conn: ConnHandle,
        _start: AttHandle,
        _end: AttHandle,
        uuid: GattUuid,
    ) -> Result<Vec<u8>, PeerError> {
        if uuid == GattUuid::DATABASE_HASH {
            Ok(self.inner.database_hash.to_vec())
        } else {
            Ok(Vec::new())
        }
    }

    async fn read(&self, _conn: ConnHandle, _handle: AttHandle) -> Result<Vec<u8>, PeerError> {
        Ok(Vec::new())
    }
}

/// A fixed directory of connected peers, keyed by connection handle.
pub struct MockHostConnections {
    entries: HashMap<ConnHandle, HostConnectionInfo>,
}

impl MockHostConnections {
    pub fn new(entries: Vec<(ConnHandle, BdAddr, bool)>) -> Self {
        MockHostConnections {
            entries: entries
                .into_iter()
                .map(|(conn, peer_addr, bonded)| (conn, HostConnectionInfo { peer_addr, bonded }))
                .collect(),
        }
    }
}

impl HostConnections for MockHostConnections {
    async fn find(&self, conn: ConnHandle) -> Option<HostConnectionInfo> {
        self.entries.get(&conn).copied()
    }
}

/// Parks deferred completions instead of running them inline; tests call
/// [`MockEventQueue::run_all`] to simulate the host's event loop draining
/// them after the triggering call returns. `Arc`-shared (like
/// [`MockPersistence`]) so a test can keep a handle to the queue after
/// moving a clone of it into a [`GattCache`].
///
/// [`GattCache`]: gattc_cache::cache::GattCache
#[derive(Clone)]
pub struct MockEventQueue(Arc<Mutex<RefCell<Vec<DeferredEvent>>>>);

impl MockEventQueue {
    pub fn new() -> Self {
        MockEventQueue(Arc::new(Mutex::new(RefCell::new(Vec::new()))))
    }

    pub fn run_all(&self) {
        let cell = self.0.lock().expect("queue mutex poisoned");
        for ev in cell.borrow_mut().drain(..) {
            (ev.0)();
        }
    }
}

impl EventQueue for MockEventQueue {
    fn enqueue(&self, event: DeferredEvent) {
        self.0.lock().expect("queue mutex poisoned").borrow_mut().push(event);
    }
}

/// An in-memory persistence backend, `Arc`-shared so two [`GattCache`]
/// instances in the same test can stand in for the same peer reconnecting
/// across a dropped connection.
///
/// [`GattCache`]: gattc_cache::cache::GattCache
#[derive(Clone)]
pub struct MockPersistence {
    records: Arc<Mutex<HashMap<BdAddr, Vec<u8>>>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        MockPersistence {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl PersistenceBackend for MockPersistence {
    async fn load(&self, addr: BdAddr) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.records.lock().expect("persistence mutex poisoned").get(&addr).cloned())
    }

    async fn save(&self, addr: BdAddr, record: Vec<u8>) -> Result<(), PersistenceError> {
        self.records.lock().expect("persistence mutex poisoned").insert(addr, record);
        Ok(())
    }

    async fn reset(&self, addr: BdAddr) -> Result<(), PersistenceError> {
        self.records.lock().expect("persistence mutex poisoned").remove(&addr);
        Ok(())
    }
}

pub fn one_primary_service() -> DiscoveredService {
    DiscoveredService {
        kind: gattc_cache::store::ServiceKind::Primary,
        start_handle: AttHandle(1),
        end_handle: AttHandle(10),
        uuid: GattUuid::Uuid16(0x1800),
    }
}
