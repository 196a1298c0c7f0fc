// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The external interfaces the cache is built against: the peer transport,
//! the host's connection directory, the deferred-event queue, and the
//! persistence backend. All four are consumed as traits so the cache
//! itself never talks to real radio hardware or flash storage.

use std::fmt;

use crate::{
    error::PeerError,
    handle::AttHandle,
    store::{CharacteristicRecord, DescriptorRecord, ServiceKind},
    uuid::GattUuid,
};

/// The host stack's numeric identifier for an ACL connection. Opaque to
/// this crate beyond equality and use as a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub u16);

/// A Bluetooth device address: the address-type discriminant plus the 6
/// address bytes, matching the host stack's `ble_addr_t` (public or
/// random, and if random, whether it is resolvable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub addr_type: u8,
    pub bytes: [u8; 6],
}

impl BdAddr {
    /// A public-address-type `BdAddr`. Most test peers and any peer that
    /// never rotates a resolvable private address use this constructor.
    pub fn public(bytes: [u8; 6]) -> Self {
        BdAddr { addr_type: 0, bytes }
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.bytes;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// A service as reported directly off the wire by primary-service
/// discovery, before it is folded into a [`crate::store::ServiceRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredService {
    pub kind: ServiceKind,
    pub start_handle: AttHandle,
    pub end_handle: AttHandle,
    pub uuid: GattUuid,
}

/// Host connection metadata the cache needs for bonding transitions, but
/// does not own.
#[derive(Debug, Clone, Copy)]
pub struct HostConnectionInfo {
    pub peer_addr: BdAddr,
    pub bonded: bool,
}

/// The peer-facing ATT/GATT procedures the cache drives. Each method
/// completes with the procedure's full result set; the wire-level PDU
/// exchange behind it is out of this crate's scope.
pub trait AttTransport: Send + Sync {
    fn discover_all_primary_services(
        &self,
        conn: ConnHandle,
    ) -> impl Future<Output = Result<Vec<DiscoveredService>, PeerError>> + Send;

    fn find_included_services(
        &self,
        conn: ConnHandle,
        start: AttHandle,
        end: AttHandle,
    ) -> impl Future<Output = Result<Vec<crate::store::IncludedServiceRecord>, PeerError>> + Send;

    fn discover_all_characteristics(
        &self,
        conn: ConnHandle,
        start: AttHandle,
        end: AttHandle,
    ) -> impl Future<Output = Result<Vec<CharacteristicRecord>, PeerError>> + Send;

    fn discover_all_descriptors(
        &self,
        conn: ConnHandle,
        start: AttHandle,
        end: AttHandle,
    ) -> impl Future<Output = Result<Vec<DescriptorRecord>, PeerError>> + Send;

    fn read_by_uuid(
        &self,
        conn: ConnHandle,
        start: AttHandle,
        end: AttHandle,
        uuid: GattUuid,
    ) -> impl Future<Output = Result<Vec<u8>, PeerError>> + Send;

    fn read(
        &self,
        conn: ConnHandle,
        handle: AttHandle,
    ) -> impl Future<Output = Result<Vec<u8>, PeerError>> + Send;
}

/// The host's directory of live connections, used to resolve the identity
/// address and bonding state behind a connection handle.
pub trait HostConnections: Send + Sync {
    fn find(&self, conn: ConnHandle) -> impl Future<Output = Option<HostConnectionInfo>> + Send;
}

/// A unit of completion work deferred so a synchronous cache hit cannot
/// resolve before the caller's enqueue call returns, per the cache's
/// async-for-every-caller contract.
pub struct DeferredEvent(pub Box<dyn FnOnce() + Send>);

impl fmt::Debug for DeferredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeferredEvent(..)")
    }
}

/// Where the cache posts deferred completions so they run after the
/// current call stack unwinds, not inline.
pub trait EventQueue: Send + Sync {
    fn enqueue(&self, event: DeferredEvent);
}

/// Non-volatile storage for persisted cache records, keyed by identity
/// address.
pub trait PersistenceBackend: Send + Sync {
    fn load(
        &self,
        addr: BdAddr,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, crate::error::PersistenceError>> + Send;

    fn save(
        &self,
        addr: BdAddr,
        record: Vec<u8>,
    ) -> impl Future<Output = Result<(), crate::error::PersistenceError>> + Send;

    fn reset(&self, addr: BdAddr) -> impl Future<Output = Result<(), crate::error::PersistenceError>> + Send;
}
