// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Cache Registry: one [`PeerCacheEntry`] per connected peer, keyed by
//! connection handle, bounded by per-peer attribute-count capacity.
//!
//! A plain `HashMap` rather than a concurrent map: per §5 the cache is
//! owned exclusively by the host event loop and never locked internally.

use std::collections::HashMap;

use crate::{
    error::CacheError,
    peer::PeerCacheEntry,
    store::AttrKind,
    transport::{BdAddr, ConnHandle},
};

/// Per-peer attribute-count ceilings, checked after every discovery phase.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub max_connections: usize,
    pub max_services: usize,
    pub max_included_services: usize,
    pub max_characteristics: usize,
    pub max_descriptors: usize,
}

/// Connection-handle-keyed store of peer cache entries.
pub struct CacheRegistry {
    entries: HashMap<ConnHandle, PeerCacheEntry>,
    limits: RegistryLimits,
}

impl CacheRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        CacheRegistry {
            entries: HashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Create a fresh `Invalid` entry for a newly connected peer.
    pub fn create(&mut self, conn: ConnHandle, identity_address: BdAddr) -> Result<(), CacheError> {
        if self.entries.len() >= self.limits.max_connections && !self.entries.contains_key(&conn) {
            return Err(CacheError::OutOfMemory("max_connections exceeded"));
        }
        self.entries
            .insert(conn, PeerCacheEntry::new(conn, identity_address));
        Ok(())
    }

    pub fn destroy_by_handle(&mut self, conn: ConnHandle) {
        self.entries.remove(&conn);
    }

    pub fn get(&self, conn: ConnHandle) -> Option<&PeerCacheEntry> {
        self.entries.get(&conn)
    }

    pub fn get_mut(&mut self, conn: ConnHandle) -> Option<&mut PeerCacheEntry> {
        self.entries.get_mut(&conn)
    }

    pub fn find_by_address(&self, addr: BdAddr) -> Option<ConnHandle> {
        self.entries
            .values()
            .find(|e| e.identity_address == addr)
            .map(|e| e.connection_handle)
    }

    /// Check a peer's current attribute counts against the registry's
    /// capacity limits; call after each discovery phase completes.
    pub fn check_capacity(&self, conn: ConnHandle) -> Result<(), CacheError> {
        let peer = self.entries.get(&conn).ok_or(CacheError::NotConnected)?;
        let services = peer.store.size_with_kind(AttrKind::Service);
        let included = peer.store.size_with_kind(AttrKind::IncludedService);
        let chars = peer.store.size_with_kind(AttrKind::Characteristic);
        let descs = peer.store.size_with_kind(AttrKind::Descriptor);
        if services > self.limits.max_services {
            return Err(CacheError::OutOfMemory("max_services exceeded"));
        }
        if included > self.limits.max_included_services {
            return Err(CacheError::OutOfMemory("max_included_services exceeded"));
        }
        if chars > self.limits.max_characteristics {
            return Err(CacheError::OutOfMemory("max_characteristics exceeded"));
        }
        if descs > self.limits.max_descriptors {
            return Err(CacheError::OutOfMemory("max_descriptors exceeded"));
        }
        Ok(())
    }
}
