// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-connection cache state: the state machine enum and the per-peer
//! entry the registry and query router operate on.

use crate::{
    query::PendingRequest,
    store::AttributeStore,
    transport::{BdAddr, ConnHandle, DeferredEvent},
};

/// The cache lifecycle state for one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No usable cache: either never discovered or invalidated by a
    /// bonding change, a failed verification, or an out-of-memory abort.
    Invalid,
    /// A persisted record was loaded from storage but its hash has not yet
    /// been checked against the peer.
    Loaded,
    /// The database hash has been checked against the peer and matches.
    Verified,
    /// A Database Hash read is in flight.
    VerifyInProgress,
    /// Primary service discovery is in flight.
    SvcDiscInProgress,
    /// Included-service discovery is in flight.
    IncDiscInProgress,
    /// Characteristic discovery is in flight.
    ChrDiscInProgress,
    /// Descriptor discovery is in flight, resumable from the watermark.
    DscDiscInProgress,
}

impl CacheState {
    pub fn is_discovery_in_progress(self) -> bool {
        matches!(
            self,
            CacheState::SvcDiscInProgress
                | CacheState::IncDiscInProgress
                | CacheState::ChrDiscInProgress
                | CacheState::DscDiscInProgress
        )
    }
}

/// Everything the cache tracks for a single connected peer.
pub struct PeerCacheEntry {
    pub connection_handle: ConnHandle,
    pub identity_address: BdAddr,
    pub database_hash: [u8; 16],
    pub store: AttributeStore,
    pub state: CacheState,
    /// Index into `store.services()` that discovery is currently working
    /// through. `None` when no discovery pass is active.
    pub cur_service: Option<usize>,
    /// Monotonic cursor into the characteristic list of `cur_service`,
    /// reset to 1 when descriptor discovery starts and to 0 when it
    /// completes, so a dropped connection can resume mid-service.
    pub prev_characteristic_watermark: u16,
    pub pending_request: Option<PendingRequest>,
    pub deferred_completion_event: Option<DeferredEvent>,
}

impl PeerCacheEntry {
    pub fn new(connection_handle: ConnHandle, identity_address: BdAddr) -> Self {
        PeerCacheEntry {
            connection_handle,
            identity_address,
            database_hash: [0u8; 16],
            store: AttributeStore::new(),
            state: CacheState::Invalid,
            cur_service: None,
            prev_characteristic_watermark: 0,
            pending_request: None,
            deferred_completion_event: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.state = CacheState::Invalid;
        self.store.clear();
        self.cur_service = None;
        self.prev_characteristic_watermark = 0;
    }
}
