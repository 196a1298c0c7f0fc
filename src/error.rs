// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error taxonomy: a public, typed [`CacheError`] plus internal leaf error
//! types that compose into it at module boundaries.

use thiserror::Error;

use crate::handle::AttHandle;

/// A GATT status code as reported by the peer in an ATT Error Response or
/// procedure completion event.
pub type AttStatus = u8;

/// Errors surfaced by the peer transport while a request is in flight.
#[derive(Debug, Clone, Error)]
pub enum PeerError {
    #[error("peer returned ATT status 0x{status:02x} for handle {handle}")]
    AttError { status: AttStatus, handle: AttHandle },
    #[error("connection dropped while request was in flight")]
    Disconnected,
    #[error("peer request timed out")]
    Timeout,
}

/// Errors from attribute-store mutation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("parent attribute for handle {0} is missing from the store")]
    ParentMissing(AttHandle),
    #[error("store capacity exceeded: {0}")]
    OutOfMemory(&'static str),
    #[error("store invariant violated: {0}")]
    InvalidRecordShape(&'static str),
}

/// Errors from loading or saving a persisted cache record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persisted record is truncated")]
    Truncated,
    #[error("persisted record failed its integrity checksum")]
    ChecksumMismatch,
    #[error("persisted record violates a store invariant: {0}")]
    InvalidRecord(&'static str),
    #[error("backend I/O failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// The public error type returned by every [`crate::cache::GattCache`]
/// operation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache entry exists for this connection")]
    NotConnected,
    #[error("caching is disabled by configuration")]
    NotSupported,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("cache capacity exceeded: {0}")]
    OutOfMemory(&'static str),
    #[error("required parent attribute missing for handle {0}")]
    ParentMissing(AttHandle),
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("operation already completed")]
    Done,
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ParentMissing(h) => CacheError::ParentMissing(h),
            StoreError::OutOfMemory(what) => CacheError::OutOfMemory(what),
            StoreError::InvalidRecordShape(what) => CacheError::InvalidArgument(what),
        }
    }
}
