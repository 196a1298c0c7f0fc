// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Query Router: multiplexes `search_*` requests against a peer's
//! cache state, dispatching immediately on a cache hit and queuing at most
//! one request while discovery or verification is in flight.

use tracing::warn;

use crate::{
    handle::{AttHandle, AttHandleRange},
    peer::{CacheState, PeerCacheEntry},
    store::{AttrKind, CharacteristicRecord, DescriptorRecord, IncludedServiceRecord, ServiceRecord},
    transport::{DeferredEvent, EventQueue},
    uuid::GattUuid,
};

/// One result delivered to a `search_*` completion sink, terminated by
/// [`QueryEvent::Done`].
pub enum QueryEvent {
    Service(ServiceRecord),
    IncludedService(IncludedServiceRecord),
    Characteristic(CharacteristicRecord),
    Descriptor(DescriptorRecord),
    Done,
}

/// A caller's completion sink. Boxed because each `search_*` call site
/// supplies a distinct closure.
pub type Sink = Box<dyn FnMut(QueryEvent) + Send>;

/// The at-most-one outstanding request a peer can hold while its cache is
/// not yet `Verified`. A second call before the first completes silently
/// replaces this slot — the first caller's sink is dropped without ever
/// being invoked, matching the upstream driver's behaviour (see
/// `DESIGN.md`, Open Question 3).
pub enum PendingRequest {
    Services {
        sink: Sink,
    },
    ServicesByUuid {
        uuid: GattUuid,
        sink: Sink,
    },
    IncludedServices {
        service_start: AttHandle,
        sink: Sink,
    },
    AllCharacteristics {
        service_start: AttHandle,
        sink: Sink,
    },
    CharacteristicsByUuid {
        uuid: GattUuid,
        sink: Sink,
    },
    AllDescriptors {
        service_start: AttHandle,
        char_value_handle: AttHandle,
        sink: Sink,
    },
}

fn run_sink(mut sink: Sink, events: Vec<QueryEvent>) -> DeferredEvent {
    DeferredEvent(Box::new(move || {
        for ev in events {
            sink(ev);
        }
        sink(QueryEvent::Done);
    }))
}

fn collect(req: &mut PendingRequest, peer: &PeerCacheEntry) -> Vec<QueryEvent> {
    match req {
        PendingRequest::Services { .. } => {
            peer.store.services().iter().cloned().map(QueryEvent::Service).collect()
        }
        PendingRequest::ServicesByUuid { uuid, .. } => peer
            .store
            .services_by_uuid(uuid)
            .into_iter()
            .cloned()
            .map(QueryEvent::Service)
            .collect(),
        PendingRequest::IncludedServices { service_start, .. } => {
            match peer.store.find_service_index_by_start_handle(*service_start) {
                Some(idx) => peer
                    .store
                    .service_at(idx)
                    .map(|s| s.included_services.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .map(QueryEvent::IncludedService)
                    .collect(),
                None => Vec::new(),
            }
        }
        PendingRequest::AllCharacteristics { service_start, .. } => {
            match peer.store.find_service_index_by_start_handle(*service_start) {
                Some(idx) => peer
                    .store
                    .service_at(idx)
                    .map(|s| s.characteristics.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .map(QueryEvent::Characteristic)
                    .collect(),
                None => Vec::new(),
            }
        }
        PendingRequest::CharacteristicsByUuid { uuid, .. } => peer
            .store
            .characteristics_by_uuid(uuid)
            .into_iter()
            .map(|(_, c)| c.clone())
            .map(QueryEvent::Characteristic)
            .collect(),
        PendingRequest::AllDescriptors {
            service_start,
            char_value_handle,
            ..
        } => peer
            .store
            .descriptors_by_path(*service_start, *char_value_handle)
            .map(|ds| ds.to_vec())
            .unwrap_or_default()
            .into_iter()
            .map(QueryEvent::Descriptor)
            .collect(),
    }
}

fn take_sink(req: PendingRequest) -> Sink {
    match req {
        PendingRequest::Services { sink }
        | PendingRequest::ServicesByUuid { sink, .. }
        | PendingRequest::IncludedServices { sink, .. }
        | PendingRequest::AllCharacteristics { sink, .. }
        | PendingRequest::CharacteristicsByUuid { sink, .. }
        | PendingRequest::AllDescriptors { sink, .. } => sink,
    }
}

/// Submit a request: dispatch it through the event queue right away if the
/// cache is already verified, otherwise park it as the peer's single
/// pending request. Parking alone never starts verification or discovery —
/// the caller (`GattCache::dispatch`) is responsible for kicking off
/// whichever of those the peer's state still needs.
pub fn submit<Q: EventQueue>(peer: &mut PeerCacheEntry, queue: &Q, mut req: PendingRequest) {
    if peer.state == CacheState::Verified {
        let events = collect(&mut req, peer);
        queue.enqueue(run_sink(take_sink(req), events));
    } else {
        if peer.pending_request.is_some() {
            warn!("overwriting an outstanding pending request for this peer");
        }
        peer.pending_request = Some(req);
    }
}

/// Called by the Discovery Driver / Hash Verifier when a peer's cache
/// becomes `Verified`, to flush whatever request was parked while it
/// wasn't. The only caller of this function is internal; it is not
/// reachable through the public API, so the request it completes is
/// always the one this peer's own driver just finished for (see
/// `DESIGN.md`, Open Question 2).
pub fn dispatch_pending<Q: EventQueue>(peer: &mut PeerCacheEntry, queue: &Q) {
    if peer.state != CacheState::Verified {
        return;
    }
    if let Some(mut req) = peer.pending_request.take() {
        let events = collect(&mut req, peer);
        queue.enqueue(run_sink(take_sink(req), events));
    }
}

/// Eagerly materialised structural lookups — these do not go through the
/// pending-request path since they only ever read an already-verified
/// cache.
pub fn get_service_with_uuid(peer: &PeerCacheEntry, uuid: &GattUuid) -> Vec<ServiceRecord> {
    peer.store.services_by_uuid(uuid).into_iter().cloned().collect()
}

pub fn get_db_in_range(peer: &PeerCacheEntry, range: AttHandleRange) -> Vec<AttHandle> {
    peer.store.in_range(range)
}

pub fn get_db_with_operation(peer: &PeerCacheEntry, range: AttHandleRange, kind: AttrKind) -> Vec<AttHandle> {
    peer.store.in_range_with_kind(range, kind)
}

pub fn attr_count(peer: &PeerCacheEntry) -> usize {
    peer.store.attr_count()
}

pub fn get_db_size_in_range(peer: &PeerCacheEntry, range: AttHandleRange) -> usize {
    peer.store.size_with_range(range)
}
