// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `GattCache`: the facade wiring the registry, transport, persistence
//! backend and query router together into the crate's single public
//! handle. Owned exclusively by the host event loop (§5) — every method
//! takes `&mut self`, there is no locking inside.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    cfg::config::Config,
    discovery,
    error::{CacheError, PeerError},
    handle::{AttHandle, AttHandleRange},
    peer::CacheState,
    persistence,
    query::{self, PendingRequest, Sink},
    registry::{CacheRegistry, RegistryLimits},
    store::{AttrKind, ServiceRecord},
    transport::{AttTransport, BdAddr, ConnHandle, EventQueue, HostConnections, PersistenceBackend},
    uuid::GattUuid,
    verify::{self, VerifyOutcome},
};

pub struct GattCache<T, H, Q, P> {
    transport: T,
    host: H,
    queue: Q,
    persistence: P,
    registry: CacheRegistry,
    caching_enabled: bool,
    include_services_enabled: bool,
    disable_auto_rediscovery: bool,
    cancel: CancellationToken,
}

impl<T, H, Q, P> GattCache<T, H, Q, P>
where
    T: AttTransport,
    H: HostConnections,
    Q: EventQueue,
    P: PersistenceBackend,
{
    pub fn new(transport: T, host: H, queue: Q, persistence: P, cfg: &Config) -> Self {
        GattCache {
            transport,
            host,
            queue,
            persistence,
            registry: CacheRegistry::new(RegistryLimits {
                max_connections: cfg.max_connections,
                max_services: cfg.max_services,
                max_included_services: cfg.max_included_services,
                max_characteristics: cfg.max_characteristics,
                max_descriptors: cfg.max_descriptors,
            }),
            caching_enabled: cfg.caching_enabled,
            include_services_enabled: cfg.include_services_enabled,
            disable_auto_rediscovery: cfg.disable_auto_rediscovery,
            cancel: CancellationToken::new(),
        }
    }

    /// A new connection came up. Creates the peer's cache entry and, if
    /// caching is enabled, attempts to load and verify a persisted record
    /// before falling back to full discovery.
    pub async fn create(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        let info = self.host.find(conn).await.ok_or(CacheError::NotConnected)?;
        self.registry.create(conn, info.peer_addr)?;

        if self.caching_enabled
            && let Ok(Some(raw)) = self.persistence.load(info.peer_addr).await
        {
            match persistence::decode(&raw) {
                Ok((_, hash, store)) => {
                    if let Some(peer) = self.registry.get_mut(conn) {
                        peer.store = store;
                        peer.database_hash = hash;
                        peer.state = CacheState::Loaded;
                    }
                    if info.bonded {
                        // The bond guarantees database stability across
                        // reconnects (GATT spec); skip the hash read.
                        if let Some(peer) = self.registry.get_mut(conn) {
                            peer.state = CacheState::Verified;
                            query::dispatch_pending(peer, &self.queue);
                        }
                        return Ok(());
                    }
                    return self.run_verify(conn).await;
                }
                Err(e) => warn!(error = %e, "discarding corrupt persisted record"),
            }
        }

        self.run_discovery(conn).await
    }

    /// The connection dropped. Destroys the peer's cache entry entirely;
    /// nothing about it survives except whatever was already persisted.
    pub fn broken(&mut self, conn: ConnHandle) {
        self.registry.destroy_by_handle(conn);
    }

    /// Bonding just completed for this peer: re-read its identity address
    /// (the connection may have used a resolvable random address that has
    /// only now been resolved) and persist the current, already-verified
    /// cache so a future reconnect can skip rediscovery.
    pub async fn bonding_established(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        if let Some(info) = self.host.find(conn).await
            && let Some(peer) = self.registry.get_mut(conn)
        {
            peer.identity_address = info.peer_addr;
        }
        if !self.caching_enabled {
            return Ok(());
        }
        self.persist(conn).await
    }

    /// A previously bonded peer reconnected and its identity address is
    /// now resolvable. Updates the existing entry's address in place —
    /// unlike [`GattCache::create`], this must never replace an entry
    /// that is already live on this connection (e.g. freshly discovered
    /// on the very same connection before bonding completed). Only
    /// attempts a persisted-record load when the entry is still `Invalid`.
    pub async fn bonding_restored(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        let info = self.host.find(conn).await.ok_or(CacheError::NotConnected)?;
        let still_invalid = {
            let peer = self.registry.get_mut(conn).ok_or(CacheError::NotConnected)?;
            peer.identity_address = info.peer_addr;
            peer.state == CacheState::Invalid
        };
        if !still_invalid {
            return Ok(());
        }

        if self.caching_enabled
            && let Ok(Some(raw)) = self.persistence.load(info.peer_addr).await
        {
            match persistence::decode(&raw) {
                Ok((_, hash, store)) => {
                    if let Some(peer) = self.registry.get_mut(conn) {
                        peer.store = store;
                        peer.database_hash = hash;
                        peer.state = CacheState::Loaded;
                    }
                    if info.bonded {
                        if let Some(peer) = self.registry.get_mut(conn) {
                            peer.state = CacheState::Verified;
                            query::dispatch_pending(peer, &self.queue);
                        }
                        return Ok(());
                    }
                    return self.run_verify(conn).await;
                }
                Err(e) => warn!(error = %e, "discarding corrupt persisted record"),
            }
        }

        self.run_discovery(conn).await
    }

    /// A Service-Changed indication arrived. The given range is accepted
    /// for calling-convention compatibility but is not consulted — any
    /// change always invalidates the whole cache (see `DESIGN.md`, Open
    /// Question 4). Per `disable_auto_rediscovery`, the peer either begins
    /// rediscovery immediately or is left `Invalid` for the host to
    /// rediscover explicitly later.
    pub async fn update(&mut self, conn: ConnHandle, _start: AttHandle, _end: AttHandle) -> Result<(), CacheError> {
        if self.caching_enabled {
            if let Some(peer) = self.registry.get(conn) {
                let addr = peer.identity_address;
                let _ = self.persistence.reset(addr).await;
            }
        }
        let peer = self.registry.get_mut(conn).ok_or(CacheError::NotConnected)?;
        peer.invalidate();
        if self.disable_auto_rediscovery {
            return Ok(());
        }
        self.run_discovery(conn).await
    }

    pub fn get_service_changed_handle(&self, conn: ConnHandle) -> Option<AttHandle> {
        let peer = self.registry.get(conn)?;
        peer.store
            .characteristics_by_uuid(&GattUuid::SERVICE_CHANGED)
            .first()
            .map(|(_, c)| c.value_handle)
    }

    pub async fn search_services(&mut self, conn: ConnHandle, sink: Sink) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::Services { sink }).await
    }

    pub async fn search_services_by_uuid(
        &mut self,
        conn: ConnHandle,
        uuid: GattUuid,
        sink: Sink,
    ) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::ServicesByUuid { uuid, sink }).await
    }

    pub async fn search_included_services(
        &mut self,
        conn: ConnHandle,
        service_start: AttHandle,
        sink: Sink,
    ) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::IncludedServices { service_start, sink }).await
    }

    pub async fn search_all_characteristics(
        &mut self,
        conn: ConnHandle,
        service_start: AttHandle,
        sink: Sink,
    ) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::AllCharacteristics { service_start, sink }).await
    }

    pub async fn search_characteristics_by_uuid(
        &mut self,
        conn: ConnHandle,
        uuid: GattUuid,
        sink: Sink,
    ) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::CharacteristicsByUuid { uuid, sink }).await
    }

    pub async fn search_all_descriptors(
        &mut self,
        conn: ConnHandle,
        service_start: AttHandle,
        char_value_handle: AttHandle,
        sink: Sink,
    ) -> Result<(), CacheError> {
        self.dispatch(conn, PendingRequest::AllDescriptors {
            service_start,
            char_value_handle,
            sink,
        })
        .await
    }

    /// The peer's current cache state, mostly useful for tests and
    /// diagnostics; ordinary callers drive behavior through the query
    /// methods instead of polling this.
    pub fn registry_state(&self, conn: ConnHandle) -> Option<CacheState> {
        self.registry.get(conn).map(|peer| peer.state)
    }

    pub fn get_service_with_uuid(&self, conn: ConnHandle, uuid: &GattUuid) -> Vec<ServiceRecord> {
        self.registry
            .get(conn)
            .map(|peer| query::get_service_with_uuid(peer, uuid))
            .unwrap_or_default()
    }

    pub fn get_db_in_range(&self, conn: ConnHandle, range: AttHandleRange) -> Vec<AttHandle> {
        self.registry
            .get(conn)
            .map(|peer| query::get_db_in_range(peer, range))
            .unwrap_or_default()
    }

    pub fn get_db_with_operation(
        &self,
        conn: ConnHandle,
        range: AttHandleRange,
        kind: AttrKind,
    ) -> Vec<AttHandle> {
        self.registry
            .get(conn)
            .map(|peer| query::get_db_with_operation(peer, range, kind))
            .unwrap_or_default()
    }

    pub fn attr_count(&self, conn: ConnHandle) -> usize {
        self.registry.get(conn).map(|peer| query::attr_count(peer)).unwrap_or(0)
    }

    pub fn get_db_size_in_range(&self, conn: ConnHandle, range: AttHandleRange) -> usize {
        self.registry
            .get(conn)
            .map(|peer| query::get_db_size_in_range(peer, range))
            .unwrap_or(0)
    }

    /// The Query Router's per-call entry point (§4.5): park the request
    /// against the peer's current state, then kick off whatever work that
    /// state still requires — a `LOADED` peer needs its hash verified, an
    /// `INVALID` one needs full discovery. A peer already mid-discovery or
    /// mid-verification just gets the request parked; the driver already
    /// running will re-dispatch it on completion via
    /// [`query::dispatch_pending`].
    async fn dispatch(&mut self, conn: ConnHandle, req: PendingRequest) -> Result<(), CacheError> {
        if !self.caching_enabled {
            return Err(CacheError::NotSupported);
        }
        let state = self.registry.get(conn).ok_or(CacheError::NotConnected)?.state;
        {
            let peer = self.registry.get_mut(conn).ok_or(CacheError::NotConnected)?;
            query::submit(peer, &self.queue, req);
        }
        match state {
            CacheState::Loaded => self.run_verify(conn).await,
            CacheState::Invalid => self.run_discovery(conn).await,
            _ => Ok(()),
        }
    }

    async fn run_verify(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        let outcome = {
            let peer = self.registry.get_mut(conn).ok_or(CacheError::NotConnected)?;
            verify::run_verify(&self.transport, conn, peer, &self.cancel)
                .await
                .map_err(|_| CacheError::Peer(PeerError::Disconnected))?
        };
        match outcome {
            VerifyOutcome::Matched => {
                if let Some(peer) = self.registry.get_mut(conn) {
                    query::dispatch_pending(peer, &self.queue);
                }
                Ok(())
            }
            VerifyOutcome::Mismatched => self.run_discovery(conn).await,
        }
    }

    async fn run_discovery(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        {
            let peer = self.registry.get_mut(conn).ok_or(CacheError::NotConnected)?;
            if let Err(e) = discovery::run_discovery(
                &self.transport,
                conn,
                peer,
                &self.cancel,
                self.include_services_enabled,
            )
            .await
            {
                warn!(error = %e, "discovery aborted, invalidating cache entry");
                peer.invalidate();
                return Err(CacheError::Peer(PeerError::Disconnected));
            }
        }
        if let Err(e) = self.registry.check_capacity(conn) {
            if let Some(peer) = self.registry.get_mut(conn) {
                peer.invalidate();
            }
            return Err(e);
        }
        self.refresh_database_hash(conn).await;
        if self.caching_enabled {
            self.persist(conn).await?;
        }
        if let Some(peer) = self.registry.get_mut(conn) {
            query::dispatch_pending(peer, &self.queue);
        }
        Ok(())
    }

    /// After a fresh discovery pass, read the peer's current Database
    /// Hash so the next reconnect's verification has something to compare
    /// against. Best-effort: a peer without the characteristic simply
    /// keeps an all-zero hash, which will always fail verification and
    /// fall back to rediscovery.
    async fn refresh_database_hash(&mut self, conn: ConnHandle) {
        let range = AttHandleRange::whole_database();
        let read = self
            .transport
            .read_by_uuid(conn, range.start, range.end, GattUuid::DATABASE_HASH)
            .await;
        if let (Ok(bytes), Some(peer)) = (read, self.registry.get_mut(conn))
            && bytes.len() == 16
        {
            peer.database_hash.copy_from_slice(&bytes);
        }
    }

    async fn persist(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        let Some(peer) = self.registry.get(conn) else {
            return Ok(());
        };
        let encoded = persistence::encode(peer.identity_address, &peer.database_hash, &peer.store);
        self.persistence.save(peer.identity_address, encoded).await?;
        Ok(())
    }
}
