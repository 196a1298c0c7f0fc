// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Discovery Driver: walks a peer's GATT database through
//! service → include → characteristic → descriptor discovery, one
//! `StateMachine` state per phase.

use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    handle::AttHandle,
    peer::{CacheState, PeerCacheEntry},
    state_machine::common::{StateMachine, StateMachineCtx, Transition},
    store::{IncludedServiceRecord, ServiceKind, ServiceRecord},
    transport::{AttTransport, ConnHandle},
};

/// Drives one full discovery pass for a peer. Borrowed rather than owned:
/// the cache facade holds the long-lived `PeerCacheEntry`, this context
/// only exists for the duration of one discovery pass.
pub struct DiscoveryCtx<'a, T: AttTransport> {
    pub transport: &'a T,
    pub conn: ConnHandle,
    pub peer: &'a mut PeerCacheEntry,
    /// Build-time toggle for the included-service phase (§6
    /// `include_services_enabled`). When `false` the driver skips
    /// `INC_DISC_IN_PROGRESS` entirely and goes straight from service
    /// discovery to characteristic discovery.
    include_services_enabled: bool,
    state: Option<DiscoveryStates>,
}

impl<'a, T: AttTransport> DiscoveryCtx<'a, T> {
    pub fn new(transport: &'a T, conn: ConnHandle, peer: &'a mut PeerCacheEntry) -> Self {
        Self::with_options(transport, conn, peer, true)
    }

    pub fn with_options(
        transport: &'a T,
        conn: ConnHandle,
        peer: &'a mut PeerCacheEntry,
        include_services_enabled: bool,
    ) -> Self {
        DiscoveryCtx {
            transport,
            conn,
            peer,
            include_services_enabled,
            state: Some(DiscoveryStates::SvcDisc(SvcDisc)),
        }
    }

    fn current_service_end(&self, idx: usize) -> AttHandle {
        self.peer
            .store
            .service_at(idx)
            .map(|s| s.end_handle)
            .unwrap_or(AttHandle::END_OF_RANGE)
    }

    /// The next service index from `from` onward whose handle range has
    /// room for characteristics and that hasn't had any discovered yet.
    /// Services with no characteristic-bearing handles and services
    /// already populated (e.g. reactively inserted by include discovery,
    /// then visited) are skipped.
    fn next_service_needing_characteristics(&self, from: usize) -> Option<usize> {
        (from..self.peer.store.service_count()).find(|&i| {
            self.peer
                .store
                .service_at(i)
                .is_some_and(|s| s.characteristics.is_empty() && s.end_handle.0 > s.start_handle.0)
        })
    }
}

#[derive(Debug)]
pub struct SvcDisc;
#[derive(Debug)]
pub struct IncDisc;
#[derive(Debug)]
pub struct ChrDisc;
#[derive(Debug)]
pub struct DscDisc;

#[derive(Debug)]
pub enum DiscoveryStates {
    SvcDisc(SvcDisc),
    IncDisc(IncDisc),
    ChrDisc(ChrDisc),
    DscDisc(DscDisc),
}

type DiscoveryStepOut = Transition<DiscoveryStates, Result<()>>;

impl<'ctx, T: AttTransport> StateMachine<DiscoveryCtx<'ctx, T>, DiscoveryStepOut> for SvcDisc {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = DiscoveryStepOut> + Send + 'a>>
    where
        Self: 'a,
        DiscoveryCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut DiscoveryCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            ctx.peer.state = CacheState::SvcDiscInProgress;
            let discovered = match ctx.transport.discover_all_primary_services(ctx.conn).await {
                Ok(v) => v,
                Err(e) => return Transition::Done(Err(e.into())),
            };
            for svc in discovered {
                ctx.peer.store.insert_service(ServiceRecord::new(
                    svc.kind,
                    svc.start_handle,
                    svc.end_handle,
                    svc.uuid,
                ));
            }
            if ctx.peer.store.service_count() == 0 {
                if let Err(e) = ctx.peer.store.sanity_pass() {
                    return Transition::Done(Err(e.into()));
                }
                ctx.peer.state = CacheState::Verified;
                return Transition::Done(Ok(()));
            }
            ctx.peer.cur_service = Some(0);
            debug!(services = ctx.peer.store.service_count(), "svc_disc complete");
            if ctx.include_services_enabled {
                Transition::Next(DiscoveryStates::IncDisc(IncDisc), Ok(()))
            } else {
                Transition::Next(DiscoveryStates::ChrDisc(ChrDisc), Ok(()))
            }
        })
    }
}

impl<'ctx, T: AttTransport> StateMachine<DiscoveryCtx<'ctx, T>, DiscoveryStepOut> for IncDisc {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = DiscoveryStepOut> + Send + 'a>>
    where
        Self: 'a,
        DiscoveryCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut DiscoveryCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            ctx.peer.state = CacheState::IncDiscInProgress;
            let idx = match ctx.peer.cur_service {
                Some(idx) => idx,
                None => return Transition::Done(Err(anyhow!("inc_disc with no current service"))),
            };
            let (start, end) = {
                let svc = match ctx.peer.store.service_at(idx) {
                    Some(s) => s,
                    None => return Transition::Done(Err(anyhow!("cur_service index out of bounds"))),
                };
                (svc.start_handle, svc.end_handle)
            };

            let includes = match ctx.transport.find_included_services(ctx.conn, start, end).await {
                Ok(v) => v,
                Err(e) => return Transition::Done(Err(e.into())),
            };

            for inc in &includes {
                // Option A fidelity: a secondary service named by an include
                // that we have not yet seen is inserted reactively, rather
                // than waiting for it to ever surface via primary discovery
                // (it never will — secondary services aren't reported by
                // primary-service discovery).
                if ctx
                    .peer
                    .store
                    .find_service_index_by_start_handle(inc.included_start_handle)
                    .is_none()
                {
                    ctx.peer.store.insert_service(ServiceRecord::new(
                        ServiceKind::Secondary,
                        inc.included_start_handle,
                        inc.included_end_handle,
                        inc.uuid,
                    ));
                }
            }
            for inc in includes {
                if let Err(e) = ctx.peer.store.insert_included(idx, IncludedServiceRecord {
                    handle: inc.handle,
                    included_start_handle: inc.included_start_handle,
                    included_end_handle: inc.included_end_handle,
                    uuid: inc.uuid,
                }) {
                    return Transition::Done(Err(e.into()));
                }
            }

            let next_idx = idx + 1;
            if next_idx < ctx.peer.store.service_count() {
                ctx.peer.cur_service = Some(next_idx);
                Transition::Stay(Ok(()))
            } else {
                ctx.peer.cur_service = Some(0);
                Transition::Next(DiscoveryStates::ChrDisc(ChrDisc), Ok(()))
            }
        })
    }
}

impl<'ctx, T: AttTransport> StateMachine<DiscoveryCtx<'ctx, T>, DiscoveryStepOut> for ChrDisc {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = DiscoveryStepOut> + Send + 'a>>
    where
        Self: 'a,
        DiscoveryCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut DiscoveryCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            ctx.peer.state = CacheState::ChrDiscInProgress;
            let idx = match ctx.peer.cur_service {
                Some(idx) => idx,
                None => return Transition::Done(Err(anyhow!("chr_disc with no current service"))),
            };
            let (start, end) = {
                let svc = match ctx.peer.store.service_at(idx) {
                    Some(s) => s,
                    None => return Transition::Done(Err(anyhow!("cur_service index out of bounds"))),
                };
                (svc.start_handle, svc.end_handle)
            };

            if end.0 > start.0 {
                let chars = match ctx
                    .transport
                    .discover_all_characteristics(ctx.conn, start, end)
                    .await
                {
                    Ok(v) => v,
                    Err(e) => return Transition::Done(Err(e.into())),
                };
                for chr in chars {
                    if let Err(e) = ctx.peer.store.insert_characteristic(idx, chr) {
                        return Transition::Done(Err(e.into()));
                    }
                }
            }

            match ctx.next_service_needing_characteristics(idx + 1) {
                Some(next_idx) => {
                    ctx.peer.cur_service = Some(next_idx);
                    Transition::Stay(Ok(()))
                }
                None => {
                    ctx.peer.cur_service = Some(0);
                    // watermark starts at 1: characteristic index 0 is "already
                    // done" conceptually the moment descriptor discovery begins
                    // walking from the first characteristic.
                    ctx.peer.prev_characteristic_watermark = 1;
                    Transition::Next(DiscoveryStates::DscDisc(DscDisc), Ok(()))
                }
            }
        })
    }
}

impl<'ctx, T: AttTransport> StateMachine<DiscoveryCtx<'ctx, T>, DiscoveryStepOut> for DscDisc {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = DiscoveryStepOut> + Send + 'a>>
    where
        Self: 'a,
        DiscoveryCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut DiscoveryCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            ctx.peer.state = CacheState::DscDiscInProgress;
            let svc_idx = match ctx.peer.cur_service {
                Some(idx) => idx,
                None => return Transition::Done(Err(anyhow!("dsc_disc with no current service"))),
            };
            let svc_end = ctx.current_service_end(svc_idx);

            let (char_count, value_handle, end) = {
                let svc = match ctx.peer.store.service_at(svc_idx) {
                    Some(s) => s,
                    None => return Transition::Done(Err(anyhow!("cur_service index out of bounds"))),
                };
                let watermark = ctx.peer.prev_characteristic_watermark as usize;
                let char_idx = watermark.saturating_sub(1);
                match svc.characteristics.get(char_idx) {
                    Some(chr) => {
                        let end = chr.effective_end_handle(svc.characteristics.get(char_idx + 1), svc_end);
                        (svc.characteristics.len(), chr.value_handle, end)
                    }
                    None => (svc.characteristics.len(), AttHandle(0), AttHandle(0)),
                }
            };

            let watermark = ctx.peer.prev_characteristic_watermark as usize;
            if watermark > char_count {
                // this service's characteristics are all done; advance
                let next_idx = svc_idx + 1;
                if next_idx < ctx.peer.store.service_count() {
                    ctx.peer.cur_service = Some(next_idx);
                    ctx.peer.prev_characteristic_watermark = 1;
                    return Transition::Stay(Ok(()));
                } else {
                    ctx.peer.cur_service = None;
                    ctx.peer.prev_characteristic_watermark = 0;
                    ctx.peer.store.finalize_open_ended_services();
                    if let Err(e) = ctx.peer.store.sanity_pass() {
                        return Transition::Done(Err(e.into()));
                    }
                    ctx.peer.state = CacheState::Verified;
                    return Transition::Done(Ok(()));
                }
            }

            if end < value_handle.next() {
                // no descriptor space for this characteristic
                ctx.peer.prev_characteristic_watermark += 1;
                return Transition::Stay(Ok(()));
            }

            let descriptors = match ctx
                .transport
                .discover_all_descriptors(ctx.conn, value_handle.next(), end)
                .await
            {
                Ok(v) => v,
                Err(e) => return Transition::Done(Err(e.into())),
            };
            for dsc in descriptors {
                if let Err(e) = ctx.peer.store.insert_descriptor(svc_idx, value_handle, dsc) {
                    return Transition::Done(Err(e.into()));
                }
            }
            ctx.peer.prev_characteristic_watermark += 1;
            Transition::Stay(Ok(()))
        })
    }
}

impl<'ctx, T: AttTransport> StateMachineCtx<DiscoveryCtx<'ctx, T>, ()> for DiscoveryCtx<'ctx, T> {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<()> {
        debug!("discovery driver loop start");
        loop {
            if cancel.is_cancelled() {
                return Err(anyhow!("discovery cancelled"));
            }
            let state = self.state.take().context("state must be set on DiscoveryCtx")?;
            let trans = match &state {
                DiscoveryStates::SvcDisc(s) => s.step(self).await,
                DiscoveryStates::IncDisc(s) => s.step(self).await,
                DiscoveryStates::ChrDisc(s) => s.step(self).await,
                DiscoveryStates::DscDisc(s) => s.step(self).await,
            };
            match trans {
                Transition::Next(next, r) => {
                    r?;
                    self.state = Some(next);
                }
                Transition::Stay(r) => {
                    r?;
                    self.state = Some(state);
                }
                Transition::Done(r) => return r,
            }
        }
    }
}
