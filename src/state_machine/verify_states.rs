// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Hash Verifier: reads the peer's Database Hash characteristic and
//! compares it byte-wise against the persisted hash.

use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    handle::AttHandleRange,
    peer::{CacheState, PeerCacheEntry},
    state_machine::common::{StateMachine, StateMachineCtx, Transition},
    transport::{AttTransport, ConnHandle},
    uuid::GattUuid,
};

/// Result of one verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The peer's current hash matches the persisted one; the cache is
    /// usable as-is.
    Matched,
    /// The peer's hash differs (or no persisted hash exists); a full
    /// rediscovery is required.
    Mismatched,
}

pub struct VerifyCtx<'a, T: AttTransport> {
    transport: &'a T,
    conn: ConnHandle,
    peer: &'a mut PeerCacheEntry,
    read_hash: Option<Vec<u8>>,
    state: Option<VerifyStates>,
}

impl<'a, T: AttTransport> VerifyCtx<'a, T> {
    pub fn new(transport: &'a T, conn: ConnHandle, peer: &'a mut PeerCacheEntry) -> Self {
        VerifyCtx {
            transport,
            conn,
            peer,
            read_hash: None,
            state: Some(VerifyStates::SendReadByUuid(SendReadByUuid)),
        }
    }
}

#[derive(Debug)]
pub struct SendReadByUuid;
#[derive(Debug)]
pub struct AwaitResult;

#[derive(Debug)]
pub enum VerifyStates {
    SendReadByUuid(SendReadByUuid),
    AwaitResult(AwaitResult),
}

type VerifyStepOut = Transition<VerifyStates, Result<()>>;

impl<'ctx, T: AttTransport> StateMachine<VerifyCtx<'ctx, T>, VerifyStepOut> for SendReadByUuid {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = VerifyStepOut> + Send + 'a>>
    where
        Self: 'a,
        VerifyCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut VerifyCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            ctx.peer.state = CacheState::VerifyInProgress;
            match ctx
                .transport
                .read_by_uuid(
                    ctx.conn,
                    AttHandleRange::whole_database().start,
                    AttHandleRange::whole_database().end,
                    GattUuid::DATABASE_HASH,
                )
                .await
            {
                Ok(bytes) => {
                    ctx.read_hash = Some(bytes);
                    Transition::Next(VerifyStates::AwaitResult(AwaitResult), Ok(()))
                }
                Err(e) => {
                    // A failed hash read is local recovery, not a
                    // user-visible error: treat it exactly like a
                    // mismatch and let the caller fall back to full
                    // discovery.
                    debug!(error = %e, "database hash read failed, falling back to rediscovery");
                    Transition::Done(Ok(()))
                }
            }
        })
    }
}

impl<'ctx, T: AttTransport> StateMachine<VerifyCtx<'ctx, T>, VerifyStepOut> for AwaitResult {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = VerifyStepOut> + Send + 'a>>
    where
        Self: 'a,
        VerifyCtx<'ctx, T>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut VerifyCtx<'ctx, T>) -> Self::StepResult<'a> {
        Box::pin(async move {
            let bytes = match ctx.read_hash.take() {
                Some(b) => b,
                None => return Transition::Done(Err(anyhow!("no hash read result in ctx"))),
            };
            if bytes.len() != 16 {
                // A malformed hash value is treated the same as a
                // mismatch: fall back to rediscovery rather than
                // surfacing an error to the caller.
                debug!(
                    len = bytes.len(),
                    "database hash characteristic value was not 16 bytes, treating as mismatch"
                );
                return Transition::Done(Ok(()));
            }
            let mut observed = [0u8; 16];
            observed.copy_from_slice(&bytes);
            let matches = observed == ctx.peer.database_hash;
            if matches {
                ctx.peer.state = CacheState::Verified;
            }
            debug!(matches, "database hash comparison complete");
            Transition::Done(Ok(()))
        })
    }
}

impl<'ctx, T: AttTransport> StateMachineCtx<VerifyCtx<'ctx, T>, VerifyOutcome> for VerifyCtx<'ctx, T> {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<VerifyOutcome> {
        debug!("hash verifier loop start");
        loop {
            if cancel.is_cancelled() {
                return Err(anyhow!("verification cancelled"));
            }
            let state = self.state.take().context("state must be set on VerifyCtx")?;
            let trans = match &state {
                VerifyStates::SendReadByUuid(s) => s.step(self).await,
                VerifyStates::AwaitResult(s) => s.step(self).await,
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
                Transition::Done(r) => {
                    r?;
                    return Ok(if self.peer.state == CacheState::Verified {
                        VerifyOutcome::Matched
                    } else {
                        VerifyOutcome::Mismatched
                    });
                }
            }
        }
    }
}
