// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Entry point for running one Database Hash verification pass.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::{
    peer::PeerCacheEntry,
    state_machine::{
        common::StateMachineCtx,
        verify_states::{VerifyCtx, VerifyOutcome},
    },
    transport::{AttTransport, ConnHandle},
};

/// Read the peer's Database Hash characteristic and compare it against the
/// persisted hash for `peer`.
pub async fn run_verify<T: AttTransport>(
    transport: &T,
    conn: ConnHandle,
    peer: &mut PeerCacheEntry,
    cancel: &CancellationToken,
) -> Result<VerifyOutcome> {
    let mut ctx = VerifyCtx::new(transport, conn, peer);
    ctx.execute(cancel).await
}
