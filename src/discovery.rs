// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Entry point for running one discovery pass against a peer.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::{
    peer::PeerCacheEntry,
    state_machine::{common::StateMachineCtx, discovery_states::DiscoveryCtx},
    transport::{AttTransport, ConnHandle},
};

/// Run full service → include → characteristic → descriptor discovery for
/// `peer` over `transport`. On success the peer's attribute store is fully
/// populated and its state is [`crate::peer::CacheState::Verified`].
pub async fn run_discovery<T: AttTransport>(
    transport: &T,
    conn: ConnHandle,
    peer: &mut PeerCacheEntry,
    cancel: &CancellationToken,
    include_services_enabled: bool,
) -> Result<()> {
    peer.invalidate();
    let mut ctx = DiscoveryCtx::with_options(transport, conn, peer, include_services_enabled);
    ctx.execute(cancel).await
}
