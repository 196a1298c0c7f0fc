// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// The outcome of one state's `step`: move to a new state, stay put (used
/// by states that loop internally while accumulating results), or finish
/// the whole machine.
pub enum Transition<S, R> {
    Next(S, R),
    Stay(R),
    Done(R),
}

/// One state in a driver's state machine. `step` runs the state's async
/// work against the driver context and returns where to go next.
pub trait StateMachine<Ctx, RespCtx>: Sized {
    type StepResult<'a>: Future<Output = RespCtx> + Send + 'a
    where
        Self: 'a,
        RespCtx: 'a,
        Ctx: 'a;

    fn step<'a>(&'a self, ctx: &'a mut Ctx) -> Self::StepResult<'a>;
}

/// A driver context that owns its own state machine and can run it to
/// completion. `execute` loops `step` until a state returns
/// [`Transition::Done`], cancelling promptly if `cancel` fires.
pub trait StateMachineCtx<Ctx, Res> {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<Res>;
}
