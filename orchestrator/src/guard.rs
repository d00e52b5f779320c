//! Shared handle over [`GuardState`] plus the RAII pieces that make the token
//! protocol hard to misuse.
//!
//! - [`TurnClaim`] owns the turn lock and releases it on drop, whatever way the
//!   turn ends.
//! - [`TurnScope`] is what step code carries: it answers "is my token still
//!   current?" and turns pacing sleeps into cancellation points.
//! - [`StepSlot`] holds the single resolving-step slot for one step.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::guard_state::{GuardRejection, GuardState, TurnToken};
use crate::core::phase::TurnPhase;
use crate::core::types::AgentId;
use crate::io::world::WriteGate;

struct GuardInner {
    state: GuardState,
    cancel: CancellationToken,
}

/// One per orchestrator instance (one per room).
pub struct TurnGuard {
    inner: Mutex<GuardInner>,
}

/// Point-in-time copy of the guard, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub current: Option<TurnToken>,
    pub locked: bool,
    pub resolving_step: bool,
    pub attacked_this_turn: bool,
    pub phase: TurnPhase,
    pub cancelled: bool,
}

impl TurnGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(GuardInner {
                state: GuardState::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Issue a fresh token and take the lock. `None` while a turn is in flight.
    pub fn begin(self: &Arc<Self>, agent: AgentId) -> Option<TurnClaim> {
        let mut inner = self.lock();
        let generation = inner.state.next_generation();
        let token = inner.state.issue_turn(agent, generation, Utc::now())?;
        let cancel = CancellationToken::new();
        inner.cancel = cancel.clone();
        debug!(agent = %agent, serial = token.serial(), "turn token issued");
        Some(TurnClaim {
            scope: TurnScope {
                guard: Arc::clone(self),
                token,
                cancel,
            },
        })
    }

    pub fn validate(&self, token: &TurnToken) -> bool {
        self.lock().state.validate(token)
    }

    /// Supersede the live turn. Its pending sleeps and waits wake immediately;
    /// calls already handed to collaborators run to completion but their
    /// results are discarded.
    pub fn cancel(&self) -> Option<TurnToken> {
        let mut inner = self.lock();
        let cancelled = inner.state.cancel()?;
        inner.cancel.cancel();
        debug!(serial = cancelled.serial(), "turn cancelled");
        Some(cancelled)
    }

    pub fn enter_step(
        self: &Arc<Self>,
        token: &TurnToken,
        phase: TurnPhase,
    ) -> Result<StepSlot, GuardRejection> {
        self.lock().state.enter_step(token, phase)?;
        Ok(StepSlot {
            guard: Arc::clone(self),
            token: token.clone(),
        })
    }

    pub fn claim_attack(&self, token: &TurnToken) -> Result<(), GuardRejection> {
        self.lock().state.claim_attack(token)
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let inner = self.lock();
        let state = &inner.state;
        GuardSnapshot {
            current: state.current().cloned(),
            locked: state.is_locked(),
            resolving_step: state.is_resolving_step(),
            attacked_this_turn: state.attacked_this_turn(),
            phase: state.phase(),
            cancelled: state.is_cancelled(),
        }
    }

    fn release(&self, token: &TurnToken) {
        if self.lock().state.release(token) {
            debug!(serial = token.serial(), "turn lock released");
        }
    }

    fn exit_step(&self, token: &TurnToken) {
        self.lock().state.exit_step(token);
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of the turn lock. Dropping it releases the lock.
pub struct TurnClaim {
    scope: TurnScope,
}

impl TurnClaim {
    pub fn scope(&self) -> &TurnScope {
        &self.scope
    }
}

impl Drop for TurnClaim {
    fn drop(&mut self) {
        self.scope.guard.release(&self.scope.token);
    }
}

/// Token-bound view of the guard carried through every step.
#[derive(Clone)]
pub struct TurnScope {
    guard: Arc<TurnGuard>,
    token: TurnToken,
    cancel: CancellationToken,
}

impl TurnScope {
    pub fn token(&self) -> &TurnToken {
        &self.token
    }

    pub fn agent(&self) -> AgentId {
        self.token.agent()
    }

    pub fn is_current(&self) -> bool {
        self.guard.validate(&self.token)
    }

    /// Sleep for `duration`. Returns whether the turn is still current
    /// afterwards; wakes early with `false` on cancellation.
    pub async fn pause(&self, duration: Duration) -> bool {
        if !duration.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(duration) => {}
            }
        }
        self.is_current()
    }

    /// Await `wait` unless the turn is cancelled first. The output is dropped
    /// when the token went stale while waiting.
    pub async fn until<F: Future>(&self, wait: F) -> Option<F::Output> {
        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            output = wait => output,
        };
        self.is_current().then_some(output)
    }
}

impl WriteGate for TurnScope {
    fn permits_write(&self) -> bool {
        self.is_current()
    }
}

/// The resolving-step slot. Dropping it frees the slot.
pub struct StepSlot {
    guard: Arc<TurnGuard>,
    token: TurnToken,
}

impl Drop for StepSlot {
    fn drop(&mut self) {
        self.guard.exit_step(&self.token);
    }
}
