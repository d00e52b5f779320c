//! Turn token protocol and the per-orchestrator guard record.
//!
//! The guard is plain data: callers serialize access to it (see
//! [`crate::guard::TurnGuard`]). Every rejection is a value, never an error.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::phase::TurnPhase;
use crate::core::types::AgentId;

/// Opaque identifier scoping one turn attempt. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnToken {
    agent: AgentId,
    generation: u64,
    serial: u64,
    issued_at: DateTime<Utc>,
}

impl TurnToken {
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Monotonic per-orchestrator counter; unique even when two tokens share
    /// an issue time.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Why the guard refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GuardRejection {
    /// A turn is already in flight.
    Locked,
    /// Another step of the same turn is resolving.
    StepBusy,
    /// The token was superseded or cancelled.
    Stale,
    /// The turn already spent its attack.
    AlreadyAttacked,
    IllegalTransition { from: TurnPhase, to: TurnPhase },
}

#[derive(Debug, Default)]
pub struct GuardState {
    current: Option<TurnToken>,
    locked: bool,
    resolving_step: bool,
    attacked_this_turn: bool,
    phase: TurnPhase,
    cancelled: bool,
    last_generation: u64,
    serial: u64,
}

impl GuardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token and take the turn lock. Returns `None` while locked.
    pub fn issue_turn(
        &mut self,
        agent: AgentId,
        generation: u64,
        issued_at: DateTime<Utc>,
    ) -> Option<TurnToken> {
        if self.locked {
            return None;
        }
        self.serial += 1;
        let token = TurnToken {
            agent,
            generation,
            serial: self.serial,
            issued_at,
        };
        self.current = Some(token.clone());
        self.locked = true;
        self.resolving_step = false;
        self.attacked_this_turn = false;
        self.phase = TurnPhase::Idle;
        self.cancelled = false;
        self.last_generation = generation;
        Some(token)
    }

    pub fn next_generation(&self) -> u64 {
        self.last_generation + 1
    }

    /// True iff `token` is the current token and the turn is not cancelled.
    pub fn validate(&self, token: &TurnToken) -> bool {
        !self.cancelled && self.current.as_ref() == Some(token)
    }

    /// Invalidate the current token. Returns the token that was cancelled, if
    /// any turn was live.
    ///
    /// In-flight work is not aborted here; continuations observe the mismatch
    /// on their next validation.
    pub fn cancel(&mut self) -> Option<TurnToken> {
        if self.cancelled || self.phase.is_terminal() {
            return None;
        }
        let token = self.current.clone()?;
        self.cancelled = true;
        self.phase = TurnPhase::Cancelled;
        Some(token)
    }

    /// Claim the single step slot and advance the phase.
    pub fn enter_step(&mut self, token: &TurnToken, phase: TurnPhase) -> Result<(), GuardRejection> {
        if !self.validate(token) {
            return Err(GuardRejection::Stale);
        }
        if self.resolving_step {
            return Err(GuardRejection::StepBusy);
        }
        if !self.phase.can_advance_to(phase) {
            return Err(GuardRejection::IllegalTransition {
                from: self.phase,
                to: phase,
            });
        }
        self.resolving_step = true;
        self.phase = phase;
        Ok(())
    }

    pub fn exit_step(&mut self, token: &TurnToken) {
        if self.current.as_ref() == Some(token) {
            self.resolving_step = false;
        }
    }

    /// Mark the attack as spent. Must run before the attack's side effects.
    pub fn claim_attack(&mut self, token: &TurnToken) -> Result<(), GuardRejection> {
        if !self.validate(token) {
            return Err(GuardRejection::Stale);
        }
        if self.attacked_this_turn {
            return Err(GuardRejection::AlreadyAttacked);
        }
        self.attacked_this_turn = true;
        Ok(())
    }

    /// Release the turn lock held by `token`. A release by a superseded token
    /// that no longer owns the lock is ignored.
    pub fn release(&mut self, token: &TurnToken) -> bool {
        if self.current.as_ref() != Some(token) || !self.locked {
            return false;
        }
        self.locked = false;
        self.resolving_step = false;
        true
    }

    pub fn current(&self) -> Option<&TurnToken> {
        self.current.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_resolving_step(&self) -> bool {
        self.resolving_step
    }

    pub fn attacked_this_turn(&self) -> bool {
        self.attacked_this_turn
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(state: &mut GuardState, agent: u32) -> Option<TurnToken> {
        let generation = state.next_generation();
        state.issue_turn(AgentId(agent), generation, Utc::now())
    }

    #[test]
    fn issue_rejects_reentry_while_locked() {
        let mut state = GuardState::new();
        let first = issue(&mut state, 1).expect("first token");
        assert!(state.is_locked());
        assert!(issue(&mut state, 1).is_none());

        assert!(state.release(&first));
        let second = issue(&mut state, 1).expect("second token");
        assert_ne!(first, second);
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[test]
    fn tokens_issued_at_the_same_instant_are_distinct() {
        let mut state = GuardState::new();
        let at = Utc::now();
        let first = state.issue_turn(AgentId(1), 1, at).expect("first");
        state.release(&first);
        let second = state.issue_turn(AgentId(1), 1, at).expect("second");
        assert_ne!(first, second);
        assert!(!state.validate(&first));
        assert!(state.validate(&second));
    }

    #[test]
    fn cancel_invalidates_token_and_moves_to_cancelled() {
        let mut state = GuardState::new();
        let token = issue(&mut state, 3).expect("token");
        state.enter_step(&token, TurnPhase::Move).expect("move");

        assert_eq!(state.cancel(), Some(token.clone()));
        assert!(!state.validate(&token));
        assert_eq!(state.phase(), TurnPhase::Cancelled);
        assert_eq!(state.cancel(), None);
        assert_eq!(
            state.enter_step(&token, TurnPhase::RoomAction),
            Err(GuardRejection::Stale)
        );
        // The superseded run still owns the lock until it unwinds.
        assert!(state.is_locked());
        assert!(state.release(&token));
    }

    #[test]
    fn only_one_step_resolves_at_a_time() {
        let mut state = GuardState::new();
        let token = issue(&mut state, 1).expect("token");
        state.enter_step(&token, TurnPhase::Move).expect("move");
        assert_eq!(
            state.enter_step(&token, TurnPhase::RoomAction),
            Err(GuardRejection::StepBusy)
        );
        state.exit_step(&token);
        state
            .enter_step(&token, TurnPhase::RoomAction)
            .expect("room action");
    }

    #[test]
    fn phases_never_move_backward() {
        let mut state = GuardState::new();
        let token = issue(&mut state, 1).expect("token");
        state.enter_step(&token, TurnPhase::Move).expect("move");
        state.exit_step(&token);
        state
            .enter_step(&token, TurnPhase::RoomAction)
            .expect("room action");
        state.exit_step(&token);
        assert_eq!(
            state.enter_step(&token, TurnPhase::Move),
            Err(GuardRejection::IllegalTransition {
                from: TurnPhase::RoomAction,
                to: TurnPhase::Move,
            })
        );
    }

    #[test]
    fn attack_is_claimed_once_per_token() {
        let mut state = GuardState::new();
        let token = issue(&mut state, 1).expect("token");
        assert_eq!(state.claim_attack(&token), Ok(()));
        assert_eq!(
            state.claim_attack(&token),
            Err(GuardRejection::AlreadyAttacked)
        );

        state.release(&token);
        let next = issue(&mut state, 1).expect("next token");
        assert!(!state.attacked_this_turn());
        assert_eq!(state.claim_attack(&token), Err(GuardRejection::Stale));
        assert_eq!(state.claim_attack(&next), Ok(()));
    }

    #[test]
    fn stale_release_does_not_unlock_newer_turn() {
        let mut state = GuardState::new();
        let old = issue(&mut state, 1).expect("old");
        state.release(&old);
        let _new = issue(&mut state, 2).expect("new");
        assert!(!state.release(&old));
        assert!(state.is_locked());
    }
}
