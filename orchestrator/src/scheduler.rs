//! Turn scheduler: move, room action, at most one attack, end.
//!
//! One turn runs at a time per [`TurnGuard`]. Steps are separated by the
//! configured pacing gap, each runs inside the resolving-step slot, and every
//! suspension is followed by a token check. A superseded turn stops quietly;
//! a failing step aborts the turn. Either way the lock is released when the
//! [`TurnClaim`](crate::guard::TurnClaim) drops.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::card_flow::CardFlow;
use crate::core::guard_state::{GuardRejection, TurnToken};
use crate::core::phase::TurnPhase;
use crate::core::target::select_target;
use crate::core::types::{AgentId, AttackRecord, RollKind, RoomActionOutcome};
use crate::error::TurnError;
use crate::guard::{StepSlot, TurnGuard, TurnScope};
use crate::io::lease::Lease;
use crate::io::world::paths;
use crate::room_action::RoomActionResolver;
use crate::session::Session;
use crate::sync_gate::VisualSyncGate;

/// One entry of a turn's step trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTrace {
    pub phase: TurnPhase,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub started: Instant,
}

/// Record written to `turns/<serial>` when a turn reaches its End step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRecord {
    pub token: TurnToken,
    pub steps: Vec<StepTrace>,
    pub room_action: Option<RoomActionOutcome>,
    pub attack: Option<AttackRecord>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TurnRecord {
    fn new(token: TurnToken) -> Self {
        Self {
            token,
            steps: Vec::new(),
            room_action: None,
            attack: None,
            completed_at: None,
        }
    }

    pub fn phases(&self) -> Vec<TurnPhase> {
        self.steps.iter().map(|step| step.phase).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(TurnRecord),
    /// The guard refused to start the turn.
    Rejected(GuardRejection),
    /// The token went stale partway; `record` holds what ran before that.
    Superseded(TurnRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Attacked(AttackRecord),
    NoTarget,
    Rejected(GuardRejection),
    Superseded,
}

pub struct TurnScheduler {
    session: Session,
    guard: Arc<TurnGuard>,
    gate: VisualSyncGate,
    resolver: RoomActionResolver,
    lease: Option<Lease>,
}

impl TurnScheduler {
    pub fn new(session: Session) -> Self {
        let cards = Arc::new(CardFlow::new(session.clone()));
        Self {
            gate: VisualSyncGate::new(&session),
            resolver: RoomActionResolver::new(session.clone(), cards),
            guard: TurnGuard::new(),
            lease: None,
            session,
        }
    }

    /// Verify `lease` before every turn.
    pub fn with_lease(mut self, lease: Lease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn guard(&self) -> &Arc<TurnGuard> {
        &self.guard
    }

    /// Supersede the running turn, if any.
    pub fn cancel_current(&self) -> Option<TurnToken> {
        self.guard.cancel()
    }

    #[instrument(skip(self), fields(agent = %agent))]
    pub async fn run_turn(&self, agent: AgentId) -> Result<TurnOutcome> {
        if let Some(lease) = &self.lease {
            lease.verify().await?;
        }
        let Some(claim) = self.guard.begin(agent) else {
            debug!("turn already in flight; ignoring");
            return Ok(TurnOutcome::Rejected(GuardRejection::Locked));
        };
        let scope = claim.scope().clone();
        info!(serial = scope.token().serial(), "turn started");

        let result = self.drive(&scope).await;
        drop(claim);

        match &result {
            Ok(TurnOutcome::Completed(record)) => {
                info!(serial = record.token.serial(), phases = ?record.phases(), "turn completed");
            }
            Ok(TurnOutcome::Superseded(record)) => {
                info!(serial = record.token.serial(), phases = ?record.phases(), "turn superseded");
            }
            Ok(TurnOutcome::Rejected(_)) => {}
            Err(err) => warn!(serial = scope.token().serial(), "turn aborted: {err:#}"),
        }
        result
    }

    async fn drive(&self, scope: &TurnScope) -> Result<TurnOutcome> {
        let agent = scope.agent();
        let pacing = self.session.timing.pacing();
        let mut record = TurnRecord::new(scope.token().clone());

        // Move.
        let Some(slot) = self.enter(scope, TurnPhase::Move, &mut record)? else {
            return Ok(TurnOutcome::Superseded(record));
        };
        let moved = self.move_step(scope).await?;
        drop(slot);
        if moved.is_none() || !scope.pause(pacing).await {
            return Ok(TurnOutcome::Superseded(record));
        }

        // Room action.
        let Some(slot) = self.enter(scope, TurnPhase::RoomAction, &mut record)? else {
            return Ok(TurnOutcome::Superseded(record));
        };
        let Some(outcome) = self.resolver.resolve(scope, agent).await? else {
            return Ok(TurnOutcome::Superseded(record));
        };
        let serial = scope.token().serial();
        if !self
            .session
            .world
            .put(scope, &paths::turn_room_action(serial), &outcome)
            .await?
        {
            return Ok(TurnOutcome::Superseded(record));
        }
        record.room_action = Some(outcome);
        drop(slot);
        if !scope.pause(pacing).await {
            return Ok(TurnOutcome::Superseded(record));
        }

        // Attack, when one is still available and someone is in range.
        if !self.guard.snapshot().attacked_this_turn && self.has_target(scope).await? {
            let Some(slot) = self.enter(scope, TurnPhase::Attack, &mut record)? else {
                return Ok(TurnOutcome::Superseded(record));
            };
            match self.trigger_attack(scope).await? {
                AttackOutcome::Attacked(attack) => record.attack = Some(attack),
                AttackOutcome::Superseded => return Ok(TurnOutcome::Superseded(record)),
                AttackOutcome::NoTarget | AttackOutcome::Rejected(_) => {}
            }
            drop(slot);
            if !scope.pause(pacing).await {
                return Ok(TurnOutcome::Superseded(record));
            }
        }

        // End.
        let Some(_slot) = self.enter(scope, TurnPhase::End, &mut record)? else {
            return Ok(TurnOutcome::Superseded(record));
        };
        if record.room_action.is_none() {
            return Err(TurnError::MissingRoomAction { serial }.into());
        }
        record.completed_at = Some(Utc::now());
        if !self
            .session
            .world
            .put(scope, &paths::turn(serial), &record)
            .await?
        {
            return Ok(TurnOutcome::Superseded(record));
        }
        Ok(TurnOutcome::Completed(record))
    }

    /// Take the step slot for `phase` and trace it. `Ok(None)` for a stale
    /// token or a busy slot.
    fn enter(
        &self,
        scope: &TurnScope,
        phase: TurnPhase,
        record: &mut TurnRecord,
    ) -> Result<Option<StepSlot>> {
        match self.guard.enter_step(scope.token(), phase) {
            Ok(slot) => {
                debug!(%phase, "step started");
                record.steps.push(StepTrace {
                    phase,
                    started_at: Utc::now(),
                    started: Instant::now(),
                });
                Ok(Some(slot))
            }
            Err(GuardRejection::Stale | GuardRejection::StepBusy) => Ok(None),
            Err(rejection) => Err(anyhow!("step {phase} refused: {rejection:?}")),
        }
    }

    async fn has_target(&self, scope: &TurnScope) -> Result<bool> {
        let agents = self.session.world.agents().await?;
        Ok(select_target(&self.session.board, &agents, scope.agent()).is_some())
    }

    /// Speech cue, move roll, then the position write once the visual delay
    /// after finalize has passed. `Ok(None)` when superseded.
    async fn move_step(&self, scope: &TurnScope) -> Result<Option<()>> {
        let session = &self.session;
        let agent = scope.agent();
        let actor = session.world.agent(agent).await?;

        let mut waiter = self.gate.listen();
        let cue = format!("{} is on the move", actor.name);
        if !self.gate.speech_cue(scope, agent, cue).await {
            return Ok(None);
        }
        let ticket = session.dice.roll(RollKind::Move, agent).await?;
        let Some(event) = self
            .gate
            .await_finalize(scope, &mut waiter, &ticket)
            .await?
        else {
            return Ok(None);
        };

        let destination = session
            .board
            .destination(event.value, actor.position.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("no location for move roll {}", event.value))?;
        let world = &session.world;
        let target = &destination;
        let written = self
            .gate
            .apply_at(scope, &event, move || world.set_position(scope, agent, target))
            .await?;
        if written != Some(true) {
            return Ok(None);
        }
        info!(roll = event.value, to = %destination, "moved");
        Ok(Some(()))
    }

    /// The single attack of the current turn.
    ///
    /// The attack flag is claimed before any side effect, so a second trigger
    /// within the same turn is rejected even while the first is still rolling.
    pub async fn trigger_attack(&self, scope: &TurnScope) -> Result<AttackOutcome> {
        let session = &self.session;
        let attacker = scope.agent();
        let agents = session.world.agents().await?;
        if !scope.is_current() {
            return Ok(AttackOutcome::Superseded);
        }
        let Some(target) = select_target(&session.board, &agents, attacker) else {
            return Ok(AttackOutcome::NoTarget);
        };
        if let Err(rejection) = self.guard.claim_attack(scope.token()) {
            debug!(?rejection, "attack refused");
            return Ok(AttackOutcome::Rejected(rejection));
        }

        let mut waiter = self.gate.listen();
        let cue = format!("{attacker} attacks {target}");
        if !self.gate.speech_cue(scope, attacker, cue).await {
            return Ok(AttackOutcome::Superseded);
        }
        let ticket = session.dice.roll(RollKind::Attack, attacker).await?;
        let Some(event) = self
            .gate
            .await_finalize(scope, &mut waiter, &ticket)
            .await?
        else {
            return Ok(AttackOutcome::Superseded);
        };
        self.gate.dismiss_notice(attacker);

        let damage = event.value;
        let world = &session.world;
        let applied = self
            .gate
            .apply_at(scope, &event, move || async move {
                let hp = (world.agent(target).await?.hp - i32::from(damage)).max(0);
                let written = world.set_hp(scope, target, hp).await?;
                Ok::<_, anyhow::Error>((written, hp))
            })
            .await?;
        let Some((true, target_hp)) = applied else {
            return Ok(AttackOutcome::Superseded);
        };

        let attack = AttackRecord {
            attacker,
            target,
            damage,
            target_hp,
        };
        if !world
            .put(scope, &paths::turn_attack(scope.token().serial()), &attack)
            .await?
        {
            return Ok(AttackOutcome::Superseded);
        }
        info!(%target, damage, target_hp, "attack resolved");
        Ok(AttackOutcome::Attacked(attack))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{Harness, ScriptedDice};

    #[tokio::test(start_paused = true)]
    async fn completed_turn_traces_every_step_in_order() {
        // Roll 8 lands in the cemetery next to agent 2.
        let harness = Harness::builder()
            .dice(ScriptedDice::new().moves([8]).attacks([3]))
            .build();
        harness.place(AgentId(1), "church");
        harness.place(AgentId(2), "cemetery");
        let scheduler = harness.scheduler();

        let outcome = scheduler.run_turn(AgentId(1)).await.expect("turn");
        let TurnOutcome::Completed(record) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(
            record.phases(),
            vec![
                TurnPhase::Move,
                TurnPhase::RoomAction,
                TurnPhase::Attack,
                TurnPhase::End
            ]
        );
        let attack = record.attack.expect("attack");
        assert_eq!(attack.damage, 3);
        for pair in record.steps.windows(2) {
            assert!(pair[1].started - pair[0].started >= Duration::from_millis(2000));
        }
        assert!(!scheduler.guard().snapshot().locked);
    }

    #[tokio::test(start_paused = true)]
    async fn attack_is_skipped_without_target() {
        let harness = Harness::builder()
            .dice(ScriptedDice::new().moves([6]))
            .build();
        harness.place(AgentId(1), "cemetery");
        for id in [2, 3, 4] {
            harness.place(AgentId(id), "hermit_cabin");
        }
        let scheduler = harness.scheduler();

        let outcome = scheduler.run_turn(AgentId(1)).await.expect("turn");
        let TurnOutcome::Completed(record) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(
            record.phases(),
            vec![TurnPhase::Move, TurnPhase::RoomAction, TurnPhase::End]
        );
        assert!(record.attack.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_lease_stops_the_turn_before_it_starts() {
        let harness = Harness::new();
        let lease = Lease::acquire(harness.session.world.store().clone(), "a")
            .await
            .expect("lease");
        harness.seed(paths::LEASE, &serde_json::Value::from("b"));
        let scheduler = harness.scheduler().with_lease(lease);

        let err = scheduler.run_turn(AgentId(1)).await.expect_err("lease lost");
        assert!(matches!(
            err.downcast_ref::<TurnError>(),
            Some(TurnError::LeaseLost { .. })
        ));
        assert!(!scheduler.guard().snapshot().locked);
        assert!(harness.store.writes_under("turns").is_empty());
    }
}
