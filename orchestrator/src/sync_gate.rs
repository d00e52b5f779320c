//! Visual sync gate: visible mutations land no earlier than a fixed delay after
//! the finalize event that confirms them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::timing;
use crate::core::types::{AgentId, FinalizeEvent, RollTicket};
use crate::error::TurnError;
use crate::guard::TurnScope;
use crate::io::dice::FinalizeBus;
use crate::io::presentation::{PresentationCommand, Presenter};
use crate::session::Session;

/// Subscription taken before a roll starts so its finalize cannot be missed.
pub struct FinalizeWaiter {
    rx: broadcast::Receiver<FinalizeEvent>,
}

impl FinalizeWaiter {
    async fn next_matching(&mut self, ticket: &RollTicket) -> Result<FinalizeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.roll == ticket.id => return Ok(event),
                Ok(event) => {
                    debug!(roll = %event.roll, waiting = %ticket.id, "ignoring finalize of another roll");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "finalize listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TurnError::FinalizeChannelClosed {
                        kind: ticket.kind,
                        actor: ticket.actor,
                    }
                    .into());
                }
            }
        }
    }
}

pub struct VisualSyncGate {
    bus: FinalizeBus,
    presenter: Arc<dyn Presenter>,
    delay: Duration,
    timeout: Duration,
    speech_cue: Duration,
}

impl VisualSyncGate {
    pub fn new(session: &Session) -> Self {
        Self {
            bus: session.finalize.clone(),
            presenter: Arc::clone(&session.presenter),
            delay: session.timing.visual_sync_delay(),
            timeout: session.timing.finalize_timeout(),
            speech_cue: session.timing.speech_cue(),
        }
    }

    pub fn listen(&self) -> FinalizeWaiter {
        FinalizeWaiter {
            rx: self.bus.subscribe(),
        }
    }

    /// Wait for the finalize event of `ticket`'s roll. Events of any other
    /// roll, including abandoned rolls of the same actor, are skipped.
    ///
    /// `Ok(None)` when the turn was superseded while waiting. A missing event
    /// past the configured bound is a [`TurnError::ConfirmationTimeout`].
    pub async fn await_finalize(
        &self,
        scope: &TurnScope,
        waiter: &mut FinalizeWaiter,
        ticket: &RollTicket,
    ) -> Result<Option<FinalizeEvent>> {
        let bounded = tokio::time::timeout(self.timeout, waiter.next_matching(ticket));
        match scope.until(bounded).await {
            None => Ok(None),
            Some(Ok(event)) => event.map(Some),
            Some(Err(_)) => {
                warn!(
                    roll = %ticket.id,
                    kind = %ticket.kind,
                    actor = %ticket.actor,
                    timeout = ?self.timeout,
                    "finalize event never arrived"
                );
                Err(TurnError::ConfirmationTimeout {
                    kind: ticket.kind,
                    actor: ticket.actor,
                    timeout: self.timeout,
                }
                .into())
            }
        }
    }

    /// Run `mutate` once `event.timestamp + delay` has passed.
    ///
    /// `Ok(None)` when the turn was superseded during the delay; `mutate` is
    /// not invoked then.
    pub async fn apply_at<F, Fut, T>(
        &self,
        scope: &TurnScope,
        event: &FinalizeEvent,
        mutate: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let wait = timing::remaining(event.timestamp, self.delay, Instant::now());
        if !scope.pause(wait).await {
            return Ok(None);
        }
        mutate().await.map(Some)
    }

    pub async fn apply_after_finalize<F, Fut, T>(
        &self,
        scope: &TurnScope,
        waiter: &mut FinalizeWaiter,
        ticket: &RollTicket,
        mutate: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(event) = self.await_finalize(scope, waiter, ticket).await? else {
            return Ok(None);
        };
        self.apply_at(scope, &event, mutate).await
    }

    /// Show a transient notice, then hold for the cue duration. Returns whether
    /// the turn is still current.
    pub async fn speech_cue(&self, scope: &TurnScope, actor: AgentId, text: String) -> bool {
        self.presenter.present(PresentationCommand::ShowNotice {
            actor,
            text,
            duration: self.speech_cue,
        });
        scope.pause(self.speech_cue).await
    }

    pub fn dismiss_notice(&self, actor: AgentId) {
        self.presenter
            .present(PresentationCommand::DismissNotice { actor });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RollKind;
    use crate::guard::TurnGuard;
    use crate::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn mutation_waits_for_the_delay_after_finalize() {
        let harness = Harness::new();
        let gate = VisualSyncGate::new(&harness.session);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");
        let mut waiter = gate.listen();

        let bus = harness.session.finalize.clone();
        let other = bus.issue(RollKind::Move, AgentId(2));
        let mine = bus.issue(RollKind::Move, AgentId(1));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            bus.finalize(&other, 4);
            bus.finalize(&mine, 5);
        });

        let started = Instant::now();
        let applied = gate
            .apply_after_finalize(claim.scope(), &mut waiter, &mine, || async {
                Ok::<_, anyhow::Error>(Instant::now())
            })
            .await
            .expect("apply")
            .expect("current");
        assert!(applied - started >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_finalize_times_out() {
        let harness = Harness::new();
        let gate = VisualSyncGate::new(&harness.session);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");
        let mut waiter = gate.listen();
        let ticket = harness.session.finalize.issue(RollKind::Attack, AgentId(1));

        let err = gate
            .await_finalize(claim.scope(), &mut waiter, &ticket)
            .await
            .expect_err("timeout");
        assert!(matches!(
            err.downcast_ref::<TurnError>(),
            Some(TurnError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_returns_none_without_mutating() {
        let harness = Harness::new();
        let gate = VisualSyncGate::new(&harness.session);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");
        let mut waiter = gate.listen();
        let ticket = harness.session.finalize.issue(RollKind::Move, AgentId(1));
        guard.cancel();

        let applied = gate
            .apply_after_finalize(claim.scope(), &mut waiter, &ticket, || async {
                Ok::<_, anyhow::Error>(())
            })
            .await
            .expect("no error");
        assert!(applied.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_of_an_abandoned_roll_is_skipped() {
        let harness = Harness::new();
        let gate = VisualSyncGate::new(&harness.session);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");
        let mut waiter = gate.listen();

        // Same actor and kind; only the roll id tells them apart.
        let bus = harness.session.finalize.clone();
        let abandoned = bus.issue(RollKind::Move, AgentId(1));
        let current = bus.issue(RollKind::Move, AgentId(1));
        bus.finalize(&abandoned, 6);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            bus.finalize(&current, 8);
        });

        let started = Instant::now();
        let event = gate
            .await_finalize(claim.scope(), &mut waiter, &current)
            .await
            .expect("finalize")
            .expect("current");
        assert_eq!(event.roll, current.id);
        assert_eq!(event.value, 8);
        assert!(event.timestamp - started >= Duration::from_millis(1200));
    }
}
