//! Dice/animation engine and the finalize event bus.
//!
//! Starting a roll and learning its outcome are separate: [`DiceEngine::roll`]
//! only kicks off the animation, and the result arrives later as a
//! [`FinalizeEvent`] on the [`FinalizeBus`]. Every roll is issued a
//! [`RollTicket`] by the bus; its finalize event carries the same id, so a
//! late event from an abandoned roll never settles a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::core::random::RandomSource;
use crate::core::types::{AgentId, FinalizeEvent, RollId, RollKind, RollTicket};

const FINALIZE_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct FinalizeBus {
    tx: broadcast::Sender<FinalizeEvent>,
    issued: Arc<AtomicU64>,
}

impl Default for FinalizeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FinalizeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FINALIZE_CHANNEL_CAPACITY);
        Self {
            tx,
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ticket for a roll about to start.
    pub fn issue(&self, kind: RollKind, actor: AgentId) -> RollTicket {
        let id = RollId(self.issued.fetch_add(1, Ordering::Relaxed) + 1);
        RollTicket { id, kind, actor }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FinalizeEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: FinalizeEvent) {
        debug!(
            roll = %event.roll,
            kind = %event.kind,
            actor = %event.actor,
            value = event.value,
            "finalize"
        );
        // Nobody listening means nobody is waiting on this roll.
        let _ = self.tx.send(event);
    }

    /// Settle `ticket` with `value`, stamped now.
    pub fn finalize(&self, ticket: &RollTicket, value: u8) {
        self.publish(FinalizeEvent {
            roll: ticket.id,
            kind: ticket.kind,
            actor: ticket.actor,
            timestamp: Instant::now(),
            value,
        });
    }
}

#[async_trait]
pub trait DiceEngine: Send + Sync {
    /// Start a randomized outcome. Completion is reported on the bus under
    /// the returned ticket's id.
    async fn roll(&self, kind: RollKind, actor: AgentId) -> Result<RollTicket>;
}

/// Movement roll: d6 + d4.
pub fn move_roll(rng: &RandomSource) -> u8 {
    rng.roll(6) + rng.roll(4)
}

/// Attack damage: |d6 - d4|.
pub fn attack_roll(rng: &RandomSource) -> u8 {
    rng.roll(6).abs_diff(rng.roll(4))
}

/// Built-in engine: rolls with the shared random source and finalizes after a
/// fixed animation time.
pub struct AnimatedDice {
    bus: FinalizeBus,
    rng: RandomSource,
    animation: Duration,
}

impl AnimatedDice {
    pub fn new(bus: FinalizeBus, rng: RandomSource, animation: Duration) -> Self {
        Self {
            bus,
            rng,
            animation,
        }
    }
}

#[async_trait]
impl DiceEngine for AnimatedDice {
    async fn roll(&self, kind: RollKind, actor: AgentId) -> Result<RollTicket> {
        let ticket = self.bus.issue(kind, actor);
        let value = match kind {
            RollKind::Move => move_roll(&self.rng),
            RollKind::Attack => attack_roll(&self.rng),
        };
        let bus = self.bus.clone();
        let animation = self.animation;
        tokio::spawn(async move {
            tokio::time::sleep(animation).await;
            bus.finalize(&ticket, value);
        });
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_ranges() {
        let rng = RandomSource::seeded(11);
        for _ in 0..500 {
            assert!((2..=10).contains(&move_roll(&rng)));
            assert!(attack_roll(&rng) <= 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn animated_dice_finalizes_after_animation() {
        let bus = FinalizeBus::new();
        let mut rx = bus.subscribe();
        let dice = AnimatedDice::new(
            bus.clone(),
            RandomSource::seeded(1),
            Duration::from_millis(1200),
        );
        let started = Instant::now();
        let ticket = dice.roll(RollKind::Move, AgentId(4)).await.expect("roll");
        let event = rx.recv().await.expect("finalize");
        assert_eq!(event.roll, ticket.id);
        assert_eq!(event.kind, RollKind::Move);
        assert_eq!(event.actor, AgentId(4));
        assert!(event.timestamp - started >= Duration::from_millis(1200));
    }

    #[test]
    fn tickets_are_unique_across_bus_clones() {
        let bus = FinalizeBus::new();
        let other = bus.clone();
        let first = bus.issue(RollKind::Move, AgentId(1));
        let second = other.issue(RollKind::Move, AgentId(1));
        assert_ne!(first.id, second.id);
    }
}
