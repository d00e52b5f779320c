//! Turn-notification driver.
//!
//! Watches `turn/current` and `game/status`. An owner change supersedes the
//! running turn, waits for its task to wind down, then starts a fresh turn
//! when the new owner is autonomous. `game/status = "ended"` stops the loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::types::AgentId;
use crate::io::store::StoreChange;
use crate::io::world::paths;
use crate::scheduler::{TurnOutcome, TurnScheduler};

pub const STATUS_ENDED: &str = "ended";

#[derive(Debug, Deserialize)]
struct TurnNotice {
    agent: AgentId,
}

struct ActiveTurn {
    agent: AgentId,
    handle: JoinHandle<Result<TurnOutcome>>,
}

pub struct TurnDriver {
    scheduler: Arc<TurnScheduler>,
}

impl TurnDriver {
    pub fn new(scheduler: Arc<TurnScheduler>) -> Self {
        Self { scheduler }
    }

    /// Run until the game ends, the store goes away, or `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let store = self.scheduler.session().world.store().clone();
        let mut turns = store.subscribe(paths::TURN_CURRENT);
        let mut status = store.subscribe(paths::GAME_STATUS);
        let mut active: Option<ActiveTurn> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = turns.next() => {
                    let Some(change) = change else { break };
                    self.supersede(active.take()).await;
                    match self.on_turn_change(&change) {
                        Ok(turn) => active = turn,
                        Err(err) => warn!(path = %change.path, "ignoring turn notice: {err:#}"),
                    }
                }
                change = status.next() => {
                    let Some(change) = change else { break };
                    if change.value.as_str() == Some(STATUS_ENDED) {
                        info!("game ended");
                        break;
                    }
                }
            }
        }

        self.supersede(active.take()).await;
        Ok(())
    }

    fn on_turn_change(&self, change: &StoreChange) -> Result<Option<ActiveTurn>> {
        let notice: TurnNotice = serde_json::from_value(change.value.clone())
            .with_context(|| format!("decode {}", change.path))?;
        let profile = self.scheduler.session().world.profile(notice.agent)?;
        if !profile.autonomous {
            debug!(agent = %notice.agent, "human turn; waiting");
            return Ok(None);
        }
        let scheduler = Arc::clone(&self.scheduler);
        let agent = notice.agent;
        let handle = tokio::spawn(async move { scheduler.run_turn(agent).await });
        Ok(Some(ActiveTurn { agent, handle }))
    }

    async fn supersede(&self, active: Option<ActiveTurn>) {
        let Some(active) = active else {
            return;
        };
        if !active.handle.is_finished() {
            self.scheduler.cancel_current();
        }
        match active.handle.await {
            Ok(Ok(outcome)) => debug!(agent = %active.agent, ?outcome, "turn task finished"),
            Ok(Err(err)) => warn!(agent = %active.agent, "turn task failed: {err:#}"),
            Err(err) => warn!(agent = %active.agent, "turn task panicked: {err}"),
        }
    }
}
