//! Headless simulation: rotate turns through the living autonomous agents and
//! tally what happened.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::types::{AgentId, RoomActionOutcome};
use crate::scheduler::{TurnOutcome, TurnScheduler};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub turns: u32,
    pub completed: u32,
    pub superseded: u32,
    pub rejected: u32,
    /// Draws per deck id.
    pub draws: BTreeMap<String, u32>,
    pub specials: u32,
    pub no_legal_action: u32,
    pub attacks: u32,
    pub negotiations: u32,
    pub knocked_out: Vec<AgentId>,
}

impl SimulationReport {
    fn record(&mut self, outcome: &TurnOutcome) {
        self.turns += 1;
        let record = match outcome {
            TurnOutcome::Completed(record) => {
                self.completed += 1;
                record
            }
            TurnOutcome::Superseded(_) => {
                self.superseded += 1;
                return;
            }
            TurnOutcome::Rejected(_) => {
                self.rejected += 1;
                return;
            }
        };
        match &record.room_action {
            Some(RoomActionOutcome::Draw { draw, .. }) => {
                *self.draws.entry(draw.deck_id.to_string()).or_default() += 1;
                if draw.negotiation.is_some() {
                    self.negotiations += 1;
                }
            }
            Some(RoomActionOutcome::Special { .. }) => self.specials += 1,
            Some(RoomActionOutcome::NoLegalAction { .. }) => self.no_legal_action += 1,
            None => {}
        }
        if record.attack.is_some() {
            self.attacks += 1;
        }
    }
}

/// Run up to `turns` turns. Stops early once no autonomous agent is alive.
pub async fn run_simulation(scheduler: &TurnScheduler, turns: u32) -> Result<SimulationReport> {
    let world = &scheduler.session().world;
    let seats: Vec<AgentId> = world
        .roster()
        .iter()
        .filter(|profile| profile.autonomous)
        .map(|profile| profile.id)
        .collect();
    let mut report = SimulationReport::default();
    let mut seat = 0usize;

    'turns: while report.turns < turns {
        let mut agent = None;
        for _ in 0..seats.len() {
            let candidate = seats[seat % seats.len()];
            seat += 1;
            if world.agent(candidate).await?.is_alive() {
                agent = Some(candidate);
                break;
            }
        }
        let Some(agent) = agent else {
            info!("no autonomous agent left alive");
            break 'turns;
        };

        world.announce_turn(agent).await?;
        let outcome = scheduler.run_turn(agent).await?;
        debug!(%agent, turn = report.turns + 1, "simulated turn");
        report.record(&outcome);
    }

    report.knocked_out = world
        .agents()
        .await?
        .into_iter()
        .filter(|agent| !agent.is_alive())
        .map(|agent| agent.id)
        .collect();
    info!(
        turns = report.turns,
        completed = report.completed,
        attacks = report.attacks,
        "simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::TimingConfig;
    use crate::test_support::Harness;

    #[tokio::test(start_paused = true)]
    async fn every_completed_turn_records_one_room_action() {
        let harness = Harness::builder()
            .timing(TimingConfig::instant())
            .seed(42)
            .build();
        let scheduler = harness.scheduler();

        let report = run_simulation(&scheduler, 24).await.expect("simulate");
        assert!(report.turns <= 24);
        assert_eq!(report.completed, report.turns);
        let room_actions =
            report.draws.values().sum::<u32>() + report.specials + report.no_legal_action;
        assert_eq!(room_actions, report.completed);
        assert_eq!(
            harness.store.writes_under("turns").len() as u32,
            report.completed * 2 + report.attacks
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_no_autonomous_agent_is_alive() {
        let harness = Harness::new();
        for id in [1, 2, 3] {
            harness.set_hp(AgentId(id), 0);
        }
        let scheduler = harness.scheduler();
        let report = run_simulation(&scheduler, 5).await.expect("simulate");
        assert_eq!(report.turns, 0);
        assert_eq!(report.knocked_out, vec![AgentId(1), AgentId(2), AgentId(3)]);
    }
}
