//! Deterministic participant selection.
//!
//! Candidates are ranked by `(distance, id)`: nearest first, lowest stable id
//! on ties.

use crate::core::board::Board;
use crate::core::types::{Agent, AgentId, Faction};

/// Nearest in-range opponent of `attacker`, or `None`.
///
/// Eligible: alive, not the attacker, positioned, and not a known ally
/// (agents of the attacker's own faction, unless the attacker is neutral).
pub fn select_target(board: &Board, agents: &[Agent], attacker: AgentId) -> Option<AgentId> {
    let attacker = agents.iter().find(|agent| agent.id == attacker)?;
    let from = attacker.position.as_ref()?;
    agents
        .iter()
        .filter(|candidate| is_opponent(attacker, candidate))
        .filter_map(|candidate| {
            let at = candidate.position.as_ref()?;
            board.distance(from, at).map(|distance| (distance, candidate.id))
        })
        .min()
        .map(|(_, id)| id)
}

/// Opponent for board-wide effects: nearest in range when possible, else the
/// lowest-id opponent anywhere.
pub fn select_any_opponent(board: &Board, agents: &[Agent], actor: AgentId) -> Option<AgentId> {
    if let Some(id) = select_target(board, agents, actor) {
        return Some(id);
    }
    let actor = agents.iter().find(|agent| agent.id == actor)?;
    agents
        .iter()
        .filter(|candidate| is_opponent(actor, candidate))
        .map(|candidate| candidate.id)
        .min()
}

/// Receiver for a green negotiation: an in-range living agent when possible,
/// else any living agent other than the sender.
pub fn select_receiver(board: &Board, agents: &[Agent], sender: AgentId) -> Option<AgentId> {
    let sender_agent = agents.iter().find(|agent| agent.id == sender)?;
    let eligible = || {
        agents
            .iter()
            .filter(move |candidate| candidate.id != sender && candidate.is_alive())
    };
    let in_range = sender_agent.position.as_ref().and_then(|from| {
        eligible()
            .filter_map(|candidate| {
                let at = candidate.position.as_ref()?;
                board.distance(from, at).map(|distance| (distance, candidate.id))
            })
            .min()
            .map(|(_, id)| id)
    });
    in_range.or_else(|| eligible().map(|candidate| candidate.id).min())
}

fn is_opponent(actor: &Agent, candidate: &Agent) -> bool {
    candidate.id != actor.id
        && candidate.is_alive()
        && (actor.faction == Faction::Neutral || candidate.faction != actor.faction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LocationId;
    use crate::test_support::{agent_at, standard_board};

    #[test]
    fn nearest_in_range_wins() {
        let board = standard_board();
        let agents = vec![
            agent_at(1, Faction::Hunter, "church"),
            agent_at(2, Faction::Shadow, "cemetery"),
            agent_at(5, Faction::Shadow, "church"),
        ];
        assert_eq!(select_target(&board, &agents, AgentId(1)), Some(AgentId(5)));
    }

    #[test]
    fn ties_break_on_lowest_id() {
        let board = standard_board();
        let agents = vec![
            agent_at(4, Faction::Shadow, "church"),
            agent_at(1, Faction::Hunter, "church"),
            agent_at(3, Faction::Neutral, "church"),
        ];
        assert_eq!(select_target(&board, &agents, AgentId(1)), Some(AgentId(3)));
    }

    #[test]
    fn allies_dead_and_out_of_range_agents_are_skipped() {
        let board = standard_board();
        let mut dead = agent_at(2, Faction::Shadow, "church");
        dead.hp = 0;
        let agents = vec![
            agent_at(1, Faction::Hunter, "church"),
            dead,
            agent_at(3, Faction::Hunter, "church"),
            agent_at(4, Faction::Shadow, "weird_woods"),
        ];
        assert_eq!(select_target(&board, &agents, AgentId(1)), None);
        assert_eq!(
            select_any_opponent(&board, &agents, AgentId(1)),
            Some(AgentId(4))
        );
    }

    #[test]
    fn neutral_attacker_considers_everyone() {
        let board = standard_board();
        let agents = vec![
            agent_at(1, Faction::Neutral, "church"),
            agent_at(2, Faction::Neutral, "cemetery"),
        ];
        assert_eq!(select_target(&board, &agents, AgentId(1)), Some(AgentId(2)));
    }

    #[test]
    fn receiver_prefers_range_then_lowest_id() {
        let board = standard_board();
        let mut agents = vec![
            agent_at(1, Faction::Hunter, "church"),
            agent_at(2, Faction::Shadow, "weird_woods"),
            agent_at(3, Faction::Hunter, "cemetery"),
        ];
        assert_eq!(
            select_receiver(&board, &agents, AgentId(1)),
            Some(AgentId(3))
        );

        agents[2].position = Some(LocationId::from("erstwhile_altar"));
        assert_eq!(
            select_receiver(&board, &agents, AgentId(1)),
            Some(AgentId(2))
        );

        let alone = vec![agent_at(1, Faction::Hunter, "church")];
        assert_eq!(select_receiver(&board, &alone, AgentId(1)), None);
    }
}
