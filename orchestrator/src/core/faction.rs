//! Faction heuristic for autonomous negotiation answers.

use serde::{Deserialize, Serialize};

use crate::core::board::GreenQuestion;
use crate::core::random::RandomSource;
use crate::core::types::Faction;

/// Receiver's relation to the faction a card asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Same,
    Opposing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Affirm,
    Deny,
}

impl Relation {
    pub fn of(receiver: Faction, question: &GreenQuestion) -> Self {
        if question.factions.contains(&receiver) {
            Relation::Same
        } else {
            Relation::Opposing
        }
    }
}

/// Decision table. `None` means the faction has no decisive entry.
pub fn table_answer(faction: Faction, relation: Relation) -> Option<Answer> {
    match (faction, relation) {
        (Faction::Hunter | Faction::Shadow, Relation::Same) => Some(Answer::Affirm),
        (Faction::Hunter | Faction::Shadow, Relation::Opposing) => Some(Answer::Deny),
        (Faction::Neutral, _) => None,
    }
}

/// Table answer, falling back to a uniform coin only when the table is silent.
pub fn decide(faction: Faction, relation: Relation, rng: &RandomSource) -> Answer {
    table_answer(faction, relation).unwrap_or_else(|| {
        if rng.coin() {
            Answer::Affirm
        } else {
            Answer::Deny
        }
    })
}
