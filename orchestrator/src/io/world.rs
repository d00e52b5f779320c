//! Typed access to game state held in the shared store.
//!
//! Reads are unconditional. Every write goes through a [`WriteGate`] so a
//! superseded turn can never commit a mutation.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::board::DeckSpec;
use crate::core::random::RandomSource;
use crate::core::types::{Agent, AgentId, AgentProfile, CardId, LocationId};
use crate::error::TurnError;
use crate::io::store::SharedStore;

/// Store layout.
pub mod paths {
    use crate::core::types::{AgentId, DeckId, RequestId};

    pub const TURN_CURRENT: &str = "turn/current";
    pub const GAME_STATUS: &str = "game/status";
    pub const LEASE: &str = "orchestrator/active";

    pub fn position(agent: AgentId) -> String {
        format!("agents/{agent}/position")
    }

    pub fn hp(agent: AgentId) -> String {
        format!("agents/{agent}/hp")
    }

    pub fn equipment(agent: AgentId) -> String {
        format!("agents/{agent}/equipment")
    }

    pub fn inbox(agent: AgentId) -> String {
        format!("agents/{agent}/inbox")
    }

    pub fn deck(deck: &DeckId) -> String {
        format!("decks/{deck}")
    }

    pub fn negotiation(request: &RequestId) -> String {
        format!("negotiations/{request}")
    }

    pub fn turn(serial: u64) -> String {
        format!("turns/{serial}")
    }

    pub fn turn_room_action(serial: u64) -> String {
        format!("turns/{serial}/room_action")
    }

    pub fn turn_attack(serial: u64) -> String {
        format!("turns/{serial}/attack")
    }
}

/// Permission check consulted immediately before each write.
pub trait WriteGate: Sync {
    fn permits_write(&self) -> bool;
}

/// Writes outside any turn (seeding, administration).
pub struct Unguarded;

impl WriteGate for Unguarded {
    fn permits_write(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct World {
    store: Arc<dyn SharedStore>,
    roster: Arc<Vec<AgentProfile>>,
}

impl World {
    pub fn new(store: Arc<dyn SharedStore>, roster: Vec<AgentProfile>) -> Self {
        Self {
            store,
            roster: Arc::new(roster),
        }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn roster(&self) -> &[AgentProfile] {
        &self.roster
    }

    pub fn profile(&self, id: AgentId) -> Result<&AgentProfile> {
        self.roster
            .iter()
            .find(|profile| profile.id == id)
            .ok_or_else(|| TurnError::UnknownAgent(id).into())
    }

    /// Snapshot of every roster agent with live position, hp and equipment.
    pub async fn agents(&self) -> Result<Vec<Agent>> {
        let mut agents = Vec::with_capacity(self.roster.len());
        for profile in self.roster.iter() {
            agents.push(self.agent_from(profile).await?);
        }
        Ok(agents)
    }

    pub async fn agent(&self, id: AgentId) -> Result<Agent> {
        let profile = self.profile(id)?;
        self.agent_from(profile).await
    }

    async fn agent_from(&self, profile: &AgentProfile) -> Result<Agent> {
        let position = self.read_as::<LocationId>(&paths::position(profile.id)).await?;
        let hp = self.read_as::<i32>(&paths::hp(profile.id)).await?.unwrap_or(0);
        let mut agent = Agent::from_profile(profile, position, hp);
        agent.equipment = self
            .read_as::<Vec<String>>(&paths::equipment(profile.id))
            .await?
            .unwrap_or_default();
        Ok(agent)
    }

    pub async fn read_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(value) = self.store.read(path).await? else {
            return Ok(None);
        };
        let parsed = serde_json::from_value(value).with_context(|| format!("decode {path}"))?;
        Ok(Some(parsed))
    }

    /// Write `value` if `gate` still permits it. Returns whether it was written.
    pub async fn put<T: Serialize>(
        &self,
        gate: &dyn WriteGate,
        path: &str,
        value: &T,
    ) -> Result<bool> {
        if !gate.permits_write() {
            debug!(path, "write dropped for stale turn");
            return Ok(false);
        }
        let value = serde_json::to_value(value).with_context(|| format!("encode {path}"))?;
        self.store
            .write(path, value)
            .await
            .map_err(|err| TurnError::StoreWrite {
                path: path.to_string(),
                reason: format!("{err:#}"),
            })?;
        Ok(true)
    }

    pub async fn set_position(
        &self,
        gate: &dyn WriteGate,
        agent: AgentId,
        location: &LocationId,
    ) -> Result<bool> {
        self.put(gate, &paths::position(agent), location).await
    }

    pub async fn set_hp(&self, gate: &dyn WriteGate, agent: AgentId, hp: i32) -> Result<bool> {
        self.put(gate, &paths::hp(agent), &hp).await
    }

    pub async fn set_equipment(
        &self,
        gate: &dyn WriteGate,
        agent: AgentId,
        equipment: &[String],
    ) -> Result<bool> {
        self.put(gate, &paths::equipment(agent), &equipment).await
    }

    /// Pop the top card of `deck`, reshuffling the catalogue when the pile is
    /// empty. `None` when the gate refused the pile update.
    pub async fn draw_card(
        &self,
        gate: &dyn WriteGate,
        deck: &DeckSpec,
        rng: &RandomSource,
    ) -> Result<Option<CardId>> {
        let path = paths::deck(&deck.id);
        let mut pile = self
            .read_as::<Vec<CardId>>(&path)
            .await?
            .unwrap_or_default();
        if pile.is_empty() {
            pile = deck.cards.iter().map(|card| card.id.clone()).collect();
            rng.shuffle(&mut pile);
            debug!(deck = %deck.id, cards = pile.len(), "deck reshuffled");
        }
        if pile.is_empty() {
            return Err(TurnError::UnknownDeck(deck.id.clone()).into());
        }
        let card = pile.remove(0);
        if !self.put(gate, &path, &pile).await? {
            return Ok(None);
        }
        Ok(Some(card))
    }

    /// Seed position, hp and an empty equipment list for every roster agent.
    pub async fn seed_agents(&self, start: &LocationId, hp: i32) -> Result<()> {
        for profile in self.roster.iter() {
            self.set_position(&Unguarded, profile.id, start).await?;
            self.set_hp(&Unguarded, profile.id, hp).await?;
            self.set_equipment(&Unguarded, profile.id, &[]).await?;
        }
        Ok(())
    }

    /// Announce whose turn it is.
    pub async fn announce_turn(&self, agent: AgentId) -> Result<()> {
        self.put(&Unguarded, paths::TURN_CURRENT, &json!({ "agent": agent }))
            .await?;
        Ok(())
    }

    pub async fn set_game_status(&self, status: &str) -> Result<()> {
        self.put(&Unguarded, paths::GAME_STATUS, &Value::from(status))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::io::store::MemoryStore;
    use crate::test_support::{roster, standard_board};

    struct Closed;

    impl WriteGate for Closed {
        fn permits_write(&self) -> bool {
            false
        }
    }

    fn world(store: &MemoryStore) -> World {
        World::new(Arc::new(store.clone()), roster())
    }

    #[tokio::test]
    async fn seeded_agents_read_back() {
        let store = MemoryStore::new();
        let world = world(&store);
        world
            .seed_agents(&LocationId::from("church"), 12)
            .await
            .expect("seed");
        let agent = world.agent(AgentId(1)).await.expect("agent");
        assert_eq!(agent.hp, 12);
        assert_eq!(agent.position, Some(LocationId::from("church")));
        assert!(agent.equipment.is_empty());
        assert!(world.agent(AgentId(99)).await.is_err());
    }

    #[tokio::test]
    async fn closed_gate_drops_writes() {
        let store = MemoryStore::new();
        let world = world(&store);
        let written = world.set_hp(&Closed, AgentId(1), 3).await.expect("put");
        assert!(!written);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn drawing_exhausts_the_pile_before_reshuffling() {
        let store = MemoryStore::new();
        let world = world(&store);
        let board = standard_board();
        let deck = &board.decks[0];
        let rng = RandomSource::seeded(3);

        let mut seen = HashSet::new();
        for _ in 0..deck.cards.len() {
            let card = world
                .draw_card(&Unguarded, deck, &rng)
                .await
                .expect("draw")
                .expect("card");
            assert!(seen.insert(card));
        }
        assert_eq!(seen.len(), deck.cards.len());
        let remaining: Vec<CardId> = world
            .read_as(&paths::deck(&deck.id))
            .await
            .expect("read")
            .expect("pile");
        assert!(remaining.is_empty());
        assert!(
            world
                .draw_card(&Unguarded, deck, &rng)
                .await
                .expect("draw")
                .is_some()
        );
    }
}
