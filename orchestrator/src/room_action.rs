//! Mandatory room action dispatch.
//!
//! Every call that is not superseded yields exactly one terminal
//! [`RoomActionOutcome`]; rooms without a legal action yield the explicit
//! `NoLegalAction` marker.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::card_flow::CardFlow;
use crate::core::board::CardEffect;
use crate::core::rules::{RoomActionPlan, SpecialAction, plan_room_action};
use crate::core::target::select_any_opponent;
use crate::core::types::{Agent, AgentId, AppliedEffect, DeckId, LocationId, RoomActionOutcome};
use crate::effects::adjust_hp;
use crate::error::TurnError;
use crate::guard::TurnScope;
use crate::io::world::Unguarded;
use crate::session::Session;

enum SpecialAttempt {
    Performed(RoomActionOutcome),
    PreconditionFailed,
    Superseded,
}

pub struct RoomActionResolver {
    session: Session,
    cards: Arc<CardFlow>,
}

impl RoomActionResolver {
    pub fn new(session: Session, cards: Arc<CardFlow>) -> Self {
        Self { session, cards }
    }

    #[instrument(skip_all, fields(agent = %agent))]
    pub async fn resolve(
        &self,
        scope: &TurnScope,
        agent: AgentId,
    ) -> Result<Option<RoomActionOutcome>> {
        let actor = self.session.world.agent(agent).await?;
        let Some(location_id) = actor.position.clone() else {
            info!("agent is off the board; no legal action");
            return Ok(Some(RoomActionOutcome::NoLegalAction { location: None }));
        };
        let location = self
            .session
            .board
            .location(&location_id)
            .ok_or_else(|| TurnError::UnknownLocation(location_id.clone()))?;

        match plan_room_action(&location.rule, &self.session.rng) {
            RoomActionPlan::Draw(deck) => self.draw(scope, agent, location_id, &deck).await,
            RoomActionPlan::Special { action, fallback } => {
                match self.special(scope, &actor, &location_id, action).await? {
                    SpecialAttempt::Performed(outcome) => Ok(Some(outcome)),
                    SpecialAttempt::Superseded => Ok(None),
                    SpecialAttempt::PreconditionFailed => {
                        debug!(?action, deck = %fallback, "special unavailable; fallback draw");
                        self.draw(scope, agent, location_id, &fallback).await
                    }
                }
            }
            RoomActionPlan::NoLegalAction => {
                info!(location = %location_id, "no legal action");
                Ok(Some(RoomActionOutcome::NoLegalAction {
                    location: Some(location_id),
                }))
            }
        }
    }

    async fn draw(
        &self,
        scope: &TurnScope,
        agent: AgentId,
        location: LocationId,
        deck: &DeckId,
    ) -> Result<Option<RoomActionOutcome>> {
        let draw = self.cards.draw(scope, agent, deck).await?;
        Ok(draw.map(|draw| RoomActionOutcome::Draw { location, draw }))
    }

    async fn special(
        &self,
        scope: &TurnScope,
        actor: &Agent,
        location: &LocationId,
        action: SpecialAction,
    ) -> Result<SpecialAttempt> {
        let session = &self.session;
        let agents = session.world.agents().await?;
        if !scope.is_current() {
            return Ok(SpecialAttempt::Superseded);
        }
        match action {
            SpecialAction::Hex { damage } => {
                let Some(target) = select_any_opponent(&session.board, &agents, actor.id) else {
                    return Ok(SpecialAttempt::PreconditionFailed);
                };
                let Some(hp_after) =
                    adjust_hp(session, scope, target, -i32::from(damage)).await?
                else {
                    return Ok(SpecialAttempt::Superseded);
                };
                info!(target = %target, damage, "hex cast");
                Ok(SpecialAttempt::Performed(RoomActionOutcome::Special {
                    location: location.clone(),
                    action,
                    applied_effects: vec![AppliedEffect {
                        target,
                        effect: CardEffect::Damage { amount: damage },
                        hp_after,
                    }],
                    moved_equipment: None,
                }))
            }
            SpecialAction::StealEquipment => {
                let Some(holder) = agents
                    .iter()
                    .filter(|agent| agent.id != actor.id && agent.is_alive())
                    .filter(|agent| !agent.equipment.is_empty())
                    .min_by_key(|agent| agent.id)
                else {
                    return Ok(SpecialAttempt::PreconditionFailed);
                };
                let mut remaining = holder.equipment.clone();
                let item = remaining.remove(0);
                let mut gained = actor.equipment.clone();
                gained.push(item.clone());
                // Grant before removal; a failed removal takes the grant back,
                // so the item exists exactly once whatever happens.
                if !session.world.set_equipment(scope, actor.id, &gained).await? {
                    return Ok(SpecialAttempt::Superseded);
                }
                match session.world.set_equipment(scope, holder.id, &remaining).await {
                    Ok(true) => {}
                    Ok(false) => {
                        self.revoke_grant(actor).await?;
                        return Ok(SpecialAttempt::Superseded);
                    }
                    Err(err) => {
                        if let Err(revoke_err) = self.revoke_grant(actor).await {
                            warn!(agent = %actor.id, "could not revoke stolen item: {revoke_err:#}");
                        }
                        return Err(err);
                    }
                }
                info!(from = %holder.id, item, "equipment stolen");
                Ok(SpecialAttempt::Performed(RoomActionOutcome::Special {
                    location: location.clone(),
                    action,
                    applied_effects: Vec::new(),
                    moved_equipment: Some(item),
                }))
            }
        }
    }

    /// Put `actor`'s equipment back to what it was before a steal. Not gated
    /// by the turn token: the compensation must land even for a superseded
    /// turn.
    async fn revoke_grant(&self, actor: &Agent) -> Result<()> {
        self.session
            .world
            .set_equipment(&Unguarded, actor.id, &actor.equipment)
            .await?;
        debug!(agent = %actor.id, "stolen item returned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::RoomActionRule;
    use crate::guard::TurnGuard;
    use crate::io::world::paths;
    use crate::test_support::{Harness, standard_board};

    fn resolver(harness: &Harness) -> RoomActionResolver {
        let cards = Arc::new(CardFlow::new(harness.session.clone()));
        RoomActionResolver::new(harness.session.clone(), cards)
    }

    #[tokio::test(start_paused = true)]
    async fn deterministic_room_always_draws_its_deck() {
        let harness = Harness::new();
        harness.place(AgentId(1), "church");
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();

        for _ in 0..100 {
            let claim = guard.begin(AgentId(1)).expect("claim");
            let outcome = resolver
                .resolve(claim.scope(), AgentId(1))
                .await
                .expect("resolve")
                .expect("current");
            assert_eq!(outcome.drawn_deck(), Some(&DeckId::from("white")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hex_hits_nearest_opponent() {
        let harness = Harness::new();
        harness.place(AgentId(1), "weird_woods");
        harness.place(AgentId(2), "erstwhile_altar");
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let outcome = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect("resolve")
            .expect("current");
        let RoomActionOutcome::Special {
            applied_effects, ..
        } = &outcome
        else {
            panic!("expected the hex, got {outcome:?}");
        };
        assert_eq!(applied_effects[0].target, AgentId(2));
        assert_eq!(applied_effects[0].hp_after, harness.session.max_hp - 2);
    }

    #[tokio::test(start_paused = true)]
    async fn steal_without_holders_falls_back_to_draw() {
        let harness = Harness::new();
        harness.place(AgentId(1), "erstwhile_altar");
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let outcome = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect("resolve")
            .expect("current");
        assert_eq!(outcome.drawn_deck(), Some(&DeckId::from("black")));
    }

    #[tokio::test(start_paused = true)]
    async fn steal_takes_first_item_of_lowest_holder() {
        let harness = Harness::new();
        harness.place(AgentId(1), "erstwhile_altar");
        let world = &harness.session.world;
        world
            .set_equipment(&Unguarded, AgentId(3), &["chainsaw".to_string()])
            .await
            .expect("seed");
        world
            .set_equipment(
                &Unguarded,
                AgentId(2),
                &["talisman".to_string(), "holy_robe".to_string()],
            )
            .await
            .expect("seed");
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let outcome = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect("resolve")
            .expect("current");
        assert!(matches!(
            outcome,
            RoomActionOutcome::Special { moved_equipment: Some(ref item), .. } if item == "talisman"
        ));
        let thief = world.agent(AgentId(1)).await.expect("agent");
        let victim = world.agent(AgentId(2)).await.expect("agent");
        assert_eq!(thief.equipment, vec!["talisman".to_string()]);
        assert_eq!(victim.equipment, vec!["holy_robe".to_string()]);
    }

    fn seed_equipment(harness: &Harness, agent: AgentId, items: &[&str]) {
        let items: Vec<String> = items.iter().map(|item| item.to_string()).collect();
        harness.seed(&paths::equipment(agent), &items);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_grant_leaves_the_item_with_its_holder() {
        let harness = Harness::builder()
            .failing_writes_under("agents/1/equipment")
            .build();
        harness.place(AgentId(1), "erstwhile_altar");
        seed_equipment(&harness, AgentId(2), &["talisman"]);
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let err = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect_err("grant write fails");
        assert!(matches!(
            err.downcast_ref::<TurnError>(),
            Some(TurnError::StoreWrite { .. })
        ));
        let world = &harness.session.world;
        let thief = world.agent(AgentId(1)).await.expect("agent");
        let victim = world.agent(AgentId(2)).await.expect("agent");
        assert!(thief.equipment.is_empty());
        assert_eq!(victim.equipment, vec!["talisman".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_removal_takes_the_grant_back() {
        let harness = Harness::builder()
            .failing_writes_under("agents/2/equipment")
            .build();
        harness.place(AgentId(1), "erstwhile_altar");
        seed_equipment(&harness, AgentId(1), &["holy_robe"]);
        seed_equipment(&harness, AgentId(2), &["talisman"]);
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let err = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect_err("removal write fails");
        assert!(matches!(
            err.downcast_ref::<TurnError>(),
            Some(TurnError::StoreWrite { .. })
        ));
        let world = &harness.session.world;
        let thief = world.agent(AgentId(1)).await.expect("agent");
        let victim = world.agent(AgentId(2)).await.expect("agent");
        assert_eq!(thief.equipment, vec!["holy_robe".to_string()]);
        assert_eq!(victim.equipment, vec!["talisman".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn room_without_rule_records_marker() {
        let mut board = standard_board();
        board.locations[2].rule = RoomActionRule::None;
        let harness = Harness::builder().board(board).build();
        harness.place(AgentId(1), "church");
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let outcome = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect("resolve")
            .expect("current");
        assert_eq!(
            outcome,
            RoomActionOutcome::NoLegalAction {
                location: Some(LocationId::from("church"))
            }
        );
        assert!(harness.store.writes_under("decks").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unplaced_agent_gets_explicit_marker() {
        let harness = Harness::builder().unplaced().build();
        let resolver = resolver(&harness);
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let outcome = resolver
            .resolve(claim.scope(), AgentId(1))
            .await
            .expect("resolve")
            .expect("current");
        assert_eq!(outcome, RoomActionOutcome::NoLegalAction { location: None });
    }
}
