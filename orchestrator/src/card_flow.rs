//! Five-phase card flow: draw, show, apply, equip, close.
//!
//! Phases run strictly in order and are serialized per agent. A failing phase
//! aborts the rest and propagates; a superseded turn stops at the next phase
//! boundary with `Ok(None)`. Negotiation-category cards run the green
//! negotiation inside the apply phase, so closing waits for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::faction::Answer;
use crate::core::types::{AgentId, CardDrawResult, DeckId};
use crate::effects::apply_effect;
use crate::error::TurnError;
use crate::guard::TurnScope;
use crate::io::presentation::PresentationCommand;
use crate::negotiation::{GreenNegotiation, NegotiationOutcome};
use crate::session::Session;

pub struct CardFlow {
    session: Session,
    negotiation: GreenNegotiation,
    in_flight: Mutex<HashMap<AgentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl CardFlow {
    pub fn new(session: Session) -> Self {
        Self {
            negotiation: GreenNegotiation::new(session.clone()),
            session,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip_all, fields(agent = %agent, deck = %deck_id))]
    pub async fn draw(
        &self,
        scope: &TurnScope,
        agent: AgentId,
        deck_id: &DeckId,
    ) -> Result<Option<CardDrawResult>> {
        let serial = self.agent_lock(agent);
        let _serial = serial.lock().await;
        if !scope.is_current() {
            return Ok(None);
        }

        let session = &self.session;
        let deck = session
            .board
            .deck(deck_id)
            .ok_or_else(|| TurnError::UnknownDeck(deck_id.clone()))?;

        // Draw.
        let Some(card_id) = session.world.draw_card(scope, deck, &session.rng).await? else {
            return Ok(None);
        };
        let card = deck
            .cards
            .iter()
            .find(|card| card.id == card_id)
            .ok_or_else(|| anyhow!("pile of deck '{}' holds unknown card '{}'", deck.id, card_id))?;
        info!(card = %card.id, "card drawn");
        let mut result = CardDrawResult {
            deck_id: deck_id.clone(),
            card_id: card_id.clone(),
            applied_effects: Vec::new(),
            granted_equipment: None,
            negotiation: None,
        };

        // Show.
        session.presenter.present(PresentationCommand::ShowCard {
            agent,
            deck: deck_id.clone(),
            card: card_id,
        });

        // Apply.
        if session.board.is_negotiation_deck(deck_id) {
            let Some(outcome) = self.negotiation.initiate(scope, agent, card).await? else {
                return Ok(None);
            };
            if let NegotiationOutcome::Closed(request) = outcome {
                result.negotiation = Some(request.request_id.clone());
                if request.answer == Some(Answer::Affirm) {
                    let on_affirm = card
                        .question
                        .as_ref()
                        .map(|question| question.on_affirm)
                        .unwrap_or_default();
                    let Some(applied) =
                        apply_effect(session, scope, request.receiver_id, on_affirm).await?
                    else {
                        return Ok(None);
                    };
                    result.applied_effects = applied;
                }
            }
        } else {
            let Some(applied) = apply_effect(session, scope, agent, card.effect).await? else {
                return Ok(None);
            };
            result.applied_effects = applied;
        }

        // Equip.
        if let Some(item) = &card.equipment {
            let mut equipment = session.world.agent(agent).await?.equipment;
            equipment.push(item.clone());
            if !session.world.set_equipment(scope, agent, &equipment).await? {
                return Ok(None);
            }
            debug!(item, "equipment granted");
            result.granted_equipment = Some(item.clone());
        }

        // Close.
        if !scope.is_current() {
            return Ok(None);
        }
        session
            .presenter
            .present(PresentationCommand::CloseCard { agent });
        Ok(Some(result))
    }

    fn agent_lock(&self, agent: AgentId) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(agent).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CardId;
    use crate::guard::TurnGuard;
    use crate::io::world::paths;
    use crate::test_support::Harness;

    fn stack_deck(harness: &Harness, deck: &str, cards: &[&str]) {
        let pile: Vec<CardId> = cards.iter().map(|card| CardId::from(*card)).collect();
        harness.seed(&paths::deck(&DeckId::from(deck)), &pile);
    }

    #[tokio::test(start_paused = true)]
    async fn phases_run_in_order() {
        let harness = Harness::new();
        stack_deck(&harness, "white", &["white-talisman"]);
        let flow = CardFlow::new(harness.session.clone());
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let result = flow
            .draw(claim.scope(), AgentId(1), &DeckId::from("white"))
            .await
            .expect("draw")
            .expect("current");
        assert_eq!(result.card_id, CardId::from("white-talisman"));
        assert_eq!(result.granted_equipment.as_deref(), Some("talisman"));

        let commands = harness.presenter.commands();
        assert!(matches!(
            commands.as_slice(),
            [
                PresentationCommand::ShowCard { .. },
                PresentationCommand::CloseCard { .. }
            ]
        ));
        let agent = harness.session.world.agent(AgentId(1)).await.expect("agent");
        assert_eq!(agent.equipment, vec!["talisman".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn damage_card_hurts_the_drawer() {
        let harness = Harness::new();
        stack_deck(&harness, "black", &["black-doll"]);
        let flow = CardFlow::new(harness.session.clone());
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(2)).expect("claim");
        let before = harness.session.world.agent(AgentId(2)).await.expect("agent").hp;

        let result = flow
            .draw(claim.scope(), AgentId(2), &DeckId::from("black"))
            .await
            .expect("draw")
            .expect("current");
        assert_eq!(result.applied_effects.len(), 1);
        assert_eq!(result.applied_effects[0].target, AgentId(2));
        assert_eq!(result.applied_effects[0].hp_after, before - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_waits_for_negotiation() {
        let harness = Harness::new();
        harness.place(AgentId(1), "hermit_cabin");
        harness.place(AgentId(2), "hermit_cabin");
        stack_deck(&harness, "green", &["green-shadow-wound"]);
        let flow = CardFlow::new(harness.session.clone());
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let result = flow
            .draw(claim.scope(), AgentId(1), &DeckId::from("green"))
            .await
            .expect("draw")
            .expect("current");
        assert!(result.negotiation.is_some());

        let commands = harness.presenter.timed_commands();
        let dismissed = commands
            .iter()
            .rposition(|(_, command)| matches!(command, PresentationCommand::DismissNegotiation { .. }))
            .expect("dismissed");
        let closed = commands
            .iter()
            .position(|(_, command)| matches!(command, PresentationCommand::CloseCard { .. }))
            .expect("closed");
        assert!(dismissed < closed);

        // Agent 2 is a shadow: affirms "you're a shadow" and takes the wound.
        assert_eq!(result.applied_effects.len(), 1);
        assert_eq!(result.applied_effects[0].target, AgentId(2));
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_aborts_remaining_phases() {
        let harness = Harness::builder().failing_writes_under("agents").build();
        stack_deck(&harness, "white", &["white-first-aid"]);
        let flow = CardFlow::new(harness.session.clone());
        let guard = TurnGuard::new();
        let claim = guard.begin(AgentId(1)).expect("claim");

        let err = flow
            .draw(claim.scope(), AgentId(1), &DeckId::from("white"))
            .await
            .expect_err("write failure");
        assert!(matches!(
            err.downcast_ref::<TurnError>(),
            Some(TurnError::StoreWrite { .. })
        ));
        assert!(
            !harness
                .presenter
                .commands()
                .iter()
                .any(|command| matches!(command, PresentationCommand::CloseCard { .. }))
        );
    }
}
