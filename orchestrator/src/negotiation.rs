//! Green negotiation: request, perceive, answer, close.
//!
//! The sender hands a negotiation card to a receiver chosen by
//! [`select_receiver`]. Autonomous receivers answer with the faction
//! heuristic; human receivers answer through [`HumanInput`], bounded by the
//! configured timeout, after which the heuristic answers for them.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::board::CardSpec;
use crate::core::faction::{Answer, Relation, decide};
use crate::core::green::GreenRequest;
use crate::core::target::select_receiver;
use crate::core::types::{Agent, AgentId, RequestId};
use crate::guard::TurnScope;
use crate::io::presentation::PresentationCommand;
use crate::io::world::paths;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Nobody else is alive to receive the card.
    NoReceiver,
    Closed(GreenRequest),
}

pub struct GreenNegotiation {
    session: Session,
    issued: AtomicU64,
}

impl GreenNegotiation {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            issued: AtomicU64::new(0),
        }
    }

    /// Run one negotiation for `card`. `Ok(None)` when the turn was superseded
    /// partway; the request is then left unclosed in the store.
    #[instrument(skip_all, fields(sender = %sender, card = %card.id))]
    pub async fn initiate(
        &self,
        scope: &TurnScope,
        sender: AgentId,
        card: &CardSpec,
    ) -> Result<Option<NegotiationOutcome>> {
        let session = &self.session;
        let question = card
            .question
            .as_ref()
            .ok_or_else(|| anyhow!("card '{}' carries no question", card.id))?;

        let agents = session.world.agents().await?;
        if !scope.is_current() {
            return Ok(None);
        }
        let Some(receiver) = select_receiver(&session.board, &agents, sender)
            .and_then(|id| agents.iter().find(|agent| agent.id == id))
        else {
            info!("no receiver available");
            return Ok(Some(NegotiationOutcome::NoReceiver));
        };

        let request_id = self.next_request_id(scope);
        let mut request = GreenRequest::new(
            request_id.clone(),
            sender,
            receiver.id,
            card.id.clone(),
            Utc::now(),
        );
        if !self.publish(scope, &request).await? {
            return Ok(None);
        }
        if !session
            .world
            .put(scope, &paths::inbox(receiver.id), &request_id)
            .await?
        {
            return Ok(None);
        }
        session.presenter.present(PresentationCommand::ShowNegotiation {
            request: request_id.clone(),
            sender,
            receiver: receiver.id,
        });
        info!(request = %request_id, receiver = %receiver.id, "negotiation opened");

        let latency = session.timing.negotiation_latency();
        if !scope.pause(latency).await {
            return Ok(None);
        }

        let relation = Relation::of(receiver.faction, question);
        let Some(answer) = self.answer_for(scope, &request, receiver, relation).await? else {
            return Ok(None);
        };
        request
            .record_answer(answer, Utc::now())
            .context("record negotiation answer")?;
        if !self.publish(scope, &request).await? {
            return Ok(None);
        }
        session.presenter.present(PresentationCommand::ShowAnswer {
            request: request_id.clone(),
            answer,
        });

        if !scope.pause(latency).await {
            return Ok(None);
        }

        for party in [sender, receiver.id] {
            session
                .presenter
                .present(PresentationCommand::DismissNegotiation {
                    request: request_id.clone(),
                    party,
                });
        }
        request
            .close(Utc::now())
            .context("close negotiation")?;
        if !self.publish(scope, &request).await? {
            return Ok(None);
        }
        info!(request = %request_id, ?answer, "negotiation closed");
        Ok(Some(NegotiationOutcome::Closed(request)))
    }

    async fn answer_for(
        &self,
        scope: &TurnScope,
        request: &GreenRequest,
        receiver: &Agent,
        relation: Relation,
    ) -> Result<Option<Answer>> {
        let session = &self.session;
        if receiver.autonomous {
            return Ok(Some(decide(receiver.faction, relation, &session.rng)));
        }
        let timeout = session.timing.human_answer_timeout();
        let wait = tokio::time::timeout(timeout, session.human.answer(request));
        match scope.until(wait).await {
            None => Ok(None),
            Some(Ok(answer)) => answer.context("await human answer").map(Some),
            Some(Err(_)) => {
                warn!(
                    request = %request.request_id,
                    ?timeout,
                    "human answer timed out; answering by faction heuristic"
                );
                Ok(Some(decide(receiver.faction, relation, &session.rng)))
            }
        }
    }

    async fn publish(&self, scope: &TurnScope, request: &GreenRequest) -> Result<bool> {
        self.session
            .world
            .put(scope, &paths::negotiation(&request.request_id), request)
            .await
    }

    /// `g-<turn serial>-<n>`, unique for the lifetime of this instance.
    fn next_request_id(&self, scope: &TurnScope) -> RequestId {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        RequestId(format!("g-{}-{}", scope.token().serial(), n))
    }
}
