//! Green negotiation request lifecycle: `Pending → Answered → Closed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::faction::Answer;
use crate::core::types::{AgentId, CardId, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Answered,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTimestamps {
    pub created: DateTime<Utc>,
    pub answered: Option<DateTime<Utc>>,
    pub closed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("request {id}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenRequest {
    pub request_id: RequestId,
    pub sender_id: AgentId,
    pub receiver_id: AgentId,
    pub card_id: CardId,
    pub status: RequestStatus,
    pub answer: Option<Answer>,
    pub timestamps: RequestTimestamps,
}

impl GreenRequest {
    pub fn new(
        request_id: RequestId,
        sender_id: AgentId,
        receiver_id: AgentId,
        card_id: CardId,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            sender_id,
            receiver_id,
            card_id,
            status: RequestStatus::Pending,
            answer: None,
            timestamps: RequestTimestamps {
                created,
                answered: None,
                closed: None,
            },
        }
    }

    pub fn record_answer(&mut self, answer: Answer, at: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition(RequestStatus::Pending, RequestStatus::Answered)?;
        self.answer = Some(answer);
        self.timestamps.answered = Some(at);
        Ok(())
    }

    /// Terminal. Only an answered request may close.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), NegotiationError> {
        self.transition(RequestStatus::Answered, RequestStatus::Closed)?;
        self.timestamps.closed = Some(at);
        Ok(())
    }

    fn transition(&mut self, expected: RequestStatus, to: RequestStatus) -> Result<(), NegotiationError> {
        if self.status != expected {
            return Err(NegotiationError::InvalidTransition {
                id: self.request_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
