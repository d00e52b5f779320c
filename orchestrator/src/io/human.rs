//! Answer channel for human negotiation receivers.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::core::faction::Answer;
use crate::core::green::GreenRequest;
use crate::core::types::RequestId;

#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Wait for the receiver's answer to `request`. Unbounded; callers impose
    /// their own timeout.
    async fn answer(&self, request: &GreenRequest) -> Result<Answer>;
}

/// Answers arrive as `(request id, answer)` pairs on an mpsc channel. Answers
/// for other requests (late replies to abandoned requests) are discarded.
pub struct ChannelHumanInput {
    rx: Mutex<mpsc::Receiver<(RequestId, Answer)>>,
}

impl ChannelHumanInput {
    pub fn new(rx: mpsc::Receiver<(RequestId, Answer)>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<(RequestId, Answer)>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl HumanInput for ChannelHumanInput {
    async fn answer(&self, request: &GreenRequest) -> Result<Answer> {
        let mut rx = self.rx.lock().await;
        while let Some((id, answer)) = rx.recv().await {
            if id == request.request_id {
                return Ok(answer);
            }
            debug!(stale = %id, waiting = %request.request_id, "discarding answer");
        }
        Err(anyhow!("human input channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::core::types::{AgentId, CardId};

    #[tokio::test]
    async fn answers_for_other_requests_are_skipped() {
        let (tx, input) = ChannelHumanInput::channel(4);
        let request = GreenRequest::new(
            RequestId::from("g-2-1"),
            AgentId(1),
            AgentId(2),
            CardId::from("green-1"),
            Utc::now(),
        );
        tx.send((RequestId::from("g-1-1"), Answer::Affirm))
            .await
            .expect("send");
        tx.send((RequestId::from("g-2-1"), Answer::Deny))
            .await
            .expect("send");
        assert_eq!(input.answer(&request).await.expect("answer"), Answer::Deny);

        drop(tx);
        assert!(input.answer(&request).await.is_err());
    }
}
