//! Fire-and-forget presentation commands.

use std::time::Duration;

use tracing::info;

use crate::core::faction::Answer;
use crate::core::types::{AgentId, CardId, DeckId, RequestId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationCommand {
    /// Transient speech-bubble notice; expires after `duration` unless
    /// dismissed first.
    ShowNotice {
        actor: AgentId,
        text: String,
        duration: Duration,
    },
    DismissNotice {
        actor: AgentId,
    },
    ShowCard {
        agent: AgentId,
        deck: DeckId,
        card: CardId,
    },
    CloseCard {
        agent: AgentId,
    },
    ShowNegotiation {
        request: RequestId,
        sender: AgentId,
        receiver: AgentId,
    },
    ShowAnswer {
        request: RequestId,
        answer: Answer,
    },
    DismissNegotiation {
        request: RequestId,
        party: AgentId,
    },
}

pub trait Presenter: Send + Sync {
    fn present(&self, command: PresentationCommand);
}

/// Presenter that only logs; used headless.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&self, command: PresentationCommand) {
        info!(?command, "present");
    }
}
