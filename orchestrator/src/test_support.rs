//! Test-only collaborators and a ready-wired harness.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::core::board::Board;
use crate::core::faction::Answer;
use crate::core::green::GreenRequest;
use crate::core::random::RandomSource;
use crate::core::types::{Agent, AgentId, AgentProfile, Faction, LocationId, RollKind, RollTicket};
use crate::io::board_file;
use crate::io::config::TimingConfig;
use crate::io::dice::{DiceEngine, FinalizeBus};
use crate::io::human::HumanInput;
use crate::io::presentation::{PresentationCommand, Presenter};
use crate::io::store::{MemoryStore, SharedStore, StoreSubscription};
use crate::io::world::{World, paths};
use crate::scheduler::TurnScheduler;
use crate::session::Session;

pub const MAX_HP: i32 = 14;
pub const START: &str = "hermit_cabin";

/// The embedded standard board.
pub fn standard_board() -> Board {
    board_file::standard_board().expect("standard board parses")
}

/// Four seats: autonomous hunter (1), shadow (2), neutral (3) and a human
/// hunter (4).
pub fn roster() -> Vec<AgentProfile> {
    let seat = |id: u32, name: &str, color: &str, faction: Faction, autonomous: bool| {
        AgentProfile {
            id: AgentId(id),
            name: name.to_string(),
            color: color.to_string(),
            faction,
            seat: u8::try_from(id).unwrap_or_default(),
            autonomous,
        }
    };
    vec![
        seat(1, "Ash", "red", Faction::Hunter, true),
        seat(2, "Bryn", "blue", Faction::Shadow, true),
        seat(3, "Cato", "green", Faction::Neutral, true),
        seat(4, "Dana", "white", Faction::Hunter, false),
    ]
}

/// Live agent with 10 hp at `location`.
pub fn agent_at(id: u32, faction: Faction, location: &str) -> Agent {
    Agent {
        id: AgentId(id),
        name: format!("agent-{id}"),
        color: "grey".to_string(),
        faction,
        position: Some(LocationId::from(location)),
        hp: 10,
        autonomous: true,
        equipment: Vec::new(),
    }
}

/// Dice engine that finalizes scripted values after a fixed animation.
///
/// Empty queues fall back to a move roll of 4 and an attack roll of 1.
pub struct ScriptedDice {
    bus: FinalizeBus,
    moves: Mutex<VecDeque<u8>>,
    attacks: Mutex<VecDeque<u8>>,
    animation: Duration,
    silent: bool,
    started: Mutex<Vec<(RollKind, AgentId, Instant)>>,
}

impl Default for ScriptedDice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDice {
    pub fn new() -> Self {
        Self {
            bus: FinalizeBus::new(),
            moves: Mutex::new(VecDeque::new()),
            attacks: Mutex::new(VecDeque::new()),
            animation: Duration::from_millis(1200),
            silent: false,
            started: Mutex::new(Vec::new()),
        }
    }

    /// Never finalizes.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::new()
        }
    }

    pub fn moves(self, values: impl IntoIterator<Item = u8>) -> Self {
        self.moves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values);
        self
    }

    pub fn attacks(self, values: impl IntoIterator<Item = u8>) -> Self {
        self.attacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values);
        self
    }

    pub fn animation(mut self, animation: Duration) -> Self {
        self.animation = animation;
        self
    }

    pub fn bus(&self) -> &FinalizeBus {
        &self.bus
    }

    /// Every roll started so far.
    pub fn started(&self) -> Vec<(RollKind, AgentId, Instant)> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DiceEngine for ScriptedDice {
    async fn roll(&self, kind: RollKind, actor: AgentId) -> Result<RollTicket> {
        let ticket = self.bus.issue(kind, actor);
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, actor, Instant::now()));
        if self.silent {
            return Ok(ticket);
        }
        let value = match kind {
            RollKind::Move => self
                .moves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(4),
            RollKind::Attack => self
                .attacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(1),
        };
        let bus = self.bus.clone();
        let animation = self.animation;
        tokio::spawn(async move {
            tokio::time::sleep(animation).await;
            bus.finalize(&ticket, value);
        });
        Ok(ticket)
    }
}

/// Presenter that records every command with its (virtual) time.
#[derive(Default)]
pub struct RecordingPresenter {
    commands: Mutex<Vec<(Instant, PresentationCommand)>>,
}

impl RecordingPresenter {
    pub fn commands(&self) -> Vec<PresentationCommand> {
        self.timed_commands()
            .into_iter()
            .map(|(_, command)| command)
            .collect()
    }

    pub fn timed_commands(&self) -> Vec<(Instant, PresentationCommand)> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, command: PresentationCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Instant::now(), command));
    }
}

/// Human input that answers after a delay, or never.
pub struct ScriptedHuman {
    answer: Option<(Answer, Duration)>,
    asked: Mutex<Vec<GreenRequest>>,
}

impl ScriptedHuman {
    pub fn answering(answer: Answer, after: Duration) -> Self {
        Self {
            answer: Some((answer, after)),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self {
            answer: None,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<GreenRequest> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HumanInput for ScriptedHuman {
    async fn answer(&self, request: &GreenRequest) -> Result<Answer> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        match self.answer {
            Some((answer, after)) => {
                tokio::time::sleep(after).await;
                Ok(answer)
            }
            None => std::future::pending().await,
        }
    }
}

/// Store whose writes under `prefix` fail. Reads and other writes pass
/// through to the wrapped [`MemoryStore`].
pub struct FailingStore {
    inner: MemoryStore,
    prefix: String,
}

impl FailingStore {
    pub fn new(inner: MemoryStore, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.to_string(),
        }
    }

    fn check(&self, path: &str) -> Result<()> {
        if path == self.prefix || path.starts_with(&format!("{}/", self.prefix)) {
            return Err(anyhow!("injected write failure at {path}"));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for FailingStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        self.check(path)?;
        self.inner.write(path, value).await
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool> {
        self.check(path)?;
        self.inner.compare_and_swap(path, expected, value).await
    }

    fn subscribe(&self, prefix: &str) -> StoreSubscription {
        self.inner.subscribe(prefix)
    }
}

/// Session wired to scripted collaborators over a [`MemoryStore`], with every
/// roster agent seeded at [`START`] with [`MAX_HP`].
pub struct Harness {
    pub store: MemoryStore,
    pub presenter: Arc<RecordingPresenter>,
    pub dice: Arc<ScriptedDice>,
    pub session: Session,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn scheduler(&self) -> TurnScheduler {
        TurnScheduler::new(self.session.clone())
    }

    /// Seed `path` directly, bypassing failure injection.
    pub fn seed<T: Serialize>(&self, path: &str, value: &T) {
        let value = serde_json::to_value(value).expect("encode seed value");
        self.store.insert(path, value);
    }

    pub fn place(&self, agent: AgentId, location: &str) {
        self.seed(&paths::position(agent), &LocationId::from(location));
    }

    pub fn set_hp(&self, agent: AgentId, hp: i32) {
        self.seed(&paths::hp(agent), &hp);
    }
}

pub struct HarnessBuilder {
    board: Board,
    roster: Vec<AgentProfile>,
    dice: ScriptedDice,
    human: Arc<dyn HumanInput>,
    timing: TimingConfig,
    failing_prefix: Option<String>,
    placed: bool,
    seed: u64,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            board: standard_board(),
            roster: roster(),
            dice: ScriptedDice::new(),
            human: Arc::new(ScriptedHuman::silent()),
            timing: TimingConfig::default(),
            failing_prefix: None,
            placed: true,
            seed: 7,
        }
    }
}

impl HarnessBuilder {
    pub fn board(mut self, board: Board) -> Self {
        self.board = board;
        self
    }

    pub fn roster(mut self, roster: Vec<AgentProfile>) -> Self {
        self.roster = roster;
        self
    }

    pub fn dice(mut self, dice: ScriptedDice) -> Self {
        self.dice = dice;
        self
    }

    pub fn human(mut self, human: ScriptedHuman) -> Self {
        self.human = Arc::new(human);
        self
    }

    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fail every write under `prefix`.
    pub fn failing_writes_under(mut self, prefix: &str) -> Self {
        self.failing_prefix = Some(prefix.to_string());
        self
    }

    /// Leave agents off the board.
    pub fn unplaced(mut self) -> Self {
        self.placed = false;
        self
    }

    pub fn build(self) -> Harness {
        let store = MemoryStore::new();
        for profile in &self.roster {
            if self.placed {
                store.insert(&paths::position(profile.id), Value::from(START));
            }
            store.insert(&paths::hp(profile.id), Value::from(MAX_HP));
            store.insert(&paths::equipment(profile.id), Value::Array(Vec::new()));
        }
        let shared: Arc<dyn SharedStore> = match &self.failing_prefix {
            Some(prefix) => Arc::new(FailingStore::new(store.clone(), prefix)),
            None => Arc::new(store.clone()),
        };
        let presenter = Arc::new(RecordingPresenter::default());
        let dice = Arc::new(self.dice);
        let session = Session {
            world: World::new(shared, self.roster),
            board: Arc::new(self.board),
            finalize: dice.bus().clone(),
            dice: dice.clone(),
            presenter: presenter.clone(),
            human: self.human,
            rng: RandomSource::seeded(self.seed),
            timing: self.timing,
            max_hp: MAX_HP,
        };
        Harness {
            store,
            presenter,
            dice,
            session,
        }
    }
}
