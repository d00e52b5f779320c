//! Collaborators shared by every turn of one room.

use std::sync::Arc;

use crate::core::board::Board;
use crate::core::random::RandomSource;
use crate::io::config::TimingConfig;
use crate::io::dice::{DiceEngine, FinalizeBus};
use crate::io::human::HumanInput;
use crate::io::presentation::Presenter;
use crate::io::world::World;

/// Room context handed to the scheduler and its step components. Cloning is
/// cheap; every collaborator is shared.
#[derive(Clone)]
pub struct Session {
    pub world: World,
    pub board: Arc<Board>,
    pub finalize: FinalizeBus,
    pub dice: Arc<dyn DiceEngine>,
    pub presenter: Arc<dyn Presenter>,
    pub human: Arc<dyn HumanInput>,
    pub rng: RandomSource,
    pub timing: TimingConfig,
    /// Upper bound for healing effects.
    pub max_hp: i32,
}
