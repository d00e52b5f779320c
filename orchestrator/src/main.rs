//! Turn orchestrator CLI.
//!
//! `init` writes a default config and the standard board, `validate` checks a
//! board file, and `simulate` drives turns for the autonomous seats against an
//! in-memory store, printing a JSON report.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use orchestrator::core::board::Board;
use orchestrator::core::random::RandomSource;
use orchestrator::core::types::AgentProfile;
use orchestrator::driver::STATUS_ENDED;
use orchestrator::error::TurnError;
use orchestrator::exit_codes;
use orchestrator::io::board_file::{
    STANDARD_BOARD, demo_roster, load_board, load_roster, standard_board,
};
use orchestrator::io::config::{
    OrchestratorConfig, TimingConfig, load_config, write_config,
};
use orchestrator::io::dice::{AnimatedDice, FinalizeBus};
use orchestrator::io::human::ChannelHumanInput;
use orchestrator::io::lease::Lease;
use orchestrator::io::presentation::LogPresenter;
use orchestrator::io::store::{MemoryStore, SharedStore};
use orchestrator::io::world::World;
use orchestrator::logging;
use orchestrator::scheduler::TurnScheduler;
use orchestrator::session::Session;
use orchestrator::simulate::{SimulationReport, run_simulation};

const CONFIG_PATH: &str = "orchestrator.toml";
const BOARD_PATH: &str = "board.json";

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Host-authoritative turn orchestrator for autonomous agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `orchestrator.toml` and `board.json` if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a board file against the schema and board invariants.
    Validate {
        #[arg(long, default_value = BOARD_PATH)]
        board: PathBuf,
    },
    /// Run turns against an in-memory store and print a JSON report.
    Simulate {
        #[arg(long, default_value_t = 20)]
        turns: u32,
        /// Overrides the configured seed.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = CONFIG_PATH)]
        config: PathBuf,
        /// Standard board when omitted.
        #[arg(long)]
        board: Option<PathBuf>,
        /// Built-in six-seat roster when omitted.
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Zero pacing, cue, latency and animation delays.
        #[arg(long)]
        instant: bool,
    },
}

struct SimulateArgs {
    turns: u32,
    seed: Option<u64>,
    config: PathBuf,
    board: Option<PathBuf>,
    roster: Option<PathBuf>,
    instant: bool,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Validate { board } => cmd_validate(&board),
        Command::Simulate {
            turns,
            seed,
            config,
            board,
            roster,
            instant,
        } => cmd_simulate(SimulateArgs {
            turns,
            seed,
            config,
            board,
            roster,
            instant,
        }),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TurnError>() {
        Some(TurnError::LeaseHeld { .. }) => exit_codes::LEASE_HELD,
        _ => exit_codes::INVALID,
    }
}

fn cmd_init(force: bool) -> Result<()> {
    let config_path = Path::new(CONFIG_PATH);
    if force || !config_path.exists() {
        write_config(config_path, &OrchestratorConfig::default())
            .context("write orchestrator.toml")?;
    }
    write_if_missing_or_force(Path::new(BOARD_PATH), STANDARD_BOARD, force)?;
    Ok(())
}

fn cmd_validate(board: &Path) -> Result<()> {
    let board = load_board(board)?;
    println!(
        "board ok: {} locations, {} decks",
        board.locations.len(),
        board.decks.len()
    );
    Ok(())
}

fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.instant {
        config.timing = TimingConfig {
            finalize_timeout_ms: config.timing.finalize_timeout_ms,
            human_answer_timeout_ms: config.timing.human_answer_timeout_ms,
            ..TimingConfig::instant()
        };
    }
    let board = match &args.board {
        Some(path) => load_board(path)?,
        None => standard_board()?,
    };
    let mut roster = match &args.roster {
        Some(path) => load_roster(path)?,
        None => demo_roster()?,
    };
    // Nobody answers human prompts in a headless run.
    for profile in &mut roster {
        profile.autonomous = true;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    let report = runtime.block_on(simulate(config, board, roster, args.turns))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize report")?
    );
    Ok(())
}

async fn simulate(
    config: OrchestratorConfig,
    board: Board,
    roster: Vec<AgentProfile>,
    turns: u32,
) -> Result<SimulationReport> {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let lease = Lease::acquire(Arc::clone(&store), &config.instance_id).await?;
    let start = board
        .locations
        .first()
        .map(|location| location.id.clone())
        .ok_or_else(|| anyhow!("board has no locations"))?;

    let world = World::new(store, roster);
    world.seed_agents(&start, config.combat.max_hp).await?;

    let rng = RandomSource::from_seed(config.seed);
    let finalize = FinalizeBus::new();
    let dice = AnimatedDice::new(finalize.clone(), rng.clone(), config.timing.dice_animation());
    let (_answers, human) = ChannelHumanInput::channel(8);
    let session = Session {
        world,
        board: Arc::new(board),
        finalize,
        dice: Arc::new(dice),
        presenter: Arc::new(LogPresenter),
        human: Arc::new(human),
        rng,
        timing: config.timing.clone(),
        max_hp: config.combat.max_hp,
    };
    info!(instance = %lease.instance(), turns, "simulation starting");

    let scheduler = TurnScheduler::new(session).with_lease(lease.clone());
    let report = run_simulation(&scheduler, turns).await?;
    scheduler.session().world.set_game_status(STATUS_ENDED).await?;
    lease.release().await?;
    Ok(report)
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["orchestrator", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["orchestrator", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_simulate_defaults() {
        let cli = Cli::parse_from(["orchestrator", "simulate"]);
        let Command::Simulate {
            turns,
            seed,
            config,
            instant,
            ..
        } = cli.command
        else {
            panic!("expected simulate");
        };
        assert_eq!(turns, 20);
        assert_eq!(seed, None);
        assert_eq!(config, PathBuf::from(CONFIG_PATH));
        assert!(!instant);
    }

    #[test]
    fn lease_conflicts_map_to_their_own_exit_code() {
        let held: anyhow::Error = TurnError::LeaseHeld {
            holder: "other".to_string(),
        }
        .into();
        assert_eq!(exit_code_for(&held), exit_codes::LEASE_HELD);
        assert_eq!(exit_code_for(&anyhow!("bad board")), exit_codes::INVALID);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn instant_simulation_completes_turns() {
        let config = OrchestratorConfig {
            seed: Some(5),
            timing: TimingConfig::instant(),
            ..OrchestratorConfig::default()
        };
        let board = standard_board().expect("board");
        let roster = demo_roster().expect("roster");
        let report = simulate(config, board, roster, 12).await.expect("simulate");
        assert!(report.turns > 0);
        assert_eq!(report.completed, report.turns);
    }
}
