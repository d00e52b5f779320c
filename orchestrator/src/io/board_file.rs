//! Board and roster documents with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::board::{Board, validate_board_invariants};
use crate::core::types::AgentProfile;

pub const BOARD_SCHEMA: &str = include_str!("../../schemas/board/v1.schema.json");
pub const STANDARD_BOARD: &str = include_str!("../../boards/standard.json");
pub const DEMO_ROSTER: &str = include_str!("../../rosters/demo.json");

/// The built-in six-location board.
pub fn standard_board() -> Result<Board> {
    parse_board(STANDARD_BOARD).context("parse standard board")
}

/// Load and validate a board file (schema + invariants).
pub fn load_board(path: &Path) -> Result<Board> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read board {}", path.display()))?;
    parse_board(&contents).with_context(|| format!("load board {}", path.display()))
}

pub fn parse_board(raw: &str) -> Result<Board> {
    let value: Value = serde_json::from_str(raw).context("parse board json")?;
    validate_schema(&value)?;
    let board: Board = serde_json::from_value(value).context("deserialize board")?;
    let errors = validate_board_invariants(&board);
    if !errors.is_empty() {
        return Err(anyhow!("board invariants failed: {}", errors.join("; ")));
    }
    Ok(board)
}

/// Six autonomous seats, two per faction.
pub fn demo_roster() -> Result<Vec<AgentProfile>> {
    parse_roster(DEMO_ROSTER).context("parse demo roster")
}

/// Roster produced by seat assignment.
pub fn load_roster(path: &Path) -> Result<Vec<AgentProfile>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read roster {}", path.display()))?;
    parse_roster(&contents).with_context(|| format!("load roster {}", path.display()))
}

pub fn parse_roster(raw: &str) -> Result<Vec<AgentProfile>> {
    let roster: Vec<AgentProfile> = serde_json::from_str(raw).context("parse roster json")?;
    if roster.is_empty() {
        return Err(anyhow!("roster has no agents"));
    }
    let mut ids: Vec<_> = roster.iter().map(|profile| profile.id).collect();
    ids.sort();
    ids.dedup();
    if ids.len() != roster.len() {
        return Err(anyhow!("roster has duplicate agent ids"));
    }
    Ok(roster)
}

fn validate_schema(board: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(BOARD_SCHEMA).context("parse board schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(board) {
        let messages = compiled
            .iter_errors(board)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "board schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
