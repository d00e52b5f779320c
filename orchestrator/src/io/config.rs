//! Orchestrator configuration stored as TOML (`orchestrator.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Orchestrator configuration (TOML).
///
/// Missing fields default to the protocol's reference timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Identity claimed in the shared store's ownership lease.
    pub instance_id: String,

    /// Seed for the shared random source. Entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    pub timing: TimingConfig,

    pub combat: CombatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Gap inserted between consecutive turn steps.
    pub pacing_ms: u64,
    /// How long a speech cue shows before its roll starts.
    pub speech_cue_ms: u64,
    /// Delay between a finalize event and the visible mutation.
    pub visual_sync_delay_ms: u64,
    /// Perceive/consider latency inside a green negotiation.
    pub negotiation_latency_ms: u64,
    /// Upper bound on waiting for a finalize event.
    pub finalize_timeout_ms: u64,
    /// Upper bound on waiting for a human negotiation answer.
    pub human_answer_timeout_ms: u64,
    /// Animation length of the built-in dice engine.
    pub dice_animation_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CombatConfig {
    /// Hit points agents are seeded with.
    pub max_hp: i32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            instance_id: "orchestrator".to_string(),
            seed: None,
            timing: TimingConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 2000,
            speech_cue_ms: 1500,
            visual_sync_delay_ms: 200,
            negotiation_latency_ms: 600,
            finalize_timeout_ms: 10_000,
            human_answer_timeout_ms: 30_000,
            dice_animation_ms: 1200,
        }
    }
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self { max_hp: 14 }
    }
}

impl TimingConfig {
    /// Zero presentation delays; timeouts keep their defaults. Used for
    /// headless simulation.
    pub fn instant() -> Self {
        Self {
            pacing_ms: 0,
            speech_cue_ms: 0,
            visual_sync_delay_ms: 0,
            negotiation_latency_ms: 0,
            dice_animation_ms: 0,
            ..Self::default()
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn speech_cue(&self) -> Duration {
        Duration::from_millis(self.speech_cue_ms)
    }

    pub fn visual_sync_delay(&self) -> Duration {
        Duration::from_millis(self.visual_sync_delay_ms)
    }

    pub fn negotiation_latency(&self) -> Duration {
        Duration::from_millis(self.negotiation_latency_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    pub fn human_answer_timeout(&self) -> Duration {
        Duration::from_millis(self.human_answer_timeout_ms)
    }

    pub fn dice_animation(&self) -> Duration {
        Duration::from_millis(self.dice_animation_ms)
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.instance_id.trim().is_empty() {
            return Err(anyhow!("instance_id must be non-empty"));
        }
        if self.timing.finalize_timeout_ms == 0 {
            return Err(anyhow!("timing.finalize_timeout_ms must be > 0"));
        }
        if self.timing.human_answer_timeout_ms == 0 {
            return Err(anyhow!("timing.human_answer_timeout_ms must be > 0"));
        }
        if self.combat.max_hp <= 0 {
            return Err(anyhow!("combat.max_hp must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
