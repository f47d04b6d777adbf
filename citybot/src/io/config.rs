//! Bot configuration stored in `citybot.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::classes::tutorial;

pub const DEFAULT_CONFIG_PATH: &str = "citybot.toml";

static INSTANCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Bot configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work against a single local emulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotConfig {
    pub global: GlobalConfig,
    pub vision: VisionConfig,
    pub device: DeviceConfig,
    pub gameplay: GameplayConfig,
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Sleep between gameplay cycles.
    pub refresh_interval_ms: u64,
    /// How often the reporter thread logs status snapshots.
    pub report_interval_secs: u64,
    /// Directory holding one JSON record per instance.
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisionConfig {
    /// Detector command; the model id is appended as the final argument.
    pub command: Vec<String>,
    pub tutorial_model: String,
    pub gameplay_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb_path: PathBuf,
    pub command_timeout_secs: u64,
    /// Android package restarted by the bootstrap supervisor.
    pub package: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameplayConfig {
    /// One-time startup tasks, run in order before regular gameplay.
    pub startup_tasks: Vec<StartupTask>,
    /// Scheduler cooldown of the build-order task.
    pub build_cooldown_secs: u64,
}

/// One-time tasks run after the tutorial and before scheduled gameplay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartupTask {
    ClearTrees,
    RecruitSecondBuilder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceConfig {
    /// adb serial of the device or emulator.
    pub device_id: String,
    /// Civilization picked during the tutorial.
    pub preferred_civilization: String,
    pub claim_quests: bool,
    pub claim_only_main_quest: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            report_interval_secs: 60,
            state_dir: PathBuf::from("state"),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            command: vec!["citybot-detect".to_string()],
            tutorial_model: "rok_tutorial/7".to_string(),
            gameplay_model: "rok_gameplay/1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            command_timeout_secs: 15,
            package: "com.lilithgame.roc.gp".to_string(),
        }
    }
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            startup_tasks: vec![StartupTask::ClearTrees, StartupTask::RecruitSecondBuilder],
            build_cooldown_secs: 15,
        }
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            device_id: "emulator-5554".to_string(),
            preferred_civilization: "china".to_string(),
            claim_quests: true,
            claim_only_main_quest: false,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            vision: VisionConfig::default(),
            device: DeviceConfig::default(),
            gameplay: GameplayConfig::default(),
            instances: BTreeMap::from([("main".to_string(), InstanceConfig::default())]),
        }
    }
}

impl GlobalConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.global.refresh_interval_ms == 0 {
            return Err(anyhow!("global.refresh_interval_ms must be > 0"));
        }
        if self.global.report_interval_secs == 0 {
            return Err(anyhow!("global.report_interval_secs must be > 0"));
        }
        if self.vision.command.is_empty() || self.vision.command[0].trim().is_empty() {
            return Err(anyhow!("vision.command must be a non-empty array"));
        }
        if self.vision.tutorial_model.trim().is_empty() || self.vision.gameplay_model.trim().is_empty()
        {
            return Err(anyhow!("vision model ids must be non-empty"));
        }
        if self.vision.timeout_secs == 0 {
            return Err(anyhow!("vision.timeout_secs must be > 0"));
        }
        if self.device.command_timeout_secs == 0 {
            return Err(anyhow!("device.command_timeout_secs must be > 0"));
        }
        if self.device.package.trim().is_empty() {
            return Err(anyhow!("device.package must be non-empty"));
        }
        if self.instances.is_empty() {
            return Err(anyhow!("at least one [instances.<id>] section is required"));
        }
        for (id, instance) in &self.instances {
            if !INSTANCE_ID_RE.is_match(id) {
                bail!("instance id {id:?} may only contain letters, digits, '_' and '-'");
            }
            if instance.device_id.trim().is_empty() {
                bail!("instances.{id}.device_id must be non-empty");
            }
            let civ = instance.preferred_civilization.to_lowercase();
            if !tutorial::OPTIONS.contains(&civ.as_str()) {
                bail!(
                    "instances.{id}.preferred_civilization {:?} is not one of {}",
                    instance.preferred_civilization,
                    tutorial::OPTIONS.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Load and validate config from a TOML file.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        bail!(
            "config {} not found (run `citybot init` to create one)",
            path.display()
        );
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml")).expect_err("missing");
        assert!(err.to_string().contains("citybot init"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("citybot.toml");
        let cfg = BotConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let cfg: BotConfig = toml::from_str(
            r#"
            [gameplay]
            startup_tasks = ["recruit_second_builder"]

            [instances.farm-2]
            device_id = "emulator-5556"
            preferred_civilization = "Rome"
            "#,
        )
        .expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.gameplay.startup_tasks, vec![StartupTask::RecruitSecondBuilder]);
        assert_eq!(cfg.gameplay.build_cooldown_secs, 15);
        assert!(cfg.instances["farm-2"].claim_quests);
        assert_eq!(cfg.global, GlobalConfig::default());
    }

    #[test]
    fn unknown_startup_task_is_rejected() {
        let parsed: Result<BotConfig, _> = toml::from_str(
            r#"
            [gameplay]
            startup_tasks = ["clear_trees", "collect_gems"]
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_bad_instances() {
        let mut cfg = BotConfig::default();
        cfg.instances.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = BotConfig::default();
        cfg.instances.insert("bad id".to_string(), InstanceConfig::default());
        assert!(cfg.validate().is_err());

        let mut cfg = BotConfig::default();
        cfg.instances.get_mut("main").expect("main").preferred_civilization = "atlantis".into();
        assert!(cfg.validate().is_err());

        let mut cfg = BotConfig::default();
        cfg.vision.command.clear();
        assert!(cfg.validate().is_err());
    }
}
