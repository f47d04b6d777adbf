//! Durable per-instance record.
//!
//! One [`InstanceState`] is owned by exactly one instance loop, which is its
//! only writer. Every field round-trips through the state store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::detection::Point;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceState {
    pub id: String,
    pub device_id: String,
    pub bootstrap: BootstrapProgress,
    pub startup_tasks_completed: bool,
    pub tree_clearing: TreeClearing,
    pub second_builder_added: bool,
    pub city_hall_level: u32,
    pub building_positions: BuildingPositions,
    pub build_order: BuildOrder,
    pub builder: BuilderState,
    pub scout: ScoutState,
    pub tavern: TavernState,
    pub resources: Resources,
    pub vip: VipState,
}

impl InstanceState {
    /// Zero-value record for an instance the store has never seen.
    pub fn new(id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            city_hall_level: 1,
            ..Self::default()
        }
    }
}

/// Two-step tutorial completion sequence.
///
/// `completed` mirrors "both steps clicked" and never reverts once set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapProgress {
    pub completed: bool,
    pub step_a_clicked: bool,
    pub step_b_clicked: bool,
}

impl BootstrapProgress {
    pub fn record_step_a(&mut self) {
        self.step_a_clicked = true;
    }

    pub fn record_final_step(&mut self) {
        self.step_b_clicked = true;
        self.completed = true;
    }

    pub fn both_steps_done(&self) -> bool {
        self.step_a_clicked && self.step_b_clicked
    }

    /// Latch `completed` when both steps are recorded and report it.
    pub fn sync_completion(&mut self) -> bool {
        if self.both_steps_done() {
            self.completed = true;
        }
        self.completed
    }

    /// Forget partial progress before an application restart.
    ///
    /// A completed sequence is left untouched.
    pub fn clear_steps_for_restart(&mut self) {
        if self.completed {
            return;
        }
        self.step_a_clicked = false;
        self.step_b_clicked = false;
    }
}

/// Cursor through the fixed tree table used by the `clear_trees` startup task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeClearing {
    pub next_index: usize,
    pub view_reset_done: bool,
    pub completed: bool,
}

/// Building kinds a city can own several of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiBuilding {
    Farm,
    Quarry,
    LumberMill,
    Goldmine,
    Hospital,
}

impl MultiBuilding {
    pub const ALL: [MultiBuilding; 5] = [
        MultiBuilding::Farm,
        MultiBuilding::Quarry,
        MultiBuilding::LumberMill,
        MultiBuilding::Goldmine,
        MultiBuilding::Hospital,
    ];

    /// Detection class and build-order building name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MultiBuilding::Farm => "farm",
            MultiBuilding::Quarry => "quarry",
            MultiBuilding::LumberMill => "lumber_mill",
            MultiBuilding::Goldmine => "goldmine",
            MultiBuilding::Hospital => "hospital",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// First-seen coordinates of the "main" building for each multi-instance kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingPositions(BTreeMap<MultiBuilding, Point>);

impl BuildingPositions {
    pub fn get(&self, kind: MultiBuilding) -> Option<Point> {
        self.0.get(&kind).copied().filter(|p| !p.is_zero())
    }

    /// Store `point` for `kind` unless a non-zero position is already known.
    ///
    /// Returns `true` when the position was recorded.
    pub fn record(&mut self, kind: MultiBuilding, point: Point) -> bool {
        if point.is_zero() || self.get(kind).is_some() {
            return false;
        }
        self.0.insert(kind, point);
        true
    }

    pub fn len(&self) -> usize {
        self.0.values().filter(|p| !p.is_zero()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildKind {
    #[serde(rename = "build_new")]
    New,
    Upgrade,
}

/// Tab of the new-building menu a building is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildCategory {
    Economic,
    Military,
}

impl BuildCategory {
    pub fn tab_class(self) -> &'static str {
        match self {
            BuildCategory::Economic => crate::core::classes::BUILD_ECONOMIC_TAB,
            BuildCategory::Military => crate::core::classes::BUILD_MILITARY_TAB,
        }
    }
}

/// One entry of the ordered build pipeline.
///
/// `completed` flips to `true` once and never reverts; `attempts` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTask {
    pub kind: BuildKind,
    pub building: String,
    /// Alternatives for locating the building (upgrade) or the menu option (new).
    pub detect_classes: Vec<String>,
    /// Menu tab for new buildings. Missing on a new-building task fails the attempt.
    #[serde(default)]
    pub category: Option<BuildCategory>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
}

impl BuildTask {
    pub fn upgrade(building: &str, detect_classes: &[&str]) -> Self {
        Self {
            kind: BuildKind::Upgrade,
            building: building.to_string(),
            detect_classes: detect_classes.iter().map(|c| c.to_string()).collect(),
            category: None,
            completed: false,
            attempts: 0,
            last_attempt: None,
            config: BTreeMap::new(),
        }
    }

    pub fn build_new(building: &str, category: BuildCategory, option_class: &str) -> Self {
        Self {
            kind: BuildKind::New,
            category: Some(category),
            detect_classes: vec![option_class.to_string()],
            ..Self::upgrade(building, &[])
        }
    }

    pub fn label(&self) -> String {
        match self.kind {
            BuildKind::New => format!("build {}", self.building),
            BuildKind::Upgrade => format!("upgrade {}", self.building),
        }
    }
}

/// Persistent, resumable list of build tasks with a cursor at the first
/// incomplete entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOrder {
    pub upcoming_tasks: Vec<BuildTask>,
    pub completed_tasks: Vec<BuildTask>,
    pub last_attempt_time: Option<DateTime<Utc>>,
}

impl BuildOrder {
    /// Index of the only task eligible for an attempt.
    pub fn cursor(&self) -> Option<usize> {
        self.upcoming_tasks.iter().position(|t| !t.completed)
    }

    pub fn pending_count(&self) -> usize {
        self.upcoming_tasks.iter().filter(|t| !t.completed).count()
    }

    /// Book one attempt of the task at `index`.
    ///
    /// Attempts and timestamps are updated whatever the outcome; a success
    /// completes the task and appends a snapshot to `completed_tasks`.
    pub fn record_attempt(&mut self, index: usize, succeeded: bool, now: DateTime<Utc>) {
        let Some(task) = self.upcoming_tasks.get_mut(index) else {
            return;
        };
        task.attempts = task.attempts.saturating_add(1);
        task.last_attempt = Some(now);
        self.last_attempt_time = Some(now);
        if succeeded && !task.completed {
            task.completed = true;
            let snapshot = task.clone();
            self.completed_tasks.push(snapshot);
        }
    }

    /// Clear the retry cooldown of every incomplete task.
    pub fn reset_cooldowns(&mut self) {
        for task in self.upcoming_tasks.iter_mut().filter(|t| !t.completed) {
            task.last_attempt = None;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderState {
    pub second_builder_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutState {
    pub is_moving: bool,
    pub last_move_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TavernState {
    pub last_chest_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub food: u64,
    pub wood: u64,
    pub stone: u64,
    pub gold: u64,
    pub gems: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VipState {
    pub level: u32,
    pub last_claim_time: Option<DateTime<Utc>>,
}
