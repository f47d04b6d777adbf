//! Process-wide pause/shutdown flags and per-instance status snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::info;

use crate::core::state::InstanceState;
use crate::tasks::TaskId;

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    /// Automatic resume point set by [`PauseControl::pause_for`].
    resume_at: Option<Instant>,
    shutdown: bool,
}

/// Cooperative pause and shutdown, shared by every instance loop.
///
/// Loops poll at cycle boundaries; an in-flight handler is never interrupted.
#[derive(Debug, Default)]
pub struct PauseControl {
    flags: Mutex<Flags>,
}

impl PauseControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let mut flags = self.flags.lock();
        flags.paused = true;
        flags.resume_at = None;
    }

    /// Pause now and resume automatically after `duration`.
    pub fn pause_for(&self, duration: Duration) {
        let mut flags = self.flags.lock();
        flags.paused = true;
        flags.resume_at = Some(Instant::now() + duration);
    }

    pub fn resume(&self) {
        let mut flags = self.flags.lock();
        flags.paused = false;
        flags.resume_at = None;
    }

    pub fn is_paused(&self) -> bool {
        let mut flags = self.flags.lock();
        if flags.paused && flags.resume_at.is_some_and(|at| Instant::now() >= at) {
            flags.paused = false;
            flags.resume_at = None;
            info!("timed pause elapsed, resuming");
        }
        flags.paused
    }

    pub fn request_shutdown(&self) {
        self.flags.lock().shutdown = true;
    }

    pub fn is_shutdown(&self) -> bool {
        self.flags.lock().shutdown
    }
}

/// Read-only view of one instance for the console and the reporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub instance_id: String,
    pub iteration: u64,
    pub bootstrap_completed: bool,
    pub step_a_clicked: bool,
    pub step_b_clicked: bool,
    pub startup_tasks_completed: bool,
    pub city_hall_level: u32,
    /// Index of the first incomplete build task.
    pub build_cursor: Option<usize>,
    pub build_total: usize,
    pub build_completed: usize,
    pub last_executed: BTreeMap<String, DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn from_state(state: &InstanceState, iteration: u64) -> Self {
        let order = &state.build_order;
        Self {
            instance_id: state.id.clone(),
            iteration,
            bootstrap_completed: state.bootstrap.completed,
            step_a_clicked: state.bootstrap.step_a_clicked,
            step_b_clicked: state.bootstrap.step_b_clicked,
            startup_tasks_completed: state.startup_tasks_completed,
            city_hall_level: state.city_hall_level,
            build_cursor: order.cursor(),
            build_total: order.upcoming_tasks.len(),
            build_completed: order.completed_tasks.len(),
            last_executed: BTreeMap::new(),
        }
    }

    pub fn with_last_executed(
        mut self,
        entries: impl IntoIterator<Item = (TaskId, Option<DateTime<Utc>>)>,
    ) -> Self {
        self.last_executed = entries
            .into_iter()
            .filter_map(|(id, at)| at.map(|at| (id.as_str().to_string(), at)))
            .collect();
        self
    }

    /// One-line rendering for logs and the console.
    pub fn summary(&self) -> String {
        let cursor = self
            .build_cursor
            .map_or_else(|| "done".to_string(), |c| c.to_string());
        format!(
            "{}: iteration {} | bootstrap {} | startup {} | city hall {} | build {}/{} (cursor {})",
            self.instance_id,
            self.iteration,
            self.bootstrap_completed,
            self.startup_tasks_completed,
            self.city_hall_level,
            self.build_completed,
            self.build_total,
            cursor
        )
    }
}

/// Latest snapshot per instance. Each loop writes only its own entry.
#[derive(Debug, Default)]
pub struct StatusBoard {
    snapshots: RwLock<BTreeMap<String, StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.snapshots
            .write()
            .insert(snapshot.instance_id.clone(), snapshot);
    }

    pub fn get(&self, instance_id: &str) -> Option<StatusSnapshot> {
        self.snapshots.read().get(instance_id).cloned()
    }

    /// Every snapshot, ordered by instance id.
    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.snapshots.read().values().cloned().collect()
    }
}

/// Poll step of the reporter thread; keeps shutdown latency low.
const REPORTER_POLL: Duration = Duration::from_millis(250);

/// Log every snapshot each `interval` until shutdown.
pub fn spawn_reporter(
    board: Arc<StatusBoard>,
    control: Arc<PauseControl>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut last = Instant::now();
        while !control.is_shutdown() {
            thread::sleep(REPORTER_POLL);
            if last.elapsed() < interval {
                continue;
            }
            last = Instant::now();
            for snapshot in board.snapshots() {
                info!(
                    instance = %snapshot.instance_id,
                    paused = control.is_paused(),
                    "{}",
                    snapshot.summary()
                );
            }
        }
    })
}
