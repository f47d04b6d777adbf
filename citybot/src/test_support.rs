//! Scripted devices, detectors, clocks, and stores for deterministic tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::detection::{Detection, Point};
use crate::core::state::InstanceState;
use crate::io::clock::Clock;
use crate::io::detector::Detector;
use crate::io::device::{Device, Frame, KeyCode};
use crate::io::state_store::{JsonStateStore, StateStore};

/// Create a 40x40 detection centred on (`x`, `y`).
pub fn det(class: &str, x: f64, y: f64, confidence: f64) -> Detection {
    Detection {
        class: class.to_string(),
        x,
        y,
        width: 40.0,
        height: 40.0,
        confidence,
    }
}

/// One input recorded by [`ScriptedDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Tap(Point),
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },
    Key(u32),
    Restart,
}

/// Device that records inputs and returns a fixed PNG frame.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    inputs: RefCell<Vec<Input>>,
    fail_taps: Cell<bool>,
    fail_captures: Cell<bool>,
    captures: Cell<usize>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> Vec<Input> {
        self.inputs.borrow().clone()
    }

    /// Tap targets only, in order.
    pub fn taps(&self) -> Vec<Point> {
        self.inputs
            .borrow()
            .iter()
            .filter_map(|input| match input {
                Input::Tap(point) => Some(*point),
                _ => None,
            })
            .collect()
    }

    pub fn restarts(&self) -> usize {
        self.inputs
            .borrow()
            .iter()
            .filter(|input| **input == Input::Restart)
            .count()
    }

    pub fn captures(&self) -> usize {
        self.captures.get()
    }

    /// Make every subsequent tap fail without being recorded.
    pub fn fail_taps(&self, fail: bool) {
        self.fail_taps.set(fail);
    }

    pub fn fail_captures(&self, fail: bool) {
        self.fail_captures.set(fail);
    }

    fn record(&self, input: Input) {
        self.inputs.borrow_mut().push(input);
    }
}

impl Device for ScriptedDevice {
    fn tap(&self, point: Point) -> Result<()> {
        if self.fail_taps.get() {
            bail!("device offline");
        }
        self.record(Input::Tap(point));
        Ok(())
    }

    fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<()> {
        self.record(Input::Swipe {
            from,
            to,
            duration_ms: duration.as_millis() as u64,
        });
        Ok(())
    }

    fn press_key(&self, key: KeyCode) -> Result<()> {
        self.record(Input::Key(key.code()));
        Ok(())
    }

    fn capture(&self) -> Result<Frame> {
        if self.fail_captures.get() {
            bail!("screencap failed");
        }
        self.captures.set(self.captures.get() + 1);
        Ok(Frame(b"\x89PNG\r\n\x1a\nscripted".to_vec()))
    }

    fn restart_app(&self) -> Result<()> {
        self.record(Input::Restart);
        Ok(())
    }
}

/// Detector that replays queued responses, then returns nothing.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    responses: RefCell<VecDeque<Result<Vec<Detection>, String>>>,
    calls: Cell<usize>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, detections: Vec<Detection>) {
        self.responses.borrow_mut().push_back(Ok(detections));
    }

    pub fn push_failure(&self, message: &str) {
        self.responses
            .borrow_mut()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, _model: &str, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.set(self.calls.get() + 1);
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Clock whose `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    slept: Cell<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self {
            now: Cell::new(start),
            slept: Cell::new(Duration::ZERO),
        }
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }

    /// Move time forward without counting it as sleep.
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.slept.set(self.slept.get() + duration);
    }
}

/// In-memory [`StateStore`] that counts saves.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RefCell<BTreeMap<String, InstanceState>>,
    saves: Cell<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: InstanceState) -> Self {
        let store = Self::default();
        store.states.borrow_mut().insert(state.id.clone(), state);
        store
    }

    pub fn saves(&self) -> usize {
        self.saves.get()
    }

    pub fn get(&self, id: &str) -> Option<InstanceState> {
        self.states.borrow().get(id).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: &str) -> Result<Option<InstanceState>> {
        Ok(self.get(id))
    }

    fn save(&self, id: &str, state: &InstanceState) -> Result<()> {
        self.states.borrow_mut().insert(id.to_string(), state.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

/// Scratch state directory backing a real [`JsonStateStore`].
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct TempStateDir {
    _dir: TempDir,
    store: JsonStateStore,
}

impl TempStateDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp state dir")?;
        let store = JsonStateStore::new(dir.path().join("state"));
        Ok(Self { _dir: dir, store })
    }

    pub fn store(&self) -> &JsonStateStore {
        &self.store
    }
}
