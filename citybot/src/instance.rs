//! Instance Loop: bootstrap, one-time startup tasks, then the gameplay cycle.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, info_span, warn};

use crate::bootstrap::{BootstrapMachine, BootstrapOutcome, BootstrapSettings};
use crate::control::{PauseControl, StatusBoard, StatusSnapshot};
use crate::core::classes;
use crate::core::detection::classify_view;
use crate::core::state::InstanceState;
use crate::io::clock::Clock;
use crate::io::config::{BotConfig, InstanceConfig, StartupTask};
use crate::io::detector::{Detector, Perception};
use crate::io::device::Device;
use crate::io::state_store::{StateStore, load_or_create};
use crate::scheduler::{CycleOutcome, Scheduler};
use crate::session::Session;
use crate::tasks::navigation::leave_build_menu;
use crate::tasks::startup::run_startup_tasks;
use crate::tasks::{TaskContext, TaskSettings, default_tasks};

const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Per-instance knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub refresh_interval: Duration,
    pub tutorial_model: String,
    pub gameplay_model: String,
    pub startup_tasks: Vec<StartupTask>,
    pub bootstrap: BootstrapSettings,
    pub tasks: TaskSettings,
}

impl InstanceSettings {
    pub fn from_config(config: &BotConfig, instance: &InstanceConfig) -> Self {
        Self {
            refresh_interval: config.global.refresh_interval(),
            tutorial_model: config.vision.tutorial_model.clone(),
            gameplay_model: config.vision.gameplay_model.clone(),
            startup_tasks: config.gameplay.startup_tasks.clone(),
            bootstrap: BootstrapSettings::default()
                .with_preferred_option(&instance.preferred_civilization),
            tasks: TaskSettings {
                build_cooldown: Duration::from_secs(config.gameplay.build_cooldown_secs),
                claim_quests: instance.claim_quests,
                claim_only_main_quest: instance.claim_only_main_quest,
            },
        }
    }
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self::from_config(&BotConfig::default(), &InstanceConfig::default())
    }
}

/// What one gameplay iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Startup tasks still running; no detection pass was made.
    StartupPending,
    PerceptionFailed,
    /// A stray build menu was closed; the iteration ended early.
    LeftBuildMenu,
    Scheduled(CycleOutcome),
}

/// Why [`InstanceLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    MaxCycles,
}

/// Collaborators shared by every instance of one process.
#[derive(Clone, Copy)]
pub struct Runtime<'a> {
    pub device: &'a dyn Device,
    pub detector: &'a dyn Detector,
    pub clock: &'a dyn Clock,
    pub store: &'a dyn StateStore,
    pub control: &'a PauseControl,
    pub board: &'a StatusBoard,
}

/// Owns one instance's state; the only writer of its durable record.
pub struct InstanceLoop<'a> {
    runtime: Runtime<'a>,
    settings: InstanceSettings,
    scheduler: Scheduler,
    state: InstanceState,
    iteration: u64,
    bootstrap_seed: Option<u64>,
}

impl<'a> InstanceLoop<'a> {
    pub fn new(runtime: Runtime<'a>, settings: InstanceSettings, state: InstanceState) -> Self {
        let scheduler = Scheduler::new(default_tasks(&settings.tasks));
        Self {
            runtime,
            settings,
            scheduler,
            state,
            iteration: 0,
            bootstrap_seed: None,
        }
    }

    /// Load the persisted record for `id`, or start a fresh one.
    pub fn load(
        runtime: Runtime<'a>,
        settings: InstanceSettings,
        id: &str,
        device_id: &str,
    ) -> Result<Self> {
        let state = load_or_create(runtime.store, id, device_id)?;
        Ok(Self::new(runtime, settings, state))
    }

    /// Seed the bootstrap driver's unstick taps.
    pub fn with_bootstrap_seed(mut self, seed: u64) -> Self {
        self.bootstrap_seed = Some(seed);
        self
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Run until shutdown, or until `max_cycles` gameplay iterations.
    pub fn run(&mut self, max_cycles: Option<u64>) -> LoopExit {
        let span = info_span!("instance", id = %self.state.id);
        let _guard = span.enter();
        info!(device = %self.state.device_id, "starting instance loop");

        let control = self.runtime.control;
        let clock = self.runtime.clock;
        while !self.state.bootstrap.completed {
            match self.run_bootstrap() {
                BootstrapOutcome::Interrupted => {
                    self.save();
                    return LoopExit::Shutdown;
                }
                BootstrapOutcome::Paused => {
                    while control.is_paused() && !control.is_shutdown() {
                        clock.sleep(PAUSE_POLL);
                    }
                }
                BootstrapOutcome::Completed | BootstrapOutcome::TimedOut => break,
            }
        }
        self.publish();

        let exit = loop {
            if control.is_shutdown() {
                break LoopExit::Shutdown;
            }
            if max_cycles.is_some_and(|max| self.iteration >= max) {
                break LoopExit::MaxCycles;
            }
            if control.is_paused() {
                clock.sleep(PAUSE_POLL);
                continue;
            }

            self.iteration += 1;
            let outcome = self.iterate();
            debug!(iteration = self.iteration, outcome = ?outcome, "iteration finished");
            self.save();
            self.publish();

            if control.is_shutdown() {
                break LoopExit::Shutdown;
            }
            if control.is_paused() {
                info!(iteration = self.iteration, "automation paused");
            } else {
                clock.sleep(self.settings.refresh_interval);
            }
        };

        self.save();
        info!(iterations = self.iteration, exit = ?exit, "instance loop stopped");
        exit
    }

    /// Bootstrap supervisor over the tutorial model.
    pub fn run_bootstrap(&mut self) -> BootstrapOutcome {
        let rt = self.runtime;
        let perception = Perception::new(rt.device, rt.detector, &self.settings.tutorial_model);
        let session = Session::new(rt.device, perception, rt.clock);
        let mut machine = BootstrapMachine::new(session, self.settings.bootstrap.clone())
            .with_control(rt.control);
        if let Some(seed) = self.bootstrap_seed {
            machine = machine.with_seed(seed);
        }
        let outcome = machine.supervise(&mut self.state, rt.store);
        if outcome == BootstrapOutcome::TimedOut {
            warn!("continuing without a completed bootstrap");
        }
        outcome
    }

    /// One gameplay iteration.
    pub fn iterate(&mut self) -> IterationOutcome {
        let rt = self.runtime;
        let perception = Perception::new(rt.device, rt.detector, &self.settings.gameplay_model);
        let session = Session::new(rt.device, perception, rt.clock);

        if !self.state.startup_tasks_completed {
            if !run_startup_tasks(&self.settings.startup_tasks, &session, &mut self.state) {
                return IterationOutcome::StartupPending;
            }
            info!("startup tasks completed");
            self.state.startup_tasks_completed = true;
            self.save();
        }

        let detections = match session.observe() {
            Ok(d) => d,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "detection pass failed, skipping iteration");
                return IterationOutcome::PerceptionFailed;
            }
        };

        if detections.has(classes::IN_BUILD) {
            info!("stray build menu open, backing out");
            leave_build_menu(&session);
            return IterationOutcome::LeftBuildMenu;
        }

        let view = classify_view(&detections);
        debug!(%view, detections = detections.len(), found = %detections.summary(), "perceived");
        let id = self.state.id.clone();
        let ctx = TaskContext {
            instance_id: &id,
            view,
            detections: &detections,
            session,
        };
        IterationOutcome::Scheduled(self.scheduler.run_cycle(&ctx, &mut self.state, rt.store))
    }

    fn save(&self) {
        if let Err(err) = self.runtime.store.save(&self.state.id, &self.state) {
            warn!(err = %format!("{err:#}"), "save instance state failed");
        }
    }

    fn publish(&self) {
        let snapshot = StatusSnapshot::from_state(&self.state, self.iteration)
            .with_last_executed(self.scheduler.last_executed());
        self.runtime.board.publish(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::Point;
    use crate::tasks::TaskId;
    use crate::test_support::{
        Input, ManualClock, MemoryStateStore, ScriptedDetector, ScriptedDevice, det,
    };

    struct Fixture {
        device: ScriptedDevice,
        detector: ScriptedDetector,
        clock: ManualClock,
        store: MemoryStateStore,
        control: PauseControl,
        board: StatusBoard,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                device: ScriptedDevice::new(),
                detector: ScriptedDetector::new(),
                clock: ManualClock::new(),
                store: MemoryStateStore::new(),
                control: PauseControl::new(),
                board: StatusBoard::new(),
            }
        }

        fn runtime(&self) -> Runtime<'_> {
            Runtime {
                device: &self.device,
                detector: &self.detector,
                clock: &self.clock,
                store: &self.store,
                control: &self.control,
                board: &self.board,
            }
        }
    }

    fn ready_state() -> InstanceState {
        let mut state = InstanceState::new("main", "dev");
        state.bootstrap.record_step_a();
        state.bootstrap.record_final_step();
        state.startup_tasks_completed = true;
        state
    }

    #[test]
    fn iteration_runs_one_scheduled_task() {
        let fx = Fixture::new();
        fx.detector.push(vec![
            det("in_city", 300.0, 20.0, 0.9),
            det("main_quest_claimable", 30.0, 200.0, 0.9),
        ]);
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), ready_state());

        assert_eq!(
            instance.iterate(),
            IterationOutcome::Scheduled(CycleOutcome::Executed(TaskId::CollectQuests))
        );
        assert_eq!(fx.device.taps(), vec![Point::new(30, 200)]);
        assert_eq!(fx.store.saves(), 1);
    }

    #[test]
    fn build_menu_is_closed_before_scheduling() {
        let fx = Fixture::new();
        fx.detector.push(vec![
            det("in_build", 300.0, 20.0, 0.9),
            det("main_quest_claimable", 30.0, 200.0, 0.9),
        ]);
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), ready_state());

        assert_eq!(instance.iterate(), IterationOutcome::LeftBuildMenu);
        assert_eq!(fx.device.inputs(), vec![Input::Key(4), Input::Key(4)]);
    }

    #[test]
    fn perception_failure_skips_iteration() {
        let fx = Fixture::new();
        fx.detector.push_failure("provider down");
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), ready_state());

        assert_eq!(instance.iterate(), IterationOutcome::PerceptionFailed);
        assert!(fx.device.inputs().is_empty());
        assert_eq!(fx.store.saves(), 0);
    }

    #[test]
    fn startup_tasks_gate_gameplay() {
        let fx = Fixture::new();
        let mut state = ready_state();
        state.startup_tasks_completed = false;
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), state);

        assert_eq!(instance.iterate(), IterationOutcome::StartupPending);
        assert_eq!(instance.state().tree_clearing.next_index, 1);
        assert_eq!(fx.detector.calls(), 0);
    }

    #[test]
    fn run_stops_after_max_cycles_and_publishes() {
        let fx = Fixture::new();
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), ready_state());

        assert_eq!(instance.run(Some(3)), LoopExit::MaxCycles);
        assert_eq!(instance.iteration(), 3);
        assert_eq!(fx.detector.calls(), 3);
        let snapshot = fx.board.get("main").expect("snapshot published");
        assert_eq!(snapshot.iteration, 3);
        assert!(snapshot.bootstrap_completed);
        // One save per iteration plus the final one.
        assert_eq!(fx.store.saves(), 4);
    }

    #[test]
    fn bootstrap_resumes_after_a_timed_pause() {
        let fx = Fixture::new();
        fx.detector.push(vec![det("upgrade_complete", 300.0, 100.0, 0.9)]);
        fx.detector.push(vec![
            det("click_arrow", 100.0, 500.0, 0.9),
            det("click_target", 420.0, 260.0, 0.95),
        ]);
        fx.control.pause_for(Duration::from_millis(20));
        let mut state = ready_state();
        state.bootstrap = Default::default();
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), state);

        assert_eq!(instance.run(Some(0)), LoopExit::MaxCycles);
        assert!(instance.state().bootstrap.completed);
        assert_eq!(fx.device.restarts(), 0);
        assert_eq!(fx.device.taps(), vec![Point::new(300, 140), Point::new(420, 260)]);
    }

    #[test]
    fn shutdown_stops_before_the_first_iteration() {
        let fx = Fixture::new();
        fx.control.request_shutdown();
        let mut instance = InstanceLoop::new(fx.runtime(), InstanceSettings::default(), ready_state());

        assert_eq!(instance.run(None), LoopExit::Shutdown);
        assert_eq!(instance.iteration(), 0);
        assert_eq!(fx.detector.calls(), 0);
    }
}
