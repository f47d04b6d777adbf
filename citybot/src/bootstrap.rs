//! Tutorial driver: per-cycle classification, state handlers, stuck
//! recovery, and the restart-capable supervisor around it.
//!
//! Classification itself lives in [`crate::core::bootstrap`]; this module owns
//! the side effects. The two completion flags are only ever set here, and only
//! cleared by the supervisor's restart path.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::control::PauseControl;
use crate::core::bootstrap::{BootstrapState, classify};
use crate::core::classes::tutorial;
use crate::core::detection::{Detection, Detections, Point};
use crate::core::state::{BootstrapProgress, InstanceState};
use crate::io::state_store::StateStore;
use crate::session::Session;

/// Fewer visible option cards than this and the picker waits for a better frame.
pub const MIN_OPTIONS_TO_ACT: usize = 6;
/// The preferred card is trusted at a lower confidence than other controls.
pub const PREFERRED_OPTION_CONFIDENCE: f64 = 0.5;
pub const MAX_SCROLL_ATTEMPTS: u32 = 5;
/// Step-A is acknowledged by tapping just below the notification box.
pub const STEP_A_TAP_OFFSET: f64 = 20.0;
/// Random unstick taps land in `[200, 400)` on both axes.
pub const UNSTICK_RANGE: std::ops::Range<i32> = 200..400;
pub const DISMISS_POINT: Point = Point::new(240, 400);
/// Full driver runs per process start.
pub const MAX_RUNS: u32 = 3;

const SWIPE_DURATION: Duration = Duration::from_millis(300);
const ACTION_SETTLE: Duration = Duration::from_secs(1);

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    /// Lower-case option label the picker should choose.
    pub preferred_option: String,
    pub timeout: Duration,
    /// Completion flags are re-checked every this many cycles.
    pub completion_check_every: u64,
    pub stuck_threshold: u32,
    pub idle_threshold: u32,
    pub idle_sleep: Duration,
    pub recovery_sleep: Duration,
    /// Wait after an application restart.
    pub restart_settle: Duration,
    /// Wait between failed runs that do not restart.
    pub retry_pause: Duration,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            preferred_option: "china".to_string(),
            timeout: Duration::from_secs(10 * 60),
            completion_check_every: 50,
            stuck_threshold: 20,
            idle_threshold: 30,
            idle_sleep: Duration::from_millis(500),
            recovery_sleep: Duration::from_secs(1),
            restart_settle: Duration::from_secs(15),
            retry_pause: Duration::from_secs(5),
        }
    }
}

impl BootstrapSettings {
    pub fn with_preferred_option(mut self, option: &str) -> Self {
        self.preferred_option = option.to_lowercase();
        self
    }
}

/// What one driver cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    /// Both completion steps are recorded.
    Completed,
    /// Capture or detection failed; nothing was classified.
    PerceptionFailed,
    /// Same state for too long; a random tap was injected.
    Unstuck(Point),
    /// No handler succeeded for too long; the dismissal tap was sent.
    Dismissed,
    Acted(BootstrapState),
    Idle(BootstrapState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Completed,
    TimedOut,
    /// Shutdown was requested mid-run.
    Interrupted,
    /// The instance was paused; the run is not counted as a failure.
    Paused,
}

#[derive(Debug, Clone, Copy)]
struct Counters {
    cycles: u64,
    last_state: BootstrapState,
    same_state: u32,
    idle: u32,
    scroll_attempts: u32,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            cycles: 0,
            last_state: BootstrapState::Unknown,
            same_state: 0,
            idle: 0,
            scroll_attempts: 0,
        }
    }
}

pub struct BootstrapMachine<'a> {
    session: Session<'a>,
    settings: BootstrapSettings,
    control: Option<&'a PauseControl>,
    rng: StdRng,
    counters: Counters,
}

impl<'a> BootstrapMachine<'a> {
    pub fn new(session: Session<'a>, settings: BootstrapSettings) -> Self {
        Self {
            session,
            settings,
            control: None,
            rng: StdRng::from_entropy(),
            counters: Counters::default(),
        }
    }

    /// Deterministic unstick taps.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_control(mut self, control: &'a PauseControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Consecutive cycles classified into the same state.
    pub fn stuck_count(&self) -> u32 {
        self.counters.same_state
    }

    /// Consecutive cycles in which no handler succeeded.
    pub fn idle_count(&self) -> u32 {
        self.counters.idle
    }

    pub fn scroll_attempts(&self) -> u32 {
        self.counters.scroll_attempts
    }

    /// One perception, classification and action cycle.
    pub fn cycle(&mut self, state: &mut InstanceState) -> CycleResult {
        self.counters.cycles += 1;
        if self.counters.cycles % self.settings.completion_check_every.max(1) == 0
            && state.bootstrap.sync_completion()
        {
            info!(cycle = self.counters.cycles, "bootstrap completion confirmed by periodic check");
            return CycleResult::Completed;
        }

        let detections = match self.session.observe() {
            Ok(d) => d,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "bootstrap detection pass failed");
                self.session.sleep(self.settings.idle_sleep);
                return CycleResult::PerceptionFailed;
            }
        };

        let classified = classify(&detections, &state.bootstrap);
        if classified == self.counters.last_state {
            self.counters.same_state += 1;
        } else {
            self.counters.same_state = 0;
            self.counters.last_state = classified;
        }

        if self.counters.same_state > self.settings.stuck_threshold {
            let point = Point::new(
                self.rng.gen_range(UNSTICK_RANGE),
                self.rng.gen_range(UNSTICK_RANGE),
            );
            warn!(
                state = classified.as_str(),
                cycles = self.counters.same_state,
                x = point.x,
                y = point.y,
                "bootstrap stuck, injecting random tap"
            );
            self.session.tap(point, "unstick");
            self.counters.same_state = 0;
            self.session.sleep(self.settings.recovery_sleep);
            return CycleResult::Unstuck(point);
        }

        if classified != BootstrapState::Unknown {
            debug!(state = classified.as_str(), detections = detections.len(), "bootstrap state");
        }
        let acted = self.handle(classified, &detections, &mut state.bootstrap);

        let mut result = if acted {
            CycleResult::Acted(classified)
        } else {
            CycleResult::Idle(classified)
        };
        if acted {
            self.counters.idle = 0;
        } else {
            self.counters.idle += 1;
            if self.counters.idle > self.settings.idle_threshold {
                if state.bootstrap.sync_completion() {
                    return CycleResult::Completed;
                }
                info!(cycles = self.counters.idle, "no bootstrap action for a while, dismissing");
                self.session.tap(DISMISS_POINT, "dismiss");
                self.counters.idle = 0;
                self.session.sleep(self.settings.recovery_sleep);
                result = CycleResult::Dismissed;
            } else {
                self.session.sleep(self.settings.idle_sleep);
            }
        }

        if state.bootstrap.sync_completion() {
            info!("bootstrap completion sequence finished");
            return CycleResult::Completed;
        }
        result
    }

    /// Drive cycles until completion, timeout, shutdown, or a pause.
    pub fn run(&mut self, state: &mut InstanceState) -> BootstrapOutcome {
        self.counters = Counters::default();
        let timeout = chrono::TimeDelta::from_std(self.settings.timeout)
            .unwrap_or(chrono::TimeDelta::MAX);
        let deadline = self.session.now() + timeout;
        info!(
            preferred = %self.settings.preferred_option,
            timeout_secs = self.settings.timeout.as_secs(),
            "starting bootstrap run"
        );

        while self.session.now() < deadline {
            if let Some(control) = self.control {
                if control.is_shutdown() {
                    return BootstrapOutcome::Interrupted;
                }
                if control.is_paused() {
                    info!(cycles = self.counters.cycles, "bootstrap run paused");
                    return BootstrapOutcome::Paused;
                }
            }
            if self.cycle(state) == CycleResult::Completed {
                return BootstrapOutcome::Completed;
            }
        }
        warn!(cycles = self.counters.cycles, "bootstrap run timed out");
        BootstrapOutcome::TimedOut
    }

    /// Up to [`MAX_RUNS`] runs; the application is restarted before the last one.
    ///
    /// Completion raises the city hall to level 2. State is saved after every run.
    /// A pause ends supervision without a restart; the caller resumes it later.
    pub fn supervise(&mut self, state: &mut InstanceState, store: &dyn StateStore) -> BootstrapOutcome {
        let mut outcome = BootstrapOutcome::TimedOut;
        for run in 1..=MAX_RUNS {
            if state.bootstrap.sync_completion() {
                outcome = BootstrapOutcome::Completed;
                break;
            }
            info!(run, max = MAX_RUNS, "bootstrap run");
            outcome = self.run(state);
            if outcome != BootstrapOutcome::TimedOut || run == MAX_RUNS {
                break;
            }
            if self.is_paused() {
                outcome = BootstrapOutcome::Paused;
                break;
            }

            if run == MAX_RUNS - 1 {
                warn!("bootstrap keeps failing, restarting the application");
                if let Err(err) = self.session.device().restart_app() {
                    warn!(err = %format!("{err:#}"), "application restart failed");
                }
                state.bootstrap.clear_steps_for_restart();
                self.session.sleep(self.settings.restart_settle);
            } else {
                self.session.sleep(self.settings.retry_pause);
            }
            save(store, state);
        }

        match outcome {
            BootstrapOutcome::Completed => {
                state.bootstrap.completed = true;
                state.city_hall_level = state.city_hall_level.max(2);
                info!("bootstrap completed");
            }
            BootstrapOutcome::TimedOut => warn!(runs = MAX_RUNS, "bootstrap did not complete"),
            BootstrapOutcome::Interrupted => info!("bootstrap interrupted"),
            BootstrapOutcome::Paused => info!("bootstrap paused"),
        }
        save(store, state);
        outcome
    }

    fn is_paused(&self) -> bool {
        self.control.is_some_and(PauseControl::is_paused)
    }

    fn handle(
        &mut self,
        classified: BootstrapState,
        detections: &Detections,
        progress: &mut BootstrapProgress,
    ) -> bool {
        match classified {
            BootstrapState::StepAComplete => {
                let Some(note) = detections.find(tutorial::STEP_A_COMPLETE) else {
                    return false;
                };
                let point = Point::new(note.x as i32, (note.bottom() + STEP_A_TAP_OFFSET) as i32);
                if !self.session.tap(point, tutorial::STEP_A_COMPLETE) {
                    return false;
                }
                progress.record_step_a();
                info!("step A acknowledged");
                self.session.sleep(ACTION_SETTLE);
                true
            }
            BootstrapState::FinalStep => {
                let Some(target) = detections.best(tutorial::TARGET) else {
                    return false;
                };
                if !self.session.tap_detection(target) {
                    return false;
                }
                progress.record_final_step();
                info!("final step clicked");
                self.session.sleep(ACTION_SETTLE);
                true
            }
            BootstrapState::OptionSelect => self.select_option(detections),
            BootstrapState::SkipButton => self.tap_first(detections, tutorial::SKIP_BUTTON),
            BootstrapState::InfoText => self.tap_first(detections, tutorial::INFO_TEXT),
            BootstrapState::Confirm => self.tap_first(detections, tutorial::CONFIRM),
            BootstrapState::ArrowAndTarget => self.tap_first(detections, tutorial::TARGET),
            BootstrapState::ArrowOnly => self.tap_first(detections, tutorial::ARROW),
            BootstrapState::Unknown => false,
        }
    }

    fn tap_first(&self, detections: &Detections, class: &str) -> bool {
        detections
            .find(class)
            .is_some_and(|det| self.session.tap_detection(det))
    }

    /// Horizontal option picker: confirm, wait, pick, or scroll.
    fn select_option(&mut self, detections: &Detections) -> bool {
        let preferred = self.settings.preferred_option.to_lowercase();
        let selected = tutorial::selected(&preferred);
        if detections
            .confident()
            .any(|d| d.class.to_lowercase() == selected)
        {
            debug!(option = %preferred, "preferred option already selected");
            let Some(confirm) = detections.find(tutorial::CONFIRM) else {
                return false;
            };
            if !self.session.tap_detection(confirm) {
                return false;
            }
            self.session.sleep(ACTION_SETTLE);
            return true;
        }

        let options: Vec<&Detection> = detections
            .iter()
            .filter(|d| tutorial::OPTIONS.contains(&d.class.as_str()))
            .collect();
        if options.len() < MIN_OPTIONS_TO_ACT {
            debug!(visible = options.len(), "waiting for more option cards");
            return false;
        }

        if let Some(card) = options.iter().find(|d| {
            d.class.to_lowercase() == preferred && d.confidence > PREFERRED_OPTION_CONFIDENCE
        }) {
            if !self.session.tap_detection(card) {
                return false;
            }
            info!(option = %preferred, "preferred option picked");
            self.session.sleep(ACTION_SETTLE);
            self.counters.scroll_attempts = 0;
            return true;
        }

        if self.counters.scroll_attempts >= MAX_SCROLL_ATTEMPTS {
            debug!(attempts = self.counters.scroll_attempts, "scroll budget spent, rescanning");
            self.counters.scroll_attempts = 0;
            self.session.sleep(ACTION_SETTLE);
            return false;
        }

        let rightmost = options.iter().max_by(|a, b| a.x.total_cmp(&b.x));
        let leftmost = options.iter().min_by(|a, b| a.x.total_cmp(&b.x));
        let (Some(from), Some(to)) = (rightmost, leftmost) else {
            return false;
        };
        if !self.session.swipe(from.center(), to.center(), SWIPE_DURATION) {
            return false;
        }
        self.counters.scroll_attempts += 1;
        debug!(attempt = self.counters.scroll_attempts, "scrolled option picker");
        self.session.sleep(ACTION_SETTLE);
        true
    }
}

fn save(store: &dyn StateStore, state: &InstanceState) {
    if let Err(err) = store.save(&state.id, state) {
        warn!(err = %format!("{err:#}"), "save after bootstrap run failed");
    }
}
