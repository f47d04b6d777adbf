//! Scheduler selection scenarios: priority order, cooldowns, the build
//! cooldown bypass, and the field-view allow-list.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use citybot::core::detection::{DetectionPrecondition, Detections, Point, View};
use citybot::core::state::InstanceState;
use citybot::io::detector::Perception;
use citybot::scheduler::{CycleOutcome, Scheduler};
use citybot::session::Session;
use citybot::tasks::{ScheduledTask, TaskContext, TaskHandler, TaskId};
use citybot::test_support::{ManualClock, MemoryStateStore, ScriptedDetector, ScriptedDevice, det};

/// Handler that replays scripted results (repeating the last one) and
/// counts its runs.
struct Counting {
    results: Vec<bool>,
    runs: Rc<Cell<u32>>,
}

impl TaskHandler for Counting {
    fn run(&mut self, _ctx: &TaskContext<'_>, _state: &mut InstanceState) -> bool {
        let run = self.runs.get() as usize;
        self.runs.set(self.runs.get() + 1);
        self.results
            .get(run)
            .or(self.results.last())
            .copied()
            .unwrap_or(false)
    }
}

fn task(id: TaskId, priority: i32, cooldown_secs: u64, result: bool) -> (ScheduledTask, Rc<Cell<u32>>) {
    scripted(id, priority, cooldown_secs, vec![result])
}

fn scripted(
    id: TaskId,
    priority: i32,
    cooldown_secs: u64,
    results: Vec<bool>,
) -> (ScheduledTask, Rc<Cell<u32>>) {
    let runs = Rc::new(Cell::new(0));
    let task = ScheduledTask::new(
        id,
        priority,
        Duration::from_secs(cooldown_secs),
        DetectionPrecondition::default(),
        Counting {
            results,
            runs: Rc::clone(&runs),
        },
    );
    (task, runs)
}

struct Harness {
    device: ScriptedDevice,
    detector: ScriptedDetector,
    clock: ManualClock,
    store: MemoryStateStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            device: ScriptedDevice::new(),
            detector: ScriptedDetector::new(),
            clock: ManualClock::new(),
            store: MemoryStateStore::new(),
        }
    }

    fn cycle(
        &self,
        scheduler: &mut Scheduler,
        view: View,
        detections: &Detections,
        state: &mut InstanceState,
    ) -> CycleOutcome {
        let ctx = TaskContext {
            instance_id: "main",
            view,
            detections,
            session: Session::new(
                &self.device,
                Perception::new(&self.device, &self.detector, "gameplay"),
                &self.clock,
            ),
        };
        scheduler.run_cycle(&ctx, state, &self.store)
    }
}

/// Verifies a cooling-down build task yields to quests once the most recent
/// build attempt failed, even with an idle builder in view.
#[test]
fn cooling_build_task_yields_to_quests_after_a_failed_build() {
    let harness = Harness::new();
    let (build, build_runs) = scripted(TaskId::BuildOrder, 95, 15, vec![true, false]);
    let (quests, quest_runs) = task(TaskId::CollectQuests, 90, 0, true);
    let mut scheduler = Scheduler::new(vec![quests, build]);
    let mut state = InstanceState::new("main", "dev");
    let idle = Detections::new(vec![det("builders_hut_idle", 80.0, 300.0, 0.9)]);

    // Build succeeds and starts its cooldown.
    assert_eq!(
        harness.cycle(&mut scheduler, View::City, &idle, &mut state),
        CycleOutcome::Executed(TaskId::BuildOrder)
    );

    // Bypass lets the build run again; it fails and quests pick up.
    harness.clock.advance(Duration::from_secs(2));
    assert_eq!(
        harness.cycle(&mut scheduler, View::City, &idle, &mut state),
        CycleOutcome::Executed(TaskId::CollectQuests)
    );
    assert_eq!(build_runs.get(), 2);
    assert!(!scheduler.last_build_succeeded());

    // Still cooling down and no bypass: the build handler is not invoked.
    harness.clock.advance(Duration::from_secs(2));
    assert_eq!(
        harness.cycle(&mut scheduler, View::City, &idle, &mut state),
        CycleOutcome::Executed(TaskId::CollectQuests)
    );
    assert_eq!(build_runs.get(), 2);
    assert_eq!(quest_runs.get(), 2);
    assert_eq!(harness.store.saves(), 3);
}

/// Verifies the build cooldown is skipped right after a successful build
/// while a builder is idle, and honoured once no builder is idle.
#[test]
fn successful_build_with_idle_builder_bypasses_cooldown() {
    let harness = Harness::new();
    let (build, build_runs) = task(TaskId::BuildOrder, 95, 15, true);
    let (quests, quest_runs) = task(TaskId::CollectQuests, 90, 0, true);
    let mut scheduler = Scheduler::new(vec![build, quests]);
    let mut state = InstanceState::new("main", "dev");
    let idle = Detections::new(vec![det("builders_hut_idle", 80.0, 300.0, 0.9)]);
    let busy = Detections::new(vec![det("builders_hut_busy", 80.0, 300.0, 0.9)]);

    for _ in 0..2 {
        assert_eq!(
            harness.cycle(&mut scheduler, View::City, &idle, &mut state),
            CycleOutcome::Executed(TaskId::BuildOrder)
        );
    }
    assert_eq!(build_runs.get(), 2);
    assert!(scheduler.last_build_succeeded());

    assert_eq!(
        harness.cycle(&mut scheduler, View::City, &busy, &mut state),
        CycleOutcome::Executed(TaskId::CollectQuests)
    );
    assert_eq!(build_runs.get(), 2);
    assert_eq!(quest_runs.get(), 1);
}

/// Verifies only allow-listed tasks run in the field view, and city tasks
/// resume once the view is the city again.
#[test]
fn field_view_runs_only_field_tasks() {
    let harness = Harness::new();
    let (build, build_runs) = task(TaskId::BuildOrder, 95, 0, true);
    let (scouts, scout_runs) = task(TaskId::ManageScouts, 60, 300, true);
    let mut scheduler = Scheduler::new(vec![build, scouts]);
    let mut state = InstanceState::new("main", "dev");
    let field = Detections::new(vec![det("on_field", 40.0, 440.0, 0.9)]);

    assert_eq!(
        harness.cycle(&mut scheduler, View::Field, &field, &mut state),
        CycleOutcome::Executed(TaskId::ManageScouts)
    );
    assert_eq!(build_runs.get(), 0);

    // Scouts cool down: nothing left for the field, so go home.
    assert_eq!(
        harness.cycle(&mut scheduler, View::Field, &field, &mut state),
        CycleOutcome::ReturnedHome
    );
    assert_eq!(harness.device.taps(), vec![Point::new(40, 440)]);
    assert_eq!(scout_runs.get(), 1);

    assert_eq!(
        harness.cycle(&mut scheduler, View::City, &Detections::empty(), &mut state),
        CycleOutcome::Executed(TaskId::BuildOrder)
    );
}
