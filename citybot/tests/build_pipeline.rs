//! Build pipeline scenarios driven through scripted devices and detectors.
//!
//! Each test builds a city snapshot by hand, queues the detection passes the
//! pipeline will request, and checks the taps sent plus the persisted order.

use std::time::Duration;

use citybot::core::detection::{Detection, Detections, Point, View};
use citybot::core::state::{BuildCategory, BuildKind, InstanceState, MultiBuilding};
use citybot::io::detector::Perception;
use citybot::pipeline::BuildPipeline;
use citybot::session::Session;
use citybot::tasks::TaskContext;
use citybot::tasks::navigation::HOME_BUTTON;
use citybot::test_support::{ManualClock, ScriptedDetector, ScriptedDevice, det};

fn city_with(extra: Vec<Detection>) -> Detections {
    let mut all = vec![
        det("in_city", 300.0, 20.0, 0.95),
        det("builders_hut_idle", 80.0, 300.0, 0.9),
    ];
    all.extend(extra);
    Detections::new(all)
}

fn context<'a>(
    detections: &'a Detections,
    device: &'a ScriptedDevice,
    detector: &'a ScriptedDetector,
    clock: &'a ManualClock,
) -> TaskContext<'a> {
    TaskContext {
        instance_id: "main",
        view: View::City,
        detections,
        session: Session::new(device, Perception::new(device, detector, "gameplay"), clock),
    }
}

fn assert_counts_consistent(state: &InstanceState) {
    let order = &state.build_order;
    assert_eq!(
        order.completed_tasks.len() + order.pending_count(),
        order.upcoming_tasks.len()
    );
}

/// Verifies the first run generates the default order and only ever touches
/// its head task (upgrade city hall), even though the city hall is visible
/// and later tasks might also be actionable.
#[test]
fn first_run_generates_order_and_attempts_only_the_head() {
    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    detector.push(vec![det("upgrade_button", 150.0, 380.0, 0.9)]);
    detector.push(vec![det("upgrade_available_button", 320.0, 420.0, 0.9)]);
    let clock = ManualClock::new();
    let detections = city_with(vec![
        det("cityhall", 240.0, 200.0, 0.9),
        det("build_available", 40.0, 400.0, 0.9),
        det("barracks", 400.0, 260.0, 0.9),
    ]);
    let ctx = context(&detections, &device, &detector, &clock);
    let mut state = InstanceState::new("main", "dev");

    assert!(BuildPipeline::default().process(&ctx, &mut state));

    let order = &state.build_order;
    assert_eq!(order.upcoming_tasks.len(), 53);
    assert!(order.upcoming_tasks[0].completed);
    assert_eq!(order.upcoming_tasks[0].attempts, 1);
    assert!(order.upcoming_tasks[1..].iter().all(|t| t.attempts == 0));
    assert_eq!(order.cursor(), Some(1));
    assert_eq!(device.taps()[0], Point::new(240, 200));
    assert_counts_consistent(&state);
}

/// Verifies that with the head done, the next call builds the archery range
/// through the military tab and leaves the finished task alone.
#[test]
fn second_task_builds_archery_range_in_military_tab() {
    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    detector.push(vec![
        det("build_economic", 100.0, 60.0, 0.9),
        det("build_military", 180.0, 60.0, 0.9),
    ]);
    detector.push(vec![det("build_archery_range", 220.0, 180.0, 0.9)]);
    detector.push(vec![det("accept_build_location", 320.0, 420.0, 0.9)]);
    let clock = ManualClock::new();
    let detections = city_with(vec![det("build_available", 40.0, 400.0, 0.9)]);
    let ctx = context(&detections, &device, &detector, &clock);

    let mut state = InstanceState::new("main", "dev");
    state.build_order.upcoming_tasks = citybot::core::build_order::default_build_order();
    state.build_order.record_attempt(0, true, clock_now(&clock));
    let head_before = state.build_order.upcoming_tasks[0].clone();

    assert!(BuildPipeline::default().process(&ctx, &mut state));

    let order = &state.build_order;
    assert_eq!(order.upcoming_tasks[0], head_before);
    let archery = &order.upcoming_tasks[1];
    assert_eq!(archery.kind, BuildKind::New);
    assert_eq!(archery.category, Some(BuildCategory::Military));
    assert!(archery.completed);
    assert_eq!(archery.attempts, 1);
    assert_eq!(
        &device.taps()[..4],
        &[
            Point::new(40, 400),
            Point::new(180, 60),
            Point::new(220, 180),
            Point::new(320, 420)
        ]
    );
    assert_eq!(order.completed_tasks.len(), 2);
    assert_counts_consistent(&state);
}

/// Verifies a busy-builder dialog is closed through its exit control, the
/// view is reset, and the task stays incomplete with one more attempt.
#[test]
fn busy_builders_dialog_is_dismissed_and_view_reset() {
    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    detector.push(vec![det("upgrade_button", 150.0, 380.0, 0.9)]);
    detector.push(vec![
        det("builders_hut_busy", 300.0, 200.0, 0.9),
        det("exit_dialog_button", 580.0, 40.0, 0.9),
    ]);
    let clock = ManualClock::new();
    let detections = city_with(vec![det("cityhall", 240.0, 200.0, 0.9)]);
    let ctx = context(&detections, &device, &detector, &clock);
    let mut state = InstanceState::new("main", "dev");

    assert!(!BuildPipeline::default().process(&ctx, &mut state));

    assert_eq!(
        device.taps(),
        vec![
            Point::new(240, 200),
            Point::new(150, 380),
            Point::new(580, 40),
            HOME_BUTTON,
            HOME_BUTTON
        ]
    );
    let head = &state.build_order.upcoming_tasks[0];
    assert!(!head.completed);
    assert_eq!(head.attempts, 1);
    assert!(state.build_order.completed_tasks.is_empty());
    assert_counts_consistent(&state);
}

/// Verifies the 30 second retry window: blocked just before, eligible just
/// after.
#[test]
fn failed_task_waits_out_the_retry_cooldown() {
    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    let clock = ManualClock::new();
    let detections = city_with(vec![]);
    let ctx = context(&detections, &device, &detector, &clock);
    let pipeline = BuildPipeline::default();
    let mut state = InstanceState::new("main", "dev");

    // No city hall in sight: fails before any input.
    assert!(!pipeline.process(&ctx, &mut state));
    assert_eq!(state.build_order.upcoming_tasks[0].attempts, 1);

    clock.advance(Duration::from_millis(29_900));
    assert!(!pipeline.process(&ctx, &mut state));
    assert_eq!(state.build_order.upcoming_tasks[0].attempts, 1);

    clock.advance(Duration::from_millis(200));
    assert!(!pipeline.process(&ctx, &mut state));
    assert_eq!(state.build_order.upcoming_tasks[0].attempts, 2);
    assert!(device.inputs().is_empty());
}

/// Verifies stored positions are set once, from the first snapshot that
/// shows each multi-instance building, and survive later snapshots.
#[test]
fn multi_building_positions_are_set_once_across_cycles() {
    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    let clock = ManualClock::new();
    let pipeline = BuildPipeline::default();
    let mut state = InstanceState::new("main", "dev");

    let first = city_with(vec![det("farm", 120.0, 300.0, 0.9)]);
    pipeline.process(&context(&first, &device, &detector, &clock), &mut state);

    clock.advance(Duration::from_secs(60));
    let second = city_with(vec![
        det("farm", 400.0, 80.0, 0.9),
        det("quarry", 200.0, 500.0, 0.9),
    ]);
    pipeline.process(&context(&second, &device, &detector, &clock), &mut state);

    let positions = &state.building_positions;
    assert_eq!(positions.get(MultiBuilding::Farm), Some(Point::new(120, 300)));
    assert_eq!(positions.get(MultiBuilding::Quarry), Some(Point::new(200, 500)));
    assert_eq!(positions.len(), 2);
}

fn clock_now(clock: &ManualClock) -> chrono::DateTime<chrono::Utc> {
    use citybot::io::clock::Clock;
    clock.now()
}
