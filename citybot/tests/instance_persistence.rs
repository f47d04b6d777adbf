//! Instance loop against the JSON state store: resume semantics across a
//! process restart and the records left on disk.

use citybot::control::{PauseControl, StatusBoard};
use citybot::core::build_order::default_build_order;
use citybot::core::detection::Point;
use citybot::core::state::InstanceState;
use citybot::instance::{InstanceLoop, InstanceSettings, LoopExit, Runtime};
use citybot::io::clock::Clock;
use citybot::io::state_store::StateStore;
use citybot::tasks::navigation::HOME_BUTTON;
use citybot::test_support::{ManualClock, ScriptedDetector, ScriptedDevice, TempStateDir, det};

/// Verifies a restarted process retries the pending head task immediately:
/// its persisted retry cooldown is cleared on load, the new attempt is booked,
/// and the device binding follows the new configuration.
#[test]
fn resumed_instance_retries_pending_task_and_persists_it() {
    let temp = TempStateDir::new().expect("temp state dir");
    let store = temp.store();
    let clock = ManualClock::new();

    let mut saved = InstanceState::new("main", "old-serial");
    saved.bootstrap.record_step_a();
    saved.bootstrap.record_final_step();
    saved.startup_tasks_completed = true;
    saved.build_order.upcoming_tasks = default_build_order();
    saved.build_order.record_attempt(0, false, clock.now());
    store.save("main", &saved).expect("seed state");

    let device = ScriptedDevice::new();
    let detector = ScriptedDetector::new();
    detector.push(vec![
        det("in_city", 300.0, 20.0, 0.95),
        det("builders_hut_idle", 80.0, 300.0, 0.9),
        det("cityhall", 240.0, 200.0, 0.9),
    ]);
    let control = PauseControl::new();
    let board = StatusBoard::new();
    let runtime = Runtime {
        device: &device,
        detector: &detector,
        clock: &clock,
        store,
        control: &control,
        board: &board,
    };

    let mut instance = InstanceLoop::load(runtime, InstanceSettings::default(), "main", "new-serial")
        .expect("load instance");
    assert_eq!(instance.run(Some(1)), LoopExit::MaxCycles);

    // City hall tapped, no upgrade button came up, view reset.
    assert_eq!(
        device.taps(),
        vec![Point::new(240, 200), HOME_BUTTON, HOME_BUTTON]
    );

    let on_disk = store.load("main").expect("load").expect("record present");
    assert_eq!(on_disk.device_id, "new-serial");
    let head = &on_disk.build_order.upcoming_tasks[0];
    assert_eq!(head.attempts, 2);
    assert!(!head.completed);
    assert_eq!(on_disk, *instance.state());
    assert!(store.path_for("main").exists());
    assert_eq!(board.get("main").expect("published").build_cursor, Some(0));
}
