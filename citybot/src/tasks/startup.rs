//! One-time startup tasks run after the tutorial and before scheduled gameplay.
//!
//! Tasks run in configured order; each must report done before the next one
//! is attempted. Progress lives in [`InstanceState`] so a restart resumes
//! where the previous process stopped.

use std::time::Duration;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use crate::core::classes;
use crate::core::detection::{Detection, Detections, Point, View, classify_view};
use crate::core::state::InstanceState;
use crate::io::config::StartupTask;
use crate::session::Session;
use crate::tasks::navigation::{reset_view, tap_home_twice};

/// Tree positions in the starting city, in clearing order.
pub const TREES: [Point; 19] = [
    Point::new(134, 137),
    Point::new(195, 169),
    Point::new(261, 217),
    Point::new(243, 173),
    Point::new(292, 216),
    Point::new(325, 235),
    Point::new(333, 204),
    Point::new(371, 225),
    Point::new(378, 196),
    Point::new(415, 215),
    Point::new(479, 278),
    Point::new(590, 363),
    Point::new(521, 388),
    Point::new(574, 261),
    Point::new(352, 417),
    Point::new(368, 391),
    Point::new(299, 411),
    Point::new(203, 382),
    Point::new(176, 354),
];

/// Harvest button shown after tapping the tree with the same index.
pub const HARVEST_BUTTONS: [Point; 19] = [
    Point::new(158, 256),
    Point::new(218, 256),
    Point::new(286, 256),
    Point::new(268, 257),
    Point::new(319, 269),
    Point::new(356, 292),
    Point::new(364, 249),
    Point::new(399, 275),
    Point::new(406, 244),
    Point::new(441, 269),
    Point::new(504, 324),
    Point::new(582, 415),
    Point::new(548, 429),
    Point::new(600, 314),
    Point::new(375, 467),
    Point::new(393, 439),
    Point::new(327, 462),
    Point::new(228, 426),
    Point::new(203, 406),
];

/// Trees from this index on are only reachable after re-centring the view.
pub const SECOND_AREA_START: usize = 13;

const HOME_PAUSE: Duration = Duration::from_millis(500);
const HOME_SETTLE: Duration = Duration::from_secs(1);
const HARVEST_PAUSE: Duration = Duration::from_millis(500);
const SCREEN_CENTRE: Point = Point::new(320, 240);
/// Fallback buttons are only trusted in the lower part of the screen.
const FALLBACK_MIN_Y: f64 = 350.0;

/// Run the configured startup tasks. Returns `true` once every task is done.
pub fn run_startup_tasks(
    tasks: &[StartupTask],
    session: &Session<'_>,
    state: &mut InstanceState,
) -> bool {
    for task in tasks {
        match task {
            StartupTask::ClearTrees => {
                if state.tree_clearing.completed {
                    continue;
                }
                if clear_trees_step(session, state) {
                    return false;
                }
                if !state.tree_clearing.completed {
                    return false;
                }
            }
            StartupTask::RecruitSecondBuilder => {
                if state.second_builder_added {
                    continue;
                }
                let detections = match session.observe() {
                    Ok(d) => d,
                    Err(err) => {
                        warn!(err = %format!("{err:#}"), "startup detection pass failed");
                        return false;
                    }
                };
                if detections.is_empty() {
                    debug!("no detections for second builder recruitment");
                    return false;
                }
                recruit_second_builder(session, &detections, state);
                return false;
            }
        }
    }
    true
}

/// Advance tree clearing by one step. Returns `true` when a tree was harvested.
///
/// A failed tap still advances the cursor so one unreachable tree cannot
/// stall the sequence.
pub fn clear_trees_step(session: &Session<'_>, state: &mut InstanceState) -> bool {
    let progress = &mut state.tree_clearing;
    if progress.completed {
        return false;
    }

    if progress.next_index == SECOND_AREA_START && !progress.view_reset_done {
        info!("re-centring view for the second group of trees");
        if !tap_home_twice(session, HOME_PAUSE) {
            warn!("view reset before the second group failed, continuing");
        }
        session.sleep(HOME_SETTLE);
        progress.view_reset_done = true;
        return false;
    }

    let Some((&tree, &harvest)) = TREES
        .get(progress.next_index)
        .zip(HARVEST_BUTTONS.get(progress.next_index))
    else {
        info!("all trees processed");
        tap_home_twice(session, HOME_PAUSE);
        session.sleep(HOME_SETTLE);
        progress.completed = true;
        return false;
    };

    let index = progress.next_index;
    progress.next_index += 1;
    if !session.tap(tree, "tree") {
        return false;
    }
    session.sleep(HARVEST_PAUSE);
    if !session.tap(harvest, "harvest_button") {
        return false;
    }
    debug!(tree = index + 1, total = TREES.len(), "tree harvested");
    true
}

/// Hire the second builder from the builder's hut.
///
/// Returns `true` when the hire sequence ran to the end.
pub fn recruit_second_builder(
    session: &Session<'_>,
    detections: &Detections,
    state: &mut InstanceState,
) -> bool {
    if state.second_builder_added {
        return false;
    }
    if classify_view(detections) != View::City {
        debug!("not in city view, cannot recruit second builder");
        return false;
    }
    let Some(hut) = detections.find_any(&[classes::BUILDER_IDLE, classes::BUILDER_HUT]) else {
        debug!("builder's hut not visible");
        return false;
    };
    if !session.tap_detection(hut) {
        return false;
    }
    session.sleep(Duration::from_secs(5));

    if !tap_hire_step(session, classes::BUILDER_HUT_BUTTON) {
        reset_view(session);
        return false;
    }
    session.sleep(Duration::from_secs(3));

    if !tap_hire_step(session, classes::BUILDER_HIRE_BUTTON) {
        reset_view(session);
        return false;
    }
    session.sleep(Duration::from_secs(3));

    let result = match session.observe() {
        Ok(d) => d,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "hire result detection pass failed");
            reset_view(session);
            return false;
        }
    };
    match result.find(classes::EXIT_DIALOG_BUTTON) {
        Some(exit) => session.tap_detection(exit),
        None => session.tap(SCREEN_CENTRE, "screen_centre"),
    };
    session.sleep(Duration::from_secs(1));

    let now = session.now();
    state.second_builder_added = true;
    state.builder.second_builder_expires_at = Some(now + TimeDelta::days(3));
    info!("second builder recruited");
    reset_view(session);
    true
}

/// Tap `class` on a fresh pass, falling back to a generic button low on screen.
fn tap_hire_step(session: &Session<'_>, class: &str) -> bool {
    let detections = match session.observe() {
        Ok(d) => d,
        Err(err) => {
            warn!(class, err = %format!("{err:#}"), "hire detection pass failed");
            return false;
        }
    };
    let button = detections.find(class).or_else(|| fallback_button(&detections));
    match button {
        Some(button) => session.tap_detection(button),
        None => {
            debug!(class, "no hire button found");
            false
        }
    }
}

fn fallback_button(detections: &Detections) -> Option<&Detection> {
    detections.confident().find(|d| {
        (d.class == classes::CONFIRM_BUTTON || d.class == classes::GENERIC_BUTTON)
            && d.y > FALLBACK_MIN_Y
    })
}
