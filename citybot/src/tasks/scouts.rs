//! Scout dispatch into the fog.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::classes;
use crate::core::detection::{Point, View};
use crate::core::state::InstanceState;
use crate::tasks::TaskContext;
use crate::tasks::navigation::open_map;

/// Neutral corner tap that closes a half-open scout dialog.
const DISMISS: Point = Point::new(10, 10);
const SETTLE: Duration = Duration::from_secs(1);

/// Scheduled `manage_scouts` handler.
///
/// From the city it only opens the map and reports no progress, so the next
/// cycle starts from a fresh field snapshot.
pub fn manage_scouts(ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool {
    if ctx.view == View::City {
        if !open_map(ctx) {
            warn!("could not open the map for scouting");
        }
        return false;
    }

    let Some(camp) = ctx
        .detections
        .find_any(&[classes::SCOUT_CAMP, classes::SCOUT_BUTTON])
    else {
        debug!("scout camp not visible");
        return false;
    };
    if !ctx.session.tap_detection(camp) {
        return false;
    }
    ctx.session.sleep(SETTLE);

    if !tap_on_fresh_pass(ctx, classes::EXPLORE_BUTTON) {
        return false;
    }
    ctx.session.sleep(SETTLE);

    if !tap_on_fresh_pass(ctx, classes::MARCH_BUTTON) {
        return false;
    }

    state.scout.is_moving = true;
    state.scout.last_move_time = Some(ctx.session.now());
    info!("scout sent to explore");
    true
}

fn tap_on_fresh_pass(ctx: &TaskContext<'_>, class: &str) -> bool {
    let detections = match ctx.session.observe() {
        Ok(d) => d,
        Err(err) => {
            warn!(class, err = %format!("{err:#}"), "scout detection pass failed");
            return false;
        }
    };
    match detections.find(class) {
        Some(button) => ctx.session.tap_detection(button),
        None => {
            debug!(class, "button not found, dismissing");
            ctx.session.tap(DISMISS, "dismiss");
            false
        }
    }
}
