//! Free tavern chest collection.

use std::time::Duration;

use tracing::{debug, info};

use crate::core::classes;
use crate::core::detection::{Point, View};
use crate::core::state::InstanceState;
use crate::tasks::TaskContext;

const SILVER_CHEST: Point = Point::new(150, 300);
const GOLD_CHEST: Point = Point::new(450, 300);
const REWARD_DISMISS: Point = Point::new(300, 400);
const CLOSE_PANEL: Point = Point::new(550, 50);
const SETTLE: Duration = Duration::from_secs(1);

/// Scheduled `collect_tavern_chests` handler.
pub fn collect_chests(ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool {
    if ctx.view != View::City {
        return false;
    }
    let Some(tavern) = ctx
        .detections
        .find_any(&[classes::TAVERN_CLICKABLE, classes::TAVERN_UPGRADEABLE_CLICKABLE])
    else {
        debug!("tavern not clickable");
        return false;
    };
    if !ctx.session.tap_detection(tavern) {
        return false;
    }
    ctx.session.sleep(SETTLE);

    let mut claimed = false;
    for (chest, label) in [(SILVER_CHEST, "silver_chest"), (GOLD_CHEST, "gold_chest")] {
        if !ctx.session.tap(chest, label) {
            continue;
        }
        claimed = true;
        ctx.session.sleep(SETTLE);
        ctx.session.tap(REWARD_DISMISS, "reward_dismiss");
        ctx.session.sleep(SETTLE);
    }
    if claimed {
        state.tavern.last_chest_time = Some(ctx.session.now());
    }

    ctx.session.tap(CLOSE_PANEL, "close_tavern");
    info!(claimed, "tavern chest collection finished");
    true
}
