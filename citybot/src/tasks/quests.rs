//! Quest reward claiming.

use tracing::{debug, info};

use crate::core::classes;
use crate::core::state::InstanceState;
use crate::tasks::{TaskContext, TaskHandler};

/// The claim button of a side quest sits this far below the quest badge.
const SIDE_QUEST_CLAIM_OFFSET: i32 = 78;

#[derive(Debug, Clone, Default)]
pub struct CollectQuests {
    pub only_main: bool,
}

impl TaskHandler for CollectQuests {
    fn run(&mut self, ctx: &TaskContext<'_>, _state: &mut InstanceState) -> bool {
        let mut claimed = false;
        for det in ctx.detections.confident() {
            match det.class.as_str() {
                classes::MAIN_QUEST_CLAIMABLE => {
                    claimed |= ctx.session.tap_detection(det);
                }
                classes::QUESTS_CLAIMABLE if !self.only_main => {
                    let target = det.center().offset(0, SIDE_QUEST_CLAIM_OFFSET);
                    claimed |= ctx.session.tap(target, &det.class);
                }
                _ => {}
            }
        }
        if claimed {
            info!("quest rewards claimed");
        } else {
            debug!("no claimable quests");
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::{Detections, Point, View};
    use crate::io::detector::Perception;
    use crate::session::Session;
    use crate::test_support::{ManualClock, ScriptedDetector, ScriptedDevice, det};

    fn run(handler: &mut CollectQuests, device: &ScriptedDevice, detections: &Detections) -> bool {
        let detector = ScriptedDetector::new();
        let clock = ManualClock::new();
        let ctx = TaskContext {
            instance_id: "main",
            view: View::City,
            detections,
            session: Session::new(device, Perception::new(device, &detector, "m"), &clock),
        };
        handler.run(&ctx, &mut InstanceState::new("main", "dev"))
    }

    #[test]
    fn side_quest_is_tapped_below_badge() {
        let device = ScriptedDevice::new();
        let detections = Detections::new(vec![
            det("main_quest_claimable", 30.0, 200.0, 0.9),
            det("quests_claimable", 30.0, 260.0, 0.9),
        ]);
        assert!(run(&mut CollectQuests::default(), &device, &detections));
        assert_eq!(device.taps(), vec![Point::new(30, 200), Point::new(30, 338)]);
    }

    #[test]
    fn only_main_skips_side_quests() {
        let device = ScriptedDevice::new();
        let detections = Detections::new(vec![det("quests_claimable", 30.0, 260.0, 0.9)]);
        assert!(!run(&mut CollectQuests { only_main: true }, &device, &detections));
        assert!(device.taps().is_empty());
    }

    #[test]
    fn failed_taps_are_not_progress() {
        let device = ScriptedDevice::new();
        device.fail_taps(true);
        let detections = Detections::new(vec![det("main_quest_claimable", 30.0, 200.0, 0.9)]);
        assert!(!run(&mut CollectQuests::default(), &device, &detections));
    }
}
