//! Scheduled task handlers and the default task table.

pub mod navigation;
pub mod quests;
pub mod scouts;
pub mod startup;
pub mod tavern;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::classes;
use crate::core::detection::{DetectionPrecondition, Detections, View};
use crate::core::state::InstanceState;
use crate::pipeline::BuildPipeline;
use crate::session::Session;

/// Everything a handler sees for one cycle.
pub struct TaskContext<'a> {
    pub instance_id: &'a str,
    pub view: View,
    /// Snapshot the scheduler evaluated preconditions against.
    pub detections: &'a Detections,
    pub session: Session<'a>,
}

/// Action behind a scheduled task. Returns `true` when it made progress.
pub trait TaskHandler {
    fn run(&mut self, ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool;
}

impl<F> TaskHandler for F
where
    F: FnMut(&TaskContext<'_>, &mut InstanceState) -> bool,
{
    fn run(&mut self, ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool {
        self(ctx, state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    BuildOrder,
    CollectQuests,
    CollectTavernChests,
    ManageScouts,
    FarmBarbarians,
    ChallengeBarbarians,
    ReturnToCity,
}

impl TaskId {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskId::BuildOrder => "process_build_order",
            TaskId::CollectQuests => "collect_quests",
            TaskId::CollectTavernChests => "collect_tavern_chests",
            TaskId::ManageScouts => "manage_scouts",
            TaskId::FarmBarbarians => "farm_barbarians",
            TaskId::ChallengeBarbarians => "challenge_barbarians",
            TaskId::ReturnToCity => "return_to_city",
        }
    }

    /// Tasks allowed to run while the view is the field/map.
    pub fn is_field_task(self) -> bool {
        matches!(
            self,
            TaskId::ManageScouts
                | TaskId::FarmBarbarians
                | TaskId::ChallengeBarbarians
                | TaskId::ReturnToCity
        )
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of a scheduler's priority list.
pub struct ScheduledTask {
    pub id: TaskId,
    /// Higher runs first.
    pub priority: i32,
    pub cooldown: Duration,
    /// Set by the scheduler only, after the handler reports success.
    pub last_executed: Option<DateTime<Utc>>,
    pub precondition: DetectionPrecondition,
    pub handler: Box<dyn TaskHandler>,
}

impl ScheduledTask {
    pub fn new(
        id: TaskId,
        priority: i32,
        cooldown: Duration,
        precondition: DetectionPrecondition,
        handler: impl TaskHandler + 'static,
    ) -> Self {
        Self {
            id,
            priority,
            cooldown,
            last_executed: None,
            precondition,
            handler: Box::new(handler),
        }
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("cooldown", &self.cooldown)
            .field("last_executed", &self.last_executed)
            .finish_non_exhaustive()
    }
}

/// Per-instance switches for the default task table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub build_cooldown: Duration,
    pub claim_quests: bool,
    pub claim_only_main_quest: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            build_cooldown: Duration::from_secs(15),
            claim_quests: true,
            claim_only_main_quest: false,
        }
    }
}

/// Default task table, unsorted. The scheduler orders it by priority.
pub fn default_tasks(settings: &TaskSettings) -> Vec<ScheduledTask> {
    let mut tasks = vec![ScheduledTask::new(
        TaskId::BuildOrder,
        95,
        settings.build_cooldown,
        DetectionPrecondition::default().all_of([classes::IN_CITY]),
        BuildPipeline::default(),
    )];

    if settings.claim_quests {
        tasks.push(ScheduledTask::new(
            TaskId::CollectQuests,
            90,
            Duration::ZERO,
            DetectionPrecondition::default()
                .any_of([classes::MAIN_QUEST_CLAIMABLE, classes::QUESTS_CLAIMABLE]),
            quests::CollectQuests {
                only_main: settings.claim_only_main_quest,
            },
        ));
    }

    tasks.push(ScheduledTask::new(
        TaskId::CollectTavernChests,
        80,
        Duration::from_secs(60 * 60),
        DetectionPrecondition::default()
            .all_of([classes::IN_CITY])
            .any_of([classes::TAVERN_CLICKABLE, classes::TAVERN_UPGRADEABLE_CLICKABLE]),
        tavern::collect_chests,
    ));
    tasks.push(ScheduledTask::new(
        TaskId::ManageScouts,
        60,
        Duration::from_secs(5 * 60),
        DetectionPrecondition::default()
            .any_of([classes::SCOUT_CAMP_IDLE, classes::SCOUT_CAMP_UPGRADEABLE_IDLE]),
        scouts::manage_scouts,
    ));
    tasks.push(ScheduledTask::new(
        TaskId::ReturnToCity,
        10,
        Duration::from_secs(60),
        DetectionPrecondition::default().any_of([classes::RETURN_TO_CITY_BUTTON]),
        navigation::return_to_city,
    ));
    tasks
}
