//! Per-instance task scheduler.
//!
//! One pass per perception cycle: walk the priority-ordered task list and run
//! the first eligible task. At most one handler runs per pass.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::classes;
use crate::core::cooldown;
use crate::core::detection::View;
use crate::core::state::InstanceState;
use crate::io::state_store::StateStore;
use crate::tasks::{ScheduledTask, TaskContext, TaskId};

const RETURN_HOME_SETTLE: Duration = Duration::from_secs(1);

/// Result of one scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A handler reported success.
    Executed(TaskId),
    /// Field view with nothing to do; the home toggle was tapped.
    ReturnedHome,
    /// No eligible task made progress.
    Idle,
}

#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    /// Outcome of the most recent build attempt. Memory only.
    last_build_succeeded: bool,
}

impl Scheduler {
    /// Tasks are ordered by priority, highest first; equal priorities keep
    /// their given order.
    pub fn new(mut tasks: Vec<ScheduledTask>) -> Self {
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            tasks,
            last_build_succeeded: false,
        }
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn last_build_succeeded(&self) -> bool {
        self.last_build_succeeded
    }

    /// `(task, last executed)` pairs in priority order.
    pub fn last_executed(&self) -> Vec<(TaskId, Option<DateTime<Utc>>)> {
        self.tasks.iter().map(|t| (t.id, t.last_executed)).collect()
    }

    /// Run at most one task against `ctx.detections`.
    ///
    /// On success the task's `last_executed` is stamped and `state` is
    /// persisted before returning.
    pub fn run_cycle(
        &mut self,
        ctx: &TaskContext<'_>,
        state: &mut InstanceState,
        store: &dyn StateStore,
    ) -> CycleOutcome {
        let on_field = ctx.view == View::Field;
        let now = ctx.session.now();

        for task in &mut self.tasks {
            if on_field && !task.id.is_field_task() {
                continue;
            }
            if let Some(left) = cooldown::remaining(task.last_executed, task.cooldown, now) {
                let bypass = task.id == TaskId::BuildOrder
                    && self.last_build_succeeded
                    && ctx.detections.has(classes::BUILDER_IDLE);
                if !bypass {
                    debug!(task = %task.id, remaining_ms = left.as_millis() as u64, "task cooling down");
                    continue;
                }
                debug!(task = %task.id, "idle builder after a successful build, bypassing cooldown");
            }
            if !task.precondition.is_met(ctx.detections) {
                continue;
            }

            debug!(task = %task.id, priority = task.priority, "running task");
            let executed = task.handler.run(ctx, state);
            if task.id == TaskId::BuildOrder {
                self.last_build_succeeded = executed;
            }
            if executed {
                task.last_executed = Some(ctx.session.now());
                info!(task = %task.id, view = %ctx.view, "task executed");
                if let Err(err) = store.save(ctx.instance_id, state) {
                    warn!(task = %task.id, err = %format!("{err:#}"), "save after task failed");
                }
                return CycleOutcome::Executed(task.id);
            }
        }

        if on_field {
            return return_home(ctx);
        }
        CycleOutcome::Idle
    }
}

/// Leave the field through the `on_field` toggle when it is visible.
fn return_home(ctx: &TaskContext<'_>) -> CycleOutcome {
    let Some(toggle) = ctx.detections.find(classes::ON_FIELD) else {
        debug!("in field view without a return toggle");
        return CycleOutcome::Idle;
    };
    info!("no field task ran, returning to city");
    if !ctx.session.tap_detection(toggle) {
        return CycleOutcome::Idle;
    }
    ctx.session.sleep(RETURN_HOME_SETTLE);
    CycleOutcome::ReturnedHome
}
