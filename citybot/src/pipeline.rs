//! Ordered build pipeline.
//!
//! Each invocation advances at most one task: the first incomplete entry of
//! the persisted build order. A blocked or failing head task blocks the whole
//! pipeline until its retry cooldown has passed; later tasks are never tried
//! out of order.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::build_order::default_build_order;
use crate::core::classes;
use crate::core::cooldown;
use crate::core::detection::{Detection, Detections, Point, View};
use crate::core::state::{BuildCategory, BuildKind, BuildTask, BuildingPositions, InstanceState, MultiBuilding};
use crate::tasks::navigation::reset_view;
use crate::tasks::{TaskContext, TaskHandler};

/// Minimum time between two attempts of the same build task.
pub const TASK_RETRY_COOLDOWN: Duration = Duration::from_secs(30);

const MENU_SETTLE: Duration = Duration::from_secs(1);
const DIALOG_SETTLE: Duration = Duration::from_millis(800);

/// Why a build attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// No build-menu button on the city screen.
    NoBuildButton,
    /// The target building is neither stored nor detected.
    BuildingNotFound,
    /// A new-building task without a menu tab.
    MissingCategory,
    CategoryTabMissing(BuildCategory),
    OptionNotFound(String),
    BuildersBusy,
    RequirementsNotMet,
    NoUpgradeButton,
    NoConfirmButton,
    /// A fresh detection pass failed mid-attempt.
    Perception(String),
    InputFailed(&'static str),
}

impl AttemptFailure {
    /// Whether the attempt sent any input before failing.
    ///
    /// Only the two opening lookups fail before the first tap; every other
    /// exit path leaves the UI in an unknown state.
    pub fn touched_ui(&self) -> bool {
        !matches!(
            self,
            AttemptFailure::NoBuildButton | AttemptFailure::BuildingNotFound
        )
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::NoBuildButton => write!(f, "no build button"),
            AttemptFailure::BuildingNotFound => write!(f, "building not found"),
            AttemptFailure::MissingCategory => write!(f, "new-building task has no category"),
            AttemptFailure::CategoryTabMissing(category) => {
                write!(f, "{} tab not found", category.tab_class())
            }
            AttemptFailure::OptionNotFound(class) => write!(f, "menu option {class} not found"),
            AttemptFailure::BuildersBusy => write!(f, "all builders busy"),
            AttemptFailure::RequirementsNotMet => write!(f, "upgrade requirements not met"),
            AttemptFailure::NoUpgradeButton => write!(f, "no upgrade button"),
            AttemptFailure::NoConfirmButton => write!(f, "no confirm button"),
            AttemptFailure::Perception(err) => write!(f, "detection failed: {err}"),
            AttemptFailure::InputFailed(what) => write!(f, "input failed: {what}"),
        }
    }
}

type Attempt = Result<(), AttemptFailure>;

#[derive(Debug, Clone)]
pub struct BuildPipeline {
    retry_cooldown: Duration,
}

impl Default for BuildPipeline {
    fn default() -> Self {
        Self {
            retry_cooldown: TASK_RETRY_COOLDOWN,
        }
    }
}

impl BuildPipeline {
    pub fn with_retry_cooldown(retry_cooldown: Duration) -> Self {
        Self { retry_cooldown }
    }

    /// Advance the build order by at most one task.
    ///
    /// Returns `true` iff a task completed. The caller must take a fresh
    /// snapshot before the next call; tasks are never chained on one snapshot.
    pub fn process(&self, ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool {
        if ctx.view != View::City {
            debug!(view = %ctx.view, "build pipeline needs the city view");
            return false;
        }
        if !ctx.detections.has(classes::BUILDER_IDLE) {
            debug!("no idle builder");
            return false;
        }

        record_positions(ctx.detections, &mut state.building_positions);

        if state.build_order.upcoming_tasks.is_empty() {
            state.build_order.upcoming_tasks = default_build_order();
            info!(
                tasks = state.build_order.upcoming_tasks.len(),
                "generated default build order"
            );
        }

        let Some(index) = state.build_order.cursor() else {
            debug!("build order complete");
            return false;
        };
        let task = state.build_order.upcoming_tasks[index].clone();
        if let Some(left) = cooldown::remaining(task.last_attempt, self.retry_cooldown, ctx.session.now())
        {
            debug!(
                index,
                task = %task.label(),
                remaining_ms = left.as_millis() as u64,
                "build task cooling down"
            );
            return false;
        }

        info!(index, task = %task.label(), attempt = task.attempts + 1, "attempting build task");
        let result = match task.kind {
            BuildKind::New => build_new(ctx, &task, &mut state.building_positions),
            BuildKind::Upgrade => upgrade(ctx, &task, &state.building_positions),
        };

        if result.as_ref().err().is_none_or(AttemptFailure::touched_ui) {
            reset_view(&ctx.session);
        }

        let succeeded = result.is_ok();
        state
            .build_order
            .record_attempt(index, succeeded, ctx.session.now());
        match result {
            Ok(()) => info!(index, task = %task.label(), "build task completed"),
            Err(reason) => warn!(index, task = %task.label(), %reason, "build task failed"),
        }
        succeeded
    }
}

impl TaskHandler for BuildPipeline {
    fn run(&mut self, ctx: &TaskContext<'_>, state: &mut InstanceState) -> bool {
        self.process(ctx, state)
    }
}

/// Remember where the first building of each multi-instance kind was seen.
pub fn record_positions(detections: &Detections, positions: &mut BuildingPositions) {
    for kind in MultiBuilding::ALL {
        if let Some(det) = detections.find(kind.as_str()) {
            if positions.record(kind, det.center()) {
                info!(building = kind.as_str(), x = det.x, y = det.y, "recorded building position");
            }
        }
    }
}

fn build_new(ctx: &TaskContext<'_>, task: &BuildTask, positions: &mut BuildingPositions) -> Attempt {
    let button = ctx
        .detections
        .find_any(&[classes::BUILD_AVAILABLE, classes::BUILD_NEW_BUTTON])
        .ok_or(AttemptFailure::NoBuildButton)?;
    tap(ctx, button, "build menu")?;
    ctx.session.sleep(MENU_SETTLE);

    let category = task.category.ok_or(AttemptFailure::MissingCategory)?;
    let option_class = task
        .detect_classes
        .first()
        .ok_or_else(|| AttemptFailure::OptionNotFound(String::new()))?;

    let menu = observe(ctx)?;
    let tab = menu
        .find(category.tab_class())
        .ok_or(AttemptFailure::CategoryTabMissing(category))?;
    tap(ctx, tab, "category tab")?;
    ctx.session.sleep(MENU_SETTLE);

    let menu = observe(ctx)?;
    let prefixed = format!("build_{option_class}");
    let option = menu
        .find(option_class)
        .or_else(|| menu.find(&prefixed))
        .ok_or_else(|| AttemptFailure::OptionNotFound(option_class.clone()))?;
    tap(ctx, option, "building option")?;
    ctx.session.sleep(MENU_SETTLE);

    // The placement screen reports busy builders under the plain hut label.
    let dialog = observe(ctx)?;
    if dialog
        .find_any(&[classes::BUILDER_HUT, classes::BUILDERS_BUSY])
        .is_some()
    {
        dismiss(ctx, &dialog);
        return Err(AttemptFailure::BuildersBusy);
    }
    let confirm = dialog
        .find_any(&[classes::ACCEPT_BUILD_LOCATION, classes::CONFIRM_BUTTON])
        .ok_or(AttemptFailure::NoConfirmButton)?;
    tap(ctx, confirm, "confirm placement")?;
    ctx.session.sleep(MENU_SETTLE);

    accept_alliance_help(ctx);
    record_new_building(ctx, task, positions);
    Ok(())
}

fn upgrade(ctx: &TaskContext<'_>, task: &BuildTask, positions: &BuildingPositions) -> Attempt {
    let stored = MultiBuilding::from_name(&task.building).and_then(|kind| positions.get(kind));
    let target: Point = match stored {
        Some(point) => {
            debug!(building = %task.building, x = point.x, y = point.y, "using stored position");
            point
        }
        None => task
            .detect_classes
            .iter()
            .find_map(|class| ctx.detections.find(class))
            .map(Detection::center)
            .ok_or(AttemptFailure::BuildingNotFound)?,
    };
    if !ctx.session.tap(target, &task.building) {
        return Err(AttemptFailure::InputFailed("building"));
    }
    ctx.session.sleep(MENU_SETTLE);

    let menu = observe(ctx)?;
    let button = menu
        .find_any(classes::UPGRADE_BUTTONS)
        .ok_or(AttemptFailure::NoUpgradeButton)?;
    tap(ctx, button, "upgrade button")?;
    ctx.session.sleep(DIALOG_SETTLE);

    let dialog = observe(ctx)?;
    if dialog.has(classes::BUILDERS_BUSY) {
        dismiss(ctx, &dialog);
        return Err(AttemptFailure::BuildersBusy);
    }
    if dialog.has(classes::UPGRADE_NOT_AVAILABLE) {
        dismiss(ctx, &dialog);
        return Err(AttemptFailure::RequirementsNotMet);
    }
    let confirm = dialog
        .find_any(&[classes::UPGRADE_CONFIRM, classes::CONFIRM_BUTTON])
        .ok_or(AttemptFailure::NoConfirmButton)?;
    tap(ctx, confirm, "confirm upgrade")?;
    ctx.session.sleep(MENU_SETTLE);

    accept_alliance_help(ctx);
    Ok(())
}

fn observe(ctx: &TaskContext<'_>) -> Result<Detections, AttemptFailure> {
    ctx.session
        .observe()
        .map_err(|err| AttemptFailure::Perception(format!("{err:#}")))
}

fn tap(ctx: &TaskContext<'_>, det: &Detection, what: &'static str) -> Attempt {
    if ctx.session.tap_detection(det) {
        Ok(())
    } else {
        Err(AttemptFailure::InputFailed(what))
    }
}

/// Close a rejection dialog through its exit control, if one is visible.
fn dismiss(ctx: &TaskContext<'_>, dialog: &Detections) {
    if let Some(exit) = dialog.find(classes::EXIT_DIALOG_BUTTON) {
        ctx.session.tap_detection(exit);
        ctx.session.sleep(DIALOG_SETTLE);
    }
}

/// Ask the alliance for build help when the prompt shows up.
fn accept_alliance_help(ctx: &TaskContext<'_>) {
    match ctx.session.observe() {
        Ok(detections) => {
            if let Some(help) = detections.find(classes::ALLIANCE_HELP_BUTTON) {
                if ctx.session.tap_detection(help) {
                    debug!("requested alliance help");
                    ctx.session.sleep(DIALOG_SETTLE);
                }
            }
        }
        Err(err) => debug!(err = %format!("{err:#}"), "alliance help pass failed"),
    }
}

/// Record the freshly placed building when it is a multi-instance kind.
fn record_new_building(ctx: &TaskContext<'_>, task: &BuildTask, positions: &mut BuildingPositions) {
    let Some(kind) = MultiBuilding::from_name(&task.building) else {
        return;
    };
    if positions.get(kind).is_some() {
        return;
    }
    ctx.session.sleep(MENU_SETTLE);
    match ctx.session.observe() {
        Ok(detections) => record_positions(&detections, positions),
        Err(err) => debug!(err = %format!("{err:#}"), "new building pass failed"),
    }
}
