//! Tutorial screen classification.
//!
//! Classification is an ordered list of `(predicate, state)` rules evaluated
//! top to bottom; the first matching rule wins. The two completion-sequence
//! rules sit at the top so they pre-empt the generic screen rules.

use serde::Serialize;

use crate::core::classes::tutorial;
use crate::core::detection::Detections;
use crate::core::state::BootstrapProgress;

/// Minimum number of visible option cards for the picker to be recognised.
pub const MIN_OPTIONS_FOR_PICKER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Unknown,
    SkipButton,
    InfoText,
    OptionSelect,
    Confirm,
    ArrowAndTarget,
    ArrowOnly,
    StepAComplete,
    FinalStep,
}

impl BootstrapState {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapState::Unknown => "unknown",
            BootstrapState::SkipButton => "skip_button",
            BootstrapState::InfoText => "info_text",
            BootstrapState::OptionSelect => "option_select",
            BootstrapState::Confirm => "confirm",
            BootstrapState::ArrowAndTarget => "arrow_and_target",
            BootstrapState::ArrowOnly => "arrow_only",
            BootstrapState::StepAComplete => "step_a_complete",
            BootstrapState::FinalStep => "final_step",
        }
    }
}

type Rule = fn(&Detections, &BootstrapProgress) -> bool;

const RULES: &[(Rule, BootstrapState)] = &[
    (final_step_ready, BootstrapState::FinalStep),
    (step_a_visible, BootstrapState::StepAComplete),
    (skip_visible, BootstrapState::SkipButton),
    (info_visible, BootstrapState::InfoText),
    (picker_visible, BootstrapState::OptionSelect),
    (confirm_visible, BootstrapState::Confirm),
    (arrow_and_target, BootstrapState::ArrowAndTarget),
    (arrow_only, BootstrapState::ArrowOnly),
];

/// Classify one tutorial frame.
pub fn classify(detections: &Detections, progress: &BootstrapProgress) -> BootstrapState {
    RULES
        .iter()
        .find(|(rule, _)| rule(detections, progress))
        .map_or(BootstrapState::Unknown, |(_, state)| *state)
}

fn final_step_ready(detections: &Detections, progress: &BootstrapProgress) -> bool {
    progress.step_a_clicked && !progress.step_b_clicked && arrow_and_target(detections, progress)
}

fn step_a_visible(detections: &Detections, progress: &BootstrapProgress) -> bool {
    !progress.step_a_clicked && detections.has(tutorial::STEP_A_COMPLETE)
}

fn skip_visible(detections: &Detections, _: &BootstrapProgress) -> bool {
    detections.has(tutorial::SKIP_BUTTON)
}

fn info_visible(detections: &Detections, _: &BootstrapProgress) -> bool {
    detections.has(tutorial::INFO_TEXT)
}

fn picker_visible(detections: &Detections, _: &BootstrapProgress) -> bool {
    visible_options(detections) >= MIN_OPTIONS_FOR_PICKER
}

fn confirm_visible(detections: &Detections, _: &BootstrapProgress) -> bool {
    detections.has(tutorial::CONFIRM)
}

fn arrow_and_target(detections: &Detections, _: &BootstrapProgress) -> bool {
    detections.has(tutorial::ARROW) && detections.has(tutorial::TARGET)
}

fn arrow_only(detections: &Detections, _: &BootstrapProgress) -> bool {
    detections.has(tutorial::ARROW) && !detections.has(tutorial::TARGET)
}

/// Option cards in the frame, counted regardless of confidence.
pub fn visible_options(detections: &Detections) -> usize {
    detections
        .iter()
        .filter(|d| tutorial::OPTIONS.contains(&d.class.as_str()))
        .count()
}
