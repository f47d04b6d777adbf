//! View recovery and travel between the city and the field.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::classes;
use crate::core::detection::{Point, View};
use crate::core::state::InstanceState;
use crate::io::device::KeyCode;
use crate::session::Session;
use crate::tasks::TaskContext;

/// Home/city toggle in the bottom-left corner.
pub const HOME_BUTTON: Point = Point::new(31, 450);
/// Fallback location of the map toggle when it is not detected.
pub const MAP_BUTTON_FALLBACK: Point = Point::new(50, 800);

const RESET_PAUSE: Duration = Duration::from_millis(800);

/// How [`reset_view`] recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPath {
    /// A build menu was open; BACK was pressed twice.
    LeftBuildMenu,
    /// Normal view; the home button was tapped twice.
    HomeButton,
    /// The detection pass failed; home then BACK were issued blindly.
    Blind,
}

/// Return the UI to a known city view after a multi-step interaction.
pub fn reset_view(session: &Session<'_>) -> ResetPath {
    match session.observe() {
        Ok(detections) if detections.has(classes::IN_BUILD) => {
            debug!("build menu open, backing out");
            leave_build_menu(session);
            ResetPath::LeftBuildMenu
        }
        Ok(_) => {
            tap_home_twice(session, RESET_PAUSE);
            ResetPath::HomeButton
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "view reset detection failed, using blind reset");
            session.tap(HOME_BUTTON, "home_button");
            session.sleep(RESET_PAUSE);
            session.press(KeyCode::Back);
            session.sleep(RESET_PAUSE);
            ResetPath::Blind
        }
    }
}

/// Tap the home button twice with `pause` after each tap.
pub fn tap_home_twice(session: &Session<'_>, pause: Duration) -> bool {
    let first = session.tap(HOME_BUTTON, "home_button");
    session.sleep(pause);
    let second = session.tap(HOME_BUTTON, "home_button");
    session.sleep(pause);
    first && second
}

/// Leave a stray build menu with two BACK presses.
pub fn leave_build_menu(session: &Session<'_>) {
    session.press(KeyCode::Back);
    session.sleep(RESET_PAUSE);
    session.press(KeyCode::Back);
    session.sleep(RESET_PAUSE);
}

/// Scheduled `return_to_city` handler.
pub fn return_to_city(ctx: &TaskContext<'_>, _state: &mut InstanceState) -> bool {
    if ctx.view == View::City {
        return false;
    }
    let Some(button) = ctx.detections.find(classes::RETURN_TO_CITY_BUTTON) else {
        return false;
    };
    if !ctx.session.tap_detection(button) {
        return false;
    }
    info!("returning to city");
    ctx.session.sleep(Duration::from_secs(1));
    true
}

/// Open the world map from the city view.
pub fn open_map(ctx: &TaskContext<'_>) -> bool {
    if ctx.view == View::Field {
        return true;
    }
    let tapped = match ctx.detections.find(classes::MAP_BUTTON) {
        Some(button) => ctx.session.tap_detection(button),
        None => ctx.session.tap(MAP_BUTTON_FALLBACK, "map_button"),
    };
    if tapped {
        ctx.session.sleep(Duration::from_secs(2));
    }
    tapped
}
