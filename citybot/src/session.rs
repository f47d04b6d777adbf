//! Device, perception, and clock bundled for handlers.
//!
//! Input helpers log failures and return `false` instead of propagating, so a
//! disconnected device turns into "no progress" for the current handler.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::detection::{Detection, Detections, Point};
use crate::io::clock::Clock;
use crate::io::detector::Perception;
use crate::io::device::{Device, KeyCode};

#[derive(Clone, Copy)]
pub struct Session<'a> {
    device: &'a dyn Device,
    perception: Perception<'a>,
    clock: &'a dyn Clock,
}

impl<'a> Session<'a> {
    pub fn new(device: &'a dyn Device, perception: Perception<'a>, clock: &'a dyn Clock) -> Self {
        Self {
            device,
            perception,
            clock,
        }
    }

    pub fn device(&self) -> &'a dyn Device {
        self.device
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    /// Fresh capture + detection pass.
    pub fn observe(&self) -> Result<Detections> {
        self.perception.observe()
    }

    pub fn tap(&self, point: Point, what: &str) -> bool {
        match self.device.tap(point) {
            Ok(()) => {
                debug!(what, x = point.x, y = point.y, "tap");
                true
            }
            Err(err) => {
                warn!(what, x = point.x, y = point.y, err = %format!("{err:#}"), "tap failed");
                false
            }
        }
    }

    pub fn tap_detection(&self, det: &Detection) -> bool {
        self.tap(det.center(), &det.class)
    }

    pub fn swipe(&self, from: Point, to: Point, duration: Duration) -> bool {
        match self.device.swipe(from, to, duration) {
            Ok(()) => {
                debug!(from_x = from.x, to_x = to.x, "swipe");
                true
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "swipe failed");
                false
            }
        }
    }

    pub fn press(&self, key: KeyCode) -> bool {
        match self.device.press_key(key) {
            Ok(()) => {
                debug!(key = ?key, "key press");
                true
            }
            Err(err) => {
                warn!(key = ?key, err = %format!("{err:#}"), "key press failed");
                false
            }
        }
    }
}
