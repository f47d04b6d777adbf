//! Detection snapshots, preconditions, and view classification.

use serde::{Deserialize, Serialize};

use crate::core::classes;

/// Detections at or below this confidence are ignored by every lookup.
pub const MIN_CONFIDENCE: f64 = 0.7;

/// Screen coordinate in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The zero point doubles as "never observed" in persisted records.
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// One labeled, scored bounding box. `x`/`y` are the box centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

impl Detection {
    pub fn is_confident(&self) -> bool {
        self.confidence > MIN_CONFIDENCE
    }

    pub fn center(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }

    /// Lower edge of the bounding box.
    pub fn bottom(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Immutable detection set for one perception cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections(Vec<Detection>);

impl Detections {
    pub fn new(items: Vec<Detection>) -> Self {
        Self(items)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every detection, including those below the confidence threshold.
    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.0.iter()
    }

    pub fn confident(&self) -> impl Iterator<Item = &Detection> {
        self.0.iter().filter(|d| d.is_confident())
    }

    /// First confident detection of `class`, in provider order.
    pub fn find(&self, class: &str) -> Option<&Detection> {
        self.confident().find(|d| d.class == class)
    }

    /// First confident detection of the first class in `classes` that is present.
    pub fn find_any(&self, classes: &[&str]) -> Option<&Detection> {
        classes.iter().find_map(|class| self.find(class))
    }

    /// Highest-confidence detection of `class`.
    pub fn best(&self, class: &str) -> Option<&Detection> {
        self.confident()
            .filter(|d| d.class == class)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn has(&self, class: &str) -> bool {
        self.find(class).is_some()
    }

    pub fn count_where<F: Fn(&Detection) -> bool>(&self, pred: F) -> usize {
        self.confident().filter(|d| pred(d)).count()
    }

    /// Compact `class(conf)` listing of confident detections for debug logs.
    pub fn summary(&self) -> String {
        self.confident()
            .map(|d| format!("{}({:.2})", d.class, d.confidence))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<Detection>> for Detections {
    fn from(items: Vec<Detection>) -> Self {
        Self::new(items)
    }
}

/// Class-set gate over a detection snapshot.
///
/// Empty sets are vacuously satisfied, so the default precondition always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionPrecondition {
    pub any_of: Vec<String>,
    pub all_of: Vec<String>,
    pub none_of: Vec<String>,
}

impl DetectionPrecondition {
    pub fn any_of<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of.extend(classes.into_iter().map(Into::into));
        self
    }

    pub fn all_of<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_of.extend(classes.into_iter().map(Into::into));
        self
    }

    pub fn none_of<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.none_of.extend(classes.into_iter().map(Into::into));
        self
    }

    pub fn is_met(&self, detections: &Detections) -> bool {
        let any = self.any_of.is_empty() || self.any_of.iter().any(|c| detections.has(c));
        let all = self.all_of.iter().all(|c| detections.has(c));
        let none = !self.none_of.iter().any(|c| detections.has(c));
        any && all && none
    }
}

/// Coarse application context used to partition eligible tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    City,
    Field,
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::City => write!(f, "city"),
            View::Field => write!(f, "field"),
        }
    }
}

/// Classify the current view from one detection snapshot.
///
/// Explicit view markers win in provider order. Without a marker the map only
/// wins when it has at least one indicator and the city does not have more.
pub fn classify_view(detections: &Detections) -> View {
    for det in detections.confident() {
        match det.class.as_str() {
            classes::ON_FIELD => return View::Field,
            classes::IN_CITY => return View::City,
            _ => {}
        }
    }

    let city = detections.count_where(|d| classes::CITY_INDICATORS.contains(&d.class.as_str()));
    let map = detections.count_where(|d| classes::MAP_INDICATORS.contains(&d.class.as_str()));
    if map > 0 && map >= city {
        View::Field
    } else {
        View::City
    }
}
