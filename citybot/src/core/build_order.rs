//! Static default build order.
//!
//! The list is generated once per instance, the first time the pipeline runs,
//! and the persisted copy is authoritative afterwards.

use crate::core::state::BuildCategory::{Economic, Military};
use crate::core::state::{BuildCategory, BuildTask};

enum Entry {
    /// Upgrade the building whose detection class equals its name.
    Up(&'static str),
    /// Place a new building found under `build_<name>` in the given tab.
    New(BuildCategory, &'static str),
}

use Entry::{New, Up};

const DEFAULT_ORDER: &[Entry] = &[
    Up("cityhall"),
    New(Military, "archery_range"),
    Up("barracks"),
    Up("scout_camp"),
    Up("farm"),
    Up("farm"),
    Up("tavern"),
    Up("hospital"),
    New(Economic, "lumber_mill"),
    Up("lumber_mill"),
    Up("lumber_mill"),
    Up("wall"),
    Up("archery_range"),
    Up("cityhall"),
    Up("barracks"),
    New(Military, "stable"),
    Up("scout_camp"),
    Up("hospital"),
    Up("lumber_mill"),
    Up("tavern"),
    Up("storehouse"),
    Up("storehouse"),
    New(Military, "siege_workshop"),
    Up("stable"),
    Up("stable"),
    Up("siege_workshop"),
    Up("hospital"),
    Up("wall"),
    Up("cityhall"),
    Up("archery_range"),
    Up("archery_range"),
    Up("barracks"),
    Up("farm"),
    New(Economic, "alliance_center"),
    Up("barracks"),
    Up("scout_camp"),
    Up("farm"),
    Up("tavern"),
    Up("hospital"),
    Up("alliance_center"),
    Up("cityhall"),
    Up("scout_camp"),
    New(Economic, "academy"),
    Up("academy"),
    Up("academy"),
    New(Military, "stable"),
    Up("stable"),
    Up("stable"),
    Up("stable"),
    New(Military, "siege_workshop"),
    Up("siege_workshop"),
    Up("siege_workshop"),
    Up("siege_workshop"),
];

/// Fresh copy of the default build order, every task incomplete.
pub fn default_build_order() -> Vec<BuildTask> {
    DEFAULT_ORDER
        .iter()
        .map(|entry| match entry {
            Up(building) => BuildTask::upgrade(building, &[*building]),
            New(category, building) => {
                BuildTask::build_new(building, *category, &format!("build_{building}"))
            }
        })
        .collect()
}
