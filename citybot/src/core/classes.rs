//! Detection class labels produced by the gameplay and tutorial models.

pub const IN_CITY: &str = "in_city";
pub const ON_FIELD: &str = "on_field";
pub const IN_BUILD: &str = "in_build";

pub const BUILDER_IDLE: &str = "builders_hut_idle";
pub const BUILDER_HUT: &str = "builders_hut";
pub const BUILDERS_BUSY: &str = "builders_hut_busy";
pub const BUILDER_HUT_BUTTON: &str = "builders_hut_button";
pub const BUILDER_HIRE_BUTTON: &str = "builders_hut_hire_button";

pub const BUILD_AVAILABLE: &str = "build_available";
pub const BUILD_NEW_BUTTON: &str = "build_new_button";
pub const BUILD_ECONOMIC_TAB: &str = "build_economic";
pub const BUILD_MILITARY_TAB: &str = "build_military";
pub const ACCEPT_BUILD_LOCATION: &str = "accept_build_location";

/// Labels the upgrade control has been seen under, in lookup order.
pub const UPGRADE_BUTTONS: &[&str] = &[
    "upgrade_button",
    "upgrade_available",
    "upgrade_building",
    "building_upgrade",
];
pub const UPGRADE_CONFIRM: &str = "upgrade_available_button";
pub const UPGRADE_NOT_AVAILABLE: &str = "upgrade_not_available";

pub const CONFIRM_BUTTON: &str = "confirm_button";
pub const GENERIC_BUTTON: &str = "button";
pub const EXIT_DIALOG_BUTTON: &str = "exit_dialog_button";
pub const ALLIANCE_HELP_BUTTON: &str = "alliance_help_button";

pub const MAIN_QUEST_CLAIMABLE: &str = "main_quest_claimable";
pub const QUESTS_CLAIMABLE: &str = "quests_claimable";

pub const TAVERN_CLICKABLE: &str = "tavern_clickable";
pub const TAVERN_UPGRADEABLE_CLICKABLE: &str = "tavern_upgradeable_clickable";

pub const SCOUT_CAMP: &str = "scout_camp";
pub const SCOUT_BUTTON: &str = "scout_button";
pub const SCOUT_CAMP_IDLE: &str = "scout_camp_idle";
pub const SCOUT_CAMP_UPGRADEABLE_IDLE: &str = "scout_camp_upgradeable_idle";
pub const EXPLORE_BUTTON: &str = "explore_button";
pub const MARCH_BUTTON: &str = "march_button";
pub const MAP_BUTTON: &str = "map_button";
pub const RETURN_TO_CITY_BUTTON: &str = "return_to_city_button";

/// Structures that only appear inside the city.
pub const CITY_INDICATORS: &[&str] = &[
    "city_hall",
    "city_hall_upgradeable",
    "barracks",
    "barracks_upgradeable",
    "barracks_upgradeable_idle",
    "farm",
    "builders_hut",
    "builders_hut_idle",
    "tavern",
    "tavern_upgradeable_clickable",
];

/// Objects that only appear on the world map.
pub const MAP_INDICATORS: &[&str] = &[
    "return_to_city_button",
    "world_map",
    "barbarian",
    "resource_node",
];

/// Tutorial model labels.
pub mod tutorial {
    pub const SKIP_BUTTON: &str = "skip button";
    pub const INFO_TEXT: &str = "counselor text bubble";
    pub const CONFIRM: &str = "confirm_button";
    pub const ARROW: &str = "click_arrow";
    pub const TARGET: &str = "click_target";
    pub const STEP_A_COMPLETE: &str = "upgrade_complete";

    /// Selectable civilization cards shown in the horizontal picker.
    pub const OPTIONS: &[&str] = &[
        "arabia", "britain", "china", "egypt", "france", "germany", "greece", "japan", "korea",
        "maya", "rome", "spain", "vikings",
    ];

    /// Label the picker uses for a card that is already highlighted.
    pub fn selected(option: &str) -> String {
        format!("{}_selected", option.to_lowercase())
    }
}
