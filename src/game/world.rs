//! Location-derived world data
//!
//! The session only caches what this module computes: which NPCs are present
//! where the character stands, and which buildings in the district are open.
//! Content is authored elsewhere; [`StaticWorld`] holds a parsed copy of it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::game::constants::time::{MINUTES_PER_DAY, MINUTES_PER_HOUR};
use crate::game::state::Location;

/// World queries consumed by the scheduler and action validation
pub trait WorldDirectory: Send + Sync {
    /// NPC ids present at the character's location
    fn npcs_present(&self, location: &Location, time_of_day: u32) -> BTreeSet<String>;

    /// Open/closed flag for every building in the character's district
    fn building_states(&self, location: &Location, time_of_day: u32) -> BTreeMap<String, bool>;

    fn has_district(&self, city: &str, district: &str) -> bool;

    /// `None` when the building does not exist in that district
    fn building_open(&self, city: &str, district: &str, building: &str, time_of_day: u32) -> Option<bool>;

    /// Effect applied when the item is consumed, if it is a consumable
    fn consumable_effect(&self, item_id: &str) -> Option<&str>;

    /// Weight of one unit of the item; `None` for unknown items
    fn item_weight(&self, item_id: &str) -> Option<u32>;
}

/// When a building admits visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningHours {
    Always,
    /// Private; never accessible
    Never,
    /// Whole hours; `close < open` wraps past midnight
    Hours { open: u32, close: u32 },
}

impl OpeningHours {
    pub fn is_open(&self, time_of_day: u32) -> bool {
        match *self {
            OpeningHours::Always => true,
            OpeningHours::Never => false,
            OpeningHours::Hours { open, close } => {
                let hour = (time_of_day % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
                if close < open {
                    hour >= open || hour < close
                } else {
                    hour >= open && hour < close
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub hours: OpeningHours,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    #[serde(default)]
    pub buildings: Vec<Building>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub districts: BTreeMap<String, District>,
}

/// A block of an NPC's day; `end < start` wraps past midnight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub start: u32,
    pub end: u32,
    /// Building id, or district id when the NPC is outdoors
    pub location_id: String,
    #[serde(default)]
    pub state: String,
}

impl ScheduleSlot {
    fn covers(&self, time_of_day: u32) -> bool {
        if self.end < self.start {
            time_of_day >= self.start || time_of_day < self.end
        } else {
            time_of_day >= self.start && time_of_day < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub city: String,
    /// Where the NPC stays when it has no schedule
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
}

impl Npc {
    /// Active slot, falling back to the first slot when none covers the time
    pub fn current_slot(&self, time_of_day: u32) -> Option<&ScheduleSlot> {
        let time = time_of_day % MINUTES_PER_DAY;
        self.schedule
            .iter()
            .find(|slot| slot.covers(time))
            .or_else(|| self.schedule.first())
    }

    /// Building or district id the NPC occupies at this time
    pub fn whereabouts(&self, time_of_day: u32) -> Option<&str> {
        match self.current_slot(time_of_day) {
            Some(slot) => Some(slot.location_id.as_str()),
            None => self.home.as_deref(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid world data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable world content loaded at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticWorld {
    #[serde(default)]
    pub cities: BTreeMap<String, City>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    /// Item id -> effect id applied on use
    #[serde(default)]
    pub consumables: HashMap<String, String>,
    /// Item id -> weight of one unit
    #[serde(default)]
    pub weights: HashMap<String, u32>,
}

impl StaticWorld {
    pub fn from_json_str(json: &str) -> Result<Self, WorldError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, WorldError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn district(&self, city: &str, district: &str) -> Option<&District> {
        self.cities.get(city).and_then(|c| c.districts.get(district))
    }

    /// Small built-in town used when no content directory is configured
    pub fn sample() -> Self {
        let building = |id: &str, hours: OpeningHours| Building {
            id: id.to_string(),
            hours,
        };
        let slot = |start: u32, end: u32, location_id: &str, state: &str| ScheduleSlot {
            start,
            end,
            location_id: location_id.to_string(),
            state: state.to_string(),
        };

        let mut districts = BTreeMap::new();
        districts.insert(
            "market".to_string(),
            District {
                buildings: vec![
                    building("general-store", OpeningHours::Hours { open: 8, close: 18 }),
                    building("bakery", OpeningHours::Hours { open: 5, close: 14 }),
                    building("rusty-tankard", OpeningHours::Hours { open: 16, close: 2 }),
                ],
            },
        );
        districts.insert(
            "temple-row".to_string(),
            District {
                buildings: vec![
                    building("temple", OpeningHours::Always),
                    building("mayor-house", OpeningHours::Never),
                ],
            },
        );

        let mut cities = BTreeMap::new();
        cities.insert("millhaven".to_string(), City { districts });

        let npcs = vec![
            Npc {
                id: "baker-hilde".to_string(),
                city: "millhaven".to_string(),
                home: None,
                schedule: vec![
                    slot(300, 840, "bakery", "working"),
                    slot(840, 1200, "market", "wandering"),
                    slot(1200, 300, "temple-row", "sleeping"),
                ],
            },
            Npc {
                id: "barkeep-oswin".to_string(),
                city: "millhaven".to_string(),
                home: None,
                schedule: vec![
                    slot(960, 120, "rusty-tankard", "working"),
                    slot(120, 960, "market", "resting"),
                ],
            },
            Npc {
                id: "priestess-maren".to_string(),
                city: "millhaven".to_string(),
                home: Some("temple".to_string()),
                schedule: Vec::new(),
            },
        ];

        let consumables = [
            ("bread", "eat-bread"),
            ("travel-ration", "eat-ration"),
            ("healing-draught", "healing-draught"),
            ("coffee", "strong-coffee"),
        ]
        .into_iter()
        .map(|(item, effect)| (item.to_string(), effect.to_string()))
        .collect();

        let weights = [
            ("bread", 1),
            ("travel-ration", 2),
            ("healing-draught", 1),
            ("coffee", 1),
            ("rope", 5),
            ("iron-ingot", 10),
            ("short-sword", 6),
            ("leather-boots", 3),
            ("buckler", 8),
        ]
        .into_iter()
        .map(|(item, weight)| (item.to_string(), weight))
        .collect();

        Self {
            cities,
            npcs,
            consumables,
            weights,
        }
    }
}

impl WorldDirectory for StaticWorld {
    fn npcs_present(&self, location: &Location, time_of_day: u32) -> BTreeSet<String> {
        let spot = location.building.as_deref().unwrap_or(&location.district);
        self.npcs
            .iter()
            .filter(|npc| npc.city == location.city)
            .filter(|npc| npc.whereabouts(time_of_day) == Some(spot))
            .map(|npc| npc.id.clone())
            .collect()
    }

    fn building_states(&self, location: &Location, time_of_day: u32) -> BTreeMap<String, bool> {
        self.district(&location.city, &location.district)
            .map(|district| {
                district
                    .buildings
                    .iter()
                    .map(|b| (b.id.clone(), b.hours.is_open(time_of_day)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_district(&self, city: &str, district: &str) -> bool {
        self.district(city, district).is_some()
    }

    fn building_open(&self, city: &str, district: &str, building: &str, time_of_day: u32) -> Option<bool> {
        self.district(city, district)?
            .buildings
            .iter()
            .find(|b| b.id == building)
            .map(|b| b.hours.is_open(time_of_day))
    }

    fn consumable_effect(&self, item_id: &str) -> Option<&str> {
        self.consumables.get(item_id).map(String::as_str)
    }
    fn item_weight(&self, item_id: &str) -> Option<u32> {
        self.weights.get(item_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> u32 {
        hour * 60 + minute
    }

    #[test]
    fn test_opening_hours_same_day() {
        let hours = OpeningHours::Hours { open: 8, close: 18 };
        assert!(!hours.is_open(at(7, 59)));
        assert!(hours.is_open(at(8, 0)));
        assert!(hours.is_open(at(17, 59)));
        assert!(!hours.is_open(at(18, 0)));
    }

    #[test]
    fn test_opening_hours_wrap_midnight() {
        let hours = OpeningHours::Hours { open: 22, close: 4 };
        assert!(hours.is_open(at(23, 0)));
        assert!(hours.is_open(at(3, 59)));
        assert!(!hours.is_open(at(4, 0)));
        assert!(!hours.is_open(at(12, 0)));
    }

    #[test]
    fn test_opening_hours_always_and_never() {
        assert!(OpeningHours::Always.is_open(at(3, 0)));
        assert!(!OpeningHours::Never.is_open(at(12, 0)));
    }

    #[test]
    fn test_schedule_wraps_and_falls_back() {
        let world = StaticWorld::sample();
        let oswin = world.npcs.iter().find(|n| n.id == "barkeep-oswin").unwrap();
        assert_eq!(oswin.whereabouts(at(23, 0)), Some("rusty-tankard"));
        assert_eq!(oswin.whereabouts(at(1, 0)), Some("rusty-tankard"));
        assert_eq!(oswin.whereabouts(at(10, 0)), Some("market"));

        let gappy = Npc {
            id: "gappy".to_string(),
            city: "millhaven".to_string(),
            home: None,
            schedule: vec![ScheduleSlot {
                start: 600,
                end: 660,
                location_id: "bakery".to_string(),
                state: String::new(),
            }],
        };
        assert_eq!(gappy.whereabouts(at(20, 0)), Some("bakery"));
    }

    #[test]
    fn test_npcs_present_inside_and_outdoors() {
        let world = StaticWorld::sample();
        let bakery = Location::new("millhaven", "market").inside("bakery");
        let present = world.npcs_present(&bakery, at(9, 0));
        assert_eq!(present.into_iter().collect::<Vec<_>>(), vec!["baker-hilde"]);

        let market = Location::new("millhaven", "market");
        let present = world.npcs_present(&market, at(15, 0));
        assert!(present.contains("baker-hilde"));
        assert!(present.contains("barkeep-oswin"));

        let temple = Location::new("millhaven", "temple-row").inside("temple");
        assert!(world.npcs_present(&temple, at(12, 0)).contains("priestess-maren"));
    }

    #[test]
    fn test_building_states_for_district() {
        let world = StaticWorld::sample();
        let states = world.building_states(&Location::new("millhaven", "market"), at(17, 0));
        assert_eq!(states.get("general-store"), Some(&true));
        assert_eq!(states.get("bakery"), Some(&false));
        assert_eq!(states.get("rusty-tankard"), Some(&true));
        assert!(world
            .building_states(&Location::new("nowhere", "market"), 0)
            .is_empty());
    }

    #[test]
    fn test_building_open_lookup() {
        let world = StaticWorld::sample();
        assert_eq!(world.building_open("millhaven", "temple-row", "temple", 0), Some(true));
        assert_eq!(world.building_open("millhaven", "temple-row", "mayor-house", 600), Some(false));
        assert_eq!(world.building_open("millhaven", "market", "temple", 600), None);
    }

    #[test]
    fn test_world_from_json() {
        let json = r#"{
            "cities": {
                "brackwater": {
                    "districts": {
                        "docks": {
                            "buildings": [
                                {"id": "fishmonger", "hours": {"hours": {"open": 4, "close": 12}}},
                                {"id": "lighthouse", "hours": "always"}
                            ]
                        }
                    }
                }
            },
            "consumables": {"smoked-fish": "eat-ration"},
            "weights": {"smoked-fish": 2}
        }"#;
        let world = StaticWorld::from_json_str(json).unwrap();
        assert!(world.has_district("brackwater", "docks"));
        assert_eq!(world.building_open("brackwater", "docks", "fishmonger", at(5, 0)), Some(true));
        assert_eq!(world.consumable_effect("smoked-fish"), Some("eat-ration"));
        assert_eq!(world.item_weight("smoked-fish"), Some(2));
        assert_eq!(world.item_weight("anchor"), None);
        assert!(world.npcs.is_empty());
    }
}
