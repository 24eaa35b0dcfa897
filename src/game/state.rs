//! Save state definitions
//!
//! `SaveState` is the authoritative, persisted character record held by a
//! session. Everything observable by the client is derived from it (plus the
//! session's location caches) when a snapshot is taken.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::constants::{encumbrance, fatigue, hunger, inventory, time::MINUTES_PER_DAY};
use crate::game::effects::template::StatType;
use crate::util::time;

/// An effect instance attached to a save
///
/// Only timers live here; the template it refers to is looked up by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub effect_id: String,
    /// Which component of the template this instance tracks
    #[serde(default)]
    pub effect_index: usize,
    #[serde(default)]
    pub duration_remaining: i32,
    #[serde(default)]
    pub delay_remaining: i32,
    #[serde(default)]
    pub tick_accumulator: u32,
    /// Absolute in-game minute the effect was applied at
    #[serde(default)]
    pub applied_at: u64,
}

impl ActiveEffect {
    pub fn new(effect_id: impl Into<String>, effect_index: usize, applied_at: u64) -> Self {
        Self {
            effect_id: effect_id.into(),
            effect_index,
            duration_remaining: 0,
            delay_remaining: 0,
            tick_accumulator: 0,
            applied_at,
        }
    }

    #[inline]
    pub fn is_delayed(&self) -> bool {
        self.delay_remaining > 0
    }
}

/// Where the character currently is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub district: String,
    /// `None` while outdoors
    #[serde(default)]
    pub building: Option<String>,
}

impl Location {
    pub fn new(city: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            district: district.into(),
            building: None,
        }
    }

    pub fn inside(mut self, building: impl Into<String>) -> Self {
        self.building = Some(building.into());
        self
    }
}

/// One inventory slot; an empty slot has no item and zero quantity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub quantity: u32,
}

impl InventorySlot {
    pub fn holding(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: Some(item_id.into()),
            quantity,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.item_id.is_none()
    }

    pub fn clear(&mut self) {
        self.item_id = None;
        self.quantity = 0;
    }
}

/// Inventory containers addressable by slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotContainer {
    General,
    Backpack,
}

/// Authoritative character record for one save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub fatigue: i32,
    pub hunger: i32,
    /// Load level, recomputed from the inventory on load and on inventory changes
    #[serde(default = "default_encumbrance")]
    pub encumbrance: i32,
    pub gold: i64,
    pub xp: i64,
    /// Minutes past midnight, `0..1440`
    pub time_of_day: u32,
    pub current_day: u32,
    pub location: Location,
    #[serde(default)]
    pub general_slots: Vec<InventorySlot>,
    #[serde(default)]
    pub backpack_slots: Vec<InventorySlot>,
    /// Slot name -> item id; unequipped slots are absent
    #[serde(default)]
    pub equipment: BTreeMap<String, String>,
    #[serde(default)]
    pub active_effects: Vec<ActiveEffect>,
}

fn default_encumbrance() -> i32 {
    encumbrance::NORMAL
}

impl SaveState {
    /// Fresh character at 08:00 on day 1
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            hp: 10,
            max_hp: 10,
            mana: 5,
            max_mana: 5,
            fatigue: fatigue::MIN,
            hunger: 2,
            encumbrance: encumbrance::NORMAL,
            gold: 0,
            xp: 0,
            time_of_day: 8 * 60,
            current_day: 1,
            location,
            general_slots: vec![InventorySlot::default(); inventory::GENERAL_SLOTS],
            backpack_slots: vec![InventorySlot::default(); inventory::BACKPACK_SLOTS],
            equipment: BTreeMap::new(),
            active_effects: Vec::new(),
        }
    }

    /// Repair a loaded save so every invariant the engine relies on holds
    pub fn normalize(&mut self) {
        self.general_slots
            .resize(inventory::GENERAL_SLOTS, InventorySlot::default());
        self.backpack_slots
            .resize(inventory::BACKPACK_SLOTS, InventorySlot::default());
        for slot in self.general_slots.iter_mut().chain(self.backpack_slots.iter_mut()) {
            if slot.item_id.as_deref().map_or(true, str::is_empty) || slot.quantity == 0 {
                slot.clear();
            }
        }
        if self.time_of_day >= MINUTES_PER_DAY {
            let (time, day) = time::advance(0, self.current_day, self.time_of_day);
            self.time_of_day = time;
            self.current_day = day;
        }
        self.current_day = self.current_day.max(1);
        self.max_hp = self.max_hp.max(1);
        self.max_mana = self.max_mana.max(0);
        self.hp = self.hp.clamp(0, self.max_hp);
        self.mana = self.mana.clamp(0, self.max_mana);
        self.fatigue = self.fatigue.clamp(fatigue::MIN, fatigue::MAX);
        self.hunger = self.hunger.clamp(hunger::MIN, hunger::MAX);
        self.encumbrance = self.encumbrance.clamp(encumbrance::MIN, encumbrance::MAX);
    }

    /// Current position on the absolute minute axis
    #[inline]
    pub fn absolute_minutes(&self) -> u64 {
        time::absolute_minutes(self.current_day, self.time_of_day)
    }

    /// Move the clock forward; returns true when the day rolled over
    pub fn advance_minutes(&mut self, minutes: u32) -> bool {
        let (time, day) = time::advance(self.time_of_day, self.current_day, minutes);
        let day_changed = day != self.current_day;
        self.time_of_day = time;
        self.current_day = day;
        day_changed
    }

    /// Current value of a stat that effects can change directly
    pub fn stat(&self, stat: StatType) -> Option<i64> {
        match stat {
            StatType::Hp => Some(self.hp as i64),
            StatType::Mana => Some(self.mana as i64),
            StatType::Fatigue => Some(self.fatigue as i64),
            StatType::Hunger => Some(self.hunger as i64),
            StatType::Encumbrance => Some(self.encumbrance as i64),
            StatType::Gold => Some(self.gold),
            StatType::Xp => Some(self.xp),
            _ => None,
        }
    }

    /// Apply a stat delta, clamping to the stat's valid range
    ///
    /// Returns whether the stored value changed. Attribute stats are passive
    /// modifiers and are never written here.
    pub fn adjust(&mut self, stat: StatType, delta: i32) -> bool {
        fn bump(value: &mut i32, delta: i32, min: i32, max: i32) -> bool {
            let next = value.saturating_add(delta).clamp(min, max);
            let changed = next != *value;
            *value = next;
            changed
        }

        match stat {
            StatType::Hp => bump(&mut self.hp, delta, 0, self.max_hp),
            StatType::Mana => bump(&mut self.mana, delta, 0, self.max_mana),
            StatType::Fatigue => bump(&mut self.fatigue, delta, fatigue::MIN, fatigue::MAX),
            StatType::Hunger => bump(&mut self.hunger, delta, hunger::MIN, hunger::MAX),
            StatType::Encumbrance => bump(
                &mut self.encumbrance,
                delta,
                encumbrance::MIN,
                encumbrance::MAX,
            ),
            StatType::Gold => {
                let next = self.gold.saturating_add(delta as i64).max(0);
                let changed = next != self.gold;
                self.gold = next;
                changed
            }
            StatType::Xp => {
                let next = self.xp.saturating_add(delta as i64).max(0);
                let changed = next != self.xp;
                self.xp = next;
                changed
            }
            _ => false,
        }
    }

    pub fn slots(&self, container: SlotContainer) -> &[InventorySlot] {
        match container {
            SlotContainer::General => &self.general_slots,
            SlotContainer::Backpack => &self.backpack_slots,
        }
    }

    pub fn slot(&self, container: SlotContainer, index: usize) -> Option<&InventorySlot> {
        self.slots(container).get(index)
    }

    pub fn slot_mut(&mut self, container: SlotContainer, index: usize) -> Option<&mut InventorySlot> {
        match container {
            SlotContainer::General => self.general_slots.get_mut(index),
            SlotContainer::Backpack => self.backpack_slots.get_mut(index),
        }
    }

    pub fn has_effect(&self, effect_id: &str) -> bool {
        self.active_effects.iter().any(|e| e.effect_id == effect_id)
    }

    /// Remove every instance of an effect; returns how many were removed
    pub fn remove_effect(&mut self, effect_id: &str) -> usize {
        let before = self.active_effects.len();
        self.active_effects.retain(|e| e.effect_id != effect_id);
        before - self.active_effects.len()
    }
}
