//! Client-observable snapshots
//!
//! A snapshot is a plain value copied out of the session: no references into
//! live state, so it can be compared after the session lock is released.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::game::state::{InventorySlot, Location, SaveState};

/// Scalar character fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub hp: i32,
    pub max_hp: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub fatigue: i32,
    pub hunger: i32,
    pub gold: i64,
    pub xp: i64,
    pub time_of_day: u32,
    pub current_day: u32,
}

impl CharacterSnapshot {
    pub fn from_state(state: &SaveState) -> Self {
        Self {
            hp: state.hp,
            max_hp: state.max_hp,
            mana: state.mana,
            max_mana: state.max_mana,
            fatigue: state.fatigue,
            hunger: state.hunger,
            gold: state.gold,
            xp: state.xp,
            time_of_day: state.time_of_day,
            current_day: state.current_day,
        }
    }
}

/// What the client sees of one active effect id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSummary {
    /// Longest remaining duration across instances; 0 for permanent
    pub duration_remaining: i32,
    /// True while every instance is still in its delay phase
    pub delayed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub character: CharacterSnapshot,
    pub location: Location,
    pub npcs: BTreeSet<String>,
    pub buildings: BTreeMap<String, bool>,
    pub general_slots: Vec<InventorySlot>,
    pub backpack_slots: Vec<InventorySlot>,
    pub equipment: BTreeMap<String, String>,
    pub effects: BTreeMap<String, EffectSummary>,
}

impl Snapshot {
    /// Copy every observable field out of the session
    pub fn capture(
        state: &SaveState,
        npcs: &BTreeSet<String>,
        buildings: &BTreeMap<String, bool>,
    ) -> Self {
        let mut effects: BTreeMap<String, EffectSummary> = BTreeMap::new();
        for effect in &state.active_effects {
            effects
                .entry(effect.effect_id.clone())
                .and_modify(|summary| {
                    summary.duration_remaining = summary.duration_remaining.max(effect.duration_remaining);
                    summary.delayed &= effect.is_delayed();
                })
                .or_insert(EffectSummary {
                    duration_remaining: effect.duration_remaining,
                    delayed: effect.is_delayed(),
                });
        }

        Self {
            character: CharacterSnapshot::from_state(state),
            location: state.location.clone(),
            npcs: npcs.clone(),
            buildings: buildings.clone(),
            general_slots: state.general_slots.clone(),
            backpack_slots: state.backpack_slots.clone(),
            equipment: state.equipment.clone(),
            effects,
        }
    }
}
