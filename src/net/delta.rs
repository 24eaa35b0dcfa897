//! Delta compression for sync responses
//!
//! Compares the session's last snapshot with a fresh one and emits only what
//! changed:
//! - scalars: field-by-field equality
//! - NPC presence: set differences (added = new - old, removed = old - new)
//! - buildings, equipment, effects: per-key maps, `None` for removed keys
//! - inventory: per-index slot changes; same item with a new quantity emits
//!   only the quantity, and a container that changed size carries its length
//!
//! Every section is `None` unless something in it differs, so an unchanged
//! session produces an empty delta.

use std::collections::BTreeMap;

use crate::game::state::InventorySlot;
use crate::net::protocol::{
    BuildingDelta, CharacterDelta, Delta, EffectsDelta, EquipmentDelta, InventoryDelta, NpcDelta,
    SlotDelta,
};
use crate::net::snapshot::{CharacterSnapshot, Snapshot};

/// Diff two snapshots
pub fn generate_delta(old: &Snapshot, new: &Snapshot) -> Delta {
    Delta {
        character: character_delta(&old.character, &new.character),
        location: (old.location != new.location).then(|| new.location.clone()),
        npcs: npc_delta(old, new),
        buildings: map_delta(&old.buildings, &new.buildings)
            .map(|state_changed| BuildingDelta { state_changed }),
        inventory: inventory_delta(old, new),
        equipment: map_delta(&old.equipment, &new.equipment).map(|changed| EquipmentDelta { changed }),
        effects: map_delta(&old.effects, &new.effects).map(|changed| EffectsDelta { changed }),
    }
}

// ============================================================================
// Sections
// ============================================================================

fn character_delta(old: &CharacterSnapshot, new: &CharacterSnapshot) -> Option<CharacterDelta> {
    if old == new {
        return None;
    }

    fn changed<T: PartialEq + Copy>(old: T, new: T) -> Option<T> {
        (old != new).then_some(new)
    }

    Some(CharacterDelta {
        hp: changed(old.hp, new.hp),
        max_hp: changed(old.max_hp, new.max_hp),
        mana: changed(old.mana, new.mana),
        max_mana: changed(old.max_mana, new.max_mana),
        fatigue: changed(old.fatigue, new.fatigue),
        hunger: changed(old.hunger, new.hunger),
        gold: changed(old.gold, new.gold),
        xp: changed(old.xp, new.xp),
        time_of_day: changed(old.time_of_day, new.time_of_day),
        current_day: changed(old.current_day, new.current_day),
    })
}

fn npc_delta(old: &Snapshot, new: &Snapshot) -> Option<NpcDelta> {
    let added: Vec<String> = new.npcs.difference(&old.npcs).cloned().collect();
    let removed: Vec<String> = old.npcs.difference(&new.npcs).cloned().collect();
    if added.is_empty() && removed.is_empty() {
        None
    } else {
        Some(NpcDelta { added, removed })
    }
}

/// Per-key comparison; keys missing from `new` map to `None`
fn map_delta<V: Clone + PartialEq>(
    old: &BTreeMap<String, V>,
    new: &BTreeMap<String, V>,
) -> Option<BTreeMap<String, Option<V>>> {
    let mut changed = BTreeMap::new();

    for (key, value) in new {
        if old.get(key) != Some(value) {
            changed.insert(key.clone(), Some(value.clone()));
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            changed.insert(key.clone(), None);
        }
    }

    (!changed.is_empty()).then_some(changed)
}

fn inventory_delta(old: &Snapshot, new: &Snapshot) -> Option<InventoryDelta> {
    let delta = InventoryDelta {
        general_slots: slot_changes(&old.general_slots, &new.general_slots),
        backpack_slots: slot_changes(&old.backpack_slots, &new.backpack_slots),
        general_len: resized(&old.general_slots, &new.general_slots),
        backpack_len: resized(&old.backpack_slots, &new.backpack_slots),
    };
    (delta != InventoryDelta::default()).then_some(delta)
}

fn resized(old: &[InventorySlot], new: &[InventorySlot]) -> Option<usize> {
    (old.len() != new.len()).then_some(new.len())
}

/// Changes within the new length; slots past it go away with the resize
fn slot_changes(old: &[InventorySlot], new: &[InventorySlot]) -> BTreeMap<usize, SlotDelta> {
    let empty = InventorySlot::default();
    let mut changes = BTreeMap::new();

    for (index, after) in new.iter().enumerate() {
        let before = old.get(index).unwrap_or(&empty);
        if let Some(change) = slot_delta(before, after) {
            changes.insert(index, change);
        }
    }
    changes
}

fn slot_delta(old: &InventorySlot, new: &InventorySlot) -> Option<SlotDelta> {
    if old == new {
        return None;
    }
    if new.is_empty() {
        return Some(SlotDelta {
            empty: true,
            ..SlotDelta::default()
        });
    }
    if old.item_id == new.item_id {
        return Some(SlotDelta {
            quantity: Some(new.quantity),
            ..SlotDelta::default()
        });
    }
    Some(SlotDelta {
        item_id: new.item_id.clone(),
        quantity: Some(new.quantity),
        empty: false,
    })
}
