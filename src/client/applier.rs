//! Delta application
//!
//! Each present section maps to one self-contained mutation; absent sections
//! are never touched. Sections do not depend on each other, so applying them
//! in any order (or only some of them) never leaves a view in a state the
//! next delta cannot repair.

use crate::game::state::{InventorySlot, Location};
use crate::net::protocol::{
    BuildingDelta, CharacterDelta, Delta, EffectsDelta, EquipmentDelta, InventoryDelta, NpcDelta,
    SlotDelta,
};
use crate::net::snapshot::{EffectSummary, Snapshot};

/// Consumer of sparse deltas
pub trait DeltaApplier {
    fn apply_character(&mut self, delta: &CharacterDelta);
    fn apply_location(&mut self, location: &Location);
    fn apply_npcs(&mut self, delta: &NpcDelta);
    fn apply_buildings(&mut self, delta: &BuildingDelta);
    fn apply_inventory(&mut self, delta: &InventoryDelta);
    fn apply_equipment(&mut self, delta: &EquipmentDelta);
    fn apply_effects(&mut self, delta: &EffectsDelta);

    /// Apply every present section
    fn apply(&mut self, delta: &Delta) {
        if let Some(character) = &delta.character {
            self.apply_character(character);
        }
        if let Some(location) = &delta.location {
            self.apply_location(location);
        }
        if let Some(npcs) = &delta.npcs {
            self.apply_npcs(npcs);
        }
        if let Some(buildings) = &delta.buildings {
            self.apply_buildings(buildings);
        }
        if let Some(inventory) = &delta.inventory {
            self.apply_inventory(inventory);
        }
        if let Some(equipment) = &delta.equipment {
            self.apply_equipment(equipment);
        }
        if let Some(effects) = &delta.effects {
            self.apply_effects(effects);
        }
    }
}

fn patch_slot(slots: &mut Vec<InventorySlot>, index: usize, change: &SlotDelta) {
    if index >= slots.len() {
        slots.resize(index + 1, InventorySlot::default());
    }
    let slot = &mut slots[index];
    if change.empty {
        slot.clear();
        return;
    }
    if let Some(item_id) = &change.item_id {
        slot.item_id = Some(item_id.clone());
    }
    if let Some(quantity) = change.quantity {
        slot.quantity = quantity;
    }
}

/// A mirrored snapshot is the simplest client view
impl DeltaApplier for Snapshot {
    fn apply_character(&mut self, delta: &CharacterDelta) {
        let c = &mut self.character;
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = delta.$field { c.$field = value; })*
            };
        }
        set!(hp, max_hp, mana, max_mana, fatigue, hunger, gold, xp, time_of_day, current_day);
    }

    fn apply_location(&mut self, location: &Location) {
        self.location = location.clone();
    }

    fn apply_npcs(&mut self, delta: &NpcDelta) {
        for id in &delta.removed {
            self.npcs.remove(id);
        }
        for id in &delta.added {
            self.npcs.insert(id.clone());
        }
    }

    fn apply_buildings(&mut self, delta: &BuildingDelta) {
        for (id, open) in &delta.state_changed {
            match open {
                Some(open) => {
                    self.buildings.insert(id.clone(), *open);
                }
                None => {
                    self.buildings.remove(id);
                }
            }
        }
    }

    fn apply_inventory(&mut self, delta: &InventoryDelta) {
        if let Some(len) = delta.general_len {
            self.general_slots.resize(len, InventorySlot::default());
        }
        if let Some(len) = delta.backpack_len {
            self.backpack_slots.resize(len, InventorySlot::default());
        }
        for (index, change) in &delta.general_slots {
            patch_slot(&mut self.general_slots, *index, change);
        }
        for (index, change) in &delta.backpack_slots {
            patch_slot(&mut self.backpack_slots, *index, change);
        }
    }

    fn apply_equipment(&mut self, delta: &EquipmentDelta) {
        for (slot, item) in &delta.changed {
            match item {
                Some(item) => {
                    self.equipment.insert(slot.clone(), item.clone());
                }
                None => {
                    self.equipment.remove(slot);
                }
            }
        }
    }

    fn apply_effects(&mut self, delta: &EffectsDelta) {
        for (id, summary) in &delta.changed {
            match summary {
                Some(summary) => {
                    self.effects.insert(id.clone(), *summary);
                }
                None => {
                    self.effects.remove(id);
                }
            }
        }
    }
}

// ============================================================================
// UI patches
// ============================================================================

/// Minimal UI mutation derived from a delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiPatch {
    SetStat { field: &'static str, value: i64 },
    SetLocation(Location),
    ShowNpc(String),
    HideNpc(String),
    SetBuildingOpen { id: String, open: bool },
    DropBuilding(String),
    SetSlot { backpack: bool, index: usize, item_id: Option<String>, quantity: u32 },
    ResizeSlots { backpack: bool, len: usize },
    SetEquipment { slot: String, item_id: Option<String> },
    SetEffect { id: String, summary: Option<EffectSummary> },
}

/// Turns deltas into a list of UI patch operations against a tracked view
///
/// The recorder keeps its own mirror so slot patches always carry the full
/// resulting slot, even when the delta only names the quantity.
#[derive(Debug, Default)]
pub struct PatchRecorder {
    view: Snapshot,
    patches: Vec<UiPatch>,
}

impl PatchRecorder {
    pub fn new(view: Snapshot) -> Self {
        Self {
            view,
            patches: Vec::new(),
        }
    }

    pub fn view(&self) -> &Snapshot {
        &self.view
    }

    /// Take every patch recorded since the last drain
    pub fn drain(&mut self) -> Vec<UiPatch> {
        std::mem::take(&mut self.patches)
    }

    fn record_slots(&mut self, backpack: bool, changes: &std::collections::BTreeMap<usize, SlotDelta>) {
        for index in changes.keys() {
            let slots = if backpack {
                &self.view.backpack_slots
            } else {
                &self.view.general_slots
            };
            let slot = slots.get(*index).cloned().unwrap_or_default();
            self.patches.push(UiPatch::SetSlot {
                backpack,
                index: *index,
                item_id: slot.item_id,
                quantity: slot.quantity,
            });
        }
    }
}

impl DeltaApplier for PatchRecorder {
    fn apply_character(&mut self, delta: &CharacterDelta) {
        self.view.apply_character(delta);
        let fields: [(&'static str, Option<i64>); 10] = [
            ("hp", delta.hp.map(i64::from)),
            ("max_hp", delta.max_hp.map(i64::from)),
            ("mana", delta.mana.map(i64::from)),
            ("max_mana", delta.max_mana.map(i64::from)),
            ("fatigue", delta.fatigue.map(i64::from)),
            ("hunger", delta.hunger.map(i64::from)),
            ("gold", delta.gold),
            ("xp", delta.xp),
            ("time_of_day", delta.time_of_day.map(i64::from)),
            ("current_day", delta.current_day.map(i64::from)),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                self.patches.push(UiPatch::SetStat { field, value });
            }
        }
    }

    fn apply_location(&mut self, location: &Location) {
        self.view.apply_location(location);
        self.patches.push(UiPatch::SetLocation(location.clone()));
    }

    fn apply_npcs(&mut self, delta: &NpcDelta) {
        self.view.apply_npcs(delta);
        self.patches.extend(delta.removed.iter().cloned().map(UiPatch::HideNpc));
        self.patches.extend(delta.added.iter().cloned().map(UiPatch::ShowNpc));
    }

    fn apply_buildings(&mut self, delta: &BuildingDelta) {
        self.view.apply_buildings(delta);
        for (id, open) in &delta.state_changed {
            self.patches.push(match open {
                Some(open) => UiPatch::SetBuildingOpen {
                    id: id.clone(),
                    open: *open,
                },
                None => UiPatch::DropBuilding(id.clone()),
            });
        }
    }

    fn apply_inventory(&mut self, delta: &InventoryDelta) {
        self.view.apply_inventory(delta);
        if let Some(len) = delta.general_len {
            self.patches.push(UiPatch::ResizeSlots { backpack: false, len });
        }
        if let Some(len) = delta.backpack_len {
            self.patches.push(UiPatch::ResizeSlots { backpack: true, len });
        }
        self.record_slots(false, &delta.general_slots);
        self.record_slots(true, &delta.backpack_slots);
    }

    fn apply_equipment(&mut self, delta: &EquipmentDelta) {
        self.view.apply_equipment(delta);
        for (slot, item_id) in &delta.changed {
            self.patches.push(UiPatch::SetEquipment {
                slot: slot.clone(),
                item_id: item_id.clone(),
            });
        }
    }

    fn apply_effects(&mut self, delta: &EffectsDelta) {
        self.view.apply_effects(delta);
        for (id, summary) in &delta.changed {
            self.patches.push(UiPatch::SetEffect {
                id: id.clone(),
                summary: *summary,
            });
        }
    }
}
