//! Carried weight and load level
//!
//! Weight counts every filled general and backpack slot (per unit) plus every
//! equipped item. Items the world has no weight for weigh nothing.

use crate::game::constants::encumbrance::{BASE_CAPACITY, LEVEL_PERCENT, MAX, NORMAL};
use crate::game::effects::{EffectFamily, TickEngine, TickReport};
use crate::game::state::SaveState;
use crate::game::world::WorldDirectory;

/// Total weight of everything the character carries or wears
pub fn carried_weight(state: &SaveState, world: &dyn WorldDirectory) -> u64 {
    let bagged: u64 = state
        .general_slots
        .iter()
        .chain(state.backpack_slots.iter())
        .filter_map(|slot| {
            let item = slot.item_id.as_deref()?;
            Some(world.item_weight(item)? as u64 * slot.quantity as u64)
        })
        .sum();
    let worn: u64 = state
        .equipment
        .values()
        .filter_map(|item| world.item_weight(item))
        .map(u64::from)
        .sum();
    bagged + worn
}

/// Level for a weight against a capacity; each level's bound is inclusive
pub fn level_for(weight: u64, capacity: u32) -> i32 {
    if capacity == 0 {
        return NORMAL;
    }
    let percent = weight * 100 / capacity as u64;
    LEVEL_PERCENT
        .iter()
        .position(|bound| percent <= *bound as u64)
        .map_or(MAX, |level| level as i32)
}

pub fn level(state: &SaveState, world: &dyn WorldDirectory) -> i32 {
    level_for(carried_weight(state, world), BASE_CAPACITY)
}

/// Recompute the load level and swap the encumbrance tier if it moved
pub fn reevaluate(state: &mut SaveState, world: &dyn WorldDirectory, engine: &TickEngine<'_>) -> TickReport {
    let level = level(state, world);
    engine.set_level(state, EffectFamily::Encumbrance, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::effects::{EffectRules, TemplateCatalog};
    use crate::game::state::{InventorySlot, Location};
    use crate::game::world::StaticWorld;

    fn create_state() -> SaveState {
        SaveState::new("Tamsin", Location::new("millhaven", "market"))
    }

    #[test]
    fn test_level_bounds_are_inclusive() {
        assert_eq!(level_for(0, 50), 0);
        assert_eq!(level_for(25, 50), 0);
        assert_eq!(level_for(26, 50), 1);
        assert_eq!(level_for(50, 50), 1);
        assert_eq!(level_for(51, 50), 2);
        assert_eq!(level_for(75, 50), 2);
        assert_eq!(level_for(100, 50), 3);
        assert_eq!(level_for(101, 50), 4);
        assert_eq!(level_for(10_000, 50), 4);
        assert_eq!(level_for(10, 0), 1);
    }

    #[test]
    fn test_weight_counts_slots_and_equipment() {
        let world = StaticWorld::sample();
        let mut state = create_state();
        state.general_slots[0] = InventorySlot::holding("iron-ingot", 2);
        state.backpack_slots[5] = InventorySlot::holding("rope", 1);
        state.backpack_slots[6] = InventorySlot::holding("mystery-pebble", 9);
        state.equipment.insert("mainHand".to_string(), "short-sword".to_string());

        let expected = 2 * world.item_weight("iron-ingot").unwrap()
            + world.item_weight("rope").unwrap()
            + world.item_weight("short-sword").unwrap();
        assert_eq!(carried_weight(&state, &world), expected as u64);
    }

    #[test]
    fn test_crossing_threshold_swaps_tier() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let world = StaticWorld::sample();
        let mut state = create_state();
        engine.initialize(&mut state);

        // Empty pockets: light load bonus
        reevaluate(&mut state, &world, &engine);
        assert_eq!(state.encumbrance, 0);
        assert!(state.has_effect("encumbrance-light"));

        // Exactly at capacity
        state.backpack_slots[0] = InventorySlot::holding("iron-ingot", 5);
        reevaluate(&mut state, &world, &engine);
        assert_eq!(state.encumbrance, 1);
        assert!(!state.has_effect("encumbrance-light"));

        // One more unit tips it over
        state.backpack_slots[1] = InventorySlot::holding("bread", 1);
        let report = reevaluate(&mut state, &world, &engine);
        assert_eq!(state.encumbrance, 2);
        assert!(state.has_effect("encumbrance-overweight"));
        assert_eq!(
            report.visible_messages().collect::<Vec<_>>(),
            vec!["Your pack is getting heavy."]
        );
    }
}
