//! Player actions
//!
//! Every action is fully checked against the current state before any
//! mutation happens, so a rejected action leaves the session untouched.

use serde::{Deserialize, Serialize};

use crate::game::constants::{actions, fatigue};
use crate::game::effects::{EffectError, EffectFamily, TickEngine, TickReport};
use crate::game::effects::template::StatType;
use crate::game::encumbrance;
use crate::game::state::{SaveState, SlotContainer};
use crate::game::world::WorldDirectory;
use crate::util::time::describe_span;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    /// Let time pass
    Wait { minutes: u32 },
    /// Pass time without growing more tired; recovers one fatigue level per hour
    Rest { minutes: u32 },
    /// Like rest but recovers twice as fast; requires some fatigue
    Sleep { minutes: u32 },
    /// Change location; `city` defaults to the current one, `building: None` is outdoors
    Move {
        city: Option<String>,
        district: String,
        building: Option<String>,
    },
    /// Consume one unit from an inventory slot
    UseItem { container: SlotContainer, slot: usize },
    /// Stop real-time accrual for the session
    Pause,
    /// Restart real-time accrual
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{action} must last between {min} and {max} minutes (got {got})")]
    InvalidDuration {
        action: &'static str,
        got: u32,
        min: u32,
        max: u32,
    },
    #[error("Unknown location: {0}")]
    UnknownLocation(String),
    #[error("{0} is closed")]
    BuildingClosed(String),
    #[error("Slot {index} is out of range")]
    SlotOutOfRange { index: usize },
    #[error("Slot {index} is empty")]
    EmptySlot { index: usize },
    #[error("{0} cannot be used")]
    NotConsumable(String),
    #[error("You are not tired enough to sleep")]
    NotTired,
    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// What a successfully applied action did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: Option<String>,
    pub report: TickReport,
    /// Time jumped discretely; clients should re-anchor instead of interpolating
    pub force_resync: bool,
    pub location_changed: bool,
}

impl GameAction {
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::Wait { .. } => "wait",
            GameAction::Rest { .. } => "rest",
            GameAction::Sleep { .. } => "sleep",
            GameAction::Move { .. } => "move",
            GameAction::UseItem { .. } => "use_item",
            GameAction::Pause => "pause",
            GameAction::Resume => "resume",
        }
    }

    /// Actions that count as the player being active
    pub fn counts_as_activity(&self) -> bool {
        !matches!(self, GameAction::Pause)
    }

    /// Parameter checks that need no state
    pub fn validate_params(&self) -> Result<(), ActionError> {
        let check = |action, got, min, max| {
            if got < min || got > max {
                Err(ActionError::InvalidDuration { action, got, min, max })
            } else {
                Ok(())
            }
        };
        match self {
            GameAction::Wait { minutes } => check(
                "wait",
                *minutes,
                actions::MIN_WAIT_MINUTES,
                actions::MAX_WAIT_MINUTES,
            ),
            GameAction::Rest { minutes } => check("rest", *minutes, 1, actions::MAX_REST_MINUTES),
            GameAction::Sleep { minutes } => check("sleep", *minutes, 1, actions::MAX_REST_MINUTES),
            GameAction::Move { district, .. } if district.trim().is_empty() => {
                Err(ActionError::UnknownLocation(String::new()))
            }
            _ => Ok(()),
        }
    }

    /// Full validation against the current state; never mutates
    pub fn check(
        &self,
        state: &SaveState,
        world: &dyn WorldDirectory,
        engine: &TickEngine<'_>,
    ) -> Result<(), ActionError> {
        self.validate_params()?;
        match self {
            GameAction::Sleep { .. } if state.fatigue < 1 => Err(ActionError::NotTired),
            GameAction::Move {
                city,
                district,
                building,
            } => {
                let city = city.as_deref().unwrap_or(&state.location.city);
                if !world.has_district(city, district) {
                    return Err(ActionError::UnknownLocation(format!("{}/{}", city, district)));
                }
                if let Some(building) = building {
                    match world.building_open(city, district, building, state.time_of_day) {
                        None => return Err(ActionError::UnknownLocation(building.clone())),
                        Some(false) => return Err(ActionError::BuildingClosed(building.clone())),
                        Some(true) => {}
                    }
                }
                Ok(())
            }
            GameAction::UseItem { container, slot } => {
                let item = state
                    .slot(*container, *slot)
                    .ok_or(ActionError::SlotOutOfRange { index: *slot })?
                    .item_id
                    .as_deref()
                    .ok_or(ActionError::EmptySlot { index: *slot })?;
                let effect = world
                    .consumable_effect(item)
                    .ok_or_else(|| ActionError::NotConsumable(item.to_string()))?;
                if !engine.knows(effect) {
                    return Err(ActionError::Effect(EffectError::TemplateMissing {
                        effect_id: effect.to_string(),
                        family: engine.rules().classify(effect).label().to_string(),
                    }));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Check, then mutate
    pub fn apply(
        &self,
        state: &mut SaveState,
        world: &dyn WorldDirectory,
        engine: &TickEngine<'_>,
    ) -> Result<ActionOutcome, ActionError> {
        self.check(state, world, engine)?;

        let outcome = match self {
            GameAction::Wait { minutes } => {
                let report = engine.advance(state, *minutes);
                ActionOutcome {
                    message: Some(format!("You waited {}.", describe_span(*minutes))),
                    report,
                    force_resync: true,
                    location_changed: false,
                }
            }
            GameAction::Rest { minutes } => {
                let report = recover(state, engine, *minutes, fatigue::REST_MINUTES_PER_LEVEL);
                ActionOutcome {
                    message: Some(format!("You rested for {}.", describe_span(*minutes))),
                    report,
                    force_resync: true,
                    location_changed: false,
                }
            }
            GameAction::Sleep { minutes } => {
                let report = recover(state, engine, *minutes, fatigue::SLEEP_MINUTES_PER_LEVEL);
                ActionOutcome {
                    message: Some(format!("You slept for {}.", describe_span(*minutes))),
                    report,
                    force_resync: true,
                    location_changed: false,
                }
            }
            GameAction::Move {
                city,
                district,
                building,
            } => {
                if let Some(city) = city {
                    state.location.city = city.clone();
                }
                state.location.district = district.clone();
                state.location.building = building.clone();
                let message = match building {
                    Some(building) => format!("You enter {}.", building),
                    None => format!("You walk to {}.", district),
                };
                ActionOutcome {
                    message: Some(message),
                    location_changed: true,
                    ..ActionOutcome::default()
                }
            }
            GameAction::UseItem { container, slot } => {
                // check() guarantees the slot holds a known consumable
                let item = state
                    .slot(*container, *slot)
                    .and_then(|s| s.item_id.clone())
                    .ok_or(ActionError::EmptySlot { index: *slot })?;
                let effect = world
                    .consumable_effect(&item)
                    .ok_or_else(|| ActionError::NotConsumable(item.clone()))?;
                let mut report = engine.apply_effect(state, effect)?;
                if let Some(entry) = state.slot_mut(*container, *slot) {
                    entry.quantity = entry.quantity.saturating_sub(1);
                    if entry.quantity == 0 {
                        entry.clear();
                    }
                }
                report.merge(encumbrance::reevaluate(state, world, engine));
                ActionOutcome {
                    message: Some(format!("You use the {}.", item)),
                    report,
                    ..ActionOutcome::default()
                }
            }
            GameAction::Pause | GameAction::Resume => ActionOutcome::default(),
        };
        Ok(outcome)
    }
}

/// Pass time while recovering fatigue instead of accruing it
fn recover(state: &mut SaveState, engine: &TickEngine<'_>, minutes: u32, per_level: u32) -> TickReport {
    let fatigue_before = state.fatigue;
    let mut report = engine.advance(state, minutes);

    let recovered = (minutes / per_level.max(1)) as i32;
    let target = (fatigue_before - recovered).clamp(fatigue::MIN, fatigue::MAX);
    state.adjust(StatType::Fatigue, target - state.fatigue);

    if let Some(rules) = engine.rules().family(EffectFamily::Fatigue) {
        for effect in state
            .active_effects
            .iter_mut()
            .filter(|e| rules.accumulation_id.as_deref() == Some(e.effect_id.as_str()))
        {
            effect.tick_accumulator = 0;
        }
    }

    let mut swap = TickReport::default();
    match engine.swap_penalty(state, EffectFamily::Fatigue) {
        Ok(Some(message)) => swap.messages.push(message),
        Ok(None) => {}
        Err(error) => swap.errors.push(error),
    }
    report.merge(swap);
    report
}
