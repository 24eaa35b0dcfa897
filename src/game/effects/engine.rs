//! Effect tick engine
//!
//! Advances every active effect one in-game minute at a time:
//!
//! 1. **Delay**: `delay_remaining` counts down; no stat impact while positive.
//! 2. **Periodic**: `tick_accumulator` counts up to the component's interval
//!    (or the family table's interval for accumulation effects), fires the
//!    stat delta once and resets.
//! 3. **Duration**: non-permanent components count `duration_remaining` down
//!    and are removed at the end of the tick that reaches zero.
//!
//! When a tick moves a family level, the family's penalty tier is swapped.
//! A missing template never aborts a batch: the effect is left untouched,
//! the error is collected in the [`TickReport`], and it is retried next tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::game::constants::time::MINUTES_PER_TICK;
use crate::game::effects::family::{EffectFamily, EffectKind, EffectRules, FamilyRules};
use crate::game::effects::template::{
    EffectCategory, EffectComponent, EffectTemplate, EffectTemplateStore, StatType,
};
use crate::game::state::{ActiveEffect, SaveState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("Effect template not found: {effect_id} (family: {family})")]
    TemplateMissing { effect_id: String, family: String },
    #[error("Effect {effect_id} has no component at index {index}")]
    ComponentOutOfRange { effect_id: String, index: usize },
}

impl EffectError {
    pub fn effect_id(&self) -> &str {
        match self {
            EffectError::TemplateMissing { effect_id, .. } => effect_id,
            EffectError::ComponentOutOfRange { effect_id, .. } => effect_id,
        }
    }
}

/// Human-readable outcome of an effect (applied, tier change, periodic hit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectMessage {
    pub text: String,
    pub category: EffectCategory,
    pub silent: bool,
}

impl EffectMessage {
    fn from_template(template: &EffectTemplate, text: &str) -> Self {
        Self {
            text: text.to_string(),
            category: template.category,
            silent: template.silent,
        }
    }
}

/// Everything a batch of ticks produced besides the state change itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ticks: u32,
    pub day_changed: bool,
    pub messages: Vec<EffectMessage>,
    /// Deduplicated per effect; each is logged once per batch
    pub errors: Vec<EffectError>,
    /// Ids of effect instances that ran out during the batch
    pub expired: Vec<String>,
}

impl TickReport {
    fn record_error(&mut self, error: EffectError) {
        if !self.errors.contains(&error) {
            warn!("Skipping effect: {}", error);
            self.errors.push(error);
        }
    }

    fn push_message(&mut self, message: Option<EffectMessage>) {
        if let Some(message) = message {
            self.messages.push(message);
        }
    }

    /// Fold a later report into this one
    pub fn merge(&mut self, other: TickReport) {
        self.ticks += other.ticks;
        self.day_changed |= other.day_changed;
        self.messages.extend(other.messages);
        for error in other.errors {
            if !self.errors.contains(&error) {
                self.errors.push(error);
            }
        }
        self.expired.extend(other.expired);
    }

    /// Messages meant for the player
    pub fn visible_messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter(|m| !m.silent).map(|m| m.text.as_str())
    }
}

/// Stateless engine over a template store and family tables
#[derive(Clone, Copy)]
pub struct TickEngine<'a> {
    templates: &'a dyn EffectTemplateStore,
    rules: &'a EffectRules,
}

impl<'a> TickEngine<'a> {
    pub fn new(templates: &'a dyn EffectTemplateStore, rules: &'a EffectRules) -> Self {
        Self { templates, rules }
    }

    pub fn rules(&self) -> &'a EffectRules {
        self.rules
    }

    /// Whether a template with this id exists
    pub fn knows(&self, effect_id: &str) -> bool {
        self.templates.template(effect_id).is_some()
    }

    // ========================================================================
    // Session load
    // ========================================================================

    /// Bring a freshly loaded save in line with the current rules
    ///
    /// Runs before any tick: deprecated ids are rewritten, every family gets
    /// its accumulation effect, and penalties are matched to current levels.
    pub fn initialize(&self, state: &mut SaveState) -> TickReport {
        let mut report = TickReport::default();

        let migrated = self.migrate_ids(state);
        if migrated > 0 {
            debug!("Migrated {} deprecated effect ids", migrated);
        }

        self.ensure_accumulation(state);

        for rules in self.rules.families() {
            match self.swap_penalty(state, rules.family) {
                Ok(message) => report.push_message(message),
                Err(error) => report.record_error(error),
            }
        }
        report
    }

    /// Rewrite deprecated effect ids in place; returns the number rewritten
    pub fn migrate_ids(&self, state: &mut SaveState) -> usize {
        let mut migrated = 0;
        for effect in &mut state.active_effects {
            if let Some(current) = self.rules.migrate_id(&effect.effect_id) {
                effect.effect_id = current.to_string();
                migrated += 1;
            }
        }
        migrated
    }

    /// Exactly one accumulation effect per accumulating family
    ///
    /// The first existing instance is kept so its accumulator survives.
    pub fn ensure_accumulation(&self, state: &mut SaveState) {
        let now = state.absolute_minutes();
        for rules in self.rules.families() {
            let Some(accumulation_id) = rules.accumulation_id.as_deref() else {
                continue;
            };
            let mut seen = false;
            state.active_effects.retain(|effect| {
                if effect.effect_id != accumulation_id {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
            if !seen {
                state
                    .active_effects
                    .push(ActiveEffect::new(accumulation_id, 0, now));
            }
        }
    }

    // ========================================================================
    // Tier swap
    // ========================================================================

    /// Make the family's penalty match its current level
    ///
    /// All penalty effects of the family are removed and the one for the
    /// current tier is applied. When the single right penalty is already
    /// active nothing is touched, so its timers are preserved.
    pub fn swap_penalty(
        &self,
        state: &mut SaveState,
        family: EffectFamily,
    ) -> Result<Option<EffectMessage>, EffectError> {
        let Some(rules) = self.rules.family(family) else {
            return Ok(None);
        };
        let desired = rules.tier_for(rules.level(state)).map(|(_, id)| id);

        if Self::penalty_matches(state, rules, desired) {
            return Ok(None);
        }

        // Resolve before mutating so a missing template leaves the old tier in place
        let template = match desired {
            Some(id) => Some(self.lookup(id, EffectKind::Penalty { family, tier: 0 })?),
            None => None,
        };

        state
            .active_effects
            .retain(|effect| rules.penalty_tier(&effect.effect_id).is_none());

        let Some(template) = template else {
            debug!("{} penalty cleared", family);
            return Ok(None);
        };

        let now = state.absolute_minutes();
        Self::attach(state, template, now);
        debug!("{} penalty now {}", family, template.id);

        Ok(template
            .message
            .as_deref()
            .map(|text| EffectMessage::from_template(template, text)))
    }

    fn penalty_matches(state: &SaveState, rules: &FamilyRules, desired: Option<&str>) -> bool {
        let mut present: SmallVec<[&str; 2]> = SmallVec::new();
        for effect in &state.active_effects {
            if rules.penalty_tier(&effect.effect_id).is_some()
                && !present.contains(&effect.effect_id.as_str())
            {
                present.push(effect.effect_id.as_str());
            }
        }
        match desired {
            Some(id) => present.len() == 1 && present[0] == id,
            None => present.is_empty(),
        }
    }

    /// Store a recomputed level for a derived family and swap its tier
    pub fn set_level(&self, state: &mut SaveState, family: EffectFamily, level: i32) -> TickReport {
        let mut report = TickReport::default();
        let Some(rules) = self.rules.family(family) else {
            return report;
        };
        let level = level.clamp(rules.min_level, rules.max_level);
        let current = rules.level(state);
        if level != current {
            debug!("{} level {} -> {}", family, current, level);
            state.adjust(rules.stat, level - current);
        }
        match self.swap_penalty(state, family) {
            Ok(message) => report.push_message(message),
            Err(error) => report.record_error(error),
        }
        report
    }

    // ========================================================================
    // Applying effects
    // ========================================================================

    /// Apply an effect template by id
    ///
    /// Immediate components change stats on the spot; the rest become active
    /// effects. Families touched by an immediate change get their tier
    /// re-evaluated.
    pub fn apply_effect(&self, state: &mut SaveState, effect_id: &str) -> Result<TickReport, EffectError> {
        let kind = self.rules.classify(effect_id);
        let template = self.lookup(effect_id, kind)?;
        let mut report = TickReport::default();

        if let EffectKind::Penalty { family, .. } = kind {
            if let Some(rules) = self.rules.family(family) {
                state
                    .active_effects
                    .retain(|effect| rules.penalty_tier(&effect.effect_id).is_none());
            }
        }

        let mut touched: SmallVec<[EffectFamily; 2]> = SmallVec::new();
        for component in template.components.iter().filter(|c| c.is_immediate()) {
            if state.adjust(component.stat_type, component.value) {
                if let Some(rules) = self.rules.family_for_stat(component.stat_type) {
                    if !touched.contains(&rules.family) {
                        touched.push(rules.family);
                    }
                }
            }
        }

        let now = state.absolute_minutes();
        Self::attach(state, template, now);

        if let Some(text) = template.message.as_deref() {
            report.push_message(Some(EffectMessage::from_template(template, text)));
        }

        for family in touched {
            match self.swap_penalty(state, family) {
                Ok(message) => report.push_message(message),
                Err(error) => report.record_error(error),
            }
        }
        Ok(report)
    }

    /// Track every non-immediate component as its own active effect
    fn attach(state: &mut SaveState, template: &EffectTemplate, now: u64) {
        for (index, component) in template.components.iter().enumerate() {
            if component.is_immediate() {
                continue;
            }
            let mut effect = ActiveEffect::new(template.id.clone(), index, now);
            effect.duration_remaining = component.duration.max(0);
            effect.delay_remaining = component.delay.max(0);
            state.active_effects.push(effect);
        }
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Run `ticks` one-minute ticks, advancing the clock with each
    pub fn advance(&self, state: &mut SaveState, ticks: u32) -> TickReport {
        let mut report = TickReport::default();
        for _ in 0..ticks {
            if state.advance_minutes(MINUTES_PER_TICK) {
                report.day_changed = true;
            }
            self.tick(state, &mut report);
        }
        report.ticks = ticks;
        report
    }

    /// Process a single tick of every active effect
    pub fn tick(&self, state: &mut SaveState, report: &mut TickReport) {
        let levels_before: SmallVec<[(EffectFamily, i32); 3]> = self
            .rules
            .families()
            .iter()
            .map(|rules| (rules.family, rules.level(state)))
            .collect();

        let effects = std::mem::take(&mut state.active_effects);
        let mut kept = Vec::with_capacity(effects.len());

        for mut effect in effects {
            let kind = self.rules.classify(&effect.effect_id);
            let (template, component) = match self.resolve(&effect, kind) {
                Ok(resolved) => resolved,
                Err(error) => {
                    report.record_error(error);
                    kept.push(effect);
                    continue;
                }
            };

            if effect.delay_remaining > 0 {
                effect.delay_remaining -= 1;
                if effect.delay_remaining > 0 {
                    kept.push(effect);
                    continue;
                }
            }

            let interval = match kind {
                EffectKind::Accumulation(family) => self
                    .rules
                    .family(family)
                    .map(|rules| rules.interval_for(rules.level(state)))
                    .unwrap_or(component.tick_interval),
                _ => component.tick_interval,
            };

            if interval > 0 {
                effect.tick_accumulator += 1;
                if effect.tick_accumulator >= interval {
                    effect.tick_accumulator = 0;
                    state.adjust(component.stat_type, component.value);
                    if !matches!(kind, EffectKind::Accumulation(_)) {
                        report.push_message(
                            template
                                .tick_message
                                .as_deref()
                                .map(|text| EffectMessage::from_template(template, text)),
                        );
                    }
                }
            }

            if !component.is_permanent() {
                effect.duration_remaining -= 1;
                if effect.duration_remaining <= 0 {
                    debug!("Effect {} expired", effect.effect_id);
                    report.expired.push(effect.effect_id);
                    continue;
                }
            }

            kept.push(effect);
        }

        state.active_effects = kept;

        for (family, before) in levels_before {
            let after = match self.rules.family(family) {
                Some(rules) => rules.level(state),
                None => continue,
            };
            if after != before {
                match self.swap_penalty(state, family) {
                    Ok(message) => report.push_message(message),
                    Err(error) => report.record_error(error),
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Sum of attribute modifiers from effects past their delay
    pub fn stat_modifiers(&self, state: &SaveState) -> BTreeMap<StatType, i32> {
        let mut totals = BTreeMap::new();
        for effect in state.active_effects.iter().filter(|e| !e.is_delayed()) {
            let kind = self.rules.classify(&effect.effect_id);
            if let Ok((_, component)) = self.resolve(effect, kind) {
                if component.stat_type.is_attribute() {
                    *totals.entry(component.stat_type).or_insert(0) += component.value;
                }
            }
        }
        totals.retain(|_, v| *v != 0);
        totals
    }

    fn lookup(&self, effect_id: &str, kind: EffectKind) -> Result<&'a EffectTemplate, EffectError> {
        let store = self.templates;
        store
            .template(effect_id)
            .ok_or_else(|| EffectError::TemplateMissing {
                effect_id: effect_id.to_string(),
                family: kind.label().to_string(),
            })
    }

    fn resolve(
        &self,
        effect: &ActiveEffect,
        kind: EffectKind,
    ) -> Result<(&'a EffectTemplate, &'a EffectComponent), EffectError> {
        let template = self.lookup(&effect.effect_id, kind)?;
        let component = template
            .components
            .get(effect.effect_index)
            .ok_or_else(|| EffectError::ComponentOutOfRange {
                effect_id: effect.effect_id.clone(),
                index: effect.effect_index,
            })?;
        Ok((template, component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::fatigue;
    use crate::game::effects::family::{FamilyRules, PenaltyTier};
    use crate::game::effects::template::{EffectComponent, TemplateCatalog};
    use crate::game::state::Location;

    fn create_state() -> SaveState {
        SaveState::new("Tamsin", Location::new("millhaven", "market"))
    }

    fn effect_ids(state: &SaveState) -> Vec<&str> {
        let mut ids: Vec<&str> = state.active_effects.iter().map(|e| e.effect_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn accumulator(state: &SaveState, id: &str) -> u32 {
        state
            .active_effects
            .iter()
            .find(|e| e.effect_id == id)
            .map(|e| e.tick_accumulator)
            .unwrap_or_default()
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    #[test]
    fn test_initialize_adds_accumulation_effects() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();

        let report = engine.initialize(&mut state);

        assert!(report.errors.is_empty());
        assert!(state.has_effect("fatigue-accumulation"));
        assert!(state.has_effect("hunger-accumulation"));
        // fatigue 0 and hunger 2 carry no penalty
        assert_eq!(effect_ids(&state), vec!["fatigue-accumulation", "hunger-accumulation"]);
    }

    #[test]
    fn test_initialize_migrates_and_dedupes() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.hunger = 0;

        let mut legacy = ActiveEffect::new("hunger-accumulation-wellfed", 0, 0);
        legacy.tick_accumulator = 77;
        state.active_effects.push(legacy);
        state.active_effects.push(ActiveEffect::new("hunger-accumulation-hungry", 0, 0));
        state.active_effects.push(ActiveEffect::new("famished", 0, 0));

        engine.initialize(&mut state);

        let accumulations = state
            .active_effects
            .iter()
            .filter(|e| e.effect_id == "hunger-accumulation")
            .count();
        assert_eq!(accumulations, 1);
        assert_eq!(accumulator(&state, "hunger-accumulation"), 77);
        assert!(state.has_effect("starving"));
        assert!(!state.has_effect("famished"));
    }

    #[test]
    fn test_initialize_matches_penalty_to_level() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 9;
        state.active_effects.push(ActiveEffect::new("tired", 0, 0));

        let report = engine.initialize(&mut state);

        assert!(state.has_effect("fatigued"));
        assert!(!state.has_effect("tired"));
        assert_eq!(report.messages.len(), 1);
    }

    // ========================================================================
    // Tier swap
    // ========================================================================

    #[test]
    fn test_swap_penalty_is_idempotent() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 8;

        let first = engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();
        assert!(first.is_some());
        let after_first = state.active_effects.clone();

        let second = engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();
        assert!(second.is_none());
        assert_eq!(state.active_effects, after_first);
    }

    #[test]
    fn test_swap_penalty_preserves_timers_when_unchanged() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.hunger = 0;
        engine.swap_penalty(&mut state, EffectFamily::Hunger).unwrap();
        for effect in state.active_effects.iter_mut().filter(|e| e.effect_id == "starving") {
            effect.tick_accumulator = 100;
        }

        engine.swap_penalty(&mut state, EffectFamily::Hunger).unwrap();

        assert_eq!(accumulator(&state, "starving"), 100);
    }

    #[test]
    fn test_swap_penalty_removes_stray_tiers() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 10;
        state.active_effects.push(ActiveEffect::new("tired", 0, 0));
        state.active_effects.push(ActiveEffect::new("exhaustion", 0, 0));

        engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();

        assert_eq!(effect_ids(&state), vec!["exhaustion"]);
        // one instance per non-immediate component
        assert_eq!(state.active_effects.len(), 3);
    }

    #[test]
    fn test_swap_penalty_clears_when_no_tier() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.active_effects.push(ActiveEffect::new("tired", 0, 0));

        let message = engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();

        assert!(message.is_none());
        assert!(state.active_effects.is_empty());
    }

    #[test]
    fn test_set_level_swaps_derived_tier() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        engine.initialize(&mut state);
        assert!(!effect_ids(&state).iter().any(|id| id.starts_with("encumbrance")));

        let report = engine.set_level(&mut state, EffectFamily::Encumbrance, 3);
        assert_eq!(state.encumbrance, 3);
        assert!(state.has_effect("encumbrance-encumbered"));
        assert_eq!(report.visible_messages().collect::<Vec<_>>(), vec!["You are encumbered."]);

        // Same level again is a no-op
        let report = engine.set_level(&mut state, EffectFamily::Encumbrance, 3);
        assert!(report.messages.is_empty());

        engine.set_level(&mut state, EffectFamily::Encumbrance, 1);
        assert!(!state.has_effect("encumbrance-encumbered"));
        // Derived families never get an accumulation effect and never move on their own
        engine.advance(&mut state, 600);
        assert_eq!(state.encumbrance, 1);
    }

    #[test]
    fn test_swap_penalty_missing_template_keeps_old_tier() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert(
            EffectTemplate::new("tired", "Tired", EffectCategory::Penalty)
                .with(EffectComponent::new(StatType::Dexterity, -1)),
        );
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 8;
        state.active_effects.push(ActiveEffect::new("tired", 0, 0));

        let result = engine.swap_penalty(&mut state, EffectFamily::Fatigue);

        assert!(matches!(
            result,
            Err(EffectError::TemplateMissing { ref effect_id, ref family })
                if effect_id == "very-tired" && family == "fatigue"
        ));
        assert!(state.has_effect("tired"));
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    #[test]
    fn test_fatigue_rises_one_level_per_hour() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);

        for (start, minutes) in [(0, 59), (0, 60), (2, 185), (7, 600), (9, 61)] {
            let mut state = create_state();
            state.fatigue = start;
            engine.initialize(&mut state);

            engine.advance(&mut state, minutes);

            let expected = (start + (minutes / 60) as i32).min(fatigue::MAX);
            assert_eq!(state.fatigue, expected, "start {} after {} minutes", start, minutes);
        }
    }

    #[test]
    fn test_fatigue_tier_change_produces_message() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 5;
        engine.initialize(&mut state);

        let report = engine.advance(&mut state, 60);

        assert_eq!(state.fatigue, 6);
        assert!(state.has_effect("tired"));
        assert_eq!(report.visible_messages().collect::<Vec<_>>(), vec!["You are starting to feel tired."]);
    }

    #[test]
    fn test_hunger_threshold_swaps_exactly_one_penalty() {
        let mut catalog = TemplateCatalog::builtin();
        catalog.insert(
            EffectTemplate::new("peckish", "Peckish", EffectCategory::Penalty)
                .with(EffectComponent::new(StatType::Wisdom, -1)),
        );
        let mut hunger = FamilyRules::hunger().with_interval(2, 180);
        hunger.tiers.push(PenaltyTier::new(2, 2, "peckish"));
        let rules = EffectRules::default().with_family(hunger);
        let engine = TickEngine::new(&catalog, &rules);

        let mut state = create_state();
        state.hunger = 2;
        engine.initialize(&mut state);
        assert!(state.has_effect("peckish"));
        for effect in state
            .active_effects
            .iter_mut()
            .filter(|e| e.effect_id == "hunger-accumulation")
        {
            effect.tick_accumulator = 179;
        }

        let report = engine.advance(&mut state, 1);

        assert_eq!(state.hunger, 1);
        assert_eq!(accumulator(&state, "hunger-accumulation"), 0);
        assert!(!state.has_effect("peckish"));
        let penalties: Vec<&str> = state
            .active_effects
            .iter()
            .filter(|e| rules.family(EffectFamily::Hunger).unwrap().penalty_tier(&e.effect_id).is_some())
            .map(|e| e.effect_id.as_str())
            .collect();
        assert_eq!(penalties, vec!["hungry"]);
        assert!(report.visible_messages().any(|m| m == "You are now Hungry."));
    }

    #[test]
    fn test_hunger_interval_follows_current_level() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.hunger = 3;
        engine.initialize(&mut state);

        engine.advance(&mut state, 479);
        assert_eq!(state.hunger, 3);
        engine.advance(&mut state, 1);
        assert_eq!(state.hunger, 2);
        // level 2 decays after 360 more minutes
        engine.advance(&mut state, 360);
        assert_eq!(state.hunger, 1);
        assert!(state.has_effect("hungry"));
    }

    #[test]
    fn test_accumulation_survives_at_family_limit() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = fatigue::MAX;
        engine.initialize(&mut state);

        engine.advance(&mut state, 180);

        assert_eq!(state.fatigue, fatigue::MAX);
        assert!(state.has_effect("fatigue-accumulation"));
    }

    #[test]
    fn test_delay_then_periodic_then_expiry() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        engine.apply_effect(&mut state, "poisoned").unwrap();

        // delay 5: no damage yet
        engine.advance(&mut state, 4);
        assert_eq!(state.hp, 10);
        // active from tick 5, first hit after 10 active ticks
        engine.advance(&mut state, 10);
        assert_eq!(state.hp, 9);
        // 60 active ticks total -> 6 hits, then gone
        let report = engine.advance(&mut state, 60);
        assert_eq!(state.hp, 4);
        assert!(!state.has_effect("poisoned"));
        assert_eq!(report.expired, vec!["poisoned".to_string()]);
        assert!(report
            .visible_messages()
            .any(|m| m == "The poison burns. You lose 1 HP."));
    }

    #[test]
    fn test_permanent_effect_is_never_decremented() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 6;
        engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();

        let mut report = TickReport::default();
        for _ in 0..500 {
            engine.tick(&mut state, &mut report);
        }

        assert!(state.has_effect("tired"));
        assert!(report.expired.is_empty());
    }

    #[test]
    fn test_missing_template_is_skipped_and_retained() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        engine.initialize(&mut state);
        let mut ghost = ActiveEffect::new("ghost-curse", 0, 0);
        ghost.duration_remaining = 5;
        state.active_effects.push(ghost.clone());

        let report = engine.advance(&mut state, 120);

        // other effects still progressed
        assert_eq!(state.fatigue, 2);
        // the broken effect is untouched and reported once
        assert!(state.active_effects.contains(&ghost));
        assert_eq!(
            report.errors,
            vec![EffectError::TemplateMissing {
                effect_id: "ghost-curse".to_string(),
                family: "timed".to_string(),
            }]
        );
    }

    #[test]
    fn test_component_out_of_range_is_reported() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.active_effects.push(ActiveEffect::new("tired", 4, 0));

        let mut report = TickReport::default();
        engine.tick(&mut state, &mut report);

        assert_eq!(
            report.errors,
            vec![EffectError::ComponentOutOfRange {
                effect_id: "tired".to_string(),
                index: 4,
            }]
        );
    }

    #[test]
    fn test_advance_reports_day_change() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.time_of_day = 1430;

        let report = engine.advance(&mut state, 20);

        assert!(report.day_changed);
        assert_eq!(report.ticks, 20);
        assert_eq!((state.time_of_day, state.current_day), (10, 2));
    }

    // ========================================================================
    // Applying effects
    // ========================================================================

    #[test]
    fn test_apply_immediate_effect_swaps_tier() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.hunger = 1;
        engine.initialize(&mut state);
        assert!(state.has_effect("hungry"));

        let report = engine.apply_effect(&mut state, "eat-bread").unwrap();

        assert_eq!(state.hunger, 2);
        assert!(!state.has_effect("hungry"));
        assert!(!state.has_effect("eat-bread"));
        assert_eq!(report.visible_messages().collect::<Vec<_>>(), vec!["You eat the bread."]);
    }

    #[test]
    fn test_apply_mixed_effect_tracks_timed_component() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 7;
        engine.initialize(&mut state);

        engine.apply_effect(&mut state, "strong-coffee").unwrap();

        assert_eq!(state.fatigue, 5);
        assert!(!state.has_effect("tired"));
        let coffee: Vec<&ActiveEffect> = state
            .active_effects
            .iter()
            .filter(|e| e.effect_id == "strong-coffee")
            .collect();
        assert_eq!(coffee.len(), 1);
        assert_eq!(coffee[0].effect_index, 1);
        assert_eq!(coffee[0].duration_remaining, 120);
    }

    #[test]
    fn test_apply_unknown_effect_fails_without_mutation() {
        let catalog = TemplateCatalog::builtin();
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        let before = state.clone();

        let result = engine.apply_effect(&mut state, "no-such-thing");

        assert!(matches!(result, Err(EffectError::TemplateMissing { .. })));
        assert_eq!(state, before);
    }

    #[test]
    fn test_stat_modifiers_skip_delayed() {
        let mut catalog = TemplateCatalog::builtin();
        catalog.insert(
            EffectTemplate::new("slow-tonic", "Slow Tonic", EffectCategory::Buff)
                .with(EffectComponent::new(StatType::Strength, 2).lasting(30).delayed(10)),
        );
        let rules = EffectRules::default();
        let engine = TickEngine::new(&catalog, &rules);
        let mut state = create_state();
        state.fatigue = 9;
        engine.swap_penalty(&mut state, EffectFamily::Fatigue).unwrap();
        engine.apply_effect(&mut state, "slow-tonic").unwrap();

        let modifiers = engine.stat_modifiers(&state);
        assert_eq!(modifiers.get(&StatType::Dexterity), Some(&-2));
        assert_eq!(modifiers.get(&StatType::Strength), Some(&-1));

        engine.advance(&mut state, 10);
        let modifiers = engine.stat_modifiers(&state);
        assert_eq!(modifiers.get(&StatType::Strength), Some(&1));
    }
}
