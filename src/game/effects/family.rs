//! Effect families
//!
//! A family ties a stored stat (fatigue, hunger, encumbrance) to a ladder of
//! mutually exclusive penalty tiers. Time-driven families also own one
//! always-on accumulation effect; derived families (encumbrance) have none
//! and are moved by whoever recomputes their level.
//! Everything family-specific is data in a [`FamilyRules`] table, so the
//! engine never special-cases a family at a call site.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::constants::{encumbrance, fatigue, hunger};
use crate::game::effects::template::StatType;
use crate::game::state::SaveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectFamily {
    Fatigue,
    Hunger,
    Encumbrance,
}

impl EffectFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            EffectFamily::Fatigue => "fatigue",
            EffectFamily::Hunger => "hunger",
            EffectFamily::Encumbrance => "encumbrance",
        }
    }
}

impl fmt::Display for EffectFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine treats an effect, resolved from its id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Always-on tick counter driving a family's level
    Accumulation(EffectFamily),
    /// Tier-specific penalty; at most one per family
    Penalty { family: EffectFamily, tier: usize },
    /// Ordinary timed buff/debuff
    Timed,
}

impl EffectKind {
    pub fn family(self) -> Option<EffectFamily> {
        match self {
            EffectKind::Accumulation(family) | EffectKind::Penalty { family, .. } => Some(family),
            EffectKind::Timed => None,
        }
    }

    /// Label used when reporting errors
    pub fn label(self) -> &'static str {
        match self.family() {
            Some(family) => family.as_str(),
            None => "timed",
        }
    }
}

/// Inclusive level range mapped to one penalty effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltyTier {
    pub min_level: i32,
    pub max_level: i32,
    pub effect_id: String,
}

impl PenaltyTier {
    pub fn new(min_level: i32, max_level: i32, effect_id: &str) -> Self {
        Self {
            min_level,
            max_level,
            effect_id: effect_id.to_string(),
        }
    }

    #[inline]
    fn contains(&self, level: i32) -> bool {
        level >= self.min_level && level <= self.max_level
    }
}

/// Table describing one family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyRules {
    pub family: EffectFamily,
    /// Stored stat holding the family level
    pub stat: StatType,
    /// `None` for families whose level is derived rather than accumulated
    pub accumulation_id: Option<String>,
    pub min_level: i32,
    pub max_level: i32,
    /// Accumulation interval in minutes, indexed by `level - min_level`
    pub intervals: Vec<u32>,
    /// Levels covered by no tier carry no penalty
    pub tiers: Vec<PenaltyTier>,
}

impl FamilyRules {
    /// Fatigue rises by one level per hour awake
    pub fn fatigue() -> Self {
        let levels = (fatigue::MAX - fatigue::MIN + 1) as usize;
        Self {
            family: EffectFamily::Fatigue,
            stat: StatType::Fatigue,
            accumulation_id: Some("fatigue-accumulation".to_string()),
            min_level: fatigue::MIN,
            max_level: fatigue::MAX,
            intervals: vec![fatigue::MINUTES_PER_LEVEL; levels],
            tiers: vec![
                PenaltyTier::new(6, 7, "tired"),
                PenaltyTier::new(8, 8, "very-tired"),
                PenaltyTier::new(9, 9, "fatigued"),
                PenaltyTier::new(10, 10, "exhaustion"),
            ],
        }
    }

    /// Hunger drops one level per interval; the interval shortens as hunger worsens
    pub fn hunger() -> Self {
        Self {
            family: EffectFamily::Hunger,
            stat: StatType::Hunger,
            accumulation_id: Some("hunger-accumulation".to_string()),
            min_level: hunger::MIN,
            max_level: hunger::MAX,
            intervals: hunger::DECAY_MINUTES.to_vec(),
            tiers: vec![
                PenaltyTier::new(0, 0, "starving"),
                PenaltyTier::new(1, 1, "hungry"),
                PenaltyTier::new(3, 3, "stuffed"),
            ],
        }
    }

    /// Load level from carried weight; level 1 (normal load) carries no effect
    pub fn encumbrance() -> Self {
        Self {
            family: EffectFamily::Encumbrance,
            stat: StatType::Encumbrance,
            accumulation_id: None,
            min_level: encumbrance::MIN,
            max_level: encumbrance::MAX,
            intervals: Vec::new(),
            tiers: vec![
                PenaltyTier::new(0, 0, "encumbrance-light"),
                PenaltyTier::new(2, 2, "encumbrance-overweight"),
                PenaltyTier::new(3, 3, "encumbrance-encumbered"),
                PenaltyTier::new(4, 4, "encumbrance-overloaded"),
            ],
        }
    }

    /// Replace the accumulation interval used at `level`
    pub fn with_interval(mut self, level: i32, minutes: u32) -> Self {
        let idx = (level - self.min_level).max(0) as usize;
        if idx >= self.intervals.len() {
            let fill = self.intervals.last().copied().unwrap_or(0);
            self.intervals.resize(idx + 1, fill);
        }
        self.intervals[idx] = minutes;
        self
    }

    /// Current family level read from the save
    pub fn level(&self, state: &SaveState) -> i32 {
        state
            .stat(self.stat)
            .map(|v| v.clamp(self.min_level as i64, self.max_level as i64) as i32)
            .unwrap_or(self.min_level)
    }

    /// Accumulation interval at a level; 0 disables firing
    pub fn interval_for(&self, level: i32) -> u32 {
        let idx = (level.clamp(self.min_level, self.max_level) - self.min_level) as usize;
        self.intervals
            .get(idx)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(0)
    }

    /// Tier index and penalty id for a level, if any
    pub fn tier_for(&self, level: i32) -> Option<(usize, &str)> {
        let level = level.clamp(self.min_level, self.max_level);
        self.tiers
            .iter()
            .enumerate()
            .find(|(_, tier)| tier.contains(level))
            .map(|(idx, tier)| (idx, tier.effect_id.as_str()))
    }

    pub fn penalty_tier(&self, effect_id: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.effect_id == effect_id)
    }
}

/// Every family table plus the deprecated-id migration map
#[derive(Debug, Clone)]
pub struct EffectRules {
    families: Vec<FamilyRules>,
    migrations: HashMap<String, String>,
}

impl Default for EffectRules {
    fn default() -> Self {
        let migrations = [
            ("hunger-accumulation-stuffed", "hunger-accumulation"),
            ("hunger-accumulation-wellfed", "hunger-accumulation"),
            ("hunger-accumulation-well-fed", "hunger-accumulation"),
            ("hunger-accumulation-hungry", "hunger-accumulation"),
            ("hunger-accumulation-full", "hunger-accumulation"),
            ("hunger-accumulation-satisfied", "hunger-accumulation"),
            ("famished", "starving"),
            ("exhausted", "exhaustion"),
        ]
        .into_iter()
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .collect();

        Self {
            families: vec![
                FamilyRules::fatigue(),
                FamilyRules::hunger(),
                FamilyRules::encumbrance(),
            ],
            migrations,
        }
    }
}

impl EffectRules {
    /// Replace (or add) the table for a family
    pub fn with_family(mut self, rules: FamilyRules) -> Self {
        match self.families.iter_mut().find(|f| f.family == rules.family) {
            Some(existing) => *existing = rules,
            None => self.families.push(rules),
        }
        self
    }

    pub fn with_migration(mut self, old_id: &str, new_id: &str) -> Self {
        self.migrations.insert(old_id.to_string(), new_id.to_string());
        self
    }

    pub fn families(&self) -> &[FamilyRules] {
        &self.families
    }

    pub fn family(&self, family: EffectFamily) -> Option<&FamilyRules> {
        self.families.iter().find(|f| f.family == family)
    }

    /// Family whose level lives in `stat`
    pub fn family_for_stat(&self, stat: StatType) -> Option<&FamilyRules> {
        self.families.iter().find(|f| f.stat == stat)
    }

    pub fn classify(&self, effect_id: &str) -> EffectKind {
        for rules in &self.families {
            if rules.accumulation_id.as_deref() == Some(effect_id) {
                return EffectKind::Accumulation(rules.family);
            }
            if let Some(tier) = rules.penalty_tier(effect_id) {
                return EffectKind::Penalty {
                    family: rules.family,
                    tier,
                };
            }
        }
        EffectKind::Timed
    }

    /// Current id for a deprecated one
    pub fn migrate_id(&self, effect_id: &str) -> Option<&str> {
        self.migrations.get(effect_id).map(String::as_str)
    }
}
