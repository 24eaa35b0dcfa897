//! Effect templates
//!
//! Templates are authored content: immutable at runtime and referenced from
//! save data by id only. A template is a list of components, each changing a
//! single stat with its own timing.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stats an effect component can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Hp,
    Mana,
    Fatigue,
    Hunger,
    /// Derived from carried weight; recomputed whenever the inventory changes
    Encumbrance,
    Gold,
    Xp,
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl StatType {
    /// Attribute stats are passive modifiers rather than stored values
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            StatType::Strength
                | StatType::Dexterity
                | StatType::Constitution
                | StatType::Intelligence
                | StatType::Wisdom
                | StatType::Charisma
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatType::Hp => "hp",
            StatType::Mana => "mana",
            StatType::Fatigue => "fatigue",
            StatType::Hunger => "hunger",
            StatType::Encumbrance => "encumbrance",
            StatType::Gold => "gold",
            StatType::Xp => "xp",
            StatType::Strength => "strength",
            StatType::Dexterity => "dexterity",
            StatType::Constitution => "constitution",
            StatType::Intelligence => "intelligence",
            StatType::Wisdom => "wisdom",
            StatType::Charisma => "charisma",
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stat change with its timing, all in in-game minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectComponent {
    pub stat_type: StatType,
    pub value: i32,
    /// 0 or negative means permanent
    #[serde(default, alias = "duration_minutes")]
    pub duration: i32,
    #[serde(default, alias = "delay_minutes")]
    pub delay: i32,
    /// 0 means not periodic
    #[serde(default, alias = "tick_interval_minutes")]
    pub tick_interval: u32,
}

impl EffectComponent {
    pub fn new(stat_type: StatType, value: i32) -> Self {
        Self {
            stat_type,
            value,
            duration: 0,
            delay: 0,
            tick_interval: 0,
        }
    }

    pub fn lasting(mut self, duration: i32) -> Self {
        self.duration = duration;
        self
    }

    pub fn delayed(mut self, delay: i32) -> Self {
        self.delay = delay;
        self
    }

    pub fn every(mut self, tick_interval: u32) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.duration <= 0
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.tick_interval > 0
    }

    /// Applied once on the spot and never tracked as an active effect
    pub fn is_immediate(&self) -> bool {
        !self.stat_type.is_attribute() && self.duration <= 0 && self.delay <= 0 && self.tick_interval == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectCategory {
    Buff,
    Debuff,
    #[default]
    Status,
    Penalty,
}

/// Immutable effect definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: EffectCategory,
    /// Shown when the effect is applied
    #[serde(default)]
    pub message: Option<String>,
    /// Shown each time a periodic component fires
    #[serde(default)]
    pub tick_message: Option<String>,
    #[serde(default)]
    pub silent: bool,
    pub components: Vec<EffectComponent>,
}

impl EffectTemplate {
    pub fn new(id: &str, name: &str, category: EffectCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            category,
            message: None,
            tick_message: None,
            silent: false,
            components: Vec::new(),
        }
    }

    pub fn with(mut self, component: EffectComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn tick_message(mut self, message: &str) -> Self {
        self.tick_message = Some(message.to_string());
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Read-only template lookup consumed by the tick engine
pub trait EffectTemplateStore: Send + Sync {
    fn template(&self, id: &str) -> Option<&EffectTemplate>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid effect catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate effect template: {0}")]
    Duplicate(String),
}

/// In-memory template catalog
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, EffectTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of templates
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let templates: Vec<EffectTemplate> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for template in templates {
            if catalog.templates.contains_key(&template.id) {
                return Err(CatalogError::Duplicate(template.id));
            }
            catalog.insert(template);
        }
        Ok(catalog)
    }

    pub fn load_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Insert or replace a template
    pub fn insert(&mut self, template: EffectTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Overlay another catalog; its templates win on id clashes
    pub fn merge(&mut self, other: TemplateCatalog) {
        self.templates.extend(other.templates);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Built-in fatigue/hunger families plus a few common consumables
    pub fn builtin() -> Self {
        use EffectCategory::*;
        use StatType::*;

        let templates = [
            // Fatigue family
            EffectTemplate::new("fatigue-accumulation", "Weariness", Status)
                .with(EffectComponent::new(Fatigue, 1).every(60))
                .silent(),
            EffectTemplate::new("tired", "Tired", Penalty)
                .with(EffectComponent::new(Dexterity, -1))
                .message("You are starting to feel tired."),
            EffectTemplate::new("very-tired", "Very Tired", Penalty)
                .with(EffectComponent::new(Dexterity, -1))
                .with(EffectComponent::new(Wisdom, -1))
                .message("You are very tired."),
            EffectTemplate::new("fatigued", "Fatigued", Penalty)
                .with(EffectComponent::new(Dexterity, -2))
                .with(EffectComponent::new(Strength, -1))
                .message("You are fatigued. You need rest."),
            EffectTemplate::new("exhaustion", "Exhaustion", Penalty)
                .with(EffectComponent::new(Strength, -2))
                .with(EffectComponent::new(Dexterity, -2))
                .with(EffectComponent::new(Constitution, -1))
                .message("You are exhausted!"),
            // Hunger family
            EffectTemplate::new("hunger-accumulation", "Appetite", Status)
                .with(EffectComponent::new(Hunger, -1).every(240))
                .silent(),
            EffectTemplate::new("stuffed", "Stuffed", Penalty)
                .with(EffectComponent::new(Dexterity, -1))
                .message("You are stuffed."),
            EffectTemplate::new("hungry", "Hungry", Penalty)
                .with(EffectComponent::new(Strength, -1))
                .message("You are now Hungry."),
            EffectTemplate::new("starving", "Starving", Penalty)
                .with(EffectComponent::new(Hp, -1).every(240))
                .with(EffectComponent::new(Constitution, -1))
                .message("You are starving!")
                .tick_message("You're starving! You lose 1 HP from lack of food."),
            // Encumbrance family; level 1 (normal load) has no effect
            EffectTemplate::new("encumbrance-light", "Light Load", Buff)
                .with(EffectComponent::new(Dexterity, 1))
                .message("Your pack feels light."),
            EffectTemplate::new("encumbrance-overweight", "Overweight", Penalty)
                .with(EffectComponent::new(Dexterity, -1))
                .with(EffectComponent::new(Strength, -1))
                .message("Your pack is getting heavy."),
            EffectTemplate::new("encumbrance-encumbered", "Encumbered", Penalty)
                .with(EffectComponent::new(Dexterity, -2))
                .with(EffectComponent::new(Strength, -2))
                .message("You are encumbered."),
            EffectTemplate::new("encumbrance-overloaded", "Overloaded", Penalty)
                .with(EffectComponent::new(Dexterity, -3))
                .with(EffectComponent::new(Strength, -3))
                .with(EffectComponent::new(Constitution, -2))
                .message("You can barely move under the load!"),
            // Consumables and timed effects
            EffectTemplate::new("eat-bread", "Bread", Buff)
                .with(EffectComponent::new(Hunger, 1))
                .message("You eat the bread."),
            EffectTemplate::new("eat-ration", "Travel Ration", Buff)
                .with(EffectComponent::new(Hunger, 2))
                .message("You eat a travel ration."),
            EffectTemplate::new("healing-draught", "Healing Draught", Buff)
                .with(EffectComponent::new(Hp, 5))
                .message("Warmth spreads through you."),
            EffectTemplate::new("strong-coffee", "Strong Coffee", Buff)
                .with(EffectComponent::new(Fatigue, -2))
                .with(EffectComponent::new(Dexterity, 1).lasting(120))
                .message("You feel alert."),
            EffectTemplate::new("poisoned", "Poisoned", Debuff)
                .with(EffectComponent::new(Hp, -1).every(10).lasting(60).delayed(5))
                .message("You feel sick.")
                .tick_message("The poison burns. You lose 1 HP."),
        ];

        let mut catalog = Self::new();
        for template in templates {
            catalog.insert(template);
        }
        catalog
    }
}

impl EffectTemplateStore for TemplateCatalog {
    fn template(&self, id: &str) -> Option<&EffectTemplate> {
        self.templates.get(id)
    }
}
