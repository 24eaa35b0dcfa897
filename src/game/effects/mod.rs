//! Status effects: template catalog, family tables and the tick engine

pub mod engine;
pub mod family;
pub mod template;

pub use engine::{EffectError, EffectMessage, TickEngine, TickReport};
pub use family::{EffectFamily, EffectKind, EffectRules, FamilyRules, PenaltyTier};
pub use template::{EffectCategory, EffectComponent, EffectTemplate, EffectTemplateStore, StatType, TemplateCatalog};
