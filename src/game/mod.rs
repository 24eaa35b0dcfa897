pub mod actions;
pub mod constants;
pub mod effects;
pub mod encumbrance;
pub mod state;
pub mod world;
