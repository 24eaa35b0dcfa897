//! Waystone Server Library
//!
//! Authoritative session state sync for a time-driven single-player RPG.
//! The server owns every save; clients send periodic syncs and player
//! actions and receive sparse deltas of what changed.
//!
//! # Features
//!
//! - `json_saves` - JSON file save repository (enabled by default)

pub mod client;
pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;
