/// In-game clock constants. One tick is one in-game minute.
pub mod time {
    /// Minutes in one in-game day; time-of-day lives in `0..MINUTES_PER_DAY`
    pub const MINUTES_PER_DAY: u32 = 1440;
    /// Minutes in one in-game hour
    pub const MINUTES_PER_HOUR: u32 = 60;
    /// In-game minutes processed per engine tick
    pub const MINUTES_PER_TICK: u32 = 1;
    /// Real milliseconds that make up one in-game minute (1 real second = 1 game minute)
    pub const REAL_MS_PER_GAME_MINUTE: u64 = 1000;
    /// Most minutes a single sync batch may catch up on
    pub const DEFAULT_MAX_CATCHUP_MINUTES: u32 = 120;
    /// In-game minutes without a player action before the session auto-pauses
    pub const DEFAULT_IDLE_PAUSE_MINUTES: u32 = 360;
}

/// Client synchronization constants
pub mod sync {
    /// Real-time cadence of the client's periodic sync request
    pub const SYNC_INTERVAL_MS: u64 = 2000;
    /// Extrapolated/authoritative drift (in-game minutes) tolerated before a resync
    pub const DRIFT_TOLERANCE_MINUTES: f64 = 1.0;
}

/// Location-derived cache refresh cadence
pub mod cache {
    /// NPC presence refreshes whenever this many in-game minutes roll over
    pub const NPC_REFRESH_MINUTES: u32 = 60;
    /// Building open/closed flags refresh on this coarser boundary
    pub const BUILDING_REFRESH_MINUTES: u32 = 120;
}

/// Fatigue family limits
pub mod fatigue {
    pub const MIN: i32 = 0;
    /// Exhaustion
    pub const MAX: i32 = 10;
    /// In-game minutes of activity per fatigue level
    pub const MINUTES_PER_LEVEL: u32 = 60;
    /// Minutes of resting that recover one level
    pub const REST_MINUTES_PER_LEVEL: u32 = 60;
    /// Minutes of sleep that recover one level
    pub const SLEEP_MINUTES_PER_LEVEL: u32 = 30;
}

/// Hunger family limits
pub mod hunger {
    /// Starving
    pub const MIN: i32 = 0;
    /// Stuffed
    pub const MAX: i32 = 3;
    /// Decay interval (in-game minutes) indexed by the current hunger level
    pub const DECAY_MINUTES: [u32; 4] = [180, 240, 360, 480];
}

/// Encumbrance family levels, from carried weight against capacity
pub mod encumbrance {
    /// Light: at most half of capacity
    pub const MIN: i32 = 0;
    /// Carrying capacity is met but not exceeded
    pub const NORMAL: i32 = 1;
    /// Overloaded: more than twice capacity
    pub const MAX: i32 = 4;
    /// Carrying capacity in weight units (5 per point of the base strength of 10)
    pub const BASE_CAPACITY: u32 = 50;
    /// Upper bound (percent of capacity) of each level below `MAX`
    pub const LEVEL_PERCENT: [u32; 4] = [50, 100, 150, 200];
}

/// Player action limits
pub mod actions {
    pub const MIN_WAIT_MINUTES: u32 = 15;
    pub const MAX_WAIT_MINUTES: u32 = 360;
    pub const MAX_REST_MINUTES: u32 = 720;
}

/// Inventory layout
pub mod inventory {
    pub const GENERAL_SLOTS: usize = 4;
    pub const BACKPACK_SLOTS: usize = 20;
    /// Equipment slot names, in display order
    pub const EQUIPMENT_SLOTS: [&str; 10] = [
        "mainHand", "offHand", "armor", "helmet", "boots", "gloves", "ring1", "ring2", "necklace",
        "cloak",
    ];
}

/// Network constants
pub mod net {
    /// Maximum size of a single framed message
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
    /// Default sync server port
    pub const DEFAULT_PORT: u16 = 7340;
    /// Default metrics port
    pub const DEFAULT_METRICS_PORT: u16 = 9090;
}

/// Session store constants
pub mod session {
    /// Inactive sessions are evicted after this long
    pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 900;
    /// Reaper wake-up interval
    pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
    pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
}
