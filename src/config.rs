use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{net, session, time};
use crate::game::state::Location;
use crate::net::scheduler::SchedulerConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port the sync server listens on
    pub port: u16,
    /// Port of the Prometheus endpoint
    pub metrics_port: u16,
    /// Maximum number of loaded sessions
    pub max_sessions: usize,
    /// Sessions without requests for this long are persisted and evicted
    pub session_idle_timeout: Duration,
    /// How often the reaper looks for idle sessions
    pub reaper_interval: Duration,
    /// Most game minutes one request may catch up on
    pub max_catchup_minutes: u32,
    /// Game minutes without an action before a session auto-pauses
    pub idle_pause_minutes: u32,
    /// Root directory of JSON save files
    pub saves_dir: PathBuf,
    /// Optional directory holding `effects.json` and `world.json`
    pub content_dir: Option<PathBuf>,
    /// Where characters for unknown saves start; unset rejects unknown saves
    pub start_location: Option<Location>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::DEFAULT_PORT,
            metrics_port: net::DEFAULT_METRICS_PORT,
            max_sessions: session::DEFAULT_MAX_SESSIONS,
            session_idle_timeout: Duration::from_secs(session::DEFAULT_IDLE_TIMEOUT_SECS),
            reaper_interval: Duration::from_secs(session::DEFAULT_REAPER_INTERVAL_SECS),
            max_catchup_minutes: time::DEFAULT_MAX_CATCHUP_MINUTES,
            idle_pause_minutes: time::DEFAULT_IDLE_PAUSE_MINUTES,
            saves_dir: PathBuf::from("saves"),
            content_dir: None,
            start_location: None,
        }
    }
}

/// Parse an env value, warning and returning `None` when it is invalid
fn parse_var<T: FromStr>(name: &str, raw: &str, valid: impl Fn(&T) -> bool, rule: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, rule);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

/// `city/district`
fn parse_location(raw: &str) -> Option<Location> {
    let (city, district) = raw.trim().split_once('/')?;
    if city.is_empty() || district.is_empty() || district.contains('/') {
        return None;
    }
    Some(Location::new(city, district))
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(raw) = lookup("PORT") {
            if let Some(port) = parse_var("PORT", &raw, |p: &u16| *p > 0, "> 0") {
                config.port = port;
            }
        }

        if let Some(raw) = lookup("METRICS_PORT") {
            if let Some(port) = parse_var("METRICS_PORT", &raw, |p: &u16| *p > 0, "> 0") {
                config.metrics_port = port;
            }
        }

        if let Some(raw) = lookup("MAX_SESSIONS") {
            let valid = |n: &usize| (1..=1_000_000).contains(n);
            if let Some(max) = parse_var("MAX_SESSIONS", &raw, valid, "1-1000000") {
                config.max_sessions = max;
            }
        }

        if let Some(raw) = lookup("SESSION_IDLE_TIMEOUT_SECS") {
            if let Some(secs) = parse_var("SESSION_IDLE_TIMEOUT_SECS", &raw, |s: &u64| *s > 0, "> 0") {
                config.session_idle_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(raw) = lookup("REAPER_INTERVAL_SECS") {
            if let Some(secs) = parse_var("REAPER_INTERVAL_SECS", &raw, |s: &u64| *s > 0, "> 0") {
                config.reaper_interval = Duration::from_secs(secs);
            }
        }

        if let Some(raw) = lookup("MAX_CATCHUP_MINUTES") {
            let valid = |m: &u32| (1..=time::MINUTES_PER_DAY).contains(m);
            if let Some(minutes) = parse_var("MAX_CATCHUP_MINUTES", &raw, valid, "1-1440") {
                config.max_catchup_minutes = minutes;
            }
        }

        if let Some(raw) = lookup("IDLE_PAUSE_MINUTES") {
            // 0 disables auto-pause
            if let Some(minutes) = parse_var("IDLE_PAUSE_MINUTES", &raw, |_: &u32| true, "a number") {
                config.idle_pause_minutes = minutes;
            }
        }

        if let Some(dir) = lookup("SAVES_DIR").filter(|d| !d.trim().is_empty()) {
            config.saves_dir = PathBuf::from(dir.trim());
        }

        if let Some(dir) = lookup("CONTENT_DIR").filter(|d| !d.trim().is_empty()) {
            config.content_dir = Some(PathBuf::from(dir.trim()));
        }

        if let Some(raw) = lookup("START_LOCATION") {
            match parse_location(&raw) {
                Some(location) => config.start_location = Some(location),
                None => tracing::warn!("Invalid START_LOCATION '{}', expected city/district", raw),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err("port and metrics_port must differ".to_string());
        }
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".to_string());
        }
        if self.max_catchup_minutes == 0 {
            return Err("max_catchup_minutes must be at least 1".to_string());
        }
        if self.reaper_interval > self.session_idle_timeout {
            return Err("reaper_interval cannot exceed session_idle_timeout".to_string());
        }
        Ok(())
    }

    /// Scheduler settings derived from this config
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_catchup_minutes: self.max_catchup_minutes,
            idle_pause_minutes: self.idle_pause_minutes,
            start_location: self.start_location.clone(),
            ..SchedulerConfig::default()
        }
    }
}
