//! Locally extrapolated game clock
//!
//! Holds the last authoritative `(game minute, real instant)` pair and
//! projects it forward at the fixed real-ms-per-game-minute rate. Re-anchoring
//! jumps straight to the authoritative value; it happens only on meaningful
//! drift, a day change or an explicit force.

use std::time::Instant;

use crate::game::constants::{sync, time};
use crate::util::time::{absolute_minutes, from_absolute};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// Display jumped to the authoritative value
    Resynced,
    /// Drift was below tolerance; display left as is
    WithinTolerance,
    /// Older than a value already applied; ignored
    Stale,
}

#[derive(Debug, Clone)]
pub struct InterpolatedClock {
    anchor_minutes: f64,
    anchor_at: Instant,
    paused: bool,
    latest: Option<(u64, u32)>,
    tolerance: f64,
    ms_per_minute: f64,
}

impl InterpolatedClock {
    pub fn new(time_of_day: u32, current_day: u32, now: Instant) -> Self {
        Self {
            anchor_minutes: absolute_minutes(current_day, time_of_day) as f64,
            anchor_at: now,
            paused: false,
            latest: Some((absolute_minutes(current_day, time_of_day), current_day)),
            tolerance: sync::DRIFT_TOLERANCE_MINUTES,
            ms_per_minute: time::REAL_MS_PER_GAME_MINUTE as f64,
        }
    }

    pub fn with_tolerance(mut self, minutes: f64) -> Self {
        self.tolerance = minutes;
        self
    }

    pub fn with_rate(mut self, real_ms_per_minute: f64) -> Self {
        self.ms_per_minute = real_ms_per_minute.max(1.0);
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Extrapolated absolute game minutes, fractional
    pub fn display_minutes(&self, now: Instant) -> f64 {
        if self.paused {
            return self.anchor_minutes;
        }
        let elapsed_ms = now.saturating_duration_since(self.anchor_at).as_secs_f64() * 1000.0;
        self.anchor_minutes + elapsed_ms / self.ms_per_minute
    }

    /// Displayed `(time_of_day, current_day)`
    pub fn display(&self, now: Instant) -> (u32, u32) {
        let (day, time_of_day) = from_absolute(self.display_minutes(now).floor() as u64);
        (time_of_day, day)
    }

    /// Feed an authoritative time from a server response
    pub fn on_authoritative(
        &mut self,
        time_of_day: u32,
        current_day: u32,
        now: Instant,
        force: bool,
    ) -> ResyncOutcome {
        let authoritative = absolute_minutes(current_day, time_of_day);
        let previous = self.latest;

        if !force {
            if let Some((latest, _)) = previous {
                if authoritative < latest {
                    return ResyncOutcome::Stale;
                }
            }
        }
        self.latest = Some((authoritative, current_day));

        let day_changed = previous.map_or(true, |(_, day)| day != current_day);
        let drift = (self.display_minutes(now) - authoritative as f64).abs();

        if force || day_changed || drift > self.tolerance {
            self.anchor_minutes = authoritative as f64;
            self.anchor_at = now;
            ResyncOutcome::Resynced
        } else {
            ResyncOutcome::WithinTolerance
        }
    }

    /// Freeze extrapolation at the current displayed value
    pub fn pause(&mut self, now: Instant) {
        if self.paused {
            return;
        }
        self.anchor_minutes = self.display_minutes(now);
        self.anchor_at = now;
        self.paused = true;
    }

    /// Continue from the frozen value without a jump
    pub fn resume(&mut self, now: Instant) {
        if !self.paused {
            return;
        }
        self.anchor_at = now;
        self.paused = false;
    }
}
