//! Tick scheduler
//!
//! The single entry point that mutates sessions. Periodic syncs and player
//! actions both run the same pipeline under the session lock:
//!
//! 1. Validate the action against the current state (actions only)
//! 2. Turn elapsed real time into game minutes, capped, honoring pause and
//!    the idle auto-pause ceiling
//! 3. Apply the action
//! 4. Refresh location caches when a refresh boundary was crossed or the
//!    character moved
//! 5. Snapshot and diff against the last snapshot
//! 6. Store the new snapshot and build the response

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::game::actions::GameAction;
use crate::game::constants::{cache, time};
use crate::game::effects::{EffectRules, EffectTemplateStore, TickEngine, TickReport};
use crate::game::encumbrance;
use crate::game::state::{Location, SaveState};
use crate::game::world::WorldDirectory;
use crate::metrics::Metrics;
use crate::net::delta::generate_delta;
use crate::net::protocol::{ErrorKind, SyncResponse};
use crate::net::session::{Session, SessionError, SessionKey, SessionStore};
use crate::net::snapshot::Snapshot;
use crate::util::time::crossed_boundary;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl SchedulerError {
    /// Wire-level classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Session(SessionError::NotFound(_)) => ErrorKind::SessionNotFound,
            SchedulerError::Session(SessionError::CapacityExceeded(_)) => ErrorKind::Capacity,
            SchedulerError::Session(SessionError::Load(_)) | SchedulerError::Worker(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Most game minutes simulated by one request
    pub max_catchup_minutes: u32,
    /// Game minutes without a player action before accrual stops; 0 disables
    pub idle_pause_minutes: u32,
    pub real_ms_per_minute: u64,
    pub npc_refresh_minutes: u32,
    pub building_refresh_minutes: u32,
    /// Where new characters start; `None` makes unknown saves an error
    pub start_location: Option<Location>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_catchup_minutes: time::DEFAULT_MAX_CATCHUP_MINUTES,
            idle_pause_minutes: time::DEFAULT_IDLE_PAUSE_MINUTES,
            real_ms_per_minute: time::REAL_MS_PER_GAME_MINUTE,
            npc_refresh_minutes: cache::NPC_REFRESH_MINUTES,
            building_refresh_minutes: cache::BUILDING_REFRESH_MINUTES,
            start_location: None,
        }
    }
}

pub struct TickScheduler {
    store: Arc<SessionStore>,
    templates: Arc<dyn EffectTemplateStore>,
    rules: EffectRules,
    world: Arc<dyn WorldDirectory>,
    config: SchedulerConfig,
    metrics: Arc<Metrics>,
}

impl TickScheduler {
    pub fn new(
        store: Arc<SessionStore>,
        templates: Arc<dyn EffectTemplateStore>,
        world: Arc<dyn WorldDirectory>,
    ) -> Self {
        Self {
            store,
            templates,
            rules: EffectRules::default(),
            world,
            config: SchedulerConfig::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_rules(mut self, rules: EffectRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn engine(&self) -> TickEngine<'_> {
        TickEngine::new(self.templates.as_ref(), &self.rules)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load (or create) a session and return the full initial view
    pub fn open(&self, key: &SessionKey, now: Instant) -> Result<SyncResponse, SchedulerError> {
        let loaded = self.store.get_or_create(key, now, |s| self.prepare(s));
        let (handle, created) = match (loaded, &self.config.start_location) {
            (Err(SessionError::NotFound(_)), Some(location)) => {
                info!("Creating new save {}", key);
                let state = SaveState::new(key.player.clone(), location.clone());
                self.store.create(key, state, now, |s| self.prepare(s))?
            }
            (loaded, _) => loaded?,
        };
        if created {
            Metrics::incr(&self.metrics.sessions_loaded);
            self.update_active();
        }

        let mut session = handle.lock();
        if session.evicted {
            return Err(SessionError::NotFound(key.to_string()).into());
        }
        Ok(self.full_view(&mut session, now))
    }

    /// Discard unsaved in-memory changes and start over from the repository
    pub fn reload(&self, key: &SessionKey, now: Instant) -> Result<SyncResponse, SchedulerError> {
        let handle = self.store.reload(key, now, |s| self.prepare(s))?;
        Metrics::incr(&self.metrics.sessions_loaded);
        let mut session = handle.lock();
        Ok(self.full_view(&mut session, now))
    }

    /// Persist and unload; false when the session was not loaded
    pub fn close(&self, key: &SessionKey) -> Result<bool, SchedulerError> {
        let unloaded = self.store.unload(key)?;
        if unloaded {
            Metrics::incr(&self.metrics.sessions_unloaded);
            self.update_active();
        }
        Ok(unloaded)
    }

    /// Persist and drop idle sessions; returns how many were evicted
    pub fn evict_idle(&self, timeout: std::time::Duration, now: Instant) -> usize {
        let evicted = self.store.evict_idle(timeout, now).len();
        if evicted > 0 {
            self.metrics
                .sessions_evicted
                .fetch_add(evicted as u64, std::sync::atomic::Ordering::Relaxed);
            self.update_active();
        }
        evicted
    }

    fn update_active(&self) {
        self.metrics
            .sessions_active
            .store(self.store.len() as u64, std::sync::atomic::Ordering::Relaxed);
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Periodic sync: accrue elapsed time and report what changed
    pub fn sync(&self, key: &SessionKey, now: Instant) -> Result<SyncResponse, SchedulerError> {
        Metrics::incr(&self.metrics.sync_requests);
        let started = Instant::now();
        let engine = self.engine();

        let response = self.store.with_session(key, |session| {
            session.touch(now);
            let report = self.catch_up(session, now, &engine);
            self.refresh_caches(session, false);
            self.respond(session, true, None, report, false)
        })?;

        self.metrics.record_batch_time(started.elapsed());
        Ok(response)
    }

    /// Validate and apply one player action
    ///
    /// A rejected action leaves the session untouched and comes back as an
    /// unsuccessful response, not an error.
    pub fn perform(
        &self,
        key: &SessionKey,
        action: &GameAction,
        now: Instant,
    ) -> Result<SyncResponse, SchedulerError> {
        Metrics::incr(&self.metrics.action_requests);
        let started = Instant::now();
        let engine = self.engine();

        let response = self.store.with_session(key, |session| {
            if let Err(e) = action.check(&session.state, self.world.as_ref(), &engine) {
                debug!("Rejected {} for {}: {}", action.name(), session.key, e);
                Metrics::incr(&self.metrics.actions_rejected);
                return SyncResponse {
                    success: false,
                    message: Some(e.to_string()),
                    time_of_day: session.state.time_of_day,
                    current_day: session.state.current_day,
                    auto_paused: session.auto_paused,
                    ..SyncResponse::default()
                };
            }

            session.touch(now);
            let mut report = self.catch_up(session, now, &engine);

            let mut success = true;
            let mut message = None;
            let mut force_resync = false;
            let mut location_changed = false;
            match action.apply(&mut session.state, self.world.as_ref(), &engine) {
                Ok(outcome) => {
                    message = outcome.message;
                    force_resync = outcome.force_resync;
                    location_changed = outcome.location_changed;
                    report.merge(outcome.report);
                }
                Err(e) => {
                    // Time may have moved during catch-up and closed a door
                    Metrics::incr(&self.metrics.actions_rejected);
                    success = false;
                    message = Some(e.to_string());
                }
            }

            match action {
                GameAction::Pause => session.paused = true,
                GameAction::Resume => session.paused = false,
                _ => {}
            }
            if action.counts_as_activity() {
                session.auto_paused = false;
                session.last_action_minute = session.state.absolute_minutes();
            }

            self.refresh_caches(session, location_changed);
            self.respond(session, success, message, report, force_resync)
        })?;

        self.metrics.record_batch_time(started.elapsed());
        Ok(response)
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// First-load preparation, run before the session is visible
    fn prepare(&self, session: &mut Session) {
        let engine = self.engine();
        let mut report = engine.initialize(&mut session.state);
        report.merge(encumbrance::reevaluate(
            &mut session.state,
            self.world.as_ref(),
            &engine,
        ));
        if !report.errors.is_empty() {
            self.metrics.template_errors.fetch_add(
                report.errors.len() as u64,
                std::sync::atomic::Ordering::Relaxed,
            );
        }
        self.refresh_caches(session, true);
        session.reset_snapshot();
    }

    /// Turn real time since the last request into game minutes
    fn catch_up(&self, session: &mut Session, now: Instant, engine: &TickEngine<'_>) -> TickReport {
        let elapsed = now.saturating_duration_since(session.last_processed);
        session.last_processed = session.last_processed.max(now);

        if !session.is_accruing() {
            session.carry_ms = 0;
            return TickReport::default();
        }

        let ms_per_minute = self.config.real_ms_per_minute.max(1);
        let total_ms = elapsed.as_millis() as u64 + session.carry_ms;
        let mut minutes = total_ms / ms_per_minute;
        session.carry_ms = total_ms % ms_per_minute;

        let cap = self.config.max_catchup_minutes as u64;
        if minutes > cap {
            debug!(
                "Capping catch-up for {} at {} of {} minutes",
                session.key, cap, minutes
            );
            minutes = cap;
            session.carry_ms = 0;
        }

        let mut auto_pause = false;
        if self.config.idle_pause_minutes > 0 {
            let idle = session
                .state
                .absolute_minutes()
                .saturating_sub(session.last_action_minute);
            let allowance = (self.config.idle_pause_minutes as u64).saturating_sub(idle);
            if minutes >= allowance {
                minutes = allowance;
                auto_pause = true;
            }
        }

        let report = engine.advance(&mut session.state, minutes as u32);
        if auto_pause {
            session.auto_paused = true;
            session.carry_ms = 0;
            Metrics::incr(&self.metrics.auto_pauses);
            info!(
                "Session {} auto-paused after {} idle minutes",
                session.key, self.config.idle_pause_minutes
            );
        }
        report
    }

    fn refresh_caches(&self, session: &mut Session, force: bool) {
        let minute = session.state.absolute_minutes();
        let time_of_day = session.state.time_of_day;

        if force || crossed_boundary(session.npcs_refreshed_at, minute, self.config.npc_refresh_minutes) {
            session.npcs = self.world.npcs_present(&session.state.location, time_of_day);
            session.npcs_refreshed_at = minute;
        }
        if force
            || crossed_boundary(
                session.buildings_refreshed_at,
                minute,
                self.config.building_refresh_minutes,
            )
        {
            session.buildings = self.world.building_states(&session.state.location, time_of_day);
            session.buildings_refreshed_at = minute;
        }
    }

    /// Diff, store the new baseline and build the response
    fn respond(
        &self,
        session: &mut Session,
        success: bool,
        message: Option<String>,
        report: TickReport,
        force_resync: bool,
    ) -> SyncResponse {
        let snapshot = session.snapshot();
        let delta = generate_delta(&session.last_snapshot, &snapshot);
        session.last_snapshot = snapshot;

        self.record_report(&report);
        self.metrics.record_delta(delta.section_count());
        if report.ticks > 0 {
            debug!(
                "Session {} advanced {} minutes, {} delta sections",
                session.key,
                report.ticks,
                delta.section_count()
            );
        }

        SyncResponse {
            success,
            message,
            delta: (!delta.is_empty()).then_some(delta),
            time_of_day: session.state.time_of_day,
            current_day: session.state.current_day,
            messages: report.visible_messages().map(str::to_string).collect(),
            errors: report.errors.iter().map(|e| e.to_string()).collect(),
            force_resync,
            auto_paused: session.auto_paused,
        }
    }

    /// Everything the client can see, as a delta against an empty view
    fn full_view(&self, session: &mut Session, now: Instant) -> SyncResponse {
        session.touch(now);
        let report = self.catch_up(session, now, &self.engine());
        self.refresh_caches(session, false);

        let snapshot = session.snapshot();
        let delta = generate_delta(&Snapshot::default(), &snapshot);
        session.last_snapshot = snapshot;
        self.record_report(&report);

        SyncResponse {
            success: true,
            message: None,
            delta: Some(delta),
            time_of_day: session.state.time_of_day,
            current_day: session.state.current_day,
            messages: report.visible_messages().map(str::to_string).collect(),
            errors: report.errors.iter().map(|e| e.to_string()).collect(),
            force_resync: true,
            auto_paused: session.auto_paused,
        }
    }

    fn record_report(&self, report: &TickReport) {
        use std::sync::atomic::Ordering;
        self.metrics
            .ticks_processed
            .fetch_add(report.ticks as u64, Ordering::Relaxed);
        self.metrics
            .template_errors
            .fetch_add(report.errors.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::applier::DeltaApplier;
    use crate::game::effects::TemplateCatalog;
    use crate::game::state::{ActiveEffect, InventorySlot, SlotContainer};
    use crate::game::world::StaticWorld;
    use crate::net::repository::MemoryRepository;
    use std::thread;
    use std::time::Duration;

    fn key() -> SessionKey {
        SessionKey::new("p1", "slot-a")
    }

    fn create_save() -> SaveState {
        SaveState::new("Tamsin", Location::new("millhaven", "market"))
    }

    fn create_scheduler_with(state: SaveState, config: SchedulerConfig) -> TickScheduler {
        let repo = Arc::new(MemoryRepository::new().with_save(key(), state));
        let store = Arc::new(SessionStore::new(repo, 100));
        TickScheduler::new(
            store,
            Arc::new(TemplateCatalog::builtin()),
            Arc::new(StaticWorld::sample()),
        )
        .with_config(config)
    }

    fn create_scheduler(state: SaveState) -> TickScheduler {
        create_scheduler_with(state, SchedulerConfig::default())
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_open_returns_full_view() {
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();

        let response = scheduler.open(&key(), now).unwrap();

        assert!(response.success);
        assert!(response.force_resync);
        let delta = response.delta.unwrap();
        let character = delta.character.unwrap();
        assert_eq!(character.time_of_day, Some(480));
        assert_eq!(character.current_day, Some(1));
        assert!(delta.location.is_some());
        // Accumulation effects exist after initialization
        let effects = delta.effects.unwrap();
        assert!(effects.changed.contains_key("fatigue-accumulation"));
        assert!(effects.changed.contains_key("hunger-accumulation"));
    }

    #[test]
    fn test_open_unknown_save_without_start_location() {
        let scheduler = create_scheduler(create_save());
        let result = scheduler.open(&SessionKey::new("nobody", "x"), Instant::now());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[test]
    fn test_open_unknown_save_creates_character() {
        let config = SchedulerConfig {
            start_location: Some(Location::new("millhaven", "market")),
            ..SchedulerConfig::default()
        };
        let scheduler = create_scheduler_with(create_save(), config);
        let fresh = SessionKey::new("p9", "new-game");

        let response = scheduler.open(&fresh, Instant::now()).unwrap();

        assert!(response.success);
        assert!(scheduler.store().contains(&fresh));
    }

    #[test]
    fn test_sync_unknown_session() {
        let scheduler = create_scheduler(create_save());
        let err = scheduler.sync(&key(), Instant::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[test]
    fn test_empty_sync_has_no_delta() {
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();

        let response = scheduler.sync(&key(), now + Duration::from_millis(400)).unwrap();

        assert!(response.success);
        assert!(response.delta.is_none());
        assert_eq!(response.time_of_day, 480);
    }

    #[test]
    fn test_sync_accrues_real_time() {
        let scheduler = create_scheduler(create_save());
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        let response = scheduler.sync(&key(), start + Duration::from_millis(2500)).unwrap();
        assert_eq!(response.time_of_day, 482);
        let delta = response.delta.unwrap();
        assert_eq!(delta.character.unwrap().time_of_day, Some(482));

        // The half minute carries over
        let response = scheduler.sync(&key(), start + Duration::from_millis(3000)).unwrap();
        assert_eq!(response.time_of_day, 483);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let scheduler = create_scheduler(create_save());
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        let response = scheduler.sync(&key(), start + secs(10_000)).unwrap();
        assert_eq!(response.time_of_day, 480 + time::DEFAULT_MAX_CATCHUP_MINUTES);
    }

    #[test]
    fn test_wait_across_midnight() {
        let mut state = create_save();
        state.time_of_day = 1430;
        let scheduler = create_scheduler(state);
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();

        let response = scheduler
            .perform(&key(), &GameAction::Wait { minutes: 20 }, now)
            .unwrap();

        assert!(response.success);
        assert!(response.force_resync);
        assert_eq!((response.time_of_day, response.current_day), (10, 2));
        let character = response.delta.unwrap().character.unwrap();
        assert_eq!(character.time_of_day, Some(10));
        assert_eq!(character.current_day, Some(2));
        assert_eq!(response.message.as_deref(), Some("You waited 20 minutes."));
    }

    #[test]
    fn test_concurrent_waits_are_additive() {
        let scheduler = Arc::new(create_scheduler(create_save()));
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                thread::spawn(move || {
                    scheduler
                        .perform(&key(), &GameAction::Wait { minutes: 30 }, now)
                        .unwrap()
                })
            })
            .collect();
        let mut times: Vec<u32> = workers
            .into_iter()
            .map(|w| w.join().unwrap().time_of_day)
            .collect();
        times.sort_unstable();

        // Each request saw the previous one's result
        assert_eq!(times, vec![510, 540, 570, 600]);
    }

    #[test]
    fn test_invalid_action_leaves_state_untouched() {
        let scheduler = create_scheduler(create_save());
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        // Real time passed, but the rejected request must not accrue it
        let response = scheduler
            .perform(&key(), &GameAction::Wait { minutes: 5 }, start + secs(30))
            .unwrap();
        assert!(!response.success);
        assert!(response.delta.is_none());
        assert_eq!(response.time_of_day, 480);

        let response = scheduler
            .perform(
                &key(),
                &GameAction::UseItem {
                    container: SlotContainer::General,
                    slot: 0,
                },
                start + secs(30),
            )
            .unwrap();
        assert!(!response.success);

        let tod = scheduler
            .store()
            .with_session(&key(), |s| s.state.time_of_day)
            .unwrap();
        assert_eq!(tod, 480);
    }

    #[test]
    fn test_use_item_emits_quantity_only() {
        let mut state = create_save();
        state.general_slots[1] = InventorySlot::holding("bread", 3);
        state.hunger = 1;
        let scheduler = create_scheduler(state);
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();

        let response = scheduler
            .perform(
                &key(),
                &GameAction::UseItem {
                    container: SlotContainer::General,
                    slot: 1,
                },
                now,
            )
            .unwrap();

        assert!(response.success);
        let delta = response.delta.unwrap();
        let slot = &delta.inventory.unwrap().general_slots[&1];
        assert_eq!(slot.quantity, Some(2));
        assert!(slot.item_id.is_none());
        assert!(delta.character.unwrap().hunger.unwrap() > 1);
    }

    #[test]
    fn test_use_item_reevaluates_encumbrance() {
        let mut state = create_save();
        state.hunger = 1;
        state.backpack_slots[0] = InventorySlot::holding("iron-ingot", 5);
        state.general_slots[0] = InventorySlot::holding("travel-ration", 1);
        let scheduler = create_scheduler(state);
        let now = Instant::now();

        let opened = scheduler.open(&key(), now).unwrap();
        let effects = opened.delta.unwrap().effects.unwrap().changed;
        assert!(effects.contains_key("encumbrance-overweight"));

        // Eating the ration drops the load back to capacity
        let response = scheduler
            .perform(
                &key(),
                &GameAction::UseItem {
                    container: SlotContainer::General,
                    slot: 0,
                },
                now,
            )
            .unwrap();

        assert!(response.success);
        let changed = response.delta.unwrap().effects.unwrap().changed;
        assert_eq!(changed.get("encumbrance-overweight"), Some(&None));
        let level = scheduler
            .store()
            .with_session(&key(), |s| s.state.encumbrance)
            .unwrap();
        assert_eq!(level, 1);
    }

    #[test]
    fn test_move_refreshes_npcs() {
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();
        let opened = scheduler.open(&key(), now).unwrap();
        let mut view = Snapshot::default();
        view.apply(&opened.delta.unwrap());

        let response = scheduler
            .perform(
                &key(),
                &GameAction::Move {
                    city: None,
                    district: "market".to_string(),
                    building: Some("bakery".to_string()),
                },
                now,
            )
            .unwrap();

        assert!(response.success, "{:?}", response.message);
        let delta = response.delta.unwrap();
        assert_eq!(
            delta.location.as_ref().and_then(|l| l.building.as_deref()),
            Some("bakery")
        );
        view.apply(&delta);

        let expected = scheduler
            .store()
            .with_session(&key(), |s| s.snapshot())
            .unwrap();
        assert_eq!(view, expected);
    }

    #[test]
    fn test_idle_auto_pause_and_resume() {
        let config = SchedulerConfig {
            max_catchup_minutes: 1000,
            ..SchedulerConfig::default()
        };
        let scheduler = create_scheduler_with(create_save(), config);
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        let response = scheduler.sync(&key(), start + secs(400)).unwrap();
        assert!(response.auto_paused);
        assert_eq!(response.time_of_day, 480 + 360);

        let response = scheduler.sync(&key(), start + secs(500)).unwrap();
        assert!(response.auto_paused);
        assert!(response.delta.is_none());

        let response = scheduler
            .perform(&key(), &GameAction::Resume, start + secs(600))
            .unwrap();
        assert!(!response.auto_paused);

        // Paused time is discarded, accrual restarts from the resume
        let response = scheduler.sync(&key(), start + secs(610)).unwrap();
        assert_eq!(response.time_of_day, 480 + 360 + 10);
    }

    #[test]
    fn test_explicit_pause_stops_accrual() {
        let scheduler = create_scheduler(create_save());
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        scheduler.perform(&key(), &GameAction::Pause, start + secs(5)).unwrap();
        let response = scheduler.sync(&key(), start + secs(65)).unwrap();
        assert_eq!(response.time_of_day, 485);
        assert!(!response.auto_paused);
    }

    #[test]
    fn test_polling_keeps_session_loaded() {
        let scheduler = create_scheduler(create_save());
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        // No actions, only the client's periodic sync
        for t in (5..=1000).step_by(5) {
            scheduler.sync(&key(), start + secs(t)).unwrap();
        }

        assert_eq!(scheduler.evict_idle(secs(900), start + secs(1000)), 0);
        let response = scheduler.sync(&key(), start + secs(1005)).unwrap();
        assert!(response.success);
        // Not acting still stops the clock
        assert!(response.auto_paused);

        // A client that stops polling is still evicted
        assert_eq!(scheduler.evict_idle(secs(900), start + secs(1906)), 1);
        assert_eq!(
            scheduler.sync(&key(), start + secs(1910)).unwrap_err().kind(),
            ErrorKind::SessionNotFound
        );
    }

    #[test]
    fn test_missing_template_reported_and_retained() {
        let mut state = create_save();
        state.active_effects.push(ActiveEffect::new("ghost-effect", 0, 0));
        let scheduler = create_scheduler(state);
        let start = Instant::now();
        scheduler.open(&key(), start).unwrap();

        let response = scheduler.sync(&key(), start + secs(3)).unwrap();

        assert!(response.success);
        assert_eq!(response.time_of_day, 483);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].contains("ghost-effect"));
        let retained = scheduler
            .store()
            .with_session(&key(), |s| s.state.has_effect("ghost-effect"))
            .unwrap();
        assert!(retained);
    }

    #[test]
    fn test_close_persists_and_requires_reopen() {
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();
        scheduler.perform(&key(), &GameAction::Wait { minutes: 60 }, now).unwrap();

        assert!(scheduler.close(&key()).unwrap());
        assert!(scheduler.sync(&key(), now).is_err());

        let reopened = scheduler.open(&key(), now).unwrap();
        assert_eq!(reopened.time_of_day, 540);
    }

    #[test]
    fn test_reload_discards_unsaved_progress() {
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();
        scheduler.perform(&key(), &GameAction::Wait { minutes: 60 }, now).unwrap();

        let response = scheduler.reload(&key(), now).unwrap();
        assert_eq!(response.time_of_day, 480);
    }

    #[test]
    fn test_metrics_counted() {
        use std::sync::atomic::Ordering;
        let scheduler = create_scheduler(create_save());
        let now = Instant::now();
        scheduler.open(&key(), now).unwrap();
        scheduler.sync(&key(), now).unwrap();
        scheduler.perform(&key(), &GameAction::Wait { minutes: 30 }, now).unwrap();

        let metrics = scheduler.metrics();
        assert_eq!(metrics.sessions_loaded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.sync_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.action_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deltas_empty.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ticks_processed.load(Ordering::Relaxed), 30);
    }
}
