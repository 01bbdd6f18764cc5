use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, Millis, SystemClock, HOUR_MS, MINUTE_MS, SECOND_MS};
use crate::hysteresis::SchmittTrigger;
use crate::store::{keys, load_json, KeyValueStore};
use crate::throttle::RateLimiter;
use crate::window::EventLog;

/// Thresholds and cadences that shape tracker behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerPolicy {
    /// Idle gap (elapsed minus active) that wipes the whole session
    pub idle_reset_ms: Millis,
    /// No events for this long pauses active-time accounting
    pub pause_after_ms: Millis,
    pub high_tempo_per_min: usize,
    pub low_tempo_per_min: usize,
    pub low_tempo_confirm_ms: Millis,
    pub boost_on: usize,
    pub boost_off: usize,
    pub boost_window_ms: Millis,
    pub log_cap: usize,
    pub log_trim_to: usize,
    pub retention_ms: Millis,
    pub prune_every_ms: Millis,
    pub persist_every_ms: Millis,
    /// Tick gaps above this (sleep, suspended host) count as zero
    pub max_tick_gap_ms: Millis,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            idle_reset_ms: 30 * MINUTE_MS,
            pause_after_ms: 10 * SECOND_MS,
            high_tempo_per_min: 80,
            low_tempo_per_min: 70,
            low_tempo_confirm_ms: 3 * SECOND_MS,
            boost_on: 30,
            boost_off: 28,
            boost_window_ms: 20 * SECOND_MS,
            log_cap: EventLog::DEFAULT_CAP,
            log_trim_to: EventLog::DEFAULT_TRIM_TO,
            retention_ms: HOUR_MS,
            prune_every_ms: 20 * SECOND_MS,
            persist_every_ms: 15 * SECOND_MS,
            max_tick_gap_ms: 30 * SECOND_MS,
        }
    }
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub total_count: u64,
    pub c1: usize,
    pub c5: usize,
    pub c15: usize,
    pub c60: usize,
    pub active_time_ms: Millis,
    pub elapsed_session_ms: Millis,
    pub current_streak_ms: Millis,
    pub best_streak_ms: Millis,
    pub boost_active: bool,
    pub warning_active: bool,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Updated,
    /// The idle gap crossed the threshold and everything was cleared
    IdleReset,
}

/// Rolling annotation-rate tracker.
///
/// Owns the event log plus all session, streak, boost and warning state.
/// Mutations are written to the store through a rate limiter; store failures
/// are logged and the in-memory state stays authoritative.
pub struct Tracker<C: Clock = SystemClock> {
    policy: TrackerPolicy,
    clock: C,
    store: Arc<dyn KeyValueStore>,

    log: EventLog,
    session_started_at: Option<Millis>,
    elapsed_session_ms: Millis,
    active_time_ms: Millis,
    last_tick_at: Millis,
    last_event_at: Option<Millis>,
    visible: bool,
    paused: bool,

    current_streak_ms: Millis,
    best_streak_ms: Millis,
    boost: SchmittTrigger,
    warning_active: bool,
    was_high_tempo: bool,
    low_tempo_since: Option<Millis>,

    current_target: Option<String>,
    counted_current: bool,

    prune_limiter: RateLimiter,
    persist_limiter: RateLimiter,
}

impl<C: Clock> Tracker<C> {
    /// Fresh tracker that ignores whatever is persisted.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: C, policy: TrackerPolicy) -> Self {
        let now = clock.now_ms();
        Self {
            log: EventLog::new(policy.log_cap, policy.log_trim_to),
            session_started_at: None,
            elapsed_session_ms: 0,
            active_time_ms: 0,
            last_tick_at: now,
            last_event_at: None,
            visible: true,
            paused: true,
            current_streak_ms: 0,
            best_streak_ms: 0,
            boost: SchmittTrigger::new(policy.boost_on, policy.boost_off),
            warning_active: false,
            was_high_tempo: false,
            low_tempo_since: None,
            current_target: None,
            counted_current: false,
            prune_limiter: RateLimiter::new(policy.prune_every_ms),
            persist_limiter: RateLimiter::primed(policy.persist_every_ms, now),
            policy,
            clock,
            store,
        }
    }

    /// Tracker restored from the store. Malformed values fall back to defaults;
    /// boost, warning and pause state always start cleared.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: C, policy: TrackerPolicy) -> Self {
        let mut tracker = Self::new(store, clock, policy);
        let store = Arc::clone(&tracker.store);

        let number = |key: &str| -> Millis { load_json::<Millis, _>(&*store, key).unwrap_or(0) };

        let total = number(keys::TOTAL_COUNT);
        let timestamps: Vec<Millis> = load_json(&*store, keys::EVENT_LOG).unwrap_or_default();
        // the lifetime total never trails the retained log
        let logged = timestamps.len() as u64;
        tracker.log = EventLog::restore(
            timestamps,
            total.max(logged),
            tracker.policy.log_cap,
            tracker.policy.log_trim_to,
        )
        .or_else(|| {
            debug!("persisted event log out of order, starting empty");
            EventLog::restore(
                Vec::new(),
                total,
                tracker.policy.log_cap,
                tracker.policy.log_trim_to,
            )
        })
        .unwrap_or_default();

        tracker.active_time_ms = number(keys::ACTIVE_TIME);
        tracker.elapsed_session_ms = number(keys::SESSION_TIME);
        tracker.session_started_at = Some(number(keys::SESSION_START)).filter(|&t| t > 0);
        tracker.current_streak_ms = number(keys::STREAK_CURRENT);
        tracker.best_streak_ms = number(keys::STREAK_BEST).max(tracker.current_streak_ms);
        tracker.last_event_at = Some(number(keys::LAST_CLICK)).filter(|&t| t > 0);

        if tracker.session_started_at.is_none() {
            tracker.elapsed_session_ms = 0;
        }

        debug!(
            events = tracker.log.len(),
            total = tracker.log.total_count(),
            "tracker state restored"
        );
        tracker
    }

    pub fn policy(&self) -> &TrackerPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record one annotation event at the current instant.
    pub fn record_event(&mut self) {
        let now = self.clock.now_ms();
        self.log.push(now);
        self.counted_current = true;
        self.register_activity_at(now);
    }

    /// Record an event unless the current target was already counted.
    pub fn record_event_once(&mut self) -> bool {
        if self.counted_current {
            return false;
        }
        self.record_event();
        true
    }

    /// Point the gate at a new annotation target. Returns true when it changed.
    pub fn observe_target(&mut self, target: &str) -> bool {
        if self.current_target.as_deref() == Some(target) {
            return false;
        }
        self.current_target = Some(target.to_string());
        self.counted_current = false;
        true
    }

    /// Remove the newest event to correct an accidental double count.
    pub fn undo_last_event(&mut self) {
        self.log.pop();
        self.counted_current = false;
        let now = self.clock.now_ms();
        self.persist(now, true);
    }

    /// Refresh "last activity" and start the session if none is running.
    pub fn register_activity(&mut self) {
        let now = self.clock.now_ms();
        self.register_activity_at(now);
    }

    fn register_activity_at(&mut self, now: Millis) {
        self.last_event_at = Some(now);
        if self.session_started_at.is_none() {
            self.session_started_at = Some(now);
            self.elapsed_session_ms = 0;
            // time before the session never counts as active
            self.last_tick_at = now;
            info!("session started");
            self.persist(now, true);
        }
    }

    pub fn count_in_window(&self, window_ms: Millis, now: Millis) -> usize {
        self.log.count_in_window(window_ms, now)
    }

    /// Drop events older than `retention_ms`, at most once per prune interval.
    pub fn prune_older_than(&mut self, retention_ms: Millis, now: Millis) -> usize {
        if !self.prune_limiter.try_acquire(now) {
            return 0;
        }
        self.log.prune_before(retention_ms, now)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Periodic state update. Call on a fixed cadence; never re-entered.
    pub fn tick(&mut self, now: Millis) -> TickOutcome {
        let mut delta = now.saturating_sub(self.last_tick_at);
        if delta > self.policy.max_tick_gap_ms {
            delta = 0;
        }
        self.last_tick_at = now;

        let paused = match (self.session_started_at, self.last_event_at) {
            (None, _) | (_, None) => true,
            (Some(_), Some(last)) => {
                !self.visible || now.saturating_sub(last) > self.policy.pause_after_ms
            }
        };
        self.paused = paused;

        if !paused {
            self.active_time_ms += delta;
        }
        if let Some(started) = self.session_started_at {
            self.elapsed_session_ms = now.saturating_sub(started);
            let idle_gap = self.elapsed_session_ms.saturating_sub(self.active_time_ms);
            if idle_gap > self.policy.idle_reset_ms {
                info!(idle_gap_ms = idle_gap, "idle threshold crossed, resetting session");
                self.reset_all();
                return TickOutcome::IdleReset;
            }
        }

        let c1 = self.count_in_window(MINUTE_MS, now);
        let c20 = self.count_in_window(self.policy.boost_window_ms, now);

        if paused {
            self.boost.force_off();
            self.was_high_tempo = false;
            self.low_tempo_since = None;
            self.warning_active = false;
        } else {
            self.update_streak(c1, delta);
            self.boost.update(c20);
            self.update_warning(c1, now);
        }

        self.persist(now, false);
        TickOutcome::Updated
    }

    fn update_streak(&mut self, c1: usize, delta: Millis) {
        if c1 >= self.policy.high_tempo_per_min {
            self.current_streak_ms += delta;
            self.best_streak_ms = self.best_streak_ms.max(self.current_streak_ms);
        } else {
            self.current_streak_ms = 0;
        }
    }

    fn update_warning(&mut self, c1: usize, now: Millis) {
        if c1 >= self.policy.high_tempo_per_min {
            self.was_high_tempo = true;
            self.low_tempo_since = None;
            self.warning_active = false;
        } else if c1 < self.policy.low_tempo_per_min && self.was_high_tempo {
            let since = *self.low_tempo_since.get_or_insert(now);
            if now.saturating_sub(since) >= self.policy.low_tempo_confirm_ms {
                self.warning_active = true;
            }
        } else {
            self.low_tempo_since = None;
            self.warning_active = false;
        }
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let now = self.clock.now_ms();
        self.snapshot_at(now)
    }

    pub fn snapshot_at(&mut self, now: Millis) -> Snapshot {
        self.prune_older_than(self.policy.retention_ms, now);
        Snapshot {
            total_count: self.log.total_count(),
            c1: self.count_in_window(MINUTE_MS, now),
            c5: self.count_in_window(5 * MINUTE_MS, now),
            c15: self.count_in_window(15 * MINUTE_MS, now),
            c60: self.count_in_window(HOUR_MS, now),
            active_time_ms: self.active_time_ms,
            elapsed_session_ms: self.elapsed_session_ms,
            current_streak_ms: self.current_streak_ms,
            best_streak_ms: self.best_streak_ms,
            boost_active: self.boost.is_active(),
            warning_active: self.warning_active,
            paused: self.paused,
        }
    }

    /// Clear every field and the persisted tracker keys.
    pub fn reset_all(&mut self) {
        let now = self.clock.now_ms();
        self.log.clear();
        self.session_started_at = None;
        self.elapsed_session_ms = 0;
        self.active_time_ms = 0;
        self.last_tick_at = now;
        self.last_event_at = None;
        self.paused = true;
        self.current_streak_ms = 0;
        self.best_streak_ms = 0;
        self.boost.force_off();
        self.warning_active = false;
        self.was_high_tempo = false;
        self.low_tempo_since = None;
        self.current_target = None;
        self.counted_current = false;
        self.prune_limiter.reset();

        for key in keys::TRACKER {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "failed to clear stored tracker key");
            }
        }
    }

    /// Write state now regardless of the throttle.
    pub fn flush(&mut self) {
        let now = self.clock.now_ms();
        self.persist(now, true);
    }

    pub fn has_session(&self) -> bool {
        self.session_started_at.is_some()
    }

    pub fn session_started_at(&self) -> Option<Millis> {
        self.session_started_at
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    fn persist(&mut self, now: Millis, force: bool) {
        if force {
            self.persist_limiter.mark(now);
        } else if !self.persist_limiter.try_acquire(now) {
            return;
        }

        let timestamps = match serde_json::to_string(self.log.timestamps()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode event log");
                return;
            }
        };
        let entries = [
            (keys::EVENT_LOG, timestamps),
            (keys::TOTAL_COUNT, self.log.total_count().to_string()),
            (keys::ACTIVE_TIME, self.active_time_ms.to_string()),
            (keys::SESSION_TIME, self.elapsed_session_ms.to_string()),
            (
                keys::SESSION_START,
                self.session_started_at.unwrap_or(0).to_string(),
            ),
            (keys::STREAK_CURRENT, self.current_streak_ms.to_string()),
            (keys::STREAK_BEST, self.best_streak_ms.to_string()),
            (keys::LAST_CLICK, self.last_event_at.unwrap_or(0).to_string()),
        ];
        if let Err(e) = self.store.set_many(&entries) {
            warn!(error = %e, "tracker state save failed; keeping in-memory state");
        }
    }
}
