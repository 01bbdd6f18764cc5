use itertools::Itertools;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::finished::{FinishedSet, FinishedSync};
use super::parser::parse_task_list;
use super::source::ListingSource;
use super::{finished_task_from_path, TaskBoard, TaskEntry, TaskIdCache, TaskListSettings};
use crate::clock::{Clock, Millis};
use crate::store::{keys, load_json, save_json, KeyValueStore};
use crate::throttle::RateLimiter;

#[derive(Debug, Default)]
struct ListState {
    tasks: Vec<TaskEntry>,
    fetched_at: Option<Millis>,
    /// What the most recent fetch handed back, for callers that queued behind it
    last_result: Vec<TaskEntry>,
}

#[derive(Debug)]
struct Maintenance {
    prune: RateLimiter,
    ensure_min: RateLimiter,
    full_refresh: RateLimiter,
}

/// In-memory task list backed by the store, refreshed from a [`ListingSource`].
///
/// Several handles may share one store and one [`FinishedSync`]; each behaves
/// like a separate tab of the same host.
pub struct TaskListCache<S: ListingSource> {
    source: S,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: TaskListSettings,
    ids: TaskIdCache,
    sync: FinishedSync,
    state: Mutex<ListState>,
    fetch_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    last_forced: AtomicBool,
    maintenance: Mutex<Maintenance>,
}

impl<S: ListingSource> TaskListCache<S> {
    pub fn new(
        source: S,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: TaskListSettings,
    ) -> Self {
        Self::with_sync(source, store, clock, settings, FinishedSync::new())
    }

    /// A handle that hears about (and announces) finished tasks on `sync`.
    pub fn with_sync(
        source: S,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: TaskListSettings,
        sync: FinishedSync,
    ) -> Self {
        let now = clock.now_ms();
        let maintenance = Maintenance {
            prune: RateLimiter::new(settings.prune_every_ms),
            ensure_min: RateLimiter::new(settings.ensure_min_every_ms),
            full_refresh: RateLimiter::primed(settings.full_refresh_every_ms, now),
        };
        Self {
            source,
            store,
            clock,
            settings,
            ids: TaskIdCache::default(),
            sync,
            state: Mutex::new(ListState::default()),
            fetch_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last_forced: AtomicBool::new(false),
            maintenance: Mutex::new(maintenance),
        }
    }

    pub fn settings(&self) -> &TaskListSettings {
        &self.settings
    }

    pub fn sync(&self) -> &FinishedSync {
        &self.sync
    }

    fn lock_state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Memory first, then the persisted list, then nothing. Finished tasks are
    /// always filtered out.
    pub fn get_cached_list(&self) -> Vec<TaskEntry> {
        let memory = self.lock_state().tasks.clone();
        if !memory.is_empty() {
            return self.prune_finished(memory);
        }
        self.load_cache()
    }

    fn load_cache(&self) -> Vec<TaskEntry> {
        let cached: Vec<TaskEntry> =
            load_json(self.store.as_ref(), keys::TASK_LIST).unwrap_or_default();
        self.prune_finished(cached)
    }

    fn save_cache(&self, list: &[TaskEntry]) {
        if list.is_empty() {
            return;
        }
        let keep = list.len().min(self.settings.max_cached_tasks.max(1));
        let tail = &list[list.len() - keep..];
        if let Err(e) = save_json(self.store.as_ref(), keys::TASK_LIST, tail) {
            warn!("failed to persist task list: {e}");
        }
    }

    /// Fetch and parse the listing, unless a fresh list is already in memory.
    ///
    /// Concurrent callers wait for the fetch in flight and reuse its result; a
    /// forced caller only reuses a forced fetch. Failures fall back to the stale
    /// list.
    pub async fn refresh(&self, force: bool) -> Vec<TaskEntry> {
        if !force {
            if let Some(fresh) = self.fresh_memory(self.clock.now_ms()) {
                return fresh;
            }
        }

        let seen = self.generation.load(Ordering::Acquire);
        let _gate = self.fetch_gate.lock().await;
        if self.generation.load(Ordering::Acquire) != seen
            && (!force || self.last_forced.load(Ordering::Acquire))
        {
            debug!("reusing task list fetched while waiting");
            let shared = self.lock_state().last_result.clone();
            return self.prune_finished(shared);
        }

        let result = self.fetch_and_apply(force).await;
        {
            let mut state = self.lock_state();
            state.last_result = result.clone();
        }
        self.last_forced.store(force, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// The in-memory list while it is within the TTL, re-filtered against the
    /// persisted finished set in case another handle finished something.
    fn fresh_memory(&self, now: Millis) -> Option<Vec<TaskEntry>> {
        {
            let state = self.lock_state();
            let fetched_at = state.fetched_at?;
            if state.tasks.is_empty() || now.saturating_sub(fetched_at) >= self.settings.ttl_ms {
                return None;
            }
        }
        let finished = FinishedSet::load(self.store.as_ref());
        Some(self.prune_memory_with(&finished)).filter(|tasks| !tasks.is_empty())
    }

    async fn fetch_and_apply(&self, force: bool) -> Vec<TaskEntry> {
        let html = match self.source.fetch_listing().await {
            Ok(html) => html,
            Err(e) => {
                warn!("task list refresh failed, using stale list: {e}");
                return self.fallback();
            }
        };

        let finished = FinishedSet::load(self.store.as_ref());
        let parsed = parse_task_list(
            &html,
            self.source.base_url(),
            &finished.to_lookup(),
            &self.settings.blocked_titles,
        );
        let list: Vec<TaskEntry> = finished
            .prune(parsed, &self.ids)
            .into_iter()
            .unique_by(|task| self.ids.get(&task.href).unwrap_or_else(|| task.href.clone()))
            .collect();

        let now = self.clock.now_ms();
        if !list.is_empty() {
            info!(tasks = list.len(), "task list refreshed");
            self.replace_memory(list.clone(), now);
            self.save_cache(&list);
            list
        } else if force {
            debug!("forced refresh returned no tasks");
            self.replace_memory(Vec::new(), now);
            list
        } else {
            debug!("listing had no tasks, keeping previous list");
            self.fallback()
        }
    }

    fn fallback(&self) -> Vec<TaskEntry> {
        let finished = FinishedSet::load(self.store.as_ref());
        let memory = self.prune_memory_with(&finished);
        if !memory.is_empty() {
            return memory;
        }
        self.load_cache()
    }

    fn replace_memory(&self, tasks: Vec<TaskEntry>, now: Millis) {
        let mut state = self.lock_state();
        state.tasks = tasks;
        state.fetched_at = Some(now);
    }

    /// Drop finished and href-less tasks from `list`.
    pub fn prune_finished(&self, list: Vec<TaskEntry>) -> Vec<TaskEntry> {
        FinishedSet::load(self.store.as_ref()).prune(list, &self.ids)
    }

    /// Record `task_id` as done and tell the other handles. Returns false when
    /// it was already known.
    pub fn mark_finished(&self, task_id: &str) -> bool {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return false;
        }
        let mut finished = FinishedSet::load(self.store.as_ref());
        if !finished.insert(task_id) {
            return false;
        }
        if let Err(e) = finished.save(self.store.as_ref(), self.settings.max_finished_ids) {
            warn!("failed to persist finished tasks: {e}");
        }
        info!(task_id, "task marked finished");

        self.sync.notify();
        self.prune_memory_with(&finished);
        self.remove_completed_from_cache();
        true
    }

    /// Mark the task finished if `path` is its queue "continue" page.
    pub fn mark_finished_from_path(&self, path: &str) -> bool {
        finished_task_from_path(path).is_some_and(|id| self.mark_finished(id))
    }

    /// Rewrite the persisted list without finished tasks, dropping it when empty.
    pub fn remove_completed_from_cache(&self) {
        let Some(cached) = load_json::<Vec<TaskEntry>, _>(self.store.as_ref(), keys::TASK_LIST)
        else {
            return;
        };
        let before = cached.len();
        let pruned = self.prune_finished(cached);
        if pruned.is_empty() {
            if let Err(e) = self.store.remove(keys::TASK_LIST) {
                warn!("failed to drop task list cache: {e}");
            }
        } else if pruned.len() != before {
            self.save_cache(&pruned);
        }
    }

    /// Re-filter the in-memory list after another handle finished a task.
    pub fn apply_finished_update(&self) {
        let finished = FinishedSet::load(self.store.as_ref());
        self.prune_memory_with(&finished);
    }

    fn prune_memory_with(&self, finished: &FinishedSet) -> Vec<TaskEntry> {
        let mut state = self.lock_state();
        let tasks = std::mem::take(&mut state.tasks);
        state.tasks = finished.prune(tasks, &self.ids);
        state.tasks.clone()
    }

    /// Ensure at least `min` tasks in memory, forcing a refresh when short.
    pub async fn ensure_min(&self, min: usize) -> Vec<TaskEntry> {
        let finished = FinishedSet::load(self.store.as_ref());
        let current = self.prune_memory_with(&finished);
        if current.len() >= min {
            return current;
        }
        debug!(have = current.len(), want = min, "task list short, refreshing");
        self.refresh(true).await
    }

    /// Periodic upkeep: pruning, topping up and the slow full refresh, each on
    /// its own schedule.
    pub async fn background_tick(&self, now: Millis) {
        let (prune, ensure, full) = {
            let mut m = self
                .maintenance
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (
                m.prune.try_acquire(now),
                m.ensure_min.try_acquire(now),
                m.full_refresh.try_acquire(now),
            )
        };

        if prune {
            self.remove_completed_from_cache();
            self.apply_finished_update();
        }
        let min = self.settings.min_tasks;
        let short = self.lock_state().tasks.len() < min;
        if ensure && short {
            self.ensure_min(min).await;
        }
        if full {
            let short = self.lock_state().tasks.len() < min;
            self.refresh(short).await;
        }
    }

    /// Forget the persisted list, the finished set and the in-memory list.
    pub fn clear(&self) {
        for key in [keys::TASK_LIST, keys::FINISHED_TASKS] {
            if let Err(e) = self.store.remove(key) {
                warn!("failed to clear {key}: {e}");
            }
        }
        *self.lock_state() = ListState::default();
        self.sync.notify();
        info!("task cache cleared");
    }
}

impl<S: ListingSource> TaskBoard for TaskListCache<S> {
    fn tasks(&self) -> Vec<TaskEntry> {
        self.get_cached_list()
    }

    fn finish(&self, task_id: &str) -> bool {
        self.mark_finished(task_id)
    }

    fn clear(&self) {
        TaskListCache::clear(self);
    }
}

impl<S: ListingSource + 'static> TaskListCache<S> {
    /// Run [`background_tick`](Self::background_tick) every `every` until the
    /// last handle is dropped.
    pub fn spawn_background(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let now = cache.clock.now_ms();
                cache.background_tick(now).await;
            }
            debug!("background upkeep stopped");
        })
    }

    /// Apply finished-set notices from other handles until every handle is gone.
    pub fn spawn_sync_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.sync.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "finished-set listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                cache.apply_finished_update();
            }
        })
    }
}
