//! Cached list of annotation tasks scraped from the host's task listing.
//!
//! The list is kept in memory, mirrored to the key-value store, and filtered
//! against a shared set of finished task ids.

pub mod cache;
pub mod finished;
pub mod parser;
pub mod source;

use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex};

use crate::clock::{Millis, MINUTE_MS, SECOND_MS};

pub use cache::TaskListCache;
pub use finished::{FinishedSet, FinishedSync};
pub use parser::parse_task_list;
pub use source::{HttpListingSource, ListingSource};

static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/v2/task/(\d+)/").unwrap());
static CONTINUE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/v2/task/(\d+)/queue/continue/?").unwrap());

pub const TASK_LIST_PATH: &str = "/v2/tasks/list/";

/// One link from the task listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub href: String,
    pub title: String,
}

impl TaskEntry {
    pub fn new(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: title.into(),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        task_id_from_path(&self.href)
    }
}

/// Numeric task id from a `/v2/task/<id>/...` path or URL.
pub fn task_id_from_path(path: &str) -> Option<&str> {
    TASK_ID_RE
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Task id of a "continue" path, which the host visits once a task is done.
pub fn finished_task_from_path(path: &str) -> Option<&str> {
    CONTINUE_PATH_RE
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Memoized id extraction; remembers misses too.
#[derive(Debug)]
pub struct TaskIdCache {
    cache: Mutex<LruCache<String, Option<String>>>,
}

impl TaskIdCache {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, path: &str) -> Option<String> {
        let Ok(mut cache) = self.cache.lock() else {
            return task_id_from_path(path).map(str::to_string);
        };
        if let Some(hit) = cache.get(path) {
            return hit.clone();
        }
        let id = task_id_from_path(path).map(str::to_string);
        cache.put(path.to_string(), id.clone());
        id
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskIdCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Where to move in the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    First,
    Last,
    Offset(isize),
}

/// Pick the navigation target relative to the task at `current_path`.
///
/// Falls back to the first entry when the current task is not in the list or
/// the offset runs past either end.
pub fn jump_target<'a>(list: &'a [TaskEntry], current_path: &str, jump: Jump) -> Option<&'a TaskEntry> {
    match jump {
        Jump::First => list.first(),
        Jump::Last => list.last(),
        Jump::Offset(offset) => {
            let current = task_id_from_path(current_path);
            let index = current.and_then(|id| list.iter().position(|t| t.task_id() == Some(id)));
            match index {
                Some(i) => i
                    .checked_add_signed(offset)
                    .and_then(|target| list.get(target))
                    .or_else(|| list.first()),
                None => list.first(),
            }
        }
    }
}

/// What the panel needs from a task list: a cheap read of the current list and
/// the two edits a user can make from the keyboard.
pub trait TaskBoard: Send + Sync {
    /// Current list without finished tasks; never touches the network.
    fn tasks(&self) -> Vec<TaskEntry>;
    /// Returns false when the task was already finished.
    fn finish(&self, task_id: &str) -> bool;
    fn clear(&self);
}

/// Task-list behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskListSettings {
    pub base_url: String,
    pub ttl_ms: Millis,
    pub tries: usize,
    pub request_timeout_ms: Millis,
    pub backoff_base_ms: Millis,
    pub backoff_jitter_ms: Millis,
    pub min_tasks: usize,
    /// Case-insensitive title fragments to skip
    pub blocked_titles: Vec<String>,
    pub max_cached_tasks: usize,
    pub max_finished_ids: usize,
    pub prune_every_ms: Millis,
    pub ensure_min_every_ms: Millis,
    pub full_refresh_every_ms: Millis,
    /// How often the panel runs background upkeep
    pub background_every_ms: Millis,
}

impl Default for TaskListSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            ttl_ms: 5 * MINUTE_MS,
            tries: 3,
            request_timeout_ms: 30 * SECOND_MS,
            backoff_base_ms: 180,
            backoff_jitter_ms: 90,
            min_tasks: 5,
            blocked_titles: Vec::new(),
            max_cached_tasks: 500,
            max_finished_ids: 1000,
            prune_every_ms: MINUTE_MS,
            ensure_min_every_ms: MINUTE_MS,
            full_refresh_every_ms: 15 * MINUTE_MS,
            background_every_ms: 10 * SECOND_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> Vec<TaskEntry> {
        vec![
            TaskEntry::new("https://host/v2/task/10/queue/", "ten"),
            TaskEntry::new("https://host/v2/task/20/queue/", "twenty"),
            TaskEntry::new("https://host/v2/task/30/queue/", "thirty"),
        ]
    }

    #[test]
    fn extracts_task_id() {
        assert_eq!(task_id_from_path("/v2/task/123/queue/"), Some("123"));
        assert_eq!(
            task_id_from_path("https://example.org/v2/task/77/queue/next/"),
            Some("77")
        );
        assert_eq!(task_id_from_path("/v2/tasks/"), None);
        assert_eq!(task_id_from_path("/v2/task/abc/"), None);
    }

    #[test]
    fn continue_path_marks_finished() {
        assert_eq!(finished_task_from_path("/v2/task/9/queue/continue/"), Some("9"));
        assert_eq!(finished_task_from_path("/v2/task/9/queue/continue"), Some("9"));
        assert_eq!(finished_task_from_path("/v2/task/9/queue/"), None);
    }

    #[test]
    fn id_cache_memoizes_hits_and_misses() {
        let cache = TaskIdCache::new(2);
        assert_eq!(cache.get("/v2/task/1/"), Some("1".to_string()));
        assert_eq!(cache.get("/nope"), None);
        assert_eq!(cache.len(), 2);

        // evicts the least recently used entry
        cache.get("/v2/task/2/");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("/v2/task/1/"), Some("1".to_string()));
    }

    #[test]
    fn jump_moves_relative_to_current() {
        let list = list();
        let next = jump_target(&list, "/v2/task/20/queue/", Jump::Offset(1)).unwrap();
        assert_eq!(next.title, "thirty");
        let prev = jump_target(&list, "/v2/task/20/queue/", Jump::Offset(-1)).unwrap();
        assert_eq!(prev.title, "ten");
    }

    #[test]
    fn jump_falls_back_to_first() {
        let list = list();
        assert_eq!(
            jump_target(&list, "/v2/task/30/queue/", Jump::Offset(1)).unwrap().title,
            "ten"
        );
        assert_eq!(
            jump_target(&list, "/v2/task/10/queue/", Jump::Offset(-1)).unwrap().title,
            "ten"
        );
        assert_eq!(
            jump_target(&list, "/v2/task/99/queue/", Jump::Offset(1)).unwrap().title,
            "ten"
        );
        assert_eq!(jump_target(&list, "/", Jump::Last).unwrap().title, "thirty");
        assert!(jump_target(&[], "/", Jump::First).is_none());
    }
}
