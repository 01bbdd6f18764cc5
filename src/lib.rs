// Library surface for the panel binary, headless/integration tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod hysteresis;
pub mod runtime;
pub mod store;
pub mod tasks;
pub mod throttle;
pub mod tracker;
pub mod ui;
pub mod window;

pub use app::App;
pub use clock::{Clock, ManualClock, Millis, SystemClock};
pub use error::{FetchError, StoreError};
pub use format::{format_duration, Locale};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use tracker::{Snapshot, TickOutcome, Tracker, TrackerPolicy};
