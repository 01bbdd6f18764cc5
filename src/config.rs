use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::clock::{Millis, SECOND_MS};
use crate::format::Locale;
use crate::tasks::TaskListSettings;
use crate::tracker::TrackerPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub locale: Locale,
    /// How often the panel ticks the tracker
    pub tick_interval_ms: Millis,
    pub tracker: TrackerPolicy,
    pub tasks: TaskListSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            tick_interval_ms: SECOND_MS,
            tracker: TrackerPolicy::default(),
            tasks: TaskListSettings::default(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "clickpace") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("clickpace_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => debug!(path = %self.path.display(), "ignoring unreadable config: {e}"),
            },
            Err(e) => debug!(path = %self.path.display(), "no config file: {e}"),
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}
