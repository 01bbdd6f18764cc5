use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("clickpace"),
            )
        } else {
            ProjectDirs::from("", "", "clickpace")
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("state.db"))
    }

    /// Where the panel writes its log while it owns the terminal
    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("clickpace.log"))
    }
}
