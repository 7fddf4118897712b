use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use slimify_core::ai::AiSettings;

/// Overrides the database location, mostly for scripting and tests.
pub const DB_ENV: &str = "SLIMIFY_DB";

pub struct Config {
    pub db_path: PathBuf,
    pub ai: AiSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let db_path = match std::env::var_os(DB_ENV) {
            Some(path) => PathBuf::from(path),
            None => {
                let proj_dirs = ProjectDirs::from("", "", "slimify")
                    .context("Could not determine home directory")?;
                proj_dirs.data_dir().join("slimify.db")
            }
        };
        Self::from_parts(db_path, |name| std::env::var(name).ok())
    }

    /// Build a config around `db_path`, reading AI settings through `lookup`.
    /// The database's parent directory is created if missing.
    pub fn from_parts(db_path: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            ensure_dir(dir)?;
        }
        let ai = AiSettings::from_lookup(lookup);
        tracing::debug!(db = %db_path.display(), ai = ?ai, "configuration loaded");
        Ok(Config { db_path, ai })
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))
}

/// Load `.env` from the working directory or its parents. A missing file
/// is not an error.
pub fn load_dotenv() -> std::result::Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
