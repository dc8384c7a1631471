use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{GtabError, Result};

// Where table files live and the little settings file that can override it.
//
// A named table is looked up in the data directory first and in its data/
// subdirectory second, which is how installed trees lay the files out. The
// directory itself comes from (in order) an explicit override, the
// HIME_TABLE_DIR environment variable, the settings file in the user config
// directory, or the system default.

pub const DATA_DIR_ENV: &str = "HIME_TABLE_DIR";
pub const DEFAULT_DATA_DIR: &str = "/usr/share/hime/table";

const SETTINGS_FILE: &str = "settings.json";

/// `~/.config/hime`, the per-user configuration directory.
pub fn user_dir() -> PathBuf {
    let home = env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".config").join("hime")
}

/// Locate a named table file: `<dir>/<name>`, falling back to
/// `<dir>/data/<name>`. Missing in both places is an I/O error carrying the
/// primary path.
pub fn table_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let primary = dir.join(name);
    if primary.is_file() {
        return Ok(primary);
    }
    let alternate = dir.join("data").join(name);
    if alternate.is_file() {
        return Ok(alternate);
    }
    Err(GtabError::io(
        primary,
        io::Error::new(io::ErrorKind::NotFound, "no such table file"),
    ))
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Overrides the table data directory when set.
    pub data_dir: Option<PathBuf>,
    /// Table loaded at startup, e.g. "cj.gtab".
    pub default_table: Option<String>,
}

impl Settings {
    /// Read settings from `dir`, writing out defaults if the file does not
    /// exist yet.
    pub fn load(dir: &Path) -> Result<Settings> {
        let path = dir.join(SETTINGS_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                GtabError::io(path, io::Error::new(io::ErrorKind::InvalidData, e))
            }),
            Err(_) => {
                let settings = Settings::default();
                settings.write(dir)?;
                Ok(settings)
            }
        }
    }

    /// Persist atomically: write a temp file in the same directory, then
    /// rename over the target.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| GtabError::io(dir, e))?;
        let tmp_path = dir.join(format!("{}.tmp", SETTINGS_FILE));
        let path = dir.join(SETTINGS_FILE);
        let mut file = fs::File::create(&tmp_path).map_err(|e| GtabError::io(&tmp_path, e))?;
        let encoded = serde_json::to_string_pretty(self)
            .map_err(|e| GtabError::io(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        file.write_all(encoded.as_bytes())
            .map_err(|e| GtabError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| GtabError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| GtabError::io(&path, e))?;
        Ok(())
    }
}

/// Resolve the data directory: explicit override, then the environment,
/// then the settings override, then the system default.
pub fn resolve_data_dir(explicit: Option<&Path>, settings: Option<&Settings>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = settings.and_then(|s| s.data_dir.as_deref()) {
        return dir.to_path_buf();
    }
    PathBuf::from(DEFAULT_DATA_DIR)
}
