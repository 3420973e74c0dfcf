//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Maildepot.
//
// Maildepot is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Maildepot is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Maildepot. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The system-wide configuration for Maildepot.
///
/// This is stored in a file named `maildepot.toml`. Relative paths inside it
/// are resolved against the directory containing that file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Where and how mailbox data is persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Fallback logging configuration, used when there is no `logging.toml`
    /// next to the system configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A single SQLite database file plus a blob directory.
    Sqlite,
    /// Volatile in-process storage. Everything is lost on exit.
    Memory,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Sqlite
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// The SQLite database file.
    pub database: PathBuf,
    /// The root directory for externally stored part bodies.
    pub blob_root: PathBuf,
    /// How long to wait on a locked database before giving up. Callers'
    /// deadlines can shorten this further.
    pub busy_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database: "maildepot.sqlite".into(),
            blob_root: "blobs".into(),
            busy_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl SystemConfig {
    pub fn parse(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the configuration at `path`, resolving relative storage paths
    /// against its parent directory.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut config = Self::parse(&fs::read_to_string(path)?)?;
        if let Some(root) = path.parent() {
            config.storage.database = root.join(&config.storage.database);
            config.storage.blob_root = root.join(&config.storage.blob_root);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SystemConfig::parse("").unwrap();
        assert_eq!(Backend::Sqlite, config.storage.backend);
        assert_eq!(10, config.storage.busy_timeout_secs);
        assert_eq!("info", config.logging.level);
    }

    #[test]
    fn parse_full_config() {
        let config = SystemConfig::parse(
            r#"
[storage]
backend = "memory"
busy_timeout_secs = 3

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(Backend::Memory, config.storage.backend);
        assert_eq!(3, config.storage.busy_timeout_secs);
        assert_eq!(PathBuf::from("blobs"), config.storage.blob_root);
        assert_eq!("debug", config.logging.level);
    }

    #[test]
    fn bad_backend_rejected() {
        assert_matches!(
            Err(Error::Toml(..)),
            SystemConfig::parse("[storage]\nbackend = \"floppy\"\n")
        );
    }

    #[test]
    fn load_resolves_relative_paths() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("maildepot.toml");
        fs::write(&path, "[storage]\ndatabase = \"db/mail.sqlite\"\n")
            .unwrap();

        let config = SystemConfig::load(&path).unwrap();
        assert_eq!(root.path().join("db/mail.sqlite"), config.storage.database);
        assert_eq!(root.path().join("blobs"), config.storage.blob_root);
    }
}
