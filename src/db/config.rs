//! Connection configuration.
//!
//! A [`DatabaseConfig`] describes where the store lives, how to bootstrap
//! it and which per-connection settings to apply once it is open. It can be
//! built from a URL, from the `LITEBIND_DATABASE_URL` environment variable,
//! or loaded from a `.litebind.json` file:
//!
//! ```json
//! {
//!   "database": {
//!     "location": { "type": "file", "path": "./contacts.db" },
//!     "bootstrap_file": "./schema.sql",
//!     "busy_timeout_ms": 5000,
//!     "foreign_keys": true
//!   }
//! }
//! ```

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Database;
use super::connection::MEMORY_PATH;

/// Environment variable consulted by [`DatabaseConfig::from_env`].
pub const DATABASE_URL_ENV: &str = "LITEBIND_DATABASE_URL";

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".litebind.json";

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Location {
    /// A store file on disk.
    File { path: PathBuf },
    /// A private in-memory store.
    Memory,
}

impl Default for Location {
    fn default() -> Self {
        Location::File {
            path: PathBuf::from("./litebind.sqlite"),
        }
    }
}

/// Everything needed to open and set up one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub location: Location,
    /// SQL run to create a missing store.
    #[serde(default)]
    pub bootstrap_sql: String,
    /// File whose SQL is appended to `bootstrap_sql`.
    #[serde(default)]
    pub bootstrap_file: Option<PathBuf>,
    /// Native extension loaded after opening.
    #[serde(default)]
    pub extension: Option<PathBuf>,
    #[serde(default)]
    pub busy_timeout_ms: Option<i32>,
    /// Foreign key enforcement; off unless requested.
    #[serde(default)]
    pub foreign_keys: bool,
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseConfig,
}

impl ConfigFile {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Load `.litebind.json` from the current directory.
    pub fn load_default() -> Result<Self, Box<dyn Error>> {
        Self::load(Path::new(CONFIG_FILE_NAME))
    }
}

impl DatabaseConfig {
    /// Parse a connection URL or file path.
    ///
    /// Supported formats:
    /// - `:memory:` → in-memory store
    /// - `sqlite://path/to/db` or `file:path/to/db` → store file
    /// - anything else → store file at that path
    pub fn from_url(url: &str) -> Self {
        let location = if url == MEMORY_PATH {
            Location::Memory
        } else {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("file:"))
                .unwrap_or(url);
            Location::File {
                path: PathBuf::from(path),
            }
        };
        Self {
            location,
            ..Self::default()
        }
    }

    /// Build from `LITEBIND_DATABASE_URL`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var(DATABASE_URL_ENV)
            .ok()
            .map(|url| Self::from_url(&url))
    }

    /// Resolve configuration.
    ///
    /// Priority: config file > environment > default (`./litebind.sqlite`)
    pub fn resolve() -> Result<Self, Box<dyn Error>> {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.exists() {
            return Ok(ConfigFile::load(path)?.database);
        }
        Ok(Self::from_env().unwrap_or_default())
    }

    pub fn with_bootstrap_sql(mut self, sql: impl Into<String>) -> Self {
        self.bootstrap_sql = sql.into();
        self
    }

    pub fn with_busy_timeout(mut self, ms: i32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    pub fn with_foreign_keys(mut self, enable: bool) -> Self {
        self.foreign_keys = enable;
        self
    }

    /// Full bootstrap script: inline SQL followed by the bootstrap file.
    pub fn bootstrap_script(&self) -> Result<String, Box<dyn Error>> {
        let mut script = self.bootstrap_sql.clone();
        if let Some(file) = &self.bootstrap_file {
            let content = fs::read_to_string(file)
                .map_err(|e| format!("Failed to read bootstrap file {}: {}", file.display(), e))?;
            if !script.is_empty() && !script.trim_end().ends_with(';') {
                script.push(';');
            }
            script.push('\n');
            script.push_str(&content);
        }
        Ok(script)
    }

    /// Open a connection and apply the per-connection settings.
    pub fn connect(&self) -> Result<Database, Box<dyn Error>> {
        let script = self.bootstrap_script()?;
        let path = match &self.location {
            Location::File { path } => path.as_path(),
            Location::Memory => Path::new(MEMORY_PATH),
        };

        let mut db = Database::new();
        db.open(path, &script, self.extension.as_deref())?;
        if let Some(ms) = self.busy_timeout_ms {
            db.set_busy_timeout(ms)?;
        }
        db.enable_foreign_keys(self.foreign_keys)?;
        Ok(db)
    }
}
