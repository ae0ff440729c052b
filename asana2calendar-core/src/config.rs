//! Configuration at ~/.config/asana2calendar/config.toml
//!
//! Every `[adapters.<name>]` table enables one adapter instance. Keys other
//! than `enabled`, `required` and `kind` are handed to the adapter's
//! constructor as-is.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::constants::{APP_NAME, DEFAULT_CALL_TIMEOUT, DEFAULT_SYNC_DAYS};
use crate::error::{SyncError, SyncResult};
use crate::store::validate_adapter_name;

static DEFAULT_DATABASE_PATH: &str = "~/.local/share/asana2calendar/sync.db";

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_sync_days() -> i64 {
    DEFAULT_SYNC_DAYS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether this adapter being unavailable fails the run.
    #[serde(default = "default_true")]
    pub required: bool,

    /// Registered adapter kind. Defaults to the table name.
    pub kind: Option<String>,

    #[serde(flatten)]
    pub params: HashMap<String, toml::Value>,
}

impl AdapterConfig {
    pub fn kind<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }

    /// A parameter as text. Numbers are accepted since environment overrides
    /// and project ids often come through as integers.
    pub fn param(&self, key: &str) -> Option<String> {
        let value = match self.params.get(key)? {
            toml::Value::String(s) => s.trim().to_string(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    pub fn require(&self, adapter: &str, key: &str) -> SyncResult<String> {
        self.param(key).ok_or_else(|| {
            SyncError::Config(format!(
                "adapters.{adapter}.{key} is missing. Add it to {}",
                AppConfig::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".into())
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Correspondence store location, `~` allowed.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "default_sync_days")]
    pub sync_days: i64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: default_database(),
            sync_days: DEFAULT_SYNC_DAYS,
            timeout_secs: default_timeout_secs(),
            adapters: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join(APP_NAME);

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> SyncResult<Self> {
        AppConfig::load_from(&AppConfig::config_path()?)
    }

    /// Read `path`, then apply `ASANA2CALENDAR__*` environment overrides
    /// (e.g. `ASANA2CALENDAR__ADAPTERS__ASANA__TOKEN`).
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("ASANA2CALENDAR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.to_string_lossy()).into_owned())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Enabled adapters in name order.
    pub fn enabled_adapters(&self) -> impl Iterator<Item = (&str, &AdapterConfig)> {
        self.adapters
            .iter()
            .filter(|(_, adapter)| adapter.enabled)
            .map(|(name, adapter)| (name.as_str(), adapter))
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.enabled_adapters().map(|(name, _)| name.to_string()).collect()
    }

    /// Checks that don't need an adapter constructor. `known_kinds` lists the
    /// kinds the registry can build.
    pub fn validate(&self, known_kinds: &[&str]) -> SyncResult<()> {
        let enabled: Vec<_> = self.enabled_adapters().collect();
        if enabled.len() < 2 {
            return Err(SyncError::Config(format!(
                "At least two adapters must be enabled, found {}. Configure them under [adapters.<name>]",
                enabled.len()
            )));
        }
        if self.sync_days <= 0 {
            return Err(SyncError::Config("sync_days must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(SyncError::Config("timeout_secs must be positive".into()));
        }

        for (name, adapter) in enabled {
            validate_adapter_name(name)
                .map_err(|e| SyncError::Config(e.to_string()))?;
            let kind = adapter.kind(name);
            if !known_kinds.contains(&kind) {
                return Err(SyncError::Config(format!(
                    "Adapter '{name}' has unknown kind '{kind}' (available: {})",
                    known_kinds.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Write a commented template. The file will hold credentials, so it is
    /// only readable by the owner.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# asana2calendar configuration

# Where links between tasks and events are stored:
# database = \"{DEFAULT_DATABASE_PATH}\"

# Days before and after today that each sync looks at:
# sync_days = {DEFAULT_SYNC_DAYS}

# Seconds to wait for any single request:
# timeout_secs = {}

# [adapters.asana]
# token = \"<personal access token>\"
# project = \"<project gid or name>\"

# [adapters.caldav]
# url = \"https://caldav.example.com/calendars/me/work/\"
# username = \"me\"
# password = \"<app password>\"
# required = true
",
            DEFAULT_CALL_TIMEOUT.as_secs()
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
