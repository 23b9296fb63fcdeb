//! Configuration for Hearth
//!
//! Settings come from `$HEARTH_HOME/config.toml` (all keys optional) with a
//! handful of environment overrides. Anything malformed is a startup error.

use crate::proactive::QuietHours;
use crate::{HearthError, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default engine binary, resolved through PATH
const DEFAULT_ENGINE_BINARY: &str = "claude";
/// Upper bound on a single engine invocation
const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PROACTIVE_INTERVAL_MINUTES: u64 = 30;
const DEFAULT_CHANNEL: &str = "cli";

/// Engine invocation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub binary: String,
    pub timeout: Duration,
    /// Enables the engine's in-process teammate mode
    pub team_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE_BINARY.to_string(),
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            team_mode: false,
        }
    }
}

/// Remote context store connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub key: String,
}

/// Proactive check-in settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProactiveConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub quiet_hours: Option<QuietHours>,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(DEFAULT_PROACTIVE_INTERVAL_MINUTES * 60),
            quiet_hours: None,
        }
    }
}

/// Configuration for Hearth
#[derive(Debug, Clone)]
pub struct HearthConfig {
    /// Root directory for Hearth's own files
    pub home: PathBuf,

    /// Path to the persisted session state
    pub session_file: PathBuf,

    /// Directory holding the continuity documents, also the default engine cwd
    pub workspace_dir: PathBuf,

    /// Name of the person the assistant serves
    pub user_name: Option<String>,

    /// User timezone, IANA name
    pub timezone: Tz,

    /// Channel label recorded with every logged message
    pub channel: String,

    pub engine: EngineConfig,

    /// Remote store; memory features are disabled when absent
    pub store: Option<StoreConfig>,

    pub proactive: ProactiveConfig,

    /// Project id -> working directory
    pub projects: BTreeMap<String, PathBuf>,
}

/// On-disk shape of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    user_name: Option<String>,
    timezone: Option<String>,
    channel: Option<String>,
    workspace_dir: Option<PathBuf>,
    session_file: Option<PathBuf>,
    #[serde(default)]
    engine: EngineSection,
    store: Option<StoreSection>,
    #[serde(default)]
    proactive: ProactiveSection,
    #[serde(default)]
    projects: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineSection {
    binary: Option<String>,
    timeout_secs: Option<u64>,
    team_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    url: String,
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProactiveSection {
    enabled: Option<bool>,
    interval_minutes: Option<u64>,
    quiet_start: Option<String>,
    quiet_end: Option<String>,
}

impl HearthConfig {
    pub fn new(home: PathBuf) -> Self {
        Self {
            session_file: home.join("session.json"),
            workspace_dir: home.join("workspace"),
            home,
            user_name: None,
            timezone: Tz::UTC,
            channel: DEFAULT_CHANNEL.to_string(),
            engine: EngineConfig::default(),
            store: None,
            proactive: ProactiveConfig::default(),
            projects: BTreeMap::new(),
        }
    }

    /// Load `config.toml` from `path` (or `home/config.toml`), then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load(home: PathBuf, path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.join("config.toml"));
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            Self::from_toml_str(home, &text)?
        } else {
            Self::new(home)
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a config document. Relative paths resolve against `home`.
    pub fn from_toml_str(home: PathBuf, text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let mut config = Self::new(home);

        if let Some(name) = file.user_name.filter(|n| !n.trim().is_empty()) {
            config.user_name = Some(name);
        }
        if let Some(tz) = file.timezone {
            config.timezone = parse_timezone(&tz)?;
        }
        if let Some(channel) = file.channel {
            config.channel = channel;
        }
        if let Some(dir) = file.workspace_dir {
            config.workspace_dir = config.resolve(dir);
        }
        if let Some(session_file) = file.session_file {
            config.session_file = config.resolve(session_file);
        }

        if let Some(binary) = file.engine.binary {
            config.engine.binary = binary;
        }
        if let Some(secs) = file.engine.timeout_secs {
            if secs == 0 {
                return Err(HearthError::Config(
                    "engine.timeout_secs must be greater than zero".to_string(),
                ));
            }
            config.engine.timeout = Duration::from_secs(secs);
        }
        if let Some(team_mode) = file.engine.team_mode {
            config.engine.team_mode = team_mode;
        }

        if let Some(store) = file.store {
            config.store = Some(validate_store(store.url, store.key)?);
        }

        if let Some(enabled) = file.proactive.enabled {
            config.proactive.enabled = enabled;
        }
        if let Some(minutes) = file.proactive.interval_minutes {
            if minutes == 0 {
                return Err(HearthError::Config(
                    "proactive.interval_minutes must be greater than zero".to_string(),
                ));
            }
            config.proactive.interval = Duration::from_secs(minutes * 60);
        }
        config.proactive.quiet_hours = match (file.proactive.quiet_start, file.proactive.quiet_end) {
            (Some(start), Some(end)) => Some(QuietHours::parse(&start, &end)?),
            (None, None) => None,
            _ => {
                return Err(HearthError::Config(
                    "proactive.quiet_start and proactive.quiet_end must be set together".to_string(),
                ))
            }
        };

        for (id, dir) in file.projects {
            let dir = config.resolve(dir);
            config.projects.insert(id, dir);
        }

        Ok(config)
    }

    /// Apply `HEARTH_ENGINE_BIN`, `HEARTH_STORE_URL` and `HEARTH_STORE_KEY`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(binary) = lookup("HEARTH_ENGINE_BIN").filter(|b| !b.is_empty()) {
            self.engine.binary = binary;
        }

        let url = lookup("HEARTH_STORE_URL").filter(|v| !v.is_empty());
        let key = lookup("HEARTH_STORE_KEY").filter(|v| !v.is_empty());
        match (url, key) {
            (Some(url), Some(key)) => self.store = Some(validate_store(url, key)?),
            (Some(url), None) => {
                let key = self.store.as_ref().map(|s| s.key.clone()).ok_or_else(|| {
                    HearthError::Config("HEARTH_STORE_URL is set but no store key is configured".to_string())
                })?;
                self.store = Some(validate_store(url, key)?);
            }
            (None, Some(key)) => {
                let url = self.store.as_ref().map(|s| s.url.clone()).ok_or_else(|| {
                    HearthError::Config("HEARTH_STORE_KEY is set but no store url is configured".to_string())
                })?;
                self.store = Some(validate_store(url, key)?);
            }
            (None, None) => {}
        }
        Ok(())
    }

    pub fn with_workspace_dir(mut self, dir: PathBuf) -> Self {
        self.workspace_dir = dir;
        self
    }

    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = path;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_proactive(mut self, proactive: ProactiveConfig) -> Self {
        self.proactive = proactive;
        self
    }

    pub fn with_project(mut self, id: impl Into<String>, dir: PathBuf) -> Self {
        self.projects.insert(id.into(), dir);
        self
    }

    /// Working directory for a project id; `None` for unknown ids.
    pub fn project_dir(&self, id: &str) -> Option<&Path> {
        self.projects.get(id).map(PathBuf::as_path)
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.home.join(path)
        }
    }
}

/// Resolve the Hearth home directory: `$HEARTH_HOME`, else `~/.hearth`.
pub fn default_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HEARTH_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| HearthError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".hearth"))
}

/// Parse an IANA timezone name such as `"Europe/Berlin"` or `"UTC"`.
pub fn parse_timezone(text: &str) -> Result<Tz> {
    let text = text.trim();
    text.parse::<Tz>()
        .map_err(|e| HearthError::Config(format!("invalid timezone '{}': {}", text, e)))
}

fn validate_store(url: String, key: String) -> Result<StoreConfig> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(HearthError::Config(format!("store url must be http(s): '{}'", url)));
    }
    if key.trim().is_empty() {
        return Err(HearthError::Config("store key must not be empty".to_string()));
    }
    Ok(StoreConfig { url, key })
}
