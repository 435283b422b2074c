use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::paths;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Deserialize, Default)]
struct DatabaseConfig {
    base_dir: Option<PathBuf>,
    create_if_missing: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    poll_interval_ms: Option<u64>,
    save_debounce_ms: Option<u64>,
    wait_for_creation: Option<bool>,
    creation_timeout_secs: Option<u64>,
    object_cache_size: Option<usize>,
}

#[derive(Deserialize, Default)]
struct ServerConfig {
    root_url: Option<String>,
    radio_browser: Option<String>,
}

/// Process-level settings: embedded defaults, overridden by the user's
/// `~/.config/medialib/config.toml`.
///
/// These are distinct from the per-database settings in the registry.
pub struct Config {
    database: DatabaseConfig,
    runtime: RuntimeConfig,
    server: ServerConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => config.merge(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is invalid: {}", e);
                ConfigFile::default()
            }
        };
        Config {
            database: base.database,
            runtime: base.runtime,
            server: base.server,
        }
    }

    /// Apply overrides given as TOML text, e.g. from a command line file.
    pub fn merge_str(&mut self, contents: &str) -> Result<(), toml::de::Error> {
        let user = toml::from_str::<ConfigFile>(contents)?;
        self.merge(user);
        Ok(())
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_database(&mut self.database, user.database);
        merge_runtime(&mut self.runtime, user.runtime);
        merge_server(&mut self.server, user.server);
    }

    pub fn base_dir(&self) -> PathBuf {
        self.database
            .base_dir
            .clone()
            .unwrap_or_else(paths::default_base_dir)
    }

    pub fn create_if_missing(&self) -> bool {
        self.database.create_if_missing.unwrap_or(true)
    }

    /// Back-off sleep of idle loops (clamped to 1..1000 ms).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.poll_interval_ms.unwrap_or(50).clamp(1, 1000))
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.runtime.save_debounce_ms.unwrap_or(3000))
    }

    pub fn wait_for_creation(&self) -> bool {
        self.runtime.wait_for_creation.unwrap_or(true)
    }

    /// `None` when set to 0.
    pub fn creation_timeout(&self) -> Option<Duration> {
        match self.runtime.creation_timeout_secs.unwrap_or(600) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn object_cache_size(&self) -> usize {
        self.runtime.object_cache_size.unwrap_or(4096).max(1)
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server.root_url.as_deref()
    }

    pub fn radio_browser_server(&self) -> &str {
        self.server
            .radio_browser
            .as_deref()
            .unwrap_or("de1.api.radio-browser.info")
    }

    /// Options for [`crate::MediaDb::open`]. `create` asks for a fresh
    /// database.
    pub fn options(&self, create: bool) -> Options {
        Options {
            base_dir: self.base_dir(),
            create,
            poll_interval: self.poll_interval(),
            save_debounce: self.save_debounce(),
            wait_for_creation: self.wait_for_creation(),
            creation_timeout: self.creation_timeout(),
            server_url: self.server_url().map(str::to_string),
            radio_browser_server: self.radio_browser_server().to_string(),
            object_cache_size: self.object_cache_size(),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("medialib").join("config.toml"))
}

fn merge_database(base: &mut DatabaseConfig, user: DatabaseConfig) {
    if user.base_dir.is_some() {
        base.base_dir = user.base_dir;
    }
    if user.create_if_missing.is_some() {
        base.create_if_missing = user.create_if_missing;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.poll_interval_ms.is_some() {
        base.poll_interval_ms = user.poll_interval_ms;
    }
    if user.save_debounce_ms.is_some() {
        base.save_debounce_ms = user.save_debounce_ms;
    }
    if user.wait_for_creation.is_some() {
        base.wait_for_creation = user.wait_for_creation;
    }
    if user.creation_timeout_secs.is_some() {
        base.creation_timeout_secs = user.creation_timeout_secs;
    }
    if user.object_cache_size.is_some() {
        base.object_cache_size = user.object_cache_size;
    }
}

fn merge_server(base: &mut ServerConfig, user: ServerConfig) {
    if user.root_url.is_some() {
        base.root_url = user.root_url;
    }
    if user.radio_browser.is_some() {
        base.radio_browser = user.radio_browser;
    }
}

/// Everything [`crate::MediaDb::open`] needs to know.
#[derive(Debug, Clone)]
pub struct Options {
    /// Parent of the `medialib/` database directory.
    pub base_dir: PathBuf,
    /// Create a new database. Fails if one exists; when false, fails if
    /// none exists.
    pub create: bool,
    pub poll_interval: Duration,
    pub save_debounce: Duration,
    pub wait_for_creation: bool,
    pub creation_timeout: Option<Duration>,
    /// Root URL of our own media server, used to ignore ourselves in
    /// network discovery and to build exported media URIs.
    pub server_url: Option<String>,
    pub radio_browser_server: String,
    pub object_cache_size: usize,
}

impl Options {
    /// Built-in defaults, ignoring the user's config file.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let mut options = Config::embedded().options(false);
        options.base_dir = base_dir.into();
        options
    }
}
