use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{OutlineError, Result};
use crate::sync::BacklinkScope;

/// `store.url` value selecting the in-process store.
pub const MEMORY_STORE: &str = "memory";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub keybindings: KeybindingsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_STORE
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub backlinks: BacklinkScope,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            backlinks: BacklinkScope::default(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeybindingsConfig {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub bindings: HashMap<String, String>,
}

impl Default for KeybindingsConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            bindings: HashMap::new(),
        }
    }
}

fn default_url() -> String {
    MEMORY_STORE.into()
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_close_timeout_ms() -> u64 {
    5000
}

fn default_preset() -> String {
    "default".into()
}

const HEADER: &str = "\
# outliner configuration
#
# store.url is the graph store's HTTP base URL, or \"memory\" for a
# throwaway in-process store. HTTP stores need store.token (or
# OUTLINER_STORE__TOKEN).
#
# sync.backlinks: \"direct\" | \"transitive\"
# keybindings.preset: \"default\" | \"emacs\"
# Override single gestures under [keybindings.bindings], e.g.
#   split = \"Ctrl+Enter\"
#   outdent = \"Alt+Left\"

";

impl AppConfig {
    /// Defaults, then the TOML file, then `OUTLINER_` environment variables
    /// (`__` separates sections: `OUTLINER_SYNC__DEBOUNCE_MS=500`).
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("OUTLINER_").split("__"))
            .extract()
            .map_err(|e| OutlineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.url.trim().is_empty() {
            return Err(OutlineError::Config("store.url is required".into()));
        }
        if !self.store.is_memory() && self.store.token.is_empty() {
            return Err(OutlineError::Config(
                "store.token is required for HTTP stores (set in config or OUTLINER_STORE__TOKEN)"
                    .into(),
            ));
        }
        if self.sync.debounce_ms == 0 {
            return Err(OutlineError::Config(
                "sync.debounce_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(|xdg| PathBuf::from(xdg).join("outliner"))
            .or_else(|| {
                directories::BaseDirs::new()
                    .map(|dirs| dirs.home_dir().join(".config").join("outliner"))
            })
    }

    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(&AppConfig::default())?;
        std::fs::write(path, format!("{}{}", HEADER, body))?;
        Ok(())
    }
}
