use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use tracing::{debug, info};

use crate::codec::STORAGE_KEY;

const TODORC_NAME: &str = ".todorc";
const DATA_DIR_NAME: &str = ".todo";

/// Settings read from `~/.todorc` (TOML) and `--rc KEY=VALUE` overrides.
///
/// ```toml
/// color = false
///
/// [storage]
/// key = "todos"
/// location = "~/.todo"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub color: bool,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Key the task list is stored under.
    pub key: String,
    /// Directory for the file-backed store; `~/.todo` when unset.
    pub location: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: true,
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key: STORAGE_KEY.to_string(),
            location: None,
        }
    }
}

impl Config {
    /// Reads `path`, or `~/.todorc` when no path is given and that file exists.
    #[tracing::instrument]
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match dirs::home_dir().map(|home| home.join(TODORC_NAME)) {
                Some(candidate) if candidate.is_file() => candidate,
                _ => {
                    debug!("no todorc found; using defaults");
                    return Ok(Self::default());
                }
            },
        };

        info!(todorc = %path.display(), "loading todorc");
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid todorc {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(text)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Applies one `KEY=VALUE` override; keys may carry an `rc.` prefix.
    pub fn apply_override(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let key = key.strip_prefix("rc.").unwrap_or(key);
        debug!(key, value, "applying override");
        match key {
            "color" => self.color = parse_switch(value)?,
            "storage.key" => self.storage.key = value.trim().to_string(),
            "storage.location" => self.storage.location = Some(PathBuf::from(value.trim())),
            other => bail!("unknown setting: {other}"),
        }
        self.check()
    }

    pub fn apply_overrides<I>(&mut self, overrides: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            self.apply_override(&key, &value)?;
        }
        Ok(())
    }

    /// Resolves and creates the data directory: `override_dir`, then
    /// `storage.location`, then `~/.todo`.
    #[tracing::instrument(skip(self))]
    pub fn data_dir(&self, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
        let dir = match (override_dir, &self.storage.location) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(location)) => expand_home(location)?,
            (None, None) => dirs::home_dir()
                .map(|home| home.join(DATA_DIR_NAME))
                .ok_or_else(|| anyhow!("cannot determine home directory"))?,
        };

        if !dir.exists() {
            info!(dir = %dir.display(), "creating data directory");
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(dir)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.storage.key.trim().is_empty() {
            bail!("storage.key cannot be empty");
        }
        Ok(())
    }
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on/off, got: {other}")),
    }
}

fn expand_home(path: &Path) -> anyhow::Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| anyhow!("cannot determine home directory")),
        Err(_) => Ok(path.to_path_buf()),
    }
}
