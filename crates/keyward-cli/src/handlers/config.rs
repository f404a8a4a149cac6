//! `keyward config check`

use anyhow::{Context, Result};
use keyward_core::{BuildVariant, KeywardConfig};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Load, overlay `KEYWARD_*` variables and validate.
pub fn load_config(path: &Path) -> Result<KeywardConfig> {
    let mut config = KeywardConfig::load_from_file(path)?;
    config.merge_with_env()?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub path: PathBuf,
    pub build_variant: BuildVariant,
    pub cosigner_url: String,
    pub effective_delay_window_secs: u64,
    /// An override is configured but this build variant ignores it
    pub override_ignored: bool,
    pub storage_path: PathBuf,
    /// The full effective configuration, as TOML
    pub effective: String,
}

impl ConfigReport {
    pub fn new(path: &Path, config: &KeywardConfig) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            build_variant: config.build_variant,
            cosigner_url: config.cosigner.base_url.clone(),
            effective_delay_window_secs: config.effective_delay_window().as_secs(),
            override_ignored: config.delay_notify.window_override_secs.is_some()
                && !config.build_variant.allows_delay_override(),
            storage_path: config.storage.base_path.clone(),
            effective: toml::to_string_pretty(config)?,
        })
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: ok", self.path.display())?;
        writeln!(f, "  build variant   {:?}", self.build_variant)?;
        writeln!(f, "  co-signer       {}", self.cosigner_url)?;
        write!(f, "  delay window    {}s", self.effective_delay_window_secs)?;
        if self.override_ignored {
            write!(f, " (override ignored in this build)")?;
        }
        writeln!(f)?;
        write!(f, "  storage         {}", self.storage_path.display())
    }
}

pub fn check(path: &Path) -> Result<ConfigReport> {
    let config = load_config(path)?;
    ConfigReport::new(path, &config)
}
