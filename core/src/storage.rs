use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::de::DeserializeOwned;

use crate::error::{CoreError, Result};
use crate::types::{CoreCfg, UserSettings};

/// Plattformens nøkkel/verdi-lager for brukerinnstillinger.
pub trait SettingsStore {
    fn load(&self) -> Result<UserSettings>;
    fn save(&self, settings: &UserSettings) -> Result<()>;
}

/// JSON-fil på disk.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<UserSettings> {
        load_settings(&self.path)
    }

    fn save(&self, settings: &UserSettings) -> Result<()> {
        save_settings(settings, &self.path)
    }
}

fn parse_json<T: DeserializeOwned>(contents: &str, what: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(contents);
    serde_path_to_error::deserialize(&mut de)
        .map_err(|e| CoreError::Settings(format!("parse error ({what}) at {}: {}", e.path(), e.inner())))
}

/// Leser innstillinger fra disk (JSON).
/// Finnes ikke fila, returneres default-innstillinger.
pub fn load_settings(path: &Path) -> Result<UserSettings> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let settings: UserSettings = parse_json(&contents, "UserSettings")?;
        info!(
            "settings loaded from {} (sensitivity={}, height={})",
            path.display(),
            settings.sensitivity,
            settings.height_in_inches
        );
        Ok(settings)
    } else {
        warn!("no settings at {}, using defaults", path.display());
        Ok(UserSettings::default())
    }
}

/// Lagrer innstillinger som JSON (pretty-print).
pub fn save_settings(settings: &UserSettings, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| CoreError::Settings(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    info!("settings saved to {}", path.display());
    Ok(())
}

/// Kjernekonfig (terskler, buffer, kanal). Manglende fil → default.
pub fn load_cfg(path: &Path) -> Result<CoreCfg> {
    if !path.exists() {
        return Ok(CoreCfg::default());
    }
    let contents = std::fs::read_to_string(path)?;
    parse_json(&contents, "CoreCfg")
}
