// Configuration loader
// Loads settings from --config, ~/.perch/config.toml, or built-in defaults

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Settings;

/// Load settings.
///
/// An explicit path must exist. Without one, `~/.perch/config.toml` is used
/// when present and defaults otherwise.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("No config file found, using defaults");
                return Ok(Settings::default());
            }
        },
    };

    let settings = parse_settings_file(&path)?;
    tracing::info!(path = %path.display(), "Loaded configuration");
    Ok(settings)
}

fn parse_settings_file(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".perch").join("config.toml"))
}
