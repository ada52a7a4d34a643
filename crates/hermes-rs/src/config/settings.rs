use crate::models::settings::Settings;
use log::{debug, warn};
use std::fs;
use std::path::Path;

const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads the gateway configuration from the file system.
///
/// The path comes from `HERMES_CONFIG_PATH`, defaulting to `./config.json`.
/// The file must live inside the working directory (symlinks are resolved
/// first) and stay under 10 MB; both checks guard against misconfigured
/// deployments pointing the gateway at arbitrary files.
///
/// # Errors
///
/// Returns an error when the file is missing, escapes the working
/// directory, exceeds the size limit, or fails to parse as [`Settings`].
pub fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("HERMES_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());

    debug!("loading configuration from {}", config_path);

    let path = Path::new(&config_path);
    if !path.exists() {
        return Err(format!("cannot resolve config path '{}'", config_path).into());
    }

    let canonical_path = path
        .canonicalize()
        .map_err(|err| format!("cannot resolve config path '{}': {}", config_path, err))?;
    let current_dir =
        std::env::current_dir().map_err(|err| format!("cannot get current directory: {}", err))?;
    if !canonical_path.starts_with(&current_dir) {
        warn!("config path '{}' is outside the working directory", config_path);
        return Err("config path outside working directory".into());
    }

    let metadata = fs::metadata(&canonical_path)
        .map_err(|err| format!("cannot read config file metadata: {}", err))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "config file too large: {} bytes (max: {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    let config_data = fs::read_to_string(&canonical_path)
        .map_err(|err| format!("cannot read config file: {}", err))?;
    let settings: Settings =
        serde_json::from_str(&config_data).map_err(|err| format!("invalid JSON: {}", err))?;

    debug!(
        "loaded configuration: breaker enabled={}, hub enabled={}",
        settings.breaker.enabled, settings.wsc.enabled
    );
    Ok(settings)
}
