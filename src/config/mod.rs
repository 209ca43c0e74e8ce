use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod schema;
pub mod validation;

pub use schema::{Config, NetlabConfig, VsphereConfig};

pub const VSPHERE_PASSWORD_ENV: &str = "NETLABORIOUS_VSPHERE_PASSWORD";
pub const NETLAB_API_KEY_ENV: &str = "NETLABORIOUS_NETLAB_API_KEY";

/// Load and parse a configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    info!("Loading configuration from {}", path.display());

    // Read the file contents
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    // Parse the JSON contents
    let config: Config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse JSON in config file: {}", path.display()))?;

    // Validate the configuration
    validation::validate_config_structure(&config)
        .with_context(|| format!("Invalid configuration in file: {}", path.display()))?;

    debug!("Successfully loaded config: {:?}", redacted(&config));
    Ok(config)
}

/// `$HOME/.config/netlaborious/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config").join("netlaborious").join("config.json"))
}

/// Resolve the configuration for this process.
///
/// An explicit path must exist. The default path is optional and falls back
/// to built-in defaults. Secrets from the environment are applied last.
pub fn resolve(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_config(&path)?,
            _ => {
                debug!("No configuration file found, using defaults");
                Config::default()
            }
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Fill secrets from the environment; non-empty values win over the file.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(password) = lookup(VSPHERE_PASSWORD_ENV).filter(|v| !v.is_empty()) {
        debug!("Using vSphere password from {}", VSPHERE_PASSWORD_ENV);
        config.vsphere.password = Some(password);
    }
    if let Some(key) = lookup(NETLAB_API_KEY_ENV).filter(|v| !v.is_empty()) {
        debug!("Using NETLAB+ API key from {}", NETLAB_API_KEY_ENV);
        config.netlab.api_key = Some(key);
    }
}

fn redacted(config: &Config) -> Config {
    let mut copy = config.clone();
    if copy.vsphere.password.is_some() {
        copy.vsphere.password = Some("***".to_string());
    }
    if copy.netlab.api_key.is_some() {
        copy.netlab.api_key = Some("***".to_string());
    }
    copy
}
