use anyhow::{anyhow, Result};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::schema::Config;
use crate::utils::parse_duration;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value: {0}")]
    InvalidValue(String),
}

/// Validate the structure of a configuration
pub fn validate_config_structure(config: &Config) -> Result<()> {
    debug!("Validating configuration structure");

    if config.vsphere.host.trim().is_empty() {
        return Err(anyhow!(ValidationError::MissingField("vsphere.host".to_string())));
    }
    if config.vsphere.port == 0 {
        return Err(anyhow!(ValidationError::InvalidValue(
            "vsphere.port must be between 1 and 65535".to_string()
        )));
    }

    for (field, value) in [
        ("vsphere.timeout", &config.vsphere.timeout),
        ("netlab.timeout", &config.netlab.timeout),
    ] {
        parse_duration(value).map_err(|_| {
            anyhow!(ValidationError::InvalidValue(format!(
                "{} '{}' is not a duration",
                field, value
            )))
        })?;
    }

    if let Some(url) = &config.netlab.url {
        Url::parse(url).map_err(|e| {
            anyhow!(ValidationError::InvalidValue(format!(
                "netlab.url '{}': {}",
                url, e
            )))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        validate_config_structure(&Config::default()).unwrap();
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.vsphere.port = 0;
        assert!(validate_config_structure(&config).is_err());

        let mut config = Config::default();
        config.vsphere.host = "  ".to_string();
        let err = validate_config_structure(&config).unwrap_err();
        assert!(err.to_string().contains("vsphere.host"));

        let mut config = Config::default();
        config.netlab.timeout = "soon".to_string();
        assert!(validate_config_structure(&config).is_err());

        let mut config = Config::default();
        config.netlab.url = Some("netlab without scheme".to_string());
        assert!(validate_config_structure(&config).is_err());
    }
}
