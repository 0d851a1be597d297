//! Validation of charm configuration
//!
//! Checks run before any configuration is rendered:
//! - package name
//! - port numbers
//! - desired version syntax
//! - external URL
//! - backup location

use std::path::Path;

use url::Url;

use crate::config::{CharmConfig, PACKAGE_CE, PACKAGE_EE};
use crate::controller::error::{Error, Result};
use crate::controller::upgrade::DesiredVersion;

/// Validate the charm configuration
pub fn validate_config(config: &CharmConfig) -> Result<()> {
    validate_package_name(config)?;
    validate_ports(config)?;
    DesiredVersion::parse(&config.version)?;
    validate_external_url(config)?;
    validate_backup_location(config)?;
    Ok(())
}

fn validate_package_name(config: &CharmConfig) -> Result<()> {
    let name = config.package_name.trim();
    if name.is_empty() || name == PACKAGE_CE || name == PACKAGE_EE {
        return Ok(());
    }
    Err(Error::ValidationError(format!(
        "package_name must be {PACKAGE_CE} or {PACKAGE_EE}, got {name:?}"
    )))
}

fn validate_ports(config: &CharmConfig) -> Result<()> {
    let ports = [
        ("http_port", config.http_port),
        ("ssh_port", config.ssh_port),
        ("ssh_internal_port", config.ssh_internal_port),
    ];
    for (name, port) in ports {
        if port == 0 {
            return Err(Error::ValidationError(format!("{name} must not be 0")));
        }
    }

    // SMTP is only configured when an address is set
    if !config.smtp_address.is_empty() && config.smtp_port == 0 {
        return Err(Error::ValidationError("smtp_port must not be 0".to_string()));
    }
    Ok(())
}

fn validate_external_url(config: &CharmConfig) -> Result<()> {
    let raw = config.external_url.trim();
    if raw.is_empty() {
        return Ok(());
    }

    let url = Url::parse(raw)
        .map_err(|e| Error::ValidationError(format!("invalid external_url {raw:?}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::ValidationError(format!(
            "external_url must use http or https, got {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::ValidationError(format!(
            "external_url {raw:?} has no host"
        )));
    }

    Ok(())
}

fn validate_backup_location(config: &CharmConfig) -> Result<()> {
    if !Path::new(&config.backup_location).is_absolute() {
        return Err(Error::ValidationError(format!(
            "backup-location must be an absolute path: {}",
            config.backup_location
        )));
    }
    Ok(())
}
