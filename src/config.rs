//! Charm configuration
//!
//! A snapshot of the operator-facing options declared in `config.yaml`. It is
//! read once per hook, from `config-get --format=json` in production or from
//! a YAML/JSON file when running outside a hook.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PACKAGE_CE: &str = "gitlab-ce";
pub const PACKAGE_EE: &str = "gitlab-ee";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid charm configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid charm configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharmConfig {
    /// Desired GitLab version: empty for latest, `N.*` for latest within
    /// major N, or an exact version
    pub version: String,

    /// `gitlab-ce` or `gitlab-ee`
    pub package_name: String,

    /// URL users reach GitLab on; defaults to `http://<fqdn>`
    pub external_url: String,

    pub http_port: u16,

    /// SSH port advertised to users when behind a reverse proxy
    pub ssh_port: u16,

    /// Port sshd listens on locally, target of the proxy's TCP rule
    pub ssh_internal_port: u16,

    pub apt_repo: String,
    pub apt_key: String,

    #[serde(rename = "backup-location")]
    pub backup_location: String,

    pub smtp_address: String,
    pub smtp_port: u16,
    pub smtp_user_name: String,
    pub smtp_password: String,
    pub smtp_domain: String,
    pub smtp_authentication: String,
    pub smtp_enable_starttls_auto: bool,
    pub smtp_tls: bool,

    pub email_from: String,
    pub email_display_name: String,
    pub email_reply_to: String,

    /// Shared token handed to related CI runners
    pub runner_registration_token: String,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            package_name: PACKAGE_CE.to_string(),
            external_url: String::new(),
            http_port: 80,
            ssh_port: 22,
            ssh_internal_port: 22,
            apt_repo: "https://packages.gitlab.com/gitlab/gitlab-ce/ubuntu/".to_string(),
            apt_key: String::new(),
            backup_location: "/var/opt/gitlab/backups".to_string(),
            smtp_address: String::new(),
            smtp_port: 587,
            smtp_user_name: String::new(),
            smtp_password: String::new(),
            smtp_domain: String::new(),
            smtp_authentication: "login".to_string(),
            smtp_enable_starttls_auto: true,
            smtp_tls: false,
            email_from: String::new(),
            email_display_name: String::new(),
            email_reply_to: String::new(),
            runner_registration_token: String::new(),
        }
    }
}

impl CharmConfig {
    /// Load from a YAML (or JSON) file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Build from `config-get --format=json` output
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Package to install; anything other than `gitlab-ee` means `gitlab-ce`
    pub fn package_name(&self) -> &'static str {
        if self.package_name == PACKAGE_EE {
            PACKAGE_EE
        } else {
            PACKAGE_CE
        }
    }
}
