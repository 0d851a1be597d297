//! `reverseproxy` relation (requires side)
//!
//! We publish a JSON list of forwarding rules under the `config` key; the
//! proxy answers with `<our unit>.cfg_status`, either `passed: ...` or
//! `failed: ...`.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::RelationError;
use crate::host::Relation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyConfigError {
    #[error("\"{0}\" is required")]
    MissingField(&'static str),

    #[error("\"urlbase\" or \"subdomain\" must be set in http mode")]
    MissingHttpRoute,

    #[error("at least one forwarding rule is required")]
    NoRules,

    #[error("reverse proxy rejected configuration: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    Http,
    Tcp,
}

/// One forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRule {
    pub mode: ProxyMode,
    pub external_port: u16,
    pub internal_host: String,
    pub internal_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urlbase: Option<String>,
}

impl ProxyRule {
    fn validate(&self) -> Result<(), ProxyConfigError> {
        if self.external_port == 0 {
            return Err(ProxyConfigError::MissingField("external_port"));
        }
        if self.internal_host.is_empty() {
            return Err(ProxyConfigError::MissingField("internal_host"));
        }
        if self.internal_port == 0 {
            return Err(ProxyConfigError::MissingField("internal_port"));
        }
        let has_route = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if self.mode == ProxyMode::Http && !has_route(&self.subdomain) && !has_route(&self.urlbase)
        {
            return Err(ProxyConfigError::MissingHttpRoute);
        }
        Ok(())
    }
}

/// A validated set of forwarding rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProxyConfig {
    rules: Vec<ProxyRule>,
}

impl ProxyConfig {
    pub fn new(rules: Vec<ProxyRule>) -> Result<Self, ProxyConfigError> {
        if rules.is_empty() {
            return Err(ProxyConfigError::NoRules);
        }
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }
}

/// Build the HTTP and SSH forwarding rules for GitLab
pub fn build_proxy_rules(
    external_url: &Url,
    fqdn: &str,
    http_port: u16,
    ssh_port: u16,
    ssh_internal_port: u16,
) -> Vec<ProxyRule> {
    let external_http_port = if external_url.scheme() == "https" {
        443
    } else {
        80
    };

    vec![
        ProxyRule {
            mode: ProxyMode::Http,
            external_port: external_http_port,
            internal_host: fqdn.to_string(),
            internal_port: http_port,
            subdomain: external_url.host_str().map(str::to_string),
            urlbase: None,
        },
        ProxyRule {
            mode: ProxyMode::Tcp,
            external_port: ssh_port,
            internal_host: fqdn.to_string(),
            internal_port: ssh_internal_port,
            subdomain: None,
            urlbase: None,
        },
    ]
}

/// Configuration status reported back by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyStatus {
    Pending,
    Passed(String),
    Failed(String),
}

impl ProxyStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => ProxyStatus::Pending,
            Some(s) if s.starts_with("passed") => ProxyStatus::Passed(s.to_string()),
            Some(s) if s.starts_with("failed") => ProxyStatus::Failed(s.to_string()),
            Some(_) => ProxyStatus::Pending,
        }
    }

    pub fn into_result(self) -> Result<(), ProxyConfigError> {
        match self {
            ProxyStatus::Failed(msg) => Err(ProxyConfigError::Rejected(msg)),
            _ => Ok(()),
        }
    }
}

/// Requires side of the `reverseproxy` interface
pub struct ReverseProxyRequires<'a> {
    relation: &'a mut dyn Relation,
}

impl<'a> ReverseProxyRequires<'a> {
    pub fn new(relation: &'a mut dyn Relation) -> Self {
        Self { relation }
    }

    /// Publish validated forwarding rules to the proxy
    pub fn configure(&mut self, config: &ProxyConfig) -> Result<(), RelationError> {
        let payload = serde_json::to_string(config)?;
        debug!(config = %payload, "Publishing reverse proxy configuration");
        self.relation.set_local(&[("config", payload)])?;
        Ok(())
    }

    /// Read the provider's verdict on our configuration
    pub fn status(&self, local_unit: &str) -> Result<ProxyStatus, RelationError> {
        let data = self.relation.remote_data()?;
        let status = ProxyStatus::parse(data.get(&format!("{local_unit}.cfg_status")).map(String::as_str));
        match &status {
            ProxyStatus::Pending => info!("reverseproxy cfg status not yet set"),
            ProxyStatus::Passed(msg) => info!(status = %msg, "reverseproxy accepted configuration"),
            ProxyStatus::Failed(msg) => warn!(status = %msg, "reverseproxy rejected configuration"),
        }
        Ok(status)
    }
}
