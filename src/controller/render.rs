//! Rendering of the Omnibus configuration file
//!
//! `gitlab.rb` is Ruby, but the charm only ever emits flat assignments, so
//! the renderer is a list of `(setting, value)` pairs printed in a fixed
//! order. Identical inputs always produce byte-identical output, which is
//! what change detection relies on.

use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::controller::backend::DbSettings;
use crate::controller::error::{Error, Result};
use crate::relations::DbAdapter;

const HEADER: &str = "# This file is managed by the gitlab charm. Local changes will be overwritten.";

/// A Ruby literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RbValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl RbValue {
    /// Integer when the string is one, string otherwise
    pub fn number_or_str(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map(RbValue::Int)
            .unwrap_or_else(|_| RbValue::Str(raw.to_string()))
    }
}

impl From<&str> for RbValue {
    fn from(value: &str) -> Self {
        RbValue::Str(value.to_string())
    }
}

impl From<String> for RbValue {
    fn from(value: String) -> Self {
        RbValue::Str(value)
    }
}

impl From<u16> for RbValue {
    fn from(value: u16) -> Self {
        RbValue::Int(i64::from(value))
    }
}

impl From<bool> for RbValue {
    fn from(value: bool) -> Self {
        RbValue::Bool(value)
    }
}

impl fmt::Display for RbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RbValue::Str(s) => write!(f, "\"{}\"", ruby_escape(s)),
            RbValue::Int(i) => write!(f, "{i}"),
            RbValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Escape a string for a double-quoted Ruby literal
pub fn ruby_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '#' => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub address: String,
    pub port: u16,
    pub user_name: String,
    pub password: String,
    pub domain: String,
    pub authentication: String,
    pub enable_starttls_auto: bool,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub from: String,
    pub display_name: String,
    pub reply_to: String,
}

/// Everything that ends up in gitlab.rb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredConfig {
    pub external_url: String,
    pub db: DbSettings,
    pub redis: Option<RedisSettings>,
    pub http_port: u16,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub smtp: Option<SmtpSettings>,
    pub email: Option<EmailSettings>,
    pub backup_path: String,
}

impl DesiredConfig {
    /// Ordered `(setting, value)` pairs, excluding `external_url`
    pub fn settings(&self) -> Vec<(&'static str, RbValue)> {
        let mut settings: Vec<(&'static str, RbValue)> = vec![
            ("gitlab_rails['db_adapter']", self.db.adapter.as_str().into()),
            ("gitlab_rails['db_encoding']", db_encoding(self.db.adapter).into()),
            ("gitlab_rails['db_host']", self.db.host.as_str().into()),
            ("gitlab_rails['db_port']", RbValue::number_or_str(&self.db.port)),
            ("gitlab_rails['db_database']", self.db.database.as_str().into()),
            ("gitlab_rails['db_username']", self.db.user.as_str().into()),
            ("gitlab_rails['db_password']", self.db.password.as_str().into()),
            ("postgresql['enable']", false.into()),
        ];

        if let Some(redis) = &self.redis {
            settings.push(("redis['enable']", false.into()));
            settings.push(("gitlab_rails['redis_host']", redis.host.as_str().into()));
            settings.push(("gitlab_rails['redis_port']", RbValue::number_or_str(&redis.port)));
            if let Some(password) = &redis.password {
                settings.push(("gitlab_rails['redis_password']", password.as_str().into()));
            }
        }

        settings.push(("nginx['listen_port']", self.http_port.into()));
        settings.push(("gitlab_rails['gitlab_ssh_host']", self.ssh_host.as_str().into()));
        settings.push(("gitlab_rails['gitlab_shell_ssh_port']", self.ssh_port.into()));
        settings.push(("gitlab_rails['backup_path']", self.backup_path.as_str().into()));

        if let Some(smtp) = &self.smtp {
            settings.extend([
                ("gitlab_rails['smtp_enable']", true.into()),
                ("gitlab_rails['smtp_address']", smtp.address.as_str().into()),
                ("gitlab_rails['smtp_port']", smtp.port.into()),
                ("gitlab_rails['smtp_user_name']", smtp.user_name.as_str().into()),
                ("gitlab_rails['smtp_password']", smtp.password.as_str().into()),
                ("gitlab_rails['smtp_domain']", smtp.domain.as_str().into()),
                ("gitlab_rails['smtp_authentication']", smtp.authentication.as_str().into()),
                (
                    "gitlab_rails['smtp_enable_starttls_auto']",
                    smtp.enable_starttls_auto.into(),
                ),
                ("gitlab_rails['smtp_tls']", smtp.tls.into()),
            ]);
        }

        if let Some(email) = &self.email {
            settings.extend([
                ("gitlab_rails['gitlab_email_enabled']", true.into()),
                ("gitlab_rails['gitlab_email_from']", email.from.as_str().into()),
                (
                    "gitlab_rails['gitlab_email_display_name']",
                    email.display_name.as_str().into(),
                ),
                ("gitlab_rails['gitlab_email_reply_to']", email.reply_to.as_str().into()),
            ]);
        }

        settings
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "{HEADER}");
        let _ = writeln!(
            out,
            "external_url {}",
            RbValue::Str(self.external_url.clone())
        );
        for (setting, value) in self.settings() {
            let _ = writeln!(out, "{setting} = {value}");
        }
        out
    }
}

fn db_encoding(adapter: DbAdapter) -> &'static str {
    match adapter {
        DbAdapter::Postgresql => "unicode",
        DbAdapter::Mysql2 => "utf8",
    }
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

/// Write `contents` to `path`, returning whether the file content changed
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    let io_error = |source| Error::IoError {
        path: path.display().to_string(),
        source,
    };

    let before = match fs::read(path) {
        Ok(bytes) => Some(digest(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_error(e)),
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)?;

    let changed = before.as_deref() != Some(digest(contents.as_bytes()).as_slice());
    debug!(path = %path.display(), changed, "Wrote rendered file");
    Ok(changed)
}
