use std::path::PathBuf;

use tracing::debug;

use crate::config::CharmConfig;
use crate::host::{CommandRunner, PackageManager, StatusReporter};
use crate::store::ConfigStore;

/// Locations of files and programs the reconciler touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub gitlab_config: PathBuf,
    pub pgloader_commands: PathBuf,
    pub gitlab_ctl: String,
    pub gitlab_backup: String,
    pub pgloader: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            gitlab_config: PathBuf::from("/etc/gitlab/gitlab.rb"),
            pgloader_commands: PathBuf::from("/etc/gitlab/commands.load"),
            gitlab_ctl: "/usr/bin/gitlab-ctl".to_string(),
            gitlab_backup: "/usr/bin/gitlab-backup".to_string(),
            pgloader: "/usr/bin/pgloader".to_string(),
        }
    }
}

/// Everything one hook or action invocation works with
pub struct Context {
    /// Charm configuration snapshot
    pub config: CharmConfig,
    /// Unit key/value store
    pub store: Box<dyn ConfigStore>,
    pub packages: Box<dyn PackageManager>,
    pub commands: Box<dyn CommandRunner>,
    pub status: Box<dyn StatusReporter>,
    pub paths: Paths,
    /// Fully qualified name of this machine; the bare host name until
    /// resolved with [`local_fqdn`]
    pub fqdn: String,
}

impl Context {
    pub fn new(
        config: CharmConfig,
        store: Box<dyn ConfigStore>,
        packages: Box<dyn PackageManager>,
        commands: Box<dyn CommandRunner>,
        status: Box<dyn StatusReporter>,
    ) -> Self {
        Self {
            config,
            store,
            packages,
            commands,
            status,
            paths: Paths::default(),
            fqdn: local_hostname(),
        }
    }

    pub fn with_paths(mut self, paths: Paths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = fqdn.into();
        self
    }
}

/// Host name of this machine, `localhost` if it cannot be determined
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Canonical name of this machine as reported by `hostname --fqdn`,
/// falling back to the bare host name when it cannot be resolved
pub fn local_fqdn(commands: &dyn CommandRunner) -> String {
    let resolved = commands
        .run_checked("hostname", &["--fqdn"])
        .map(|output| output.stdout.trim().to_string());
    match resolved {
        Ok(fqdn) if !fqdn.is_empty() => fqdn,
        Ok(_) => local_hostname(),
        Err(e) => {
            debug!(error = %e, "Could not resolve FQDN, using host name");
            local_hostname()
        }
    }
}
