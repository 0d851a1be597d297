//! Collaborators on the machine the unit runs on
//!
//! The engine never calls `apt-get`, `gitlab-ctl` or the Juju hook tools
//! directly; it goes through the traits in this module so that tests can
//! substitute recording fakes.

pub mod apt;
pub mod command;
pub mod juju;

use std::collections::BTreeMap;

use thiserror::Error;

pub use apt::{AptPackageManager, PackageInfo, parse_policy};
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use juju::{HookTools, JujuRelation, JujuStatusReporter};

/// Errors raised by external commands and hook tools
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to spawn {command}: {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {command} exited with {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Unexpected output from {command}: {message}")]
    ParseError { command: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Package manager operations the charm relies on
pub trait PackageManager {
    /// Refresh the package index
    fn update(&self) -> Result<(), HostError>;

    /// Add an apt source line, optionally with a signing key
    fn add_source(&self, line: &str, key: Option<&str>) -> Result<(), HostError>;

    /// Install a package spec such as `gitlab-ce`, `gitlab-ce=13.*` or
    /// `gitlab-ce=13.2.3-ce.0`
    fn install(&self, spec: &str) -> Result<(), HostError>;

    /// Look up installed and available versions; `None` when the index does
    /// not know the package
    fn package_info(&self, name: &str) -> Result<Option<PackageInfo>, HostError>;

    /// Codename of the running distribution, e.g. `focal`
    fn distro_codename(&self) -> Result<String, HostError>;
}

/// Workload status as understood by the Juju agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadState {
    Maintenance,
    Blocked,
    Waiting,
    Active,
}

impl WorkloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadState::Maintenance => "maintenance",
            WorkloadState::Blocked => "blocked",
            WorkloadState::Waiting => "waiting",
            WorkloadState::Active => "active",
        }
    }
}

impl std::fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workload state with its human readable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: WorkloadState,
    pub message: String,
}

impl Status {
    pub fn new(state: WorkloadState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Maintenance, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Blocked, message)
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Waiting, message)
    }

    pub fn active(message: impl Into<String>) -> Self {
        Self::new(WorkloadState::Active, message)
    }
}

/// Sink for unit status updates
pub trait StatusReporter {
    fn set(&self, status: Status) -> Result<(), HostError>;
}

/// One end of a relation: data published by the remote unit and the
/// settings this unit publishes back
pub trait Relation {
    fn remote_data(&self) -> Result<BTreeMap<String, String>, HostError>;

    fn set_local(&mut self, settings: &[(&str, String)]) -> Result<(), HostError>;
}
