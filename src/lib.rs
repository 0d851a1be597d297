pub mod config;
pub mod controller;
pub mod hooks;
pub mod host;
pub mod relations;
pub mod store;

pub use config::{CharmConfig, ConfigError};
pub use controller::{
    Context, DatabaseState, Error, GitlabReconciler, MAX_UPGRADE_ROUNDS, Paths, Result,
    determine_state,
};
pub use hooks::{CharmAction, HookEvent, handle_hook, run_action};
pub use host::{HostError, Status, WorkloadState};
pub use store::{ConfigStore, ConfigStoreExt, MemoryStore, SqliteStore, StoreError};
