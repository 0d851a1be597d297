pub mod backend;
pub mod context;
pub mod error;
pub mod migration;
pub mod reconciler;
pub mod render;
pub mod state_machine;
pub mod status;
pub mod upgrade;
pub mod validation;

pub use backend::{Backend, BackendSource, DbSettings, select_backend};
pub use context::{Context, Paths};
pub use error::{Error, Result};
pub use migration::render_pgloader_commands;
pub use reconciler::GitlabReconciler;
pub use render::{DesiredConfig, RbValue};
pub use state_machine::{DatabaseFacts, DatabaseState, determine_state};
pub use status::messages;
pub use upgrade::{DesiredVersion, MAX_UPGRADE_ROUNDS, PackageVersion, UpgradeStep, plan_step};
pub use validation::validate_config;
