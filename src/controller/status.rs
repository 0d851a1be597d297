//! Unit status messages and the missing-relation checks
//!
//! Status messages are part of the charm's user interface; operators search
//! for them, so they are kept in one place.

use tracing::debug;

use crate::host::{Status, StatusReporter};

use super::error::Result;

/// Status messages reported by the charm
pub mod messages {
    pub const HEALTHY: &str = "GitLab installed and configured";
    pub const INSTALLED: &str = "GitLab Installed";
    pub const INSTALLING: &str = "Installing GitLab";
    pub const CONFIGURING: &str = "Configuring GitLab";
    pub const UPGRADING: &str = "Upgrading GitLab";
    pub const MIGRATING: &str = "Migrating GitLab data from MySQL to PostgreSQL";
    pub const BACKING_UP: &str = "Creating GitLab backup";
    pub const APPLYING_PROXY: &str = "Applying reverse proxy configuration";
    pub const REMOVING_PROXY: &str = "Removing reverse proxy relation";
    pub const CLEANING_DB: &str = "Cleaning up removed database relation";
    pub const CLEANING_REDIS: &str = "Cleaning up removed Redis relation";

    pub const MISSING_DB_CONFIG: &str =
        "DB configuration is missing. Verify database relations to continue.";
    pub const MISSING_DB_RELATION: &str = "Missing relation to either PostgreSQL or MySQL";
    pub const MISSING_REDIS_RELATION: &str = "Missing relation to Redis";
    pub const MISSING_ALL_RELATIONS: &str =
        "Missing relation to Redis and either PostgreSQL or MySQL";
    pub const WAITING_FOR_PGSQL: &str = "Waiting for PostgreSQL database";
    pub const MIGRATION_PENDING: &str =
        "MySQL and PostgreSQL are both related, run the migratedb action to migrate";
    pub const REMOVE_LEGACY_RELATION: &str =
        "Migration to PostgreSQL complete, remove the MySQL relation";
}

/// Blocked status naming the relations still missing, `None` when both a
/// database and Redis are available
pub fn missing_relations(db_available: bool, redis_available: bool) -> Option<Status> {
    let message = match (db_available, redis_available) {
        (true, true) => return None,
        (false, true) => messages::MISSING_DB_RELATION,
        (true, false) => messages::MISSING_REDIS_RELATION,
        (false, false) => messages::MISSING_ALL_RELATIONS,
    };
    Some(Status::blocked(message))
}

/// Report a status, logging it alongside
pub fn report(reporter: &dyn StatusReporter, status: Status) -> Result<()> {
    debug!(state = %status.state, message = %status.message, "Setting unit status");
    reporter.set(status)?;
    Ok(())
}
