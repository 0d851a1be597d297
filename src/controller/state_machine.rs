//! Database state decision table
//!
//! Reconciliation behaves differently depending on which database relations
//! are present and whether the one-way MySQL to PostgreSQL migration has
//! already run:
//!
//! ```text
//! pgsql  legacy MySQL  migrated   state
//!  no       no            -       Unconfigured (or PostgreSql via `db`)
//!  yes      no            -       PostgreSql
//!  no       yes           -       MySql
//!  yes      yes           no      MigrationPending
//!  yes      yes           yes     MigrationComplete
//! ```

use std::fmt;

use crate::controller::backend;
use crate::host::Status;
use crate::store::{ConfigStore, StoreResult};

use super::status::messages;

/// Observed relation facts the decision is made from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseFacts {
    /// `pgsql_*` group complete
    pub pgsql: bool,
    /// `db_*` group complete and tagged `postgresql`
    pub postgres_via_db: bool,
    /// A MySQL group complete (`db_*` tagged mysql2 or `mysql_*`)
    pub legacy_mysql: bool,
    /// Migration marker set
    pub migrated: bool,
}

impl DatabaseFacts {
    pub fn gather(store: &dyn ConfigStore) -> StoreResult<Self> {
        let db = backend::db_configured(store)?;
        let legacy_db = backend::legacy_db_configured(store)?;
        Ok(Self {
            pgsql: backend::pgsql_configured(store)?,
            postgres_via_db: db && !legacy_db,
            legacy_mysql: legacy_db || backend::mysql_configured(store)?,
            migrated: backend::mysql_migrated(store)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseState {
    /// No complete database group
    Unconfigured,
    /// Running on PostgreSQL only
    PostgreSql,
    /// Running on MySQL only
    MySql,
    /// Both MySQL and PostgreSQL related, waiting for the migratedb action
    MigrationPending,
    /// Migration done, the MySQL relation still needs removing
    MigrationComplete,
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseState::Unconfigured => write!(f, "Unconfigured"),
            DatabaseState::PostgreSql => write!(f, "PostgreSql"),
            DatabaseState::MySql => write!(f, "MySql"),
            DatabaseState::MigrationPending => write!(f, "MigrationPending"),
            DatabaseState::MigrationComplete => write!(f, "MigrationComplete"),
        }
    }
}

impl DatabaseState {
    /// Whether gitlab.rb may be rendered in this state
    pub fn can_render(&self) -> bool {
        matches!(
            self,
            DatabaseState::PostgreSql | DatabaseState::MySql | DatabaseState::MigrationComplete
        )
    }

    /// Status to report once reconciliation in this state has finished
    pub fn settled_status(&self) -> Status {
        match self {
            DatabaseState::Unconfigured => Status::blocked(messages::MISSING_DB_CONFIG),
            DatabaseState::PostgreSql | DatabaseState::MySql => Status::active(messages::HEALTHY),
            DatabaseState::MigrationPending => Status::blocked(messages::MIGRATION_PENDING),
            DatabaseState::MigrationComplete => Status::blocked(messages::REMOVE_LEGACY_RELATION),
        }
    }
}

/// Apply the decision table
pub fn determine_state(facts: &DatabaseFacts) -> DatabaseState {
    let postgres = facts.pgsql || facts.postgres_via_db;
    match (postgres, facts.legacy_mysql) {
        (false, false) => DatabaseState::Unconfigured,
        (true, false) => DatabaseState::PostgreSql,
        (false, true) => DatabaseState::MySql,
        (true, true) if facts.migrated => DatabaseState::MigrationComplete,
        (true, true) => DatabaseState::MigrationPending,
    }
}
