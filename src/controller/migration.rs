//! One-way migration of GitLab's data from MySQL to PostgreSQL
//!
//! GitLab dropped MySQL support; units related to both databases copy their
//! data across with pgloader when the operator runs the `migratedb` action.

use tracing::{info, instrument, warn};
use url::Url;

use crate::controller::backend::{self, DbSettings};
use crate::controller::error::{Error, Result};
use crate::controller::reconciler::GitlabReconciler;
use crate::controller::render::write_if_changed;
use crate::controller::state_machine::DatabaseState;
use crate::controller::status::messages;
use crate::host::Status;
use crate::relations::DbAdapter;
use crate::store::{ConfigStoreExt, keys};

pub const PGLOADER_PACKAGE: &str = "pgloader";

fn connection_url(scheme: &str, db: &DbSettings) -> Result<Url> {
    let invalid = |what: &str| {
        Error::ValidationError(format!("cannot build {scheme} URL: invalid {what}"))
    };

    let mut url = Url::parse(&format!("{scheme}://localhost")).map_err(|_| invalid("scheme"))?;
    url.set_host(Some(&db.host)).map_err(|_| invalid("host"))?;
    if !db.port.is_empty() {
        let port: u16 = db.port.trim().parse().map_err(|_| invalid("port"))?;
        url.set_port(Some(port)).map_err(|_| invalid("port"))?;
    }
    url.set_username(&db.user).map_err(|_| invalid("user"))?;
    url.set_password(Some(&db.password))
        .map_err(|_| invalid("password"))?;
    url.set_path(&db.database);
    Ok(url)
}

/// pgloader command file loading GitLab's MySQL data into PostgreSQL
pub fn render_pgloader_commands(mysql: &DbSettings, postgres: &DbSettings) -> Result<String> {
    let from = connection_url("mysql", mysql)?;
    let into = connection_url("postgresql", postgres)?;
    let schema = mysql.database.replace('\'', "''");

    Ok(format!(
        "LOAD DATABASE
     FROM {from}
     INTO {into}

WITH include no drop, truncate, disable triggers, create no tables,
     create no indexes, preserve index names, no foreign keys,
     data only

ALTER SCHEMA '{schema}' RENAME TO 'public'
;
"
    ))
}

impl GitlabReconciler {
    /// Copy GitLab's data from the related MySQL database to PostgreSQL.
    ///
    /// Returns whether a migration ran.
    #[instrument(skip(self))]
    pub fn migrate_db(&mut self) -> Result<bool> {
        let state = self.state()?;
        match state {
            DatabaseState::MigrationPending => {}
            DatabaseState::MigrationComplete => {
                info!("MySQL data already migrated to PostgreSQL");
                self.report(state.settled_status())?;
                return Ok(false);
            }
            _ => {
                warn!(%state, "Migration needs both MySQL and PostgreSQL related, skipping");
                return Ok(false);
            }
        }

        let store = self.ctx.store.as_ref();
        let mysql = backend::legacy_mysql_settings(store)?.ok_or_else(|| {
            Error::ValidationError("no MySQL credentials to migrate from".to_string())
        })?;
        let postgres = backend::select_backend(store)?
            .map(|b| b.settings)
            .filter(|s| s.adapter == DbAdapter::Postgresql)
            .ok_or_else(|| {
                Error::ValidationError("no PostgreSQL credentials to migrate to".to_string())
            })?;

        self.report(Status::maintenance(messages::MIGRATING))?;
        info!("Installing pgloader");
        self.ctx.packages.install(PGLOADER_PACKAGE)?;

        let commands = render_pgloader_commands(&mysql, &postgres)?;
        write_if_changed(&self.ctx.paths.pgloader_commands, &commands)?;

        // GitLab must create its PostgreSQL schema before pgloader copies data
        self.write_config()?;
        self.gitlab_reconfigure_run()?;

        let commands_path = self.ctx.paths.pgloader_commands.display().to_string();
        info!(commands = %commands_path, "Running pgloader");
        self.ctx
            .commands
            .run_checked(&self.ctx.paths.pgloader, &[commands_path.as_str()])?;

        self.ctx.store.set_bool(keys::MYSQL_MIGRATION_RUN, true)?;
        self.report(Status::blocked(messages::REMOVE_LEGACY_RELATION))?;
        info!("Migration from MySQL to PostgreSQL complete");
        Ok(true)
    }
}
