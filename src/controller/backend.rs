//! Database backend bookkeeping
//!
//! Three key groups can describe a database: `pgsql_*` from the PostgreSQL
//! relation, `db_*` from the unified `db` relation (tagged by `db_adapter`)
//! and `mysql_*` from the superseded MySQL relation. A group only counts when
//! all five of its keys are set.

use tracing::{debug, warn};

use crate::relations::DbAdapter;
use crate::store::keys::{self, CredentialKeys};
use crate::store::{ConfigStore, ConfigStoreExt, StoreResult};

/// Which key group a backend was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendSource {
    Pgsql,
    Db,
    Mysql,
}

impl BackendSource {
    pub fn keys(&self) -> &'static CredentialKeys {
        match self {
            BackendSource::Pgsql => &keys::PGSQL,
            BackendSource::Db => &keys::DB,
            BackendSource::Mysql => &keys::MYSQL,
        }
    }
}

/// Connection settings for the database GitLab should use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub adapter: DbAdapter,
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub source: BackendSource,
    pub settings: DbSettings,
}

fn group_configured(store: &dyn ConfigStore, keys: &CredentialKeys) -> StoreResult<bool> {
    store.all_set(&keys.all())
}

pub fn pgsql_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    let configured = group_configured(store, &keys::PGSQL)?;
    if configured {
        debug!("PostgreSQL is related and configured in the unit store");
    }
    Ok(configured)
}

pub fn mysql_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    group_configured(store, &keys::MYSQL)
}

pub fn db_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    group_configured(store, &keys::DB)
}

/// `db_*` keys describing a MySQL server (tagged `mysql2`, or untagged as
/// written by older charm revisions)
pub fn legacy_db_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    Ok(db_configured(store)? && db_adapter(store)? == DbAdapter::Mysql2)
}

pub fn redis_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    let configured = store.all_set(&[keys::REDIS_HOST, keys::REDIS_PORT])?;
    if configured {
        debug!("Redis is related and configured in the unit store");
    }
    Ok(configured)
}

/// Any database group is complete
pub fn any_db_configured(store: &dyn ConfigStore) -> StoreResult<bool> {
    Ok(pgsql_configured(store)? || db_configured(store)? || mysql_configured(store)?)
}

pub fn mysql_migrated(store: &dyn ConfigStore) -> StoreResult<bool> {
    store.is_set(keys::MYSQL_MIGRATION_RUN)
}

/// Adapter tag of the `db_*` group; untagged means MySQL
pub fn db_adapter(store: &dyn ConfigStore) -> StoreResult<DbAdapter> {
    let Some(raw) = store.get_string(keys::DB_ADAPTER)? else {
        return Ok(DbAdapter::Mysql2);
    };
    if raw.is_empty() {
        return Ok(DbAdapter::Mysql2);
    }
    Ok(raw.parse().unwrap_or_else(|e| {
        warn!(error = %e, "Treating unknown db_adapter as mysql2");
        DbAdapter::Mysql2
    }))
}

pub fn read_settings(
    store: &dyn ConfigStore,
    source: BackendSource,
    adapter: DbAdapter,
) -> StoreResult<DbSettings> {
    let keys = source.keys();
    let get = |key: &str| -> StoreResult<String> { Ok(store.get_string(key)?.unwrap_or_default()) };
    Ok(DbSettings {
        adapter,
        host: get(keys.host)?,
        port: get(keys.port)?,
        database: get(keys.database)?,
        user: get(keys.user)?,
        password: get(keys.password)?,
    })
}

/// Pick the backend GitLab should run on: PostgreSQL first, then the unified
/// `db` relation, then the superseded MySQL relation.
pub fn select_backend(store: &dyn ConfigStore) -> StoreResult<Option<Backend>> {
    let (source, adapter) = if pgsql_configured(store)? {
        (BackendSource::Pgsql, DbAdapter::Postgresql)
    } else if db_configured(store)? {
        (BackendSource::Db, db_adapter(store)?)
    } else if mysql_configured(store)? {
        (BackendSource::Mysql, DbAdapter::Mysql2)
    } else {
        return Ok(None);
    };

    Ok(Some(Backend {
        source,
        settings: read_settings(store, source, adapter)?,
    }))
}

/// The MySQL database to migrate away from, if one is related
pub fn legacy_mysql_settings(store: &dyn ConfigStore) -> StoreResult<Option<DbSettings>> {
    if legacy_db_configured(store)? {
        return Ok(Some(read_settings(store, BackendSource::Db, DbAdapter::Mysql2)?));
    }
    if mysql_configured(store)? {
        return Ok(Some(read_settings(store, BackendSource::Mysql, DbAdapter::Mysql2)?));
    }
    Ok(None)
}
