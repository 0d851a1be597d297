//! Database relations: `db` (MySQL or PostgreSQL), `pgsql` and the
//! superseded `mysql` relation

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::RelationError;
use crate::store::keys::{self, CredentialKeys};
use crate::store::{ConfigStore, ConfigStoreExt, StoreResult};

/// Default port when a MySQL provider does not publish one
pub const MYSQL_DEFAULT_PORT: &str = "3306";

/// Rails database adapter name written to `db_adapter` and gitlab.rb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbAdapter {
    Mysql2,
    Postgresql,
}

impl DbAdapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbAdapter::Mysql2 => "mysql2",
            DbAdapter::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for DbAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbAdapter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql2" | "mysql" => Ok(DbAdapter::Mysql2),
            "postgresql" | "postgres" => Ok(DbAdapter::Postgresql),
            other => Err(format!("unknown database adapter: {other}")),
        }
    }
}

/// Accessors every database endpoint exposes
pub trait DatabaseEndpoint {
    fn host(&self) -> &str;
    fn port(&self) -> &str;
    fn database(&self) -> &str;
    fn user(&self) -> &str;
    fn password(&self) -> &str;
}

/// A non-empty field, or `None` (logged) while the provider is still
/// publishing its settings
fn required(
    data: &BTreeMap<String, String>,
    relation: &'static str,
    field: &'static str,
) -> Option<String> {
    let value = data.get(field).filter(|v| !v.is_empty()).cloned();
    if value.is_none() {
        debug!(relation, field, "Relation data incomplete");
    }
    value
}

/// Flat endpoint published by MySQL providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlEndpoint {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl MySqlEndpoint {
    /// `Ok(None)` until the provider has published every required field
    pub fn from_relation_data(
        data: &BTreeMap<String, String>,
    ) -> Result<Option<Self>, RelationError> {
        Ok(Self::from_fields(data))
    }

    fn from_fields(data: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            host: required(data, "mysql", "host")?,
            port: data
                .get("port")
                .filter(|p| !p.is_empty())
                .cloned()
                .unwrap_or_else(|| MYSQL_DEFAULT_PORT.to_string()),
            database: required(data, "mysql", "database")?,
            user: required(data, "mysql", "user")?,
            password: required(data, "mysql", "password")?,
        })
    }
}

impl DatabaseEndpoint for MySqlEndpoint {
    fn host(&self) -> &str {
        &self.host
    }
    fn port(&self) -> &str {
        &self.port
    }
    fn database(&self) -> &str {
        &self.database
    }
    fn user(&self) -> &str {
        &self.user
    }
    fn password(&self) -> &str {
        &self.password
    }
}

/// Primary server of a PostgreSQL provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEndpoint {
    pub host: String,
    pub port: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

/// PostgreSQL endpoint; connection details are nested under `master`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgreSqlEndpoint {
    pub master: MasterEndpoint,
}

impl PostgreSqlEndpoint {
    /// Parse the `master` libpq connection string.
    ///
    /// `Ok(None)` while the provider has not yet published a complete
    /// `master`, which happens until the requested database has been created.
    pub fn from_relation_data(
        data: &BTreeMap<String, String>,
    ) -> Result<Option<Self>, RelationError> {
        let Some(master) = data.get("master").filter(|m| !m.is_empty()) else {
            return Ok(None);
        };
        let fields = parse_connection_string(master)?;
        Ok(Self::from_fields(&fields))
    }

    fn from_fields(fields: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            master: MasterEndpoint {
                host: required(fields, "pgsql", "host")?,
                port: fields
                    .get("port")
                    .cloned()
                    .unwrap_or_else(|| "5432".to_string()),
                dbname: required(fields, "pgsql", "dbname")?,
                user: required(fields, "pgsql", "user")?,
                password: required(fields, "pgsql", "password")?,
            },
        })
    }
}

impl DatabaseEndpoint for PostgreSqlEndpoint {
    fn host(&self) -> &str {
        &self.master.host
    }
    fn port(&self) -> &str {
        &self.master.port
    }
    fn database(&self) -> &str {
        &self.master.dbname
    }
    fn user(&self) -> &str {
        &self.master.user
    }
    fn password(&self) -> &str {
        &self.master.password
    }
}

/// Payload of the unified `db` relation, which may be served by either
/// database technology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbEndpoint {
    MySql(MySqlEndpoint),
    PostgreSql(PostgreSqlEndpoint),
}

impl DbEndpoint {
    /// A `master` entry marks a PostgreSQL provider, flat `host`/`database`
    /// entries a MySQL one. `Ok(None)` when neither is published yet.
    pub fn from_relation_data(
        data: &BTreeMap<String, String>,
    ) -> Result<Option<Self>, RelationError> {
        if data.contains_key("master") {
            return Ok(PostgreSqlEndpoint::from_relation_data(data)?.map(DbEndpoint::PostgreSql));
        }
        if data.contains_key("database") {
            return Ok(MySqlEndpoint::from_relation_data(data)?.map(DbEndpoint::MySql));
        }
        Ok(None)
    }

    pub fn adapter(&self) -> DbAdapter {
        match self {
            DbEndpoint::MySql(_) => DbAdapter::Mysql2,
            DbEndpoint::PostgreSql(_) => DbAdapter::Postgresql,
        }
    }

    fn endpoint(&self) -> &dyn DatabaseEndpoint {
        match self {
            DbEndpoint::MySql(ep) => ep as &dyn DatabaseEndpoint,
            DbEndpoint::PostgreSql(ep) => ep as &dyn DatabaseEndpoint,
        }
    }
}

impl DatabaseEndpoint for DbEndpoint {
    fn host(&self) -> &str {
        self.endpoint().host()
    }
    fn port(&self) -> &str {
        self.endpoint().port()
    }
    fn database(&self) -> &str {
        self.endpoint().database()
    }
    fn user(&self) -> &str {
        self.endpoint().user()
    }
    fn password(&self) -> &str {
        self.endpoint().password()
    }
}

fn write_credentials(
    store: &mut dyn ConfigStore,
    keys: &CredentialKeys,
    endpoint: &dyn DatabaseEndpoint,
) -> StoreResult<()> {
    store.set_str(keys.host, endpoint.host())?;
    store.set_str(keys.port, endpoint.port())?;
    store.set_str(keys.database, endpoint.database())?;
    store.set_str(keys.user, endpoint.user())?;
    store.set_str(keys.password, endpoint.password())?;
    Ok(())
}

/// Save the unified `db` relation, tagging the adapter it was served by
pub fn save_db_conf(store: &mut dyn ConfigStore, endpoint: &DbEndpoint) -> StoreResult<()> {
    debug!(adapter = %endpoint.adapter(), host = endpoint.host(), "Saving db relation config");
    write_credentials(store, &keys::DB, endpoint)?;
    store.set_str(keys::DB_ADAPTER, endpoint.adapter().as_str())
}

pub fn remove_db_conf(store: &mut dyn ConfigStore) -> StoreResult<()> {
    store.unset_all(&keys::DB.all())?;
    store.unset(keys::DB_ADAPTER)
}

pub fn save_pgsql_conf(
    store: &mut dyn ConfigStore,
    endpoint: &PostgreSqlEndpoint,
) -> StoreResult<()> {
    debug!(host = endpoint.host(), database = endpoint.database(), "Saving PostgreSQL config");
    write_credentials(store, &keys::PGSQL, endpoint)
}

pub fn remove_pgsql_conf(store: &mut dyn ConfigStore) -> StoreResult<()> {
    store.unset_all(&keys::PGSQL.all())
}

pub fn save_mysql_conf(store: &mut dyn ConfigStore, endpoint: &MySqlEndpoint) -> StoreResult<()> {
    debug!(host = endpoint.host(), database = endpoint.database(), "Saving MySQL config");
    write_credentials(store, &keys::MYSQL, endpoint)
}

pub fn remove_mysql_conf(store: &mut dyn ConfigStore) -> StoreResult<()> {
    store.unset_all(&keys::MYSQL.all())
}

/// Parse a libpq `key=value` connection string.
///
/// Values may be single-quoted, with `\'` and `\\` escapes inside quotes.
pub fn parse_connection_string(input: &str) -> Result<BTreeMap<String, String>, RelationError> {
    let mut fields = BTreeMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(RelationError::MalformedConnectionString(format!(
                "expected '=' after {key:?}"
            )));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(RelationError::MalformedConnectionString(format!(
                            "unterminated quoted value for {key:?}"
                        )));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        if key.is_empty() {
            return Err(RelationError::MalformedConnectionString(
                "empty key".to_string(),
            ));
        }
        fields.insert(key, value);
    }

    Ok(fields)
}
