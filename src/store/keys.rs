//! Store key names
//!
//! These names are the on-disk contract with units deployed by earlier charm
//! revisions and must not change.

pub const PGSQL_HOST: &str = "pgsql_host";
pub const PGSQL_PORT: &str = "pgsql_port";
pub const PGSQL_DB: &str = "pgsql_db";
pub const PGSQL_USER: &str = "pgsql_user";
pub const PGSQL_PASS: &str = "pgsql_pass";

pub const MYSQL_HOST: &str = "mysql_host";
pub const MYSQL_PORT: &str = "mysql_port";
pub const MYSQL_DB: &str = "mysql_db";
pub const MYSQL_USER: &str = "mysql_user";
pub const MYSQL_PASS: &str = "mysql_pass";

pub const DB_HOST: &str = "db_host";
pub const DB_PORT: &str = "db_port";
pub const DB_DB: &str = "db_db";
pub const DB_USER: &str = "db_user";
pub const DB_PASS: &str = "db_pass";
pub const DB_ADAPTER: &str = "db_adapter";

pub const REDIS_HOST: &str = "redis_host";
pub const REDIS_PORT: &str = "redis_port";
pub const REDIS_PASS: &str = "redis_pass";

/// Set once the MySQL to PostgreSQL migration has completed
pub const MYSQL_MIGRATION_RUN: &str = "mysql_migration_run";

/// Set while a reverse proxy has accepted our forwarding rules
pub const REVERSEPROXY_CONFIGURED: &str = "reverseproxy_configured";

/// Set between writing a changed gitlab.rb and a successful reconfigure
pub const RECONFIGURE_PENDING: &str = "gitlab_reconfigure_pending";

/// A group of five keys describing one database endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialKeys {
    pub host: &'static str,
    pub port: &'static str,
    pub database: &'static str,
    pub user: &'static str,
    pub password: &'static str,
}

impl CredentialKeys {
    pub const fn all(&self) -> [&'static str; 5] {
        [self.host, self.port, self.database, self.user, self.password]
    }
}

pub const PGSQL: CredentialKeys = CredentialKeys {
    host: PGSQL_HOST,
    port: PGSQL_PORT,
    database: PGSQL_DB,
    user: PGSQL_USER,
    password: PGSQL_PASS,
};

pub const MYSQL: CredentialKeys = CredentialKeys {
    host: MYSQL_HOST,
    port: MYSQL_PORT,
    database: MYSQL_DB,
    user: MYSQL_USER,
    password: MYSQL_PASS,
};

pub const DB: CredentialKeys = CredentialKeys {
    host: DB_HOST,
    port: DB_PORT,
    database: DB_DB,
    user: DB_USER,
    password: DB_PASS,
};

pub const REDIS: [&str; 3] = [REDIS_HOST, REDIS_PORT, REDIS_PASS];
