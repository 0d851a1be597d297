//! Relation adapters
//!
//! Each adapter turns the string map a remote unit publishes into typed
//! endpoint data and writes it to (or removes it from) the unit store, or
//! publishes this unit's settings to the remote side.

pub mod db;
pub mod redis;
pub mod reverseproxy;
pub mod runner;

use thiserror::Error;

use crate::host::HostError;
use crate::store::StoreError;

pub use db::{
    DatabaseEndpoint, DbAdapter, DbEndpoint, MasterEndpoint, MySqlEndpoint, PostgreSqlEndpoint,
    parse_connection_string,
};
pub use redis::RedisEndpoint;
pub use reverseproxy::{
    ProxyConfig, ProxyConfigError, ProxyMode, ProxyRule, ProxyStatus, ReverseProxyRequires,
    build_proxy_rules,
};
pub use runner::{RunnerProvides, RunnerSettings};

#[derive(Error, Debug)]
pub enum RelationError {
    #[error("Malformed connection string: {0}")]
    MalformedConnectionString(String),

    #[error(transparent)]
    ProxyConfig(#[from] ProxyConfigError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
