use std::collections::BTreeMap;

use tracing::debug;

use crate::store::keys;
use crate::store::{ConfigStore, ConfigStoreExt, StoreResult};

/// Endpoint published by a Redis provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: String,
    pub password: Option<String>,
}

impl RedisEndpoint {
    /// `None` until both host and port have been published
    pub fn from_relation_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let host = data.get("host").filter(|h| !h.is_empty())?;
        let port = data.get("port").filter(|p| !p.is_empty())?;
        Some(Self {
            host: host.clone(),
            port: port.clone(),
            password: data.get("password").filter(|p| !p.is_empty()).cloned(),
        })
    }
}

/// Write host and port; a missing password clears any stored one
pub fn save_redis_conf(store: &mut dyn ConfigStore, endpoint: &RedisEndpoint) -> StoreResult<()> {
    debug!(host = %endpoint.host, port = %endpoint.port, "Saving Redis config");
    store.set_str(keys::REDIS_HOST, &endpoint.host)?;
    store.set_str(keys::REDIS_PORT, &endpoint.port)?;
    match &endpoint.password {
        Some(password) => store.set_str(keys::REDIS_PASS, password),
        None => store.unset(keys::REDIS_PASS),
    }
}

pub fn remove_redis_conf(store: &mut dyn ConfigStore) -> StoreResult<()> {
    store.unset_all(&keys::REDIS)
}
