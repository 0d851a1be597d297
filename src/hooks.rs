//! Hook and action dispatch
//!
//! Juju runs the charm binary once per hook or action. The hook name (from
//! `JUJU_HOOK_NAME` or the command line) is parsed into a [`HookEvent`] and
//! routed to the reconciler; relation hooks receive the relation they fired
//! for as a [`Relation`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, instrument, warn};

use crate::controller::backend;
use crate::controller::status::{self, messages};
use crate::controller::{Error, GitlabReconciler, Result};
use crate::host::{Relation, Status};
use crate::relations::{DbEndpoint, MySqlEndpoint, PostgreSqlEndpoint, RedisEndpoint};

/// Database name requested from the PostgreSQL charm
pub const PGSQL_DATABASE: &str = "gitlab";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Unified database relation (MySQL or PostgreSQL)
    Db,
    Pgsql,
    /// Superseded MySQL relation
    Mysql,
    Redis,
    ReverseProxy,
    Runner,
}

impl RelationKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            RelationKind::Db => "db",
            RelationKind::Pgsql => "pgsql",
            RelationKind::Mysql => "mysql",
            RelationKind::Redis => "redis",
            RelationKind::ReverseProxy => "reverseproxy",
            RelationKind::Runner => "runner",
        }
    }

    fn from_endpoint(name: &str) -> Option<Self> {
        match name {
            "db" => Some(RelationKind::Db),
            "pgsql" => Some(RelationKind::Pgsql),
            "mysql" => Some(RelationKind::Mysql),
            "redis" => Some(RelationKind::Redis),
            "reverseproxy" => Some(RelationKind::ReverseProxy),
            "runner" => Some(RelationKind::Runner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationPhase {
    Joined,
    Changed,
    Departed,
    Broken,
}

impl RelationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationPhase::Joined => "joined",
            RelationPhase::Changed => "changed",
            RelationPhase::Departed => "departed",
            RelationPhase::Broken => "broken",
        }
    }

    /// The remote side is going away
    pub fn is_removal(&self) -> bool {
        matches!(self, RelationPhase::Departed | RelationPhase::Broken)
    }
}

/// A Juju hook the charm reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Install,
    Start,
    ConfigChanged,
    UpgradeCharm,
    UpdateStatus,
    Relation {
        kind: RelationKind,
        phase: RelationPhase,
    },
}

impl HookEvent {
    /// Parse a hook name, or `None` for hooks the charm does not react to
    /// (`stop`, `leader-elected`, `*-relation-created` and the like)
    pub fn from_hook_name(name: &str) -> Option<Self> {
        match name.parse() {
            Ok(event) => Some(event),
            Err(_) => {
                debug!(hook = name, "No handler for hook, ignoring");
                None
            }
        }
    }
}

impl FromStr for HookEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let event = match s {
            "install" => HookEvent::Install,
            "start" => HookEvent::Start,
            "config-changed" => HookEvent::ConfigChanged,
            "upgrade-charm" => HookEvent::UpgradeCharm,
            "update-status" => HookEvent::UpdateStatus,
            _ => {
                let (endpoint, phase) = s
                    .split_once("-relation-")
                    .ok_or_else(|| Error::UnknownHook(s.to_string()))?;
                let kind = RelationKind::from_endpoint(endpoint)
                    .ok_or_else(|| Error::UnknownHook(s.to_string()))?;
                let phase = match phase {
                    "joined" => RelationPhase::Joined,
                    "changed" => RelationPhase::Changed,
                    "departed" => RelationPhase::Departed,
                    "broken" => RelationPhase::Broken,
                    _ => return Err(Error::UnknownHook(s.to_string())),
                };
                HookEvent::Relation { kind, phase }
            }
        };
        Ok(event)
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::Install => write!(f, "install"),
            HookEvent::Start => write!(f, "start"),
            HookEvent::ConfigChanged => write!(f, "config-changed"),
            HookEvent::UpgradeCharm => write!(f, "upgrade-charm"),
            HookEvent::UpdateStatus => write!(f, "update-status"),
            HookEvent::Relation { kind, phase } => {
                write!(f, "{}-relation-{}", kind.endpoint(), phase.as_str())
            }
        }
    }
}

/// Operator-invoked actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharmAction {
    Reconfigure,
    Upgrade,
    MigrateDb,
    Backup,
}

impl FromStr for CharmAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reconfigure" => Ok(CharmAction::Reconfigure),
            "upgrade" => Ok(CharmAction::Upgrade),
            "migratedb" => Ok(CharmAction::MigrateDb),
            "backup" => Ok(CharmAction::Backup),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// Run `configure()` once a database and Redis are both available,
/// otherwise report which relations are missing
pub fn reconfigure_if_ready(reconciler: &mut GitlabReconciler) -> Result<bool> {
    let store = reconciler.context().store.as_ref();
    let db_available = backend::any_db_configured(store)?;
    let redis_available = backend::redis_configured(store)?;
    if let Some(missing) = status::missing_relations(db_available, redis_available) {
        info!(db_available, redis_available, "DB and/or Redis unconfigured, skipping configure");
        status::report(reconciler.context().status.as_ref(), missing)?;
        return Ok(false);
    }
    reconciler.configure()
}

/// Handle one hook invocation.
///
/// Configuration problems are reported as a blocked status instead of
/// failing the hook.
#[instrument(skip(reconciler, relation, local_unit), fields(hook = %event))]
pub fn handle_hook(
    reconciler: &mut GitlabReconciler,
    event: HookEvent,
    relation: &mut dyn Relation,
    local_unit: &str,
) -> Result<()> {
    info!("Handling hook");
    match dispatch_hook(reconciler, event, relation, local_unit) {
        Err(e) if e.is_config_problem() => {
            warn!(error = %e, "Configuration problem");
            status::report(reconciler.context().status.as_ref(), Status::blocked(e.to_string()))
        }
        other => other,
    }
}

fn dispatch_hook(
    reconciler: &mut GitlabReconciler,
    event: HookEvent,
    relation: &mut dyn Relation,
    local_unit: &str,
) -> Result<()> {
    match event {
        HookEvent::Install => {
            reconciler.initial_install()?;
            reconfigure_if_ready(reconciler)?;
        }
        HookEvent::Start | HookEvent::ConfigChanged | HookEvent::UpdateStatus => {
            reconfigure_if_ready(reconciler)?;
        }
        HookEvent::UpgradeCharm => {
            reconciler.migrate_db_config()?;
            if !backend::db_configured(reconciler.context().store.as_ref())? {
                reconciler.migrate_mysql_config()?;
            }
            reconfigure_if_ready(reconciler)?;
        }
        HookEvent::Relation { kind, phase } => {
            handle_relation(reconciler, kind, phase, relation, local_unit)?;
        }
    }
    Ok(())
}

fn handle_relation(
    reconciler: &mut GitlabReconciler,
    kind: RelationKind,
    phase: RelationPhase,
    relation: &mut dyn Relation,
    local_unit: &str,
) -> Result<()> {
    let report = |reconciler: &GitlabReconciler, status: Status| {
        status::report(reconciler.context().status.as_ref(), status)
    };

    if phase.is_removal() {
        match kind {
            RelationKind::Db | RelationKind::Pgsql | RelationKind::Mysql => {
                report(reconciler, Status::maintenance(messages::CLEANING_DB))?;
                match kind {
                    RelationKind::Db => reconciler.remove_db()?,
                    RelationKind::Pgsql => reconciler.remove_pgsql()?,
                    _ => reconciler.remove_mysql()?,
                }
            }
            RelationKind::Redis => {
                report(reconciler, Status::maintenance(messages::CLEANING_REDIS))?;
                reconciler.remove_redis()?;
            }
            RelationKind::ReverseProxy => {
                report(reconciler, Status::maintenance(messages::REMOVING_PROXY))?;
                reconciler.remove_proxy()?;
            }
            RelationKind::Runner => {
                debug!("Runner departed, nothing to clean up");
                return Ok(());
            }
        }
        reconfigure_if_ready(reconciler)?;
        return Ok(());
    }

    match kind {
        RelationKind::Pgsql if phase == RelationPhase::Joined => {
            info!(database = PGSQL_DATABASE, "Requesting database from PostgreSQL");
            relation.set_local(&[("database", PGSQL_DATABASE.to_string())])?;
            if !backend::pgsql_configured(reconciler.context().store.as_ref())? {
                report(reconciler, Status::blocked(messages::WAITING_FOR_PGSQL))?;
            }
            return Ok(());
        }
        RelationKind::Pgsql => {
            let data = relation.remote_data()?;
            match PostgreSqlEndpoint::from_relation_data(&data)? {
                Some(endpoint) => reconciler.save_pgsql(&endpoint)?,
                None => {
                    info!("PostgreSQL has not published connection details yet");
                    report(reconciler, Status::blocked(messages::WAITING_FOR_PGSQL))?;
                    return Ok(());
                }
            }
        }
        RelationKind::Db => {
            let data = relation.remote_data()?;
            match DbEndpoint::from_relation_data(&data)? {
                Some(endpoint) => {
                    info!(adapter = %endpoint.adapter(), "Found DB configuration provided from endpoint");
                    reconciler.save_db(&endpoint)?;
                }
                None => debug!("db relation data not ready"),
            }
        }
        RelationKind::Mysql => {
            let data = relation.remote_data()?;
            match MySqlEndpoint::from_relation_data(&data)? {
                Some(endpoint) => reconciler.save_mysql(&endpoint)?,
                None => debug!("mysql relation data not ready"),
            }
        }
        RelationKind::Redis => {
            let data = relation.remote_data()?;
            match RedisEndpoint::from_relation_data(&data) {
                Some(endpoint) => reconciler.save_redis(&endpoint)?,
                None => debug!("redis relation data not ready"),
            }
        }
        RelationKind::ReverseProxy => {
            if !reconciler.proxy_configured()? {
                report(reconciler, Status::maintenance(messages::APPLYING_PROXY))?;
                reconciler.configure_proxy(relation)?;
            }
            reconciler.proxy_status(relation, local_unit)?.into_result()?;
        }
        RelationKind::Runner => {
            reconciler.publish_runner(relation)?;
            return Ok(());
        }
    }

    reconfigure_if_ready(reconciler)?;
    Ok(())
}

/// Run an action, returning the values to publish with `action-set`
#[instrument(skip(reconciler))]
pub fn run_action(
    reconciler: &mut GitlabReconciler,
    action: CharmAction,
) -> Result<BTreeMap<String, String>> {
    info!("Running action");
    let mut results = BTreeMap::new();
    match action {
        CharmAction::Reconfigure => {
            let rendered = reconciler.reconfigure()?;
            if rendered {
                let state = reconciler.state()?;
                status::report(reconciler.context().status.as_ref(), state.settled_status())?;
            }
            results.insert("reconfigured".to_string(), rendered.to_string());
        }
        CharmAction::Upgrade => {
            let upgraded = reconciler.upgrade_gitlab()?;
            let state = reconciler.state()?;
            status::report(reconciler.context().status.as_ref(), state.settled_status())?;
            results.insert("upgraded".to_string(), upgraded.to_string());
        }
        CharmAction::MigrateDb => {
            let migrated = reconciler.migrate_db()?;
            results.insert("migrated".to_string(), migrated.to_string());
        }
        CharmAction::Backup => {
            let name = reconciler.backup()?;
            results.insert("backup".to_string(), name);
        }
    }
    Ok(results)
}
