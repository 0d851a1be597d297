//! Thin wrappers around the Juju hook tools
//!
//! The hook tools (`config-get`, `relation-get`, `status-set`, ...) are
//! executables the Juju agent places on `PATH` while a hook or action runs.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use super::command::{CommandRunner, SystemCommandRunner};
use super::{HostError, Relation, Status, StatusReporter};

#[derive(Clone)]
pub struct HookTools {
    runner: Rc<dyn CommandRunner>,
}

impl Default for HookTools {
    fn default() -> Self {
        Self::new(Rc::new(SystemCommandRunner))
    }
}

impl HookTools {
    pub fn new(runner: Rc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn parse_json(command: &str, stdout: &str) -> Result<Value, HostError> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed).map_err(|e| HostError::ParseError {
            command: command.to_string(),
            message: e.to_string(),
        })
    }

    /// Full charm configuration as JSON
    pub fn config_get(&self) -> Result<Value, HostError> {
        let output = self.runner.run_checked("config-get", &["--format=json"])?;
        Self::parse_json("config-get", &output.stdout)
    }

    /// All settings published by `unit` on the given relation
    pub fn relation_get(
        &self,
        relation_id: Option<&str>,
        unit: Option<&str>,
    ) -> Result<BTreeMap<String, String>, HostError> {
        let mut args = vec!["--format=json"];
        if let Some(id) = relation_id {
            args.extend(["-r", id]);
        }
        args.push("-");
        if let Some(unit) = unit {
            args.push(unit);
        }

        let output = self.runner.run_checked("relation-get", &args)?;
        let data = match Self::parse_json("relation-get", &output.stdout)? {
            Value::Object(map) => map
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => None,
                    Value::String(s) => Some((k, s)),
                    other => Some((k, other.to_string())),
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        debug!(keys = ?data.keys().collect::<Vec<_>>(), "Read relation data");
        Ok(data)
    }

    pub fn relation_set(
        &self,
        relation_id: Option<&str>,
        settings: &[(&str, String)],
    ) -> Result<(), HostError> {
        let pairs: Vec<String> = settings.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args: Vec<&str> = Vec::with_capacity(pairs.len() + 2);
        if let Some(id) = relation_id {
            args.extend(["-r", id]);
        }
        args.extend(pairs.iter().map(String::as_str));
        self.runner.run_checked("relation-set", &args)?;
        Ok(())
    }

    pub fn status_set(&self, status: &Status) -> Result<(), HostError> {
        self.runner
            .run_checked("status-set", &[status.state.as_str(), &status.message])?;
        Ok(())
    }

    pub fn action_set(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.runner
            .run_checked("action-set", &[&format!("{key}={value}")])?;
        Ok(())
    }

    pub fn action_fail(&self, message: &str) -> Result<(), HostError> {
        self.runner.run_checked("action-fail", &[message])?;
        Ok(())
    }
}

/// Reports status through `status-set`
#[derive(Clone, Default)]
pub struct JujuStatusReporter {
    tools: HookTools,
}

impl JujuStatusReporter {
    pub fn new(tools: HookTools) -> Self {
        Self { tools }
    }
}

impl StatusReporter for JujuStatusReporter {
    fn set(&self, status: Status) -> Result<(), HostError> {
        self.tools.status_set(&status)
    }
}

/// The relation the current hook was fired for
#[derive(Clone)]
pub struct JujuRelation {
    tools: HookTools,
    relation_id: Option<String>,
    remote_unit: Option<String>,
}

impl JujuRelation {
    pub fn new(tools: HookTools, relation_id: Option<String>, remote_unit: Option<String>) -> Self {
        Self {
            tools,
            relation_id,
            remote_unit,
        }
    }
}

impl Relation for JujuRelation {
    fn remote_data(&self) -> Result<BTreeMap<String, String>, HostError> {
        self.tools
            .relation_get(self.relation_id.as_deref(), self.remote_unit.as_deref())
    }

    fn set_local(&mut self, settings: &[(&str, String)]) -> Result<(), HostError> {
        self.tools
            .relation_set(self.relation_id.as_deref(), settings)
    }
}
