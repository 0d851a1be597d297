//! Fakes and builders for reconciler tests
//!
//! Every fake shares its state through `Rc<RefCell<..>>`, so a test keeps a
//! clone of the handle and inspects what the reconciler did after handing
//! the boxed fake to a [`Context`].
//!
//! ```rust,ignore
//! let harness = Harness::new().installed("13.0.0-ce.0").available(&["13.0.0-ce.0"]);
//! let mut reconciler = harness.reconciler(CharmConfig::default(), ready_store());
//! reconciler.configure().unwrap();
//! assert_eq!(harness.commands.reconfigure_count(), 1);
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use gitlab_charm::config::CharmConfig;
use gitlab_charm::controller::{Context, GitlabReconciler, PackageVersion, Paths};
use gitlab_charm::host::{
    CommandOutput, CommandRunner, HostError, PackageInfo, PackageManager, Relation, Status,
    StatusReporter,
};
use gitlab_charm::store::keys::{self, CredentialKeys};
use gitlab_charm::store::{ConfigStoreExt, MemoryStore};

pub const TEST_FQDN: &str = "gitlab-0.example.internal";

// =============================================================================
// Package manager
// =============================================================================

#[derive(Debug, Default)]
pub struct PackageState {
    pub installed: Option<String>,
    pub available: Vec<String>,
    /// Defaults to the highest available version
    pub candidate: Option<String>,
    pub installs: Vec<String>,
    pub sources: Vec<(String, Option<String>)>,
    pub updates: usize,
    /// Package lookups fail
    pub broken_index: bool,
    /// Installs are recorded but never change the installed version
    pub frozen: bool,
}

#[derive(Clone, Default)]
pub struct FakePackageManager {
    pub state: Rc<RefCell<PackageState>>,
}

fn highest<'a>(versions: impl Iterator<Item = &'a String>) -> Option<String> {
    versions
        .filter_map(|raw| PackageVersion::parse(raw).ok())
        .max()
        .map(|v| v.raw().to_string())
}

impl FakePackageManager {
    pub fn installs(&self) -> Vec<String> {
        self.state.borrow().installs.clone()
    }

    pub fn installed(&self) -> Option<String> {
        self.state.borrow().installed.clone()
    }

    pub fn sources(&self) -> Vec<(String, Option<String>)> {
        self.state.borrow().sources.clone()
    }

    fn resolve(state: &PackageState, pin: Option<&str>) -> Option<String> {
        match pin {
            None => state
                .candidate
                .clone()
                .or_else(|| highest(state.available.iter())),
            Some(pattern) => match pattern.strip_suffix(".*") {
                Some(major) => {
                    let major: u64 = major.parse().ok()?;
                    highest(state.available.iter().filter(|raw| {
                        PackageVersion::parse(raw).is_ok_and(|v| v.major() == major)
                    }))
                }
                None => Some(pattern.to_string()),
            },
        }
    }
}

impl PackageManager for FakePackageManager {
    fn update(&self) -> Result<(), HostError> {
        self.state.borrow_mut().updates += 1;
        Ok(())
    }

    fn add_source(&self, line: &str, key: Option<&str>) -> Result<(), HostError> {
        self.state
            .borrow_mut()
            .sources
            .push((line.to_string(), key.map(str::to_string)));
        Ok(())
    }

    fn install(&self, spec: &str) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        state.installs.push(spec.to_string());
        let (name, pin) = match spec.split_once('=') {
            Some((name, pin)) => (name, Some(pin)),
            None => (spec, None),
        };
        if !name.starts_with("gitlab-") || state.frozen {
            return Ok(());
        }
        let resolved = Self::resolve(&state, pin);
        state.installed = resolved;
        Ok(())
    }

    fn package_info(&self, _name: &str) -> Result<Option<PackageInfo>, HostError> {
        let state = self.state.borrow();
        if state.broken_index {
            return Err(HostError::CommandFailed {
                command: "apt-cache policy".to_string(),
                code: Some(100),
                output: "E: Could not open lock file".to_string(),
            });
        }
        Ok(Some(PackageInfo {
            installed: state.installed.clone(),
            candidate: state
                .candidate
                .clone()
                .or_else(|| highest(state.available.iter())),
            available: state.available.clone(),
        }))
    }

    fn distro_codename(&self) -> Result<String, HostError> {
        Ok("focal".to_string())
    }
}

// =============================================================================
// Command runner
// =============================================================================

#[derive(Clone, Default)]
pub struct RecordingCommandRunner {
    pub calls: Rc<RefCell<Vec<Vec<String>>>>,
    /// Programs that exit non-zero
    pub failing: Rc<RefCell<Vec<String>>>,
}

impl RecordingCommandRunner {
    pub fn fail(&self, program: &str) {
        self.failing.borrow_mut().push(program.to_string());
    }

    pub fn recover(&self) {
        self.failing.borrow_mut().clear();
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().is_some_and(|p| p == program))
            .collect()
    }

    pub fn reconfigure_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.len() == 2 && call[0].ends_with("gitlab-ctl") && call[1] == "reconfigure")
            .count()
    }
}

impl CommandRunner for RecordingCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.borrow_mut().push(call);

        if self.failing.borrow().iter().any(|p| p == program) {
            return Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("{program} failed"),
            });
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

// =============================================================================
// Status and relations
// =============================================================================

#[derive(Clone, Default)]
pub struct RecordingStatus {
    pub history: Rc<RefCell<Vec<Status>>>,
}

impl RecordingStatus {
    pub fn last(&self) -> Option<Status> {
        self.history.borrow().last().cloned()
    }

    pub fn messages(&self) -> Vec<String> {
        self.history.borrow().iter().map(|s| s.message.clone()).collect()
    }
}

impl StatusReporter for RecordingStatus {
    fn set(&self, status: Status) -> Result<(), HostError> {
        self.history.borrow_mut().push(status);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeRelation {
    pub remote: BTreeMap<String, String>,
    pub local: BTreeMap<String, String>,
}

impl FakeRelation {
    pub fn with_remote(pairs: &[(&str, &str)]) -> Self {
        Self {
            remote: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            local: BTreeMap::new(),
        }
    }
}

impl Relation for FakeRelation {
    fn remote_data(&self) -> Result<BTreeMap<String, String>, HostError> {
        Ok(self.remote.clone())
    }

    fn set_local(&mut self, settings: &[(&str, String)]) -> Result<(), HostError> {
        for (key, value) in settings {
            self.local.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A reconciler wired to fakes, writing files into a temporary directory
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub packages: FakePackageManager,
    pub commands: RecordingCommandRunner,
    pub status: RecordingStatus,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
            packages: FakePackageManager::default(),
            commands: RecordingCommandRunner::default(),
            status: RecordingStatus::default(),
        }
    }

    pub fn installed(self, version: &str) -> Self {
        self.packages.state.borrow_mut().installed = Some(version.to_string());
        self
    }

    pub fn available(self, versions: &[&str]) -> Self {
        self.packages.state.borrow_mut().available =
            versions.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn paths(&self) -> Paths {
        Paths {
            gitlab_config: self.dir.path().join("gitlab.rb"),
            pgloader_commands: self.dir.path().join("commands.load"),
            ..Paths::default()
        }
    }

    pub fn reconciler(&self, config: CharmConfig, store: MemoryStore) -> GitlabReconciler {
        let ctx = Context::new(
            config,
            Box::new(store),
            Box::new(self.packages.clone()),
            Box::new(self.commands.clone()),
            Box::new(self.status.clone()),
        )
        .with_paths(self.paths())
        .with_fqdn(TEST_FQDN);
        GitlabReconciler::new(ctx)
    }

    pub fn rendered(&self) -> Option<String> {
        std::fs::read_to_string(self.paths().gitlab_config).ok()
    }
}

// =============================================================================
// Store seeding
// =============================================================================

pub fn seed_group(store: &mut MemoryStore, keys: &CredentialKeys, host: &str, port: &str) {
    store.set_str(keys.host, host).unwrap();
    store.set_str(keys.port, port).unwrap();
    store.set_str(keys.database, "gitlab").unwrap();
    store.set_str(keys.user, "gitlab").unwrap();
    store.set_str(keys.password, "secret").unwrap();
}

pub fn seed_pgsql(store: &mut MemoryStore) {
    seed_group(store, &keys::PGSQL, "10.0.0.10", "5432");
}

pub fn seed_mysql(store: &mut MemoryStore) {
    seed_group(store, &keys::MYSQL, "10.0.0.20", "3306");
}

/// `db_*` keys with the given adapter tag (`None` leaves them untagged)
pub fn seed_db(store: &mut MemoryStore, adapter: Option<&str>) {
    seed_group(store, &keys::DB, "10.0.0.30", "3306");
    if let Some(adapter) = adapter {
        store.set_str(keys::DB_ADAPTER, adapter).unwrap();
    }
}

pub fn seed_redis(store: &mut MemoryStore) {
    store.set_str(keys::REDIS_HOST, "10.0.0.40").unwrap();
    store.set_str(keys::REDIS_PORT, "6379").unwrap();
}

/// PostgreSQL and Redis related
pub fn ready_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    seed_pgsql(&mut store);
    seed_redis(&mut store);
    store
}

/// GitLab already at the only available version
pub fn converged_harness() -> Harness {
    Harness::new()
        .installed("13.0.0-ce.0")
        .available(&["13.0.0-ce.0"])
}
