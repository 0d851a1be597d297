//! GitLab reconciliation
//!
//! `GitlabReconciler` owns the per-invocation [`Context`] and derives the
//! Omnibus configuration from the unit store and charm options. Hooks and
//! actions call into it; the package upgrade loop lives in
//! [`super::upgrade`] and the database migration in [`super::migration`].

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::controller::backend::{self, BackendSource, DbSettings};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::render::{self, DesiredConfig, EmailSettings, RedisSettings, SmtpSettings};
use crate::controller::state_machine::{DatabaseFacts, DatabaseState, determine_state};
use crate::controller::status::{self, messages};
use crate::controller::upgrade::{DesiredVersion, install_spec};
use crate::controller::validation::validate_config;
use crate::host::{Relation, Status};
use crate::relations::db::{
    remove_db_conf, remove_mysql_conf, remove_pgsql_conf, save_db_conf, save_mysql_conf,
    save_pgsql_conf,
};
use crate::relations::redis::{remove_redis_conf, save_redis_conf};
use crate::relations::{
    DbAdapter, DbEndpoint, MySqlEndpoint, PostgreSqlEndpoint, ProxyConfig, ProxyStatus,
    RedisEndpoint, ReverseProxyRequires, RunnerProvides, RunnerSettings, build_proxy_rules,
};
use crate::store::{ConfigStore, ConfigStoreExt, keys};

/// SSH port advertised when no reverse proxy fronts GitLab
pub const DEFAULT_SSH_PORT: u16 = 22;

pub struct GitlabReconciler {
    pub(super) ctx: Context,
}

impl GitlabReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }

    pub(super) fn report(&self, status: Status) -> Result<()> {
        status::report(self.ctx.status.as_ref(), status)
    }

    /// Current database state derived from the unit store
    pub fn state(&self) -> Result<DatabaseState> {
        let facts = DatabaseFacts::gather(self.ctx.store.as_ref())?;
        let state = determine_state(&facts);
        debug!(?facts, %state, "Determined database state");
        Ok(state)
    }

    /// Configured external URL, or `http://<fqdn>`
    pub fn get_external_uri(&self) -> String {
        let configured = self.ctx.config.external_url.trim();
        if configured.is_empty() {
            format!("http://{}", self.ctx.fqdn)
        } else {
            configured.to_string()
        }
    }

    fn external_url(&self) -> Result<Url> {
        let raw = self.get_external_uri();
        Url::parse(&raw)
            .map_err(|e| Error::ValidationError(format!("invalid external_url {raw:?}: {e}")))
    }

    /// Host name users reach GitLab's SSH on
    pub fn get_sshhost(&self) -> String {
        Url::parse(&self.get_external_uri())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.ctx.fqdn.clone())
    }

    /// The configured SSH port once a reverse proxy forwards it, 22 otherwise
    pub fn get_sshport(&self) -> Result<u16> {
        if self.ctx.store.is_set(keys::REVERSEPROXY_CONFIGURED)? {
            Ok(self.ctx.config.ssh_port)
        } else {
            Ok(DEFAULT_SSH_PORT)
        }
    }

    pub fn mysql_migrated(&self) -> Result<bool> {
        Ok(backend::mysql_migrated(self.ctx.store.as_ref())?)
    }

    fn redis_settings(&self) -> Result<Option<RedisSettings>> {
        let store = self.ctx.store.as_ref();
        if !backend::redis_configured(store)? {
            return Ok(None);
        }
        Ok(Some(RedisSettings {
            host: store.get_string(keys::REDIS_HOST)?.unwrap_or_default(),
            port: store.get_string(keys::REDIS_PORT)?.unwrap_or_default(),
            password: store
                .get_string(keys::REDIS_PASS)?
                .filter(|p| !p.is_empty()),
        }))
    }

    fn smtp_settings(&self) -> Option<SmtpSettings> {
        let config = &self.ctx.config;
        if config.smtp_address.is_empty() {
            return None;
        }
        Some(SmtpSettings {
            address: config.smtp_address.clone(),
            port: config.smtp_port,
            user_name: config.smtp_user_name.clone(),
            password: config.smtp_password.clone(),
            domain: config.smtp_domain.clone(),
            authentication: config.smtp_authentication.clone(),
            enable_starttls_auto: config.smtp_enable_starttls_auto,
            tls: config.smtp_tls,
        })
    }

    fn email_settings(&self) -> Option<EmailSettings> {
        let config = &self.ctx.config;
        if config.email_from.is_empty() {
            return None;
        }
        Some(EmailSettings {
            from: config.email_from.clone(),
            display_name: config.email_display_name.clone(),
            reply_to: config.email_reply_to.clone(),
        })
    }

    /// Assemble the desired configuration for a database backend
    pub fn desired_config(&self, db: DbSettings) -> Result<DesiredConfig> {
        Ok(DesiredConfig {
            external_url: self.get_external_uri(),
            db,
            redis: self.redis_settings()?,
            http_port: self.ctx.config.http_port,
            ssh_host: self.get_sshhost(),
            ssh_port: self.get_sshport()?,
            smtp: self.smtp_settings(),
            email: self.email_settings(),
            backup_path: self.ctx.config.backup_location.clone(),
        })
    }

    /// Write gitlab.rb for the backend chosen by precedence.
    ///
    /// Returns `None` (and reports blocked) without touching the file when
    /// no backend is configured, otherwise whether the file changed.
    pub(super) fn write_config(&mut self) -> Result<Option<bool>> {
        let Some(selected) = backend::select_backend(self.ctx.store.as_ref())? else {
            warn!("Skipping configuration due to missing DB config");
            self.report(Status::blocked(messages::MISSING_DB_CONFIG))?;
            return Ok(None);
        };
        info!(source = ?selected.source, adapter = %selected.settings.adapter, "Rendering GitLab configuration");

        let rendered = self.desired_config(selected.settings)?.render();
        let changed = render::write_if_changed(&self.ctx.paths.gitlab_config, &rendered)?;
        if changed {
            self.ctx.store.set_bool(keys::RECONFIGURE_PENDING, true)?;
        }
        Ok(Some(changed))
    }

    /// Render gitlab.rb and reconfigure GitLab when it changed
    #[instrument(skip(self))]
    pub fn render_config(&mut self) -> Result<bool> {
        if self.write_config()?.is_none() {
            return Ok(false);
        }
        if self.ctx.store.is_set(keys::RECONFIGURE_PENDING)? {
            self.gitlab_reconfigure_run()?;
        } else {
            debug!("GitLab configuration unchanged, skipping reconfigure");
        }
        Ok(true)
    }

    /// Render gitlab.rb and run reconfigure even when nothing changed.
    ///
    /// Only states that allow rendering are reconfigured; a pending
    /// migration keeps GitLab on its current database.
    #[instrument(skip(self))]
    pub fn reconfigure(&mut self) -> Result<bool> {
        validate_config(&self.ctx.config)?;

        let state = self.state()?;
        if !state.can_render() {
            info!(%state, "Database state does not allow rendering, skipping reconfigure");
            self.report(state.settled_status())?;
            return Ok(false);
        }
        if self.write_config()?.is_none() {
            return Ok(false);
        }
        self.gitlab_reconfigure_run()?;
        Ok(true)
    }

    /// Run `gitlab-ctl reconfigure`
    pub fn gitlab_reconfigure_run(&mut self) -> Result<()> {
        info!("Running gitlab-ctl reconfigure");
        self.ctx
            .commands
            .run_checked(&self.ctx.paths.gitlab_ctl, &["reconfigure"])
            .inspect_err(|e| error!(error = %e, "gitlab-ctl reconfigure failed"))?;
        self.ctx.store.unset(keys::RECONFIGURE_PENDING)?;
        Ok(())
    }

    /// Reconcile GitLab with the charm configuration and relation data.
    ///
    /// Returns whether the configuration was rendered.
    #[instrument(skip(self))]
    pub fn configure(&mut self) -> Result<bool> {
        validate_config(&self.ctx.config)?;

        let state = self.state()?;
        match state {
            DatabaseState::Unconfigured => {
                self.render_config()?;
                return Ok(false);
            }
            DatabaseState::MigrationPending => {
                info!("MySQL and PostgreSQL both related, waiting for migratedb");
                self.report(state.settled_status())?;
                return Ok(false);
            }
            DatabaseState::PostgreSql | DatabaseState::MySql | DatabaseState::MigrationComplete => {}
        }

        self.report(Status::maintenance(messages::CONFIGURING))?;
        if !self.render_config()? {
            return Ok(false);
        }
        self.upgrade_gitlab()?;
        self.report(state.settled_status())?;
        info!(%state, "GitLab configured");
        Ok(true)
    }

    /// Move credentials from the superseded `mysql_*` keys to `db_*`
    pub fn migrate_mysql_config(&mut self) -> Result<bool> {
        let store = self.ctx.store.as_mut();
        if !backend::mysql_configured(store)? {
            return Ok(false);
        }
        let settings = backend::read_settings(store, BackendSource::Mysql, DbAdapter::Mysql2)?;
        let pairs = [
            (keys::DB_HOST, &settings.host),
            (keys::DB_PORT, &settings.port),
            (keys::DB_DB, &settings.database),
            (keys::DB_USER, &settings.user),
            (keys::DB_PASS, &settings.password),
        ];
        for (key, value) in pairs {
            store.set_str(key, value)?;
        }
        store.set_str(keys::DB_ADAPTER, DbAdapter::Mysql2.as_str())?;
        store.unset_all(&keys::MYSQL.all())?;
        info!("Moved MySQL relation data to db keys");
        Ok(true)
    }

    /// Tag `db_*` keys written before `db_adapter` existed
    pub fn migrate_db_config(&mut self) -> Result<bool> {
        let store = self.ctx.store.as_mut();
        if !backend::db_configured(store)? || store.is_set(keys::DB_ADAPTER)? {
            return Ok(false);
        }
        store.set_str(keys::DB_ADAPTER, DbAdapter::Mysql2.as_str())?;
        info!("Tagged existing db keys as mysql2");
        Ok(true)
    }

    pub fn save_db(&mut self, endpoint: &DbEndpoint) -> Result<()> {
        save_db_conf(self.ctx.store.as_mut(), endpoint)?;
        Ok(())
    }

    pub fn remove_db(&mut self) -> Result<()> {
        remove_db_conf(self.ctx.store.as_mut())?;
        Ok(())
    }

    pub fn save_pgsql(&mut self, endpoint: &PostgreSqlEndpoint) -> Result<()> {
        save_pgsql_conf(self.ctx.store.as_mut(), endpoint)?;
        Ok(())
    }

    pub fn remove_pgsql(&mut self) -> Result<()> {
        remove_pgsql_conf(self.ctx.store.as_mut())?;
        Ok(())
    }

    pub fn save_mysql(&mut self, endpoint: &MySqlEndpoint) -> Result<()> {
        save_mysql_conf(self.ctx.store.as_mut(), endpoint)?;
        Ok(())
    }

    /// Forget the MySQL relation, including `db_*` keys carried over from it
    pub fn remove_mysql(&mut self) -> Result<()> {
        let store = self.ctx.store.as_mut();
        remove_mysql_conf(store)?;
        if backend::legacy_db_configured(store)? {
            remove_db_conf(store)?;
        }
        Ok(())
    }

    pub fn save_redis(&mut self, endpoint: &RedisEndpoint) -> Result<()> {
        save_redis_conf(self.ctx.store.as_mut(), endpoint)?;
        Ok(())
    }

    pub fn remove_redis(&mut self) -> Result<()> {
        remove_redis_conf(self.ctx.store.as_mut())?;
        Ok(())
    }

    /// Publish HTTP and SSH forwarding rules to a reverse proxy
    #[instrument(skip(self, relation))]
    pub fn configure_proxy(&mut self, relation: &mut dyn Relation) -> Result<()> {
        let url = self.external_url()?;
        let config = &self.ctx.config;
        let rules = build_proxy_rules(
            &url,
            &self.ctx.fqdn,
            config.http_port,
            config.ssh_port,
            config.ssh_internal_port,
        );
        let proxy_config = ProxyConfig::new(rules)?;
        ReverseProxyRequires::new(relation).configure(&proxy_config)?;
        self.ctx.store.set_bool(keys::REVERSEPROXY_CONFIGURED, true)?;
        info!("Reverse proxy configuration published");
        Ok(())
    }

    pub fn proxy_configured(&self) -> Result<bool> {
        Ok(self.ctx.store.is_set(keys::REVERSEPROXY_CONFIGURED)?)
    }

    /// The proxy's verdict on our rules
    pub fn proxy_status(&self, relation: &mut dyn Relation, local_unit: &str) -> Result<ProxyStatus> {
        Ok(ReverseProxyRequires::new(relation).status(local_unit)?)
    }

    pub fn remove_proxy(&mut self) -> Result<()> {
        self.ctx.store.unset(keys::REVERSEPROXY_CONFIGURED)?;
        Ok(())
    }

    /// Tell related CI runners where GitLab lives
    pub fn publish_runner(&self, relation: &mut dyn Relation) -> Result<()> {
        let token = &self.ctx.config.runner_registration_token;
        let settings = RunnerSettings {
            url: self.get_external_uri(),
            token: (!token.is_empty()).then(|| token.clone()),
        };
        RunnerProvides::new(relation).publish(&settings)?;
        Ok(())
    }

    /// Add the GitLab apt repository
    pub fn add_sources(&self) -> Result<()> {
        let config = &self.ctx.config;
        let repo = config.apt_repo.trim();
        let line = if repo.starts_with("deb ") {
            repo.to_string()
        } else {
            let codename = self.ctx.packages.distro_codename()?;
            format!("deb {repo} {codename} main")
        };
        let key = Some(config.apt_key.trim()).filter(|k| !k.is_empty());
        info!(source = %line, "Adding GitLab apt source");
        self.ctx.packages.add_source(&line, key)?;
        Ok(())
    }

    /// Install GitLab from the configured repository unless already present
    #[instrument(skip(self))]
    pub fn initial_install(&mut self) -> Result<bool> {
        self.report(Status::maintenance(messages::INSTALLING))?;
        self.add_sources()?;
        self.ctx.packages.update()?;

        let package = self.ctx.config.package_name();
        let info = self.ctx.packages.package_info(package)?;
        if let Some(installed) = info.as_ref().and_then(|i| i.installed.as_deref()) {
            info!(package, installed, "GitLab already installed");
            self.report(Status::active(messages::INSTALLED))?;
            return Ok(false);
        }

        let desired = DesiredVersion::parse(&self.ctx.config.version)?;
        let spec = install_spec(package, &desired, info.as_ref());
        info!(spec = %spec, "Installing GitLab");
        self.ctx.packages.install(&spec)?;
        self.report(Status::active(messages::INSTALLED))?;
        Ok(true)
    }

    /// Create a GitLab backup, returning its name
    #[instrument(skip(self))]
    pub fn backup(&mut self) -> Result<String> {
        self.report(Status::maintenance(messages::BACKING_UP))?;
        let name = Utc::now().format("%Y%m%d%H%M%S").to_string();
        self.ctx
            .commands
            .run_checked(&self.ctx.paths.gitlab_backup, &["create", &format!("BACKUP={name}")])?;
        info!(backup = %name, location = %self.ctx.config.backup_location, "GitLab backup created");
        let state = self.state()?;
        self.report(state.settled_status())?;
        Ok(name)
    }
}
