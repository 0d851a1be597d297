use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use gitlab_charm::controller::context::local_fqdn;
use gitlab_charm::host::{
    AptPackageManager, HookTools, JujuRelation, JujuStatusReporter, SystemCommandRunner,
};
use gitlab_charm::{
    CharmAction, CharmConfig, Context, GitlabReconciler, HookEvent, SqliteStore, handle_hook,
    run_action,
};

const STATE_DB_NAME: &str = ".unit-state.db";

#[derive(Parser, Debug)]
#[command(name = "gitlab-charm", version, about = "Juju charm for GitLab Omnibus")]
struct Cli {
    /// Unit state database (defaults to $CHARM_DIR/.unit-state.db)
    #[arg(long, env = "UNIT_STATE_DB")]
    state_db: Option<PathBuf>,

    /// Charm configuration file to use instead of `config-get`
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "JUJU_RELATION_ID")]
    relation_id: Option<String>,

    #[arg(long, env = "JUJU_REMOTE_UNIT")]
    remote_unit: Option<String>,

    #[arg(long, env = "JUJU_UNIT_NAME", default_value = "gitlab/0")]
    unit_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle a Juju hook
    Hook {
        #[arg(env = "JUJU_HOOK_NAME")]
        name: String,
    },
    /// Run a charm action
    Action {
        #[arg(env = "JUJU_ACTION_NAME")]
        name: String,
    },
}

fn default_state_db() -> PathBuf {
    std::env::var_os("CHARM_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DB_NAME)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Juju captures stderr into the unit log
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gitlab_charm=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let hook = match &cli.command {
        Command::Hook { name } => match HookEvent::from_hook_name(name) {
            Some(event) => Some(event),
            None => return Ok(()),
        },
        Command::Action { .. } => None,
    };
    let tools = HookTools::new(Rc::new(SystemCommandRunner));

    let config = match &cli.config {
        Some(path) => CharmConfig::load(path)?,
        None => CharmConfig::from_json(tools.config_get()?)?,
    };

    let state_db = cli.state_db.clone().unwrap_or_else(default_state_db);
    info!(state_db = %state_db.display(), "Opening unit state");
    let store = SqliteStore::open(&state_db)?;

    let ctx = Context::new(
        config,
        Box::new(store),
        Box::new(AptPackageManager::default()),
        Box::new(SystemCommandRunner),
        Box::new(JujuStatusReporter::new(tools.clone())),
    )
    .with_fqdn(local_fqdn(&SystemCommandRunner));
    let mut reconciler = GitlabReconciler::new(ctx);

    match &cli.command {
        Command::Hook { .. } => {
            if let Some(event) = hook {
                let mut relation = JujuRelation::new(
                    tools.clone(),
                    cli.relation_id.clone(),
                    cli.remote_unit.clone(),
                );
                handle_hook(&mut reconciler, event, &mut relation, &cli.unit_name)?;
            }
        }
        Command::Action { name } => {
            let outcome = name
                .parse::<CharmAction>()
                .and_then(|action| run_action(&mut reconciler, action));
            match outcome {
                Ok(results) => {
                    for (key, value) in &results {
                        tools.action_set(key, value)?;
                    }
                }
                Err(e) => {
                    error!(action = %name, error = %e, "Action failed");
                    tools.action_fail(&e.to_string())?;
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
