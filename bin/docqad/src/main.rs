//! ---
//! docqa_section: "01-core-functionality"
//! docqa_subsection: "binary"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Binary entrypoint for the DocQA daemon."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use docqa_api::{spawn_api_server, ApiState};
use docqa_authz::{
    Action, Actor, PolicyEvaluator, Resource, ResourceType, RoleAssignmentStore, RoleCatalog,
};
use docqa_common::config::AppConfig;
use docqa_common::logging::{init_cli_tracing, init_tracing};
use prometheus::Registry;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "DocQA daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the REST API")]
    Run,
    #[command(about = "Print the configured role catalog")]
    Grants,
    #[command(about = "Evaluate a single request against the configured policy")]
    Decide(DecideArgs),
}

#[derive(Debug, clap::Args)]
struct DecideArgs {
    #[arg(long, default_value = "cli", help = "Actor identifier")]
    actor: String,
    #[arg(long, help = "Treat the actor as an administrator")]
    admin: bool,
    #[arg(long, value_delimiter = ',', help = "Explicit roles held by the actor")]
    roles: Vec<String>,
    #[arg(long, help = "Action to evaluate (read, write, delete, manage_roles, manage_users)")]
    action: String,
    #[arg(long, help = "Resource type tag (Document, Role, User)")]
    resource: String,
    #[arg(long, help = "Owner id, for a specific resource instance")]
    owner: Option<String>,
    #[arg(long, help = "Print the verdict as JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/docqa.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("docqad", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("running on built-in configuration"),
            }
            run_daemon(config).await?
        }
        Commands::Grants => {
            init_cli_tracing();
            print_grants(&config)?
        }
        Commands::Decide(args) => {
            init_cli_tracing();
            decide(&config, args)?
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    if !config.api.enabled {
        info!("api server disabled by configuration; nothing to run");
        return Ok(());
    }
    let registry = Arc::new(Registry::new());
    let state = Arc::new(ApiState::from_config(&config, registry)?);
    let server = spawn_api_server(state, config.api.listen)?;

    info!(address = %server.addr(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}

fn evaluator(config: &AppConfig) -> Result<PolicyEvaluator> {
    let catalog = Arc::new(RoleCatalog::from_config(&config.policy)?);
    let assignments = Arc::new(RoleAssignmentStore::new(catalog.clone()));
    Ok(PolicyEvaluator::new(catalog, assignments)
        .with_default_role(config.policy.default_role.clone()))
}

fn print_grants(config: &AppConfig) -> Result<()> {
    let evaluator = evaluator(config)?;
    let catalog = evaluator.catalog();
    for role in catalog.role_names() {
        let mut flags = Vec::new();
        if catalog.is_protected(&role) {
            flags.push("protected");
        }
        if role == evaluator.default_role() {
            flags.push("default");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!("{role}{suffix}");
        for permission in catalog.grants_of(&role).unwrap_or_default() {
            println!("  {}:{}", permission.action, permission.resource_type);
        }
    }
    Ok(())
}

fn decide(config: &AppConfig, args: DecideArgs) -> Result<()> {
    let evaluator = evaluator(config)?;
    for role in &args.roles {
        evaluator
            .assignments()
            .assign(&args.actor, role)
            .with_context(|| format!("cannot assign role '{role}'"))?;
    }
    let action = Action::from_str(&args.action)
        .map_err(|_| anyhow!("unknown action '{}'", args.action))?;
    let resource = match &args.owner {
        Some(owner) => {
            let resource_type = ResourceType::from_str(&args.resource)
                .map_err(|_| anyhow!("unknown resource type '{}'", args.resource))?;
            Resource::instance(resource_type, owner.clone())
        }
        None => Resource::from_tag(&args.resource),
    };
    let actor = Actor {
        id: args.actor,
        is_admin: args.admin,
    };

    let verdict = evaluator.explain(&actor, action, &resource);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        let role = verdict
            .role
            .as_deref()
            .map(|role| format!(", role: {role}"))
            .unwrap_or_default();
        println!(
            "{} {} {} on {} (rule: {}{role})",
            verdict.decision, actor.id, action, resource, verdict.rule
        );
    }
    Ok(())
}
