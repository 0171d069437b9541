use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use warden::abuse::AbuseEngine;
use warden::cli::{Cli, Commands, CredentialCommands};
use warden::clock::SystemClock;
use warden::config;
use warden::credentials::CredentialStore;
use warden::jobs;
use warden::scheme::SchemeRegistry;
use warden::store::postgres::PgBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warden=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Sweep) => {
            let backend = Arc::new(PgBackend::connect(&cfg.database_url).await?);
            let engine = AbuseEngine::new(backend, Arc::new(SystemClock), cfg.abuse_params());
            let summary = engine.sweep().await?;
            println!(
                "{}",
                json!({
                    "headerViolations": summary.header_violations,
                    "originViolations": summary.origin_violations,
                    "carriedForward": summary.carried_forward,
                    "escalated": summary.escalated,
                    "totalBans": summary.total_bans,
                })
            );
            Ok(())
        }
        Some(Commands::Credential { command }) => {
            let backend = Arc::new(PgBackend::connect(&cfg.database_url).await?);
            let store = CredentialStore::new(backend, Arc::new(SchemeRegistry::builtin()));
            handle_credential_command(&store, command).await
        }
        Some(Commands::Run) | None => run_sweeper(cfg).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_sweeper(cfg: config::Config) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let backend = Arc::new(PgBackend::connect(&cfg.database_url).await?);

    tracing::info!("Running migrations...");
    backend.migrate().await?;

    let interval = std::time::Duration::from_secs(cfg.sweep_interval_secs);
    let engine = Arc::new(AbuseEngine::new(
        backend,
        Arc::new(SystemClock),
        cfg.abuse_params(),
    ));

    tracing::info!(interval_secs = cfg.sweep_interval_secs, "Starting abuse sweeper");
    let handle = jobs::sweeper::spawn(engine, interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.abort();
    Ok(())
}

async fn handle_credential_command(
    store: &CredentialStore,
    command: CredentialCommands,
) -> anyhow::Result<()> {
    match command {
        CredentialCommands::Issue {
            owner,
            global_admin,
        } => {
            let mut attrs = Map::new();
            attrs.insert("owner".into(), Value::String(owner));
            if global_admin {
                attrs.insert("isGlobalAdmin".into(), Value::Bool(true));
            }
            let cred = store.issue(&Value::Object(attrs)).await?;
            println!("{}", serde_json::to_string_pretty(&cred)?);
        }
        CredentialCommands::Get { id } => {
            let cred = store.get_by_id(Uuid::parse_str(&id)?).await?;
            println!("{}", serde_json::to_string_pretty(&cred)?);
        }
        CredentialCommands::Find {
            owner,
            global_admin,
            after,
        } => {
            let mut filter = Map::new();
            if let Some(owners) = owner {
                filter.insert(
                    "owner".into(),
                    Value::Array(owners.into_iter().map(Value::String).collect()),
                );
            }
            if let Some(flag) = global_admin {
                filter.insert("isGlobalAdmin".into(), Value::Bool(flag));
            }
            let after_id = after.as_deref().map(Uuid::parse_str).transpose()?;
            let page = store.find(&Value::Object(filter), after_id).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        CredentialCommands::Patch {
            id,
            owner,
            global_admin,
        } => {
            let mut patch = Map::new();
            if let Some(owner) = owner {
                patch.insert("owner".into(), Value::String(owner));
            }
            if let Some(flag) = global_admin {
                patch.insert("isGlobalAdmin".into(), Value::Bool(flag));
            }
            let changed = store
                .patch_by_id(Uuid::parse_str(&id)?, &Value::Object(patch))
                .await?;
            println!("{}", json!({ "patched": changed }));
        }
        CredentialCommands::Revoke { id } => {
            let revoked = store.revoke_by_id(Uuid::parse_str(&id)?).await?;
            println!("{}", json!({ "revoked": revoked }));
        }
    }
    Ok(())
}
