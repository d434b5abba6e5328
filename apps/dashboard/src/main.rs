use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    Applied, HttpRecordService, PurifierRegistry, RegistryError, SeedSource, SqliteSnapshotStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod output;

use cli::{Cli, Command};
use config::{load_settings, DashboardSettings};
use output::{render_record, render_sync_warning, render_table};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.overrides());
    let registry = open_registry(&settings).await?;

    let seed = registry.seed_report();
    if let Some(error) = &seed.remote_error {
        eprintln!("warning: record service unavailable ({error}), using {}", seed.source);
    } else if seed.source == SeedSource::BuiltinDefaults {
        info!("no stored purifiers found, starting from built-in defaults");
    }

    run(&registry, cli.command).await
}

async fn open_registry(settings: &DashboardSettings) -> Result<PurifierRegistry> {
    let cache_url = settings.cache_database_url();
    let store = SqliteSnapshotStore::open(&cache_url, settings.cache_slot.clone())
        .await
        .with_context(|| format!("failed to open local cache at {cache_url}"))?;

    let mut builder = PurifierRegistry::builder(Arc::new(store));
    if let Some(server_url) = &settings.server_url {
        let remote = HttpRecordService::new(server_url, settings.request_timeout())?;
        info!(server_url = remote.server_url(), "using record service");
        builder = builder.with_remote(Arc::new(remote));
    }
    Ok(builder.initialize().await)
}

async fn run(registry: &PurifierRegistry, command: Command) -> Result<()> {
    match command {
        Command::List(args) => {
            let records = registry.list(&args.filter()).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print!("{}", render_table(&records));
            }
        }
        Command::Add(args) => {
            let generated_id = registry.next_id().await;
            let applied = registry.add(args.into_new_purifier(&generated_id)?).await?;
            println!("saved {}", render_record(report(&applied)));
        }
        Command::Toggle { id } => {
            let applied = registry.toggle_status(&id).await?;
            println!("toggled {}", render_record(report(&applied)));
        }
        Command::Update(args) => {
            let current = registry
                .get(&args.id)
                .await
                .ok_or_else(|| RegistryError::NotFound(args.id.trim().to_string()))?;
            let applied = registry.update(args.apply(current)).await?;
            println!("updated {}", render_record(report(&applied)));
        }
        Command::Remove { id } => {
            let applied = registry.remove(&id).await;
            match report(&applied) {
                Some(removed) => println!("removed {}", render_record(removed)),
                None => println!("no local purifier with id {id}, nothing removed locally"),
            }
        }
    }
    Ok(())
}

fn report<T>(applied: &Applied<T>) -> &T {
    if let Some(error) = &applied.sync_error {
        eprintln!("{}", render_sync_warning(error));
    }
    &applied.value
}
