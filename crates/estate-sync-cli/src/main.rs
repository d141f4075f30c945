//! estate-sync CLI - Operate a local estate-sync database
//!
//! Import organization data, replay device batches, review harvests, watch
//! the gates and inspect what each actor can see.

mod cli;
mod commands;
mod error;


use clap::Parser;
use estate_sync_core::query::RecordQuery;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{open_service, resolve_context};
use crate::commands::completions::run_completions;
use crate::commands::import::run_import;
use crate::commands::notifications::run_notifications;
use crate::commands::overstays::run_overstays;
use crate::commands::records::{change_cursor, run_records, RecordSelection};
use crate::commands::review::{decision_from_flags, run_review};
use crate::commands::scope::run_scope;
use crate::commands::status::run_status;
use crate::commands::sync::{run_ingest, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "estate_sync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let service = open_service(cli.db_path, cli.config.as_deref())?;
    let context = || resolve_context(cli.actor.clone(), cli.role.clone());

    match cli.command {
        Commands::Import { path, json } => run_import(&service, &path, json).await?,
        Commands::Scope { target, json } => {
            let target = target.into_target();
            run_scope(&service, &context()?, target.as_ref(), json).await?;
        }
        Commands::Sync { path, json } => {
            run_sync(&service, &context()?, path.as_deref(), json).await?;
        }
        Commands::Ingest {
            path,
            topics,
            devices,
        } => {
            run_ingest(&service, &context()?, path.as_deref(), &topics, &devices).await?;
        }
        Commands::Records {
            target,
            kind,
            status,
            device,
            since,
            after_id,
            limit,
            offset,
            json,
        } => {
            let selection = match since {
                Some(since) => RecordSelection::Since {
                    cursor: change_cursor(since, after_id.as_deref())?,
                    limit,
                },
                None => RecordSelection::Scoped(RecordQuery {
                    target: target.into_target(),
                    kind: kind.map(Into::into),
                    status: status.map(Into::into),
                    device_id: device,
                    limit,
                    offset,
                }),
            };
            run_records(&service, &context()?, selection, json).await?;
        }
        Commands::Review {
            id,
            approve,
            reject,
            json,
        } => {
            let decision = decision_from_flags(approve, reject)?;
            run_review(&service, &context()?, &id, &decision, json).await?;
        }
        Commands::Status { device, json } => run_status(&service, &device, json).await?,
        Commands::Overstays { watch, json } => {
            run_overstays(&service, &context()?, watch, json).await?;
        }
        Commands::Notifications { limit, json } => {
            run_notifications(&service, &context()?, limit, json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
