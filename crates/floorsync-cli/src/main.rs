//! floorsync CLI - inspect and drive the offline record store from a terminal
//!
//! Each invocation opens the store, runs one command, and exits. Sync runs
//! only when asked (`floorsync sync`), so there is no background scheduler.

mod cli;
mod commands;
mod delivery;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_data_dir, StoreOptions};
use crate::commands::records::{run_clear, run_delete, run_get, run_save};
use crate::commands::status::{run_list, run_status, ListKind};
use crate::commands::sync::{run_clear_storage, run_resolve, run_retry, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("floorsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let options = StoreOptions {
        data_dir: resolve_data_dir(cli.data_dir)?,
        endpoint: cli.endpoint,
        offline: cli.offline,
    };

    match cli.command {
        Some(Commands::Save {
            record_type,
            payload,
            priority,
        }) => run_save(&record_type, &payload, priority, &options).await?,
        Some(Commands::Get {
            record_type,
            id,
            json,
        }) => run_get(&record_type, id.as_deref(), json, &options).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &options).await?,
        Some(Commands::Clear { record_type }) => run_clear(&record_type, &options).await?,
        Some(Commands::Status { json }) => run_status(json, &options).await?,
        Some(Commands::Pending { json }) => run_list(ListKind::Pending, json, &options).await?,
        Some(Commands::Failed { json }) => run_list(ListKind::Failed, json, &options).await?,
        Some(Commands::Conflicts { json }) => {
            run_list(ListKind::Conflicts, json, &options).await?;
        }
        Some(Commands::Sync) => run_sync(&options).await?,
        Some(Commands::Retry) => run_retry(&options).await?,
        Some(Commands::Resolve { choice }) => run_resolve(choice, &options).await?,
        Some(Commands::ClearStorage { yes }) => run_clear_storage(yes, &options).await?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
