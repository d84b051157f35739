use floorsync_core::sync::SkipReason;
use floorsync_core::{ResolveChoice, SyncReport};

use crate::cli::ResolveArg;
use crate::commands::common::{open_store, StoreOptions};
use crate::error::CliError;

pub async fn run_sync(options: &StoreOptions) -> Result<(), CliError> {
    if options.endpoint.is_none() && !options.offline {
        return Err(CliError::SyncNotConfigured);
    }

    let store = open_store(options).await?;
    let report = store.sync_now().await?;
    println!("{}", describe_report(&report));
    Ok(())
}

pub async fn run_retry(options: &StoreOptions) -> Result<(), CliError> {
    let store = open_store(options).await?;
    let requeued = store.retry_failed().await?;
    println!("Re-queued {requeued} record(s)");
    Ok(())
}

pub async fn run_resolve(choice: ResolveArg, options: &StoreOptions) -> Result<(), CliError> {
    let store = open_store(options).await?;
    let choice = ResolveChoice::from(choice);
    let affected = store.resolve_conflicts(choice).await?;
    match choice {
        ResolveChoice::KeepLocal => println!("Re-queued {affected} conflicted record(s)"),
        ResolveChoice::DiscardLocal => println!("Discarded {affected} conflicted record(s)"),
    }
    Ok(())
}

pub async fn run_clear_storage(confirmed: bool, options: &StoreOptions) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired);
    }
    let store = open_store(options).await?;
    let removed = store.clear_storage().await?;
    println!("Removed {removed} record(s)");
    Ok(())
}

pub fn describe_report(report: &SyncReport) -> String {
    match report {
        SyncReport::Skipped(SkipReason::Offline) => "Sync skipped: offline".to_string(),
        SyncReport::Skipped(SkipReason::AlreadyRunning) => {
            "Sync skipped: a pass is already running".to_string()
        }
        SyncReport::Completed(summary) if summary.attempted == 0 => {
            "Sync completed: nothing pending".to_string()
        }
        SyncReport::Completed(summary) => format!(
            "Sync completed: {} attempted, {} synced, {} failed, {} conflicted",
            summary.attempted, summary.synced, summary.failed, summary.conflicted
        ),
    }
}
