use floorsync_core::{Record, SyncStatus};

use crate::commands::common::{
    format_bytes, format_record_lines, format_timestamp, open_store, record_to_item,
    RecordListItem, StoreOptions,
};
use crate::error::CliError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListKind {
    Pending,
    Failed,
    Conflicts,
}

impl ListKind {
    const fn empty_message(self) -> &'static str {
        match self {
            Self::Pending => "No records pending delivery.",
            Self::Failed => "No failed records.",
            Self::Conflicts => "No conflicted records.",
        }
    }
}

pub async fn run_status(as_json: bool, options: &StoreOptions) -> Result<(), CliError> {
    let store = open_store(options).await?;
    let status = store.get_sync_status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    for line in format_status_lines(&status, store.config().max_storage_size_bytes) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_list(kind: ListKind, as_json: bool, options: &StoreOptions) -> Result<(), CliError> {
    let store = open_store(options).await?;
    let records: Vec<Record> = match kind {
        ListKind::Pending => store.get_pending_items().await,
        ListKind::Failed => store.get_failed_items().await,
        ListKind::Conflicts => store.get_conflict_items().await,
    };

    if as_json {
        let items = records.iter().map(record_to_item).collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", kind.empty_message());
        return Ok(());
    }
    for line in format_record_lines(&records) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(status: &SyncStatus, ceiling_bytes: usize) -> Vec<String> {
    let last_sync = status
        .last_sync_at
        .map_or_else(|| "never".to_string(), format_timestamp);
    vec![
        format!(
            "network:    {}",
            if status.is_online { "online" } else { "offline" }
        ),
        format!("pending:    {}", status.pending),
        format!("failed:     {}", status.failed),
        format!("conflicted: {}", status.conflicted),
        format!("synced:     {}", status.synced),
        format!("total:      {}", status.total),
        format!(
            "storage:    {} / {}",
            format_bytes(status.storage_bytes),
            format_bytes(ceiling_bytes)
        ),
        format!("last sync:  {last_sync}"),
    ]
}
