use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use floorsync_core::{
    Connectivity, DeliveryRouter, FileStore, OfflineStore, Record, RecordId, StoreConfig,
};
use serde::Serialize;
use serde_json::Value;

use crate::delivery::HttpDelivery;
use crate::error::CliError;

/// Everything a command needs to open the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub data_dir: PathBuf,
    pub endpoint: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub record_type: String,
    pub priority: String,
    pub sync_state: String,
    pub retry_count: u32,
    pub version: u32,
    pub created_at: i64,
    pub relative_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub payload: Value,
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_data_dir
        .or_else(|| env::var_os("FLOORSYNC_DATA_DIR").map(PathBuf::from))
        .or_else(default_data_dir)
        .ok_or(CliError::NoDataDir)
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("floorsync"))
}

pub async fn open_store(options: &StoreOptions) -> Result<OfflineStore, CliError> {
    let config = StoreConfig::from_env()?;
    let storage = FileStore::new(options.data_dir.clone());
    let delivery = build_delivery(options.endpoint.as_deref())?;
    let connectivity = Connectivity::new(!options.offline);

    Ok(OfflineStore::open_manual(config, Arc::new(storage), Arc::new(delivery), connectivity).await?)
}

/// Without an endpoint every record type is unrouted.
pub fn build_delivery(endpoint: Option<&str>) -> Result<DeliveryRouter, CliError> {
    let router = DeliveryRouter::new();
    match endpoint.map(str::trim).filter(|value| !value.is_empty()) {
        Some(endpoint) => {
            let delivery = HttpDelivery::new(endpoint)?;
            tracing::debug!("Delivering records to {}", delivery.endpoint());
            Ok(router.fallback(Arc::new(delivery)))
        }
        None => Ok(router),
    }
}

pub fn normalize_record_type(record_type: &str) -> Result<String, CliError> {
    let trimmed = record_type.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyRecordType);
    }
    Ok(trimmed.to_string())
}

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    raw.trim()
        .parse::<RecordId>()
        .map_err(|_| CliError::InvalidRecordId(raw.to_string()))
}

/// Parses the payload as JSON, falling back to a plain string.
pub fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.trim().to_string()))
}

pub fn record_to_item(record: &Record) -> RecordListItem {
    let now_ms = Utc::now().timestamp_millis();
    RecordListItem {
        id: record.id.to_string(),
        record_type: record.record_type.clone(),
        priority: record.priority.to_string(),
        sync_state: record.sync_state.as_str().to_string(),
        retry_count: record.retry_count,
        version: record.version,
        created_at: record.created_at,
        relative_time: format_relative_time(record.created_at, now_ms),
        last_error: record.last_error.clone(),
        payload: record.payload.clone(),
    }
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(record.created_at, now_ms);
            let line = format!(
                "{short_id:<13}  {:<18}  {:<8}  {:<10}  retries={}  {relative_time}",
                record.record_type,
                record.priority,
                record.sync_state.as_str(),
                record.retry_count
            );
            match &record.last_error {
                Some(error) => format!("{line}  ({error})"),
                None => line,
            }
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;
    if bytes >= MIB {
        format!("{}.{:02} MiB", bytes / MIB, (bytes % MIB) * 100 / MIB)
    } else if bytes >= KIB {
        format!("{}.{:02} KiB", bytes / KIB, (bytes % KIB) * 100 / KIB)
    } else {
        format!("{bytes} B")
    }
}
