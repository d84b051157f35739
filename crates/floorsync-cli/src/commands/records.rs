use floorsync_core::Priority;

use crate::commands::common::{
    normalize_record_type, open_store, parse_payload, parse_record_id, StoreOptions,
};
use crate::error::CliError;

pub async fn run_save(
    record_type: &str,
    payload: &str,
    priority: Priority,
    options: &StoreOptions,
) -> Result<(), CliError> {
    let record_type = normalize_record_type(record_type)?;
    let store = open_store(options).await?;
    let id = store
        .save_data(&record_type, parse_payload(payload), priority)
        .await?;
    println!("{id}");
    Ok(())
}

pub async fn run_get(
    record_type: &str,
    id: Option<&str>,
    as_json: bool,
    options: &StoreOptions,
) -> Result<(), CliError> {
    let record_type = normalize_record_type(record_type)?;
    let store = open_store(options).await?;

    if let Some(raw_id) = id {
        let record_id = parse_record_id(raw_id)?;
        let payload = store
            .get_data_by_id(&record_type, &record_id)
            .await
            .ok_or_else(|| CliError::RecordNotFound(raw_id.to_string()))?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let payloads = store.get_data(&record_type).await;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&payloads)?);
        return Ok(());
    }
    if payloads.is_empty() {
        println!("No {record_type} records stored.");
        return Ok(());
    }
    for payload in payloads {
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

pub async fn run_delete(id: &str, options: &StoreOptions) -> Result<(), CliError> {
    let record_id = parse_record_id(id)?;
    let store = open_store(options).await?;
    store.delete_data(&record_id).await?;
    println!("{record_id}");
    Ok(())
}

pub async fn run_clear(record_type: &str, options: &StoreOptions) -> Result<(), CliError> {
    let record_type = normalize_record_type(record_type)?;
    let store = open_store(options).await?;
    let removed = store.clear_data(&record_type).await?;
    println!("Removed {removed} {record_type} record(s)");
    Ok(())
}
