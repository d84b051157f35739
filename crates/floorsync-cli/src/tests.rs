use std::path::PathBuf;

use clap::Parser;
use floorsync_core::sync::{PassSummary, SkipReason};
use floorsync_core::{DeliveryError, Priority, ResolveChoice, SyncReport, SyncState, SyncStatus};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;

use crate::cli::{Cli, Commands, ResolveArg};
use crate::commands::common::{
    build_delivery, format_bytes, format_relative_time, normalize_record_type, open_store,
    parse_payload, parse_record_id, record_to_item, resolve_data_dir, StoreOptions,
};
use crate::commands::status::format_status_lines;
use crate::commands::sync::{describe_report, run_clear_storage, run_sync};
use crate::delivery::{classify_failure, normalize_endpoint, HttpDelivery};
use crate::error::CliError;

fn offline_options(dir: &tempfile::TempDir) -> StoreOptions {
    StoreOptions {
        data_dir: dir.path().to_path_buf(),
        endpoint: None,
        offline: true,
    }
}

#[test]
fn parse_payload_accepts_json_and_plain_text() {
    assert_eq!(parse_payload(r#"{"line": 3}"#), json!({"line": 3}));
    assert_eq!(parse_payload("  press jammed "), json!("press jammed"));
    assert_eq!(parse_payload("42"), json!(42));
}

#[test]
fn normalize_record_type_trims_and_rejects_empty() {
    assert_eq!(normalize_record_type(" job_update ").unwrap(), "job_update");
    assert!(matches!(
        normalize_record_type("   "),
        Err(CliError::EmptyRecordType)
    ));
}

#[test]
fn parse_record_id_rejects_garbage() {
    assert!(matches!(
        parse_record_id("not-a-uuid"),
        Err(CliError::InvalidRecordId(_))
    ));
}

#[test]
fn explicit_data_dir_wins() {
    let dir = PathBuf::from("/tmp/floorsync-explicit");
    assert_eq!(resolve_data_dir(Some(dir.clone())).unwrap(), dir);
}

#[test]
fn normalize_endpoint_requires_http_scheme() {
    assert_eq!(
        normalize_endpoint(" https://mes.example.com/ingest/ ").unwrap(),
        "https://mes.example.com/ingest"
    );
    assert!(matches!(
        normalize_endpoint("mes.example.com"),
        Err(CliError::InvalidEndpoint(_))
    ));
}

#[test]
fn http_delivery_keeps_normalized_endpoint() {
    let delivery = HttpDelivery::new("http://localhost:8080/records/").unwrap();
    assert_eq!(delivery.endpoint(), "http://localhost:8080/records");
}

#[test]
fn client_errors_are_rejections_and_server_errors_retry() {
    assert_eq!(
        classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "bad  payload\n"),
        DeliveryError::Rejected("HTTP 422: bad payload".to_string())
    );
    assert_eq!(
        classify_failure(StatusCode::SERVICE_UNAVAILABLE, ""),
        DeliveryError::Network("HTTP 503".to_string())
    );
    assert!(matches!(
        classify_failure(StatusCode::REQUEST_TIMEOUT, ""),
        DeliveryError::Network(_)
    ));
}

#[test]
fn delivery_without_endpoint_has_no_routes() {
    let router = build_delivery(None).unwrap();
    assert!(!router.has_route("job_update"));

    let router = build_delivery(Some("https://mes.example.com")).unwrap();
    assert!(router.has_route("job_update"));
}

#[test]
fn relative_time_buckets() {
    let now = 10 * 24 * 3_600_000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 2 * 3_600_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 3_600_000, now), "3d ago");
}

#[test]
fn bytes_are_humanized() {
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1536), "1.50 KiB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
}

#[test]
fn describe_report_covers_skips_and_counts() {
    assert_eq!(
        describe_report(&SyncReport::Skipped(SkipReason::Offline)),
        "Sync skipped: offline"
    );
    let summary = PassSummary {
        attempted: 4,
        synced: 2,
        failed: 1,
        conflicted: 1,
        status: SyncStatus::default(),
    };
    assert_eq!(
        describe_report(&SyncReport::Completed(summary)),
        "Sync completed: 4 attempted, 2 synced, 1 failed, 1 conflicted"
    );
}

#[test]
fn status_lines_show_never_synced() {
    let status = SyncStatus {
        pending: 3,
        total: 3,
        storage_bytes: 2048,
        ..SyncStatus::default()
    };
    let lines = format_status_lines(&status, 5 * 1024 * 1024);
    assert_eq!(lines[0], "network:    offline");
    assert_eq!(lines[6], "storage:    2.00 KiB / 5.00 MiB");
    assert_eq!(lines[7], "last sync:  never");
}

#[test]
fn cli_parses_save_with_priority() {
    let cli = Cli::try_parse_from([
        "floorsync",
        "save",
        "andon_event",
        r#"{"line": 2}"#,
        "--priority",
        "critical",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Save {
            record_type,
            priority,
            ..
        }) => {
            assert_eq!(record_type, "andon_event");
            assert_eq!(priority, Priority::Critical);
        }
        _ => panic!("expected save command"),
    }
}

#[test]
fn cli_parses_resolve_choice() {
    let cli = Cli::try_parse_from(["floorsync", "resolve", "--choice", "discard-local"]).unwrap();
    match cli.command {
        Some(Commands::Resolve { choice }) => {
            assert_eq!(choice, ResolveArg::DiscardLocal);
            assert_eq!(ResolveChoice::from(choice), ResolveChoice::DiscardLocal);
        }
        _ => panic!("expected resolve command"),
    }
    assert!(Cli::try_parse_from(["floorsync", "resolve", "--choice", "merge"]).is_err());
}

#[tokio::test]
async fn records_persist_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let options = offline_options(&dir);

    let id = {
        let store = open_store(&options).await.unwrap();
        store
            .save_data("job_update", json!({"job": 17}), Priority::High)
            .await
            .unwrap()
    };

    let store = open_store(&options).await.unwrap();
    assert_eq!(store.get_data("job_update").await, vec![json!({"job": 17})]);
    let record = store.get_record(&id).await.unwrap();
    let item = record_to_item(&record);
    assert_eq!(item.priority, "high");
    assert_eq!(item.sync_state, SyncState::Pending.as_str());
}

#[tokio::test]
async fn sync_without_endpoint_is_not_configured() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions {
        offline: false,
        ..offline_options(&dir)
    };
    assert!(matches!(
        run_sync(&options).await,
        Err(CliError::SyncNotConfigured)
    ));
}

#[tokio::test]
async fn clear_storage_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let options = offline_options(&dir);
    {
        let store = open_store(&options).await.unwrap();
        store
            .save_data("checklist", json!("step"), Priority::Low)
            .await
            .unwrap();
    }

    assert!(matches!(
        run_clear_storage(false, &options).await,
        Err(CliError::ConfirmationRequired)
    ));
    run_clear_storage(true, &options).await.unwrap();

    let store = open_store(&options).await.unwrap();
    assert_eq!(store.get_sync_status().await.unwrap().total, 0);
}
