//! HTTP delivery: POSTs each record as JSON to a single endpoint.

use std::time::Duration;

use async_trait::async_trait;
use floorsync_core::{Delivery, DeliveryError, Record};
use reqwest::StatusCode;

use crate::error::CliError;

const DELIVERY_HTTP_TIMEOUT_SECS: u64 = 15;
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpDelivery {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new(endpoint: &str) -> Result<Self, CliError> {
        let endpoint = normalize_endpoint(endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DELIVERY_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|error| DeliveryError::Network(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

/// Client errors mean the server looked at the record and refused it;
/// everything else is worth retrying.
pub fn classify_failure(status: StatusCode, body: &str) -> DeliveryError {
    let detail = compact_body(body);
    let message = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {detail}", status.as_u16())
    };
    if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
        DeliveryError::Rejected(message)
    } else {
        DeliveryError::Network(message)
    }
}

pub fn normalize_endpoint(raw: &str) -> Result<String, CliError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(trimmed.to_string())
    } else {
        Err(CliError::InvalidEndpoint(raw.to_string()))
    }
}

fn compact_body(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_BODY_CHARS {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(MAX_ERROR_BODY_CHARS - 3)
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
