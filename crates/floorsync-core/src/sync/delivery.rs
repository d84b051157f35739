//! Delivery capability: the injected transport that sends one record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Record;

/// Why a delivery attempt failed. Failures are routine on a flaky network and
/// only ever become record state, never caller-facing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rejected by server: {0}")]
    Rejected(String),
    #[error("No delivery route for record type '{0}'")]
    Unrouted(String),
    #[error("Delivery task panicked: {0}")]
    Panicked(String),
}

/// Transmits a record to its destination.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError>;
}

/// Dispatches records to a per-type delivery, with an optional fallback.
#[derive(Clone, Default)]
pub struct DeliveryRouter {
    routes: HashMap<String, Arc<dyn Delivery>>,
    fallback: Option<Arc<dyn Delivery>>,
}

impl DeliveryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `record_type` to `delivery`
    #[must_use]
    pub fn route(mut self, record_type: impl Into<String>, delivery: Arc<dyn Delivery>) -> Self {
        self.routes.insert(record_type.into(), delivery);
        self
    }

    /// Delivery used for types without a route
    #[must_use]
    pub fn fallback(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.fallback = Some(delivery);
        self
    }

    pub fn has_route(&self, record_type: &str) -> bool {
        self.routes.contains_key(record_type) || self.fallback.is_some()
    }
}

impl std::fmt::Debug for DeliveryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&String> = self.routes.keys().collect();
        routes.sort();
        f.debug_struct("DeliveryRouter")
            .field("routes", &routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[async_trait]
impl Delivery for DeliveryRouter {
    async fn attempt(&self, record: &Record) -> Result<(), DeliveryError> {
        let delivery = self
            .routes
            .get(&record.record_type)
            .or(self.fallback.as_ref())
            .ok_or_else(|| DeliveryError::Unrouted(record.record_type.clone()))?;
        delivery.attempt(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use serde_json::json;

    struct Fixed(Result<(), DeliveryError>);

    #[async_trait]
    impl Delivery for Fixed {
        async fn attempt(&self, _record: &Record) -> Result<(), DeliveryError> {
            self.0.clone()
        }
    }

    fn record(record_type: &str) -> Record {
        Record::new(record_type, json!({}), Priority::Medium)
    }

    #[tokio::test]
    async fn routes_by_record_type() {
        let router = DeliveryRouter::new()
            .route("job_update", Arc::new(Fixed(Ok(()))))
            .route(
                "andon_event",
                Arc::new(Fixed(Err(DeliveryError::Rejected("409".to_string())))),
            );

        assert!(router.attempt(&record("job_update")).await.is_ok());
        assert_eq!(
            router.attempt(&record("andon_event")).await,
            Err(DeliveryError::Rejected("409".to_string()))
        );
    }

    #[tokio::test]
    async fn unrouted_type_fails_without_fallback() {
        let router = DeliveryRouter::new().route("job_update", Arc::new(Fixed(Ok(()))));

        assert!(!router.has_route("checklist"));
        assert_eq!(
            router.attempt(&record("checklist")).await,
            Err(DeliveryError::Unrouted("checklist".to_string()))
        );
    }

    #[tokio::test]
    async fn fallback_handles_unrouted_types() {
        let router = DeliveryRouter::new().fallback(Arc::new(Fixed(Ok(()))));

        assert!(router.has_route("equipment_status"));
        assert!(router.attempt(&record("equipment_status")).await.is_ok());
    }
}
