use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{error::StorageError, model::WeatherQuery};

pub mod dynamodb;

pub use dynamodb::DynamoHistoryStore;

/// One served request, keyed by client IP and request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub client_ip: String,
    pub timestamp: DateTime<Utc>,
    pub city: String,
    pub success: bool,
}

/// Insert-only storage for [`HistoryRecord`]s.
#[async_trait]
pub trait HistoryStore: Send + Sync + Debug {
    async fn insert(&self, record: &HistoryRecord) -> Result<(), StorageError>;
}

/// Stamps and writes one history record per request.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, client_ip: &str, query: &WeatherQuery, success: bool) -> Result<(), StorageError> {
        let record = HistoryRecord {
            client_ip: client_ip.to_owned(),
            timestamp: Utc::now(),
            city: query.city().to_owned(),
            success,
        };

        self.store.insert(&record).await?;
        debug!(client_ip, city = %record.city, success, "recorded request history");

        Ok(())
    }
}
