use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    error::{DisplayErrorContext, SdkError},
    operation::put_item::PutItemError,
    types::AttributeValue,
};
use chrono::SecondsFormat;

use crate::error::StorageError;

use super::{HistoryRecord, HistoryStore};

pub const DEFAULT_TABLE_NAME: &str = "RequestIPLogs";

const ATTR_IP: &str = "ip";
const ATTR_TIMESTAMP: &str = "timestamp";
const ATTR_REQUESTED_AT: &str = "requested_at";
const ATTR_CITY: &str = "city";
const ATTR_SUCCESS: &str = "success";

/// History table in DynamoDB: partition key `ip` (S), sort key `timestamp`
/// (N, epoch milliseconds).
#[derive(Debug, Clone)]
pub struct DynamoHistoryStore {
    client: Client,
    table_name: String,
}

impl DynamoHistoryStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self { client, table_name: table_name.into() }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl HistoryStore for DynamoHistoryStore {
    async fn insert(&self, record: &HistoryRecord) -> Result<(), StorageError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            // Never overwrite an existing (ip, timestamp) item.
            .condition_expression("attribute_not_exists(#ip)")
            .expression_attribute_names("#ip", ATTR_IP)
            .send()
            .await
            .map_err(|err| put_error(err, record))?;

        Ok(())
    }
}

/// A failed conditional check means the `(ip, timestamp)` item already exists.
fn put_error<R>(err: SdkError<PutItemError, R>, record: &HistoryRecord) -> StorageError
where
    R: Debug,
{
    let conflict = err
        .as_service_error()
        .is_some_and(PutItemError::is_conditional_check_failed_exception);

    if conflict {
        StorageError::Conflict {
            client_ip: record.client_ip.clone(),
            timestamp_ms: record.timestamp.timestamp_millis(),
        }
    } else {
        StorageError::Backend(DisplayErrorContext(&err).to_string())
    }
}

fn record_to_item(record: &HistoryRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (ATTR_IP.to_string(), AttributeValue::S(record.client_ip.clone())),
        (
            ATTR_TIMESTAMP.to_string(),
            AttributeValue::N(record.timestamp.timestamp_millis().to_string()),
        ),
        (
            ATTR_REQUESTED_AT.to_string(),
            AttributeValue::S(record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ),
        (ATTR_CITY.to_string(), AttributeValue::S(record.city.clone())),
        (ATTR_SUCCESS.to_string(), AttributeValue::Bool(record.success)),
    ])
}
