use crate::activity_log::LogRecord;
use crate::config::LogStoreConfig;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Partition key value shared by every activity log record
pub const PARTITION_KEY: &str = "LOG";

/// Errors raised by the log table
#[derive(Error, Debug)]
pub enum LogStoreError {
    #[error("Failed to write log record: {0}")]
    Write(String),

    #[error("Failed to query log records: {0}")]
    Query(String),
}

/// Persistence seam for activity log records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogTable: Send + Sync {
    /// Store a single record
    async fn put(&self, record: &LogRecord) -> Result<(), LogStoreError>;

    /// Most recent records first, at most `limit` of them
    async fn query_recent(&self, limit: i32) -> Result<Vec<LogRecord>, LogStoreError>;
}

/// DynamoDB-backed log table
pub struct DynamoLogTable {
    client: DynamoClient,
    table_name: String,
    index_name: String,
}

impl DynamoLogTable {
    /// Create a new DynamoDB log table client
    pub async fn new(config: &LogStoreConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut dynamo_config_builder = DynamoConfigBuilder::from(&aws_config);

        // DynamoDB Local / LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            dynamo_config_builder = dynamo_config_builder.endpoint_url(endpoint_url);
        }

        let client = DynamoClient::from_conf(dynamo_config_builder.build());

        info!(
            table = %config.table_name,
            index = %config.index_name,
            region = %config.region,
            "DynamoDB log table initialized"
        );

        Ok(Self {
            client,
            table_name: config.table_name.clone(),
            index_name: config.index_name.clone(),
        })
    }
}

#[async_trait]
impl LogTable for DynamoLogTable {
    #[instrument(skip(self, record), fields(log_id = %record.log_id))]
    async fn put(&self, record: &LogRecord) -> Result<(), LogStoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| LogStoreError::Write(DisplayErrorContext(&e).to_string()))?;

        debug!("Log record written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_recent(&self, limit: i32) -> Result<Vec<LogRecord>, LogStoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.index_name)
            .key_condition_expression("PK = :pk")
            .expression_attribute_values(":pk", AttributeValue::S(PARTITION_KEY.to_string()))
            .scan_index_forward(false)
            .limit(limit)
            .send()
            .await
            .map_err(|e| LogStoreError::Query(DisplayErrorContext(&e).to_string()))?;

        let records: Vec<LogRecord> = output
            .items
            .unwrap_or_default()
            .iter()
            .map(item_to_record)
            .collect();

        debug!(count = records.len(), "Log records fetched");
        Ok(records)
    }
}

/// Build the DynamoDB item for a record. An absent `meta` is left out.
pub fn record_to_item(record: &LogRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(PARTITION_KEY.to_string()));
    item.insert("logId".to_string(), AttributeValue::S(record.log_id.clone()));
    item.insert(
        "actionType".to_string(),
        AttributeValue::S(record.action_type.clone()),
    );
    item.insert(
        "timestamp".to_string(),
        AttributeValue::S(record.timestamp.clone()),
    );
    item.insert("id".to_string(), AttributeValue::S(record.id.clone()));
    item.insert("data".to_string(), json_to_attribute(&record.data));
    if let Some(meta) = &record.meta {
        item.insert(
            "meta".to_string(),
            json_to_attribute(&Value::Object(meta.clone())),
        );
    }
    item
}

/// Read a record back from a DynamoDB item. Missing attributes become empty values.
pub fn item_to_record(item: &HashMap<String, AttributeValue>) -> LogRecord {
    let string = |name: &str| {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default()
    };

    let meta = match item.get("meta").map(attribute_to_json) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };

    LogRecord {
        log_id: string("logId"),
        action_type: string("actionType"),
        timestamp: string("timestamp"),
        id: string("id"),
        data: item.get("data").map(attribute_to_json).unwrap_or(Value::Null),
        meta,
    }
}

/// Map a JSON value onto the native DynamoDB attribute types
pub fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

/// Inverse of [`json_to_attribute`]. Binary values come back as hex strings.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        AttributeValue::Ss(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(items) => Value::Array(items.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::B(blob) => Value::String(hex::encode(blob.as_ref())),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|b| Value::String(hex::encode(b.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn parse_number(raw: &str) -> Value {
    raw.parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}
