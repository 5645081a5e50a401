use crate::log_table::LogTable;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Column order of the CSV export
pub const CSV_HEADERS: [&str; 6] = ["logId", "actionType", "timestamp", "id", "data", "meta"];

/// A single activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub log_id: String,
    pub action_type: String,
    /// ISO-8601 UTC timestamp with millisecond precision
    pub timestamp: String,
    /// Same value as `log_id`
    pub id: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl LogRecord {
    /// Create a record stamped with a fresh id and the current time
    pub fn new(action_type: &str, data: Value, meta: Option<Map<String, Value>>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            log_id: id.clone(),
            action_type: action_type.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            id,
            data,
            meta,
        }
    }
}

/// Identifier and timestamp of a stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogReceipt {
    pub id: String,
    pub timestamp: String,
}

/// Writes activity records and exports the most recent ones.
///
/// Store failures never reach the caller: writes report `None` and reads
/// come back empty, with the error logged.
pub struct ActivityLogger {
    table: Arc<dyn LogTable>,
    query_limit: i32,
}

impl ActivityLogger {
    pub fn new(table: Arc<dyn LogTable>, query_limit: i32) -> Self {
        Self { table, query_limit }
    }

    /// Record an event
    #[instrument(skip(self, data, meta))]
    pub async fn log(
        &self,
        action_type: &str,
        data: Value,
        meta: Option<Map<String, Value>>,
    ) -> Option<LogReceipt> {
        let record = LogRecord::new(action_type, data, meta);

        match self.table.put(&record).await {
            Ok(()) => {
                metrics::counter!("casadin_log_writes_total", "outcome" => "ok").increment(1);
                debug!(log_id = %record.log_id, "Activity logged");
                Some(LogReceipt {
                    id: record.id,
                    timestamp: record.timestamp,
                })
            }
            Err(e) => {
                metrics::counter!("casadin_log_writes_total", "outcome" => "error").increment(1);
                error!(error = %e, "Failed to write activity log");
                None
            }
        }
    }

    /// Most recent records, newest first
    #[instrument(skip(self))]
    pub async fn read_logs(&self) -> Vec<LogRecord> {
        match self.table.query_recent(self.query_limit).await {
            Ok(records) => {
                info!(count = records.len(), "Activity logs read");
                records
            }
            Err(e) => {
                error!(error = %e, "Failed to read activity logs");
                Vec::new()
            }
        }
    }

    /// CSV export of [`read_logs`](Self::read_logs); empty when there is nothing to export
    pub async fn generate_csv_logs(&self) -> String {
        render_csv(&self.read_logs().await)
    }
}

/// Render records as CSV: header plus one row each, every field quoted,
/// every line newline-terminated. No records gives an empty string.
///
/// A record without `meta` renders that column as `""` rather than the
/// literal `"undefined"` older exports produced.
pub fn render_csv(records: &[LogRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut csv = CSV_HEADERS.join(",");
    csv.push('\n');

    for record in records {
        let meta = record
            .meta
            .as_ref()
            .map(|m| Value::Object(m.clone()).to_string())
            .unwrap_or_default();

        let row = [
            csv_field(&record.log_id),
            csv_field(&record.action_type),
            csv_field(&record.timestamp),
            csv_field(&record.id),
            csv_field(&record.data.to_string()),
            csv_field(&meta),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    csv
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_table::{LogStoreError, MockLogTable};
    use chrono::DateTime;
    use serde_json::json;

    fn record(action: &str, data: Value) -> LogRecord {
        let mut meta = Map::new();
        meta.insert("source".to_string(), json!("tests"));
        LogRecord::new(action, data, Some(meta))
    }

    #[test]
    fn test_new_record_duplicates_id() {
        let record = LogRecord::new("LOGIN", json!({"user": 7}), None);
        assert!(!record.log_id.is_empty());
        assert_eq!(record.log_id, record.id);
        assert!(record.timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_log_returns_receipt() {
        let mut table = MockLogTable::new();
        table
            .expect_put()
            .withf(|r: &LogRecord| r.action_type == "TEST" && r.data == json!({"test": true}))
            .times(1)
            .returning(|_| Ok(()));

        let logger = ActivityLogger::new(Arc::new(table), 50);
        let receipt = logger.log("TEST", json!({"test": true}), None).await.unwrap();

        assert!(!receipt.id.is_empty());
        assert!(DateTime::parse_from_rfc3339(&receipt.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_log_masks_write_failure() {
        let mut table = MockLogTable::new();
        table
            .expect_put()
            .returning(|_| Err(LogStoreError::Write("throttled".to_string())));

        let logger = ActivityLogger::new(Arc::new(table), 50);
        assert!(logger.log("TEST", json!(1), None).await.is_none());
    }

    #[tokio::test]
    async fn test_read_logs_uses_limit_and_masks_failure() {
        let mut table = MockLogTable::new();
        table
            .expect_query_recent()
            .withf(|limit| *limit == 50)
            .returning(|_| Err(LogStoreError::Query("no such index".to_string())));

        let logger = ActivityLogger::new(Arc::new(table), 50);
        assert!(logger.read_logs().await.is_empty());
        assert_eq!(logger.generate_csv_logs().await, "");
    }

    #[tokio::test]
    async fn test_generate_csv_logs() {
        let records = vec![
            record("TEST", json!({"test": true})),
            record("UPLOAD", json!("photo")),
            record("LOGIN", json!(null)),
        ];
        let expected = records.clone();

        let mut table = MockLogTable::new();
        table
            .expect_query_recent()
            .returning(move |_| Ok(records.clone()));

        let logger = ActivityLogger::new(Arc::new(table), 50);
        let csv = logger.generate_csv_logs().await;
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), expected.len() + 1);
        assert_eq!(lines[0], "logId,actionType,timestamp,id,data,meta");
        assert!(lines[1].starts_with(&format!("\"{}\",\"TEST\"", expected[0].log_id)));
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn test_render_csv_escapes_quotes() {
        let mut record = LogRecord::new("NOTE", json!({"msg": "say \"hi\""}), None);
        record.log_id = "a".to_string();
        record.id = "a".to_string();
        record.timestamp = "2024-01-01T00:00:00.000Z".to_string();

        let csv = render_csv(&[record]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#""a","NOTE","2024-01-01T00:00:00.000Z","a","{""msg"":""say \""hi\""""}","""#
        );
    }

    #[test]
    fn test_render_csv_empty() {
        assert_eq!(render_csv(&[]), "");
    }
}
