//! Casadin Backend Service
//!
//! Activity logging and image upload service for the Casadin wedding planning
//! platform. Events are written to a DynamoDB table and exported as CSV;
//! images are stored in an S3-compatible bucket (MinIO in development) and
//! exposed through browser-reachable URLs.
//!
//! ## Features
//!
//! - **Activity Log**: timestamped records under a single partition key, read
//!   back newest first through a timestamp index
//! - **CSV Export**: fully quoted CSV of the most recent records
//! - **Image Uploads**: single and concurrent batch uploads with
//!   collision-resistant object names
//! - **Container-aware URLs**: links built for browsers even when the backend
//!   reaches storage by its container host name
//!
//! ## Architecture
//!
//! ```text
//!  HTTP API                   Services                 External
//! ┌──────────────┐          ┌──────────────┐         ┌──────────────┐
//! │ /log-test    │─────────▶│ Activity     │────────▶│ DynamoDB     │
//! │ /log-test/csv│          │ Logger       │         │ (LogTable)   │
//! └──────────────┘          └──────────────┘         └──────────────┘
//! ┌──────────────┐          ┌──────────────┐         ┌──────────────┐
//! │ /uploads     │─────────▶│ Upload       │────────▶│ MinIO / S3   │
//! │              │          │ Service      │         │ (Object      │
//! └──────────────┘          └──────────────┘         │  Storage)    │
//!                                                    └──────────────┘
//! ```

pub mod activity_log;
pub mod api;
pub mod config;
pub mod log_table;
pub mod object_storage;
pub mod upload;

pub use activity_log::{render_csv, ActivityLogger, LogReceipt, LogRecord};
pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use log_table::{DynamoLogTable, LogStoreError, LogTable, PARTITION_KEY};
pub use object_storage::{ObjectStorage, S3ObjectStorage, StorageError};
pub use upload::{build_object_name, UploadError, UploadFile, UploadService};
