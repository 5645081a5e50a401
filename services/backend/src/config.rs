use serde::Deserialize;

/// Main configuration for the backend service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// DynamoDB activity log configuration
    #[serde(default)]
    pub log_store: LogStoreConfig,
    /// Object storage (MinIO / S3) configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body for image uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// DynamoDB table holding activity log records
#[derive(Debug, Clone, Deserialize)]
pub struct LogStoreConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Table name
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Custom endpoint URL (DynamoDB Local, LocalStack)
    pub endpoint_url: Option<String>,
    /// Secondary index ordered by timestamp
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Maximum number of records returned by a read
    #[serde(default = "default_query_limit")]
    pub query_limit: i32,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage host name, without scheme or port
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,
    /// Storage port
    #[serde(default = "default_storage_port")]
    pub port: u16,
    /// Use https when talking to storage and when building URLs
    #[serde(default)]
    pub use_ssl: bool,
    /// Bucket for uploaded images
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Region passed on bucket creation
    pub region: Option<String>,
    /// Public base URL used for object links
    pub public_url: Option<String>,
    /// Host name of the storage service inside the container network.
    /// Browsers cannot resolve it, so URLs use `browser_host` instead.
    #[serde(default = "default_container_host")]
    pub container_host: String,
    #[serde(default = "default_browser_host")]
    pub browser_host: String,
    /// Folder used when an upload does not name one
    #[serde(default = "default_folder")]
    pub default_folder: String,
}

// Default value functions
fn default_service_name() -> String {
    "casadin-backend".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024 // 20MB
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_table_name() -> String {
    "ApplicationLogs".to_string()
}

fn default_index_name() -> String {
    "TimestampIndex".to_string()
}

fn default_query_limit() -> i32 {
    50
}

fn default_storage_endpoint() -> String {
    "localhost".to_string()
}

fn default_storage_port() -> u16 {
    9000
}

fn default_bucket() -> String {
    "uploads".to_string()
}

fn default_container_host() -> String {
    "minio".to_string()
}

fn default_browser_host() -> String {
    "localhost".to_string()
}

fn default_folder() -> String {
    "weddings".to_string()
}

/// Flat environment variables used by existing deployments, mapped onto
/// configuration keys. For duplicated keys the first variable present wins.
const LEGACY_ENV: &[(&str, &[&str])] = &[
    ("log_store.region", &["AWS_REGION", "DYNAMODB_REGION"]),
    ("log_store.table_name", &["DDB_TABLE_NAME", "DYNAMODB_TABLE"]),
    ("log_store.endpoint_url", &["DYNAMODB_ENDPOINT"]),
    ("storage.endpoint", &["MINIO_ENDPOINT"]),
    ("storage.port", &["MINIO_PORT"]),
    ("storage.use_ssl", &["MINIO_USE_SSL"]),
    ("storage.bucket", &["MINIO_BUCKET"]),
    ("storage.access_key", &["MINIO_ACCESS_KEY"]),
    ("storage.secret_key", &["MINIO_SECRET_KEY"]),
    ("storage.region", &["MINIO_REGION"]),
    ("storage.public_url", &["MINIO_PUBLIC_URL"]),
    ("api.port", &["PORT"]),
];

impl Config {
    /// Load configuration from config files and the process environment
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_env(std::env::vars().collect())
    }

    /// Load configuration using `vars` in place of the process environment.
    /// Structured `CASADIN__` variables win over the flat deployment ones.
    pub fn load_from_env(vars: config::Map<String, String>) -> anyhow::Result<Self> {
        let mut legacy = config::Config::builder();
        for (key, names) in LEGACY_ENV {
            let value = names
                .iter()
                .find_map(|name| vars.get(*name).filter(|v| !v.is_empty()))
                .map(|v| match *key {
                    // Only the exact string "true" enables TLS
                    "storage.use_ssl" => (v == "true").to_string(),
                    _ => v.clone(),
                });
            legacy = legacy.set_override_option(*key, value)?;
        }

        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/backend").required(false))
            .add_source(config::File::with_name("/etc/casadin/backend").required(false))
            .add_source(legacy.build()?)
            // CASADIN__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("CASADIN")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl ApiConfig {
    /// Address the HTTP API binds to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            table_name: default_table_name(),
            endpoint_url: None,
            index_name: default_index_name(),
            query_limit: default_query_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            port: default_storage_port(),
            use_ssl: false,
            bucket: default_bucket(),
            access_key: String::new(),
            secret_key: String::new(),
            region: None,
            public_url: None,
            container_host: default_container_host(),
            browser_host: default_browser_host(),
            default_folder: default_folder(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Config {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load_from_env(vars).unwrap()
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]);
        assert_eq!(config.log_store.region, "us-east-1");
        assert_eq!(config.log_store.table_name, "ApplicationLogs");
        assert_eq!(config.log_store.index_name, "TimestampIndex");
        assert_eq!(config.log_store.query_limit, 50);
        assert_eq!(config.storage.endpoint, "localhost");
        assert_eq!(config.storage.port, 9000);
        assert!(!config.storage.use_ssl);
        assert_eq!(config.storage.bucket, "uploads");
        assert_eq!(config.storage.container_host, "minio");
        assert_eq!(config.storage.default_folder, "weddings");
        assert!(config.storage.public_url.is_none());
    }

    #[test]
    fn test_legacy_variables() {
        let config = load(&[
            ("MINIO_ENDPOINT", "minio"),
            ("MINIO_PORT", "9100"),
            ("MINIO_USE_SSL", "true"),
            ("MINIO_BUCKET", "photos"),
            ("MINIO_PUBLIC_URL", "https://cdn.example.com"),
            ("DDB_TABLE_NAME", "Logs"),
            ("PORT", "8081"),
        ]);
        assert_eq!(config.storage.endpoint, "minio");
        assert_eq!(config.storage.port, 9100);
        assert!(config.storage.use_ssl);
        assert_eq!(config.storage.bucket, "photos");
        assert_eq!(
            config.storage.public_url.as_deref(),
            Some("https://cdn.example.com")
        );
        assert_eq!(config.log_store.table_name, "Logs");
        assert_eq!(config.api.port, 8081);
    }

    #[test]
    fn test_first_legacy_variable_wins() {
        let config = load(&[("AWS_REGION", "eu-west-1"), ("DYNAMODB_REGION", "sa-east-1")]);
        assert_eq!(config.log_store.region, "eu-west-1");

        let config = load(&[("DYNAMODB_REGION", "sa-east-1"), ("AWS_REGION", "")]);
        assert_eq!(config.log_store.region, "sa-east-1");
    }

    #[test]
    fn test_structured_variables_win_over_flat() {
        let config = load(&[
            ("MINIO_BUCKET", "flat"),
            ("CASADIN__STORAGE__BUCKET", "structured"),
            ("PORT", "8081"),
        ]);
        assert_eq!(config.storage.bucket, "structured");
        assert_eq!(config.api.port, 8081);
    }

    #[test]
    fn test_use_ssl_requires_exact_true() {
        for value in ["yes", "1", "on", "TRUE", "maybe"] {
            let config = load(&[("MINIO_USE_SSL", value)]);
            assert!(!config.storage.use_ssl, "{value} should not enable TLS");
        }
        assert!(load(&[("MINIO_USE_SSL", "true")]).storage.use_ssl);
    }

    #[test]
    fn test_api_addr() {
        let config = load(&[("CASADIN__API__HOST", "127.0.0.1"), ("PORT", "8081")]);
        assert_eq!(config.api.addr(), "127.0.0.1:8081");
    }
}
