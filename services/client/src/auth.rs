use crate::config::ClientConfig;
use crate::token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
use bytes::Bytes;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Token store key for the bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// File name used for the log export download
pub const LOGS_FILE_NAME: &str = "logs.csv";

/// Errors returned by the API client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Token not found")]
    MissingToken,

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    TokenStore(#[from] TokenStoreError),

    #[error("Failed to save download: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginDto {
    pub email: String,
    pub password: String,
}

/// Account role chosen on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Fiance,
    Guest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDto {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Login/registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

/// Client for the auth and log export endpoints
pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
}

impl AuthClient {
    /// Create a client for `api_url`, which is treated as a directory
    pub fn new(api_url: &str, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(api_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            tokens,
        })
    }

    /// Create a client from configuration, persisting tokens when a directory is set
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let tokens: Arc<dyn TokenStore> = match &config.token_dir {
            Some(dir) => Arc::new(FileTokenStore::new(dir)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::new(&config.api_url, tokens)
    }

    #[instrument(skip(self, dto), fields(email = %dto.email))]
    pub async fn login(&self, dto: &LoginDto) -> Result<AuthResponse, ClientError> {
        self.authenticate("auth/login", dto).await
    }

    #[instrument(skip(self, dto), fields(email = %dto.email))]
    pub async fn register(&self, dto: &RegisterDto) -> Result<AuthResponse, ClientError> {
        self.authenticate("auth/register", dto).await
    }

    /// Profile of the signed-in user
    pub async fn get_profile(&self) -> Result<Value, ClientError> {
        let token = self.require_token()?;

        let profile = self
            .http
            .get(self.endpoint("auth/profile")?)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(profile)
    }

    pub fn get_token(&self) -> Option<String> {
        self.tokens.get(TOKEN_KEY)
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.tokens.remove(TOKEN_KEY)?;
        info!("Logged out");
        Ok(())
    }

    /// Raw CSV export of the activity log
    pub async fn fetch_logs_csv(&self) -> Result<Bytes, ClientError> {
        let token = self.require_token()?;

        let csv = self
            .http
            .get(self.endpoint("log-test/csv")?)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(csv)
    }

    /// Save the CSV export as `logs.csv` inside `dir`
    pub async fn download_logs_csv(&self, dir: &Path) -> Result<PathBuf, ClientError> {
        let csv = self.fetch_logs_csv().await?;
        let path = dir.join(LOGS_FILE_NAME);

        tokio::fs::write(&path, &csv).await?;

        info!(path = %path.display(), size_bytes = csv.len(), "Log export saved");
        Ok(path)
    }

    async fn authenticate<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<AuthResponse, ClientError> {
        let response: AuthResponse = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.tokens.set(TOKEN_KEY, &response.access_token)?;
        debug!("Access token stored");

        Ok(response)
    }

    fn require_token(&self) -> Result<String, ClientError> {
        self.get_token().ok_or(ClientError::MissingToken)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    const TOKEN: &str = "tok-123";
    const CSV: &str = "logId,actionType,timestamp,id,data,meta\n\"1\",\"TEST\",\"t\",\"1\",\"{}\",\"\"\n";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .map(|v| v == format!("Bearer {}", TOKEN).as_str())
            .unwrap_or(false)
    }

    async fn spawn_api() -> String {
        let app = Router::new()
            .route(
                "/api/auth/login",
                post(|Json(body): Json<Value>| async move {
                    if body["password"] == "secret" {
                        (
                            StatusCode::OK,
                            Json(json!({
                                "access_token": TOKEN,
                                "user": {"id": 1, "name": "Ana", "email": body["email"], "role": "fiance"}
                            })),
                        )
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})))
                    }
                }),
            )
            .route(
                "/api/auth/register",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["role"], "guest");
                    Json(json!({ "access_token": "tok-new" }))
                }),
            )
            .route(
                "/api/auth/profile",
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        (StatusCode::OK, Json(json!({"id": 1, "name": "Ana"})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({})))
                    }
                }),
            )
            .route(
                "/api/log-test/csv",
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        (StatusCode::OK, CSV.to_string())
                    } else {
                        (StatusCode::UNAUTHORIZED, String::new())
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // No trailing slash on purpose
        format!("http://{}/api", addr)
    }

    fn login_dto(password: &str) -> LoginDto {
        LoginDto {
            email: "ana@casadin.com".to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_base_url_is_directory() {
        let client = AuthClient::new("http://localhost:3001/api", Arc::new(MemoryTokenStore::new())).unwrap();
        assert_eq!(
            client.endpoint("auth/login").unwrap().as_str(),
            "http://localhost:3001/api/auth/login"
        );
    }

    #[test]
    fn test_invalid_url() {
        let result = AuthClient::new("not a url", Arc::new(MemoryTokenStore::new()));
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let client = AuthClient::new(&spawn_api().await, Arc::new(MemoryTokenStore::new())).unwrap();

        let response = client.login(&login_dto("secret")).await.unwrap();
        assert_eq!(response.access_token, TOKEN);
        assert_eq!(response.user.unwrap().role, "fiance");
        assert_eq!(client.get_token().as_deref(), Some(TOKEN));

        let profile = client.get_profile().await.unwrap();
        assert_eq!(profile["name"], "Ana");

        client.logout().unwrap();
        assert!(client.get_token().is_none());
        assert!(matches!(
            client.get_profile().await,
            Err(ClientError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_login_failure_propagates() {
        let client = AuthClient::new(&spawn_api().await, Arc::new(MemoryTokenStore::new())).unwrap();

        let err = client.login(&login_dto("wrong")).await.unwrap_err();
        match err {
            ClientError::Http(e) => assert_eq!(e.status(), Some(reqwest::StatusCode::UNAUTHORIZED)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.get_token().is_none());
    }

    #[tokio::test]
    async fn test_register_stores_token() {
        let client = AuthClient::new(&spawn_api().await, Arc::new(MemoryTokenStore::new())).unwrap();

        let response = client
            .register(&RegisterDto {
                name: "Bia".to_string(),
                email: "bia@casadin.com".to_string(),
                password: "pw".to_string(),
                role: Role::Guest,
            })
            .await
            .unwrap();

        assert!(response.user.is_none());
        assert_eq!(client.get_token().as_deref(), Some("tok-new"));
    }

    #[tokio::test]
    async fn test_download_logs_csv() {
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens.set(TOKEN_KEY, TOKEN).unwrap();
        let client = AuthClient::new(&spawn_api().await, tokens).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = client.download_logs_csv(dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("logs.csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), CSV);
    }

    #[tokio::test]
    async fn test_download_requires_token() {
        let client = AuthClient::new(&spawn_api().await, Arc::new(MemoryTokenStore::new())).unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            client.download_logs_csv(dir.path()).await,
            Err(ClientError::MissingToken)
        ));
        assert!(!dir.path().join("logs.csv").exists());
    }

    #[tokio::test]
    async fn test_file_backed_client_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            api_url: spawn_api().await,
            token_dir: Some(dir.path().to_path_buf()),
        };

        let client = AuthClient::from_config(&config).unwrap();
        client.login(&login_dto("secret")).await.unwrap();

        let reopened = AuthClient::from_config(&config).unwrap();
        assert_eq!(reopened.get_token().as_deref(), Some(TOKEN));
    }
}
