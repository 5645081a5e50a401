//! Casadin Client
//!
//! Client-side pieces of the Casadin web app: an authenticated API client
//! that keeps the bearer token in a [`TokenStore`] and downloads the activity
//! log export, and the [`RouteGuard`] state machine that keeps
//! unauthenticated users out of protected pages.

pub mod auth;
pub mod config;
pub mod route_guard;
pub mod token_store;

pub use auth::{AuthClient, AuthResponse, AuthUser, ClientError, LoginDto, RegisterDto, Role};
pub use config::ClientConfig;
pub use route_guard::{AuthStatus, GuardPhase, GuardView, Navigator, RouteGuard, LOGIN_PATH};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
