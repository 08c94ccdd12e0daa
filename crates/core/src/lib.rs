//! Core OAuth2/OIDC client engine
//!
//! This crate implements the grant-acquisition engine used by Grantwell
//! hosts: it acquires, caches, refreshes and validates access/refresh/
//! identity tokens via Authorization-Code (PKCE + CSRF state),
//! Client-Credentials and Refresh-Token exchanges, resolving endpoints from
//! OIDC discovery metadata when they are not statically configured.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Authenticator   │  Grant state machine (cached/silent/forced ladder)
//! └────────┬─────────┘
//!          │
//!          ├──► AuthState           (PKCE verifier/challenge, CSRF state)
//!          ├──► DiscoveryProvider   (endpoint metadata, newest-wins cache)
//!          ├──► TokenCache          (secure Grant storage, via port)
//!          ├──► CallbackListener    (loopback redirect capture, via port)
//!          └──► Grant / TokenInfo   (token bundle, margin-aware caching)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use grantwell_core::{AuthConfig, Authenticator, DiscoveryProvider, GrantOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = AuthConfig::new("my_client_id");
//!     config.set_authority("https://idp.example".parse()?);
//!     config.set_redirect_uri("http://127.0.0.1:8888/callback".parse()?);
//!
//!     let discovery = Arc::new(DiscoveryProvider::new(None));
//!     let authenticator = Authenticator::new(config, discovery);
//!
//!     let ctx = authenticator.context(None, GrantOptions::silent(None, None, None, None));
//!     let grant = authenticator.get_access_token_silently(&ctx).await?;
//!     println!("access token expires at {:?}", grant.expires());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`state`]**: PKCE verifier/challenge and CSRF state generation
//! - **[`grant`]**: `TokenInfo`/`Grant` token bundle and margin-aware cloning
//! - **[`options`]**: request-scoped policy (`GrantFlags`, `GrantOptions`,
//!   `AuthContext`)
//! - **[`config`]**: the narrow configuration surface the engine consumes
//! - **[`ports`]**: collaborator traits (token cache, discovery store,
//!   callback listener, validators, observers)
//! - **[`discovery`]**: discovery-document resolution and caching
//! - **[`authenticator`]**: the grant state machine

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod authenticator;
pub mod config;
pub mod discovery;
pub mod grant;
pub mod options;
pub mod ports;
pub mod state;

mod cancel;

// Re-export commonly used types
pub use authenticator::Authenticator;
pub use config::AuthConfig;
pub use discovery::{DiscoveryDocument, DiscoveryProvider};
pub use grant::{Grant, TokenInfo, TokenRole};
pub use options::{AuthContext, AuthorityInfo, ClientCredentials, GrantFlags, GrantOptions, GrantType};
pub use ports::{
    AuthorizationCallback, AuthorizedObserver, CallbackListener, DiscoveryStore,
    PendingAuthorization, TokenCache, TokenValidator, UrlOpener,
};
// Re-export the error types used across the public API
pub use grantwell_domain::{AuthError, Result};
