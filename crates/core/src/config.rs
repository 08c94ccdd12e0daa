//! Authentication configuration surface
//!
//! The engine consumes configuration through this narrow struct; how the
//! values are produced (files, environment, remote config) is the host's
//! concern. Construction never performs I/O.

use std::time::Duration;

use grantwell_domain::constants::CACHE_KEY_SEPARATOR;
use grantwell_domain::{AuthError, Result};
use url::Url;

use crate::options::GrantType;

/// Static authentication configuration for one client registration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Authority root; endpoints are resolved against it when not set
    /// explicitly.
    pub authority: Option<Url>,
    /// Explicit authorization endpoint; derived from the authority when
    /// absent.
    pub authorization_endpoint: Option<Url>,
    /// Explicit token endpoint, skipping discovery.
    pub token_endpoint: Option<Url>,
    /// Redirect URI the loopback listener binds to.
    pub redirect_uri: Option<Url>,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret, for confidential clients only.
    pub client_secret: Option<String>,
    /// Scopes requested with every grant, space-separated.
    pub scope: Option<String>,
    /// Whether a CSRF state token is carried through the redirect.
    pub use_state: bool,
    /// Whether PKCE is applied to authorization-code exchanges.
    pub use_pkce: bool,
    /// Whether acquired Grants are written to the token cache.
    pub caching_enabled: bool,
    /// Whether refresh exchanges identify the client with `client_id`.
    pub refresh_with_client_id: bool,
    /// Default attempt timeout; request options may override.
    pub timeout: Option<Duration>,
    /// Grant executed when the request does not name one.
    pub default_grant_type: GrantType,
}

impl AuthConfig {
    /// Create a configuration for the given client id with engine defaults:
    /// state and PKCE enabled, caching enabled, authorization-code grants.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            authority: None,
            authorization_endpoint: None,
            token_endpoint: None,
            redirect_uri: None,
            client_id: client_id.into(),
            client_secret: None,
            scope: None,
            use_state: true,
            use_pkce: true,
            caching_enabled: true,
            refresh_with_client_id: true,
            timeout: None,
            default_grant_type: GrantType::AuthorizationCode,
        }
    }

    /// Set the authority root.
    pub fn set_authority(&mut self, authority: Url) {
        self.authority = Some(authority);
    }

    /// Set an explicit authorization endpoint.
    pub fn set_authorization_endpoint(&mut self, endpoint: Url) {
        self.authorization_endpoint = Some(endpoint);
    }

    /// Set an explicit token endpoint.
    pub fn set_token_endpoint(&mut self, endpoint: Url) {
        self.token_endpoint = Some(endpoint);
    }

    /// Set the redirect URI for loopback callbacks.
    pub fn set_redirect_uri(&mut self, redirect_uri: Url) {
        self.redirect_uri = Some(redirect_uri);
    }

    /// Set the client secret.
    pub fn set_client_secret(&mut self, secret: Option<String>) {
        self.client_secret = secret;
    }

    /// Set the requested scope.
    pub fn set_scope(&mut self, scope: Option<String>) {
        self.scope = scope;
    }

    /// The authorization endpoint: explicit when configured, otherwise
    /// `{authority}/authorize`.
    ///
    /// # Errors
    /// Returns a configuration error when neither is available.
    pub fn authorization_url(&self) -> Result<Url> {
        if let Some(endpoint) = &self.authorization_endpoint {
            return Ok(endpoint.clone());
        }
        let authority = self
            .authority
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no authorization endpoint or authority configured"))?;
        authority
            .join("authorize")
            .map_err(|err| AuthError::configuration(format!("invalid authority URL: {err}")))
    }

    /// The cache key for this registration: `{authority_host}::{client_id}`.
    /// Falls back to the token endpoint's host, then to `"default"`, when no
    /// authority is configured.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let host = self
            .authority
            .as_ref()
            .or(self.token_endpoint.as_ref())
            .and_then(Url::host_str)
            .unwrap_or("default");
        format!("{host}{CACHE_KEY_SEPARATOR}{}", self.client_id)
    }

    /// Check the configuration for contract violations.
    ///
    /// # Errors
    /// Returns a configuration error for a missing client id.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::configuration("client id must not be empty"));
        }
        Ok(())
    }
}
