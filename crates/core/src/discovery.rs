//! OIDC discovery-document resolution and caching
//!
//! Resolves endpoint metadata from a well-known URL or from the `iss` claim
//! of an identity token, with a persisted-store fallback when the live
//! download fails. The provider instance holds the "current" document and
//! only ever replaces it with a strictly newer one, so racing downloads
//! settle on the freshest metadata regardless of write order.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use grantwell_domain::constants::WELL_KNOWN_SUFFIX;
use grantwell_domain::{AuthError, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::cancel::await_guarded;
use crate::ports::DiscoveryStore;

/// OIDC endpoint metadata for one authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Authority root the document was resolved for.
    pub authority: Url,
    /// Token endpoint issuing grants for this authority.
    pub token_endpoint: Option<Url>,
    /// Device-authorization endpoint, when the authority offers one.
    pub device_authorization_endpoint: Option<Url>,
    /// User-info endpoint, when the authority offers one.
    pub userinfo_endpoint: Option<Url>,
    /// Scopes the authority advertises.
    pub scopes_supported: Vec<String>,
    /// When this document was obtained; newer documents replace older ones.
    pub last_updated: DateTime<Utc>,
}

/// Wire format of `/.well-known/openid-configuration`.
#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    issuer: String,
    token_endpoint: Option<String>,
    device_authorization_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    #[serde(default)]
    scopes_supported: Vec<String>,
}

impl DiscoveryDocument {
    fn from_response(response: DiscoveryResponse) -> Result<Self> {
        let issuer: Url = response
            .issuer
            .parse()
            .map_err(|err| AuthError::transport(format!("invalid issuer in discovery document: {err}")))?;

        let parse_optional = |value: Option<String>| -> Option<Url> {
            value.and_then(|raw| raw.parse().ok())
        };

        Ok(Self {
            authority: authority_root(&issuer)?,
            token_endpoint: parse_optional(response.token_endpoint),
            device_authorization_endpoint: parse_optional(response.device_authorization_endpoint),
            userinfo_endpoint: parse_optional(response.userinfo_endpoint),
            scopes_supported: response.scopes_supported,
            last_updated: Utc::now(),
        })
    }
}

/// Derive the metadata endpoint for a URL.
///
/// Absolute http/https URLs only; a URL already ending in the well-known
/// suffix is the metadata endpoint itself, otherwise the suffix is appended
/// after normalizing the trailing slash.
///
/// # Errors
/// Returns a configuration error for non-http(s) schemes or unparsable
/// results.
pub fn metadata_url(url: &Url) -> Result<Url> {
    require_http(url)?;

    let trimmed = url.as_str().trim_end_matches('/');
    if trimmed.ends_with(WELL_KNOWN_SUFFIX) {
        return trimmed
            .parse()
            .map_err(|err| AuthError::configuration(format!("invalid discovery URL: {err}")));
    }

    format!("{trimmed}/{WELL_KNOWN_SUFFIX}")
        .parse()
        .map_err(|err| AuthError::configuration(format!("invalid discovery URL: {err}")))
}

/// Derive the authority root for a URL, stripping the well-known suffix when
/// present.
///
/// # Errors
/// Returns a configuration error for non-http(s) schemes or unparsable
/// results.
pub fn authority_root(url: &Url) -> Result<Url> {
    require_http(url)?;

    let trimmed = url.as_str().trim_end_matches('/');
    let root = match trimmed.strip_suffix(WELL_KNOWN_SUFFIX) {
        Some(prefix) => prefix.trim_end_matches('/'),
        None => trimmed,
    };

    root.parse().map_err(|err| AuthError::configuration(format!("invalid authority URL: {err}")))
}

fn require_http(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AuthError::configuration(format!(
            "unsupported discovery URL scheme: {other}"
        ))),
    }
}

/// Extract the `iss` claim from an identity token without validating it.
///
/// # Errors
/// Returns an authentication error when the token is not a three-part JWT or
/// carries no issuer claim.
pub fn issuer_claim(id_token: &str) -> Result<String> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::authentication("invalid ID token format"));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|err| AuthError::authentication(format!("failed to decode ID token payload: {err}")))?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
        .map_err(|err| AuthError::authentication(format!("failed to parse ID token payload: {err}")))?;

    payload
        .get("iss")
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| AuthError::authentication("iss claim missing from ID token"))
}

/// Resolves and caches discovery documents for the engine.
///
/// Holds the process's "current" document as instance state; replacement
/// follows a compare-and-prefer-newer rule, so two racing downloads settle
/// on whichever document is fresher.
pub struct DiscoveryProvider {
    http: reqwest::Client,
    store: Option<Arc<dyn DiscoveryStore>>,
    current: RwLock<Option<Arc<DiscoveryDocument>>>,
}

impl DiscoveryProvider {
    /// Create a provider, optionally backed by a persisted store for the
    /// download-failure fallback.
    #[must_use]
    pub fn new(store: Option<Arc<dyn DiscoveryStore>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http, store, current: RwLock::new(None) }
    }

    /// Replace the HTTP client (primarily for tests).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The current document, if one has been resolved.
    #[must_use]
    pub fn current(&self) -> Option<Arc<DiscoveryDocument>> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    /// Resolve a document: current fast path, then a live download driven by
    /// the id token's `iss` claim, then the persisted store.
    ///
    /// # Errors
    /// Returns a configuration error when neither path yields a document;
    /// `Canceled` when the attempt is canceled or times out.
    pub async fn resolve(
        &self,
        id_token: Option<&str>,
        cancellation: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Arc<DiscoveryDocument>> {
        if let Some(current) = self.current() {
            return Ok(current);
        }

        let downloaded = match id_token {
            Some(token) => self.download_for_id_token(token, cancellation, timeout).await?,
            None => None,
        };

        let document = match downloaded {
            Some(document) => Some(document),
            None => self.load_from_store().await,
        };

        match document {
            Some(document) => Ok(self.promote_and_save(document)),
            None => Err(AuthError::configuration("discovery document unavailable")),
        }
    }

    /// Resolve a document for a statically known authority: current fast
    /// path, then a live download of the authority's metadata endpoint, then
    /// the persisted store.
    ///
    /// # Errors
    /// Returns a configuration error when neither path yields a document;
    /// `Canceled` when the attempt is canceled or times out.
    pub async fn resolve_from_authority(
        &self,
        authority: &Url,
        cancellation: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Arc<DiscoveryDocument>> {
        if let Some(current) = self.current() {
            return Ok(current);
        }

        let metadata = metadata_url(authority)?;
        let downloaded = match self.download(&metadata, cancellation, timeout).await {
            Ok(document) => Some(document),
            Err(err) if err.is_canceled() => return Err(err),
            Err(err) => {
                warn!(url = %metadata, error = %err, "discovery download failed, trying persisted store");
                None
            }
        };

        let document = match downloaded {
            Some(document) => Some(document),
            None => self.load_from_store().await,
        };

        match document {
            Some(document) => Ok(self.promote_and_save(document)),
            None => Err(AuthError::configuration("discovery document unavailable")),
        }
    }

    async fn download_for_id_token(
        &self,
        id_token: &str,
        cancellation: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Option<DiscoveryDocument>> {
        let issuer = match issuer_claim(id_token) {
            Ok(issuer) => issuer,
            Err(err) => {
                debug!(error = %err, "could not extract issuer from ID token");
                return Ok(None);
            }
        };

        let metadata = match issuer.parse::<Url>().map_err(|err| {
            AuthError::configuration(format!("invalid issuer URL: {err}"))
        }).and_then(|url| metadata_url(&url))
        {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(issuer = %issuer, error = %err, "issuer claim is not a usable authority");
                return Ok(None);
            }
        };

        match self.download(&metadata, cancellation, timeout).await {
            Ok(document) => Ok(Some(document)),
            Err(err) if err.is_canceled() => Err(err),
            Err(err) => {
                warn!(url = %metadata, error = %err, "discovery download failed, trying persisted store");
                Ok(None)
            }
        }
    }

    async fn download(
        &self,
        metadata: &Url,
        cancellation: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<DiscoveryDocument> {
        debug!(url = %metadata, "downloading discovery document");

        let request = self.http.get(metadata.clone()).send();
        let response = await_guarded(cancellation, timeout, "discovery download", request)
            .await?
            .map_err(|err| AuthError::transport(format!("discovery request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::server(status.as_u16(), "discovery endpoint returned an error"));
        }

        let parsed: DiscoveryResponse = response
            .json()
            .await
            .map_err(|err| AuthError::transport(format!("invalid discovery document: {err}")))?;

        DiscoveryDocument::from_response(parsed)
    }

    async fn load_from_store(&self) -> Option<DiscoveryDocument> {
        let store = self.store.as_ref()?;
        match store.load().await {
            Ok(document) => document,
            Err(err) => {
                warn!(error = %err, "persisted discovery store unavailable");
                None
            }
        }
    }

    /// Promote `document` to current unless an even newer one is already in
    /// place, then fire the asynchronous save. Returns whichever document is
    /// current afterwards.
    fn promote_and_save(&self, document: DiscoveryDocument) -> Arc<DiscoveryDocument> {
        let promoted = self.promote(document);

        if let Some(store) = self.store.clone() {
            let to_save = Arc::clone(&promoted);
            tokio::spawn(async move {
                if let Err(err) = store.save(&to_save).await {
                    warn!(error = %err, "failed to persist discovery document");
                }
            });
        }

        promoted
    }

    fn promote(&self, document: DiscoveryDocument) -> Arc<DiscoveryDocument> {
        let candidate = Arc::new(document);
        match self.current.write() {
            Ok(mut guard) => {
                let replace = match guard.as_ref() {
                    Some(current) => candidate.last_updated > current.last_updated,
                    None => true,
                };
                if replace {
                    *guard = Some(Arc::clone(&candidate));
                }
                guard.clone().unwrap_or(candidate)
            }
            Err(_) => candidate,
        }
    }
}

impl std::fmt::Debug for DiscoveryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryProvider")
            .field("has_store", &self.store.is_some())
            .field("has_current", &self.current().is_some())
            .finish()
    }
}
