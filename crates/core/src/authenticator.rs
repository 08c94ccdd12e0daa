//! Authenticator: the grant state machine
//!
//! Orchestrates cache lookups, discovery resolution, and the interactive,
//! refresh and client-credentials exchanges:
//! - Cached reads honor the caller's request unconditionally (no expiry
//!   re-check on the explicit cached entry point).
//! - The silent ladder prefers cache, then refresh, before degrading to a
//!   full re-authentication; a refresh failure is never fatal to the caller.
//! - Expected failures surface as `AuthError` values; nothing is thrown
//!   across the component boundary in steady-state operation.

use std::sync::{Arc, RwLock};

use chrono::{Duration as ChronoDuration, Utc};
use grantwell_domain::constants::TOKEN_CLOCK_SKEW_SECS;
use grantwell_domain::{AuthError, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::await_guarded;
use crate::config::AuthConfig;
use crate::discovery::{DiscoveryDocument, DiscoveryProvider};
use crate::grant::{Grant, TokenInfo, TokenRole};
use crate::options::{AuthContext, GrantOptions, GrantType};
use crate::ports::{AuthorizedObserver, CallbackListener, TokenCache, TokenValidator, UrlOpener};
use crate::state::{validate_state, AuthState};

/// Token endpoint response body (RFC 6749).
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// OAuth error response body (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl OAuthErrorResponse {
    fn into_message(self) -> String {
        match self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error,
        }
    }
}

fn missing_access_token() -> AuthError {
    AuthError::transport("could not acquire an access token")
}

/// The grant state machine.
///
/// Collaborators are injected through the [`crate::ports`] traits; the only
/// required one is the [`DiscoveryProvider`]. Interactive grants additionally
/// need a callback listener and a URL opener.
pub struct Authenticator {
    config: RwLock<AuthConfig>,
    http: reqwest::Client,
    discovery: Arc<DiscoveryProvider>,
    cache: Option<Arc<dyn TokenCache>>,
    listener: Option<Arc<dyn CallbackListener>>,
    url_opener: Option<Arc<dyn UrlOpener>>,
    observer: Option<Arc<dyn AuthorizedObserver>>,
    id_token_validator: Option<Arc<dyn TokenValidator>>,
}

impl Authenticator {
    /// Create an authenticator for the given configuration.
    #[must_use]
    pub fn new(config: AuthConfig, discovery: Arc<DiscoveryProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config: RwLock::new(config),
            http,
            discovery,
            cache: None,
            listener: None,
            url_opener: None,
            observer: None,
            id_token_validator: None,
        }
    }

    /// Replace the HTTP client (primarily for tests).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Attach the secure token cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the loopback callback listener for interactive grants.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn CallbackListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Attach the handler that points the user's browser at the
    /// authorization URL.
    #[must_use]
    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.url_opener = Some(opener);
        self
    }

    /// Register an observer for successful grants.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn AuthorizedObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Attach the deferred identity-token validator.
    #[must_use]
    pub fn with_id_token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.id_token_validator = Some(validator);
        self
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> AuthConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Build the request context for one grant acquisition.
    #[must_use]
    pub fn context(&self, grant_type: Option<GrantType>, options: GrantOptions) -> AuthContext {
        AuthContext::new(grant_type, self.config(), options)
    }

    /// Toggle caching. Disabling it eagerly deletes the cached entry for the
    /// current configuration's key, not merely future writes.
    ///
    /// # Errors
    /// Returns error if the eager delete fails.
    pub async fn set_caching(&self, enabled: bool) -> Result<()> {
        let key = {
            let mut guard = match self.config.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.caching_enabled = enabled;
            guard.cache_key()
        };

        if enabled {
            return Ok(());
        }

        info!(key = %key, "caching disabled, deleting cached grant");
        match &self.cache {
            Some(cache) => cache.delete(&key).await,
            None => Ok(()),
        }
    }

    /// Acquire a Grant, optionally serving it straight from the cache.
    ///
    /// With `allow_cached`, a cached Grant whose access token is present is
    /// returned as-is: the caller asked for unconditional cached use, so no
    /// expiry re-check happens here. Otherwise the full grant for the
    /// context's grant type is executed, cached, and announced to the
    /// observer.
    ///
    /// # Errors
    /// Returns the typed failure of the exchange; `Canceled` when the
    /// attempt was canceled or timed out.
    pub async fn get_access_token(&self, ctx: &AuthContext, allow_cached: bool) -> Result<Grant> {
        if allow_cached && ctx.is_caching() {
            if let Some(cache) = &self.cache {
                let key = ctx.cache_key();
                match cache.try_read(&key).await {
                    Ok(Some(grant)) if grant.access_token().is_some() => {
                        debug!(key = %key, "returning cached grant");
                        return Ok(grant);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(key = %key, error = %err, "token cache read failed"),
                }
            }
        }

        let grant = self.execute_grant(ctx).await?;
        self.store_grant(ctx, &grant).await;
        self.notify_authorized(&grant);
        Ok(grant)
    }

    /// Acquire a Grant silently: cache first, then a refresh exchange, then
    /// a full grant.
    ///
    /// The ladder: with caching disabled the full grant runs directly; a
    /// cache miss runs the full grant; a live cached access token is
    /// returned; an expired entry is deleted, then refreshed when a refresh
    /// token is present and allowed; a failed refresh degrades to the full
    /// grant rather than failing the caller.
    ///
    /// # Errors
    /// Returns the typed failure of the final attempt; `Canceled` as soon as
    /// the attempt is canceled or times out.
    pub async fn get_access_token_silently(&self, ctx: &AuthContext) -> Result<Grant> {
        let cache = match (&self.cache, ctx.is_caching()) {
            (Some(cache), true) => Arc::clone(cache),
            _ => return self.get_access_token(ctx, false).await,
        };

        let key = ctx.cache_key();
        let cached = match cache.try_read(&key).await {
            Ok(Some(grant)) => grant,
            Ok(None) => return self.get_access_token(ctx, false).await,
            Err(err) => {
                warn!(key = %key, error = %err, "token cache read failed");
                return self.get_access_token(ctx, false).await;
            }
        };

        if cached.access_token().is_some() && !cached.is_expired() {
            debug!(key = %key, "cached grant still valid");
            return Ok(cached);
        }

        if let Err(err) = cache.delete(&key).await {
            warn!(key = %key, error = %err, "failed to delete stale cache entry");
        }

        let refresh_token = match cached.refresh_token() {
            Some(token) if ctx.options().is_refresh_allowed() => token.value().to_string(),
            _ => return self.get_access_token(ctx, false).await,
        };

        let id_token_hint = cached.id_token().map(|token| token.value().to_string());

        match self.refresh_grant(ctx, &refresh_token, id_token_hint.as_deref()).await {
            Ok(grant) => {
                self.store_grant(ctx, &grant).await;
                self.notify_authorized(&grant);
                Ok(grant)
            }
            Err(err) if err.is_canceled() => Err(err),
            Err(err) => {
                warn!(error = %err, "refresh exchange failed, falling back to full grant");
                self.get_access_token(ctx, false).await
            }
        }
    }

    /// Fetch the user-info claims for a Grant from the discovery document's
    /// userinfo endpoint.
    ///
    /// # Errors
    /// Returns error if the Grant has no access token, no userinfo endpoint
    /// is advertised, or the request fails.
    pub async fn fetch_user_info(
        &self,
        ctx: &AuthContext,
        grant: &Grant,
    ) -> Result<serde_json::Value> {
        let access = grant
            .access_token()
            .ok_or_else(|| AuthError::authentication("grant carries no access token"))?;

        let id_token_hint = grant.id_token().map(|token| token.value().to_string());
        let document = self.resolve_document(ctx, id_token_hint.as_deref()).await?;
        let endpoint = document.userinfo_endpoint.clone().ok_or_else(|| {
            AuthError::configuration("discovery document does not advertise a user-info endpoint")
        })?;

        let cancellation = ctx.cancellation();
        let work = async {
            let response = self
                .http
                .get(endpoint.clone())
                .bearer_auth(access.value())
                .send()
                .await
                .map_err(|err| AuthError::transport(format!("user-info request failed: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AuthError::server(status.as_u16(), "user-info endpoint returned an error"));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|err| AuthError::transport(format!("invalid user-info response: {err}")))
        };

        await_guarded(&cancellation, ctx.timeout(), "user-info fetch", work).await?
    }

    async fn execute_grant(&self, ctx: &AuthContext) -> Result<Grant> {
        ctx.config().validate()?;

        match ctx.grant_type() {
            GrantType::AuthorizationCode => self.authorization_code_grant(ctx).await,
            GrantType::ClientCredentials => self.client_credentials_grant(ctx).await,
        }
    }

    async fn authorization_code_grant(&self, ctx: &AuthContext) -> Result<Grant> {
        let config = ctx.config();

        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no callback listener configured"))?;
        let opener = self
            .url_opener
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no URL opener configured"))?;
        let redirect_uri = config
            .redirect_uri
            .clone()
            .ok_or_else(|| AuthError::configuration("no redirect URI configured"))?;

        let state = AuthState::new(config.use_state, config.use_pkce, Some(&config.client_id));
        let authorize_url = self.build_authorization_url(ctx, &state, &redirect_uri)?;

        // The listener must accept connections before the browser is pointed
        // at the authorization endpoint.
        let pending = listener.bind(&redirect_uri).await?;

        debug!(client_id = %config.client_id, "opening authorization URL");
        opener.open(&authorize_url)?;

        let callback = pending.wait(ctx.cancellation(), ctx.timeout()).await?;

        if let Some(expected) = state.state() {
            if !validate_state(expected, &callback.state) {
                return Err(AuthError::authentication("Returned state was invalid"));
            }
        }

        let token_endpoint = self.resolve_token_endpoint(ctx, None).await?;

        let mut params = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), callback.code),
            ("client_id".to_string(), config.client_id.clone()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
        ];
        if let Some(verifier) = state.code_verifier() {
            params.push(("code_verifier".to_string(), verifier.to_string()));
        }
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret".to_string(), secret.clone()));
        }

        let response = self.post_token_request(ctx, &token_endpoint, &params).await?;
        self.grant_from_response(response)
    }

    async fn client_credentials_grant(&self, ctx: &AuthContext) -> Result<Grant> {
        let config = ctx.config();

        let (client_id, client_secret) = match &ctx.options().client_credentials {
            Some(credentials) => {
                (credentials.client_id.clone(), credentials.client_secret.clone())
            }
            None => {
                let secret = config.client_secret.clone().ok_or_else(|| {
                    AuthError::configuration("client-credentials grant requires a client secret")
                })?;
                (config.client_id.clone(), secret)
            }
        };

        let token_endpoint = self.resolve_token_endpoint(ctx, None).await?;

        let mut params = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), client_id),
            ("client_secret".to_string(), client_secret),
        ];
        if let Some(scope) = ctx.options().scope.as_ref().or(config.scope.as_ref()) {
            params.push(("scope".to_string(), scope.clone()));
        }

        let response = self.post_token_request(ctx, &token_endpoint, &params).await?;

        let access = response.access_token.ok_or_else(missing_access_token)?;
        Ok(Grant::for_client_credentials(access, expiry_from(response.expires_in)))
    }

    async fn refresh_grant(
        &self,
        ctx: &AuthContext,
        refresh_token: &str,
        id_token_hint: Option<&str>,
    ) -> Result<Grant> {
        debug!("attempting refresh-token exchange");

        let token_endpoint = self.resolve_token_endpoint(ctx, id_token_hint).await?;

        let mut params = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        if ctx.config().refresh_with_client_id {
            params.push(("client_id".to_string(), ctx.config().client_id.clone()));
        }

        let response = self.post_token_request(ctx, &token_endpoint, &params).await?;
        self.grant_from_response(response)
    }

    async fn resolve_document(
        &self,
        ctx: &AuthContext,
        id_token_hint: Option<&str>,
    ) -> Result<Arc<DiscoveryDocument>> {
        let cancellation = ctx.cancellation();

        if let Some(info) = &ctx.options().authority {
            return self
                .discovery
                .resolve_from_authority(&info.authority, &cancellation, ctx.timeout())
                .await;
        }

        match &ctx.config().authority {
            Some(authority) => {
                self.discovery
                    .resolve_from_authority(authority, &cancellation, ctx.timeout())
                    .await
            }
            None => self.discovery.resolve(id_token_hint, &cancellation, ctx.timeout()).await,
        }
    }

    async fn resolve_token_endpoint(
        &self,
        ctx: &AuthContext,
        id_token_hint: Option<&str>,
    ) -> Result<Url> {
        if let Some(info) = &ctx.options().authority {
            if let Some(endpoint) = &info.token_endpoint {
                return Ok(endpoint.clone());
            }
        } else if let Some(endpoint) = &ctx.config().token_endpoint {
            return Ok(endpoint.clone());
        }

        let document = self.resolve_document(ctx, id_token_hint).await?;
        document.token_endpoint.clone().ok_or_else(|| {
            AuthError::configuration("discovery document does not advertise a token endpoint")
        })
    }

    fn build_authorization_url(
        &self,
        ctx: &AuthContext,
        state: &AuthState,
        redirect_uri: &Url,
    ) -> Result<Url> {
        let config = ctx.config();
        let base = config.authorization_url()?;

        let mut params = vec![
            ("response_type".to_string(), "code".to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("client_id".to_string(), config.client_id.clone()),
        ];
        if let Some(scope) = ctx.options().scope.as_ref().or(config.scope.as_ref()) {
            params.push(("scope".to_string(), scope.clone()));
        }
        if let Some(value) = state.state() {
            params.push(("state".to_string(), value.to_string()));
        }
        if let Some(challenge) = state.code_challenge() {
            params.push(("code_challenge".to_string(), challenge.to_string()));
            params.push(("code_challenge_method".to_string(), state.challenge_method().to_string()));
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{base}?{query}")
            .parse()
            .map_err(|err| AuthError::configuration(format!("invalid authorization URL: {err}")))
    }

    async fn post_token_request(
        &self,
        ctx: &AuthContext,
        endpoint: &Url,
        params: &[(String, String)],
    ) -> Result<TokenEndpointResponse> {
        debug!(endpoint = %endpoint, "posting token request");

        let cancellation = ctx.cancellation();
        let work = async {
            let response = self
                .http
                .post(endpoint.clone())
                .form(params)
                .send()
                .await
                .map_err(|err| AuthError::transport(format!("token request failed: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                let message = match response.json::<OAuthErrorResponse>().await {
                    Ok(body) => body.into_message(),
                    Err(_) => status
                        .canonical_reason()
                        .unwrap_or("token endpoint rejected the request")
                        .to_string(),
                };
                return Err(AuthError::server(status.as_u16(), message));
            }

            response
                .json::<TokenEndpointResponse>()
                .await
                .map_err(|_| missing_access_token())
        };

        await_guarded(&cancellation, ctx.timeout(), "token exchange", work).await?
    }

    fn grant_from_response(&self, response: TokenEndpointResponse) -> Result<Grant> {
        let access = response.access_token.ok_or_else(missing_access_token)?;

        let id_token = response.id_token.map(|value| {
            let token = TokenInfo::new(value, TokenRole::Id, None);
            match &self.id_token_validator {
                Some(validator) => token.with_validator(Arc::clone(validator)),
                None => token,
            }
        });

        Ok(Grant::for_auth_code(
            access,
            expiry_from(response.expires_in),
            response.refresh_token,
            id_token,
        ))
    }

    async fn store_grant(&self, ctx: &AuthContext, grant: &Grant) {
        if !ctx.is_caching() {
            return;
        }
        let Some(cache) = &self.cache else { return };

        let key = ctx.cache_key();
        let to_store = match grant.expires() {
            Some(expires) => grant.clone_with_margin(expires - Utc::now()),
            None => grant.clone(),
        };

        // No per-key serialization here: concurrent writers race and the
        // last write wins.
        match cache.create_or_update(&to_store, &key).await {
            Ok(()) => debug!(key = %key, "grant cached"),
            Err(err) => warn!(key = %key, error = %err, "failed to cache grant"),
        }
    }

    fn notify_authorized(&self, grant: &Grant) {
        info!("grant acquired");
        if let Some(observer) = &self.observer {
            observer.on_authorized(grant);
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config())
            .field("has_cache", &self.cache.is_some())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// Convert `expires_in` seconds into an absolute expiry, minus the
/// clock-skew buffer.
fn expiry_from(expires_in: Option<i64>) -> Option<chrono::DateTime<Utc>> {
    expires_in.map(|seconds| Utc::now() + ChronoDuration::seconds(seconds - TOKEN_CLOCK_SKEW_SECS))
}

#[cfg(test)]
mod tests {
    //! Unit tests for core::authenticator.
    use super::*;

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::new("test_client_id");
        config.set_authority("https://idp.example".parse().unwrap());
        config.set_redirect_uri("http://127.0.0.1:8888/callback".parse().unwrap());
        config.set_scope(Some("openid profile".to_string()));
        config
    }

    fn test_authenticator() -> Authenticator {
        Authenticator::new(test_config(), Arc::new(DiscoveryProvider::new(None)))
    }

    /// Validates `build_authorization_url` behavior for the full-parameters
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the URL targets `{authority}/authorize`.
    /// - Ensures code/redirect/client/scope/state/PKCE parameters are all
    ///   present.
    #[test]
    fn test_build_authorization_url() {
        let authenticator = test_authenticator();
        let ctx = authenticator.context(None, GrantOptions::default());
        let config = ctx.config().clone();
        let state = AuthState::new(true, true, Some(&config.client_id));
        let redirect = config.redirect_uri.clone().unwrap();

        let url = authenticator.build_authorization_url(&ctx, &state, &redirect).unwrap();
        let rendered = url.as_str();

        assert!(rendered.starts_with("https://idp.example/authorize?"));
        assert!(rendered.contains("response_type=code"));
        assert!(rendered.contains("client_id=test_client_id"));
        assert!(rendered.contains("scope=openid%20profile"));
        assert!(rendered.contains(&format!("state={}", state.state().unwrap())));
        assert!(rendered.contains(&format!("code_challenge={}", state.code_challenge().unwrap())));
        assert!(rendered.contains("code_challenge_method=S256"));
    }

    /// Validates `build_authorization_url` behavior for the state-disabled
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures neither state nor PKCE parameters appear when disabled.
    #[test]
    fn test_build_authorization_url_without_state() {
        let mut config = test_config();
        config.use_state = false;
        let authenticator =
            Authenticator::new(config, Arc::new(DiscoveryProvider::new(None)));
        let ctx = authenticator.context(None, GrantOptions::default());
        let state = AuthState::new(false, false, None);
        let redirect = ctx.config().redirect_uri.clone().unwrap();

        let url = authenticator.build_authorization_url(&ctx, &state, &redirect).unwrap();

        assert!(!url.as_str().contains("state="));
        assert!(!url.as_str().contains("code_challenge"));
    }

    /// Validates `grant_from_response` behavior for the parsing scenarios.
    ///
    /// Assertions:
    /// - Ensures a missing access token is the generic transport failure.
    /// - Confirms `expires_in` lands `TOKEN_CLOCK_SKEW_SECS` short of the
    ///   raw lifetime.
    #[test]
    fn test_grant_from_response() {
        let authenticator = test_authenticator();

        let missing = TokenEndpointResponse {
            access_token: None,
            expires_in: Some(3600),
            refresh_token: None,
            id_token: None,
        };
        assert!(matches!(
            authenticator.grant_from_response(missing),
            Err(AuthError::Transport { .. })
        ));

        let response = TokenEndpointResponse {
            access_token: Some("access".into()),
            expires_in: Some(3600),
            refresh_token: Some("refresh".into()),
            id_token: Some("id".into()),
        };
        let grant = authenticator.grant_from_response(response).unwrap();

        let expected = Utc::now() + ChronoDuration::seconds(3600 - TOKEN_CLOCK_SKEW_SECS);
        let actual = grant.expires().unwrap();
        assert!((actual - expected).num_seconds().abs() <= 1);
        assert!(grant.refresh_token().is_some());
        assert!(grant.id_token().is_some());
    }

    /// Validates `Authenticator::new` behavior for the interactive
    /// prerequisites scenario.
    ///
    /// Assertions:
    /// - Ensures an interactive grant without a listener fails with a
    ///   configuration error before any network activity.
    #[tokio::test]
    async fn test_interactive_requires_listener() {
        let authenticator = test_authenticator();
        let ctx = authenticator
            .context(Some(GrantType::AuthorizationCode), GrantOptions::forced(None, None, None));

        let result = authenticator.get_access_token(&ctx, false).await;
        assert!(matches!(result, Err(AuthError::Configuration { .. })));
    }
}
