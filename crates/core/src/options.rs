//! Request-scoped grant policy
//!
//! `GrantOptions` captures what a single grant request is allowed to do
//! (cache, refresh, force re-authentication), its cancellation signal and
//! timeout, and typed per-request overrides. `AuthContext` binds the options
//! to a grant type and the resolved configuration for the lifetime of one
//! request.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use grantwell_domain::constants::CACHE_KEY_SEPARATOR;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::AuthConfig;

/// The grant the engine should execute when a full exchange is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// Interactive browser-based authorization with a loopback redirect.
    AuthorizationCode,
    /// Machine-to-machine exchange using client id and secret.
    ClientCredentials,
}

/// Bitset of per-request grant behaviors.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct GrantFlags(u8);

impl GrantFlags {
    /// No behavior requested; every path falls through to a full grant.
    pub const NONE: Self = Self(0);
    /// Prefer a cached Grant when one exists.
    pub const CACHED: Self = Self(1 << 0);
    /// Discard any cached Grant and re-authenticate.
    pub const FORCED: Self = Self(1 << 1);
    /// Allow a refresh-token exchange for an expired cached Grant.
    pub const REFRESH: Self = Self(1 << 2);
    /// The silent ladder: cache first, then refresh, then full grant.
    pub const SILENT: Self = Self(Self::CACHED.0 | Self::REFRESH.0);

    /// Whether every flag in `other` is set on `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for GrantFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for GrantFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::CACHED) {
            names.push("CACHED");
        }
        if self.contains(Self::FORCED) {
            names.push("FORCED");
        }
        if self.contains(Self::REFRESH) {
            names.push("REFRESH");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "GrantFlags({})", names.join("|"))
    }
}

/// Client id/secret pair supplied per request for machine-to-machine grants.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
}

/// Per-request authority override.
#[derive(Debug, Clone)]
pub struct AuthorityInfo {
    /// Authority root to resolve endpoints against.
    pub authority: Url,
    /// Explicit token endpoint, skipping discovery entirely.
    pub token_endpoint: Option<Url>,
}

/// Request-scoped policy for a single grant acquisition.
///
/// Mutable only while being built; once handed to an [`AuthContext`] it is
/// treated as read-only request context.
#[derive(Debug, Clone)]
pub struct GrantOptions {
    /// Requested grant behaviors.
    pub flags: GrantFlags,
    /// Scope override; falls back to the configured scope.
    pub scope: Option<String>,
    /// Cancellation signal observed at every suspension point.
    pub cancellation: CancellationToken,
    /// Upper bound on the whole attempt; falls back to the configured
    /// timeout.
    pub timeout: Option<Duration>,
    /// Target service identifier, replacing the authority host in the cache
    /// key.
    pub service: Option<String>,
    /// Acting user identifier, appended to the cache key when present.
    pub actor_id: Option<String>,
    /// Per-request client credentials for machine-to-machine grants.
    pub client_credentials: Option<ClientCredentials>,
    /// Per-request authority override.
    pub authority: Option<AuthorityInfo>,
    /// Open-ended caller extension data.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for GrantOptions {
    fn default() -> Self {
        Self {
            flags: GrantFlags::CACHED,
            scope: None,
            cancellation: CancellationToken::new(),
            timeout: None,
            service: None,
            actor_id: None,
            client_credentials: None,
            authority: None,
            extra: BTreeMap::new(),
        }
    }
}

impl GrantOptions {
    /// Options forcing a full re-authentication, ignoring cache and refresh.
    #[must_use]
    pub fn forced(
        service: Option<String>,
        cancellation: Option<CancellationToken>,
        client_credentials: Option<ClientCredentials>,
    ) -> Self {
        Self {
            flags: GrantFlags::FORCED,
            service,
            cancellation: cancellation.unwrap_or_default(),
            client_credentials,
            ..Self::default()
        }
    }

    /// Options for the silent ladder: cache, then refresh, then full grant.
    #[must_use]
    pub fn silent(
        service: Option<String>,
        cancellation: Option<CancellationToken>,
        actor_id: Option<String>,
        client_credentials: Option<ClientCredentials>,
    ) -> Self {
        Self {
            flags: GrantFlags::SILENT,
            service,
            cancellation: cancellation.unwrap_or_default(),
            actor_id,
            client_credentials,
            ..Self::default()
        }
    }

    /// Whether cached Grants may be used and new ones written.
    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.flags.contains(GrantFlags::CACHED)
    }

    /// Whether a refresh-token exchange may be attempted.
    #[must_use]
    pub fn is_refresh_allowed(&self) -> bool {
        self.flags.contains(GrantFlags::REFRESH)
    }

    /// Whether the caller demanded a full re-authentication.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.flags.contains(GrantFlags::FORCED)
    }
}

/// Everything one grant request needs: grant type, resolved configuration
/// and request options. Created once per request and discarded afterwards;
/// construction never performs I/O.
#[derive(Debug, Clone)]
pub struct AuthContext {
    grant_type: GrantType,
    config: AuthConfig,
    options: GrantOptions,
}

impl AuthContext {
    /// Bind a grant type, configuration and options together. A `None` grant
    /// type inherits the configuration's default.
    #[must_use]
    pub fn new(grant_type: Option<GrantType>, config: AuthConfig, options: GrantOptions) -> Self {
        let grant_type = grant_type.unwrap_or(config.default_grant_type);
        Self { grant_type, config, options }
    }

    /// The grant executed when a full exchange is required.
    #[must_use]
    pub fn grant_type(&self) -> GrantType {
        self.grant_type
    }

    /// The resolved configuration for this request.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The request options.
    #[must_use]
    pub fn options(&self) -> &GrantOptions {
        &self.options
    }

    /// The cancellation signal for this request.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.options.cancellation.clone()
    }

    /// The attempt timeout: options first, configuration second.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout.or(self.config.timeout)
    }

    /// Whether caching is in effect for this request (both the configuration
    /// switch and the request flag must allow it).
    #[must_use]
    pub fn is_caching(&self) -> bool {
        self.config.caching_enabled && self.options.is_caching()
    }

    /// The cache key for this request.
    ///
    /// Defaults to `{authority_host}::{client_id}`; the options' `service`
    /// replaces the host and `actor_id` is appended as a third segment.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = match &self.options.service {
            Some(service) => {
                format!("{service}{CACHE_KEY_SEPARATOR}{}", self.config.client_id)
            }
            None => self.config.cache_key(),
        };
        if let Some(actor) = &self.options.actor_id {
            key.push_str(CACHE_KEY_SEPARATOR);
            key.push_str(actor);
        }
        key
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for core::options.
    use super::*;

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::new("client_1");
        config.set_authority("https://idp.example".parse().unwrap());
        config
    }

    /// Validates `GrantFlags` behavior for the canonical combination
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `SILENT` contains `CACHED` and `REFRESH` but not `FORCED`.
    /// - Confirms bitor composes flags.
    #[test]
    fn test_flag_combinations() {
        assert!(GrantFlags::SILENT.contains(GrantFlags::CACHED));
        assert!(GrantFlags::SILENT.contains(GrantFlags::REFRESH));
        assert!(!GrantFlags::SILENT.contains(GrantFlags::FORCED));

        let combined = GrantFlags::CACHED | GrantFlags::FORCED;
        assert!(combined.contains(GrantFlags::FORCED));
    }

    /// Validates `GrantOptions` named constructors for the canonical flags
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `default()` prefers the cache only.
    /// - Confirms `forced()` sets only `FORCED`.
    /// - Confirms `silent()` allows cache and refresh.
    #[test]
    fn test_named_constructors() {
        let default = GrantOptions::default();
        assert!(default.is_caching());
        assert!(!default.is_refresh_allowed());
        assert!(!default.is_forced());

        let forced = GrantOptions::forced(None, None, None);
        assert!(forced.is_forced());
        assert!(!forced.is_caching());

        let silent = GrantOptions::silent(None, None, None, None);
        assert!(silent.is_caching());
        assert!(silent.is_refresh_allowed());
    }

    /// Validates `AuthContext::timeout` behavior for the options-first
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the options' timeout wins over the configured one.
    /// - Confirms the configured timeout applies when the options carry
    ///   none.
    #[test]
    fn test_timeout_precedence() {
        let mut config = test_config();
        config.timeout = Some(Duration::from_secs(60));

        let mut options = GrantOptions::default();
        options.timeout = Some(Duration::from_secs(5));
        let ctx = AuthContext::new(None, config.clone(), options);
        assert_eq!(ctx.timeout(), Some(Duration::from_secs(5)));

        let ctx = AuthContext::new(None, config, GrantOptions::default());
        assert_eq!(ctx.timeout(), Some(Duration::from_secs(60)));
    }

    /// Validates `AuthContext::cache_key` behavior for the derivation
    /// scenarios.
    ///
    /// Assertions:
    /// - Confirms the default key is `{authority_host}::{client_id}`.
    /// - Confirms `service` replaces the host segment.
    /// - Confirms `actor_id` appends a third segment.
    #[test]
    fn test_cache_key_derivation() {
        let ctx = AuthContext::new(None, test_config(), GrantOptions::default());
        assert_eq!(ctx.cache_key(), "idp.example::client_1");

        let mut options = GrantOptions::default();
        options.service = Some("billing-api".into());
        let ctx = AuthContext::new(None, test_config(), options);
        assert_eq!(ctx.cache_key(), "billing-api::client_1");

        let options = GrantOptions::silent(None, None, Some("user-7".into()), None);
        let ctx = AuthContext::new(None, test_config(), options);
        assert_eq!(ctx.cache_key(), "idp.example::client_1::user-7");
    }

    /// Validates `AuthContext::is_caching` behavior for the combined-switch
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms disabling the configuration switch overrides the request
    ///   flag.
    #[test]
    fn test_caching_requires_both_switches() {
        let mut config = test_config();
        config.caching_enabled = false;

        let ctx = AuthContext::new(None, config, GrantOptions::default());
        assert!(!ctx.is_caching());
    }

    /// Validates `AuthContext::new` behavior for the grant-type inheritance
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `None` inherits the configuration default.
    /// - Confirms an explicit grant type wins.
    #[test]
    fn test_grant_type_inheritance() {
        let mut config = test_config();
        config.default_grant_type = GrantType::ClientCredentials;

        let ctx = AuthContext::new(None, config.clone(), GrantOptions::default());
        assert_eq!(ctx.grant_type(), GrantType::ClientCredentials);

        let ctx =
            AuthContext::new(Some(GrantType::AuthorizationCode), config, GrantOptions::default());
        assert_eq!(ctx.grant_type(), GrantType::AuthorizationCode);
    }
}
