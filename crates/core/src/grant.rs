//! Token and grant data model
//!
//! Defines the immutable token bundle produced by a successful authorization
//! exchange: individual tokens with roles, expiry and deferred validation,
//! and the `Grant` that groups them with caller extension data.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use grantwell_domain::constants::CACHE_SAFETY_MARGIN_SECS;
use tokio::sync::OnceCell;

use crate::ports::TokenValidator;

/// The role a token plays within a Grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TokenRole {
    /// Short-lived credential presented to resource servers.
    Access,
    /// Long-lived credential used to obtain new access tokens.
    Refresh,
    /// OpenID Connect identity token carrying user claims.
    Id,
}

/// A single token with its role, optional expiry, and optional deferred
/// validation capability. Immutable after construction.
#[derive(Clone)]
pub struct TokenInfo {
    value: String,
    role: TokenRole,
    expires_at: Option<DateTime<Utc>>,
    validator: Option<Arc<dyn TokenValidator>>,
    validation: Arc<OnceCell<bool>>,
}

impl TokenInfo {
    /// Create a token with the given role and optional absolute expiry.
    #[must_use]
    pub fn new(value: impl Into<String>, role: TokenRole, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            role,
            expires_at,
            validator: None,
            validation: Arc::new(OnceCell::new()),
        }
    }

    /// Attach a deferred validation capability.
    ///
    /// The validator is invoked at most once, on the first `is_valid` call
    /// that reaches it; the outcome is memoized for the token's lifetime.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// The opaque token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The role this token plays.
    #[must_use]
    pub fn role(&self) -> TokenRole {
        self.role
    }

    /// Absolute UTC expiry, if one is known.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is currently valid.
    ///
    /// Returns `false` once past the expiry. Otherwise delegates once to the
    /// attached validator and memoizes the result; concurrent callers
    /// coalesce onto a single delegate invocation. Without a validator the
    /// token is considered valid.
    pub async fn is_valid(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            if Utc::now() >= expires_at {
                return false;
            }
        }

        match &self.validator {
            Some(validator) => {
                let value = self.value.clone();
                let validator = Arc::clone(validator);
                *self
                    .validation
                    .get_or_init(|| async move { validator.validate(&value).await })
                    .await
            }
            None => true,
        }
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("value", &"<redacted>")
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// The result of a successful authorization exchange: an ordered set of
/// tokens, at most one per role, plus caller extension data.
#[derive(Debug, Clone, Default)]
pub struct Grant {
    tokens: Vec<TokenInfo>,
    tags: BTreeMap<String, serde_json::Value>,
}

impl Grant {
    /// Build a Grant from a list of tokens, keeping the first token of each
    /// role and preserving order.
    #[must_use]
    pub fn from_tokens(tokens: Vec<TokenInfo>) -> Self {
        let mut unique: Vec<TokenInfo> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !unique.iter().any(|existing| existing.role() == token.role()) {
                unique.push(token);
            }
        }
        Self { tokens: unique, tags: BTreeMap::new() }
    }

    /// Build a Grant from an authorization-code token response.
    ///
    /// The access token is mandatory; refresh and id tokens are attached when
    /// the server issued them. An id token is passed pre-built so the caller
    /// can attach its deferred validator.
    #[must_use]
    pub fn for_auth_code(
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        refresh_token: Option<String>,
        id_token: Option<TokenInfo>,
    ) -> Self {
        let mut tokens = vec![TokenInfo::new(access_token, TokenRole::Access, expires_at)];
        if let Some(refresh) = refresh_token {
            tokens.push(TokenInfo::new(refresh, TokenRole::Refresh, None));
        }
        if let Some(id) = id_token {
            tokens.push(id);
        }
        Self::from_tokens(tokens)
    }

    /// Build a Grant from a client-credentials token response.
    #[must_use]
    pub fn for_client_credentials(
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self::from_tokens(vec![TokenInfo::new(access_token, TokenRole::Access, expires_at)])
    }

    /// All tokens in this Grant, in construction order.
    #[must_use]
    pub fn tokens(&self) -> &[TokenInfo] {
        &self.tokens
    }

    fn first_by_role(&self, role: TokenRole) -> Option<&TokenInfo> {
        self.tokens.iter().find(|token| token.role() == role)
    }

    /// The access token, if present.
    #[must_use]
    pub fn access_token(&self) -> Option<&TokenInfo> {
        self.first_by_role(TokenRole::Access)
    }

    /// The refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&TokenInfo> {
        self.first_by_role(TokenRole::Refresh)
    }

    /// The identity token, if present.
    #[must_use]
    pub fn id_token(&self) -> Option<&TokenInfo> {
        self.first_by_role(TokenRole::Id)
    }

    /// The access token's expiry, if both are known.
    #[must_use]
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.access_token().and_then(TokenInfo::expires_at)
    }

    /// Whether the access token's expiry has passed. A Grant without an
    /// expiry is not considered expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires().is_some_and(|expires| expires <= Utc::now())
    }

    /// Caller extension data attached to this Grant.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.tags
    }

    /// Read a single extension value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&serde_json::Value> {
        self.tags.get(key)
    }

    /// Attach an extension value (e.g. cached user-info claims).
    pub fn set_tag(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.tags.insert(key.into(), value);
    }

    /// Copy this Grant for the cache, rewriting the access token's expiry to
    /// `now + (remaining − margin)` so a cached token is never returned so
    /// close to expiry that the request it authorizes fails in flight.
    /// Refresh and id tokens are cloned without an expiry; their validity is
    /// judged solely by delegate or absence.
    #[must_use]
    pub fn clone_with_margin(&self, remaining: Duration) -> Self {
        let margin = Duration::seconds(CACHE_SAFETY_MARGIN_SECS);

        let tokens = self
            .tokens
            .iter()
            .map(|token| match token.role() {
                TokenRole::Access => TokenInfo::new(
                    token.value.clone(),
                    TokenRole::Access,
                    Some(Utc::now() + (remaining - margin)),
                ),
                role => {
                    let clone = TokenInfo::new(token.value.clone(), role, None);
                    match &token.validator {
                        Some(validator) => clone.with_validator(Arc::clone(validator)),
                        None => clone,
                    }
                }
            })
            .collect();

        Self { tokens, tags: self.tags.clone() }
    }
}
