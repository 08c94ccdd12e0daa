//! Token cache implementations
//!
//! Grants are persisted as a JSON record carrying each token's value, role
//! and expiry plus the Grant's tag map. Deferred validators are
//! engine-injected capabilities and are not persisted; a Grant read back
//! from a cache validates by expiry alone.

mod keyring;
mod memory;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use grantwell_core::{Grant, TokenInfo, TokenRole};
use serde::{Deserialize, Serialize};

pub use self::keyring::KeyringTokenCache;
pub use self::memory::MemoryTokenCache;

/// Persisted form of a single token.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    value: String,
    role: TokenRole,
    expires_at: Option<DateTime<Utc>>,
}

/// Persisted form of a Grant.
#[derive(Debug, Serialize, Deserialize)]
struct StoredGrant {
    tokens: Vec<StoredToken>,
    #[serde(default)]
    tags: BTreeMap<String, serde_json::Value>,
}

impl From<&Grant> for StoredGrant {
    fn from(grant: &Grant) -> Self {
        let tokens = grant
            .tokens()
            .iter()
            .map(|token| StoredToken {
                value: token.value().to_string(),
                role: token.role(),
                expires_at: token.expires_at(),
            })
            .collect();

        Self { tokens, tags: grant.tags().clone() }
    }
}

impl StoredGrant {
    fn into_grant(self) -> Grant {
        let tokens = self
            .tokens
            .into_iter()
            .map(|token| TokenInfo::new(token.value, token.role, token.expires_at))
            .collect();

        let mut grant = Grant::from_tokens(tokens);
        for (key, value) in self.tags {
            grant.set_tag(key, value);
        }
        grant
    }
}
