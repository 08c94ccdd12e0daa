//! Keyring-backed token cache
//!
//! Persists Grant records through the platform keychain (macOS Keychain,
//! Windows Credential Manager, Linux Secret Service) via the `keyring`
//! crate, so token material never touches disk in plaintext.

use async_trait::async_trait;
use grantwell_core::{Grant, TokenCache};
use grantwell_domain::{AuthError, Result};
use keyring::Entry;
use tracing::debug;

use super::StoredGrant;

/// [`TokenCache`] storing Grant records in the platform keychain.
///
/// Each cache key becomes one keychain entry under the configured service
/// name.
pub struct KeyringTokenCache {
    service_name: String,
}

impl KeyringTokenCache {
    /// Create a cache writing under the given keychain service name
    /// (e.g. `"Grantwell.tokens"`).
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(|err| {
            AuthError::transport(format!("failed to open keychain entry for {key}: {err}"))
        })
    }
}

#[async_trait]
impl TokenCache for KeyringTokenCache {
    async fn try_read(&self, key: &str) -> Result<Option<Grant>> {
        debug!(service = %self.service_name, key = %key, "reading grant from keychain");

        let entry = self.entry(key)?;
        let raw = match entry.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(err) => {
                return Err(AuthError::transport(format!(
                    "failed to read keychain entry for {key}: {err}"
                )))
            }
        };

        let stored: StoredGrant = serde_json::from_str(&raw).map_err(|err| {
            AuthError::transport(format!("corrupt grant record for {key}: {err}"))
        })?;

        Ok(Some(stored.into_grant()))
    }

    async fn create_or_update(&self, grant: &Grant, key: &str) -> Result<()> {
        debug!(service = %self.service_name, key = %key, "storing grant in keychain");

        let record = serde_json::to_string(&StoredGrant::from(grant)).map_err(|err| {
            AuthError::transport(format!("failed to serialize grant record: {err}"))
        })?;

        self.entry(key)?.set_password(&record).map_err(|err| {
            AuthError::transport(format!("failed to write keychain entry for {key}: {err}"))
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!(service = %self.service_name, key = %key, "deleting grant from keychain");

        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(AuthError::transport(format!(
                "failed to delete keychain entry for {key}: {err}"
            ))),
        }
    }
}

impl std::fmt::Debug for KeyringTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringTokenCache").field("service_name", &self.service_name).finish()
    }
}
