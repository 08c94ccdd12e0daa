//! Collaborator ports for the grant engine
//!
//! These traits abstract the external capabilities the engine depends on but
//! does not implement: secure token storage, discovery-document persistence,
//! identity-token validation, the loopback redirect listener, and the host
//! browser. They enable dependency injection and testing with mock
//! implementations.

use std::time::Duration;

use async_trait::async_trait;
use grantwell_domain::Result;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::discovery::DiscoveryDocument;
use crate::grant::Grant;

/// Trait for secure, keyed Grant storage
///
/// Implementations must store values in an encrypting secure store (platform
/// keychain, credential manager, secret service), never plaintext, and must
/// tolerate concurrent reads and writes. The engine itself does not serialize
/// access per key; concurrent writers race and the last write wins.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Read the Grant stored under `key`, if any.
    ///
    /// # Errors
    /// Returns error if the store is unreachable; a missing entry is `None`,
    /// not an error.
    async fn try_read(&self, key: &str) -> Result<Option<Grant>>;

    /// Create or replace the Grant stored under `key`.
    ///
    /// # Errors
    /// Returns error if the store rejects the write.
    async fn create_or_update(&self, grant: &Grant, key: &str) -> Result<()>;

    /// Delete the entry stored under `key`. Deleting a missing entry is not
    /// an error.
    ///
    /// # Errors
    /// Returns error if the store fails the deletion itself.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Trait for persisted discovery-document storage
///
/// Backs the discovery provider's fallback path when a live download fails.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Load the persisted document, if one exists.
    ///
    /// # Errors
    /// Returns error if the store is unreachable or the record is corrupt.
    async fn load(&self) -> Result<Option<DiscoveryDocument>>;

    /// Persist the document, replacing any previous record.
    ///
    /// # Errors
    /// Returns error if the write fails.
    async fn save(&self, document: &DiscoveryDocument) -> Result<()>;
}

/// Trait for deferred identity-token validation
///
/// The engine attaches this capability to id tokens at Grant construction;
/// signature/issuer/audience verification itself is the implementor's
/// concern. The result of the first invocation is memoized per token.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Whether the token is valid. Invoked at most once per token instance.
    async fn validate(&self, token: &str) -> bool;
}

/// Query parameters captured from the authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationCallback {
    /// The authorization code to exchange at the token endpoint.
    pub code: String,

    /// The returned CSRF state token.
    pub state: String,
}

/// Trait for the loopback redirect listener
///
/// Binding and waiting are split so the engine can guarantee the listener is
/// accepting connections before the browser is pointed at the authorization
/// endpoint.
#[async_trait]
pub trait CallbackListener: Send + Sync {
    /// Bind the listener to the redirect URI and start accepting.
    ///
    /// # Errors
    /// Returns error if the address cannot be bound.
    async fn bind(&self, redirect_uri: &Url) -> Result<Box<dyn PendingAuthorization>>;
}

/// A bound loopback listener awaiting its single callback.
#[async_trait]
pub trait PendingAuthorization: Send {
    /// Wait for the authorization redirect.
    ///
    /// Only a GET request carrying a query string with both `code` and
    /// `state` satisfies the wait; any other request fails the attempt with
    /// an authentication error. Cancellation and timeout tear the listener
    /// down and return a canceled outcome.
    ///
    /// # Errors
    /// Returns error on rejected requests, cancellation, or timeout.
    async fn wait(
        self: Box<Self>,
        cancellation: CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<AuthorizationCallback>;
}

/// Trait for handing the authorization URL to the host browser
///
/// The engine never renders UI; the host decides how to present the URL.
pub trait UrlOpener: Send + Sync {
    /// Open `url` in the user's browser (or equivalent surface).
    ///
    /// # Errors
    /// Returns error if the URL cannot be dispatched.
    fn open(&self, url: &Url) -> Result<()>;
}

/// Observer invoked after every successful full or refresh grant.
///
/// Registered explicitly on the [`crate::Authenticator`]; there is no static
/// event surface.
pub trait AuthorizedObserver: Send + Sync {
    /// Called with the freshly acquired Grant after it has been cached.
    fn on_authorized(&self, grant: &Grant);
}
