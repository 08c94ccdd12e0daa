//! Engine constants
//!
//! Centralized location for all domain-level constants used throughout the
//! engine.

/// Safety margin subtracted from the remaining access-token lifetime when a
/// Grant is cloned into the cache, so a cached token is never handed out so
/// close to expiry that the request it authorizes fails in flight.
pub const CACHE_SAFETY_MARGIN_SECS: i64 = 2;

/// Clock-skew buffer subtracted when converting a token response's
/// `expires_in` into an absolute expiry.
pub const TOKEN_CLOCK_SKEW_SECS: i64 = 5;

/// Well-known path suffix for OIDC discovery metadata.
pub const WELL_KNOWN_SUFFIX: &str = ".well-known/openid-configuration";

/// PKCE code challenge method. SHA-256 is the only method the engine emits.
pub const CHALLENGE_METHOD: &str = "S256";

/// Number of random bytes behind each state token and code verifier.
pub const STATE_ENTROPY_BYTES: usize = 32;

/// Separator between the authority host and client id in cache keys.
pub const CACHE_KEY_SEPARATOR: &str = "::";
