//! PKCE (Proof Key for Code Exchange) and CSRF state primitives
//!
//! Implements RFC 7636 verifier/challenge generation and the CSRF state
//! token carried through the authorization redirect. Used for native
//! applications where client secrets cannot be safely stored.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use grantwell_domain::constants::{CHALLENGE_METHOD, STATE_ENTROPY_BYTES};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a random state token for CSRF protection
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43
/// characters). Uses the OS-seeded thread RNG, which is cryptographically
/// secure.
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..STATE_ENTROPY_BYTES).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Generate a cryptographically secure code verifier
///
/// The verifier is 32 random bytes, optionally prefixed with the client id,
/// base64url-encoded without padding. Per RFC 7636 verifiers must be 43-128
/// characters long; the unprefixed form is exactly 43.
#[must_use]
pub fn generate_code_verifier(client_id: Option<&str>) -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = client_id.map(|id| id.as_bytes().to_vec()).unwrap_or_default();
    bytes.extend((0..STATE_ENTROPY_BYTES).map(|_| rng.gen::<u8>()));
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate the code challenge for a verifier
///
/// Per RFC 7636, the challenge is BASE64URL(SHA256(ASCII(code_verifier)))
/// without padding.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Validate that the state returned by the callback matches the one sent
/// in the authorization request.
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// Security state for a single authorization-code attempt
///
/// Holds the CSRF state token and the PKCE verifier/challenge pair. Generated
/// fresh per attempt and never persisted beyond the single round trip.
#[derive(Debug, Clone)]
pub struct AuthState {
    state: Option<String>,
    code_verifier: Option<String>,
    code_challenge: Option<String>,
}

impl AuthState {
    /// Generate the security state for one authorization attempt.
    ///
    /// With `use_state` disabled every field is absent. With `use_state` but
    /// not `use_pkce`, only the CSRF state is populated. The verifier is
    /// salted with the client id when one is supplied.
    #[must_use]
    pub fn new(use_state: bool, use_pkce: bool, client_id: Option<&str>) -> Self {
        if !use_state {
            return Self { state: None, code_verifier: None, code_challenge: None };
        }

        let state = Some(generate_state());

        if !use_pkce {
            return Self { state, code_verifier: None, code_challenge: None };
        }

        let verifier = generate_code_verifier(client_id);
        let challenge = generate_code_challenge(&verifier);

        Self { state, code_verifier: Some(verifier), code_challenge: Some(challenge) }
    }

    /// CSRF state token, present iff state validation is enabled.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// PKCE code verifier, kept secret until the token exchange.
    #[must_use]
    pub fn code_verifier(&self) -> Option<&str> {
        self.code_verifier.as_deref()
    }

    /// PKCE code challenge sent in the authorization request.
    #[must_use]
    pub fn code_challenge(&self) -> Option<&str> {
        self.code_challenge.as_deref()
    }

    /// Get the challenge method (always "S256" for SHA256)
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for core::state.
    use super::*;

    /// Validates `AuthState::new` behavior for the full generation scenario.
    ///
    /// Assertions:
    /// - Ensures state, verifier and challenge are all populated.
    /// - Ensures `code_verifier` length is within the RFC 7636 43-128 window.
    /// - Confirms `challenge_method()` equals `"S256"`.
    #[test]
    fn test_generate_full_state() {
        let state = AuthState::new(true, true, None);

        assert!(state.state().is_some());
        let verifier = state.code_verifier().unwrap();
        assert!(verifier.len() >= 43, "code_verifier too short: {} chars", verifier.len());
        assert!(verifier.len() <= 128, "code_verifier too long: {} chars", verifier.len());
        assert!(state.code_challenge().is_some());
        assert_eq!(state.challenge_method(), "S256");
    }

    /// Validates `AuthState::new` behavior for the state-disabled scenario.
    ///
    /// Assertions:
    /// - Ensures every field is absent when `use_state` is false.
    #[test]
    fn test_state_disabled_leaves_fields_empty() {
        let state = AuthState::new(false, true, Some("client"));

        assert!(state.state().is_none());
        assert!(state.code_verifier().is_none());
        assert!(state.code_challenge().is_none());
    }

    /// Validates `AuthState::new` behavior for the PKCE-disabled scenario.
    ///
    /// Assertions:
    /// - Ensures only the CSRF state is populated.
    #[test]
    fn test_pkce_disabled_keeps_state_only() {
        let state = AuthState::new(true, false, None);

        assert!(state.state().is_some());
        assert!(state.code_verifier().is_none());
        assert!(state.code_challenge().is_none());
    }

    /// Validates `AuthState::new` behavior for the uniqueness scenario.
    ///
    /// Assertions:
    /// - Confirms two generations never share state or verifier values.
    #[test]
    fn test_unique_per_attempt() {
        let first = AuthState::new(true, true, None);
        let second = AuthState::new(true, true, None);

        assert_ne!(first.state(), second.state());
        assert_ne!(first.code_verifier(), second.code_verifier());
        assert_ne!(first.code_challenge(), second.code_challenge());
    }

    /// Validates `generate_code_challenge` behavior for the deterministic
    /// challenge scenario.
    ///
    /// Assertions:
    /// - Confirms the stored challenge equals a recomputed challenge for the
    ///   same verifier.
    /// - Confirms a known verifier hashes to its published S256 challenge.
    #[test]
    fn test_code_challenge_deterministic() {
        let state = AuthState::new(true, true, Some("client_abc"));
        let verifier = state.code_verifier().unwrap();

        assert_eq!(state.code_challenge().unwrap(), generate_code_challenge(verifier));

        // RFC 7636 appendix B reference pair.
        assert_eq!(
            generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    /// Validates `generate_code_verifier` behavior for the client-id salting
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the decoded verifier starts with the client id bytes.
    #[test]
    fn test_verifier_client_id_prefix() {
        let verifier = generate_code_verifier(Some("my_client"));
        let decoded = URL_SAFE_NO_PAD.decode(verifier).unwrap();

        assert!(decoded.starts_with(b"my_client"));
        assert_eq!(decoded.len(), b"my_client".len() + 32);
    }

    /// Validates `generate_state` behavior for the base64url encoding
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures no padding or non-URL-safe characters appear in any field.
    #[test]
    fn test_base64url_encoding() {
        let state = AuthState::new(true, true, None);

        for value in [
            state.state().unwrap(),
            state.code_verifier().unwrap(),
            state.code_challenge().unwrap(),
        ] {
            assert!(!value.contains('='));
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
        }
    }

    /// Validates `validate_state` behavior for the exact-match scenario.
    ///
    /// Assertions:
    /// - Ensures identical states pass and any difference fails.
    #[test]
    fn test_validate_state() {
        let state = generate_state();

        assert!(validate_state(&state, &state));
        assert!(!validate_state(&state, "tampered"));
        assert!(!validate_state(&state, &generate_state()));
    }
}
