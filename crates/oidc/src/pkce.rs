//! PKCE verifier/challenge generation (RFC 7636, S256 method) and the
//! CSRF state token that correlates a callback with its login attempt.

use {
    base64::Engine,
    base64::engine::general_purpose::URL_SAFE_NO_PAD,
    rand::RngCore,
    sha2::{Digest, Sha256},
};

/// PKCE verifier and derived challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh pair. The verifier encodes 64 random bytes to 86
    /// URL-safe characters, within RFC 7636's 43-128 range.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = derive_challenge(&verifier);
        Self { verifier, challenge }
    }
}

/// Cryptographically random, URL-safe code verifier.
pub fn generate_verifier() -> String {
    random_token()
}

/// S256 challenge: base64url(SHA-256(verifier)), no padding.
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random state token. Same generator as the verifier but never reused as
/// one; it only keys the pending-login store.
pub fn generate_state() -> String {
    random_token()
}

fn random_token() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
