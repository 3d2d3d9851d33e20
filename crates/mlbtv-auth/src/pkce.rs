//! PKCE (Proof Key for Code Exchange) per RFC 7636, plus the random
//! `state`/`nonce` parameters sent on interact.
//!
//! The verifier stays in the per-attempt flow state and is only sent on the
//! final token exchange. The challenge goes out on the first request so the
//! identity provider can tie the two together.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Verifier length the mlb.com web client uses (58 characters).
const VERIFIER_BYTES: usize = 43;

/// 48 random bytes encode to 64 URL-safe characters.
const PARAM_BYTES: usize = 48;

/// A verifier and the S256 challenge derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random verifier, 58 URL-safe base64 characters without padding.
pub fn generate_verifier() -> String {
    random_url_safe::<VERIFIER_BYTES>()
}

/// `challenge = BASE64URL(SHA256(verifier))`, padding stripped (43 characters).
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random 64-character value for the `state` and `nonce` parameters.
pub fn random_param() -> String {
    random_url_safe::<PARAM_BYTES>()
}

fn random_url_safe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
