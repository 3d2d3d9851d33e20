//! Bearer token issued by the identity provider

use std::time::{Duration, SystemTime};

use common::Secret;
use serde::Deserialize;

/// Token endpoint response. `expires_in` is a delta in seconds.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Immutable bearer credential. Valid strictly before `expires_at`.
#[derive(Debug, Clone)]
pub struct Token {
    access_token: Secret<String>,
    token_type: String,
    expires_at: SystemTime,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_at: SystemTime,
    ) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            token_type: token_type.into(),
            expires_at,
        }
    }

    /// Build from a token endpoint response received at `issued_at`.
    pub fn from_response(response: TokenResponse, issued_at: SystemTime) -> Self {
        Self::new(
            response.access_token,
            response.token_type,
            issued_at + Duration::from_secs(response.expires_in),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now())
    }

    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// `Authorization` header value, e.g. `Bearer eyJ...`.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }

    /// Whether two tokens carry the same access token.
    pub fn same_as(&self, other: &Token) -> bool {
        self.access_token.expose() == other.access_token.expose()
    }
}
