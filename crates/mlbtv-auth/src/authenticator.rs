//! Token cache with single-flight acquisition
//!
//! The current token sits behind an async mutex that is held for the whole
//! handshake. Concurrent callers that find no valid token queue on the lock;
//! the first one runs the handshake and the rest find its result when they
//! get the lock. A failed handshake stores nothing, so the next caller starts
//! a fresh attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::constants::IdentityEndpoints;
use crate::credentials::Credentials;
use crate::error::Result;
use crate::flow::{IdentityFlow, identity_client};
use crate::token::Token;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns one account's credentials and its current bearer token.
pub struct Authenticator {
    credentials: Credentials,
    endpoints: IdentityEndpoints,
    request_timeout: Duration,
    connect_timeout: Duration,
    current: Mutex<Option<Token>>,
    handshakes: AtomicU64,
}

impl Authenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoints: IdentityEndpoints::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            current: Mutex::new(None),
            handshakes: AtomicU64::new(0),
        }
    }

    pub fn with_endpoints(mut self, endpoints: IdentityEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.request_timeout = request;
        self.connect_timeout = connect;
        self
    }

    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Return the cached token if it is still valid, otherwise run a full
    /// handshake and cache its result.
    pub async fn token(&self) -> Result<Token> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.clone());
        }

        let attempt = self.handshakes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            username = %self.credentials.username(),
            attempt,
            "starting identity handshake"
        );

        let client = identity_client(self.request_timeout, self.connect_timeout)?;
        let flow = IdentityFlow::new(client, &self.endpoints, &self.credentials);
        match flow.token().await {
            Ok(token) => {
                *current = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, attempt, "identity handshake failed");
                *current = None;
                Err(e)
            }
        }
    }

    /// Drop the cached token if it is still `rejected`. A token that has
    /// already been replaced by a newer handshake is left alone.
    pub async fn invalidate(&self, rejected: &Token) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|t| t.same_as(rejected)) {
            info!("discarding rejected access token");
            *current = None;
        }
    }

    /// Number of handshakes started since construction.
    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }
}
