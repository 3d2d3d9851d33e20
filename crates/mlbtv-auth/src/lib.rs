//! MLB.TV identity library
//!
//! Logs an MLB.TV account in through the Okta identity engine the mlb.com web
//! client uses and keeps the resulting bearer token. Standalone: no
//! dependency on the stream or proxy crates.
//!
//! Token flow:
//! 1. `Authenticator::token()` returns the cached token while it is valid
//! 2. Otherwise it runs an `IdentityFlow` (six requests, PKCE bound)
//! 3. Callers that get a 401 with a token pass it back to `invalidate()`
//! 4. The next `token()` call logs in again

pub mod authenticator;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod source;
pub mod token;

#[cfg(test)]
mod testing;

pub use authenticator::Authenticator;
pub use constants::IdentityEndpoints;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use flow::{AuthFlowState, IdentityFlow, Step, identity_client};
pub use pkce::{Pkce, compute_challenge, generate_verifier};
pub use source::{StaticToken, TokenSource};
pub use token::{Token, TokenResponse};
