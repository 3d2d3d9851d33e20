//! Token source abstraction
//!
//! The stream negotiator only needs "give me a token" and "this token was
//! refused". Keeping that behind a trait lets the negotiator run against a
//! fixed token in tests. Uses `Pin<Box<dyn Future>>` so it can be held as
//! `Arc<dyn TokenSource>`.

use std::future::Future;
use std::pin::Pin;

use crate::authenticator::Authenticator;
use crate::error::Result;
use crate::token::Token;

pub trait TokenSource: Send + Sync {
    /// A currently valid bearer token.
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + '_>>;

    /// Upstream refused `token`; do not hand it out again.
    fn reject<'a>(&'a self, token: &'a Token) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

impl TokenSource for Authenticator {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + '_>> {
        Box::pin(Authenticator::token(self))
    }

    fn reject<'a>(&'a self, token: &'a Token) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(self.invalidate(token))
    }
}

/// Always hands out the same token. For tests and for running against a
/// token obtained elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: Token,
}

impl StaticToken {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + '_>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }

    fn reject<'a>(&'a self, _token: &'a Token) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}
