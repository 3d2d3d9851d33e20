//! Types shared by the baseball-pipe crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
