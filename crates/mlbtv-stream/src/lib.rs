//! MLB.TV stream access
//!
//! Negotiates playback sessions with the media gateway, caches them per
//! stream, and fetches manifests (ad-free, URIs remapped) and segments from
//! the CDN. Authentication is behind `mlbtv_auth::TokenSource`.

pub mod cache;
pub mod error;
pub mod graphql;
pub mod negotiator;
pub mod session;

#[cfg(test)]
mod testing;

pub use cache::StreamCache;
pub use error::{Error, Result};
pub use negotiator::{Manifest, NegotiatorConfig, Segment, StreamNegotiator};
pub use session::{DeviceSession, Heartbeat, PlaybackGrant, StreamKey, StreamSession};
