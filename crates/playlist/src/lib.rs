//! HLS manifest rewriting for local re-serving
//!
//! Takes a master or media playlist fetched from the upstream CDN and produces
//! a playlist that a local client can play through this service:
//! - every URI line is rooted at a caller-supplied base (the local proxy path)
//! - everything between `#EXT-X-CUE-OUT` and `#EXT-X-CUE-IN` is elided
//! - a `#EXT-X-DISCONTINUITY` is inserted where each ad break ended
//!
//! The crate does no I/O. `rewrite` is a pure function of its inputs and is
//! re-run on every manifest refresh; no state carries over between calls.

pub mod line;
pub mod rewrite;

pub use line::{DISCONTINUITY, Line, classify};
pub use rewrite::{AdBreak, CueState, ParseWarning, Rewrite, RewriteReport, rewrite};
