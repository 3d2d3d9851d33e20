//! Stream identity and negotiated session state

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::{Error, Result};

/// Signed URLs are dropped this long before they actually expire so a
/// manifest fetch never races the expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Identifies one broadcast feed of one game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    game_pk: String,
    media_id: String,
}

impl StreamKey {
    /// `game_pk` must be decimal digits, `media_id` letters, digits and `-`.
    pub fn parse(game_pk: &str, media_id: &str) -> Result<Self> {
        if game_pk.is_empty() || !game_pk.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidRequest(format!("bad game id {game_pk:?}")));
        }
        if media_id.is_empty()
            || !media_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(Error::InvalidRequest(format!("bad media id {media_id:?}")));
        }
        Ok(Self {
            game_pk: game_pk.to_owned(),
            media_id: media_id.to_owned(),
        })
    }

    pub fn game_pk(&self) -> &str {
        &self.game_pk
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    /// The mlb.com page that plays this feed; sent as `Referer`.
    pub fn page_url(&self) -> String {
        format!("https://www.mlb.com/tv/g{}/v{}", self.game_pk, self.media_id)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_pk, self.media_id)
    }
}

/// Device registration with the media gateway. One per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSession {
    pub device_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub url: String,
    pub interval: Option<u64>,
}

/// Result of `initPlaybackSession`.
#[derive(Debug, Clone)]
pub struct PlaybackGrant {
    pub manifest_url: String,
    pub playback_session_id: Option<String>,
    pub expiration: Option<SystemTime>,
    pub cdn: Option<String>,
    /// `adScenarios` and `adExperience`, unparsed.
    pub ad_metadata: Value,
    pub heartbeat: Option<Heartbeat>,
}

/// A negotiated stream. Immutable apart from the last seen `ETag`.
#[derive(Debug)]
pub struct StreamSession {
    key: StreamKey,
    device: DeviceSession,
    grant: PlaybackGrant,
    upstream_base: String,
    etag: Mutex<Option<String>>,
}

impl StreamSession {
    pub fn new(key: StreamKey, device: DeviceSession, grant: PlaybackGrant) -> Self {
        let upstream_base = upstream_base(&grant.manifest_url);
        Self {
            key,
            device,
            grant,
            upstream_base,
            etag: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn device(&self) -> &DeviceSession {
        &self.device
    }

    pub fn grant(&self) -> &PlaybackGrant {
        &self.grant
    }

    pub fn manifest_url(&self) -> &str {
        &self.grant.manifest_url
    }

    /// Manifest URL up to and including its last `/`.
    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.grant.expiration
    }

    /// How long the signed URL stays usable from `now`, less a safety margin.
    /// `None` when upstream did not say.
    pub fn time_to_live(&self, now: SystemTime) -> Option<Duration> {
        self.grant.expiration.map(|at| {
            at.duration_since(now)
                .unwrap_or_default()
                .saturating_sub(EXPIRY_MARGIN)
        })
    }

    pub fn etag(&self) -> Option<String> {
        self.etag.lock().ok().and_then(|etag| etag.clone())
    }

    pub(crate) fn record_etag(&self, etag: Option<String>) {
        if let Ok(mut current) = self.etag.lock() {
            *current = etag;
        }
    }
}

/// Directory of the manifest URL. Signed query strings can contain `/`,
/// so the query and fragment are cut off first.
pub(crate) fn upstream_base(manifest_url: &str) -> String {
    let path = manifest_url
        .split(['?', '#'])
        .next()
        .unwrap_or(manifest_url);
    match path.rfind('/') {
        Some(i) => path[..=i].to_string(),
        None => String::new(),
    }
}

/// Signed URL expiration as sent by the gateway: epoch seconds (or
/// milliseconds) as a number or a numeric string.
pub(crate) fn parse_expiration(value: &Value) -> Option<SystemTime> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let secs = if raw > 1e12 { raw / 1000.0 } else { raw };
    Some(UNIX_EPOCH + Duration::from_secs_f64(secs))
}
