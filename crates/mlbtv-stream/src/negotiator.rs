//! Stream session negotiation and media fetches
//!
//! Turns `(game_pk, media_id)` into a signed manifest URL in two GraphQL
//! round trips against the media gateway:
//!
//! - `initSession` registers the device. Done once per process and reused
//!   for every stream until the gateway rejects our token.
//! - `initPlaybackSession` asks for one feed and returns the signed URL.
//!
//! Negotiated sessions live in the `StreamCache`. Manifests are fetched from
//! the signed URL, run through the playlist rewriter and returned with the
//! upstream `ETag`; segments come back untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use mlbtv_auth::TokenSource;
use mlbtv_auth::constants::{ORIGIN, USER_AGENT};
use playlist::RewriteReport;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::StreamCache;
use crate::error::{Error, Result};
use crate::graphql::{self, GRAPHQL_URL};
use crate::session::{DeviceSession, PlaybackGrant, StreamKey, StreamSession};

const SEC_CH_UA: &str = "\"Not)A;Brand\";v=\"8\", \"Chromium\";v=\"138\", \"Google Chrome\";v=\"138\"";

#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    pub graphql_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_sessions: u64,
    /// Cache lifetime for sessions whose signed URL carries no expiration.
    pub session_ttl: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            graphql_url: GRAPHQL_URL.to_string(),
            request_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(5),
            max_sessions: 64,
            session_ttl: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Rewritten manifest ready to serve.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub text: String,
    pub etag: Option<String>,
    pub report: RewriteReport,
}

/// Media segment, bytes as received.
#[derive(Debug, Clone)]
pub struct Segment {
    pub body: Bytes,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Resource {
    Master,
    Child,
    Segment,
}

impl Resource {
    fn headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
        match self {
            Resource::Master => {
                headers.insert(
                    header::ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                );
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
                headers.insert("priority", HeaderValue::from_static("u=0, i"));
                headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
                headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
                headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
                headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
                headers.insert(
                    header::UPGRADE_INSECURE_REQUESTS,
                    HeaderValue::from_static("1"),
                );
            }
            Resource::Child | Resource::Segment => {
                headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
                headers.insert(
                    header::ACCEPT_ENCODING,
                    HeaderValue::from_static("identity;q=1, *;q=0"),
                );
                headers.insert("priority", HeaderValue::from_static("i"));
                headers.insert("sec-fetch-dest", HeaderValue::from_static("video"));
                headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
                headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
                if let Resource::Segment = self {
                    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                }
            }
        }
        headers
    }
}

#[derive(Default)]
struct DeviceState {
    /// Sent back as `knownDeviceId` when re-registering.
    known_device_id: String,
    session: Option<DeviceSession>,
}

pub struct StreamNegotiator {
    tokens: Arc<dyn TokenSource>,
    http: reqwest::Client,
    graphql_url: String,
    device: Mutex<DeviceState>,
    /// Set when the gateway rejects our token; the next negotiation
    /// registers the device again.
    device_stale: AtomicBool,
    cache: StreamCache,
    errors: StdMutex<HashMap<StreamKey, Value>>,
    negotiations: AtomicU64,
}

impl StreamNegotiator {
    pub fn new(tokens: Arc<dyn TokenSource>, config: NegotiatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;

        Ok(Self {
            tokens,
            http,
            graphql_url: config.graphql_url,
            device: Mutex::new(DeviceState::default()),
            device_stale: AtomicBool::new(false),
            cache: StreamCache::new(config.max_sessions, config.session_ttl),
            errors: StdMutex::new(HashMap::new()),
            negotiations: AtomicU64::new(0),
        })
    }

    /// Process-wide device registration, performed on first use.
    pub async fn device_session(&self) -> Result<DeviceSession> {
        let mut device = self.device.lock().await;
        if self.device_stale.swap(false, Ordering::AcqRel) {
            device.session = None;
        }
        if let Some(session) = &device.session {
            return Ok(session.clone());
        }

        let request = graphql::init_session_request(&device.known_device_id);
        let response = self
            .graphql("initSession", "https://www.mlb.com/tv", &request)
            .await?;
        let session = graphql::parse_device_session(&response)?;

        info!(
            device_id = %session.device_id,
            reused = device.known_device_id == session.device_id,
            "registered device with media gateway"
        );
        device.known_device_id = session.device_id.clone();
        device.session = Some(session.clone());
        Ok(session)
    }

    /// Ask the gateway for a signed manifest URL for `key`.
    ///
    /// A GraphQL `errors` answer is kept for `negotiation_errors` and
    /// returned as `Error::Negotiation`; a success clears it.
    pub async fn init_playback_session(&self, key: &StreamKey) -> Result<PlaybackGrant> {
        let device = self.device_session().await?;
        self.playback_grant(key, &device).await
    }

    async fn playback_grant(
        &self,
        key: &StreamKey,
        device: &DeviceSession,
    ) -> Result<PlaybackGrant> {
        let request = graphql::init_playback_session_request(key, device);
        let response = self
            .graphql("initPlaybackSession", &key.page_url(), &request)
            .await?;

        if let Some(errors) = graphql::errors(&response) {
            warn!(stream = %key, %errors, "media gateway refused playback session");
            self.record_errors(key, Some(errors.clone()));
            return Err(Error::Negotiation(errors.clone()));
        }

        let grant = graphql::parse_playback_grant(&response)?;
        self.record_errors(key, None);
        Ok(grant)
    }

    /// Last GraphQL error payload for `key`, if its last negotiation failed.
    pub fn negotiation_errors(&self, key: &StreamKey) -> Option<Value> {
        self.errors.lock().ok()?.get(key).cloned()
    }

    fn record_errors(&self, key: &StreamKey, errors: Option<Value>) {
        let Ok(mut map) = self.errors.lock() else {
            return;
        };
        match errors {
            Some(errors) => {
                map.insert(key.clone(), errors);
            }
            None => {
                map.remove(key);
            }
        }
    }

    /// Forget the device registration. Cached stream sessions stay valid.
    pub fn reset_device(&self) {
        self.device_stale.store(true, Ordering::Release);
    }

    /// Negotiated session for `key`, from cache when possible.
    pub async fn session(&self, key: &StreamKey) -> Result<Arc<StreamSession>> {
        self.cache.get_or_negotiate(key, self.negotiate(key)).await
    }

    async fn negotiate(&self, key: &StreamKey) -> Result<Arc<StreamSession>> {
        self.negotiations.fetch_add(1, Ordering::Relaxed);
        let device = self.device_session().await?;
        let grant = self.playback_grant(key, &device).await?;
        info!(
            stream = %key,
            playback_session = grant.playback_session_id.as_deref().unwrap_or("-"),
            expires_at = ?grant.expiration,
            "negotiated playback session"
        );
        Ok(Arc::new(StreamSession::new(key.clone(), device, grant)))
    }

    /// Master playlist with URIs mapped under `local_base`.
    pub async fn master_manifest(&self, key: &StreamKey, local_base: &str) -> Result<Manifest> {
        let session = self.session(key).await?;
        let response = self
            .fetch(&session, session.manifest_url(), Resource::Master)
            .await?;
        self.manifest(key, response, local_base).await
    }

    /// Child playlist `name`, relative to the master playlist's directory.
    /// Its URIs are relative to its own directory, so they are mapped under
    /// `local_base` plus that directory.
    pub async fn child_manifest(
        &self,
        key: &StreamKey,
        name: &str,
        local_base: &str,
    ) -> Result<Manifest> {
        let name = relative_path(name)?;
        let session = self.session(key).await?;
        let url = format!("{}{name}", session.upstream_base());
        let response = self.fetch(&session, &url, Resource::Child).await?;
        let base = format!("{local_base}{}", directory_of(name));
        self.manifest(key, response, &base).await
    }

    /// Media segment `name`, relative to the master playlist's directory.
    pub async fn segment(&self, key: &StreamKey, name: &str) -> Result<Segment> {
        let name = relative_path(name)?;
        let session = self.session(key).await?;
        let url = format!("{}{name}", session.upstream_base());
        let response = self.fetch(&session, &url, Resource::Segment).await?;

        let etag = header_string(&response, header::ETAG);
        let content_type = header_string(&response, header::CONTENT_TYPE);
        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(Segment {
            body,
            etag,
            content_type,
        })
    }

    /// Sessions currently cached (approximate).
    pub fn cached_sessions(&self) -> u64 {
        self.cache.len()
    }

    /// Negotiations started since construction.
    pub fn negotiations(&self) -> u64 {
        self.negotiations.load(Ordering::Relaxed)
    }

    async fn manifest(
        &self,
        key: &StreamKey,
        response: reqwest::Response,
        local_base: &str,
    ) -> Result<Manifest> {
        let etag = header_string(&response, header::ETAG);
        let text = response.text().await.map_err(fetch_error)?;
        let rewrite = playlist::rewrite(&text, local_base);

        let report = rewrite.report;
        if !report.ad_breaks.is_empty() || report.uris_elided > 0 {
            debug!(
                stream = %key,
                ad_breaks = report.ad_breaks.len(),
                uris_elided = report.uris_elided,
                open_break = report.open_break.is_some(),
                "elided ad content"
            );
        }
        record_rewrite(&report);

        Ok(Manifest {
            text: rewrite.text,
            etag,
            report,
        })
    }

    async fn fetch(
        &self,
        session: &StreamSession,
        url: &str,
        resource: Resource,
    ) -> Result<reqwest::Response> {
        debug!(stream = %session.key(), ?resource, "fetching from CDN");
        let response = self
            .http
            .get(url)
            .headers(resource.headers())
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            if matches!(
                status,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::GONE
            ) {
                warn!(stream = %session.key(), %status, "signed URL rejected, dropping session");
                self.cache.evict(session.key()).await;
            }
            return Err(Error::UpstreamFetch {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        session.record_etag(header_string(&response, header::ETAG));
        Ok(response)
    }

    async fn graphql(&self, operation: &'static str, referer: &str, body: &Value) -> Result<Value> {
        let token = self.tokens.token().await?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| Error::Gateway(format!("encoding {operation}: {e}")))?;

        debug!(operation, "sending media gateway request");
        let response = self
            .http
            .post(&self.graphql_url)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::AUTHORIZATION, token.authorization())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, ORIGIN)
            .header(header::REFERER, referer)
            .header("priority", "u=1, i")
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-site")
            .body(payload)
            .send()
            .await
            .map_err(|e| gateway_error(operation, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(operation, "media gateway rejected the access token");
            self.tokens.reject(&token).await;
            self.reset_device();
            return Err(Error::Gateway(format!("{operation}: {status}")));
        }
        if status != StatusCode::OK {
            let reason = status.canonical_reason().unwrap_or_default();
            return Err(Error::Gateway(format!("{operation}: {} {reason}", status.as_u16())));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| gateway_error(operation, e))
    }
}

/// Reject anything that would let a client steer requests away from the
/// stream's upstream directory.
fn relative_path(name: &str) -> Result<&str> {
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.contains("://")
        || name.split(['/', '?']).any(|part| part == "..");
    if bad {
        return Err(Error::InvalidRequest(format!("bad resource path {name:?}")));
    }
    Ok(name)
}

/// `hd/720p.m3u8?x=a/b` -> `hd/`
fn directory_of(name: &str) -> &str {
    let path = name.split_once('?').map_or(name, |(path, _)| path);
    match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    }
}

/// Counted per rewrite, not per distinct break: a live playlist re-serves
/// a completed break on every refresh until it leaves the window.
fn record_rewrite(report: &RewriteReport) {
    metrics::counter!("pipe_rewrite_ad_breaks_total").increment(report.ad_breaks.len() as u64);
    metrics::counter!("pipe_rewrite_uris_elided_total").increment(report.uris_elided as u64);
}

fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn fetch_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamFetch {
            status: 504,
            reason: "upstream timed out".into(),
        }
    } else {
        Error::Transport(e.to_string())
    }
}

fn gateway_error(operation: &'static str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            stage: "negotiation",
            message: format!("{operation}: {e}"),
        }
    } else {
        Error::Gateway(format!("{operation}: {e}"))
    }
}
