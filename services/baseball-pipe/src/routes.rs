//! Player-facing routes
//!
//! Maps `/{gamePk}/{mediaId}/...` onto the stream negotiator: the master
//! playlist, child playlists (anything else ending in `.m3u8`) and media
//! segments (everything else). Also serves the games listing and the last
//! negotiation error per stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::NaiveDate;
use mlbtv_stream::{Error as StreamError, StreamKey, StreamNegotiator};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::metrics::{record_request, record_upstream_error};
use crate::schedule::{self, ScheduleClient};

const MPEGURL: &str = "application/vnd.apple.mpegurl";

/// Runtime counters reported on `/health`.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being served; reported when a shutdown drain
    /// times out.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Decrements `in_flight` on drop, including when the request future is
/// cancelled.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(metrics: &ServiceMetrics) -> Self {
        metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(metrics.in_flight.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct PipeState {
    pub negotiator: Arc<StreamNegotiator>,
    pub schedule: Arc<ScheduleClient>,
    /// Absolute base for rewritten URIs, with trailing `/`. When unset the
    /// request's `Host` is used.
    pub public_url: Option<String>,
    pub metrics: ServiceMetrics,
}

impl PipeState {
    fn local_root(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.clone();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}/")
    }

    fn stream_base(&self, headers: &HeaderMap, key: &StreamKey) -> String {
        format!(
            "{}{}/{}/",
            self.local_root(headers),
            key.game_pk(),
            key.media_id()
        )
    }
}

/// What a path under `/{gamePk}/{mediaId}/` refers to.
#[derive(Debug, PartialEq, Eq)]
pub enum MediaPath<'a> {
    Master,
    Child(&'a str),
    Segment(&'a str),
}

impl MediaPath<'_> {
    fn resource(&self) -> &'static str {
        match self {
            MediaPath::Master => "master",
            MediaPath::Child(_) => "child",
            MediaPath::Segment(_) => "segment",
        }
    }
}

pub fn classify(path: &str) -> MediaPath<'_> {
    if path == "master.m3u8" {
        MediaPath::Master
    } else if path.ends_with(".m3u8") {
        MediaPath::Child(path)
    } else {
        MediaPath::Segment(path)
    }
}

pub fn router(state: PipeState) -> Router {
    Router::new()
        .route("/games", get(games_handler))
        .route("/errors/{game_pk}/{media_id}", get(errors_handler))
        .route("/{game_pk}/{media_id}/{*path}", get(media_handler))
        .with_state(state)
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

async fn media_handler(
    State(state): State<PipeState>,
    Path((game_pk, media_id, path)): Path<(String, String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id();
    let _in_flight = InFlight::enter(&state.metrics);
    let started = Instant::now();

    let media = classify(&path);
    let resource = media.resource();
    let response = match StreamKey::parse(&game_pk, &media_id) {
        Ok(key) => {
            serve_media(&state, &key, media, uri.query(), &headers, &request_id).await
        }
        Err(e) => fail(&state, &e, &request_id),
    };

    record_request(resource, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

#[instrument(
    skip_all,
    fields(request_id = %request_id, stream = %key, resource = media.resource())
)]
async fn serve_media(
    state: &PipeState,
    key: &StreamKey,
    media: MediaPath<'_>,
    query: Option<&str>,
    headers: &HeaderMap,
    request_id: &str,
) -> Response {
    let with_query = |name: &str| match query {
        Some(q) if !q.is_empty() => format!("{name}?{q}"),
        _ => name.to_string(),
    };
    let negotiator = &state.negotiator;

    let result = match media {
        MediaPath::Master => negotiator
            .master_manifest(key, &state.stream_base(headers, key))
            .await
            .map(|m| (MPEGURL.to_string(), m.etag, Body::from(m.text))),
        MediaPath::Child(name) => negotiator
            .child_manifest(key, &with_query(name), &state.stream_base(headers, key))
            .await
            .map(|m| (MPEGURL.to_string(), m.etag, Body::from(m.text))),
        MediaPath::Segment(name) => negotiator.segment(key, &with_query(name)).await.map(|s| {
            let content_type = s
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            (content_type, s.etag, Body::from(s.body))
        }),
    };

    match result {
        Ok((content_type, etag, body)) => {
            let not_modified = match (&etag, headers.get(header::IF_NONE_MATCH)) {
                (Some(etag), Some(candidates)) => candidates
                    .to_str()
                    .is_ok_and(|candidates| etag_matches(candidates, etag)),
                _ => false,
            };
            let (status, body) = if not_modified {
                (StatusCode::NOT_MODIFIED, Body::empty())
            } else {
                (StatusCode::OK, body)
            };
            media_response(status, &content_type, etag.as_deref(), body, request_id)
        }
        Err(e) => fail(state, &e, request_id),
    }
}

/// Weak comparison of `etag` against an `If-None-Match` list.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let opaque = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let etag = opaque(etag);
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || opaque(candidate) == etag)
}

fn media_response(
    status: StatusCode,
    content_type: &str,
    etag: Option<&str>,
    body: Body,
    request_id: &str,
) -> Response {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "*");
    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, etag);
    }
    builder.body(body).unwrap_or_else(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("response build error: {e}"),
            request_id,
        )
        .into_response()
    })
}

fn fail(state: &PipeState, err: &StreamError, request_id: &str) -> Response {
    state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    if !matches!(err, StreamError::InvalidRequest(_)) {
        record_upstream_error(err.stage());
    }
    warn!(request_id, stage = err.stage(), error = %err, "stream request failed");
    ApiError::from_stream(err, request_id).into_response()
}

async fn errors_handler(
    State(state): State<PipeState>,
    Path((game_pk, media_id)): Path<(String, String)>,
) -> Response {
    let request_id = request_id();
    let started = Instant::now();

    let response = match StreamKey::parse(&game_pk, &media_id) {
        Ok(key) => match state.negotiator.negotiation_errors(&key) {
            Some(errors) => (
                StatusCode::OK,
                [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
                axum::Json(json!({ "stream": key.to_string(), "errors": errors })),
            )
                .into_response(),
            None => {
                let message = format!("no negotiation errors recorded for {key}");
                ApiError::not_found(message, &request_id).into_response()
            }
        },
        Err(e) => ApiError::from_stream(&e, &request_id).into_response(),
    };

    record_request("errors", response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

#[derive(Debug, Deserialize)]
pub struct GamesQuery {
    pub date: Option<String>,
    pub end: Option<String>,
}

async fn games_handler(
    State(state): State<PipeState>,
    Query(query): Query<GamesQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id();
    let _in_flight = InFlight::enter(&state.metrics);
    let started = Instant::now();

    let response = match list_games(&state, &query, &headers, &request_id).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            axum::Json(body),
        )
            .into_response(),
        Err(e) => e.into_response(),
    };

    record_request("games", response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn list_games(
    state: &PipeState,
    query: &GamesQuery,
    headers: &HeaderMap,
    request_id: &str,
) -> Result<serde_json::Value, ApiError> {
    let parse = |value: &Option<String>| -> Result<Option<NaiveDate>, ApiError> {
        value
            .as_deref()
            .map(schedule::parse_date)
            .transpose()
            .map_err(|e| {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", e.to_string(), request_id)
            })
    };
    let start = parse(&query.date)?.unwrap_or_else(|| chrono::Local::now().date_naive());
    let end = parse(&query.end)?;

    let schedule = state.schedule.games(start, end).await.map_err(|e| {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        record_upstream_error("schedule");
        warn!(error = %e, "schedule lookup failed");
        let (status, kind) = match e {
            schedule::Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            _ => (StatusCode::BAD_GATEWAY, "schedule_error"),
        };
        ApiError {
            stage: "schedule",
            ..ApiError::new(status, kind, e.to_string(), request_id)
        }
    })?;

    let root = state.local_root(headers);
    let games: Vec<_> = schedule
        .games
        .iter()
        .map(|game| {
            let feeds: Vec<_> = game
                .broadcasts
                .iter()
                .filter_map(|b| {
                    let media_id = b.media_id.as_deref()?;
                    Some(json!({
                        "media_id": media_id,
                        "name": b.name,
                        "kind": b.kind,
                        "home_away": b.home_away,
                        "master_url": format!("{root}{}/{media_id}/master.m3u8", game.game_pk),
                    }))
                })
                .collect();
            json!({
                "game_pk": game.game_pk,
                "official_date": game.official_date,
                "status": game.status.as_ref().map(|s| s.detailed_state.as_str()),
                "away": game.teams.away.team.name,
                "home": game.teams.home.team.name,
                "feeds": feeds,
            })
        })
        .collect();

    info!(date = %schedule.date, games = games.len(), "listed games");
    Ok(json!({ "date": schedule.date.to_string(), "games": games }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, SystemTime};

    use axum::http::Request;
    use axum::routing::post;
    use mlbtv_auth::{StaticToken, Token};
    use mlbtv_stream::NegotiatorConfig;
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=5000000\nhd/720p.m3u8\n";

    const CHILD: &str = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
seg1.ts
#EXT-X-CUE-OUT:6.0
#EXTINF:6.0,
ad1.ts
#EXT-X-CUE-IN
#EXTINF:6.0,
seg2.ts
";

    /// Media gateway plus CDN on one listener.
    struct Upstream {
        base: String,
        refuse: Arc<AtomicBool>,
        cdn_query: Arc<std::sync::Mutex<Option<String>>>,
    }

    async fn start_upstream() -> Upstream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let refuse = Arc::new(AtomicBool::new(false));
        let cdn_query = Arc::new(std::sync::Mutex::new(None));

        let gateway_base = base.clone();
        let refuse_flag = refuse.clone();
        let seen_query = cdn_query.clone();
        let app = axum::Router::new()
            .route(
                "/graphql",
                post(move |axum::Json(body): axum::Json<Value>| {
                    let base = gateway_base.clone();
                    let refuse = refuse_flag.load(Ordering::SeqCst);
                    async move {
                        match body["operationName"].as_str() {
                            Some("initSession") => axum::Json(json!({
                                "data": {
                                    "initSession": { "deviceId": "dev-1", "sessionId": "sess-1" }
                                }
                            })),
                            _ if refuse => axum::Json(json!({
                                "data": null,
                                "errors": [{ "message": "Media is blacked out" }],
                            })),
                            _ => axum::Json(json!({
                                "data": { "initPlaybackSession": {
                                    "playbackSessionId": "pbs-1",
                                    "playback": {
                                        "url": format!("{base}/cdn/master.m3u8?sig=abc"),
                                        "expiration": null,
                                        "cdn": "mock",
                                    },
                                }}
                            })),
                        }
                    }
                }),
            )
            .route(
                "/cdn/{*file}",
                get(move |Path(file): Path<String>, uri: Uri| {
                    *seen_query.lock().unwrap() = uri.query().map(str::to_owned);
                    async move {
                        match file.as_str() {
                            "master.m3u8" => ([("etag", "\"m1\"")], MASTER).into_response(),
                            "hd/720p.m3u8" => ([("etag", "\"c1\"")], CHILD).into_response(),
                            "hd/seg1.ts" => (
                                [("etag", "\"s1\""), ("content-type", "video/mp2t")],
                                vec![0x47u8, 0x40, 0x00],
                            )
                                .into_response(),
                            _ => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Upstream {
            base,
            refuse,
            cdn_query,
        }
    }

    fn pipe_state(upstream: &Upstream, public_url: Option<&str>) -> PipeState {
        let token = Token::new("at-1", "Bearer", SystemTime::now() + Duration::from_secs(3600));
        let negotiator = StreamNegotiator::new(
            Arc::new(StaticToken::new(token)),
            NegotiatorConfig {
                graphql_url: format!("{}/graphql", upstream.base),
                ..NegotiatorConfig::default()
            },
        )
        .unwrap();
        let schedule = ScheduleClient::new(Duration::from_secs(5), Duration::from_secs(2))
            .unwrap()
            .with_base_url(format!("{}/api/v1", upstream.base));

        PipeState {
            negotiator: Arc::new(negotiator),
            schedule: Arc::new(schedule),
            public_url: public_url.map(str::to_owned),
            metrics: ServiceMetrics::new(),
        }
    }

    async fn get_path(state: PipeState, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut request = Request::builder().uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn paths_are_classified_by_name() {
        assert_eq!(classify("master.m3u8"), MediaPath::Master);
        assert_eq!(classify("hd/720p.m3u8"), MediaPath::Child("hd/720p.m3u8"));
        assert_eq!(classify("hd/seg1.ts"), MediaPath::Segment("hd/seg1.ts"));
        assert_eq!(classify("keys/aes.key"), MediaPath::Segment("keys/aes.key"));
    }

    #[tokio::test]
    async fn master_is_rewritten_under_host() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response =
            get_path(state, "/776825/abc-123/master.m3u8", &[("host", "pipe.lan:8080")]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), MPEGURL);
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(response.headers().get(header::ETAG).unwrap(), "\"m1\"");

        let text = body_text(response).await;
        assert!(text.contains("http://pipe.lan:8080/776825/abc-123/hd/720p.m3u8"), "{text}");
    }

    #[tokio::test]
    async fn child_drops_ads_and_maps_into_its_directory() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, Some("http://192.168.1.20:9000/"));

        let response = get_path(state, "/776825/abc-123/hd/720p.m3u8", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("http://192.168.1.20:9000/776825/abc-123/hd/seg1.ts"), "{text}");
        assert!(text.contains("http://192.168.1.20:9000/776825/abc-123/hd/seg2.ts"), "{text}");
        assert!(!text.contains("ad1.ts"), "{text}");
    }

    #[tokio::test]
    async fn segment_passes_bytes_and_query() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response = get_path(state, "/776825/abc-123/hd/seg1.ts?hdnts=xyz", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp2t");
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], &[0x47, 0x40, 0x00]);
        assert_eq!(upstream.cdn_query.lock().unwrap().as_deref(), Some("hdnts=xyz"));
    }

    #[tokio::test]
    async fn matching_etag_is_not_modified() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response =
            get_path(state, "/776825/abc-123/hd/seg1.ts", &[("if-none-match", "\"s1\"")]).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get(header::ETAG).unwrap(), "\"s1\"");
        assert!(body_text(response).await.is_empty());
    }

    #[test]
    fn if_none_match_lists_and_weak_tags() {
        assert!(etag_matches("\"m1\"", "\"m1\""));
        assert!(etag_matches("W/\"m1\"", "\"m1\""));
        assert!(etag_matches("\"m1\"", "W/\"m1\""));
        assert!(etag_matches("\"a\", \"m1\"", "\"m1\""));
        assert!(etag_matches("\"a\",W/\"m1\"", "\"m1\""));
        assert!(etag_matches("*", "\"m1\""));
        assert!(!etag_matches("\"a\", \"b\"", "\"m1\""));
        assert!(!etag_matches("\"m10\"", "\"m1\""));
    }

    #[tokio::test]
    async fn weak_etag_in_list_is_not_modified() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response = get_path(
            state,
            "/776825/abc-123/master.m3u8",
            &[("if-none-match", "\"stale\", W/\"m1\"")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get(header::ETAG).unwrap(), "\"m1\"");
    }

    #[tokio::test]
    async fn missing_segment_passes_cdn_status() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);
        let errors_total = state.metrics.errors_total.clone();

        let response = get_path(state, "/776825/abc-123/hd/missing.ts", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"]["stage"], "fetch");
        assert!(json["error"]["request_id"].as_str().unwrap().starts_with("req_"));
        assert_eq!(errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn bad_stream_key_is_rejected() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response = get_path(state, "/77x825/abc-123/master.m3u8", &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response = get_path(state, "/776825/abc-123/hd/../../secret.ts", &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refused_playback_is_captured_for_errors_route() {
        let upstream = start_upstream().await;
        upstream.refuse.store(true, Ordering::SeqCst);
        let state = pipe_state(&upstream, None);

        let before = get_path(state.clone(), "/errors/776825/abc-123", &[]).await;
        assert_eq!(before.status(), StatusCode::NOT_FOUND);

        let response = get_path(state.clone(), "/776825/abc-123/master.m3u8", &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"]["stage"], "negotiation");
        assert_eq!(json["error"]["details"][0]["message"], "Media is blacked out");

        let errors = get_path(state, "/errors/776825/abc-123", &[]).await;
        assert_eq!(errors.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_text(errors).await).unwrap();
        assert_eq!(json["stream"], "776825/abc-123");
        assert_eq!(json["errors"][0]["message"], "Media is blacked out");
    }

    #[tokio::test]
    async fn requests_are_counted_and_released() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);
        let metrics = state.metrics.clone();

        let response = get_path(state, "/776825/abc-123/master.m3u8", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn invalid_games_date_is_bad_request() {
        let upstream = start_upstream().await;
        let state = pipe_state(&upstream, None);

        let response = get_path(state, "/games?date=yesterday", &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn games_lists_local_master_urls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stats = format!("http://{}/api/v1", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let app = axum::Router::new().route(
                "/api/v1/schedule",
                get(|| async {
                    axum::Json(json!({
                        "dates": [{
                            "date": "2025-08-08",
                            "games": [{
                                "gamePk": 776825,
                                "officialDate": "2025-08-08",
                                "status": { "detailedState": "Final" },
                                "teams": {
                                    "away": { "team": { "id": 147, "name": "New York Yankees" } },
                                    "home": { "team": { "id": 111, "name": "Boston Red Sox" } },
                                },
                                "broadcasts": [
                                    {
                                        "name": "NESN",
                                        "type": "TV",
                                        "mediaId": "abc-123",
                                        "homeAway": "home"
                                    },
                                    { "name": "WFAN", "type": "AM", "homeAway": "away" },
                                ],
                            }],
                        }]
                    }))
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        let upstream = start_upstream().await;
        let mut state = pipe_state(&upstream, Some("http://pipe.lan/"));
        state.schedule = Arc::new(
            ScheduleClient::new(Duration::from_secs(5), Duration::from_secs(2))
                .unwrap()
                .with_base_url(stats),
        );

        let response = get_path(state, "/games?date=20250808", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["date"], "2025-08-08");
        let game = &json["games"][0];
        assert_eq!(game["game_pk"], 776825);
        assert_eq!(game["home"], "Boston Red Sox");
        assert_eq!(game["status"], "Final");
        assert_eq!(game["feeds"].as_array().unwrap().len(), 1);
        assert_eq!(
            game["feeds"][0]["master_url"],
            "http://pipe.lan/776825/abc-123/master.m3u8"
        );
    }
}
