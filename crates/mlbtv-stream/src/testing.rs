//! In-process media gateway and CDN for tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use mlbtv_auth::{Token, TokenSource};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const MASTER: &str = "#EXTM3U\n\
    #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1280x720\n\
    720p.m3u8\n";

pub const CHILD: &str = "\
#EXTM3U
#EXT-X-TARGETDURATION:6
#EXTINF:6.0,
seg1.ts
#EXT-OATCLS-SCTE35:/DA0AAAAAAAA
#EXT-X-CUE-OUT:12.0
#EXTINF:6.0,
ad1.ts
#EXT-X-CUE-OUT-CONT:ElapsedTime=6.0,Duration=12
#EXTINF:6.0,
ad2.ts
#EXT-X-CUE-IN
#EXTINF:6.0,
seg2.ts
";

pub const SEGMENT: &[u8] = &[0x47, 0x40, 0x00, 0x10, 0x00];

#[derive(Default)]
pub struct GatewayState {
    base: String,
    hits: Mutex<HashMap<&'static str, usize>>,
    pub refuse_playback: AtomicBool,
    pub reject_manifests: AtomicBool,
    pub unauthorized_once: AtomicBool,
    pub playback_delay: Mutex<Duration>,
    pub segment_delay: Mutex<Duration>,
    pub known_device_ids: Mutex<Vec<String>>,
    pub authorization: Mutex<Option<String>>,
    device_counter: AtomicUsize,
}

impl GatewayState {
    fn hit(&self, name: &'static str) {
        *self.hits.lock().unwrap().entry(name).or_default() += 1;
    }
}

pub struct MockGateway {
    base: String,
    pub state: Arc<GatewayState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = Arc::new(GatewayState {
            base: base.clone(),
            ..GatewayState::default()
        });

        let app = Router::new()
            .route("/graphql", post(graphql))
            .route("/cdn/{media}/{*file}", get(cdn))
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base,
            state,
            _server: server,
        }
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base)
    }

    pub fn hits(&self, name: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

async fn graphql(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    *state.authorization.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let vars = &body["variables"];
    match body["operationName"].as_str() {
        Some("initSession") => {
            state.hit("initSession");
            state
                .known_device_ids
                .lock()
                .unwrap()
                .push(vars["device"]["knownDeviceId"].as_str().unwrap_or("?").to_owned());
            let n = state.device_counter.fetch_add(1, Ordering::SeqCst) + 1;
            axum::Json(json!({
                "data": {
                    "initSession": {
                        "deviceId": "dev-1",
                        "sessionId": format!("sess-{n}"),
                        "entitlements": [{ "code": "MLBALL" }],
                    }
                }
            }))
            .into_response()
        }
        Some("initPlaybackSession") => {
            state.hit("initPlaybackSession");
            let delay = *state.playback_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if state.unauthorized_once.swap(false, Ordering::SeqCst) {
                return (StatusCode::UNAUTHORIZED, "expired token").into_response();
            }
            if vars["sessionId"].as_str().is_none_or(|s| !s.starts_with("sess-")) {
                return (StatusCode::BAD_REQUEST, "no session").into_response();
            }
            if state.refuse_playback.load(Ordering::SeqCst) {
                return axum::Json(json!({
                    "data": null,
                    "errors": [{
                        "message": "Media is blacked out",
                        "extensions": { "code": "BLACKOUT" },
                    }],
                }))
                .into_response();
            }
            let media = vars["mediaId"].as_str().unwrap_or_default();
            let expiration = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + 3600;
            axum::Json(json!({
                "data": {
                    "initPlaybackSession": {
                        "playbackSessionId": format!("pbs-{media}"),
                        "playback": {
                            "url": format!("{}/cdn/{media}/master.m3u8?sig=abc", state.base),
                            "token": null,
                            "expiration": expiration.to_string(),
                            "cdn": "mock",
                        },
                        "adScenarios": null,
                        "adExperience": { "adsEnabled": true },
                        "heartbeatInfo": null,
                        "trackingObj": {},
                    }
                }
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "unknown operation").into_response(),
    }
}

async fn cdn(
    State(state): State<Arc<GatewayState>>,
    Path((_media, file)): Path<(String, String)>,
) -> Response {
    match file.as_str() {
        "master.m3u8" => {
            state.hit("master");
            if state.reject_manifests.load(Ordering::SeqCst) {
                return (StatusCode::FORBIDDEN, "signature expired").into_response();
            }
            (
                [("content-type", "application/vnd.apple.mpegurl"), ("etag", "\"m1\"")],
                MASTER,
            )
                .into_response()
        }
        "720p.m3u8" => {
            state.hit("child");
            (
                [("content-type", "application/vnd.apple.mpegurl"), ("etag", "\"c1\"")],
                CHILD,
            )
                .into_response()
        }
        "seg1.ts" => {
            state.hit("segment");
            let delay = *state.segment_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            ([("content-type", "video/mp2t"), ("etag", "\"s1\"")], SEGMENT).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

/// Fixed token that counts how often it was rejected.
pub struct CountingTokens {
    token: Token,
    pub rejected: AtomicUsize,
}

impl CountingTokens {
    pub fn new() -> Self {
        Self {
            token: Token::new(
                "fixed",
                "Bearer",
                SystemTime::now() + Duration::from_secs(3600),
            ),
            rejected: AtomicUsize::new(0),
        }
    }
}

impl TokenSource for CountingTokens {
    fn token(&self) -> Pin<Box<dyn Future<Output = mlbtv_auth::Result<Token>> + Send + '_>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }

    fn reject<'a>(&'a self, _token: &'a Token) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}
