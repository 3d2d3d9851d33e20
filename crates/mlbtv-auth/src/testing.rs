//! In-process identity provider for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::constants::IdentityEndpoints;
use crate::credentials::Credentials;
use crate::flow::identity_client;
use crate::pkce::compute_challenge;

pub const PASSWORD: &str = "hunter2";

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub offer_password: bool,
    pub issue_code: bool,
    pub fail_interact: bool,
    /// Number of initial token requests answered with 500.
    pub failing_token_requests: usize,
    pub expires_in: u64,
    pub token_delay: Duration,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            offer_password: true,
            issue_code: true,
            fail_interact: false,
            failing_token_requests: 0,
            expires_in: 3600,
            token_delay: Duration::ZERO,
        }
    }
}

struct MockState {
    options: MockOptions,
    hits: Mutex<HashMap<&'static str, usize>>,
    challenge: Mutex<Option<String>>,
    token_requests: AtomicUsize,
    tokens_issued: AtomicUsize,
}

impl MockState {
    fn hit(&self, step: &'static str) {
        *self.hits.lock().unwrap().entry(step).or_default() += 1;
    }
}

pub struct MockIdentityProvider {
    base: String,
    state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockIdentityProvider {
    pub async fn start(options: MockOptions) -> Self {
        let state = Arc::new(MockState {
            options,
            hits: Mutex::new(HashMap::new()),
            challenge: Mutex::new(None),
            token_requests: AtomicUsize::new(0),
            tokens_issued: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/oauth2/v1/interact", post(interact))
            .route("/oauth2/v1/token", post(token))
            .route("/idx/introspect", post(introspect))
            .route("/idx/identify", post(identify))
            .route("/idx/challenge", post(challenge))
            .route("/idx/challenge/answer", post(answer))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            state,
            _server: server,
        }
    }

    pub fn endpoints(&self) -> IdentityEndpoints {
        IdentityEndpoints::from_bases(
            &format!("{}/oauth2", self.base),
            &format!("{}/idx", self.base),
        )
    }

    pub fn hits(&self, step: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(step)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().unwrap().values().sum()
    }
}

pub fn test_credentials() -> Credentials {
    Credentials::new("fan@example.com", String::from(PASSWORD).into())
}

pub fn test_client() -> reqwest::Client {
    identity_client(Duration::from_secs(5), Duration::from_secs(2)).unwrap()
}

fn form_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

async fn interact(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.hit("interact");
    if state.options.fail_interact {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    let scoped = form_value(&body, "scope") == Some("openid%20email")
        && form_value(&body, "code_challenge_method") == Some("S256");
    if !scoped {
        return (StatusCode::BAD_REQUEST, "bad interact form").into_response();
    }
    *state.challenge.lock().unwrap() = form_value(&body, "code_challenge").map(str::to_owned);
    axum::Json(json!({ "interaction_handle": "ih-123456" })).into_response()
}

async fn introspect(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hit("introspect");
    let ion = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/ion+json"));
    let request: Value = serde_json::from_str(&body).unwrap_or_default();
    if !ion || request["interactionHandle"] != "ih-123456" {
        return (StatusCode::BAD_REQUEST, "bad introspect").into_response();
    }
    axum::Json(json!({ "stateHandle": "sh-introspect" })).into_response()
}

async fn identify(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.hit("identify");
    let request: Value = serde_json::from_str(&body).unwrap_or_default();
    if request["stateHandle"] != "sh-introspect" || request["identifier"] != "fan@example.com" {
        return (StatusCode::BAD_REQUEST, "bad identify").into_response();
    }
    let mut authenticators = vec![json!({ "type": "email", "id": "aut-email" })];
    if state.options.offer_password {
        authenticators.push(json!({ "type": "password", "id": "aut-password" }));
    }
    axum::Json(json!({
        "stateHandle": "sh-identify",
        "authenticators": { "type": "array", "value": authenticators },
    }))
    .into_response()
}

async fn challenge(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.hit("challenge");
    let request: Value = serde_json::from_str(&body).unwrap_or_default();
    if request["stateHandle"] != "sh-identify" || request["authenticator"]["id"] != "aut-password" {
        return (StatusCode::BAD_REQUEST, "bad challenge").into_response();
    }
    axum::Json(json!({ "stateHandle": "sh-challenge" })).into_response()
}

async fn answer(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.hit("answer");
    let request: Value = serde_json::from_str(&body).unwrap_or_default();
    if request["stateHandle"] != "sh-challenge" {
        return (StatusCode::BAD_REQUEST, "bad answer").into_response();
    }
    if request["credentials"]["passcode"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, "Password is incorrect").into_response();
    }
    if !state.options.issue_code {
        return axum::Json(json!({ "stateHandle": "sh-answer" })).into_response();
    }
    axum::Json(json!({
        "stateHandle": "sh-answer",
        "successWithInteractionCode": {
            "value": [
                { "name": "grant_type", "value": "interaction_code" },
                { "name": "interaction_code", "value": "ic-789" },
            ]
        }
    }))
    .into_response()
}

async fn token(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.hit("token");
    let attempt = state.token_requests.fetch_add(1, Ordering::SeqCst);
    if !state.options.token_delay.is_zero() {
        tokio::time::sleep(state.options.token_delay).await;
    }
    if attempt < state.options.failing_token_requests {
        return (StatusCode::INTERNAL_SERVER_ERROR, "token service unavailable").into_response();
    }

    let expected = state.challenge.lock().unwrap().clone();
    let presented = form_value(&body, "code_verifier").map(compute_challenge);
    if expected.is_none() || expected != presented {
        return (StatusCode::BAD_REQUEST, "PKCE verification failed").into_response();
    }
    if form_value(&body, "interaction_code") != Some("ic-789")
        || form_value(&body, "redirect_uri") != Some("https://www.mlb.com/login")
    {
        return (StatusCode::BAD_REQUEST, "bad token form").into_response();
    }

    let n = state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
    axum::Json(json!({
        "token_type": "Bearer",
        "expires_in": state.options.expires_in,
        "access_token": format!("at-{n}"),
        "scope": "openid email",
    }))
    .into_response()
}
