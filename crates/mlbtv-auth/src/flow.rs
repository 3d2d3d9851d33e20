//! Identity handshake
//!
//! Six requests against the identity provider, in this order:
//!
//! 1. `interact`   - PKCE challenge in, interaction handle out
//! 2. `introspect` - interaction handle in, state handle out
//! 3. `identify`   - username in, state handle + authenticator ids out
//! 4. `challenge`  - password authenticator id in, state handle out
//! 5. `answer`     - password in, interaction code out
//! 6. `token`      - interaction code + PKCE verifier in, bearer token out
//!
//! Each step checks whether the state it depends on is present and runs the
//! previous step first if it is not, so any step can be called directly on a
//! fresh `IdentityFlow`. The state lives in the flow value, which is created
//! per attempt and consumed by `token()`; nothing is shared between attempts.

use std::fmt;
use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{
    CLIENT_ID, IdentityEndpoints, ION_JSON, OKTA_JSON, ORIGIN, REDIRECT_URI, REFERER, USER_AGENT,
};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::pkce::{Pkce, random_param};
use crate::token::{Token, TokenResponse};

const FORM: &str = "application/x-www-form-urlencoded";

/// Pre-encoded form values, sent exactly as the browser sends them.
const SCOPE_ENCODED: &str = "openid%20email";
const REDIRECT_URI_ENCODED: &str = "https%3A%2F%2Fwww.mlb.com%2Flogin";

/// Handshake step, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Interact,
    Introspect,
    Identify,
    Challenge,
    Answer,
    Token,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Interact => "interact",
            Step::Introspect => "introspect",
            Step::Identify => "identify",
            Step::Challenge => "challenge",
            Step::Answer => "answer",
            Step::Token => "token",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intermediate results of one login attempt. Each field is written by
/// exactly one step and read by the next.
#[derive(Debug, Default, Clone)]
pub struct AuthFlowState {
    pub(crate) pkce: Option<Pkce>,
    pub(crate) interaction_handle: Option<String>,
    pub(crate) introspect_handle: Option<String>,
    pub(crate) identify_handle: Option<String>,
    pub(crate) email_authenticator: Option<String>,
    pub(crate) password_authenticator: Option<String>,
    pub(crate) challenge_handle: Option<String>,
    pub(crate) answer_handle: Option<String>,
    pub(crate) interaction_code: Option<String>,
}

impl AuthFlowState {
    pub fn interaction_handle(&self) -> Option<&str> {
        self.interaction_handle.as_deref()
    }

    pub fn interaction_code(&self) -> Option<&str> {
        self.interaction_code.as_deref()
    }

    pub fn email_authenticator(&self) -> Option<&str> {
        self.email_authenticator.as_deref()
    }

    pub fn password_authenticator(&self) -> Option<&str> {
        self.password_authenticator.as_deref()
    }

    pub fn answer_handle(&self) -> Option<&str> {
        self.answer_handle.as_deref()
    }

    pub fn has_pkce(&self) -> bool {
        self.pkce.is_some()
    }
}

// Request bodies. Field order matters to nobody but is kept as the browser sends it.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectRequest<'a> {
    interaction_handle: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRequest<'a> {
    identifier: &'a str,
    state_handle: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeRequest<'a> {
    authenticator: AuthenticatorRef<'a>,
    state_handle: &'a str,
}

#[derive(Serialize)]
struct AuthenticatorRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest<'a> {
    credentials: Passcode<'a>,
    state_handle: &'a str,
}

#[derive(Serialize)]
struct Passcode<'a> {
    passcode: &'a str,
}

// Responses. Only the fields the next step needs.

#[derive(Deserialize)]
struct InteractResponse {
    interaction_handle: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateHandleResponse {
    state_handle: String,
}

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyResponse {
    state_handle: String,
    #[serde(default)]
    authenticators: Option<Collection<AuthenticatorEntry>>,
}

#[derive(Deserialize)]
struct AuthenticatorEntry {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerResponse {
    state_handle: String,
    #[serde(default)]
    success_with_interaction_code: Option<Collection<NamedValue>>,
}

#[derive(Deserialize)]
struct NamedValue {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Headers every identity request carries in addition to Accept/Content-Type.
pub(crate) fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
    headers.insert(header::ORIGIN, HeaderValue::from_static(ORIGIN));
    headers.insert(header::REFERER, HeaderValue::from_static(REFERER));
    headers.insert("priority", HeaderValue::from_static("u=1, i"));
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
    headers
}

/// HTTP client for one login attempt, with its own cookie jar.
pub fn identity_client(
    request_timeout: Duration,
    connect_timeout: Duration,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .user_agent(USER_AGENT)
        .default_headers(browser_headers())
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::Http(format!("building identity client: {e}")))
}

/// Shorten an opaque handle for logging: `abc...xyz`.
fn abbreviate(handle: &str) -> String {
    match (handle.get(..3), handle.len().checked_sub(3).and_then(|i| handle.get(i..))) {
        (Some(head), Some(tail)) if handle.len() > 8 => format!("{head}...{tail}"),
        _ => "***".to_string(),
    }
}

/// One login attempt.
pub struct IdentityFlow<'a> {
    client: reqwest::Client,
    endpoints: &'a IdentityEndpoints,
    credentials: &'a Credentials,
    state: AuthFlowState,
}

impl<'a> IdentityFlow<'a> {
    /// `client` should be dedicated to this attempt (it carries the
    /// identity provider's cookies between steps).
    pub fn new(
        client: reqwest::Client,
        endpoints: &'a IdentityEndpoints,
        credentials: &'a Credentials,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
            state: AuthFlowState::default(),
        }
    }

    pub fn state(&self) -> &AuthFlowState {
        &self.state
    }

    pub async fn interact(&mut self) -> Result<()> {
        let pkce = Pkce::generate();
        let body = format!(
            "client_id={CLIENT_ID}&scope={SCOPE_ENCODED}&redirect_uri={REDIRECT_URI_ENCODED}\
             &code_challenge={}&code_challenge_method=S256&state={}&nonce={}",
            pkce.challenge,
            random_param(),
            random_param(),
        );

        let response: InteractResponse = self
            .post(Step::Interact, &self.endpoints.interact, FORM, "application/json", body)
            .await?;

        info!(
            handle = %abbreviate(&response.interaction_handle),
            "obtained interaction handle"
        );
        self.state.pkce = Some(pkce);
        self.state.interaction_handle = Some(response.interaction_handle);
        Ok(())
    }

    pub async fn introspect(&mut self) -> Result<()> {
        if self.state.interaction_handle.is_none() {
            self.interact().await?;
        }
        let handle = required(
            &self.state.interaction_handle,
            Step::Introspect,
            "interaction handle",
        )?;
        let body = encode(
            Step::Introspect,
            &IntrospectRequest {
                interaction_handle: handle,
            },
        )?;

        let response: StateHandleResponse = self
            .post(Step::Introspect, &self.endpoints.introspect, ION_JSON, ION_JSON, body)
            .await?;

        info!(handle = %abbreviate(&response.state_handle), "obtained introspect state handle");
        self.state.introspect_handle = Some(response.state_handle);
        Ok(())
    }

    pub async fn identify(&mut self) -> Result<()> {
        if self.state.introspect_handle.is_none() {
            self.introspect().await?;
        }
        let handle = required(
            &self.state.introspect_handle,
            Step::Identify,
            "introspect state handle",
        )?;
        let body = encode(
            Step::Identify,
            &IdentifyRequest {
                identifier: self.credentials.username(),
                state_handle: handle,
            },
        )?;

        let response: IdentifyResponse = self
            .post(Step::Identify, &self.endpoints.identify, "application/json", OKTA_JSON, body)
            .await?;

        let mut email = None;
        let mut password = None;
        for entry in response.authenticators.map(|a| a.value).unwrap_or_default() {
            match entry.kind.as_str() {
                "email" if email.is_none() => email = Some(entry.id),
                "password" if password.is_none() => password = Some(entry.id),
                _ => {}
            }
            if email.is_some() && password.is_some() {
                break;
            }
        }

        let (Some(email), Some(password)) = (email, password) else {
            return Err(Error::protocol(
                Step::Identify,
                "email or password authenticator not offered; the login form may have changed",
            ));
        };

        debug!("identify offered email and password authenticators");
        self.state.identify_handle = Some(response.state_handle);
        self.state.email_authenticator = Some(email);
        self.state.password_authenticator = Some(password);
        Ok(())
    }

    pub async fn challenge(&mut self) -> Result<()> {
        if self.state.password_authenticator.is_none() || self.state.identify_handle.is_none() {
            self.identify().await?;
        }
        let authenticator = required(
            &self.state.password_authenticator,
            Step::Challenge,
            "password authenticator",
        )?;
        let handle = required(
            &self.state.identify_handle,
            Step::Challenge,
            "identify state handle",
        )?;
        let body = encode(
            Step::Challenge,
            &ChallengeRequest {
                authenticator: AuthenticatorRef { id: authenticator },
                state_handle: handle,
            },
        )?;

        let response: StateHandleResponse = self
            .post(Step::Challenge, &self.endpoints.challenge, "application/json", OKTA_JSON, body)
            .await?;

        self.state.challenge_handle = Some(response.state_handle);
        Ok(())
    }

    pub async fn answer(&mut self) -> Result<()> {
        if self.state.challenge_handle.is_none() {
            self.challenge().await?;
        }
        let handle = required(
            &self.state.challenge_handle,
            Step::Answer,
            "challenge state handle",
        )?;
        let body = encode(
            Step::Answer,
            &AnswerRequest {
                credentials: Passcode {
                    passcode: self.credentials.password(),
                },
                state_handle: handle,
            },
        )?;

        let response: AnswerResponse = self
            .post(Step::Answer, &self.endpoints.answer, "application/json", OKTA_JSON, body)
            .await?;

        let code = response
            .success_with_interaction_code
            .map(|c| c.value)
            .unwrap_or_default()
            .into_iter()
            .find(|v| v.name == "interaction_code")
            .and_then(|v| v.value.as_str().map(str::to_owned));

        let Some(code) = code else {
            return Err(Error::protocol(
                Step::Answer,
                "interaction code not found in response \
                 (wrong password, or an extra verification step)",
            ));
        };

        info!(code = %abbreviate(&code), "obtained interaction code");
        self.state.answer_handle = Some(response.state_handle);
        self.state.interaction_code = Some(code);
        Ok(())
    }

    /// Run whatever steps are still missing and exchange the interaction code
    /// for a token. Consumes the flow; the attempt's state goes with it.
    pub async fn token(mut self) -> Result<Token> {
        if self.state.interaction_code.is_none() {
            self.answer().await?;
        }
        let Some(pkce) = self.state.pkce.as_ref() else {
            return Err(Error::FlowOrder("code verifier is not set".into()));
        };
        let code = required(&self.state.interaction_code, Step::Token, "interaction code")?;
        let body = format!(
            "client_id={CLIENT_ID}&redirect_uri={REDIRECT_URI}&grant_type=interaction_code\
             &code_verifier={}&interaction_code={code}",
            pkce.verifier,
        );

        let issued_at = SystemTime::now();
        let response: TokenResponse = self
            .post(Step::Token, &self.endpoints.token, FORM, "application/json", body)
            .await?;

        info!(
            token_type = %response.token_type,
            expires_in_secs = response.expires_in,
            "obtained access token"
        );
        Ok(Token::from_response(response, issued_at))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        step: Step,
        url: &str,
        content_type: &str,
        accept: &str,
        body: String,
    ) -> Result<T> {
        debug!(%step, url, "sending identity request");
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT, accept)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(step, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::protocol(step, format!("{status}: {}", snippet(&body))));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| match e.is_timeout() {
                true => transport_error(step, e),
                false => Error::protocol(step, format!("unexpected response: {e}")),
            })
    }
}

fn required<'s>(field: &'s Option<String>, step: Step, what: &str) -> Result<&'s str> {
    field
        .as_deref()
        .ok_or_else(|| Error::FlowOrder(format!("{step} ran without {what}")))
}

fn encode<T: Serialize>(step: Step, body: &T) -> Result<String> {
    serde_json::to_string(body).map_err(|e| Error::protocol(step, format!("encoding request: {e}")))
}

fn transport_error(step: Step, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{step}: {e}"))
    } else {
        Error::Http(format!("{step}: {e}"))
    }
}

/// First 200 bytes of an error body, cut on a char boundary.
fn snippet(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
