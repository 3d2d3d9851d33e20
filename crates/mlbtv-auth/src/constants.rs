//! MLB identity provider constants
//!
//! The public web client registration used by www.mlb.com. None of these are
//! secrets; they identify the browser client whose login sequence is replayed.

/// Public OAuth client ID of the mlb.com web player
pub const CLIENT_ID: &str = "0oap7wa857jcvPlZ5355";

/// Authorization server (interact + token endpoints live under `/v1`)
pub const OAUTH_BASE: &str = "https://ids.mlb.com/oauth2/aus1m088yK07noBfh356";

/// Identity engine (introspect / identify / challenge / answer)
pub const IDX_BASE: &str = "https://ids.mlb.com/idp/idx";

/// Redirect URI registered for the web client. Sent form-encoded on interact
/// and raw on the token exchange, exactly as the browser does.
pub const REDIRECT_URI: &str = "https://www.mlb.com/login";

pub const ORIGIN: &str = "https://www.mlb.com";
pub const REFERER: &str = "https://www.mlb.com/login?redirectUri=/";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Content type the identity engine expects on introspect.
pub const ION_JSON: &str = "application/ion+json; okta-version=1.0.0";

/// Accept header for identify / challenge / answer.
pub const OKTA_JSON: &str = "application/json; okta-version=1.0.0";

/// Endpoint set for one identity provider.
///
/// `Default` points at production. Tests build one from a local mock's base URL.
#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    pub interact: String,
    pub introspect: String,
    pub identify: String,
    pub challenge: String,
    pub answer: String,
    pub token: String,
}

impl IdentityEndpoints {
    pub fn from_bases(oauth_base: &str, idx_base: &str) -> Self {
        let oauth = oauth_base.trim_end_matches('/');
        let idx = idx_base.trim_end_matches('/');
        Self {
            interact: format!("{oauth}/v1/interact"),
            introspect: format!("{idx}/introspect"),
            identify: format!("{idx}/identify"),
            challenge: format!("{idx}/challenge"),
            answer: format!("{idx}/challenge/answer"),
            token: format!("{oauth}/v1/token"),
        }
    }
}

impl Default for IdentityEndpoints {
    fn default() -> Self {
        Self::from_bases(OAUTH_BASE, IDX_BASE)
    }
}
