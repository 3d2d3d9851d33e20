//! Media gateway GraphQL documents
//!
//! The two mutations the mlb.com web player sends, with the variables it
//! sends, and typed views of the parts of the answers we use.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::session::{DeviceSession, Heartbeat, PlaybackGrant, StreamKey, parse_expiration};

pub const GRAPHQL_URL: &str = "https://media-gateway.mlb.com/graphql";

const INIT_SESSION: &str = "mutation initSession($device: InitSessionInput!, $clientType: ClientType!) {
    initSession(device: $device, clientType: $clientType) {
        deviceId
        sessionId
        entitlements {
            code
        }
        location {
            countryCode
            regionName
            zipCode
            latitude
            longitude
        }
        clientExperience
        features
    }
}";

const INIT_PLAYBACK_SESSION: &str = "mutation initPlaybackSession(
    $adCapabilities: [AdExperienceType]
    $mediaId: String!
    $deviceId: String!
    $sessionId: String!
    $quality: PlaybackQuality
    $playbackCapabilities: PlaybackCapabilities
) {
    initPlaybackSession(
        adCapabilities: $adCapabilities
        mediaId: $mediaId
        deviceId: $deviceId
        sessionId: $sessionId
        quality: $quality
        playbackCapabilities: $playbackCapabilities
    ) {
        playbackSessionId
        playback {
            url
            token
            expiration
            cdn
        }
        adScenarios {
            adParamsObj
            adScenarioType
            adExperienceType
        }
        adExperience {
            adExperienceTypes
            adEngineIdentifiers {
                name
                value
            }
            adsEnabled
        }
        heartbeatInfo {
            url
            interval
        }
        trackingObj
    }
}";

/// `knownDeviceId` is the previous device id, or empty on first start.
pub fn init_session_request(known_device_id: &str) -> Value {
    json!({
        "operationName": "initSession",
        "query": INIT_SESSION,
        "variables": {
            "clientType": "WEB",
            "device": {
                "appVersion": "8.1.0",
                "deviceFamily": "desktop",
                "knownDeviceId": known_device_id,
                "languagePreference": "ENGLISH",
                "manufacturer": "Google Inc.",
                "model": "",
                "os": "windows",
                "osVersion": "10",
            },
        },
    })
}

pub fn init_playback_session_request(key: &StreamKey, device: &DeviceSession) -> Value {
    json!({
        "operationName": "initPlaybackSession",
        "query": INIT_PLAYBACK_SESSION,
        "variables": {
            "adCapabilities": ["GOOGLE_STANDALONE_AD_PODS"],
            "deviceId": device.device_id,
            "mediaId": key.media_id(),
            "playbackCapabilities": {},
            "quality": "PLACEHOLDER",
            "sessionId": device.session_id,
        },
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitSession {
    device_id: String,
    session_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitPlaybackSession {
    #[serde(default)]
    playback_session_id: Option<String>,
    playback: Playback,
    #[serde(default)]
    ad_scenarios: Value,
    #[serde(default)]
    ad_experience: Value,
    #[serde(default)]
    heartbeat_info: Option<HeartbeatInfo>,
}

#[derive(Deserialize)]
struct Playback {
    url: String,
    #[serde(default)]
    expiration: Value,
    #[serde(default)]
    cdn: Option<String>,
}

#[derive(Deserialize)]
struct HeartbeatInfo {
    url: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

/// A non-empty top-level `errors` member, if present.
pub fn errors(response: &Value) -> Option<&Value> {
    response
        .get("errors")
        .filter(|e| !e.is_null() && e.as_array().is_none_or(|a| !a.is_empty()))
}

fn data<'a>(response: &'a Value, field: &str) -> Result<&'a Value> {
    response
        .get("data")
        .and_then(|d| d.get(field))
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Gateway(format!("response has no data.{field}")))
}

pub fn parse_device_session(response: &Value) -> Result<DeviceSession> {
    let session: InitSession = serde_json::from_value(data(response, "initSession")?.clone())
        .map_err(|e| Error::Gateway(format!("unexpected initSession shape: {e}")))?;
    Ok(DeviceSession {
        device_id: session.device_id,
        session_id: session.session_id,
    })
}

pub fn parse_playback_grant(response: &Value) -> Result<PlaybackGrant> {
    let session: InitPlaybackSession =
        serde_json::from_value(data(response, "initPlaybackSession")?.clone())
            .map_err(|e| Error::Gateway(format!("unexpected initPlaybackSession shape: {e}")))?;

    Ok(PlaybackGrant {
        manifest_url: session.playback.url,
        playback_session_id: session.playback_session_id,
        expiration: parse_expiration(&session.playback.expiration),
        cdn: session.playback.cdn,
        ad_metadata: json!({
            "adScenarios": session.ad_scenarios,
            "adExperience": session.ad_experience,
        }),
        heartbeat: session.heartbeat_info.and_then(|h| {
            h.url.map(|url| Heartbeat {
                url,
                interval: h.interval,
            })
        }),
    })
}
