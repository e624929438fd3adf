// src/model/mod.rs

//! Wire-level documents exchanged with platforms and tools.
//!
//! Field names follow the IMS LTI 1.3 / LTI Dynamic Registration and
//! OpenID Connect specifications, so every struct (de)serializes to the
//! exact shape the remote side expects.

pub mod platform;
pub mod tool;

use crate::error::NilaLtiError;
use serde::{Deserialize, Serialize};

pub use platform::{LtiPlatformConfiguration, MessageSupported, Platform};
pub use tool::{LtiMessage, LtiToolConfiguration, Registration, Tool};

/// A third-party initiated login, sent by the platform to the tool's login URL.
///
/// <https://imsglobal.org/spec/security/v1p0/#platform-originating-messages>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginInit {
    pub iss: String,
    pub login_hint: String,
    pub target_link_uri: String,
    pub lti_message_hint: String,
    pub client_id: String,
    #[serde(rename = "lti_deployment_id")]
    pub deployment_id: String,
}

/// The authentication request the tool redirects the user agent with.
///
/// <https://imsglobal.org/spec/security/v1p0/#step-2-authentication-request>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub scope: String,
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub login_hint: String,
    pub lti_message_hint: String,
    pub state: String,
    pub response_mode: String,
    pub nonce: String,
    pub prompt: String,
}

impl AuthenticateRequest {
    /// Encodes the request as an `application/x-www-form-urlencoded` query string.
    pub fn encode(&self) -> Result<String, NilaLtiError> {
        Ok(serde_urlencoded::to_string(self)?)
    }
}

/// The platform's form post back to the tool's launch URL.
///
/// <https://imsglobal.org/spec/security/v1p0/#step-3-authentication-response>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticateResponse {
    pub state: String,
    pub id_token: String,
}

/// A token endpoint response for the client-credentials grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessToken {
    #[serde(rename = "access_token")]
    pub token: String,
    pub token_type: String,
    /// Seconds as a number on most platforms, but some send a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<serde_json::Value>,
    pub scope: String,
}

/// A caller-described call to a platform service (AGS, NRPS, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRequest {
    pub scope: String,
    pub method: String,
    pub content_type: String,
    pub accept: String,
    pub endpoint: String,
    /// Sent verbatim as the request body; `null` sends no body.
    pub body: serde_json::Value,
}

/// The registration initiation request a platform opens in the tool's UI.
///
/// <https://www.imsglobal.org/spec/lti-dr/v1p0#step-1-registration-initiation-request>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationInit {
    #[serde(rename = "openid_configuration")]
    pub endpoint: String,
    #[serde(rename = "registration_token")]
    pub token: String,
}
