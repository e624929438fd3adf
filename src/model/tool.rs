// src/model/tool.rs

use crate::error::NilaLtiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tool's OpenID client metadata plus its LTI configuration.
///
/// <https://www.imsglobal.org/spec/lti-dr/v1p0#tool-configuration>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tool {
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grant_types: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub application_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logo_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub policy_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tos_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sector_identifier_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subject_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_token_signed_response_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_token_encrypted_response_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_token_encrypted_response_enc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub userinfo_signed_response_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub userinfo_encrypted_response_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub userinfo_encrypted_response_enc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_object_signing_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_object_encryption_alg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_object_encryption_enc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token_endpoint_auth_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token_endpoint_auth_signing_alg: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub default_max_age: i64,
    #[serde(skip_serializing_if = "is_false")]
    pub require_auth_time: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_acr_values: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub initiate_login_uri: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_uris: Vec<String>,
    pub scope: String,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti-tool-configuration")]
    pub lti: LtiToolConfiguration,
}

/// <https://www.imsglobal.org/spec/lti-dr/v1p0#lti-configuration-0>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LtiToolConfiguration {
    pub domain: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_domains: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub deployment_id: String,
    pub target_link_uri: String,
    /// Substituted by the platform into the launch's custom claim.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub messages: Vec<LtiMessage>,
    pub claims: Vec<String>,
}

/// <https://www.imsglobal.org/spec/lti-dr/v1p0#lti-message>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LtiMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_link_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon_uri: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// The tool configuration as accepted by the platform, with the client id it assigned.
///
/// <https://www.imsglobal.org/spec/lti-dr/v1p0#tool-configuration-from-the-platform>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registration {
    #[serde(flatten)]
    pub tool: Tool,
    pub client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registration_client_uri: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Tool {
    /// Checks the fixed protocol values a registered tool must carry.
    pub fn validate(&self) -> Result<(), NilaLtiError> {
        if self.application_type != "web" {
            return Err(NilaLtiError::InvalidConfiguration(
                "application_type must be web".to_string(),
            ));
        }
        let has_grant = |g: &str| self.grant_types.iter().any(|x| x == g);
        if !(has_grant("client_credentials") && has_grant("implicit")) {
            return Err(NilaLtiError::InvalidConfiguration(
                "grant_types must contain client_credentials and implicit".to_string(),
            ));
        }
        if !self.scope.split_whitespace().any(|s| s == "openid") {
            return Err(NilaLtiError::InvalidConfiguration("scope must contain openid".to_string()));
        }
        if !self.response_types.iter().any(|r| r == "id_token") {
            return Err(NilaLtiError::InvalidConfiguration(
                "response_types must contain id_token".to_string(),
            ));
        }
        if self.token_endpoint_auth_method != "private_key_jwt" {
            return Err(NilaLtiError::InvalidConfiguration(
                "token_endpoint_auth_method must be private_key_jwt".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_flattens_the_tool_document() {
        let registration: Registration = serde_json::from_value(json!({
            "client_id": "abc",
            "redirect_uris": ["https://tool.test/login/x"],
            "scope": "openid",
            "https://purl.imsglobal.org/spec/lti-tool-configuration": {
                "domain": "tool.test",
                "deployment_id": "d1",
                "target_link_uri": "https://tool.test/launch/x",
                "messages": [{"type": "LtiResourceLinkRequest"}],
                "claims": ["iss"]
            }
        }))
        .unwrap();
        assert_eq!(registration.client_id, "abc");
        assert_eq!(registration.tool.lti.deployment_id, "d1");
        assert_eq!(registration.tool.lti.messages[0].message_type, "LtiResourceLinkRequest");

        let back = serde_json::to_value(&registration).unwrap();
        assert_eq!(back["client_id"], "abc");
        assert_eq!(back["https://purl.imsglobal.org/spec/lti-tool-configuration"]["domain"], "tool.test");
        assert!(back.get("logo_uri").is_none());
    }

    #[test]
    fn empty_tool_fails_validation() {
        assert!(matches!(Tool::default().validate(), Err(NilaLtiError::InvalidConfiguration(_))));
    }
}
