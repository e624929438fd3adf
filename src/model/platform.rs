// src/model/platform.rs

use crate::error::NilaLtiError;
use serde::{Deserialize, Serialize};
use url::Url;

/// An LTI platform's OpenID configuration.
///
/// <https://www.imsglobal.org/spec/lti-dr/v1p0#platform-configuration>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Platform {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registration_endpoint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_modes_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub id_token_encryption_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub id_token_encryption_enc_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub userinfo_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub userinfo_encryption_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub userinfo_encryption_enc_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_object_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_object_encryption_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_object_encryption_enc_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub token_endpoint_auth_signing_alg_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub display_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claim_types_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claims_supported: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_documentation: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claims_locales_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ui_locales_supported: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub claims_parameter_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub request_parameter_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub request_uri_parameter_supported: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub require_request_uri_registration: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub op_policy_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub op_tos_uri: String,
    #[serde(rename = "https://purl.imsglobal.org/spec/lti-platform-configuration")]
    pub lti: LtiPlatformConfiguration,
}

/// <https://www.imsglobal.org/spec/lti-dr/v1p0#lti-configuration>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LtiPlatformConfiguration {
    pub product_family_code: String,
    pub version: String,
    pub messages_supported: Vec<MessageSupported>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSupported {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn require(values: &[String], wanted: &str, field: &str) -> Result<(), NilaLtiError> {
    if values.iter().any(|v| v == wanted) {
        Ok(())
    } else {
        Err(NilaLtiError::InvalidConfiguration(format!("{field} must contain {wanted}")))
    }
}

/// True when `url` has the issuer's origin and lies under the issuer's path.
fn served_by_issuer(issuer: &str, url: &str) -> bool {
    let (Ok(issuer), Ok(url)) = (Url::parse(issuer), Url::parse(url)) else {
        return false;
    };
    let base = issuer.path().trim_end_matches('/');
    issuer.origin() == url.origin()
        && (url.path() == base || url.path().starts_with(&format!("{base}/")))
}

impl Platform {
    /// Checks the platform supports what this tool needs.
    ///
    /// `registration_url` is the configuration URL received during dynamic
    /// registration; when given, it must share the issuer's origin (scheme,
    /// host and port) and sit under the issuer's path.
    pub fn validate(&self, registration_url: Option<&str>) -> Result<(), NilaLtiError> {
        require(
            &self.token_endpoint_auth_methods_supported,
            "private_key_jwt",
            "token_endpoint_auth_methods_supported",
        )?;
        require(
            &self.token_endpoint_auth_signing_alg_values_supported,
            "RS256",
            "token_endpoint_auth_signing_alg_values_supported",
        )?;
        require(&self.scopes_supported, "openid", "scopes_supported")?;
        require(&self.response_types_supported, "id_token", "response_types_supported")?;
        require(
            &self.id_token_signing_alg_values_supported,
            "RS256",
            "id_token_signing_alg_values_supported",
        )?;
        if let Some(url) = registration_url {
            if !served_by_issuer(&self.issuer, url) {
                return Err(NilaLtiError::InvalidConfiguration(format!(
                    "registration url {url} is not served by issuer {}",
                    self.issuer
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn capable_platform() -> Platform {
        Platform {
            issuer: "https://example.edu".into(),
            token_endpoint_auth_methods_supported: strings(&["private_key_jwt"]),
            token_endpoint_auth_signing_alg_values_supported: strings(&["RS256", "ES256"]),
            scopes_supported: strings(&["openid"]),
            response_types_supported: strings(&["id_token"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
            ..Default::default()
        }
    }

    #[test]
    fn capable_platform_validates() {
        let platform = capable_platform();
        assert!(platform.validate(None).is_ok());
        assert!(platform
            .validate(Some("https://example.edu/.well-known/openid-configuration"))
            .is_ok());
    }

    #[test]
    fn missing_capability_is_rejected() {
        let mut platform = capable_platform();
        platform.token_endpoint_auth_methods_supported = strings(&["client_secret_basic"]);
        let err = platform.validate(None).unwrap_err();
        assert!(err.to_string().contains("private_key_jwt"));
    }

    #[test]
    fn registration_url_must_belong_to_issuer() {
        let platform = capable_platform();
        assert!(matches!(
            platform.validate(Some("https://evil.test/.well-known/openid-configuration")),
            Err(NilaLtiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn issuer_prefix_alone_does_not_match() {
        let platform = capable_platform();
        for url in [
            "https://example.edu.attacker.test/.well-known/openid-configuration",
            "https://example.edu:8443/.well-known/openid-configuration",
            "http://example.edu/.well-known/openid-configuration",
        ] {
            assert!(
                matches!(platform.validate(Some(url)), Err(NilaLtiError::InvalidConfiguration(_))),
                "{url} must be rejected"
            );
        }

        let mut scoped = capable_platform();
        scoped.issuer = "https://example.edu/moodle".into();
        assert!(scoped.validate(Some("https://example.edu/moodle/lti/config")).is_ok());
        assert!(scoped.validate(Some("https://example.edu/moodle2/lti/config")).is_err());
    }

    #[test]
    fn lti_block_uses_the_ims_claim_name() {
        let platform: Platform = serde_json::from_str(
            r#"{"issuer":"https://example.edu","https://purl.imsglobal.org/spec/lti-platform-configuration":{"product_family_code":"moodle","version":"4.1","messages_supported":[{"type":"LtiResourceLinkRequest"}]}}"#,
        )
        .unwrap();
        assert_eq!(platform.lti.product_family_code, "moodle");
        assert_eq!(platform.lti.messages_supported[0].message_type, "LtiResourceLinkRequest");
    }
}
