// src/engine/registration.rs

//! LTI Dynamic Registration: discover the platform, describe the tool,
//! submit it, and persist the resulting consumer.

use super::{consumer_id, Consumer, Engine};
use crate::error::NilaLtiError;
use crate::model::{LtiMessage, Platform, Registration, RegistrationInit, Tool};
use crate::store;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};
use url::Url;

const ROLE_PREFIX: &str = "https://purl.imsglobal.org/vocab/lis/v2/membership#";

static DEFAULT_SCOPE: Lazy<String> = Lazy::new(|| {
    [
        "openid",
        "https://purl.imsglobal.org/spec/lti-reg/scope/registration.readonly",
        "https://purl.imsglobal.org/spec/lti-reg/scope/registration",
        "https://purl.imsglobal.org/spec/lti-gs/scope/contextgroup.readonly",
        "https://purl.imsglobal.org/spec/lti-nrps/scope/contextmembership.readonly",
        "https://purl.imsglobal.org/spec/lti-ags/scope/lineitem",
        "https://purl.imsglobal.org/spec/lti-ags/scope/result",
        "https://purl.imsglobal.org/spec/lti-ags/scope/score",
        "https://purl.imsglobal.org/spec/lti-ts/scope/toolsetting",
    ]
    .join(" ")
});

static DEFAULT_CLAIMS: &[&str] = &["iss", "sub", "aud", "name", "email", "locale"];

static DEFAULT_MESSAGES: Lazy<Vec<LtiMessage>> = Lazy::new(|| {
    let message = |message_type: &str, label: &str, roles: &[&str]| LtiMessage {
        message_type: message_type.to_string(),
        label: label.to_string(),
        roles: roles.iter().map(|r| format!("{ROLE_PREFIX}{r}")).collect(),
        ..Default::default()
    };
    vec![
        message("LtiResourceLinkRequest", "Global Settings", &["Administrator"]),
        message("LtiDeepLinkingRequest", "Settings", &["Administrator", "Instructor"]),
        message("LtiResourceLinkRequest", "Launch", &["Learner", "Student"]),
        message("LtiStartProctoring", "Launch", &["Learner", "Student"]),
    ]
});

fn parse_url(raw: &str) -> Result<Url, NilaLtiError> {
    Url::parse(raw).map_err(|e| NilaLtiError::InvalidUrl(format!("{raw}: {e}")))
}

/// Stamps this service's endpoints and the fixed protocol values onto `tool`.
///
/// `service_url` is the public base URL of this service and `provider_uri`
/// the host (optionally with a path) of the application being exposed.
/// Every message is routed through this service's launch endpoint; the
/// target it originally declared is kept in the tool's custom parameters
/// under the message type, so a launch can be forwarded to it.
///
/// A message without a declared target falls back to the tool-level
/// `target_link_uri`, and failing that to `https://{provider_uri}/lti/launch`,
/// which the provider application is then expected to serve.
///
/// Custom parameters keyed by a message type are reserved for these
/// targets: provider-supplied ones must point at the provider host and are
/// replaced by the value derived here.
pub fn normalize_tool_config(
    service_url: &str,
    provider_uri: &str,
    mut tool: Tool,
) -> Result<Tool, NilaLtiError> {
    let service = parse_url(service_url)?;
    let service_host = service
        .host_str()
        .ok_or_else(|| NilaLtiError::InvalidUrl(format!("{service_url}: host missing")))?
        .to_string();

    let provider_url = format!("https://{provider_uri}");
    let provider = Url::parse(&provider_url)
        .map_err(|_| NilaLtiError::InvalidProviderUri(provider_uri.to_string()))?;
    let provider_host = match provider.host_str() {
        Some(host) if host.contains('.') => host.to_string(),
        _ => return Err(NilaLtiError::InvalidProviderUri(provider_uri.to_string())),
    };

    let same_host = |target: &str| -> Result<(), NilaLtiError> {
        let url = parse_url(target)?;
        if url.host_str() != Some(provider_host.as_str()) {
            return Err(NilaLtiError::HostMismatch {
                provider: provider_host.clone(),
                target: target.to_string(),
            });
        }
        Ok(())
    };

    let fallback_target = if tool.lti.target_link_uri.is_empty() {
        format!("{}/lti/launch", provider_url.trim_end_matches('/'))
    } else {
        same_host(&tool.lti.target_link_uri)?;
        tool.lti.target_link_uri.clone()
    };

    let base = service.as_str().trim_end_matches('/');
    let jwks_uri = format!("{base}/jwks/{provider_uri}");
    let login_uri = format!("{base}/login/{provider_uri}");
    let launch_uri = format!("{base}/launch/{provider_uri}");

    tool.application_type = "web".to_string();
    tool.response_types = vec!["id_token".to_string()];
    tool.grant_types = vec!["client_credentials".to_string(), "implicit".to_string()];
    tool.redirect_uris = vec![login_uri.clone(), launch_uri.clone()];
    tool.jwks_uri = jwks_uri;
    // Only this service's keys may sign for the tool.
    tool.jwks = None;
    tool.initiate_login_uri = login_uri;
    tool.token_endpoint_auth_method = "private_key_jwt".to_string();
    tool.id_token_signed_response_alg = "RS256".to_string();
    if tool.client_name.is_empty() {
        tool.client_name = provider_host.clone();
    }
    if tool.client_uri.is_empty() {
        tool.client_uri = provider_url.clone();
    }
    if tool.scope.trim().is_empty() {
        tool.scope = DEFAULT_SCOPE.clone();
    }

    tool.lti.domain = service_host;
    tool.lti.target_link_uri = launch_uri.clone();
    if tool.lti.claims.is_empty() {
        tool.lti.claims = DEFAULT_CLAIMS.iter().map(|c| c.to_string()).collect();
    }
    if tool.lti.messages.is_empty() {
        tool.lti.messages = DEFAULT_MESSAGES.clone();
    }

    let message_types: HashSet<String> = tool
        .lti
        .messages
        .iter()
        .chain(DEFAULT_MESSAGES.iter())
        .map(|m| m.message_type.clone())
        .collect();
    let check_routes = |params: &BTreeMap<String, Value>| -> Result<(), NilaLtiError> {
        for (key, value) in params.iter().filter(|(k, _)| message_types.contains(k.as_str())) {
            let target = value.as_str().ok_or_else(|| {
                NilaLtiError::InvalidConfiguration(format!("custom parameter {key} must be a URL"))
            })?;
            same_host(target)?;
        }
        Ok(())
    };
    check_routes(&tool.lti.custom_parameters)?;
    for message in &tool.lti.messages {
        check_routes(&message.custom_parameters)?;
    }

    let mut routed = HashSet::new();
    for message in tool.lti.messages.iter_mut() {
        let original = if message.target_link_uri.is_empty() {
            fallback_target.clone()
        } else {
            same_host(&message.target_link_uri)?;
            std::mem::take(&mut message.target_link_uri)
        };
        // The first message of a type decides where that type is forwarded.
        if routed.insert(message.message_type.clone()) {
            tool.lti
                .custom_parameters
                .insert(message.message_type.clone(), Value::String(original));
        }
        message.target_link_uri = launch_uri.clone();
    }

    tool.validate()?;
    Ok(tool)
}

impl Engine {
    /// Fetches and validates the platform's OpenID configuration.
    #[instrument(skip(self, token), err)]
    pub async fn get_platform_config(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<Platform, NilaLtiError> {
        let mut request = self.http_client.get(endpoint);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        let platform: Platform = request.send().await?.error_for_status()?.json().await?;
        platform.validate(Some(endpoint))?;
        debug!(issuer = %platform.issuer, "Fetched platform configuration");
        Ok(platform)
    }

    /// Builds the tool configuration exposing `provider_uri` through this service.
    ///
    /// The provider may publish a partial tool document at
    /// `https://{provider_uri}/.well-known/openid_configuration`; if it can't
    /// be fetched, an empty document is normalized instead.
    #[instrument(skip(self), err)]
    pub async fn load_tool_config(
        &self,
        service_url: &str,
        provider_uri: &str,
    ) -> Result<Tool, NilaLtiError> {
        let discovery = format!("https://{provider_uri}/.well-known/openid_configuration");
        let tool = match self.fetch_tool_document(&discovery).await {
            Ok(tool) => tool,
            Err(e) => {
                warn!(uri = %discovery, error = %e, "Provider tool document unavailable. Using defaults.");
                Tool::default()
            }
        };
        normalize_tool_config(service_url, provider_uri, tool)
    }

    async fn fetch_tool_document(&self, uri: &str) -> Result<Tool, NilaLtiError> {
        Ok(self.http_client.get(uri).send().await?.error_for_status()?.json().await?)
    }

    /// Submits the tool configuration to the platform's registration endpoint.
    #[instrument(skip(self, token, tool), err)]
    pub async fn post_tool_config(
        &self,
        registration_endpoint: &str,
        token: &str,
        tool: &Tool,
    ) -> Result<Registration, NilaLtiError> {
        let mut request = self.http_client.post(registration_endpoint).json(tool);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        let registration: Registration = request.send().await?.error_for_status()?.json().await?;
        debug!(client_id = %registration.client_id, "Platform accepted tool configuration");
        Ok(registration)
    }

    /// Persists the consumer for `provider_uri`. Registering the same
    /// identity again replaces the previous consumer.
    #[instrument(skip(self, platform, registration), err)]
    pub async fn store_registration(
        &self,
        provider_uri: &str,
        platform: &Platform,
        registration: &Registration,
    ) -> Result<Consumer, NilaLtiError> {
        if platform.issuer.is_empty() {
            return Err(NilaLtiError::MissingConfiguration("issuer".to_string()));
        }
        if registration.client_id.is_empty() {
            return Err(NilaLtiError::MissingConfiguration("client_id".to_string()));
        }
        let consumer = Consumer {
            id: consumer_id(
                provider_uri,
                &platform.issuer,
                &registration.client_id,
                &registration.tool.lti.deployment_id,
            ),
            registration: registration.clone(),
            platform: platform.clone(),
        };
        store::set_json(self.store.as_ref(), &consumer.id, &consumer, None).await?;
        info!(consumer = %consumer.id, "Stored registration");
        Ok(consumer)
    }

    /// Runs the whole dynamic registration for `provider_uri`.
    #[instrument(skip(self, init), err)]
    pub async fn register(
        &self,
        service_url: &str,
        provider_uri: &str,
        init: &RegistrationInit,
    ) -> Result<Consumer, NilaLtiError> {
        let platform = self.get_platform_config(&init.endpoint, &init.token).await?;
        let tool = self.load_tool_config(service_url, provider_uri).await?;
        let registration = self
            .post_tool_config(&platform.registration_endpoint, &init.token, &tool)
            .await?;
        self.store_registration(provider_uri, &platform, &registration).await
    }
}
