// src/engine/launch.rs

//! OIDC third-party initiated login and the resulting launch.

use super::{consumer_id, hash_id, registered_claims, Engine, Session, CUSTOM_CLAIM, MESSAGE_TYPE_CLAIM};
use crate::error::NilaLtiError;
use crate::keys::{numeric_claim, Claims};
use crate::model::{AuthenticateRequest, AuthenticateResponse, LoginInit};
use crate::store;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

/// Resolves where a launch goes: the custom parameter named after the
/// launch's message type.
pub fn target_link_uri(claims: &Claims) -> Result<String, NilaLtiError> {
    let message_type = claims
        .get(MESSAGE_TYPE_CLAIM)
        .and_then(|v| v.as_str())
        .ok_or_else(|| NilaLtiError::InvalidClaims("message_type claim missing".to_string()))?;
    claims
        .get(CUSTOM_CLAIM)
        .and_then(|v| v.as_object())
        .and_then(|custom| custom.get(message_type))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            NilaLtiError::InvalidClaims(format!("no target link uri for {message_type}"))
        })
}

impl Engine {
    /// Answers a login initiation with the platform authorization URL the
    /// user agent must be redirected to.
    ///
    /// Nothing is stored when the login targets a host other than the
    /// registered tool domain.
    #[instrument(skip(self, init), fields(iss = %init.iss, client_id = %init.client_id), err)]
    pub async fn authn(&self, provider_uri: &str, init: &LoginInit) -> Result<Url, NilaLtiError> {
        let consumer = self
            .find_consumer(&consumer_id(provider_uri, &init.iss, &init.client_id, &init.deployment_id))
            .await?;

        let target = Url::parse(&init.target_link_uri)
            .map_err(|e| NilaLtiError::InvalidUrl(format!("{}: {e}", init.target_link_uri)))?;
        let host = target.host_str().unwrap_or_default();
        if host != consumer.tool_domain() {
            return Err(NilaLtiError::DomainMismatch {
                expected: consumer.tool_domain().to_string(),
                actual: host.to_string(),
            });
        }

        let state = hash_id(&init.login_hint);
        let nonce = hash_id(&state);
        store::set_json(self.store.as_ref(), &state, init, Some(self.config.login_state_ttl())).await?;

        let request = AuthenticateRequest {
            scope: "openid".to_string(),
            response_type: "id_token".to_string(),
            client_id: init.client_id.clone(),
            redirect_uri: init.target_link_uri.clone(),
            login_hint: init.login_hint.clone(),
            lti_message_hint: init.lti_message_hint.clone(),
            state,
            response_mode: "form_post".to_string(),
            nonce,
            prompt: "none".to_string(),
        };

        let endpoint = &consumer.platform.authorization_endpoint;
        let mut redirect = Url::parse(endpoint)
            .map_err(|e| NilaLtiError::InvalidUrl(format!("{endpoint}: {e}")))?;
        let query = match redirect.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{}", request.encode()?),
            _ => request.encode()?,
        };
        redirect.set_query(Some(&query));
        debug!(state = %request.state, "Redirecting to platform authorization endpoint");
        Ok(redirect)
    }

    /// Verifies the platform's authentication response and opens a session
    /// that lives exactly as long as the id token.
    #[instrument(skip(self, response), err)]
    pub async fn authz(
        &self,
        provider_uri: &str,
        response: &AuthenticateResponse,
    ) -> Result<Session, NilaLtiError> {
        let init: LoginInit = store::get_json(self.store.as_ref(), &response.state).await?;
        if hash_id(&init.login_hint) != response.state {
            return Err(NilaLtiError::StateMismatch);
        }

        let consumer = self
            .find_consumer(&consumer_id(provider_uri, &init.iss, &init.client_id, &init.deployment_id))
            .await?;
        let claims = self.keys.verify(&response.id_token, &consumer.platform.jwks_uri).await?;

        let nonce = claims.get("nonce").and_then(|v| v.as_str());
        if nonce != Some(hash_id(&response.state).as_str()) {
            return Err(NilaLtiError::NonceMismatch);
        }

        let exp = numeric_claim(&claims, "exp")
            .ok_or_else(|| NilaLtiError::InvalidClaims("exp must be a number".to_string()))?;
        let remaining = exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Err(NilaLtiError::TokenExpired { exp });
        }

        let session = Session { id: Uuid::new_v4().to_string(), consumer, claims };
        store::set_json(
            self.store.as_ref(),
            &session.id,
            &session,
            Some(Duration::from_secs(remaining as u64)),
        )
        .await?;
        info!(session = %session.id, ttl = remaining, "Opened session");
        Ok(session)
    }

    /// Forwards the launch to the provider application and returns its
    /// response body.
    ///
    /// The provider receives the session's claims as a JSON body and a
    /// bearer token it can exchange with [`get_session`](Self::get_session).
    #[instrument(skip(self, session), fields(session = %session.id), err)]
    pub async fn launch(&self, session: &Session) -> Result<String, NilaLtiError> {
        let uri = target_link_uri(&session.claims)?;
        let claims = registered_claims(
            session.consumer.tool_domain(),
            &session.id,
            &uri,
            self.config.launch_token_ttl(),
            hash_id(&session.id),
        );
        let token = self.keys.sign(&claims, &session.consumer.id).await?;
        let body = serde_json::to_vec(&session.claims)?;

        let response = self
            .http_client
            .post(&uri)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "text/html")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        debug!(uri = %uri, status = %response.status(), "Launch forwarded");
        Ok(response.text().await?)
    }
}
