// src/engine/services.rs

//! Calls made by, or on behalf of, the provider application once a
//! session exists.

use super::{hash_id, registered_claims, Engine, Session};
use crate::error::NilaLtiError;
use crate::keys::Claims;
use crate::model::{AccessToken, ServiceRequest};
use crate::store;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use tracing::{debug, instrument, warn};

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

impl Engine {
    /// Returns this service's public key set for `provider_uri`.
    pub async fn json_web_keys(&self, provider_uri: &str) -> Result<Vec<u8>, NilaLtiError> {
        self.keys.public_key_set(provider_uri).await
    }

    /// Resolves the session a launch token was minted for.
    ///
    /// `jwks_uri` is where this service's own key set is published. The
    /// token's `jti` must be the one derived from the session id it names.
    #[instrument(skip(self, token), err)]
    pub async fn get_session(&self, jwks_uri: &str, token: &str) -> Result<Session, NilaLtiError> {
        let claims = self.keys.verify(token, jwks_uri).await?;
        let session_id = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NilaLtiError::InvalidClaims("sub must be a string".to_string()))?;
        let session: Session = store::get_json(self.store.as_ref(), session_id).await?;

        let jti = claims.get("jti").and_then(|v| v.as_str());
        if jti != Some(hash_id(&session.id).as_str()) {
            warn!(session = %session.id, "Token is not bound to the session it names");
            return Err(NilaLtiError::Unauthorized);
        }
        Ok(session)
    }

    /// Exchanges a signed client assertion for a platform access token
    /// (client-credentials grant with `private_key_jwt`).
    #[instrument(skip(self, session, request), fields(session = %session.id, scope = %request.scope), err)]
    pub async fn get_access_token(
        &self,
        session: &Session,
        request: &ServiceRequest,
    ) -> Result<AccessToken, NilaLtiError> {
        let consumer = &session.consumer;
        let token_endpoint = &consumer.platform.token_endpoint;
        let assertion = registered_claims(
            consumer.tool_domain(),
            consumer.client_id(),
            token_endpoint,
            self.config.client_assertion_ttl(),
            hash_id(&session.id),
        );
        let assertion = self.keys.sign(&assertion, &consumer.id).await?;

        let form = [
            ("grant_type", "client_credentials"),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("scope", request.scope.as_str()),
        ];
        let response = self.http_client.post(token_endpoint).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NilaLtiError::TokenRequestFailed { status: status.as_u16(), body });
        }
        let token: AccessToken = response.json().await?;
        debug!(token_type = %token.token_type, "Obtained access token");
        Ok(token)
    }

    /// Performs the described call against a platform service.
    ///
    /// An empty method means `GET`; a `null` body sends no body.
    #[instrument(skip(self, token, request), fields(method = %request.method, endpoint = %request.endpoint), err)]
    pub async fn send_service_request(
        &self,
        token: &AccessToken,
        request: &ServiceRequest,
    ) -> Result<(), NilaLtiError> {
        let method = if request.method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(request.method.as_bytes())
                .map_err(|_| NilaLtiError::InvalidMethod(request.method.clone()))?
        };

        let mut builder = self
            .http_client
            .request(method, &request.endpoint)
            .bearer_auth(&token.token);
        if !request.content_type.is_empty() {
            builder = builder.header(CONTENT_TYPE, &request.content_type);
        }
        if !request.accept.is_empty() {
            builder = builder.header(ACCEPT, &request.accept);
        }
        if !request.body.is_null() {
            builder = builder.body(serde_json::to_vec(&request.body)?);
        }

        let response = builder.send().await?.error_for_status()?;
        debug!(status = %response.status(), "Service request completed");
        Ok(())
    }

    /// Signs a caller-supplied claim set under the session's consumer key.
    #[instrument(skip(self, session, claims), fields(session = %session.id), err)]
    pub async fn sign_jwt(&self, session: &Session, claims: &[u8]) -> Result<String, NilaLtiError> {
        let claims: Claims = serde_json::from_slice(claims)?;
        self.keys.sign(&claims, &session.consumer.id).await
    }
}
