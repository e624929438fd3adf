// src/engine/mod.rs

//! The LTI protocol engine.
//!
//! `Engine` orchestrates the five protocol stages on top of a [`Store`]
//! and a [`KeyManager`]:
//!
//! 1. dynamic registration ([`registration`]),
//! 2. login initiation and 3. authentication response ([`launch`]),
//! 4. launch ([`launch`]),
//! 5. service-token exchange and service calls ([`services`]).
//!
//! The engine keeps no state of its own between calls; everything lives in
//! the store.

pub mod launch;
pub mod registration;
pub mod services;

use crate::config::Config;
use crate::error::NilaLtiError;
use crate::keys::{Claims, KeyManager};
use crate::model::{Platform, Registration};
use crate::store::{self, Store};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub(crate) const MESSAGE_TYPE_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/message_type";
pub(crate) const CUSTOM_CLAIM: &str = "https://purl.imsglobal.org/spec/lti/claim/custom";

/// A trusted platform + tool pairing, the outcome of a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    /// See [`consumer_id`].
    pub id: String,
    pub registration: Registration,
    pub platform: Platform,
}

impl Consumer {
    /// Host name this service answers launches on.
    pub fn tool_domain(&self) -> &str {
        &self.registration.tool.lti.domain
    }

    /// Client id the platform assigned to the tool.
    pub fn client_id(&self) -> &str {
        &self.registration.client_id
    }
}

/// An authenticated launch, valid until the platform's id token expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub consumer: Consumer,
    /// Verified claims of the platform's id token.
    pub claims: Claims,
}

/// Deterministic, non-reversible identifier derived from `s` (UUID v5, OID namespace).
///
/// Used for the login `state`, its `nonce`, and the `jti` binding a signed
/// token to a session id.
pub fn hash_id(s: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, s.as_bytes()).to_string()
}

/// Store key of a consumer. Lookups must compose it exactly like this.
pub fn consumer_id(provider_uri: &str, issuer: &str, client_id: &str, deployment_id: &str) -> String {
    format!("{} {} {} {}", provider_uri, issuer, client_id, deployment_id)
}

/// Builds the registered claim set of a token this service mints.
pub(crate) fn registered_claims(
    issuer: &str,
    subject: &str,
    audience: &str,
    lifetime: Duration,
    jti: String,
) -> Claims {
    let now = Utc::now().timestamp();
    let mut claims = Claims::new();
    claims.insert("iss".into(), issuer.into());
    claims.insert("sub".into(), subject.into());
    claims.insert("aud".into(), audience.into());
    claims.insert("iat".into(), now.into());
    claims.insert("exp".into(), (now + lifetime.as_secs() as i64).into());
    claims.insert("jti".into(), jti.into());
    claims
}

/// The protocol engine. Cheap to share behind an `Arc`.
pub struct Engine {
    store: Arc<dyn Store>,
    keys: Arc<dyn KeyManager>,
    http_client: reqwest::Client,
    config: Config,
}

impl Engine {
    /// Creates an engine over the given collaborators.
    ///
    /// Every outbound call made by the engine is bounded by
    /// `config.http_timeout_seconds`.
    pub fn new(
        store: Arc<dyn Store>,
        keys: Arc<dyn KeyManager>,
        config: Config,
    ) -> Result<Self, NilaLtiError> {
        config.validate()?;
        let http_client = reqwest::Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self { store, keys, http_client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Loads a registered consumer by its composite id.
    pub async fn find_consumer(&self, id: &str) -> Result<Consumer, NilaLtiError> {
        store::get_json(self.store.as_ref(), id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_id_is_deterministic_and_distinct() {
        let state = hash_id("login-hint-1");
        assert_eq!(state, hash_id("login-hint-1"));
        assert_ne!(state, hash_id("login-hint-2"));
        assert!(Uuid::parse_str(&state).is_ok());
        // The nonce is derived from the state, not from the hint.
        assert_ne!(hash_id(&state), state);
    }

    #[test]
    fn consumer_id_joins_all_four_parts() {
        assert_eq!(
            consumer_id("example.edu", "https://example.edu", "cid", "d1"),
            "example.edu https://example.edu cid d1"
        );
    }

    #[test]
    fn registered_claims_cover_lifetime() {
        let claims = registered_claims("tool.test", "s1", "https://a.test", Duration::from_secs(60), "j".into());
        let iat = claims["iat"].as_i64().unwrap();
        assert_eq!(claims["exp"].as_i64().unwrap() - iat, 60);
        assert_eq!(claims["aud"], "https://a.test");
        assert_eq!(claims["jti"], "j");
    }
}
