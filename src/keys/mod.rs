// src/keys/mod.rs

//! Signing keys, the published key set, and verification of inbound tokens.

pub mod jwks;
pub mod model;

use crate::config::Config;
use crate::error::NilaLtiError;
use async_trait::async_trait;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use data_encoding::BASE32;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, EncodingKey, Header, Validation};
use jwks::JwksClient;
use model::{JsonWebKey, JsonWebKeySet};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// A JWT claim set: an arbitrary JSON object.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Owns the signing keys and verifies tokens issued by others.
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Returns the JSON-encoded public key set.
    async fn public_key_set(&self, id: &str) -> Result<Vec<u8>, NilaLtiError>;

    /// Signs `claims` with RS256 under the key bound to `id`, creating the key on first use.
    async fn sign(&self, claims: &Claims, id: &str) -> Result<String, NilaLtiError>;

    /// Verifies `token` against the key set at `jwks_uri` and returns its claims.
    async fn verify(&self, token: &str, jwks_uri: &str) -> Result<Claims, NilaLtiError>;
}

struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public_jwk: JsonWebKey,
}

impl SigningKey {
    fn from_private_key(private_key: &RsaPrivateKey) -> Result<Self, NilaLtiError> {
        // `jsonwebtoken` takes RSA keys most reliably as PKCS#1 DER.
        let pkcs1_der = private_key.to_pkcs1_der().map_err(|e| {
            NilaLtiError::InvalidKeyFormat(format!("Failed to convert RSA key to PKCS#1 DER: {}", e))
        })?;
        let encoding_key = EncodingKey::from_rsa_der(pkcs1_der.as_bytes());

        let public_key = private_key.to_public_key();
        let spki_der = public_key.to_public_key_der().map_err(|e| {
            NilaLtiError::InvalidKeyFormat(format!("Failed to encode RSA public key: {}", e))
        })?;
        let kid = key_id(spki_der.as_bytes());

        let public_jwk = JsonWebKey {
            kid: kid.clone(),
            kty: "RSA".to_string(),
            use_purpose: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be())),
        };

        Ok(Self { kid, encoding_key, public_jwk })
    }
}

/// Derives a key id from a DER-encoded SubjectPublicKeyInfo.
///
/// The first 30 bytes of the SHA-256 digest, base32-encoded and split into
/// colon-separated groups of four characters.
pub fn key_id(public_key_der: &[u8]) -> String {
    let digest = Sha256::digest(public_key_der);
    encode_key_id(&digest[..30])
}

fn encode_key_id(bytes: &[u8]) -> String {
    let encoded = BASE32.encode(bytes);
    let encoded = encoded.trim_end_matches('=');
    let groups = encoded.len() / 4;
    if groups < 2 {
        return encoded.to_string();
    }
    let mut out = String::with_capacity(encoded.len() + groups);
    for i in 0..groups - 1 {
        out.push_str(&encoded[i * 4..i * 4 + 4]);
        out.push(':');
    }
    // The last group absorbs any remainder.
    out.push_str(&encoded[(groups - 1) * 4..]);
    out
}

/// Reads a numeric claim, accepting integer or floating point encodings.
pub(crate) fn numeric_claim(claims: &Claims, name: &str) -> Option<i64> {
    claims
        .get(name)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

/// Checks `exp` and `nbf` with the verifier's clock moved forward by `skew`.
///
/// The shift tolerates a remote clock running ahead of ours but shortens
/// the usable lifetime of every token by `skew`.
pub(crate) fn check_lifetime(claims: &Claims, skew: Duration) -> Result<(), NilaLtiError> {
    let now = Utc::now().timestamp() + skew.as_secs() as i64;
    let exp = numeric_claim(claims, "exp")
        .ok_or_else(|| NilaLtiError::InvalidClaims("exp must be a number".to_string()))?;
    if exp <= now {
        return Err(NilaLtiError::TokenExpired { exp });
    }
    if let Some(nbf) = numeric_claim(claims, "nbf") {
        if nbf > now {
            return Err(NilaLtiError::TokenNotYetValid { nbf });
        }
    }
    Ok(())
}

/// Process-local [`KeyManager`].
///
/// Private keys live only as long as the process unless they are loaded
/// with [`import_key`](Self::import_key) or [`load_pem_file`](Self::load_pem_file).
/// Every key, whatever identifier it is bound to, is published in the one
/// shared public key set.
pub struct MemoryKeyManager {
    keys: RwLock<HashMap<String, Arc<SigningKey>>>,
    jwks_client: JwksClient,
    key_bits: usize,
    clock_skew: Duration,
}

impl MemoryKeyManager {
    /// Creates a key manager with no keys.
    pub fn new(config: &Config) -> Result<Self, NilaLtiError> {
        config.validate()?;
        let http_client = reqwest::Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self {
            keys: RwLock::new(HashMap::new()),
            jwks_client: JwksClient::new(http_client, config.jwks_cache_ttl()),
            key_bits: config.signing_key_bits,
            clock_skew: Duration::from_secs(config.clock_skew_seconds),
        })
    }

    /// Binds an existing private key to `id`, replacing any key it had.
    /// Returns the derived key id.
    pub async fn import_key(
        &self,
        id: &str,
        private_key: &RsaPrivateKey,
    ) -> Result<String, NilaLtiError> {
        let key = Arc::new(SigningKey::from_private_key(private_key)?);
        let kid = key.kid.clone();
        self.keys.write().await.insert(id.to_string(), key);
        info!(id = %id, kid = %kid, "Imported signing key");
        Ok(kid)
    }

    /// Loads a PKCS#8 or PKCS#1 PEM private key file and binds it to `id`.
    pub async fn load_pem_file(&self, id: &str, path: &Path) -> Result<String, NilaLtiError> {
        let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
            NilaLtiError::InvalidKeyFormat(format!(
                "Failed to read RSA private key file from {:?}: {}",
                path, e
            ))
        })?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .map_err(|e| {
                NilaLtiError::InvalidKeyFormat(format!("Failed to parse RSA private key PEM: {}", e))
            })?;
        self.import_key(id, &private_key).await
    }

    /// Returns the key bound to `id`, generating one on first use.
    async fn signing_key(&self, id: &str) -> Result<Arc<SigningKey>, NilaLtiError> {
        if let Some(key) = self.keys.read().await.get(id) {
            return Ok(key.clone());
        }

        debug!(id = %id, bits = self.key_bits, "No signing key yet. Generating.");
        let bits = self.key_bits;
        let private_key = tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits))
            .await
            .map_err(|e| NilaLtiError::KeyGeneration(e.to_string()))?
            .map_err(|e| NilaLtiError::KeyGeneration(e.to_string()))?;
        let generated = Arc::new(SigningKey::from_private_key(&private_key)?);

        // Generation ran without the lock; if another signer won the race,
        // its key is kept and ours is dropped unpublished.
        let mut keys = self.keys.write().await;
        let key = keys
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(id = %id, kid = %generated.kid, "Generated signing key");
                generated
            })
            .clone();
        Ok(key)
    }
}

#[async_trait]
impl KeyManager for MemoryKeyManager {
    async fn public_key_set(&self, id: &str) -> Result<Vec<u8>, NilaLtiError> {
        let keys = self.keys.read().await;
        let mut set = JsonWebKeySet {
            keys: keys.values().map(|k| k.public_jwk.clone()).collect(),
        };
        set.keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        debug!(id = %id, keys = set.keys.len(), "Publishing key set");
        Ok(serde_json::to_vec(&set)?)
    }

    #[instrument(skip(self, claims), err)]
    async fn sign(&self, claims: &Claims, id: &str) -> Result<String, NilaLtiError> {
        let key = self.signing_key(id).await?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());
        encode(&header, claims, &key.encoding_key)
            .map_err(|e| NilaLtiError::TokenGeneration(e.to_string()))
    }

    #[instrument(skip(self, token), err)]
    async fn verify(&self, token: &str, jwks_uri: &str) -> Result<Claims, NilaLtiError> {
        let header = decode_header(token)?;
        if !matches!(
            header.alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ) {
            return Err(NilaLtiError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(NilaLtiError::MissingKeyId)?;
        let decoding_key = self.jwks_client.get_key(jwks_uri, &kid).await?;

        // Temporal claims are checked below with the skewed clock.
        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => NilaLtiError::InvalidSignature,
                _ => NilaLtiError::Jwt(e),
            }
        })?;

        check_lifetime(&token_data.claims, self.clock_skew)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn key_id_is_grouped_base32() {
        assert_eq!(
            encode_key_id(&[0u8; 30]),
            "AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA:AAAA"
        );
        let kid = key_id(b"some public key");
        assert_eq!(kid.len(), 48 + 11);
        assert_eq!(kid, key_id(b"some public key"));
        assert_ne!(kid, key_id(b"another public key"));
        assert!(kid
            .split(':')
            .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))));
    }

    #[test]
    fn short_inputs_are_not_split() {
        // 2 bytes -> 4 base32 characters after trimming padding.
        assert_eq!(encode_key_id(&[0u8; 2]), "AAAA");
    }

    #[test]
    fn lifetime_applies_positive_skew() {
        let now = Utc::now().timestamp();
        let skew = Duration::from_secs(20);

        assert!(check_lifetime(&claims(json!({"exp": now + 120})), skew).is_ok());
        // Still valid by the wall clock, but inside the skew window.
        assert!(matches!(
            check_lifetime(&claims(json!({"exp": now + 10})), skew),
            Err(NilaLtiError::TokenExpired { .. })
        ));
        assert!(matches!(
            check_lifetime(&claims(json!({"exp": now - 30})), skew),
            Err(NilaLtiError::TokenExpired { .. })
        ));
        // The same skew lets a slightly early nbf through.
        assert!(check_lifetime(&claims(json!({"exp": now + 120, "nbf": now + 10})), skew).is_ok());
        assert!(matches!(
            check_lifetime(&claims(json!({"exp": now + 120, "nbf": now + 60})), skew),
            Err(NilaLtiError::TokenNotYetValid { .. })
        ));
    }

    #[test]
    fn numeric_claims_accept_floats() {
        let c = claims(json!({"exp": 1700000000.5, "sub": "x"}));
        assert_eq!(numeric_claim(&c, "exp"), Some(1700000000));
        assert_eq!(numeric_claim(&c, "sub"), None);
        assert_eq!(numeric_claim(&c, "nbf"), None);
    }
}
