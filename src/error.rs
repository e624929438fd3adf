// src/error.rs

use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Errors raised by a [`Store`](crate::store::Store) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key was never written, was deleted, or its TTL elapsed.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The backend itself failed (connection, protocol, ...).
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Coarse classification of a [`NilaLtiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or configuration.
    Validation,
    /// A trust check failed: signature, state, session binding, token lifetime.
    Trust,
    /// A remote endpoint could not be reached or answered with an error.
    Transport,
    /// The state store failed or a stored value could not be (de)serialized.
    Storage,
    /// Signing key material could not be generated, loaded or used.
    Key,
}

/// The primary error type for the `nila-lti` library.
#[derive(Debug, Error)]
pub enum NilaLtiError {
    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The provider URI does not resolve to a DNS-style host.
    #[error("Invalid provider uri {0}, host missing")]
    InvalidProviderUri(String),

    /// A declared target link points at a different host than the provider.
    #[error("Host mismatch: provider {provider} declared target {target}")]
    HostMismatch { provider: String, target: String },

    /// A login targets a host other than the registered tool domain.
    #[error("Domain mismatch: {expected} != {actual}")]
    DomainMismatch { expected: String, actual: String },

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Claims required by an operation are missing or of the wrong shape.
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// The HTTP method of a service request is not a valid token.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The algorithm in the JWT header is not an RSA algorithm.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    /// The JWT header is missing the required 'kid' (Key ID) field.
    #[error("The JWT header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// The token signature does not verify against the key set.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The state returned by the platform does not match the login it claims to answer.
    #[error("Invalid state")]
    StateMismatch,

    /// The id token's `nonce` is not the one issued for its login state.
    #[error("Nonce mismatch")]
    NonceMismatch,

    /// A bearer token is not bound to the session it references.
    #[error("Unauthorized")]
    Unauthorized,

    /// The token expired (after applying the clock skew).
    #[error("Token expired at {exp}")]
    TokenExpired { exp: i64 },

    /// The token's `nbf` lies in the future (after applying the clock skew).
    #[error("Token not valid before {nbf}")]
    TokenNotYetValid { nbf: i64 },

    /// A key with the specified 'kid' was not found in the JSON Web Key Set.
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),

    /// Errors originating from the `jsonwebtoken` crate during token validation.
    #[error("JWT validation error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The remote JSON Web Key Set could not be fetched or parsed.
    #[error("Key set at {uri} is unavailable: {reason}")]
    KeySetUnavailable { uri: String, reason: String },

    /// The platform token endpoint rejected the client-credentials grant.
    #[error("Token request failed {status} {body}")]
    TokenRequestFailed { status: u16, body: String },

    /// The state store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A value could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value could not be encoded as a query string.
    #[error("Query encoding error: {0}")]
    QueryEncoding(#[from] serde_urlencoded::ser::Error),

    /// A signing key could not be generated.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A cryptographic key (e.g., PEM, JWK) is malformed or invalid.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// An error occurred during the generation of a new token.
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
}

impl NilaLtiError {
    /// Returns the error class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_)
            | Self::InvalidProviderUri(_)
            | Self::HostMismatch { .. }
            | Self::DomainMismatch { .. }
            | Self::MissingConfiguration(_)
            | Self::InvalidConfiguration(_)
            | Self::InvalidClaims(_)
            | Self::InvalidMethod(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::MissingKeyId => ErrorKind::Validation,
            Self::InvalidSignature
            | Self::StateMismatch
            | Self::NonceMismatch
            | Self::Unauthorized
            | Self::TokenExpired { .. }
            | Self::TokenNotYetValid { .. }
            | Self::KeyNotFound(_)
            | Self::Jwt(_) => ErrorKind::Trust,
            Self::HttpError(_) | Self::KeySetUnavailable { .. } | Self::TokenRequestFailed { .. } => {
                ErrorKind::Transport
            }
            Self::Store(_) | Self::Serialization(_) | Self::QueryEncoding(_) => ErrorKind::Storage,
            Self::KeyGeneration(_) | Self::InvalidKeyFormat(_) | Self::TokenGeneration(_) => {
                ErrorKind::Key
            }
        }
    }

    /// True when the error is a timeout of an outbound call, which callers may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::HttpError(e) if e.is_timeout())
    }
}
