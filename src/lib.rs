// src/lib.rs

//! LTI 1.3 tool-provider plumbing: dynamic registration, the OIDC launch
//! handshake, signing keys, and platform service tokens.

mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod model;
pub mod store;

/// The public prelude for the `nila-lti` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::engine::{consumer_id, hash_id, Consumer, Engine, Session};
    pub use crate::error::{ErrorKind, NilaLtiError, StoreError};
    pub use crate::keys::{Claims, KeyManager, MemoryKeyManager};
    pub use crate::model::{
        AccessToken, AuthenticateRequest, AuthenticateResponse, LoginInit, Platform, Registration,
        RegistrationInit, ServiceRequest, Tool,
    };
    pub use crate::store::{MemoryStore, Store};
    pub use jsonwebtoken::Algorithm;
}
