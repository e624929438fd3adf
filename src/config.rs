// src/config.rs

use crate::error::NilaLtiError;
use serde::Deserialize;
use std::time::Duration;

/// Runtime settings shared by the [`Engine`](crate::engine::Engine) and the
/// [`MemoryKeyManager`](crate::keys::MemoryKeyManager).
///
/// Every field has a default matching the protocol's fixed constants, so
/// `Config::default()` is a working configuration. Values are stored in
/// seconds so the struct can be deserialized straight from a config file.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Upper bound for every outbound HTTP call.
    pub http_timeout_seconds: u64,
    /// How long a pending login (the `state` entry) stays in the store.
    pub login_state_ttl_seconds: u64,
    /// Lifetime of the token minted for a launch.
    pub launch_token_ttl_seconds: u64,
    /// Lifetime of the private-key-JWT client assertion.
    pub client_assertion_ttl_seconds: u64,
    /// Positive clock skew: the verifier's "now" is moved forward by this much.
    pub clock_skew_seconds: u64,
    /// Cache lifetime of a remote key set when the response carries no `max-age`.
    pub jwks_cache_ttl_seconds: u64,
    /// Modulus size of lazily generated signing keys.
    pub signing_key_bits: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 60,
            login_state_ttl_seconds: 60,
            launch_token_ttl_seconds: 2 * 60 * 60,
            client_assertion_ttl_seconds: 60 * 60,
            clock_skew_seconds: 20,
            jwks_cache_ttl_seconds: 5 * 60,
            signing_key_bits: 4096,
        }
    }
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn login_state_ttl(&self) -> Duration {
        Duration::from_secs(self.login_state_ttl_seconds)
    }

    pub fn launch_token_ttl(&self) -> Duration {
        Duration::from_secs(self.launch_token_ttl_seconds)
    }

    pub fn client_assertion_ttl(&self) -> Duration {
        Duration::from_secs(self.client_assertion_ttl_seconds)
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    /// Checks that the values make sense together.
    pub fn validate(&self) -> Result<(), NilaLtiError> {
        if self.http_timeout_seconds == 0 {
            return Err(NilaLtiError::InvalidConfiguration(
                "http_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        // A zero TTL would make the pending login durable.
        if self.login_state_ttl_seconds == 0 {
            return Err(NilaLtiError::InvalidConfiguration(
                "login_state_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.launch_token_ttl_seconds == 0 || self.client_assertion_ttl_seconds == 0 {
            return Err(NilaLtiError::InvalidConfiguration(
                "token lifetimes must be greater than zero".to_string(),
            ));
        }
        if self.signing_key_bits < 2048 {
            return Err(NilaLtiError::InvalidConfiguration(format!(
                "signing_key_bits must be at least 2048, got {}",
                self.signing_key_bits
            )));
        }
        Ok(())
    }
}

/// A builder for creating a `Config` instance.
///
/// Starts from [`Config::default`]; `build` validates the result.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout applied to every outbound HTTP call.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout_seconds = timeout.as_secs();
        self
    }

    /// Sets how long a pending login is kept.
    pub fn login_state_ttl(mut self, ttl: Duration) -> Self {
        self.config.login_state_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn launch_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.launch_token_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn client_assertion_ttl(mut self, ttl: Duration) -> Self {
        self.config.client_assertion_ttl_seconds = ttl.as_secs();
        self
    }

    /// Sets the positive clock skew used during verification.
    /// Defaults to 20 seconds.
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.config.clock_skew_seconds = skew.as_secs();
        self
    }

    /// Sets the fallback cache TTL for remote key sets.
    pub fn jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.jwks_cache_ttl_seconds = ttl.as_secs();
        self
    }

    /// Sets the RSA modulus size for generated signing keys.
    /// Defaults to 4096.
    pub fn signing_key_bits(mut self, bits: usize) -> Self {
        self.config.signing_key_bits = bits;
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a value is out of range.
    pub fn build(self) -> Result<Config, NilaLtiError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
