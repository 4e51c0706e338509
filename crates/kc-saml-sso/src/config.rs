//! SAML protocol configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::validation::KnownProtocols;

/// Settings for the SAML SSO endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlProtocolConfig {
    /// Scheme to port table used when a destination has no explicit port.
    pub known_protocols: Arc<KnownProtocols>,

    /// HTTP status returned when a request is rejected.
    pub rejection_status: u16,

    /// Maximum length of a POSTed `SAMLRequest` field.
    pub max_post_request_size: usize,

    /// Maximum length of a `SAMLRequest` query parameter.
    pub max_redirect_request_size: usize,

    /// Maximum size of a decoded request document.
    pub max_inflated_size: usize,
}

impl Default for SamlProtocolConfig {
    fn default() -> Self {
        Self {
            known_protocols: Arc::new(KnownProtocols::default()),
            rejection_status: 500,
            max_post_request_size: 512 * 1024,
            max_redirect_request_size: 64 * 1024,
            max_inflated_size: 1024 * 1024,
        }
    }
}

impl SamlProtocolConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `KC_SAML_KNOWN_PROTOCOLS` | `http=80,https=443` |
    /// | `KC_SAML_REJECTION_STATUS` | `500` |
    /// | `KC_SAML_MAX_POST_SIZE` | `524288` |
    /// | `KC_SAML_MAX_REDIRECT_SIZE` | `65536` |
    /// | `KC_SAML_MAX_INFLATED_SIZE` | `1048576` |
    pub fn from_env() -> SamlResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> SamlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let known_protocols = match lookup("KC_SAML_KNOWN_PROTOCOLS") {
            Some(value) => Arc::new(KnownProtocols::parse(&value)?),
            None => defaults.known_protocols,
        };

        let rejection_status =
            parse_var(&lookup, "KC_SAML_REJECTION_STATUS")?.unwrap_or(defaults.rejection_status);
        if !(400..=599).contains(&rejection_status) {
            return Err(SamlError::Configuration(format!(
                "KC_SAML_REJECTION_STATUS must be a 4xx or 5xx status, got {rejection_status}"
            )));
        }

        Ok(Self {
            known_protocols,
            rejection_status,
            max_post_request_size: parse_var(&lookup, "KC_SAML_MAX_POST_SIZE")?
                .unwrap_or(defaults.max_post_request_size),
            max_redirect_request_size: parse_var(&lookup, "KC_SAML_MAX_REDIRECT_SIZE")?
                .unwrap_or(defaults.max_redirect_request_size),
            max_inflated_size: parse_var(&lookup, "KC_SAML_MAX_INFLATED_SIZE")?
                .unwrap_or(defaults.max_inflated_size),
        })
    }

    /// Replaces the known-protocols table.
    #[must_use]
    pub fn with_known_protocols(mut self, known_protocols: KnownProtocols) -> Self {
        self.known_protocols = Arc::new(known_protocols);
        self
    }

    /// Sets the rejection status.
    #[must_use]
    pub const fn with_rejection_status(mut self, status: u16) -> Self {
        self.rejection_status = status;
        self
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> SamlResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| SamlError::Configuration(format!("invalid {key}={value}: {e}")))
        })
        .transpose()
}
