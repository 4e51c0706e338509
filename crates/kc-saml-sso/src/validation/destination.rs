//! Destination checking.
//!
//! A request's `Destination` must name the realm endpoint it arrived at.
//! Ports are compared after normalisation: an explicit port is taken as
//! written, a missing port is looked up in the known-protocols table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SamlError, SamlResult};

/// Mapping of URL scheme to the port the server answers on for that scheme
/// when a URL does not carry an explicit port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownProtocols(BTreeMap<String, u16>);

impl Default for KnownProtocols {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("http".to_string(), 80),
            ("https".to_string(), 443),
        ]))
    }
}

impl KnownProtocols {
    /// Creates an empty table.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds or replaces a mapping.
    #[must_use]
    pub fn with(mut self, scheme: impl Into<String>, port: u16) -> Self {
        self.0.insert(scheme.into().to_ascii_lowercase(), port);
        self
    }

    /// Parses `scheme=port` pairs separated by commas, e.g. `http=8180,https=8543`.
    pub fn parse(value: &str) -> SamlResult<Self> {
        let mut table = Self::empty();
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (scheme, port) = entry.split_once('=').ok_or_else(|| {
                SamlError::Configuration(format!("known protocol entry without port: {entry}"))
            })?;
            let port = port.trim().parse::<u16>().map_err(|e| {
                SamlError::Configuration(format!("invalid port in known protocol entry {entry}: {e}"))
            })?;
            table = table.with(scheme.trim(), port);
        }
        Ok(table)
    }

    /// Returns the port for a scheme.
    #[must_use]
    pub fn port(&self, scheme: &str) -> Option<u16> {
        self.0.get(&scheme.to_ascii_lowercase()).copied()
    }
}

impl fmt::Display for KnownProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.0.iter().map(|(s, p)| format!("{s}={p}")).collect();
        f.write_str(&entries.join(","))
    }
}

/// The realm endpoint and port table used for one validation.
///
/// Built per request from the current configuration; holding the table in
/// an `Arc` lets a reload swap it without affecting comparisons in flight.
#[derive(Debug, Clone)]
pub struct DestinationPolicy {
    endpoint: String,
    endpoint_url: Url,
    known_protocols: Arc<KnownProtocols>,
}

impl DestinationPolicy {
    /// Creates a policy for the given realm endpoint.
    pub fn new(endpoint: impl Into<String>, known_protocols: Arc<KnownProtocols>) -> SamlResult<Self> {
        let endpoint = endpoint.into();
        let endpoint_url = Url::parse(&endpoint)
            .map_err(|e| SamlError::Configuration(format!("invalid realm endpoint {endpoint}: {e}")))?;
        Ok(Self {
            endpoint,
            endpoint_url,
            known_protocols,
        })
    }

    /// The realm endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The port table.
    #[must_use]
    pub fn known_protocols(&self) -> &KnownProtocols {
        &self.known_protocols
    }
}

/// Compares a declared destination against a [`DestinationPolicy`].
pub struct DestinationValidator;

impl DestinationValidator {
    /// Checks `destination` against the policy endpoint.
    ///
    /// Scheme and host must match exactly, paths must match ignoring a
    /// trailing slash, and normalised ports must be equal. Query and fragment
    /// are not compared.
    pub fn validate(policy: &DestinationPolicy, destination: &str) -> SamlResult<()> {
        let mismatch = || SamlError::InvalidDestination {
            expected: policy.endpoint.clone(),
            actual: destination.to_string(),
        };

        let actual = Url::parse(destination).map_err(|_| mismatch())?;
        let expected = &policy.endpoint_url;

        if actual.scheme() != expected.scheme() {
            return Err(mismatch());
        }
        match (actual.host_str(), expected.host_str()) {
            (Some(a), Some(e)) if a == e => {}
            _ => return Err(mismatch()),
        }

        let known = policy.known_protocols.as_ref();
        let actual_port = normalized_port(destination, &actual, known);
        let expected_port = normalized_port(&policy.endpoint, expected, known);
        match (actual_port, expected_port) {
            (Some(a), Some(e)) if a == e => {}
            _ => return Err(mismatch()),
        }

        if actual.path().trim_end_matches('/') != expected.path().trim_end_matches('/') {
            return Err(mismatch());
        }

        Ok(())
    }
}

/// Explicit port if written, otherwise the known-protocols port for the scheme.
///
/// `Url::port` hides ports equal to the scheme default, so the raw text is
/// consulted to tell `http://h:80/` apart from `http://h/`.
fn normalized_port(raw: &str, url: &Url, known: &KnownProtocols) -> Option<u16> {
    if let Some(port) = url.port() {
        return Some(port);
    }
    if has_explicit_port(raw) {
        return url.port_or_known_default();
    }
    known.port(url.scheme())
}

fn has_explicit_port(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let after_host = match host_port.strip_prefix('[') {
        Some(v6) => v6.split_once(']').map_or("", |(_, tail)| tail),
        None => host_port.find(':').map_or("", |i| &host_port[i..]),
    };
    after_host
        .strip_prefix(':')
        .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}
