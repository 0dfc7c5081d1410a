//! # Controller endpoint: where to dial and how to authenticate.
//!
//! [`ControlPlaneEndpoint`] is immutable once built. The host usually builds it
//! from the environment the orchestrator injects into the server process:
//!
//! | Variable                 | Required | Meaning                               |
//! |--------------------------|----------|---------------------------------------|
//! | `CONTROLLER_ADDRESS`     | yes      | URL of the controller (`http`/`https`) |
//! | `SERVER_TOKEN`           | yes      | bearer token identifying this server  |
//! | `CONTROLLER_CERTIFICATE` | no       | PEM CA certificate for TLS            |

use std::fmt;

use url::Url;

use crate::error::ConfigError;

pub const ADDRESS_VAR: &str = "CONTROLLER_ADDRESS";
pub const TOKEN_VAR: &str = "SERVER_TOKEN";
pub const CERTIFICATE_VAR: &str = "CONTROLLER_CERTIFICATE";

/// Immutable address and credentials of the fleet controller.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPlaneEndpoint {
    address: Url,
    token: String,
    certificate: Option<String>,
}

impl ControlPlaneEndpoint {
    /// Builds an endpoint; the address must use `http` or `https` and the token must be non-empty.
    pub fn new(
        address: Url,
        token: impl Into<String>,
        certificate: Option<String>,
    ) -> Result<Self, ConfigError> {
        if !matches!(address.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: ADDRESS_VAR,
                reason: format!("unsupported scheme `{}`", address.scheme()),
            });
        }
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: TOKEN_VAR,
                reason: "token is empty".to_string(),
            });
        }
        Ok(Self {
            address,
            token,
            certificate,
        })
    }

    /// Reads the endpoint from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the endpoint through an arbitrary variable lookup.
    ///
    /// # Example
    /// ```
    /// use fleetlink::ControlPlaneEndpoint;
    ///
    /// let ep = ControlPlaneEndpoint::from_lookup(|name| match name {
    ///     "CONTROLLER_ADDRESS" => Some("https://controller.internal:8080".into()),
    ///     "SERVER_TOKEN" => Some("secret".into()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert!(ep.uses_tls());
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(ADDRESS_VAR).ok_or(ConfigError::MissingVar { name: ADDRESS_VAR })?;
        let address = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
            name: ADDRESS_VAR,
            reason: e.to_string(),
        })?;
        let token = lookup(TOKEN_VAR).ok_or(ConfigError::MissingVar { name: TOKEN_VAR })?;
        let certificate = lookup(CERTIFICATE_VAR).filter(|pem| !pem.trim().is_empty());

        Self::new(address, token, certificate)
    }

    /// Controller URL.
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Bearer token sent as `authorization` metadata.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Optional PEM CA certificate.
    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    /// `true` for `https` addresses.
    pub fn uses_tls(&self) -> bool {
        self.address.scheme() == "https"
    }
}

impl fmt::Debug for ControlPlaneEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneEndpoint")
            .field("address", &self.address.as_str())
            .field("token", &"<redacted>")
            .field("certificate", &self.certificate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let ep = ControlPlaneEndpoint::from_lookup(lookup(&[
            (ADDRESS_VAR, "http://127.0.0.1:12892"),
            (TOKEN_VAR, "tok"),
            (CERTIFICATE_VAR, "-----BEGIN CERTIFICATE-----"),
        ]))
        .unwrap();
        assert_eq!(ep.address().as_str(), "http://127.0.0.1:12892/");
        assert_eq!(ep.token(), "tok");
        assert!(ep.certificate().is_some());
        assert!(!ep.uses_tls());
    }

    #[test]
    fn missing_address_is_reported() {
        let err = ControlPlaneEndpoint::from_lookup(lookup(&[(TOKEN_VAR, "tok")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar { name: ADDRESS_VAR });
    }

    #[test]
    fn missing_token_is_reported() {
        let err =
            ControlPlaneEndpoint::from_lookup(lookup(&[(ADDRESS_VAR, "http://localhost:1")]))
                .unwrap_err();
        assert_eq!(err, ConfigError::MissingVar { name: TOKEN_VAR });
    }

    #[test]
    fn rejects_bad_address_and_scheme() {
        let err = ControlPlaneEndpoint::from_lookup(lookup(&[
            (ADDRESS_VAR, "not a url"),
            (TOKEN_VAR, "tok"),
        ]))
        .unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");

        let err = ControlPlaneEndpoint::from_lookup(lookup(&[
            (ADDRESS_VAR, "ftp://controller"),
            (TOKEN_VAR, "tok"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: ADDRESS_VAR, .. }));
    }

    #[test]
    fn debug_redacts_token() {
        let ep = ControlPlaneEndpoint::new(
            Url::parse("https://controller").unwrap(),
            "super-secret",
            None,
        )
        .unwrap();
        let rendered = format!("{ep:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn blank_certificate_is_ignored() {
        let ep = ControlPlaneEndpoint::from_lookup(lookup(&[
            (ADDRESS_VAR, "https://controller"),
            (TOKEN_VAR, "tok"),
            (CERTIFICATE_VAR, "  "),
        ]))
        .unwrap();
        assert!(ep.certificate().is_none());
    }
}
