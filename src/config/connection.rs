use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::validation::require_https;

/// Connection properties for a federated login to the platform.
///
/// `authenticator` is the declared IdP base URL (e.g. `https://acme.okta.com`).
/// Every SSO and token URL the platform hands back must share its origin.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Platform account identifier.
    pub account: String,

    /// Login name, sent to the IdP and the platform.
    pub user: String,

    /// IdP password. Prefer `${VAR}` interpolation over a literal.
    pub password: String,

    /// Platform host name (no scheme, no port).
    pub host: String,

    /// Platform URL scheme.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Platform port. Defaults to the scheme's well-known port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Timeout in seconds for requests sent to the platform itself.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Declared IdP base URL.
    pub authenticator: String,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default)]
    pub warehouse: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Application name reported in the client environment.
    #[serde(default)]
    pub application: Option<String>,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_connection_timeout() -> u64 {
    300
}

impl ConnectionConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("account", &self.account),
            ("user", &self.user),
            ("password", &self.password),
            ("host", &self.host),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "connection.{name} must not be empty"
                )));
            }
        }

        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "connection.scheme must be http or https, got '{}'",
                self.scheme
            )));
        }

        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "connection.connection_timeout_secs must be greater than 0".into(),
            ));
        }

        require_https(&self.authenticator).map_err(|e| {
            ConfigError::Validation(format!(
                "connection.authenticator must be an https IdP URL: {e}"
            ))
        })?;

        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"****")
            .field("host", &self.host)
            .field("scheme", &self.scheme)
            .field("port", &self.port)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("authenticator", &self.authenticator)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("application", &self.application)
            .finish()
    }
}
