//! Response bodies from the platform and the IdP token endpoint.

use std::fmt;

use serde::{Deserialize, Deserializer};

/// Envelope returned by the platform's authenticator and login endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthnResponse<D> {
    pub success: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<D>,
}

/// `data` of a successful authenticator response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorResponseData {
    pub sso_url: String,
    pub token_url: String,
}

/// Response of the IdP token endpoint.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpTokenResponse {
    pub cookie_token: String,
}

impl fmt::Debug for IdpTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpTokenResponse")
            .field("cookie_token", &"****")
            .finish()
    }
}

/// Error body returned by the IdP token endpoint on rejected credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpErrorResponse {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_summary: Option<String>,
}

/// `data` of a successful login response.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub master_token: Option<String>,
    #[serde(default)]
    pub validity_in_seconds: Option<u64>,
    #[serde(default)]
    pub master_validity_in_seconds: Option<u64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_info: Option<SessionInfo>,
}

impl fmt::Debug for LoginResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponseData")
            .field("token", &self.token.as_ref().map(|_| "****"))
            .field("master_token", &self.master_token.as_ref().map(|_| "****"))
            .field("validity_in_seconds", &self.validity_in_seconds)
            .field("master_validity_in_seconds", &self.master_validity_in_seconds)
            .field("session_id", &self.session_id)
            .field("session_info", &self.session_info)
            .finish()
    }
}

/// Session defaults the platform resolved for this login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
}

/// Servers send `code` as either a JSON string or a number.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
    )
}
