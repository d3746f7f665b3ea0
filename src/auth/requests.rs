//! Request payloads for the four network calls of a federated login.
//!
//! The builders only package values from the session and the flow; they do no
//! validation and no I/O. [`LoginRequest`] is the closed set of requests the
//! flow sends, and [`LoginRequest::into_wire`] turns one into a [`WireRequest`].

use std::{fmt, time::Duration};

use http::{HeaderMap, HeaderValue, Method, header};
use serde::Serialize;
use url::Url;

use super::{session::SessionContext, transport::redacted_url};

/// Fixed relay state sent with the SSO request.
pub const RELAY_STATE: &str = "/some/deep/link";

/// Timeout for the credential exchange with the IdP token endpoint.
pub const IDP_TOKEN_TIMEOUT: Duration = Duration::from_secs(16);

pub const CLIENT_APP_ID: &str = env!("CARGO_PKG_NAME");
pub const CLIENT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A fully resolved HTTP request, ready for an [`HttpTransport`](super::HttpTransport).
///
/// `timeout = None` means the request may wait indefinitely.
#[derive(Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireRequest")
            .field("method", &self.method)
            .field("url", &redacted_url(&self.url))
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| "****"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client metadata reported to the platform as `CLIENT_ENVIRONMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientEnvironment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub os: String,
    pub os_arch: String,
    pub runtime: String,
}

impl ClientEnvironment {
    pub fn detect(application: Option<String>) -> Self {
        Self {
            application,
            os: std::env::consts::OS.to_string(),
            os_arch: std::env::consts::ARCH.to_string(),
            runtime: "rust".to_string(),
        }
    }
}

/// Platform requests wrap their payload in a `data` object.
#[derive(Debug, Serialize)]
struct RequestEnvelope<'a, T> {
    data: &'a T,
}

/// Body of the authenticator request (step 1).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AuthenticatorRequestData {
    pub account_name: String,
    pub authenticator: String,
    pub client_app_id: String,
    pub client_app_version: String,
    pub client_environment: ClientEnvironment,
}

impl AuthenticatorRequestData {
    pub fn new(session: &SessionContext, idp_base_url: &Url) -> Self {
        Self {
            account_name: session.account().to_string(),
            authenticator: idp_base_url.as_str().trim_end_matches('/').to_string(),
            client_app_id: CLIENT_APP_ID.to_string(),
            client_app_version: CLIENT_APP_VERSION.to_string(),
            client_environment: session.client_environment().clone(),
        }
    }
}

/// Credentials posted to the IdP token endpoint (step 3).
#[derive(Clone, Serialize)]
pub struct IdpTokenRequest {
    pub username: String,
    pub password: String,
}

impl IdpTokenRequest {
    pub fn new(session: &SessionContext) -> Self {
        Self {
            username: session.user().to_string(),
            password: session.password().to_string(),
        }
    }
}

impl fmt::Debug for IdpTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpTokenRequest")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Body of the final login request carrying the raw SAML page (step 6).
#[derive(Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SamlLoginRequestData {
    pub login_name: String,
    pub password: String,
    pub account_name: String,
    pub client_app_id: String,
    pub client_app_version: String,
    pub client_environment: ClientEnvironment,
    pub raw_saml_response: String,
}

impl SamlLoginRequestData {
    pub fn new(session: &SessionContext, raw_saml_response: String) -> Self {
        Self {
            login_name: session.user().to_string(),
            password: session.password().to_string(),
            account_name: session.account().to_string(),
            client_app_id: CLIENT_APP_ID.to_string(),
            client_app_version: CLIENT_APP_VERSION.to_string(),
            client_environment: session.client_environment().clone(),
            raw_saml_response,
        }
    }
}

impl fmt::Debug for SamlLoginRequestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamlLoginRequestData")
            .field("login_name", &self.login_name)
            .field("password", &"****")
            .field("account_name", &self.account_name)
            .field("client_app_id", &self.client_app_id)
            .field("client_app_version", &self.client_app_version)
            .field("client_environment", &self.client_environment)
            .field("raw_saml_response_len", &self.raw_saml_response.len())
            .finish()
    }
}

/// Every request the flow sends, one variant per network call.
#[derive(Clone)]
pub enum LoginRequest {
    /// POST to the platform's authenticator endpoint.
    Authenticator {
        url: Url,
        data: AuthenticatorRequestData,
        timeout: Duration,
    },
    /// POST of username and password to the IdP token endpoint.
    IdpToken { url: Url, body: IdpTokenRequest },
    /// GET of the IdP SSO page using the one-time token.
    SsoAssertion { url: Url, one_time_token: String },
    /// POST of the raw SAML page to the platform's login endpoint.
    SamlLogin {
        url: Url,
        data: SamlLoginRequestData,
        timeout: Duration,
    },
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginRequest::Authenticator { url, data, timeout } => f
                .debug_struct("Authenticator")
                .field("url", url)
                .field("data", data)
                .field("timeout", timeout)
                .finish(),
            LoginRequest::IdpToken { url, body } => f
                .debug_struct("IdpToken")
                .field("url", url)
                .field("body", body)
                .finish(),
            LoginRequest::SsoAssertion { url, .. } => f
                .debug_struct("SsoAssertion")
                .field("url", url)
                .field("one_time_token", &"****")
                .finish(),
            LoginRequest::SamlLogin { url, data, timeout } => f
                .debug_struct("SamlLogin")
                .field("url", url)
                .field("data", data)
                .field("timeout", timeout)
                .finish(),
        }
    }
}

impl LoginRequest {
    pub fn into_wire(self) -> Result<WireRequest, serde_json::Error> {
        match self {
            LoginRequest::Authenticator { url, data, timeout } => Ok(WireRequest {
                method: Method::POST,
                url,
                headers: accept("application/json"),
                body: Some(serde_json::to_value(RequestEnvelope { data: &data })?),
                timeout: Some(timeout),
            }),
            LoginRequest::IdpToken { url, body } => Ok(WireRequest {
                method: Method::POST,
                url,
                headers: accept("application/json"),
                body: Some(serde_json::to_value(&body)?),
                timeout: Some(IDP_TOKEN_TIMEOUT),
            }),
            LoginRequest::SsoAssertion {
                mut url,
                one_time_token,
            } => {
                url.query_pairs_mut()
                    .append_pair("RelayState", RELAY_STATE)
                    .append_pair("onetimetoken", &one_time_token);
                // Some IdPs process the assertion slowly server-side; no timeout.
                Ok(WireRequest {
                    method: Method::GET,
                    url,
                    headers: accept("*/*"),
                    body: None,
                    timeout: None,
                })
            }
            LoginRequest::SamlLogin { url, data, timeout } => Ok(WireRequest {
                method: Method::POST,
                url,
                headers: accept("application/json"),
                body: Some(serde_json::to_value(RequestEnvelope { data: &data })?),
                timeout: Some(timeout),
            }),
        }
    }
}

fn accept(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(value));
    headers
}
