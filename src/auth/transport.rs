//! HTTP transport used by the federated login flow.
//!
//! The flow never talks to `reqwest` directly: it builds a [`WireRequest`] and
//! hands it to an [`HttpTransport`] together with the attempt's cancellation
//! token. [`ReqwestTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::requests::WireRequest;

/// Transport-level failures. Passed through the flow unchanged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}")]
    Status { status: StatusCode, body: String },

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A successful (2xx) response with its body read to a string.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Timeout-aware, cancellable request execution.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute `request`, aborting as soon as `cancel` fires.
    ///
    /// Non-2xx responses are reported as [`TransportError::Status`].
    async fn execute(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a client that has no global timeout; timeouts
    /// are applied per request.
    pub fn new() -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    /// Create a transport with a custom HTTP client.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn send(&self, request: WireRequest) -> Result<TransportResponse, TransportError> {
        let WireRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        tracing::debug!(
            method = %method,
            url = %redacted_url(&url),
            timeout = ?timeout,
            "Sending request"
        );

        let mut builder = self.http_client.request(method, url).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if !status.is_success() {
            tracing::debug!(status = %status, "Request returned non-success status");
            return Err(TransportError::Status { status, body });
        }

        Ok(TransportResponse { status, body })
    }
}

/// Origin and path only. The SSO query carries the one-time token.
pub(crate) fn redacted_url(url: &Url) -> String {
    format!("{}{}", url.origin().ascii_serialization(), url.path())
}

/// `reqwest` errors embed the full request URL; strip it before it reaches logs.
fn map_reqwest_error(error: reqwest::Error, timeout: Option<Duration>) -> TransportError {
    let error = error.without_url();
    match timeout {
        Some(timeout) if error.is_timeout() => TransportError::Timeout(timeout),
        _ => TransportError::Request(error),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: WireRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.send(request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path},
    };

    use super::*;

    fn request(method: Method, url: &str, timeout: Option<Duration>) -> WireRequest {
        WireRequest {
            method,
            url: Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    #[tokio::test]
    async fn test_execute_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .execute(
                request(Method::GET, &format!("{}/hello", mock_server.uri()), None),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "<html></html>");
    }

    #[tokio::test]
    async fn test_execute_sends_json_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("accept", "application/json"))
            .and(body_json(serde_json::json!({"username": "jane"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut wire = request(Method::POST, &format!("{}/token", mock_server.uri()), None);
        wire.headers
            .insert(http::header::ACCEPT, "application/json".parse().unwrap());
        wire.body = Some(serde_json::json!({"username": "jane"}));

        let transport = ReqwestTransport::new().unwrap();
        assert!(transport.execute(wire, &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_custom_client_is_used() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "acme-sso-agent/2.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::builder()
            .user_agent("acme-sso-agent/2.0")
            .build()
            .unwrap();
        let transport = ReqwestTransport::with_client(client);
        assert!(
            transport
                .execute(
                    request(Method::GET, &mock_server.uri(), None),
                    &CancellationToken::new()
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_request_error_omits_query() {
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .execute(
                request(
                    Method::GET,
                    "http://127.0.0.1:1/app/sso/saml?onetimetoken=secret-token",
                    None,
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Request(_)));
        assert!(!err.to_string().contains("secret-token"));
        assert!(!format!("{err:?}").contains("secret-token"));
    }

    #[test]
    fn test_redacted_url_drops_query() {
        let url = Url::parse("https://acme.okta.com:8443/app/sso/saml?RelayState=x&onetimetoken=t#f")
            .unwrap();
        assert_eq!(redacted_url(&url), "https://acme.okta.com:8443/app/sso/saml");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .execute(
                request(Method::GET, &mock_server.uri(), None),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::Status { status, ref body } if status == StatusCode::SERVICE_UNAVAILABLE && body == "down"
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .execute(
                request(
                    Method::GET,
                    &mock_server.uri(),
                    Some(Duration::from_millis(100)),
                ),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let transport = ReqwestTransport::new().unwrap();
        let started = std::time::Instant::now();
        let err = transport
            .execute(request(Method::GET, &mock_server.uri(), None), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_sends_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .execute(request(Method::GET, &mock_server.uri(), None), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }
}
