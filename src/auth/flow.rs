//! The six-step federated login handshake.
//!
//! 1. Ask the platform for the IdP's SSO and token URLs.
//! 2. Check both URLs against the declared IdP origin.
//! 3. Exchange username and password for a one-time token at the IdP.
//! 4. Fetch the SAML page from the SSO URL using that token.
//! 5. Check the page's form-action URL against the platform's own origin.
//! 6. Post the SAML page to the platform and hand the response to the session.
//!
//! Steps run strictly in order and any failure ends the attempt. Nothing is
//! retried and nothing is cleaned up at the IdP on failure.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use super::{
    error::{FederatedLoginError, IdpUrlKind, LoginStep},
    postback::{FormActionExtractor, PostbackExtractor},
    requests::{AuthenticatorRequestData, IdpTokenRequest, LoginRequest, SamlLoginRequestData},
    responses::{
        AuthenticatorResponseData, AuthnResponse, IdpErrorResponse, IdpTokenResponse,
        LoginResponseData,
    },
    session::{LoginFinalizer, SessionContext},
    transport::{HttpTransport, TransportError},
};
use crate::validation::validate_origin;

/// IdP endpoints handed out by the platform, after origin checks.
struct IdpEndpoints {
    sso_url: Url,
    token_url: Url,
}

/// One federated login attempt. Consumed by [`FederatedLoginFlow::run`].
pub struct FederatedLoginFlow<'a, T: HttpTransport + ?Sized> {
    session: &'a SessionContext,
    transport: &'a T,
    idp_base_url: Url,
    extractor: Box<dyn PostbackExtractor>,
}

impl<'a, T: HttpTransport + ?Sized> FederatedLoginFlow<'a, T> {
    pub fn new(session: &'a SessionContext, transport: &'a T, idp_base_url: Url) -> Self {
        Self {
            session,
            transport,
            idp_base_url,
            extractor: Box::new(FormActionExtractor),
        }
    }

    /// Replace the postback extractor, e.g. with a full HTML parser.
    pub fn with_extractor(mut self, extractor: impl PostbackExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Run all six steps and hand the final login response to `finalizer`.
    ///
    /// `finalizer` is invoked at most once, and only after every check passed.
    /// Cancelling `cancel` aborts the outstanding request and returns
    /// [`FederatedLoginError::Cancelled`] without starting further steps.
    pub async fn run<F>(
        self,
        finalizer: &mut F,
        cancel: &CancellationToken,
    ) -> Result<(), FederatedLoginError>
    where
        F: LoginFinalizer + ?Sized,
    {
        let span = tracing::info_span!(
            "federated_login",
            account = %self.session.account(),
            user = %self.session.user(),
            idp = %self.idp_base_url,
        );

        async move {
            let result = self.run_steps(finalizer, cancel).await;
            match &result {
                Ok(()) => tracing::info!("Federated login succeeded"),
                Err(e) => tracing::warn!(
                    step = e.step().map(|s| s.as_str()),
                    error = %e,
                    "Federated login failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps<F>(
        &self,
        finalizer: &mut F,
        cancel: &CancellationToken,
    ) -> Result<(), FederatedLoginError>
    where
        F: LoginFinalizer + ?Sized,
    {
        let urls = self.fetch_sso_and_token_urls(cancel).await?;
        let endpoints = self.verify_idp_origins(urls)?;
        let one_time_token = self
            .fetch_one_time_token(&endpoints.token_url, cancel)
            .await?;
        let saml_html = self
            .fetch_saml_assertion(&endpoints.sso_url, one_time_token, cancel)
            .await?;
        self.verify_postback(&saml_html)?;
        let response = self.submit_saml_login(saml_html, cancel).await?;

        ensure_not_cancelled(LoginStep::SubmitSamlLogin, cancel)?;
        finalizer.finalize(response).await
    }

    async fn fetch_sso_and_token_urls(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AuthenticatorResponseData, FederatedLoginError> {
        let step = LoginStep::FetchSsoAndTokenUrls;
        let request = LoginRequest::Authenticator {
            url: self.session.authenticator_request_url(),
            data: AuthenticatorRequestData::new(self.session, &self.idp_base_url),
            timeout: self.session.connection_timeout(),
        };

        let body = self.send(step, request, cancel).await?;
        let response: AuthnResponse<AuthenticatorResponseData> = parse_json(step, &body)?;
        let data = accept_platform_response(step, response)?;

        tracing::debug!(
            sso_url = %data.sso_url,
            token_url = %data.token_url,
            "Platform returned IdP endpoints"
        );
        Ok(data)
    }

    fn verify_idp_origins(
        &self,
        urls: AuthenticatorResponseData,
    ) -> Result<IdpEndpoints, FederatedLoginError> {
        let sso_url = self.check_idp_url(IdpUrlKind::Sso, &urls.sso_url)?;
        let token_url = self.check_idp_url(IdpUrlKind::Token, &urls.token_url)?;
        Ok(IdpEndpoints { sso_url, token_url })
    }

    fn check_idp_url(&self, url_kind: IdpUrlKind, raw: &str) -> Result<Url, FederatedLoginError> {
        let url = Url::parse(raw).map_err(|e| {
            FederatedLoginError::invalid_response(
                LoginStep::FetchSsoAndTokenUrls,
                format!("{url_kind} '{raw}' is not a valid URL: {e}"),
            )
        })?;

        validate_origin(&url, &self.idp_base_url).map_err(|mismatch| {
            FederatedLoginError::OriginMismatch {
                url_kind,
                url: raw.to_string(),
                found: mismatch.found,
                expected: mismatch.expected,
            }
        })?;

        Ok(url)
    }

    async fn fetch_one_time_token(
        &self,
        token_url: &Url,
        cancel: &CancellationToken,
    ) -> Result<String, FederatedLoginError> {
        let step = LoginStep::FetchOneTimeToken;
        let request = LoginRequest::IdpToken {
            url: token_url.clone(),
            body: IdpTokenRequest::new(self.session),
        };

        let body = match self.send(step, request, cancel).await {
            Err(FederatedLoginError::Transport {
                source: TransportError::Status { status, body },
                ..
            }) if status.is_client_error() => return Err(idp_rejection(status, &body)),
            other => other?,
        };

        let response: IdpTokenResponse = parse_json(step, &body)?;
        tracing::debug!("Obtained one-time token from IdP");
        Ok(response.cookie_token)
    }

    async fn fetch_saml_assertion(
        &self,
        sso_url: &Url,
        one_time_token: String,
        cancel: &CancellationToken,
    ) -> Result<String, FederatedLoginError> {
        let request = LoginRequest::SsoAssertion {
            url: sso_url.clone(),
            one_time_token,
        };

        let html = self
            .send(LoginStep::FetchSamlAssertion, request, cancel)
            .await?;
        tracing::debug!(bytes = html.len(), "Fetched SAML page from IdP");
        Ok(html)
    }

    fn verify_postback(&self, saml_html: &str) -> Result<(), FederatedLoginError> {
        let postback = self.extractor.extract(saml_html, &self.session.origin())?;
        tracing::debug!(postback_url = %postback, "SAML postback URL matches platform origin");
        Ok(())
    }

    async fn submit_saml_login(
        &self,
        saml_html: String,
        cancel: &CancellationToken,
    ) -> Result<AuthnResponse<LoginResponseData>, FederatedLoginError> {
        let step = LoginStep::SubmitSamlLogin;
        let request = LoginRequest::SamlLogin {
            url: self.session.login_request_url(),
            data: SamlLoginRequestData::new(self.session, saml_html),
            timeout: self.session.connection_timeout(),
        };

        let body = self.send(step, request, cancel).await?;
        let response: AuthnResponse<LoginResponseData> = parse_json(step, &body)?;
        if !response.success {
            return Err(FederatedLoginError::RemoteRejected {
                step,
                code: response.code,
                message: response.message,
            });
        }
        Ok(response)
    }

    async fn send(
        &self,
        step: LoginStep,
        request: LoginRequest,
        cancel: &CancellationToken,
    ) -> Result<String, FederatedLoginError> {
        ensure_not_cancelled(step, cancel)?;
        tracing::debug!(step = step.as_str(), "Starting login step");

        let wire = request
            .into_wire()
            .map_err(|e| FederatedLoginError::from_transport(step, TransportError::Encode(e)))?;
        let response = self
            .transport
            .execute(wire, cancel)
            .await
            .map_err(|e| FederatedLoginError::from_transport(step, e))?;
        Ok(response.body)
    }
}

fn ensure_not_cancelled(
    step: LoginStep,
    cancel: &CancellationToken,
) -> Result<(), FederatedLoginError> {
    if cancel.is_cancelled() {
        return Err(FederatedLoginError::Cancelled { step });
    }
    Ok(())
}

fn parse_json<D: DeserializeOwned>(step: LoginStep, body: &str) -> Result<D, FederatedLoginError> {
    serde_json::from_str(body).map_err(|e| FederatedLoginError::invalid_response(step, e))
}

/// Unwrap `data` from a platform response, turning `success = false` into a rejection.
fn accept_platform_response<D>(
    step: LoginStep,
    response: AuthnResponse<D>,
) -> Result<D, FederatedLoginError> {
    if !response.success {
        return Err(FederatedLoginError::RemoteRejected {
            step,
            code: response.code,
            message: response.message,
        });
    }
    response
        .data
        .ok_or_else(|| FederatedLoginError::invalid_response(step, "response has no data"))
}

/// A 4xx from the IdP token endpoint means the credentials were refused.
fn idp_rejection(status: http::StatusCode, body: &str) -> FederatedLoginError {
    let details = serde_json::from_str::<IdpErrorResponse>(body).ok();
    FederatedLoginError::RemoteRejected {
        step: LoginStep::FetchOneTimeToken,
        code: details
            .as_ref()
            .and_then(|d| d.error_code.clone())
            .or_else(|| Some(status.as_u16().to_string())),
        message: details
            .and_then(|d| d.error_summary)
            .or_else(|| status.canonical_reason().map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use http::StatusCode;

    use super::*;
    use crate::auth::{
        requests::WireRequest, session::tests::test_context, transport::TransportResponse,
    };

    /// Transport that replays canned responses and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<WireRequest>>,
    }

    impl ScriptedTransport {
        fn new(mut responses: Vec<Result<TransportResponse, TransportError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<WireRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(
            &self,
            request: WireRequest,
            _cancel: &CancellationToken,
        ) -> Result<TransportResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("unexpected request")
        }
    }

    #[derive(Default, Clone)]
    struct CountingFinalizer {
        calls: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl LoginFinalizer for CountingFinalizer {
        async fn finalize(
            &mut self,
            response: AuthnResponse<LoginResponseData>,
        ) -> Result<(), FederatedLoginError> {
            self.calls
                .lock()
                .unwrap()
                .push(response.data.and_then(|d| d.token));
            Ok(())
        }
    }

    fn ok(body: &str) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: StatusCode::OK,
            body: body.to_string(),
        })
    }

    fn idp() -> Url {
        Url::parse("https://acme.okta.com").unwrap()
    }

    const AUTHENTICATOR_OK: &str = r#"{"success": true, "data": {"ssoUrl": "https://acme.okta.com/app/sso/saml", "tokenUrl": "https://acme.okta.com/api/v1/authn"}}"#;
    const TOKEN_OK: &str = r#"{"cookieToken": "one-time"}"#;
    const SAML_OK: &str = r#"<html><body onload="document.forms[0].submit()"><form method="POST" action="https://acme.platform.example/fed/login"><input type="hidden" name="SAMLResponse" value="PHNhbWw+"/></form></body></html>"#;
    const LOGIN_OK: &str = r#"{"success": true, "data": {"token": "session-token", "masterToken": "master"}}"#;

    #[tokio::test]
    async fn test_happy_path_runs_steps_in_order() {
        let session = test_context("https", "acme.platform.example", None);
        let transport =
            ScriptedTransport::new(vec![ok(AUTHENTICATOR_OK), ok(TOKEN_OK), ok(SAML_OK), ok(LOGIN_OK)]);
        let mut finalizer = CountingFinalizer::default();

        FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut finalizer, &CancellationToken::new())
            .await
            .unwrap();

        let requests = transport.requests();
        let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
        assert_eq!(
            paths,
            vec![
                "/session/authenticator-request",
                "/api/v1/authn",
                "/app/sso/saml",
                "/session/v1/login-request",
            ]
        );
        assert_eq!(requests[0].timeout, Some(session.connection_timeout()));
        assert_eq!(requests[2].timeout, None);
        assert!(
            requests[2]
                .url
                .query_pairs()
                .any(|(k, v)| k == "onetimetoken" && v == "one-time")
        );
        assert_eq!(
            requests[3].body.as_ref().unwrap()["data"]["RAW_SAML_RESPONSE"],
            SAML_OK
        );
        assert_eq!(
            *finalizer.calls.lock().unwrap(),
            vec![Some("session-token".to_string())]
        );
    }

    #[tokio::test]
    async fn test_token_url_origin_mismatch() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![ok(
            r#"{"success": true, "data": {"ssoUrl": "https://acme.okta.com/sso", "tokenUrl": "https://evil.example/api/v1/authn"}}"#,
        )]);
        let mut finalizer = CountingFinalizer::default();

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut finalizer, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::OriginMismatch {
                url_kind: IdpUrlKind::Token,
                ..
            }
        ));
        assert_eq!(transport.requests().len(), 1);
        assert!(finalizer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparsable_sso_url_is_invalid_response() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![ok(
            r#"{"success": true, "data": {"ssoUrl": "not a url", "tokenUrl": "https://acme.okta.com/api/v1/authn"}}"#,
        )]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::InvalidResponse {
                step: LoginStep::FetchSsoAndTokenUrls,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_success_without_data_is_invalid_response() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![ok(r#"{"success": true}"#)]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FederatedLoginError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_malformed_token_response() {
        let session = test_context("https", "acme.platform.example", None);
        let transport =
            ScriptedTransport::new(vec![ok(AUTHENTICATOR_OK), ok(r#"{"status": "MFA_REQUIRED"}"#)]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::InvalidResponse {
                step: LoginStep::FetchOneTimeToken,
                ..
            }
        ));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_idp_credential_rejection() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![
            ok(AUTHENTICATOR_OK),
            Err(TransportError::Status {
                status: StatusCode::UNAUTHORIZED,
                body: r#"{"errorCode": "E0000004", "errorSummary": "Authentication failed"}"#
                    .into(),
            }),
        ]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            FederatedLoginError::RemoteRejected {
                step,
                code,
                message,
            } => {
                assert_eq!(step, LoginStep::FetchOneTimeToken);
                assert_eq!(code.as_deref(), Some("E0000004"));
                assert_eq!(message.as_deref(), Some("Authentication failed"));
            }
            other => panic!("expected RemoteRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idp_server_error_is_transport() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![
            ok(AUTHENTICATOR_OK),
            Err(TransportError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: String::new(),
            }),
        ]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::Transport {
                step: LoginStep::FetchOneTimeToken,
                source: TransportError::Status { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_custom_extractor_is_used() {
        struct RejectAll;
        impl PostbackExtractor for RejectAll {
            fn extract(
                &self,
                _html: &str,
                _trusted: &crate::validation::Origin,
            ) -> Result<Url, FederatedLoginError> {
                Err(FederatedLoginError::PostbackNotFound)
            }
        }

        let session = test_context("https", "acme.platform.example", None);
        let transport =
            ScriptedTransport::new(vec![ok(AUTHENTICATOR_OK), ok(TOKEN_OK), ok(SAML_OK)]);

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .with_extractor(RejectAll)
            .run(&mut CountingFinalizer::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FederatedLoginError::PostbackNotFound));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_sends_nothing() {
        let session = test_context("https", "acme.platform.example", None);
        let transport = ScriptedTransport::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = FederatedLoginFlow::new(&session, &transport, idp())
            .run(&mut CountingFinalizer::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedLoginError::Cancelled {
                step: LoginStep::FetchSsoAndTokenUrls
            }
        ));
        assert!(transport.requests().is_empty());
    }
}
