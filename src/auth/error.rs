use std::fmt;

use super::transport::TransportError;
use crate::validation::Origin;

/// The six ordered steps of a federated login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginStep {
    /// Ask the platform for the IdP's SSO and token URLs.
    FetchSsoAndTokenUrls,
    /// Check both URLs against the declared IdP origin.
    VerifyIdpOrigins,
    /// Exchange username and password for a one-time token at the IdP.
    FetchOneTimeToken,
    /// Fetch the SAML auto-submit page from the IdP.
    FetchSamlAssertion,
    /// Check the SAML form's postback URL against the platform origin.
    VerifyPostback,
    /// Submit the SAML response to the platform's login endpoint.
    SubmitSamlLogin,
}

impl LoginStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStep::FetchSsoAndTokenUrls => "fetch_sso_and_token_urls",
            LoginStep::VerifyIdpOrigins => "verify_idp_origins",
            LoginStep::FetchOneTimeToken => "fetch_one_time_token",
            LoginStep::FetchSamlAssertion => "fetch_saml_assertion",
            LoginStep::VerifyPostback => "verify_postback",
            LoginStep::SubmitSamlLogin => "submit_saml_login",
        }
    }
}

impl fmt::Display for LoginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which IdP-issued URL failed the origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpUrlKind {
    Sso,
    Token,
}

impl fmt::Display for IdpUrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdpUrlKind::Sso => f.write_str("SSO URL"),
            IdpUrlKind::Token => f.write_str("token URL"),
        }
    }
}

/// Failure outcome of a federated login attempt.
///
/// Every variant is terminal: the flow never retries a step.
#[derive(Debug, thiserror::Error)]
pub enum FederatedLoginError {
    /// The platform or IdP answered with `success = false`.
    #[error(
        "{step} rejected by server (code {}): {}",
        .code.as_deref().unwrap_or("none"),
        .message.as_deref().unwrap_or("no message")
    )]
    RemoteRejected {
        step: LoginStep,
        code: Option<String>,
        message: Option<String>,
    },

    /// An IdP URL handed out by the platform is outside the declared IdP origin.
    #[error("{url_kind} {url} is outside the IdP origin: found {found}, expected {expected}")]
    OriginMismatch {
        url_kind: IdpUrlKind,
        url: String,
        found: Origin,
        expected: Origin,
    },

    /// The IdP's SSO page has no usable form-action URL.
    #[error("no SAML postback URL found in the IdP response")]
    PostbackNotFound,

    /// The form-action URL points somewhere other than the platform.
    #[error("SAML postback URL {url} is invalid: found origin {found}, expected {expected}")]
    PostbackInvalid {
        url: String,
        found: Origin,
        expected: Origin,
    },

    /// The attempt was cancelled before completion.
    #[error("federated login cancelled during {step}")]
    Cancelled { step: LoginStep },

    /// Network or timeout failure, passed through from the transport.
    #[error("{step} failed: {source}")]
    Transport {
        step: LoginStep,
        #[source]
        source: TransportError,
    },

    /// A response could not be interpreted (bad JSON, missing data, bad URL).
    #[error("{step} returned an invalid response: {reason}")]
    InvalidResponse { step: LoginStep, reason: String },

    /// The session could not record the final login response.
    #[error("failed to finalize the session: {0}")]
    Finalize(String),
}

impl FederatedLoginError {
    /// The step at which the flow stopped, if it is known.
    pub fn step(&self) -> Option<LoginStep> {
        match self {
            FederatedLoginError::RemoteRejected { step, .. }
            | FederatedLoginError::Cancelled { step }
            | FederatedLoginError::Transport { step, .. }
            | FederatedLoginError::InvalidResponse { step, .. } => Some(*step),
            FederatedLoginError::OriginMismatch { .. } => Some(LoginStep::VerifyIdpOrigins),
            FederatedLoginError::PostbackNotFound | FederatedLoginError::PostbackInvalid { .. } => {
                Some(LoginStep::VerifyPostback)
            }
            FederatedLoginError::Finalize(_) => None,
        }
    }

    /// Map a transport failure, keeping cancellation distinct from I/O errors.
    pub(crate) fn from_transport(step: LoginStep, source: TransportError) -> Self {
        match source {
            TransportError::Cancelled => FederatedLoginError::Cancelled { step },
            source => FederatedLoginError::Transport { step, source },
        }
    }

    pub(crate) fn invalid_response(step: LoginStep, reason: impl fmt::Display) -> Self {
        FederatedLoginError::InvalidResponse {
            step,
            reason: reason.to_string(),
        }
    }
}
