//! URL origin checks for the federated login handshake.
//!
//! Every URL the IdP hands back (SSO endpoint, token endpoint, SAML postback
//! target) is compared against a trusted origin before the client sends
//! credentials to it or follows it. An origin here is the `(scheme, host)` pair
//! only; ports, paths, queries and fragments do not take part in the comparison.

use std::fmt;

use url::Url;

/// The `(scheme, host)` pair used as the unit of trust.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// Origin of an already parsed URL. URLs without a host (e.g. `mailto:`)
    /// get an empty host, which never matches an http(s) origin.
    pub fn of(url: &Url) -> Self {
        Self::new(url.scheme(), url.host_str().unwrap_or_default())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}

/// A candidate URL whose origin differs from the trusted one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("origin {found} does not match trusted origin {expected}")]
pub struct OriginMismatch {
    pub found: Origin,
    pub expected: Origin,
}

/// Errors from URL validation.
#[derive(Debug, thiserror::Error)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL scheme must be https")]
    InvalidScheme,

    #[error("URL must include a hostname")]
    MissingHost,
}

/// Check that `candidate` shares scheme and host with `trusted`.
pub fn validate_origin(candidate: &Url, trusted: &Url) -> Result<(), OriginMismatch> {
    validate_against(candidate, &Origin::of(trusted))
}

/// Check that `candidate` belongs to an origin that is already known.
pub fn validate_against(candidate: &Url, trusted: &Origin) -> Result<(), OriginMismatch> {
    let found = Origin::of(candidate);
    if found == *trusted {
        return Ok(());
    }

    tracing::warn!(
        url = %candidate,
        found = %found,
        expected = %trusted,
        "URL origin does not match trusted origin"
    );
    Err(OriginMismatch {
        found,
        expected: trusted.clone(),
    })
}

/// Validate that a URL uses HTTPS and names a host.
pub fn require_https(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url).map_err(|e| UrlValidationError::InvalidUrl(e.to_string()))?;
    if parsed.scheme() != "https" {
        return Err(UrlValidationError::InvalidScheme);
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[rstest]
    #[case::identical("https://acme.okta.com", "https://acme.okta.com")]
    #[case::different_path("https://acme.okta.com/app/sso/saml", "https://acme.okta.com")]
    #[case::different_port("https://acme.okta.com:8443/sso", "https://acme.okta.com")]
    #[case::query_and_fragment("https://acme.okta.com/?a=1#frag", "https://acme.okta.com/x")]
    #[case::host_case_normalized("https://ACME.okta.com/sso", "https://acme.okta.com")]
    fn test_same_origin_accepted(#[case] candidate: &str, #[case] trusted: &str) {
        assert!(validate_origin(&url(candidate), &url(trusted)).is_ok());
    }

    #[rstest]
    #[case::other_host("https://evil.example.com/sso", "https://acme.okta.com")]
    #[case::subdomain("https://acme.okta.com.evil.io/sso", "https://acme.okta.com")]
    #[case::scheme_downgrade("http://acme.okta.com/sso", "https://acme.okta.com")]
    #[case::sibling_tenant("https://other.okta.com/sso", "https://acme.okta.com")]
    fn test_different_origin_rejected(#[case] candidate: &str, #[case] trusted: &str) {
        assert!(validate_origin(&url(candidate), &url(trusted)).is_err());
    }

    #[test]
    fn test_mismatch_reports_both_origins() {
        let err = validate_origin(
            &url("https://evil.example.com/sso"),
            &url("https://acme.okta.com"),
        )
        .unwrap_err();
        assert_eq!(err.found, Origin::new("https", "evil.example.com"));
        assert_eq!(err.expected, Origin::new("https", "acme.okta.com"));
        let message = err.to_string();
        assert!(message.contains("https://evil.example.com"));
        assert!(message.contains("https://acme.okta.com"));
    }

    #[test]
    fn test_origin_of_normalizes_scheme_and_host() {
        let origin = Origin::of(&url("HTTPS://Acme.Okta.com:8443/app/sso?x=1"));
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.host(), "acme.okta.com");
        assert_eq!(origin.to_string(), "https://acme.okta.com");
    }

    #[test]
    fn test_hostless_url_never_matches() {
        assert!(validate_origin(&url("mailto:a@acme.okta.com"), &url("https://acme.okta.com")).is_err());
    }

    #[test]
    fn test_require_https() {
        assert!(require_https("https://acme.okta.com").is_ok());
        assert!(matches!(
            require_https("http://acme.okta.com"),
            Err(UrlValidationError::InvalidScheme)
        ));
        assert!(matches!(
            require_https("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
