//! SAML postback URL extraction.
//!
//! The IdP's SSO endpoint answers with an auto-submitting HTML form whose
//! `action` is where the assertion would be posted. That URL has to point back
//! at the platform the session is connected to, otherwise a hostile IdP page
//! could make the client deliver the assertion elsewhere.

use url::Url;

use super::FederatedLoginError;
use crate::validation::{Origin, validate_against};

const FORM_TAG: &str = "<form";
const ACTION_ATTR: &str = "action=\"";

/// Finds and validates the postback URL in an IdP SSO page.
pub trait PostbackExtractor: Send + Sync {
    /// Return the decoded postback URL if it belongs to `trusted`.
    ///
    /// Fails with [`FederatedLoginError::PostbackNotFound`] when no URL can be
    /// read and [`FederatedLoginError::PostbackInvalid`] when it points elsewhere.
    fn extract(&self, html: &str, trusted: &Origin) -> Result<Url, FederatedLoginError>;
}

/// String-scanning extractor: the `action` of the first `<form` tag.
///
/// Only the double-quoted form `action="..."` is recognized. Single-quoted or
/// unquoted attributes are treated as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormActionExtractor;

impl PostbackExtractor for FormActionExtractor {
    fn extract(&self, html: &str, trusted: &Origin) -> Result<Url, FederatedLoginError> {
        let url = find_form_action(html)
            .and_then(decode_html)
            .and_then(|action| Url::parse(&action).ok())
            .ok_or(FederatedLoginError::PostbackNotFound)?;

        validate_against(&url, trusted).map_err(|mismatch| FederatedLoginError::PostbackInvalid {
            url: url.to_string(),
            found: mismatch.found,
            expected: mismatch.expected,
        })?;

        Ok(url)
    }
}

/// Raw (still entity-encoded) `action` value of the first form.
fn find_form_action(html: &str) -> Option<&str> {
    let form = &html[html.find(FORM_TAG)?..];
    let value = &form[form.find(ACTION_ATTR)? + ACTION_ATTR.len()..];
    let end = value.find('"')?;
    Some(&value[..end])
}

fn decode_html(raw: &str) -> Option<String> {
    quick_xml::escape::unescape_with(raw, quick_xml::escape::resolve_html5_entity)
        .ok()
        .map(|decoded| decoded.into_owned())
}
