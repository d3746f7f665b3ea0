//! URL validation shared by configuration loading and the login flow.

pub mod url;

pub use url::{
    Origin, OriginMismatch, UrlValidationError, require_https, validate_against, validate_origin,
};
