//! Browser-less SAML federated login.
//!
//! Authenticates a data-platform session through an external identity provider
//! by fetching the IdP's SAML auto-submit page with a one-time token and relaying
//! it to the platform. The IdP-issued URLs and the SAML postback target are
//! checked against the trusted origins before any credential or assertion is sent.

pub mod auth;
pub mod config;
pub mod observability;
pub mod validation;

#[cfg(test)]
mod tests;

pub use auth::{FederatedLoginError, FederatedLoginFlow, LoginSession, LoginStep};
pub use config::LoginConfig;
