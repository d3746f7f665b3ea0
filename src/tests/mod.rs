//! Consolidated test modules.
//!
//! End-to-end tests that run the whole login handshake against wiremock servers
//! standing in for the platform and the identity provider.
