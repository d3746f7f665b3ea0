//! Session collaborators of the federated login flow.
//!
//! - [`SessionContext`]: read-only connection properties and platform URL builders.
//! - [`LoginFinalizer`]: the one mutating hand-off, invoked once on success.
//! - [`LoginSession`]: a ready-to-use session that wires both to a transport.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use super::{
    FederatedLoginError, FederatedLoginFlow,
    requests::ClientEnvironment,
    responses::{AuthnResponse, LoginResponseData, SessionInfo},
    transport::{HttpTransport, ReqwestTransport, TransportError},
};
use crate::{config::ConnectionConfig, validation::Origin};

const AUTHENTICATOR_REQUEST_PATH: &str = "/session/authenticator-request";
const LOGIN_REQUEST_PATH: &str = "/session/v1/login-request";

/// Errors building a session from connection properties.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid platform address: {0}")]
    InvalidAddress(String),

    #[error("failed to create HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

/// Read-only view of the connection a federated login runs against.
#[derive(Debug, Clone)]
pub struct SessionContext {
    connection: ConnectionConfig,
    client_environment: ClientEnvironment,
    base_url: Url,
}

impl SessionContext {
    pub fn new(connection: ConnectionConfig) -> Result<Self, SessionError> {
        let mut base_url = Url::parse(&format!("{}://{}", connection.scheme, connection.host))
            .map_err(|e| SessionError::InvalidAddress(e.to_string()))?;
        if base_url.host_str().is_none_or(str::is_empty) {
            return Err(SessionError::InvalidAddress(format!(
                "no host in '{}'",
                connection.host
            )));
        }
        if connection.port.is_some() {
            base_url.set_port(connection.port).map_err(|()| {
                SessionError::InvalidAddress(format!("cannot set port on {base_url}"))
            })?;
        }

        let client_environment = ClientEnvironment::detect(connection.application.clone());
        Ok(Self {
            connection,
            client_environment,
            base_url,
        })
    }

    pub fn account(&self) -> &str {
        &self.connection.account
    }

    pub fn user(&self) -> &str {
        &self.connection.user
    }

    pub fn password(&self) -> &str {
        &self.connection.password
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection.connection_timeout()
    }

    pub fn client_environment(&self) -> &ClientEnvironment {
        &self.client_environment
    }

    /// `scheme://host[:port]/` of the platform.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The platform's own origin; the SAML postback must point here.
    pub fn origin(&self) -> Origin {
        Origin::of(&self.base_url)
    }

    pub fn authenticator_request_url(&self) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(AUTHENTICATOR_REQUEST_PATH);
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());
        url
    }

    pub fn login_request_url(&self) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(LOGIN_REQUEST_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("requestId", &Uuid::new_v4().to_string());
            if let Some(database) = &self.connection.database {
                query.append_pair("databaseName", database);
            }
            if let Some(schema) = &self.connection.schema {
                query.append_pair("schemaName", schema);
            }
            if let Some(warehouse) = &self.connection.warehouse {
                query.append_pair("warehouse", warehouse);
            }
            if let Some(role) = &self.connection.role {
                query.append_pair("roleName", role);
            }
        }
        url
    }
}

/// Receives the final login response once all checks have passed.
#[async_trait]
pub trait LoginFinalizer: Send {
    async fn finalize(
        &mut self,
        response: AuthnResponse<LoginResponseData>,
    ) -> Result<(), FederatedLoginError>;
}

/// Tokens issued by the platform at the end of a successful login.
#[derive(Clone)]
pub struct SessionTokens {
    pub token: String,
    pub master_token: Option<String>,
    pub validity: Option<Duration>,
    pub master_validity: Option<Duration>,
    pub session_id: Option<String>,
    pub session_info: SessionInfo,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("token", &"****")
            .field("master_token", &self.master_token.as_ref().map(|_| "****"))
            .field("validity", &self.validity)
            .field("master_validity", &self.master_validity)
            .field("session_id", &self.session_id)
            .field("session_info", &self.session_info)
            .finish()
    }
}

/// Token slot of a session. Filled by [`LoginFinalizer::finalize`].
#[derive(Debug, Default)]
pub struct SessionState {
    tokens: Option<SessionTokens>,
}

impl SessionState {
    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }
}

#[async_trait]
impl LoginFinalizer for SessionState {
    async fn finalize(
        &mut self,
        response: AuthnResponse<LoginResponseData>,
    ) -> Result<(), FederatedLoginError> {
        let data = response
            .data
            .ok_or_else(|| FederatedLoginError::Finalize("login response has no data".into()))?;
        let token = data
            .token
            .ok_or_else(|| FederatedLoginError::Finalize("login response has no token".into()))?;

        let tokens = SessionTokens {
            token,
            master_token: data.master_token,
            validity: data.validity_in_seconds.map(Duration::from_secs),
            master_validity: data.master_validity_in_seconds.map(Duration::from_secs),
            session_id: data.session_id,
            session_info: data.session_info.unwrap_or_default(),
        };

        tracing::debug!(
            session_id = ?tokens.session_id,
            validity = ?tokens.validity,
            "Recorded platform session tokens"
        );
        self.tokens = Some(tokens);
        Ok(())
    }
}

/// A platform session that can authenticate itself through an external IdP.
#[derive(Debug)]
pub struct LoginSession<T = ReqwestTransport> {
    context: SessionContext,
    transport: T,
    state: SessionState,
}

impl LoginSession<ReqwestTransport> {
    /// Build a session using the default `reqwest` transport.
    pub fn from_config(connection: ConnectionConfig) -> Result<Self, SessionError> {
        Ok(Self::new(
            SessionContext::new(connection)?,
            ReqwestTransport::new()?,
        ))
    }
}

impl<T: HttpTransport> LoginSession<T> {
    pub fn new(context: SessionContext, transport: T) -> Self {
        Self {
            context,
            transport,
            state: SessionState::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.state.tokens()
    }

    /// Run one federated login attempt against `idp_base_url`.
    ///
    /// Tokens from an earlier attempt are dropped first, so a failed attempt
    /// leaves the session unauthenticated.
    pub async fn authenticate_federated(
        &mut self,
        idp_base_url: Url,
        cancel: &CancellationToken,
    ) -> Result<&SessionTokens, FederatedLoginError> {
        self.state.tokens = None;
        FederatedLoginFlow::new(&self.context, &self.transport, idp_base_url)
            .run(&mut self.state, cancel)
            .await?;

        self.state
            .tokens()
            .ok_or_else(|| FederatedLoginError::Finalize("session tokens were not recorded".into()))
    }
}
