mod error;
mod flow;
mod postback;
pub mod requests;
pub mod responses;
pub(crate) mod session;
mod transport;

pub use error::{FederatedLoginError, IdpUrlKind, LoginStep};
pub use flow::FederatedLoginFlow;
pub use postback::{FormActionExtractor, PostbackExtractor};
pub use requests::{ClientEnvironment, LoginRequest, WireRequest};
pub use responses::{AuthnResponse, LoginResponseData, SessionInfo};
pub use session::{
    LoginFinalizer, LoginSession, SessionContext, SessionError, SessionState, SessionTokens,
};
pub use transport::{HttpTransport, ReqwestTransport, TransportError, TransportResponse};
