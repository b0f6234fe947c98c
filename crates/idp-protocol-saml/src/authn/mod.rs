//! Authentication orchestration.
//!
//! [`IdentityProvider`] drives each request through validation, the SSO
//! decision, external authentication, attribute release and response
//! building. Requests waiting for the external authenticator are persisted
//! under a single-use correlation token. Post-authentication checks may veto
//! an authenticated subject before any attribute is released.

mod authenticator;
mod idp;
mod post;
mod state;

pub use authenticator::{
    AuthenticatedSubject, AuthenticationHandoff, AuthenticationRequirements,
    AuthenticatorResponse,
};
pub use idp::*;
pub use post::*;
pub use state::*;
