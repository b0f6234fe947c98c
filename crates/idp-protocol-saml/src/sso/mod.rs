//! Single sign-on session reuse.
//!
//! # NIST 800-53 Rev5: IA-11 (Re-authentication)
//!
//! A session is reused only when the voter chain grants it; ForceAuthn,
//! stale sessions and sessions that cannot satisfy the request always lead
//! back to the external authenticator.

mod chain;
mod session;
mod voter;

pub use chain::*;
pub use session::*;
pub use voter::*;
