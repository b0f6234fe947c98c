//! Inbound request validation.
//!
//! Turns an [`InboundMessage`] into an immutable [`AuthnRequestContext`], or
//! into a [`ValidationError`] that records whether a reply channel to the SP
//! was established before the failure.

mod context;
mod inbound;
mod validator;

pub use context::*;
pub use inbound::*;
pub use validator::*;
