//! SAML 2.0 types and data structures.
//!
//! This module contains the logical forms of the messages the engine
//! consumes and produces, together with the SP metadata it consults.

mod assertion;
mod attribute;
mod authn_request;
mod constants;
mod extensions;
mod metadata;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use attribute::*;
pub use authn_request::*;
pub use constants::*;
pub use extensions::*;
pub use metadata::*;
pub use name_id::*;
pub use response::*;
pub use status::*;
