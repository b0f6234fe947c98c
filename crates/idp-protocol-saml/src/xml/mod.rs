//! XML reading and writing for SAML messages.

mod parse;
mod write;

pub use parse::{parse_authn_request, parse_encrypted_assertion};
pub use write::{
    write_assertion, write_authn_request, write_encrypted_assertion, write_response,
    REQUESTED_ATTRIBUTES_NS,
};
