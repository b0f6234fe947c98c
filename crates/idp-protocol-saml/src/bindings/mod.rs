//! Binding-level decoding of inbound messages.
//!
//! HTTP-POST needs nothing beyond base64 and is handled by
//! [`InboundMessage::post_encoded`](crate::InboundMessage::post_encoded).
//! HTTP-Redirect carries a deflated request and a signature over the query
//! string itself; [`redirect`] keeps the exact signed octets so the signature
//! can be tied back to the request it arrived with.

pub mod redirect;

pub use redirect::RedirectQuery;
