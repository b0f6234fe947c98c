//! # idp-core
//!
//! Core configuration, error handling and audit events for the SAML2
//! identity provider.
//!
//! This crate provides the foundational types shared by every other crate in
//! the workspace: the immutable [`IdpSettings`] tree constructed once at
//! startup, the crate-level [`Error`], and the audit event model published at
//! each processing stage.
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - AU-2: Event logging framework
//! - AU-3: Content of audit records
//! - SI-11: Error handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod error;
pub mod event;

pub use audit::{
    AuditHandler, AuditPublisher, ChannelAuditHandler, MemoryAuditHandler, TracingAuditHandler,
};
pub use config::{
    AssertionSettings, AttributeSettings, AuthnSettings, EncryptionSettings,
    EntityCategoryAttribute, IdpSettings, NameIdSettings, ReplaySettings, SsoDefaultPolicy,
    SsoSettings,
};
pub use error::{Error, Result};
pub use event::{AuditEvent, AuditEventBuilder, AuditEventKind, AuditPayload};
