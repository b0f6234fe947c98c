//! End-to-End Integration Tests
//!
//! These tests drive complete SAML2 flows through the `IdentityProvider`
//! with runtime-generated IdP and SP key material.

mod common;
mod e2e;
mod replay;
mod sign_service;
mod suspension;
mod validation;
