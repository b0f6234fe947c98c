//! Checks run on an authenticated subject before attributes are released.

use super::AuthenticatedSubject;
use crate::error::{SamlError, SamlResult};
use crate::validation::AuthnRequestContext;

/// Vetoes an authentication that does not meet the request.
///
/// Failures are answered with a signed error response.
pub trait PostAuthenticationCheck: Send + Sync + std::fmt::Debug {
    /// Check name used in logs.
    fn name(&self) -> &'static str;

    /// Checks `subject` against the request it authenticated for.
    ///
    /// # Errors
    ///
    /// The error to answer the request with.
    fn check(&self, ctx: &AuthnRequestContext, subject: &AuthenticatedSubject) -> SamlResult<()>;
}

/// Fails when a sign message marked `MustShow` was not displayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignMessageDisplayedCheck;

impl PostAuthenticationCheck for SignMessageDisplayedCheck {
    fn name(&self) -> &'static str {
        "sign-message-displayed"
    }

    fn check(&self, ctx: &AuthnRequestContext, subject: &AuthenticatedSubject) -> SamlResult<()> {
        match &ctx.sign_message {
            Some(message) if message.must_show && !subject.sign_message_displayed => {
                Err(SamlError::SignMessageNotDisplayed)
            }
            _ => Ok(()),
        }
    }
}
