use thiserror::Error;

/// Failure taxonomy for the authentication flow.
///
/// Callback failures never surface provider detail to the browser; they are
/// translated to the closed set of redirect codes from
/// [`AuthError::redirect_code`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("provider discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("state parameter missing from callback")]
    StateMissing,

    #[error("no pending login for state")]
    CodeVerifierMissing,

    #[error("pending login expired")]
    CodeVerifierExpired,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("identity resolution failed")]
    IdentityResolutionFailed,

    #[error("no valid credential")]
    Unauthenticated,
}

impl AuthError {
    /// Machine-readable code appended to the frontend login redirect.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            Self::StateMissing => "state_missing",
            Self::CodeVerifierMissing => "code_verifier_missing",
            Self::CodeVerifierExpired => "code_verifier_expired",
            _ => "authentication_failed",
        }
    }
}
