/// Error taxonomy for the session and polling core
use thiserror::Error;

use crate::auth::store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No credentials in the store. The session manager has already redirected.
    #[error("no stored session")]
    SessionAbsent,

    /// Login rejected the e-mail/password pair.
    #[error("invalid e-mail or password")]
    CredentialsInvalid,

    /// An authenticated call was answered with 401. The session has been ended.
    #[error("session expired")]
    AuthorizationExpired,

    /// 400/5xx and anything else the user can simply retry later.
    #[error("service temporarily unavailable ({status}): {message}")]
    Transient { status: u16, message: String },

    /// Body did not match the endpoint's schema.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// E-mail or password left blank; nothing was sent.
    #[error("e-mail and password must be non-empty")]
    EmptyCredential,

    /// City lookup requested with a blank name; nothing was sent.
    #[error("city name must be non-empty")]
    EmptyCityName,

    /// A submission of the same form is still in flight.
    #[error("a submission is already in progress")]
    SubmitInProgress,

    /// The poll policy's attempt or deadline bound was hit before a terminal status.
    #[error("gave up polling {handle} after {attempts} attempts")]
    PollAbandoned { handle: String, attempts: u32 },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("credential store: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    pub(crate) fn malformed(endpoint: &str, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error terminated the session and the user has been sent to login.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionAbsent | Self::AuthorizationExpired)
    }

    /// True for outcomes the user may retry without navigating anywhere.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CredentialsInvalid
                | Self::Transient { .. }
                | Self::Transport(_)
                | Self::EmptyCredential
                | Self::SubmitInProgress
        )
    }

    /// Message suitable for a non-blocking notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::CredentialsInvalid | Self::EmptyCredential => {
                "Wrong e-mail or password".to_string()
            }
            Self::Transient { .. } | Self::Transport(_) | Self::MalformedResponse { .. } => {
                "Something went wrong, please try again later".to_string()
            }
            Self::SubmitInProgress => "Please wait, still working on it".to_string(),
            Self::EmptyCityName => "Please enter a city name".to_string(),
            other => other.to_string(),
        }
    }
}
