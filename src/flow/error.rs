use crate::error::Error;

/// Errors surfaced by the gate flow. All of them are handled at the
/// boundary where they occur; none should escape to crash the page.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GateError {
    /// The provider script never became available within the bounded
    /// poll window. The UI moves to a disabled/error state.
    #[error("identity SDK unavailable after {attempts} poll attempts")]
    SdkUnavailable { attempts: u32 },

    /// The callback exchange was rejected or failed in transit. The
    /// user stays anonymous and the callback URL is left untouched so
    /// the condition is diagnosable.
    #[error("callback exchange failed: {reason}")]
    CallbackExchange { reason: String },

    /// Tokens were obtained but the profile lookup failed. The session
    /// stays valid with a derived display name.
    #[error("profile fetch failed: {0}")]
    ProfileFetch(#[source] Error),

    /// The remote logout navigation could not be issued. Local
    /// credentials are already cleared when this is reported.
    #[error("logout navigation failed: {0}")]
    Logout(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("configuration error: {0}")]
    Config(String),
}

impl GateError {
    pub(crate) fn exchange(reason: impl Into<String>) -> Self {
        Self::CallbackExchange {
            reason: reason.into(),
        }
    }
}
