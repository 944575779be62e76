/// Errors from the identity provider's HTTP surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The provider endpoint answered with a non-success status.
    #[error("{operation} rejected (status {status:?}): {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True when the provider explicitly refused the credential,
    /// as opposed to a transport failure.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                status: Some(401 | 403),
                ..
            }
        )
    }
}
