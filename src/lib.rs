#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod flow;
pub mod nav;
pub mod poll;
pub mod provider;
pub mod store;
pub mod track;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenient access
pub use config::{GateConfig, PaymentLinks, SessionStrategy};
pub use error::Error;
pub use flow::{
    AlwaysAvailable, Bootstrapper, Gate, GateError, HandoffRedirector, HandoffTarget,
    IdentityAdapter, LogoutCoordinator, SdkProbe, UiState,
};
pub use nav::Navigator;
pub use poll::{Clock, TokioClock};
pub use provider::{
    parse_id_token_claims, AuthorizationRequest, IdTokenClaims, LoginHint, Profile,
    ProviderClient, ProviderConfig, TokenResponse,
};
pub use store::{CredentialStore, MemoryStorage, StorageBackend};
pub use track::{ClickEvent, Review, Tracker};
pub use types::{AuthSession, Entitlement, PaymentReturn, Plan, SubjectId, VisitorId};
