//! The login bootstrap flow: one page load from `Unknown` to a
//! terminal state, plus the user-triggered actions around it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use videre_gate::{Gate, GateConfig, MemoryStorage, UiState};
//!
//! let gate = Gate::new(config, Arc::new(MemoryStorage::new()), Arc::new(page));
//!
//! match gate.resolve().await {
//!     UiState::LoggedIn { session } => gate.handoff().perform(&session),
//!     UiState::LoggedOut { error } => show_login_controls(error),
//!     UiState::Unavailable { error } => show_outage_banner(&error),
//! }
//! ```

mod adapter;
mod bootstrap;
mod error;
mod handoff;
mod logout;
mod state;

pub use adapter::IdentityAdapter;
pub use bootstrap::{AlwaysAvailable, Bootstrapper, SdkProbe, UiState};
pub use error::GateError;
pub use handoff::{HandoffRedirector, HandoffTarget};
pub use logout::LogoutCoordinator;

pub(crate) use state::GateState;

use std::sync::Arc;

use crate::config::GateConfig;
use crate::nav::Navigator;
use crate::poll::{Clock, TokioClock};
use crate::provider::ProviderClient;
use crate::store::{CredentialStore, StorageBackend};
use crate::track::Tracker;

/// The assembled login gate: one credential store, one identity
/// adapter, and the flow components wired over them.
pub struct Gate<C = TokioClock> {
    state: GateState,
    adapter: Arc<IdentityAdapter>,
    bootstrapper: Bootstrapper<C>,
    handoff: HandoffRedirector,
    logout: LogoutCoordinator,
    tracker: Tracker,
}

impl Gate<TokioClock> {
    /// Assemble a gate over the host's storage and navigation surfaces.
    #[must_use]
    pub fn new(
        config: GateConfig,
        backend: Arc<dyn StorageBackend>,
        nav: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_parts(config, backend, nav, Arc::new(AlwaysAvailable), TokioClock)
    }
}

impl<C: Clock> Gate<C> {
    /// Full-control assembly: inject the SDK probe and the clock.
    #[must_use]
    pub fn with_parts(
        config: GateConfig,
        backend: Arc<dyn StorageBackend>,
        nav: Arc<dyn Navigator>,
        probe: Arc<dyn SdkProbe>,
        clock: C,
    ) -> Self {
        let GateConfig { provider, settings } = config;
        let state = GateState {
            client: Arc::new(ProviderClient::new(provider)),
            store: CredentialStore::new(backend),
            nav,
            settings: Arc::new(settings),
        };
        let adapter = Arc::new(IdentityAdapter::new(state.clone()));
        let tracker = Tracker::new(state.store.clone());
        Self {
            bootstrapper: Bootstrapper::new(state.clone(), adapter.clone(), probe, clock),
            handoff: HandoffRedirector::new(state.clone()),
            logout: LogoutCoordinator::new(state.clone()),
            adapter,
            tracker,
            state,
        }
    }

    /// Resolve the page's auth state; see [`Bootstrapper::resolve`].
    pub async fn resolve(&self) -> UiState {
        self.bootstrapper.resolve().await
    }

    #[must_use]
    pub fn adapter(&self) -> &IdentityAdapter {
        &self.adapter
    }

    #[must_use]
    pub fn handoff(&self) -> &HandoffRedirector {
        &self.handoff
    }

    #[must_use]
    pub fn logout(&self) -> &LogoutCoordinator {
        &self.logout
    }

    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.state.store
    }
}
