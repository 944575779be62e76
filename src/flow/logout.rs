use super::error::GateError;
use super::state::GateState;

/// Clears the device and leaves for the provider's logout endpoint.
pub struct LogoutCoordinator {
    state: GateState,
}

impl LogoutCoordinator {
    pub(crate) fn new(state: GateState) -> Self {
        Self { state }
    }

    /// Terminal action: no script logic may assume control resumes on
    /// this page after calling it.
    ///
    /// Local credentials are cleared before the navigation is attempted,
    /// so the device never retains a usable session even when the
    /// provider endpoint is unreachable. The visitor id survives; the
    /// last-subject memory follows the configured retention policy.
    ///
    /// # Errors
    ///
    /// [`GateError::Logout`] when the host refuses the navigation.
    /// Local state is already cleared by then.
    pub fn logout(&self) -> Result<(), GateError> {
        let store = &self.state.store;
        let settings = &self.state.settings;

        store.clear_session();
        for marker in &settings.provider_cache_markers {
            store.clear_by_prefix(marker);
        }
        if !settings.retain_subject_on_logout {
            store.forget_subject();
        }

        let url = self.state.client.logout_url(&settings.logout_return_url);
        tracing::info!(host = url.host_str().unwrap_or_default(), "logout navigation");
        if self.state.nav.navigate(&url) {
            Ok(())
        } else {
            tracing::warn!("logout navigation refused; local credentials already cleared");
            Err(GateError::Logout("navigation refused by host".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GateConfig;
    use crate::testutil::{gate_state, sample_session, test_config, StubNavigator};

    fn coordinator(config: GateConfig) -> (LogoutCoordinator, Arc<StubNavigator>) {
        let nav = StubNavigator::at("https://gate.example.com/");
        let state = gate_state(config, nav.clone());
        (LogoutCoordinator::new(state), nav)
    }

    #[test]
    fn logout_clears_session_and_provider_cache_but_not_the_visitor() {
        let (coordinator, nav) = coordinator(test_config());
        let store = &coordinator.state.store;
        store.save_session(&sample_session());
        store.put("@@auth0spajs@@::client-1", "cached-token");
        let visitor = store.visitor_id();

        coordinator.logout().unwrap();

        assert!(store.load_session().is_none());
        assert_eq!(store.get("@@auth0spajs@@::client-1"), None);
        assert_eq!(store.visitor_id(), visitor);

        let url = nav.last_navigation().expect("navigated to provider logout");
        assert!(url.as_str().starts_with("https://id.example.com/v2/logout?"));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "returnTo" && v == "https://gate.example.com/"));
    }

    #[test]
    fn refused_logout_navigation_still_clears_the_device() {
        let (coordinator, nav) = coordinator(test_config());
        let store = &coordinator.state.store;
        store.save_session(&sample_session());
        nav.refuse_navigations(true);

        let err = coordinator.logout().unwrap_err();
        assert!(matches!(err, GateError::Logout(_)));
        assert!(store.load_session().is_none());
    }

    #[test]
    fn subject_memory_follows_the_retention_policy() {
        let (retaining, _nav) = coordinator(test_config());
        retaining.state.store.remember_subject(&"auth0|abc123".into());
        retaining.logout().unwrap();
        assert!(retaining.state.store.last_subject().is_some());

        let (clearing, _nav) = coordinator(test_config().with_retain_subject_on_logout(false));
        clearing.state.store.remember_subject(&"auth0|abc123".into());
        clearing.logout().unwrap();
        assert!(clearing.state.store.last_subject().is_none());
    }

    #[test]
    fn logout_with_nothing_stored_is_harmless() {
        let (coordinator, nav) = coordinator(test_config());
        coordinator.logout().unwrap();
        assert_eq!(nav.navigation_count(), 1);
    }
}
