use std::sync::Arc;

use super::adapter::IdentityAdapter;
use super::error::GateError;
use super::state::GateState;
use crate::nav::without_query_keys;
use crate::poll::{self, Clock, TokioClock};
use crate::types::{Entitlement, PaymentReturn};

/// Query markers carried by a return from the payment flow.
const PAYMENT_QUERY_KEYS: &[&str] = &["payment", "plan"];

/// "Has the provider script become available yet."
///
/// The hosted login widget and the silent-session client both arrive as
/// a separately loaded script; until it shows up there is nothing to
/// initialize. Hosts that link the client in directly use
/// [`AlwaysAvailable`].
pub trait SdkProbe: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Probe for deployments where the provider client is always present.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl SdkProbe for AlwaysAvailable {
    fn is_available(&self) -> bool {
        true
    }
}

/// Terminal UI state for one page load.
#[derive(Debug)]
#[non_exhaustive]
pub enum UiState {
    /// Show the signed-in view; hand-off may proceed.
    LoggedIn { session: crate::types::AuthSession },
    /// Show the login controls, with an error banner when a callback
    /// just failed.
    LoggedOut { error: Option<String> },
    /// The provider script never loaded; show a disabled/error view,
    /// not a spinner.
    Unavailable { error: GateError },
}

/// Drives one page load from `Unknown` to a terminal state.
pub struct Bootstrapper<C = TokioClock> {
    state: GateState,
    adapter: Arc<IdentityAdapter>,
    probe: Arc<dyn SdkProbe>,
    clock: C,
}

impl<C: Clock> Bootstrapper<C> {
    pub(crate) fn new(
        state: GateState,
        adapter: Arc<IdentityAdapter>,
        probe: Arc<dyn SdkProbe>,
        clock: C,
    ) -> Self {
        Self {
            state,
            adapter,
            probe,
            clock,
        }
    }

    /// Resolve the page's auth state.
    ///
    /// Waits (bounded) for the provider SDK, absorbs a payment return,
    /// then either completes a pending callback or checks the existing
    /// session. Never hangs: the SDK wait is capped, and every failure
    /// lands in a terminal [`UiState`].
    pub async fn resolve(&self) -> UiState {
        let settings = &self.state.settings;
        if let Err(attempts) = poll::wait_until(
            &self.clock,
            settings.sdk_poll_attempts,
            settings.sdk_poll_interval,
            || self.probe.is_available(),
        )
        .await
        {
            let error = GateError::SdkUnavailable { attempts };
            tracing::error!(error = %error, "bootstrap halted");
            return UiState::Unavailable { error };
        }

        self.adapter.initialize();
        self.absorb_payment_return();

        if self.adapter.is_callback_url() {
            match self.adapter.complete_callback().await {
                Ok(session) => UiState::LoggedIn { session },
                Err(e) => {
                    tracing::error!(error = %e, "callback completion failed");
                    UiState::LoggedOut {
                        error: Some(e.to_string()),
                    }
                }
            }
        } else {
            match self.adapter.check_session().await {
                Some(session) => UiState::LoggedIn { session },
                None => UiState::LoggedOut { error: None },
            }
        }
    }

    /// Fold payment-status markers on the current URL into the stored
    /// entitlement, then strip them so a reload does not re-apply.
    fn absorb_payment_return(&self) {
        let current = self.state.nav.current_url();
        let Some(outcome) = PaymentReturn::from_url(&current) else {
            return;
        };
        match outcome {
            PaymentReturn::Completed(plan) => {
                self.state
                    .store
                    .set_entitlement(&Entitlement::activated(plan));
                tracing::info!(plan = %plan, "entitlement activated from payment return");
            }
            PaymentReturn::Cancelled => {
                tracing::info!("payment flow cancelled");
            }
        }
        self.state
            .nav
            .replace_url(&without_query_keys(&current, PAYMENT_QUERY_KEYS));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::config::GateConfig;
    use crate::testutil::{
        gate_state, sample_session, test_config, CountingProbe, ManualClock, StubNavigator,
    };
    use crate::types::Plan;

    fn bootstrapper_at(
        config: GateConfig,
        url: &str,
        probe: Arc<dyn SdkProbe>,
    ) -> (Bootstrapper<ManualClock>, Arc<StubNavigator>) {
        let nav = StubNavigator::at(url);
        let state = gate_state(config, nav.clone());
        let adapter = Arc::new(IdentityAdapter::new(state.clone()));
        (
            Bootstrapper::new(state, adapter, probe, ManualClock::default()),
            nav,
        )
    }

    #[tokio::test]
    async fn missing_sdk_ends_in_an_error_state_not_a_spinner() {
        let config = test_config().with_sdk_poll(4, Duration::from_millis(50));
        let (bootstrapper, _nav) = bootstrapper_at(
            config,
            "https://gate.example.com/",
            Arc::new(CountingProbe::never()),
        );

        match bootstrapper.resolve().await {
            UiState::Unavailable { error } => {
                assert!(matches!(error, GateError::SdkUnavailable { attempts: 4 }));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(bootstrapper.clock.sleeps.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn late_sdk_is_waited_for() {
        let config = test_config().with_sdk_poll(10, Duration::from_millis(50));
        let (bootstrapper, _nav) = bootstrapper_at(
            config,
            "https://gate.example.com/",
            Arc::new(CountingProbe::ready_after(3)),
        );

        match bootstrapper.resolve().await {
            UiState::LoggedOut { error: None } => {}
            other => panic!("expected LoggedOut, got {other:?}"),
        }
        assert_eq!(bootstrapper.clock.sleeps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn existing_session_resolves_to_logged_in() {
        let (bootstrapper, _nav) = bootstrapper_at(
            test_config(),
            "https://gate.example.com/",
            Arc::new(AlwaysAvailable),
        );
        bootstrapper.state.store.save_session(&sample_session());

        match bootstrapper.resolve().await {
            UiState::LoggedIn { session } => {
                assert_eq!(session.subject_id.as_str(), "auth0|abc123");
            }
            other => panic!("expected LoggedIn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_callback_resolves_to_logged_out_with_error() {
        let (bootstrapper, nav) = bootstrapper_at(
            test_config(),
            "https://gate.example.com/?error=access_denied&error_description=nope",
            Arc::new(AlwaysAvailable),
        );

        match bootstrapper.resolve().await {
            UiState::LoggedOut { error: Some(message) } => {
                assert!(message.contains("nope"));
            }
            other => panic!("expected LoggedOut with error, got {other:?}"),
        }
        // Diagnosable: the failed callback URL is untouched.
        assert!(nav.current().as_str().contains("error=access_denied"));
    }

    #[tokio::test]
    async fn payment_return_activates_entitlement_and_cleans_url() {
        let (bootstrapper, nav) = bootstrapper_at(
            test_config(),
            "https://gate.example.com/?payment=success&plan=weekly&utm_source=mail",
            Arc::new(AlwaysAvailable),
        );

        let _ = bootstrapper.resolve().await;

        let entitlement = bootstrapper.state.store.entitlement();
        assert!(entitlement.active);
        assert_eq!(entitlement.plan, Some(Plan::Weekly));

        let visible = nav.current();
        assert!(!visible.as_str().contains("payment="));
        assert!(!visible.as_str().contains("plan="));
        assert!(visible.as_str().contains("utm_source=mail"));
    }

    #[tokio::test]
    async fn cancelled_payment_changes_nothing_but_the_url() {
        let (bootstrapper, nav) = bootstrapper_at(
            test_config(),
            "https://gate.example.com/?payment=cancelled",
            Arc::new(AlwaysAvailable),
        );

        let _ = bootstrapper.resolve().await;

        assert!(!bootstrapper.state.store.entitlement().active);
        assert!(!nav.current().as_str().contains("payment="));
    }
}
