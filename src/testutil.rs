//! Shared stubs for the host surfaces.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use url::Url;

use crate::config::GateConfig;
use crate::flow::{GateState, SdkProbe};
use crate::nav::Navigator;
use crate::poll::Clock;
use crate::provider::{ProviderClient, ProviderConfig};
use crate::store::CredentialStore;
use crate::types::AuthSession;

/// Navigator that records instead of navigating.
pub(crate) struct StubNavigator {
    url: Mutex<Url>,
    navigations: Mutex<Vec<Url>>,
    replaced: Mutex<Vec<Url>>,
    refuse: AtomicBool,
}

impl StubNavigator {
    pub(crate) fn at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(url.parse().expect("test URL parses")),
            navigations: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
        })
    }

    pub(crate) fn refuse_navigations(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn current(&self) -> Url {
        self.url.lock().clone()
    }

    pub(crate) fn navigation_count(&self) -> usize {
        self.navigations.lock().len()
    }

    pub(crate) fn last_navigation(&self) -> Option<Url> {
        self.navigations.lock().last().cloned()
    }

    pub(crate) fn replaced_count(&self) -> usize {
        self.replaced.lock().len()
    }
}

impl Navigator for StubNavigator {
    fn current_url(&self) -> Url {
        self.url.lock().clone()
    }

    fn navigate(&self, url: &Url) -> bool {
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        self.navigations.lock().push(url.clone());
        true
    }

    fn replace_url(&self, url: &Url) {
        *self.url.lock() = url.clone();
        self.replaced.lock().push(url.clone());
    }
}

/// Clock that counts sleep calls and returns immediately.
#[derive(Default)]
pub(crate) struct ManualClock {
    pub(crate) sleeps: AtomicU32,
}

impl Clock for ManualClock {
    fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}

/// Probe that reports available from the nth call on.
pub(crate) struct CountingProbe {
    ready_after: u32,
    calls: AtomicU32,
}

impl CountingProbe {
    pub(crate) fn ready_after(n: u32) -> Self {
        Self {
            ready_after: n,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn never() -> Self {
        Self::ready_after(u32::MAX)
    }
}

impl SdkProbe for CountingProbe {
    fn is_available(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ready_after
    }
}

pub(crate) fn test_provider_config(issuer: &str) -> ProviderConfig {
    ProviderConfig::new(
        "test-client",
        issuer.parse().expect("issuer parses"),
        "https://gate.example.com/".parse().expect("redirect parses"),
    )
}

pub(crate) fn test_config() -> GateConfig {
    test_config_with_issuer("https://id.example.com")
}

pub(crate) fn test_config_with_issuer(issuer: &str) -> GateConfig {
    GateConfig::new(
        test_provider_config(issuer),
        "https://app.example.com/workspace".parse().expect("url parses"),
        "https://gate.example.com/plans".parse().expect("url parses"),
    )
}

pub(crate) fn gate_state(config: GateConfig, nav: Arc<StubNavigator>) -> GateState {
    let GateConfig { provider, settings } = config;
    GateState {
        client: Arc::new(ProviderClient::new(provider)),
        store: CredentialStore::in_memory(),
        nav,
        settings: Arc::new(settings),
    }
}

pub(crate) fn sample_session() -> AuthSession {
    AuthSession {
        subject_id: "auth0|abc123".into(),
        display_name: "pat".into(),
        email: Some("pat@example.com".into()),
        id_token: "tok1".into(),
        access_token: "at1".into(),
        refresh_token: Some("rt1".into()),
        issued_at: OffsetDateTime::now_utc(),
    }
}

/// Unsigned JWT-shaped id token for claim-parsing paths.
pub(crate) fn fake_id_token(sub: &str, name: Option<&str>, email: Option<&str>) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let mut claims = serde_json::json!({ "sub": sub });
    if let Some(name) = name {
        claims["name"] = serde_json::Value::String(name.to_owned());
    }
    if let Some(email) = email {
        claims["email"] = serde_json::Value::String(email.to_owned());
    }
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
