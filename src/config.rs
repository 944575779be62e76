use std::time::Duration;

use url::Url;

use crate::flow::GateError;
use crate::provider::ProviderConfig;
use crate::types::Plan;

/// How `check_session` treats an existing local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStrategy {
    /// Trust local state; the provider is only consulted on login.
    /// Matches the plain redirect/widget deployment.
    #[default]
    Redirect,
    /// Validate the session against the provider on each page load and
    /// renew once through the refresh-token grant when it is stale.
    SilentRenew,
}

/// Per-plan payment-link URLs.
#[derive(Debug, Clone)]
pub struct PaymentLinks {
    pub daily: Url,
    pub weekly: Url,
    pub monthly: Url,
}

impl PaymentLinks {
    #[must_use]
    pub fn for_plan(&self, plan: Plan) -> &Url {
        match plan {
            Plan::Daily => &self.daily,
            Plan::Weekly => &self.weekly,
            Plan::Monthly => &self.monthly,
        }
    }
}

/// Provider SDK cache namespaces cleared on logout, matched as
/// case-insensitive substrings of storage keys.
const DEFAULT_PROVIDER_CACHE_MARKERS: &[&str] = &["@@auth0spajs@@", "auth0."];

/// Shared gate settings used by every flow component.
#[derive(Clone)]
pub(crate) struct GateSettings {
    pub(crate) downstream_url: Url,
    pub(crate) plan_page_url: Url,
    pub(crate) payment_links: Option<PaymentLinks>,
    pub(crate) payment_return_url: Url,
    pub(crate) test_accounts: Vec<String>,
    pub(crate) retain_subject_on_logout: bool,
    pub(crate) sdk_poll_attempts: u32,
    pub(crate) sdk_poll_interval: Duration,
    pub(crate) provider_cache_markers: Vec<String>,
    pub(crate) logout_return_url: Url,
    pub(crate) strategy: SessionStrategy,
}

impl GateSettings {
    fn defaults(gate_origin: Url) -> Self {
        Self {
            // Placeholder; GateConfig::new overwrites both required URLs.
            downstream_url: gate_origin.clone(),
            plan_page_url: gate_origin.clone(),
            payment_links: None,
            payment_return_url: gate_origin.clone(),
            test_accounts: Vec::new(),
            retain_subject_on_logout: true,
            sdk_poll_attempts: 20,
            sdk_poll_interval: Duration::from_millis(250),
            provider_cache_markers: DEFAULT_PROVIDER_CACHE_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            logout_return_url: gate_origin,
            strategy: SessionStrategy::default(),
        }
    }

    pub(crate) fn is_test_account(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.test_accounts.iter().any(|a| *a == email)
    }
}

/// Gate configuration.
///
/// Required fields are constructor parameters; everything else has a
/// working default and a `with_*` override. Use
/// [`from_env()`](GateConfig::from_env) for convention-based setup.
pub struct GateConfig {
    pub(crate) provider: ProviderConfig,
    pub(crate) settings: GateSettings,
}

/// Root of the gate's own origin, derived from the redirect URI.
fn origin_of(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

impl GateConfig {
    /// Create a configuration with the three required destinations:
    /// the provider, the downstream workspace, and the plan-selection
    /// page.
    #[must_use]
    pub fn new(provider: ProviderConfig, downstream_url: Url, plan_page_url: Url) -> Self {
        let mut settings = GateSettings::defaults(origin_of(provider.redirect_uri()));
        settings.downstream_url = downstream_url;
        settings.plan_page_url = plan_page_url;
        Self { provider, settings }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `VIDERE_CLIENT_ID`: OAuth2 client id
    /// - `VIDERE_ISSUER`: provider issuer URL
    /// - `VIDERE_REDIRECT_URI`: callback URI on the gate's origin
    /// - `VIDERE_DOWNSTREAM_URL`: workspace application entry URL
    /// - `VIDERE_PLAN_PAGE_URL`: plan-selection page URL
    ///
    /// # Optional env vars
    /// - `VIDERE_AUTH_URL` / `VIDERE_TOKEN_URL` / `VIDERE_USERINFO_URL` /
    ///   `VIDERE_LOGOUT_URL`: endpoint overrides
    /// - `VIDERE_SCOPES`: comma-separated scope override
    /// - `VIDERE_PAYMENT_LINK_DAILY` / `_WEEKLY` / `_MONTHLY`: payment
    ///   links (all three or none)
    /// - `VIDERE_TEST_ACCOUNTS`: comma-separated allowlisted emails
    /// - `VIDERE_RETAIN_SUBJECT`: `"0"`/`"false"` clears the last-subject
    ///   memory on logout
    /// - `VIDERE_SILENT_RENEW`: `"1"`/`"true"` enables the silent-renew
    ///   strategy
    /// - `VIDERE_SDK_POLL_ATTEMPTS` / `VIDERE_SDK_POLL_INTERVAL_MS`
    /// - `VIDERE_LOGOUT_RETURN_URL`
    ///
    /// # Errors
    ///
    /// [`GateError::Config`] when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, GateError> {
        let provider = ProviderConfig::new(
            require_env("VIDERE_CLIENT_ID")?,
            require_url("VIDERE_ISSUER")?,
            require_url("VIDERE_REDIRECT_URI")?,
        );
        let provider = apply_endpoint_overrides(provider)?;

        let mut config = Self::new(
            provider,
            require_url("VIDERE_DOWNSTREAM_URL")?,
            require_url("VIDERE_PLAN_PAGE_URL")?,
        );

        if let Some(links) = optional_payment_links()? {
            config = config.with_payment_links(links);
        }
        if let Ok(accounts) = std::env::var("VIDERE_TEST_ACCOUNTS") {
            config = config.with_test_accounts(
                accounts.split(',').map(|a| a.trim().to_string()).collect(),
            );
        }
        if matches!(
            std::env::var("VIDERE_RETAIN_SUBJECT").as_deref(),
            Ok("0") | Ok("false")
        ) {
            config = config.with_retain_subject_on_logout(false);
        }
        if matches!(
            std::env::var("VIDERE_SILENT_RENEW").as_deref(),
            Ok("1") | Ok("true")
        ) {
            config = config.with_session_strategy(SessionStrategy::SilentRenew);
        }
        if let Ok(raw) = std::env::var("VIDERE_SDK_POLL_ATTEMPTS") {
            let attempts = raw
                .parse()
                .map_err(|_| GateError::Config(format!("VIDERE_SDK_POLL_ATTEMPTS: {raw}")))?;
            config.settings.sdk_poll_attempts = attempts;
        }
        if let Ok(raw) = std::env::var("VIDERE_SDK_POLL_INTERVAL_MS") {
            let ms: u64 = raw
                .parse()
                .map_err(|_| GateError::Config(format!("VIDERE_SDK_POLL_INTERVAL_MS: {raw}")))?;
            config.settings.sdk_poll_interval = Duration::from_millis(ms);
        }
        if let Ok(raw) = std::env::var("VIDERE_LOGOUT_RETURN_URL") {
            let url = raw
                .parse()
                .map_err(|e| GateError::Config(format!("VIDERE_LOGOUT_RETURN_URL: {e}")))?;
            config = config.with_logout_return_url(url);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_payment_links(mut self, links: PaymentLinks) -> Self {
        self.settings.payment_links = Some(links);
        self
    }

    /// Allowlisted emails that bypass the entitlement check. External
    /// configuration, not business logic.
    #[must_use]
    pub fn with_test_accounts(mut self, accounts: Vec<String>) -> Self {
        self.settings.test_accounts = accounts
            .into_iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    /// Whether logout keeps the last-subject memory (default: keep).
    #[must_use]
    pub fn with_retain_subject_on_logout(mut self, retain: bool) -> Self {
        self.settings.retain_subject_on_logout = retain;
        self
    }

    #[must_use]
    pub fn with_session_strategy(mut self, strategy: SessionStrategy) -> Self {
        self.settings.strategy = strategy;
        self
    }

    /// Cap on the provider-SDK availability poll.
    #[must_use]
    pub fn with_sdk_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.settings.sdk_poll_attempts = attempts;
        self.settings.sdk_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_provider_cache_markers(mut self, markers: Vec<String>) -> Self {
        self.settings.provider_cache_markers = markers;
        self
    }

    #[must_use]
    pub fn with_logout_return_url(mut self, url: Url) -> Self {
        self.settings.logout_return_url = url;
        self
    }

    /// Where the payment flow returns with its status markers.
    #[must_use]
    pub fn with_payment_return_url(mut self, url: Url) -> Self {
        self.settings.payment_return_url = url;
        self
    }
}

fn require_env(name: &'static str) -> Result<String, GateError> {
    std::env::var(name).map_err(|_| GateError::Config(format!("{name} is required")))
}

fn require_url(name: &'static str) -> Result<Url, GateError> {
    require_env(name)?
        .parse()
        .map_err(|e| GateError::Config(format!("{name}: {e}")))
}

fn optional_url(name: &'static str) -> Result<Option<Url>, GateError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| GateError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_endpoint_overrides(mut provider: ProviderConfig) -> Result<ProviderConfig, GateError> {
    if let Some(url) = optional_url("VIDERE_AUTH_URL")? {
        provider = provider.with_auth_url(url);
    }
    if let Some(url) = optional_url("VIDERE_TOKEN_URL")? {
        provider = provider.with_token_url(url);
    }
    if let Some(url) = optional_url("VIDERE_USERINFO_URL")? {
        provider = provider.with_userinfo_url(url);
    }
    if let Some(url) = optional_url("VIDERE_LOGOUT_URL")? {
        provider = provider.with_logout_url(url);
    }
    if let Ok(scopes) = std::env::var("VIDERE_SCOPES") {
        provider = provider.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
    }
    Ok(provider)
}

fn optional_payment_links() -> Result<Option<PaymentLinks>, GateError> {
    let daily = optional_url("VIDERE_PAYMENT_LINK_DAILY")?;
    let weekly = optional_url("VIDERE_PAYMENT_LINK_WEEKLY")?;
    let monthly = optional_url("VIDERE_PAYMENT_LINK_MONTHLY")?;
    match (daily, weekly, monthly) {
        (Some(daily), Some(weekly), Some(monthly)) => Ok(Some(PaymentLinks {
            daily,
            weekly,
            monthly,
        })),
        (None, None, None) => Ok(None),
        _ => Err(GateError::Config(
            "VIDERE_PAYMENT_LINK_{DAILY,WEEKLY,MONTHLY} must be set together".into(),
        )),
    }
}
