use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use url::Url;

use super::error::GateError;
use super::logout::LogoutCoordinator;
use super::state::GateState;
use crate::config::SessionStrategy;
use crate::nav::without_query_keys;
use crate::provider::{parse_id_token_claims, LoginHint, Profile, TokenResponse};
use crate::types::{AuthSession, SubjectId};

/// Query/fragment markers the provider puts on a callback return.
const CALLBACK_QUERY_KEYS: &[&str] = &["code", "state", "error", "error_description"];

/// Uniform capability surface over the provider's login flows.
///
/// Both deployments (full-page redirect to the hosted login, and the
/// silent-session variant that revalidates on every load) are driven
/// through the same eight operations, so page code never branches on
/// which flow is configured.
pub struct IdentityAdapter {
    state: GateState,
    initialized: AtomicBool,
    login_pending: AtomicBool,
}

#[derive(Debug, Default)]
struct CallbackMarkers {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    fragment_access_token: Option<String>,
    fragment_id_token: Option<String>,
    fragment_state: Option<String>,
}

impl CallbackMarkers {
    fn from_url(url: &Url) -> Self {
        let mut markers = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => markers.code = Some(value.into_owned()),
                "state" => markers.state = Some(value.into_owned()),
                "error" => markers.error = Some(value.into_owned()),
                "error_description" => markers.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        if let Some(fragment) = url.fragment() {
            for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
                match key.as_ref() {
                    "access_token" => markers.fragment_access_token = Some(value.into_owned()),
                    "id_token" => markers.fragment_id_token = Some(value.into_owned()),
                    "state" => markers.fragment_state = Some(value.into_owned()),
                    _ => {}
                }
            }
        }
        markers
    }

    fn present(&self) -> bool {
        (self.code.is_some() && self.state.is_some())
            || self.error.is_some()
            || self.fragment_access_token.is_some()
            || self.fragment_id_token.is_some()
    }
}

impl IdentityAdapter {
    pub(crate) fn new(state: GateState) -> Self {
        Self {
            state,
            initialized: AtomicBool::new(false),
            login_pending: AtomicBool::new(false),
        }
    }

    /// Idempotent: the first call wires the adapter up, every later call
    /// is a no-op. Returns whether this call did the work.
    pub fn initialize(&self) -> bool {
        let first = self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            tracing::debug!("identity adapter initialized");
        }
        first
    }

    /// Whether the current location carries provider success or error
    /// markers. False on a bare page load.
    #[must_use]
    pub fn is_callback_url(&self) -> bool {
        CallbackMarkers::from_url(&self.state.nav.current_url()).present()
    }

    /// Complete a pending callback with exactly one exchange attempt.
    ///
    /// On success the session is persisted and the visible URL is
    /// rewritten without the callback markers, so a reload does not
    /// re-trigger the exchange. On failure the URL is left untouched.
    ///
    /// # Errors
    ///
    /// [`GateError::CallbackExchange`] when the provider reported an
    /// error, the anti-forgery state does not match, or the code
    /// exchange is rejected.
    pub async fn complete_callback(&self) -> Result<AuthSession, GateError> {
        let current = self.state.nav.current_url();
        let markers = CallbackMarkers::from_url(&current);

        if let Some(error) = markers.error {
            let reason = markers.error_description.unwrap_or(error);
            tracing::warn!(reason = %reason, "provider returned an error callback");
            return Err(GateError::exchange(reason));
        }

        let token = if let Some(access_token) = markers.fragment_access_token {
            self.accept_fragment_tokens(access_token, markers.fragment_id_token, markers.fragment_state)?
        } else {
            self.exchange_code_markers(markers.code, markers.state).await?
        };

        let session = self.build_session(token).await?;
        self.state.store.save_session(&session);
        self.state.store.remember_subject(&session.subject_id);
        self.state.store.clear_login_handshake();

        let mut cleaned = without_query_keys(&current, CALLBACK_QUERY_KEYS);
        cleaned.set_fragment(None);
        self.state.nav.replace_url(&cleaned);

        tracing::info!(subject = %session.subject_id, "callback completed");
        Ok(session)
    }

    /// Implicit-flow tokens arrive in the fragment; there is nothing to
    /// exchange. A fragment state is still checked when one was stashed.
    fn accept_fragment_tokens(
        &self,
        access_token: String,
        id_token: Option<String>,
        fragment_state: Option<String>,
    ) -> Result<TokenResponse, GateError> {
        let (stored_state, _) = self.state.store.login_handshake();
        if let (Some(stored), Some(received)) = (stored_state, fragment_state) {
            if stored != received {
                tracing::warn!("fragment state mismatch");
                return Err(GateError::exchange("state mismatch"));
            }
        }
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: None,
            refresh_token: None,
            id_token,
        })
    }

    async fn exchange_code_markers(
        &self,
        code: Option<String>,
        received_state: Option<String>,
    ) -> Result<TokenResponse, GateError> {
        let code = code.ok_or_else(|| GateError::exchange("missing code"))?;
        let received_state =
            received_state.ok_or_else(|| GateError::exchange("missing state"))?;

        let (stored_state, stored_verifier) = self.state.store.login_handshake();
        let stored_state =
            stored_state.ok_or_else(|| GateError::exchange("no login in progress"))?;
        if received_state != stored_state {
            tracing::warn!("anti-forgery state mismatch");
            return Err(GateError::exchange("state mismatch"));
        }
        let verifier =
            stored_verifier.ok_or_else(|| GateError::exchange("missing code verifier"))?;

        self.state
            .client
            .exchange_code(&code, &verifier)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "token exchange failed");
                GateError::exchange(e.to_string())
            })
    }

    /// Assemble the session from the token response, preferring the
    /// userinfo profile and degrading to unverified id-token claims when
    /// the profile fetch fails.
    async fn build_session(&self, token: TokenResponse) -> Result<AuthSession, GateError> {
        let claims = token.id_token.as_deref().and_then(parse_id_token_claims);

        let profile = match self.state.client.get_user_info(&token.access_token).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, "profile fetch failed, deriving display fields");
                None
            }
        };

        let subject_id: SubjectId = profile
            .as_ref()
            .map(|p| p.sub.clone())
            .or_else(|| claims.as_ref().map(|c| c.sub.clone()))
            .ok_or_else(|| GateError::exchange("no subject in callback response"))?;

        let email = profile
            .as_ref()
            .and_then(|p| p.email.clone())
            .or_else(|| claims.as_ref().and_then(|c| c.email.clone()));
        let name = profile
            .as_ref()
            .and_then(|p| p.name.clone())
            .or_else(|| claims.as_ref().and_then(|c| c.name.clone()));

        let display_name = derive_display_name(name.as_deref(), email.as_deref(), &subject_id);

        // Providers only issue an id token when asked for openid scope;
        // the hand-off then carries the access token instead.
        let id_token = token
            .id_token
            .unwrap_or_else(|| token.access_token.clone());

        Ok(AuthSession {
            subject_id,
            display_name,
            email,
            id_token,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            issued_at: OffsetDateTime::now_utc(),
        })
    }

    /// Synchronous local check, valid for UI decisions on both
    /// strategies.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.store.load_session().is_some()
    }

    /// Resolve the current session according to the configured strategy.
    ///
    /// `Redirect` trusts local state. `SilentRenew` revalidates against
    /// the provider: a rejected token is renewed once through the
    /// refresh grant, a provider-side mismatch destroys the local
    /// session, and a pure transport failure keeps it.
    pub async fn check_session(&self) -> Option<AuthSession> {
        let session = self.state.store.load_session()?;
        match self.state.settings.strategy {
            SessionStrategy::Redirect => Some(session),
            SessionStrategy::SilentRenew => self.revalidate(session).await,
        }
    }

    async fn revalidate(&self, session: AuthSession) -> Option<AuthSession> {
        match self.state.client.get_user_info(&session.access_token).await {
            Ok(_) => Some(session),
            Err(e) if e.is_auth_rejection() => {
                let Some(refresh_token) = session.refresh_token.clone() else {
                    tracing::info!("provider no longer recognizes the session");
                    self.state.store.clear_session();
                    return None;
                };
                match self.state.client.refresh(&refresh_token).await {
                    Ok(token) => {
                        let renewed = AuthSession {
                            id_token: token.id_token.unwrap_or(session.id_token),
                            access_token: token.access_token,
                            refresh_token: token.refresh_token.or(Some(refresh_token)),
                            issued_at: OffsetDateTime::now_utc(),
                            ..session
                        };
                        self.state.store.save_session(&renewed);
                        tracing::info!(subject = %renewed.subject_id, "session renewed");
                        Some(renewed)
                    }
                    Err(e) => {
                        tracing::info!(error = %e, "session renewal refused");
                        self.state.store.clear_session();
                        None
                    }
                }
            }
            Err(e) => {
                // Transport failure, not a verdict on the session.
                tracing::warn!(error = %e, "session check unreachable, keeping local state");
                Some(session)
            }
        }
    }

    /// Fetch the profile for the current session.
    ///
    /// # Errors
    ///
    /// [`GateError::NotAuthenticated`] without a session,
    /// [`GateError::ProfileFetch`] when the lookup fails.
    pub async fn get_profile(&self) -> Result<Profile, GateError> {
        let session = self
            .state
            .store
            .load_session()
            .ok_or(GateError::NotAuthenticated)?;
        self.state
            .client
            .get_user_info(&session.access_token)
            .await
            .map_err(GateError::ProfileFetch)
    }

    /// Bearer token for the hand-off.
    ///
    /// # Errors
    ///
    /// [`GateError::NotAuthenticated`] without a session.
    pub fn get_token(&self) -> Result<String, GateError> {
        self.state
            .store
            .load_session()
            .map(|s| s.id_token)
            .ok_or(GateError::NotAuthenticated)
    }

    /// Start the authorization redirect.
    ///
    /// Concurrent triggers collapse to one navigation: while a login is
    /// pending, further calls are ignored, which is the library-side
    /// equivalent of disabling the login control. Returns whether this
    /// call issued the navigation.
    pub fn start_login(&self, hint: Option<LoginHint>) -> bool {
        if self
            .login_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("login already pending, trigger ignored");
            return false;
        }

        let request = self.state.client.authorization_url(hint);
        self.state
            .store
            .stash_login_handshake(&request.state, &request.code_verifier);

        if self.state.nav.navigate(&request.url) {
            true
        } else {
            // Host refused the navigation; re-arm the trigger.
            self.login_pending.store(false, Ordering::SeqCst);
            tracing::warn!("authorization navigation refused by host");
            false
        }
    }

    /// Clear local credentials and leave for the provider's logout
    /// endpoint. Terminal; see [`LogoutCoordinator::logout`].
    pub fn start_logout(&self) -> Result<(), GateError> {
        LogoutCoordinator::new(self.state.clone()).logout()
    }
}

fn derive_display_name(name: Option<&str>, email: Option<&str>, subject: &SubjectId) -> String {
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        return name.to_owned();
    }
    if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
        return AuthSession::email_local_part(email).to_owned();
    }
    subject.to_string()
}
