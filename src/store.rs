use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::types::{AuthSession, Entitlement, Plan, SubjectId, VisitorId};

/// Storage keys. Conceptual names, one value per key; every write is a
/// whole-value replace of a single key.
pub(crate) mod keys {
    pub const SUBJECT: &str = "videre.session.subject";
    pub const DISPLAY_NAME: &str = "videre.session.name";
    pub const EMAIL: &str = "videre.session.email";
    pub const ID_TOKEN: &str = "videre.session.id_token";
    pub const ACCESS_TOKEN: &str = "videre.session.access_token";
    pub const REFRESH_TOKEN: &str = "videre.session.refresh_token";
    pub const ISSUED_AT: &str = "videre.session.issued_at";
    pub const VISITOR: &str = "videre.visitor";
    pub const ENTITLEMENT: &str = "videre.entitlement";
    pub const PENDING_PLAN: &str = "videre.pending_plan";
    pub const LAST_SUBJECT: &str = "videre.last_subject";
    pub const LOGIN_STATE: &str = "videre.auth.state";
    pub const LOGIN_VERIFIER: &str = "videre.auth.verifier";

    pub(super) const SESSION_KEYS: &[&str] = &[
        SUBJECT,
        DISPLAY_NAME,
        EMAIL,
        ID_TOKEN,
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        ISSUED_AT,
        LOGIN_STATE,
        LOGIN_VERIFIER,
    ];
}

/// Persistent key-value storage supplied by the host.
///
/// `localStorage` in a browser shim; anything with the same semantics
/// elsewhere. Implementations must be safe to call before any identity
/// client exists and must not panic when storage is full or disabled.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    /// Returns false when the write was dropped (storage full/disabled).
    fn put(&self, key: &str, value: &str) -> bool;

    fn remove(&self, key: &str);

    /// All currently stored keys.
    fn keys(&self) -> Vec<String>;
}

/// In-memory [`StorageBackend`] for tests, dev shells, and hosts without
/// persistent storage.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> bool {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        true
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.values.lock().keys().cloned().collect()
    }
}

/// Session-artifact store over a [`StorageBackend`].
///
/// All operations are synchronous and tolerate a degraded backend:
/// dropped writes and absent reads simply leave the caller looking
/// logged out.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn StorageBackend>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by process memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn put(&self, key: &str, value: &str) {
        if !self.backend.put(key, value) {
            tracing::debug!(key, "storage write dropped");
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.backend.get(key)
    }

    pub fn remove(&self, key: &str) {
        self.backend.remove(key);
    }

    /// Remove every key whose lowercased form contains the lowercased
    /// `marker`.
    ///
    /// Contains-match rather than prefix-match: provider SDKs version
    /// their cache key names, and a logout must not leave remnants
    /// behind just because the exact spelling moved.
    pub fn clear_by_prefix(&self, marker: &str) {
        let needle = marker.to_lowercase();
        if needle.is_empty() {
            return;
        }
        for key in self.backend.keys() {
            if key.to_lowercase().contains(&needle) {
                self.backend.remove(&key);
            }
        }
    }

    /// Remove everything, the visitor id included.
    pub fn clear_all(&self) {
        for key in self.backend.keys() {
            self.backend.remove(&key);
        }
    }

    // ── Session ────────────────────────────────────────────────────

    pub fn save_session(&self, session: &AuthSession) {
        self.put(keys::SUBJECT, session.subject_id.as_str());
        self.put(keys::DISPLAY_NAME, &session.display_name);
        match &session.email {
            Some(email) => self.put(keys::EMAIL, email),
            None => self.remove(keys::EMAIL),
        }
        self.put(keys::ID_TOKEN, &session.id_token);
        self.put(keys::ACCESS_TOKEN, &session.access_token);
        match &session.refresh_token {
            Some(token) => self.put(keys::REFRESH_TOKEN, token),
            None => self.remove(keys::REFRESH_TOKEN),
        }
        let issued = session
            .issued_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        self.put(keys::ISSUED_AT, &issued);
    }

    /// Load the persisted session, absent unless every required field is
    /// present and well formed.
    #[must_use]
    pub fn load_session(&self) -> Option<AuthSession> {
        let subject_id: SubjectId = self.get(keys::SUBJECT)?.into();
        let id_token = self.get(keys::ID_TOKEN)?;
        let access_token = self.get(keys::ACCESS_TOKEN)?;
        let issued_at = OffsetDateTime::parse(
            &self.get(keys::ISSUED_AT)?,
            &time::format_description::well_known::Rfc3339,
        )
        .ok()?;

        Some(AuthSession {
            display_name: self.get(keys::DISPLAY_NAME).unwrap_or_default(),
            email: self.get(keys::EMAIL),
            subject_id,
            id_token,
            access_token,
            refresh_token: self.get(keys::REFRESH_TOKEN),
            issued_at,
        })
    }

    /// Remove every session field. The visitor id, the entitlement, and
    /// the last-subject memory are not session fields.
    pub fn clear_session(&self) {
        for key in keys::SESSION_KEYS {
            self.backend.remove(key);
        }
    }

    // ── Visitor id ─────────────────────────────────────────────────

    /// Stable visitor id, created on first use.
    ///
    /// With a degraded backend the id cannot persist; a fresh one is
    /// returned per call and return-visit detection degrades with it.
    #[must_use]
    pub fn visitor_id(&self) -> VisitorId {
        if let Some(id) = self.get(keys::VISITOR).and_then(|v| v.parse().ok()) {
            return id;
        }
        let id = VisitorId::generate();
        self.put(keys::VISITOR, &id.to_string());
        id
    }

    // ── Entitlement ────────────────────────────────────────────────

    #[must_use]
    pub fn entitlement(&self) -> Entitlement {
        self.get(keys::ENTITLEMENT)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn set_entitlement(&self, entitlement: &Entitlement) {
        match serde_json::to_string(entitlement) {
            Ok(json) => self.put(keys::ENTITLEMENT, &json),
            Err(e) => tracing::warn!(error = %e, "entitlement not serializable"),
        }
    }

    // ── Pending plan selection ─────────────────────────────────────

    /// Remember a plan picked before the user authenticated.
    pub fn stash_pending_plan(&self, plan: Plan) {
        self.put(keys::PENDING_PLAN, plan.as_str());
    }

    /// Consume the pending plan selection. Read-then-delete: a second
    /// call finds nothing.
    #[must_use]
    pub fn take_pending_plan(&self) -> Option<Plan> {
        let plan = self.get(keys::PENDING_PLAN)?.parse().ok();
        self.remove(keys::PENDING_PLAN);
        plan
    }

    // ── Last-subject memory ────────────────────────────────────────

    /// Record the subject that last completed a login, used to tell a
    /// returning identity from a brand-new one.
    pub fn remember_subject(&self, subject: &SubjectId) {
        self.put(keys::LAST_SUBJECT, subject.as_str());
    }

    #[must_use]
    pub fn last_subject(&self) -> Option<SubjectId> {
        self.get(keys::LAST_SUBJECT).map(Into::into)
    }

    pub fn forget_subject(&self) {
        self.remove(keys::LAST_SUBJECT);
    }

    // ── Login handshake material ───────────────────────────────────

    pub(crate) fn stash_login_handshake(&self, state: &str, verifier: &str) {
        self.put(keys::LOGIN_STATE, state);
        self.put(keys::LOGIN_VERIFIER, verifier);
    }

    pub(crate) fn login_handshake(&self) -> (Option<String>, Option<String>) {
        (self.get(keys::LOGIN_STATE), self.get(keys::LOGIN_VERIFIER))
    }

    pub(crate) fn clear_login_handshake(&self) {
        self.remove(keys::LOGIN_STATE);
        self.remove(keys::LOGIN_VERIFIER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that drops every write, as a disabled browser storage does.
    struct DisabledStorage;

    impl StorageBackend for DisabledStorage {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
        fn put(&self, _key: &str, _value: &str) -> bool {
            false
        }
        fn remove(&self, _key: &str) {}
        fn keys(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn sample_session() -> AuthSession {
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

    #[test]
    fn put_get_remove_roundtrip() {
        let store = CredentialStore::in_memory();
        store.put("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn session_roundtrip() {
        let store = CredentialStore::in_memory();
        let session = sample_session();
        store.save_session(&session);

        let loaded = store.load_session().expect("session present");
        assert_eq!(loaded.subject_id, session.subject_id);
        assert_eq!(loaded.display_name, "pat");
        assert_eq!(loaded.email.as_deref(), Some("pat@example.com"));
        assert_eq!(loaded.id_token, "tok1");
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt1"));
    }

    #[test]
    fn session_absent_when_token_missing() {
        let store = CredentialStore::in_memory();
        store.save_session(&sample_session());
        store.remove(keys::ID_TOKEN);
        assert!(store.load_session().is_none());
    }

    #[test]
    fn clear_session_spares_visitor_entitlement_and_last_subject() {
        let store = CredentialStore::in_memory();
        let visitor = store.visitor_id();
        store.set_entitlement(&Entitlement::activated(Plan::Daily));
        store.save_session(&sample_session());
        store.remember_subject(&"auth0|abc123".into());

        store.clear_session();

        assert!(store.load_session().is_none());
        assert_eq!(store.visitor_id(), visitor);
        assert!(store.entitlement().active);
        assert!(store.last_subject().is_some());
    }

    #[test]
    fn visitor_id_is_stable_until_full_clear() {
        let store = CredentialStore::in_memory();
        let first = store.visitor_id();
        assert_eq!(store.visitor_id(), first);
        assert_eq!(store.visitor_id(), first);

        store.clear_all();
        assert_ne!(store.visitor_id(), first);
    }

    #[test]
    fn disabled_storage_degrades_to_logged_out() {
        let store = CredentialStore::new(Arc::new(DisabledStorage));
        store.save_session(&sample_session());
        assert!(store.load_session().is_none());

        // Visitor ids still mint, they just cannot persist.
        let a = store.visitor_id();
        let b = store.visitor_id();
        assert_ne!(a, b);
    }

    #[test]
    fn clear_by_prefix_matches_substring_case_insensitively() {
        let store = CredentialStore::in_memory();
        store.put("@@auth0spajs@@::client-1", "cache");
        store.put("Auth0.ssodata", "cache");
        store.put("com.AUTH0.auth.some-nonce", "cache");
        store.put("videre.visitor", "keep");

        store.clear_by_prefix("auth0");

        assert_eq!(store.get("@@auth0spajs@@::client-1"), None);
        assert_eq!(store.get("Auth0.ssodata"), None);
        assert_eq!(store.get("com.AUTH0.auth.some-nonce"), None);
        assert_eq!(store.get("videre.visitor").as_deref(), Some("keep"));
    }

    #[test]
    fn clear_by_prefix_ignores_empty_marker() {
        let store = CredentialStore::in_memory();
        store.put("anything", "v");
        store.clear_by_prefix("");
        assert_eq!(store.get("anything").as_deref(), Some("v"));
    }

    #[test]
    fn pending_plan_is_consumed_exactly_once() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.take_pending_plan(), None);

        store.stash_pending_plan(Plan::Weekly);
        assert_eq!(store.take_pending_plan(), Some(Plan::Weekly));
        assert_eq!(store.take_pending_plan(), None);
    }

    #[test]
    fn entitlement_roundtrip_and_default() {
        let store = CredentialStore::in_memory();
        assert!(!store.entitlement().active);

        store.set_entitlement(&Entitlement::activated(Plan::Monthly));
        let e = store.entitlement();
        assert!(e.active);
        assert_eq!(e.plan, Some(Plan::Monthly));
    }

    #[test]
    fn login_handshake_stash_and_clear() {
        let store = CredentialStore::in_memory();
        store.stash_login_handshake("state-1", "verifier-1");
        assert_eq!(
            store.login_handshake(),
            (Some("state-1".into()), Some("verifier-1".into()))
        );
        store.clear_login_handshake();
        assert_eq!(store.login_handshake(), (None, None));
    }
}
