use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;
use url::Url;

/// Identity-provider subject (OAuth `sub` claim).
///
/// Opaque and stable per authenticated identity. Consumers store this as
/// the sole link to the provider-side account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Anonymous visitor identifier for lightweight usage tracking.
///
/// Generated once per storage scope, unrelated to authentication, and
/// must survive logout. Only an explicit full data clear removes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct VisitorId(pub Ulid);

impl VisitorId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl std::str::FromStr for VisitorId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One authenticated session, owned by the bootstrapper and passed to
/// collaborators by reference. Created on a successful callback, read on
/// every page load, destroyed on logout or a provider-side mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub subject_id: SubjectId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl AuthSession {
    /// Local part of the email address, used as a display-name fallback.
    #[must_use]
    pub(crate) fn email_local_part(email: &str) -> &str {
        email.split('@').next().unwrap_or(email)
    }
}

/// Subscription plan offered on the plan-selection page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Daily,
    Weekly,
    Monthly,
}

impl Plan {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

/// Whether the current identity may reach the downstream workspace.
///
/// Independent of [`AuthSession`]: a user may be authenticated without an
/// active entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub active: bool,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub activated_at: Option<OffsetDateTime>,
}

impl Entitlement {
    /// No active entitlement.
    #[must_use]
    pub fn none() -> Self {
        Self {
            active: false,
            plan: None,
            activated_at: None,
        }
    }

    /// Entitlement activated right now for `plan`.
    #[must_use]
    pub fn activated(plan: Plan) -> Self {
        Self {
            active: true,
            plan: Some(plan),
            activated_at: Some(OffsetDateTime::now_utc()),
        }
    }
}

impl Default for Entitlement {
    fn default() -> Self {
        Self::none()
    }
}

/// Outcome of a return navigation from the external payment flow,
/// detected via query parameters on the gate page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentReturn {
    Completed(Plan),
    Cancelled,
}

impl PaymentReturn {
    /// Parse payment-status markers from a return URL.
    ///
    /// `payment=success` without a recognizable `plan` is treated as
    /// absent rather than guessed at.
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut status = None;
        let mut plan = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "payment" => status = Some(value.to_string()),
                "plan" => plan = value.parse::<Plan>().ok(),
                _ => {}
            }
        }
        match status.as_deref() {
            Some("success") => plan.map(Self::Completed),
            Some("cancelled" | "canceled") => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_case_insensitively() {
        assert_eq!("weekly".parse::<Plan>().unwrap(), Plan::Weekly);
        assert_eq!("  Monthly ".parse::<Plan>().unwrap(), Plan::Monthly);
        assert!("yearly".parse::<Plan>().is_err());
    }

    #[test]
    fn plan_serde_uses_lowercase() {
        let json = serde_json::to_string(&Plan::Daily).unwrap();
        assert_eq!(json, "\"daily\"");
    }

    #[test]
    fn entitlement_default_is_inactive() {
        let e = Entitlement::default();
        assert!(!e.active);
        assert!(e.plan.is_none());
        assert!(e.activated_at.is_none());
    }

    #[test]
    fn entitlement_activated_carries_plan_and_timestamp() {
        let e = Entitlement::activated(Plan::Weekly);
        assert!(e.active);
        assert_eq!(e.plan, Some(Plan::Weekly));
        assert!(e.activated_at.is_some());
    }

    #[test]
    fn payment_return_requires_known_plan_on_success() {
        let url: Url = "https://gate.example.com/?payment=success&plan=weekly"
            .parse()
            .unwrap();
        assert_eq!(
            PaymentReturn::from_url(&url),
            Some(PaymentReturn::Completed(Plan::Weekly))
        );

        let no_plan: Url = "https://gate.example.com/?payment=success".parse().unwrap();
        assert_eq!(PaymentReturn::from_url(&no_plan), None);

        let bad_plan: Url = "https://gate.example.com/?payment=success&plan=forever"
            .parse()
            .unwrap();
        assert_eq!(PaymentReturn::from_url(&bad_plan), None);
    }

    #[test]
    fn payment_return_detects_cancellation() {
        let url: Url = "https://gate.example.com/?payment=cancelled".parse().unwrap();
        assert_eq!(PaymentReturn::from_url(&url), Some(PaymentReturn::Cancelled));
    }

    #[test]
    fn payment_return_absent_on_bare_load() {
        let url: Url = "https://gate.example.com/".parse().unwrap();
        assert_eq!(PaymentReturn::from_url(&url), None);
    }

    #[test]
    fn visitor_id_roundtrips_through_string() {
        let id = VisitorId::generate();
        let parsed: VisitorId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn session_serde_roundtrip() {
        let session = AuthSession {
            subject_id: "auth0|abc123".into(),
            display_name: "pat".into(),
            email: Some("pat@example.com".into()),
            id_token: "tok1".into(),
            access_token: "at1".into(),
            refresh_token: None,
            issued_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&session).unwrap();
        let parsed: AuthSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subject_id, session.subject_id);
        assert_eq!(parsed.id_token, "tok1");
    }
}
