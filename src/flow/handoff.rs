use time::OffsetDateTime;
use url::Url;

use super::state::GateState;
use crate::types::{AuthSession, Entitlement, Plan};

/// Where a signed-in user goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandoffTarget {
    /// Downstream workspace, carrying the session.
    Workspace(Url),
    /// Payment flow for a plan picked before login.
    Payment { url: Url, plan: Plan },
    /// Plan-selection page; no entitlement, nothing pending.
    PlanSelection(Url),
}

impl HandoffTarget {
    #[must_use]
    pub fn url(&self) -> &Url {
        match self {
            Self::Workspace(url) | Self::PlanSelection(url) => url,
            Self::Payment { url, .. } => url,
        }
    }
}

/// Builds the outbound hand-off URL and performs the one-shot
/// navigation that leaves the gate.
pub struct HandoffRedirector {
    state: GateState,
}

impl HandoffRedirector {
    pub(crate) fn new(state: GateState) -> Self {
        Self { state }
    }

    /// Outbound URL for `session` under `entitlement`.
    ///
    /// A pending plan selection is consumed here, exactly once, at the
    /// moment the entitlement is evaluated.
    #[must_use]
    pub fn build_handoff_url(&self, session: &AuthSession, entitlement: &Entitlement) -> Url {
        self.resolve_target(session, entitlement).url().clone()
    }

    /// Like [`build_handoff_url`](Self::build_handoff_url), keeping the
    /// destination kind.
    #[must_use]
    pub fn resolve_target(&self, session: &AuthSession, entitlement: &Entitlement) -> HandoffTarget {
        let settings = &self.state.settings;
        // Consumed regardless of the outcome: at-most-once semantics.
        let pending = self.state.store.take_pending_plan();

        let allowlisted = session
            .email
            .as_deref()
            .is_some_and(|email| settings.is_test_account(email));
        if entitlement.active || allowlisted {
            return HandoffTarget::Workspace(self.workspace_url(session));
        }

        if let Some(plan) = pending {
            if let Some(links) = &settings.payment_links {
                return HandoffTarget::Payment {
                    url: self.payment_url(links.for_plan(plan), plan, session),
                    plan,
                };
            }
            tracing::warn!(plan = %plan, "pending plan with no payment links configured");
        }

        HandoffTarget::PlanSelection(self.plan_page_url(session))
    }

    /// Resolve against the stored entitlement and navigate. The bearer
    /// token rides only in the URL; log lines carry the destination, not
    /// the query.
    pub fn perform(&self, session: &AuthSession) {
        let entitlement = self.state.store.entitlement();
        let target = self.resolve_target(session, &entitlement);
        let url = target.url();
        tracing::info!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "hand-off navigation"
        );
        if !self.state.nav.navigate(url) {
            tracing::warn!("hand-off navigation refused by host");
        }
    }

    fn workspace_url(&self, session: &AuthSession) -> Url {
        let mut url = self.state.settings.downstream_url.clone();
        url.query_pairs_mut()
            // Fresh workspace instance, not a resume of prior state.
            .append_pair("user", "new")
            .append_pair("userid", session.subject_id.as_str())
            .append_pair("token", &session.id_token)
            .append_pair("ts", &OffsetDateTime::now_utc().unix_timestamp().to_string());
        url
    }

    fn plan_page_url(&self, session: &AuthSession) -> Url {
        let mut url = self.state.settings.plan_page_url.clone();
        url.query_pairs_mut()
            .append_pair("userid", session.subject_id.as_str());
        url
    }

    fn payment_url(&self, link: &Url, plan: Plan, session: &AuthSession) -> Url {
        let settings = &self.state.settings;
        let mut success = settings.payment_return_url.clone();
        success
            .query_pairs_mut()
            .append_pair("payment", "success")
            .append_pair("plan", plan.as_str());
        let mut cancel = settings.payment_return_url.clone();
        cancel.query_pairs_mut().append_pair("payment", "cancelled");

        let mut url = link.clone();
        url.query_pairs_mut()
            .append_pair("client_reference_id", session.subject_id.as_str())
            .append_pair("success_url", success.as_str())
            .append_pair("cancel_url", cancel.as_str());
        url
    }
}
