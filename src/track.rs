//! Peripheral shims: click tracking and review collection.
//!
//! Both are plain storage writers keyed by the anonymous visitor id.
//! They never touch the session and survive a logout untouched.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::CredentialStore;
use crate::types::VisitorId;

const CLICKS_KEY: &str = "videre.track.clicks";
const REVIEWS_KEY: &str = "videre.reviews";

/// Oldest entries are dropped past this point; the shim is a ring, not
/// an archive.
const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub label: String,
    pub visitor: VisitorId,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// A submitted product review. Ratings clamp to 1..=5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub rating: u8,
    pub comment: String,
    #[serde(default)]
    pub author: Option<String>,
    pub visitor: VisitorId,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Storage-backed usage tracking, independent of authentication.
#[derive(Clone)]
pub struct Tracker {
    store: CredentialStore,
}

impl Tracker {
    #[must_use]
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    /// Stable anonymous id for this storage scope.
    #[must_use]
    pub fn tracking_id(&self) -> VisitorId {
        self.store.visitor_id()
    }

    /// Record a UI interaction under the visitor id.
    pub fn record_click(&self, label: &str) {
        let event = ClickEvent {
            label: label.to_owned(),
            visitor: self.tracking_id(),
            at: OffsetDateTime::now_utc(),
        };
        self.append(CLICKS_KEY, &event);
    }

    #[must_use]
    pub fn clicks(&self) -> Vec<ClickEvent> {
        self.read(CLICKS_KEY)
    }

    /// Store a review. Out-of-range ratings clamp rather than reject;
    /// losing a review over a slider glitch is the worse outcome.
    pub fn submit_review(&self, rating: u8, comment: &str, author: Option<&str>) {
        let review = Review {
            rating: rating.clamp(1, 5),
            comment: comment.to_owned(),
            author: author.map(str::to_owned),
            visitor: self.tracking_id(),
            at: OffsetDateTime::now_utc(),
        };
        self.append(REVIEWS_KEY, &review);
    }

    #[must_use]
    pub fn reviews(&self) -> Vec<Review> {
        self.read(REVIEWS_KEY)
    }

    fn append<T: Serialize>(&self, key: &str, entry: &T) {
        let mut entries: Vec<serde_json::Value> = self
            .store
            .get(key)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        match serde_json::to_value(entry) {
            Ok(value) => entries.push(value),
            Err(e) => {
                tracing::warn!(error = %e, key, "tracking entry not serializable");
                return;
            }
        }
        if entries.len() > MAX_ENTRIES {
            let excess = entries.len() - MAX_ENTRIES;
            entries.drain(..excess);
        }
        match serde_json::to_string(&entries) {
            Ok(json) => self.store.put(key, &json),
            Err(e) => tracing::warn!(error = %e, key, "tracking log not serializable"),
        }
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.store
            .get(key)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }
}
