use url::Url;

/// Page-navigation surface supplied by the host.
///
/// In a browser shim this wraps `window.location` and
/// `history.replaceState`; a test harness records what would have
/// happened instead.
pub trait Navigator: Send + Sync {
    /// Current page URL, including query string and fragment.
    fn current_url(&self) -> Url;

    /// One-shot full-page navigation. On a real page control does not
    /// return to script after this succeeds; callers must not assume it
    /// does. Returns false when the host refused the navigation.
    fn navigate(&self, url: &Url) -> bool;

    /// Rewrite the visible URL without navigating or reloading.
    fn replace_url(&self, url: &Url);
}

/// Copy of `url` without the query parameters named in `drop`. Other
/// parameters and their order are preserved.
pub(crate) fn without_query_keys(url: &Url, drop: &[&str]) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !drop.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    cleaned.set_query(None);
    if !kept.is_empty() {
        let mut pairs = cleaned.query_pairs_mut();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
    }
    cleaned
}
