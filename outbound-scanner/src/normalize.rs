use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Comparable identity of a page.
///
/// Two links that differ only by fragment or trailing slash produce the same key,
/// so the key is what the frontier deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parsed form of the key, if it is an absolute URL.
    pub fn to_url(&self) -> Option<Url> {
        Url::parse(&self.0).ok()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize `raw` into a page key.
///
/// Relative links are resolved against `base`, the fragment is removed and the
/// trailing slash is stripped. Never fails: input the URL parser rejects is
/// kept as written, minus fragment and trailing slash.
///
/// ```
/// use outbound_scanner::normalize::normalize;
/// use url::Url;
///
/// let base = Url::parse("https://example.test/eng").unwrap();
/// assert_eq!(normalize(&base, "/eng/about/#team").as_str(), "https://example.test/eng/about");
/// ```
pub fn normalize(base: &Url, raw: &str) -> NormalizedUrl {
    let raw = raw.trim();

    let absolute = match base.join(raw) {
        Ok(mut resolved) => {
            resolved.set_fragment(None);
            resolved.to_string()
        }
        Err(_) => match raw.split_once('#') {
            Some((before, _)) => before.to_string(),
            None => raw.to_string(),
        },
    };

    NormalizedUrl(absolute.trim_end_matches('/').to_string())
}

/// Normalize an already absolute URL (a seed, or a renderer's current URL).
pub fn normalize_absolute(raw: &str) -> NormalizedUrl {
    match Url::parse(raw.trim()) {
        Ok(parsed) => normalize(&parsed, raw),
        Err(_) => {
            let stripped = raw.trim().split('#').next().unwrap_or_default();
            NormalizedUrl(stripped.trim_end_matches('/').to_string())
        }
    }
}
