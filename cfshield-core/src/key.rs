//! Deterministic cache key derivation.
//!
//! A key encodes the resource class plus every parameter that changes the
//! upstream response. Parameters whose order does not matter (handle lists,
//! tag sets) are normalized first so that equivalent requests share one entry.

use std::fmt;

use crate::resource::ResourceKind;

/// Separator used by the upstream for list parameters.
pub const LIST_SEPARATOR: char = ';';

/// Split a `;`-separated parameter and normalize it.
pub fn parse_list(raw: &str) -> Vec<String> {
    normalize_list(raw.split(LIST_SEPARATOR))
}

/// Trim, lowercase, drop empties, sort and de-duplicate.
pub fn normalize_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// A cache key bound to its resource class.
///
/// The TTL of an entry is always taken from [`CacheKey::kind`], so a key
/// cannot be stored with a caller-chosen lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: ResourceKind,
    key: String,
}

impl CacheKey {
    fn new(kind: ResourceKind, suffix: impl fmt::Display) -> Self {
        Self {
            kind,
            key: format!("{}{}", kind.key_prefix(), suffix),
        }
    }

    /// Multi-handle user info. Handle order and case do not matter.
    pub fn user_info<S: AsRef<str>>(handles: &[S]) -> Self {
        let handles = normalize_list(handles);
        Self::new(ResourceKind::UserInfo, handles.join(";"))
    }

    pub fn rating(handle: &str) -> Self {
        Self::new(ResourceKind::Rating, normalize_handle(handle))
    }

    /// Submission page for a handle.
    pub fn user_status(handle: &str, from: u32, count: Option<u32>) -> Self {
        Self::new(
            ResourceKind::UserStatus,
            format!("{}:{}:{}", normalize_handle(handle), from, count_part(count)),
        )
    }

    /// Problem set, optionally filtered by tags. Tag order does not matter.
    pub fn problems<S: AsRef<str>>(tags: &[S]) -> Self {
        let tags = normalize_list(tags);
        if tags.is_empty() {
            Self::new(ResourceKind::Problems, "all")
        } else {
            Self::new(ResourceKind::Problems, tags.join(";"))
        }
    }

    pub fn contests(gym: bool) -> Self {
        Self::new(ResourceKind::Contests, format!("gym={}", gym))
    }

    pub fn contest_standings(contest_id: u64, count: Option<u32>) -> Self {
        Self::new(
            ResourceKind::ContestStandings,
            format!("{}:{}", contest_id, count_part(count)),
        )
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.kind.ttl_seconds()
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}

fn count_part(count: Option<u32>) -> String {
    count.map_or_else(|| "all".to_string(), |c| c.to_string())
}
