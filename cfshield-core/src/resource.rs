//! Resource classes and their cache lifetimes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One class of cached upstream data.
///
/// TTLs are fixed per class. Nothing in the request path can choose a TTL,
/// which keeps arbitrary expiry out of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    UserInfo,
    UserStatus,
    Rating,
    Problems,
    Contests,
    ContestStandings,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::UserInfo,
        ResourceKind::UserStatus,
        ResourceKind::Rating,
        ResourceKind::Problems,
        ResourceKind::Contests,
        ResourceKind::ContestStandings,
    ];

    /// Cache lifetime in seconds.
    pub const fn ttl_seconds(self) -> u64 {
        match self {
            ResourceKind::UserInfo => 3600,
            ResourceKind::UserStatus => 1800,
            ResourceKind::Rating => 3600,
            ResourceKind::Problems => 86_400,
            ResourceKind::Contests => 3600,
            // Standings move during a live contest.
            ResourceKind::ContestStandings => 300,
        }
    }

    pub const fn ttl(self) -> Duration {
        Duration::from_secs(self.ttl_seconds())
    }

    /// Key namespace, including the trailing separator.
    pub const fn key_prefix(self) -> &'static str {
        match self {
            ResourceKind::UserInfo => "cf:user:",
            ResourceKind::UserStatus => "cf:status:",
            ResourceKind::Rating => "cf:rating:",
            ResourceKind::Problems => "cf:problems:",
            ResourceKind::Contests => "cf:contests:",
            ResourceKind::ContestStandings => "cf:standings:",
        }
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::UserInfo => "user_info",
            ResourceKind::UserStatus => "user_status",
            ResourceKind::Rating => "rating",
            ResourceKind::Problems => "problems",
            ResourceKind::Contests => "contests",
            ResourceKind::ContestStandings => "contest_standings",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ttl_table() {
        assert_eq!(ResourceKind::UserInfo.ttl_seconds(), 3600);
        assert_eq!(ResourceKind::UserStatus.ttl_seconds(), 1800);
        assert_eq!(ResourceKind::Rating.ttl_seconds(), 3600);
        assert_eq!(ResourceKind::Problems.ttl_seconds(), 86_400);
        assert_eq!(ResourceKind::Contests.ttl_seconds(), 3600);
        assert_eq!(ResourceKind::ContestStandings.ttl_seconds(), 300);
        assert_eq!(ResourceKind::ContestStandings.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let prefixes: HashSet<_> = ResourceKind::ALL.iter().map(|k| k.key_prefix()).collect();
        assert_eq!(prefixes.len(), ResourceKind::ALL.len());
        for prefix in prefixes {
            assert!(prefix.ends_with(':'));
        }
    }
}
