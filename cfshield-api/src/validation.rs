//! Query Validation
//!
//! Raw query structs accept every parameter as an optional string so that a
//! malformed value produces a structured `ApiError` instead of the
//! framework's plain-text rejection. Each raw query validates into a typed
//! parameter set before any cache or upstream work happens.

use cfshield_core::parse_list;
use serde::Deserialize;

use crate::constants::{MAX_HANDLES_PER_REQUEST, MAX_PAGE_COUNT};
use crate::error::{ApiError, ApiResult};

/// Trait for validating non-empty strings.
pub trait ValidateNonEmpty {
    /// Returns `ApiError::missing_field` if the value is absent, empty or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::missing_field(field_name));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(ApiError::missing_field(field_name)),
        }
    }
}

/// Trait for validating numeric ranges.
pub trait ValidateRange {
    /// Validate that the value is within an inclusive range.
    fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()>
    where
        Self: Sized;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()> {
                    if *self < min || *self > max {
                        return Err(ApiError::invalid_range(field_name, min, max));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(u32, u64, usize);

/// Parse an optional integer parameter. Blank counts as absent.
fn parse_int<T: std::str::FromStr>(field: &str, raw: Option<&str>) -> ApiResult<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ApiError::invalid_format(field, "a positive integer")),
    }
}

fn parse_count(raw: Option<&str>) -> ApiResult<Option<u32>> {
    let count = parse_int::<u32>("count", raw)?;
    if let Some(count) = count {
        count.validate_range("count", 1, MAX_PAGE_COUNT)?;
    }
    Ok(count)
}

fn required_handle(raw: Option<String>) -> ApiResult<String> {
    raw.validate_non_empty("handle")?;
    Ok(raw.unwrap_or_default().trim().to_string())
}

// ============================================================================
// RAW QUERIES
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct UserInfoQuery {
    pub handles: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HandleQuery {
    pub handle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionsQuery {
    pub handle: Option<String>,
    pub from: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProblemsQuery {
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContestsQuery {
    pub gym: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StandingsQuery {
    pub id: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheKeyQuery {
    pub key: Option<String>,
}

// ============================================================================
// VALIDATED PARAMETERS
// ============================================================================

/// Normalized, de-duplicated handle list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoParams {
    pub handles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionsParams {
    pub handle: String,
    pub from: u32,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemsParams {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingsParams {
    pub contest_id: u64,
    pub count: Option<u32>,
}

impl UserInfoQuery {
    pub fn validate(self) -> ApiResult<UserInfoParams> {
        self.handles.validate_non_empty("handles")?;
        let handles = parse_list(self.handles.as_deref().unwrap_or_default());
        if handles.is_empty() {
            return Err(ApiError::missing_field("handles"));
        }
        handles
            .len()
            .validate_range("handles", 1, MAX_HANDLES_PER_REQUEST)?;
        Ok(UserInfoParams { handles })
    }
}

impl HandleQuery {
    pub fn validate(self) -> ApiResult<String> {
        required_handle(self.handle)
    }
}

impl SubmissionsQuery {
    pub fn validate(self) -> ApiResult<SubmissionsParams> {
        let handle = required_handle(self.handle)?;
        let from = parse_int::<u32>("from", self.from.as_deref())?.unwrap_or(1);
        from.validate_range("from", 1, u32::MAX)?;
        let count = parse_count(self.count.as_deref())?;
        Ok(SubmissionsParams {
            handle,
            from,
            count,
        })
    }
}

impl ProblemsQuery {
    pub fn validate(self) -> ApiResult<ProblemsParams> {
        Ok(ProblemsParams {
            tags: self.tags.as_deref().map(parse_list).unwrap_or_default(),
        })
    }
}

impl ContestsQuery {
    pub fn validate(self) -> ApiResult<bool> {
        match self.gym.as_deref().map(|s| s.trim().to_lowercase()) {
            None => Ok(false),
            Some(value) => match value.as_str() {
                "" | "false" => Ok(false),
                "true" => Ok(true),
                _ => Err(ApiError::invalid_format("gym", "true or false")),
            },
        }
    }
}

impl StandingsQuery {
    pub fn validate(self) -> ApiResult<StandingsParams> {
        let contest_id = parse_int::<u64>("id", self.id.as_deref())?
            .ok_or_else(|| ApiError::missing_field("id"))?;
        contest_id.validate_range("id", 1, u64::MAX)?;
        let count = parse_count(self.count.as_deref())?;
        Ok(StandingsParams { contest_id, count })
    }
}

impl CacheKeyQuery {
    pub fn validate(self) -> ApiResult<String> {
        self.key.validate_non_empty("key")?;
        Ok(self.key.unwrap_or_default().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn code<T: std::fmt::Debug>(result: ApiResult<T>) -> ErrorCode {
        result.expect_err("expected validation error").code
    }

    #[test]
    fn test_validate_non_empty() {
        assert!("hello".validate_non_empty("test").is_ok());
        assert!("   ".validate_non_empty("test").is_err());
        assert!(None::<String>.validate_non_empty("test").is_err());
    }

    #[test]
    fn test_handles_are_normalized() -> ApiResult<()> {
        let params = UserInfoQuery {
            handles: Some(" Petr;tourist;;petr ".to_string()),
        }
        .validate()?;
        assert_eq!(params.handles, vec!["petr", "tourist"]);
        Ok(())
    }

    #[test]
    fn test_missing_handles() {
        assert_eq!(code(UserInfoQuery::default().validate()), ErrorCode::MissingField);
        let only_separators = UserInfoQuery {
            handles: Some(";;".to_string()),
        };
        assert_eq!(code(only_separators.validate()), ErrorCode::MissingField);
    }

    #[test]
    fn test_too_many_handles() {
        let handles = (0..=MAX_HANDLES_PER_REQUEST)
            .map(|i| format!("user{}", i))
            .collect::<Vec<_>>()
            .join(";");
        let query = UserInfoQuery {
            handles: Some(handles),
        };
        assert_eq!(code(query.validate()), ErrorCode::InvalidRange);
    }

    #[test]
    fn test_submissions_defaults_and_bounds() -> ApiResult<()> {
        let params = SubmissionsQuery {
            handle: Some("tourist".into()),
            ..Default::default()
        }
        .validate()?;
        assert_eq!(params.from, 1);
        assert_eq!(params.count, None);

        let zero_from = SubmissionsQuery {
            handle: Some("tourist".into()),
            from: Some("0".into()),
            count: None,
        };
        assert_eq!(code(zero_from.validate()), ErrorCode::InvalidRange);

        let huge_count = SubmissionsQuery {
            handle: Some("tourist".into()),
            from: None,
            count: Some("10001".into()),
        };
        assert_eq!(code(huge_count.validate()), ErrorCode::InvalidRange);

        let junk = SubmissionsQuery {
            handle: Some("tourist".into()),
            from: Some("abc".into()),
            count: None,
        };
        assert_eq!(code(junk.validate()), ErrorCode::InvalidFormat);
        Ok(())
    }

    #[test]
    fn test_standings_requires_positive_id() {
        assert_eq!(code(StandingsQuery::default().validate()), ErrorCode::MissingField);
        let zero = StandingsQuery {
            id: Some("0".into()),
            count: None,
        };
        assert_eq!(code(zero.validate()), ErrorCode::InvalidRange);
        let negative = StandingsQuery {
            id: Some("-5".into()),
            count: None,
        };
        assert_eq!(code(negative.validate()), ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_gym_flag() -> ApiResult<()> {
        assert!(!ContestsQuery::default().validate()?);
        assert!(ContestsQuery {
            gym: Some("TRUE".into())
        }
        .validate()?);
        let bad = ContestsQuery {
            gym: Some("yes".into()),
        };
        assert_eq!(code(bad.validate()), ErrorCode::InvalidFormat);
        Ok(())
    }

    #[test]
    fn test_problem_tags_optional() -> ApiResult<()> {
        assert!(ProblemsQuery::default().validate()?.tags.is_empty());
        let params = ProblemsQuery {
            tags: Some("greedy;DP".into()),
        }
        .validate()?;
        assert_eq!(params.tags, vec!["dp", "greedy"]);
        Ok(())
    }
}
