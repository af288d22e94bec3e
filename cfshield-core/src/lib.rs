//! cfshield Core - Data Types and Cache Policy
//!
//! Shared vocabulary for the upstream shield:
//! - Typed Codeforces payloads and the response envelope
//! - Error taxonomy (validation, upstream, cache backend)
//! - Deterministic cache key derivation and the per-resource TTL table
//! - Clock abstraction so window and expiry logic can be driven in tests

pub mod clock;
pub mod error;
pub mod key;
pub mod resource;
pub mod types;
pub mod upstream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheBackendError, UpstreamError, UpstreamResult, ValidationError};
pub use key::{normalize_list, parse_list, CacheKey};
pub use resource::ResourceKind;
pub use types::{
    Contest, Member, Party, Problem, ProblemResult, ProblemSet, ProblemStatistics, RanklistRow,
    RatingChange, Standings, Submission, User,
};
pub use upstream::{decode_envelope, CodeforcesApi, EnvelopeStatus, UpstreamEnvelope};
