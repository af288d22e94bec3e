//! cfshield Test Utilities
//!
//! Shared test infrastructure for the cfshield workspace:
//! - Proptest generators for handles, tag lists and cache-relevant inputs
//! - A scriptable, call-counting mock of the upstream API
//! - Fixtures for upstream payloads
//! - An in-memory cache store wired to a manual clock

pub use cfshield_core::{
    CacheKey, CodeforcesApi, Contest, ManualClock, Member, Party, Problem, ProblemResult,
    ProblemSet, ProblemStatistics, RanklistRow, RatingChange, ResourceKind, Standings,
    Submission, UpstreamError, UpstreamResult, User,
};
pub use cfshield_storage::{CacheStore, InMemoryBackend, RateLimiter};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

/// Fixed start time for manual clocks (2023-11-14T22:13:20Z).
pub const TEST_EPOCH_MILLIS: i64 = 1_700_000_000_000;

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// A cache store over an in-memory backend, plus handles to drive it.
pub struct TestStore {
    pub clock: Arc<ManualClock>,
    pub backend: Arc<InMemoryBackend>,
    pub store: CacheStore,
}

impl TestStore {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(TEST_EPOCH_MILLIS));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let store = CacheStore::with_backend(backend.clone(), clock.clone());
        Self {
            clock,
            backend,
            store,
        }
    }

    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.store.clone())
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MOCK UPSTREAM
// ============================================================================

/// Scriptable stand-in for the upstream API.
///
/// Unknown handles fail the way the real upstream does
/// (`handle: User with handle X not found`). Every call is recorded by its
/// upstream method name, e.g. `user.rating`.
#[derive(Default)]
pub struct MockCodeforces {
    users: Mutex<HashMap<String, User>>,
    ratings: Mutex<HashMap<String, Vec<RatingChange>>>,
    submissions: Mutex<HashMap<String, Vec<Submission>>>,
    problemset: Mutex<Option<ProblemSet>>,
    contests: Mutex<Vec<Contest>>,
    standings: Mutex<HashMap<u64, Standings>>,
    failure: Mutex<Option<UpstreamError>>,
    calls: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(handle: &str) -> UpstreamError {
    UpstreamError::failed(Some(format!(
        "handle: User with handle {} not found",
        handle
    )))
}

impl MockCodeforces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: User) -> Self {
        lock(&self.users).insert(user.handle.to_lowercase(), user);
        self
    }

    pub fn with_rating(self, handle: &str, changes: Vec<RatingChange>) -> Self {
        lock(&self.ratings).insert(handle.to_lowercase(), changes);
        self
    }

    pub fn with_submissions(self, handle: &str, submissions: Vec<Submission>) -> Self {
        lock(&self.submissions).insert(handle.to_lowercase(), submissions);
        self
    }

    pub fn with_problemset(self, problemset: ProblemSet) -> Self {
        *lock(&self.problemset) = Some(problemset);
        self
    }

    pub fn with_contests(self, contests: Vec<Contest>) -> Self {
        *lock(&self.contests) = contests;
        self
    }

    pub fn with_standings(self, contest_id: u64, standings: Standings) -> Self {
        lock(&self.standings).insert(contest_id, standings);
        self
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: UpstreamError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Number of calls to one upstream method.
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|m| *m == method).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    fn record(&self, method: &str) -> UpstreamResult<()> {
        lock(&self.calls).push(method.to_string());
        match lock(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn page<T: Clone>(items: &[T], from: u32, count: Option<u32>) -> Vec<T> {
    let skip = from.saturating_sub(1) as usize;
    let iter = items.iter().skip(skip).cloned();
    match count {
        Some(count) => iter.take(count as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl CodeforcesApi for MockCodeforces {
    async fn user_info(&self, handles: &[String]) -> UpstreamResult<Vec<User>> {
        self.record("user.info")?;
        let users = lock(&self.users);
        handles
            .iter()
            .map(|h| {
                users
                    .get(&h.to_lowercase())
                    .cloned()
                    .ok_or_else(|| not_found(h))
            })
            .collect()
    }

    async fn user_rating(&self, handle: &str) -> UpstreamResult<Vec<RatingChange>> {
        self.record("user.rating")?;
        lock(&self.ratings)
            .get(&handle.to_lowercase())
            .cloned()
            .ok_or_else(|| not_found(handle))
    }

    async fn user_status(
        &self,
        handle: &str,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Vec<Submission>> {
        self.record("user.status")?;
        let submissions = lock(&self.submissions);
        let all = submissions
            .get(&handle.to_lowercase())
            .ok_or_else(|| not_found(handle))?;
        Ok(page(all, from, count))
    }

    async fn problemset(&self, tags: &[String]) -> UpstreamResult<ProblemSet> {
        self.record("problemset.problems")?;
        let set = lock(&self.problemset).clone().unwrap_or(ProblemSet {
            problems: Vec::new(),
            problem_statistics: Vec::new(),
        });
        let problems = set
            .problems
            .into_iter()
            .filter(|p| tags.iter().all(|t| p.tags.contains(t)))
            .collect();
        Ok(ProblemSet {
            problems,
            problem_statistics: set.problem_statistics,
        })
    }

    async fn contest_list(&self, gym: bool) -> UpstreamResult<Vec<Contest>> {
        self.record("contest.list")?;
        let gym_type = |c: &Contest| c.id >= 100_000;
        Ok(lock(&self.contests)
            .iter()
            .filter(|c| gym_type(c) == gym)
            .cloned()
            .collect())
    }

    async fn contest_standings(
        &self,
        contest_id: u64,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Standings> {
        self.record("contest.standings")?;
        let standings = lock(&self.standings)
            .get(&contest_id)
            .cloned()
            .ok_or_else(|| {
                UpstreamError::failed(Some(format!(
                    "contestId: Contest with id {} has not started",
                    contest_id
                )))
            })?;
        Ok(Standings {
            rows: page(&standings.rows, from, count),
            ..standings
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cfshield inputs.

    use super::*;
    use proptest::prelude::*;

    /// A valid handle: 3 to 24 of letters, digits, `_`, `-`, `.`.
    pub fn arb_handle() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.-]{3,24}"
    }

    /// A handle padded with whitespace.
    pub fn arb_messy_handle() -> impl Strategy<Value = String> {
        (arb_handle(), " {0,2}", " {0,2}").prop_map(|(h, pre, post)| format!("{pre}{h}{post}"))
    }

    pub fn arb_handles() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_handle(), 1..8)
    }

    pub fn arb_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("dp".to_string()),
            Just("greedy".to_string()),
            Just("math".to_string()),
            Just("graphs".to_string()),
            Just("strings".to_string()),
            Just("data structures".to_string()),
            Just("binary search".to_string()),
            "[a-z]{2,12}",
        ]
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_tag(), 0..6)
    }

    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop::sample::select(ResourceKind::ALL.to_vec())
    }

    /// Any cache key the handlers can derive.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        prop_oneof![
            arb_handles().prop_map(|h| CacheKey::user_info(&h)),
            arb_handle().prop_map(|h| CacheKey::rating(&h)),
            (arb_handle(), 1u32..1000, proptest::option::of(1u32..10_000))
                .prop_map(|(h, from, count)| CacheKey::user_status(&h, from, count)),
            arb_tags().prop_map(|t| CacheKey::problems(&t)),
            any::<bool>().prop_map(CacheKey::contests),
            (1u64..2_000_000, proptest::option::of(1u32..10_000))
                .prop_map(|(id, count)| CacheKey::contest_standings(id, count)),
        ]
    }

    pub fn arb_rating_change(handle: String) -> impl Strategy<Value = RatingChange> {
        (1i64..2000, 1i64..30_000, 0i64..4000, -200i64..200).prop_map(
            move |(contest_id, rank, old_rating, delta)| RatingChange {
                contest_id,
                contest_name: format!("Codeforces Round {}", contest_id),
                handle: handle.clone(),
                rank,
                rating_update_time_seconds: 1_600_000_000 + contest_id * 86_400,
                old_rating,
                new_rating: old_rating + delta,
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Upstream payloads shaped like real responses.

    use super::*;

    pub fn user(handle: &str) -> User {
        User {
            handle: handle.to_string(),
            first_name: None,
            last_name: None,
            country: Some("Belarus".to_string()),
            city: None,
            organization: None,
            contribution: 0,
            rank: Some("expert".to_string()),
            rating: Some(1800),
            max_rank: Some("candidate master".to_string()),
            max_rating: Some(1950),
            last_online_time_seconds: 1_700_000_000,
            registration_time_seconds: 1_300_000_000,
            friend_of_count: 42,
            avatar: format!("https://userpic.codeforces.org/{}/avatar.jpg", handle),
            title_photo: format!("https://userpic.codeforces.org/{}/title.jpg", handle),
        }
    }

    pub fn rating_history(handle: &str) -> Vec<RatingChange> {
        [(1, 0, 1400), (2, 1400, 1550), (3, 1550, 1500)]
            .into_iter()
            .map(|(contest_id, old_rating, new_rating)| RatingChange {
                contest_id,
                contest_name: format!("Codeforces Round {}", contest_id),
                handle: handle.to_string(),
                rank: 100 * contest_id,
                rating_update_time_seconds: 1_600_000_000 + contest_id * 86_400,
                old_rating,
                new_rating,
            })
            .collect()
    }

    pub fn problem(contest_id: i64, index: &str, tags: &[&str]) -> Problem {
        Problem {
            contest_id: Some(contest_id),
            problemset_name: None,
            index: index.to_string(),
            name: format!("Problem {}{}", contest_id, index),
            problem_type: "PROGRAMMING".to_string(),
            points: None,
            rating: Some(1200),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn problemset() -> ProblemSet {
        let problems = vec![
            problem(1, "A", &["math"]),
            problem(2, "B", &["dp", "greedy"]),
            problem(3, "C", &["graphs", "dp"]),
        ];
        let problem_statistics = problems
            .iter()
            .map(|p| ProblemStatistics {
                contest_id: p.contest_id,
                index: p.index.clone(),
                solved_count: 1000,
            })
            .collect();
        ProblemSet {
            problems,
            problem_statistics,
        }
    }

    pub fn party(handle: &str) -> Party {
        Party {
            contest_id: Some(1),
            members: vec![Member {
                handle: handle.to_string(),
                name: None,
            }],
            participant_type: "CONTESTANT".to_string(),
            team_id: None,
            team_name: None,
            ghost: false,
            room: None,
            start_time_seconds: Some(1_600_000_000),
        }
    }

    pub fn submissions(handle: &str, n: i64) -> Vec<Submission> {
        (1..=n)
            .map(|id| Submission {
                id,
                contest_id: Some(1),
                creation_time_seconds: 1_600_000_000 + id,
                relative_time_seconds: id * 60,
                problem: problem(1, "A", &["math"]),
                author: party(handle),
                programming_language: "GNU C++17".to_string(),
                verdict: Some("OK".to_string()),
                testset: "TESTS".to_string(),
                passed_test_count: 10,
                time_consumed_millis: 15,
                memory_consumed_bytes: 1024,
                points: None,
            })
            .collect()
    }

    pub fn contest(id: i64) -> Contest {
        Contest {
            id,
            name: format!("Codeforces Round {}", id),
            contest_type: "CF".to_string(),
            phase: "FINISHED".to_string(),
            frozen: false,
            duration_seconds: 7200,
            start_time_seconds: Some(1_600_000_000),
            relative_time_seconds: None,
            prepared_by: None,
            difficulty: None,
            kind: None,
        }
    }

    pub fn standings(contest_id: i64, handles: &[&str]) -> Standings {
        let rows = handles
            .iter()
            .enumerate()
            .map(|(i, h)| RanklistRow {
                party: party(h),
                rank: i as i64 + 1,
                points: 1000.0 - i as f64 * 100.0,
                penalty: 0,
                successful_hack_count: 0,
                unsuccessful_hack_count: 0,
                problem_results: vec![ProblemResult {
                    points: 1000.0 - i as f64 * 100.0,
                    penalty: None,
                    rejected_attempt_count: 0,
                    result_type: "FINAL".to_string(),
                    best_submission_time_seconds: Some(600),
                }],
                last_submission_time_seconds: None,
            })
            .collect();
        Standings {
            contest: contest(contest_id),
            problems: vec![problem(contest_id, "A", &["math"])],
            rows,
        }
    }

    /// A mock upstream that knows `handles`, with rating history and
    /// submissions for each, plus the problemset, two contests and one
    /// standings table.
    pub fn populated_upstream(handles: &[&str]) -> MockCodeforces {
        let mut mock = MockCodeforces::new()
            .with_problemset(problemset())
            .with_contests(vec![contest(1), contest(100_001)])
            .with_standings(1, standings(1, handles));
        for handle in handles {
            mock = mock
                .with_user(user(handle))
                .with_rating(handle, rating_history(handle))
                .with_submissions(handle, submissions(handle, 5));
        }
        mock
    }
}
