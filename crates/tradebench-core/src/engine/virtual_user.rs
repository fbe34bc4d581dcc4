use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};

use crate::config::RunConfig;
use crate::error::BenchError;
use crate::scenario::{ScenarioContext, ITERATION_ERRORS};

// About thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Shape of a multi-user load: how many users, how they start, how long each
/// one runs and how it paces itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub users: u32,
    /// Per-user wall-clock budget, measured from that user's own start.
    pub duration: Duration,
    pub ramp_up: Duration,
    pub think_time: RangeInclusive<Duration>,
    /// Optional cap on operations per user, on top of the deadline.
    pub max_operations: Option<u64>,
}

impl LoadProfile {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            users: config.users,
            duration: config.duration,
            ramp_up: config.ramp_up,
            think_time: config.think_time(),
            max_operations: config.options.operations_per_user,
        }
    }

    /// Delay between consecutive user starts: `ramp_up / (users - 1)`.
    pub fn ramp_delay(&self) -> Duration {
        if self.users > 1 && !self.ramp_up.is_zero() {
            self.ramp_up / (self.users - 1)
        } else {
            Duration::ZERO
        }
    }
}

/// State handed to a workload for one operation of one virtual user.
pub struct UserTurn {
    pub user_id: u32,
    /// Zero-based index of this operation within the user's loop.
    pub operation: u64,
    /// Instant after which the user starts no new operation.
    pub deadline: Instant,
    /// Generator owned by this user; seeded per user.
    pub rng: StdRng,
}

/// The body of a virtual user's loop.
#[async_trait]
pub trait UserWorkload: Send + Sync + 'static {
    async fn run(&self, turn: &mut UserTurn) -> Result<(), BenchError>;
}

/// Per-user totals returned once the user's loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VuReport {
    pub user_id: u32,
    /// Operations that completed without error.
    pub operations: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl VuReport {
    pub fn attempts(&self) -> u64 {
        self.operations + self.errors
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `profile.users` virtual users concurrently and wait for all of them.
///
/// Users are started `ramp_delay()` apart. Each loops until its deadline (or
/// its operation cap), sleeping a random think time between operations. The
/// deadline is checked before each operation, never during one.
///
/// Totals are added to the counters `<scenario>.operations`,
/// `<scenario>.errors` and `<scenario>.virtual_users`.
pub async fn run_load<W: UserWorkload>(
    ctx: &ScenarioContext,
    profile: &LoadProfile,
    workload: Arc<W>,
) -> Vec<VuReport> {
    if profile.users == 0 {
        return Vec::new();
    }

    let ramp_delay = profile.ramp_delay();
    tracing::info!(
        scenario = ctx.name(),
        users = profile.users,
        ramp_delay_ms = ramp_delay.as_millis() as u64,
        "starting virtual users"
    );

    let mut join_set: JoinSet<VuReport> = JoinSet::new();
    for user_id in 0..profile.users {
        if user_id > 0 && !ramp_delay.is_zero() {
            sleep(ramp_delay).await;
        }
        let ctx = ctx.clone();
        let profile = profile.clone();
        let workload = Arc::clone(&workload);
        join_set.spawn(async move { run_virtual_user(user_id, ctx, profile, workload).await });
    }

    let mut reports = Vec::with_capacity(profile.users as usize);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!(scenario = ctx.name(), "virtual user task failed: {e}"),
        }
    }
    reports.sort_by_key(|r| r.user_id);

    let operations: u64 = reports.iter().map(|r| r.operations).sum();
    let errors: u64 = reports.iter().map(|r| r.errors).sum();
    let metrics = ctx.metrics();
    metrics.increment_counter(&ctx.counter_name("operations"), operations as i64);
    metrics.increment_counter(&ctx.counter_name("errors"), errors as i64);
    metrics.increment_counter(&ctx.counter_name("virtual_users"), reports.len() as i64);

    tracing::info!(scenario = ctx.name(), operations, errors, "virtual users finished");
    reports
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

async fn run_virtual_user<W: UserWorkload>(
    user_id: u32,
    ctx: ScenarioContext,
    profile: LoadProfile,
    workload: Arc<W>,
) -> VuReport {
    let started = Instant::now();
    let mut turn = UserTurn {
        user_id,
        operation: 0,
        deadline: deadline_after(started, profile.duration),
        rng: ctx.rng(u64::from(user_id) + 1),
    };
    let mut report = VuReport {
        user_id,
        ..VuReport::default()
    };

    loop {
        if Instant::now() >= turn.deadline {
            break;
        }
        if profile.max_operations.is_some_and(|max| report.attempts() >= max) {
            break;
        }

        turn.operation = report.attempts();
        match workload.run(&mut turn).await {
            Ok(()) => report.operations += 1,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(scenario = ctx.name(), user_id, "operation failed: {e}");
                ctx.metrics()
                    .increment_counter(&ctx.counter_name(ITERATION_ERRORS), 1);
            }
        }

        let think = pick_think_time(&mut turn.rng, &profile.think_time);
        let remaining = turn.deadline.saturating_duration_since(Instant::now());
        let pause = think.min(remaining);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }

    report.elapsed = started.elapsed();
    tracing::debug!(
        scenario = ctx.name(),
        user_id,
        operations = report.operations,
        errors = report.errors,
        "virtual user done"
    );
    report
}

/// `start + duration`, saturating at a far-future instant instead of
/// overflowing the clock.
fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

fn pick_think_time(rng: &mut StdRng, range: &RangeInclusive<Duration>) -> Duration {
    let (lo, hi) = (*range.start(), *range.end());
    if lo >= hi {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::services::Services;

    fn context() -> ScenarioContext {
        ScenarioContext::new(
            "vu_test",
            Arc::new(MetricsCollector::new()),
            Arc::new(RunConfig::default()),
            Services::new(),
            1,
        )
    }

    fn profile(users: u32, duration_ms: u64) -> LoadProfile {
        LoadProfile {
            users,
            duration: Duration::from_millis(duration_ms),
            ramp_up: Duration::ZERO,
            think_time: Duration::from_millis(1)..=Duration::from_millis(2),
            max_operations: None,
        }
    }

    struct Counting {
        calls: AtomicU64,
        fail_every: u64,
    }

    #[async_trait]
    impl UserWorkload for Counting {
        async fn run(&self, _turn: &mut UserTurn) -> Result<(), BenchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(BenchError::Iteration("scheduled failure".into()));
            }
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // LoadProfile
    // -----------------------------------------------------------------------

    #[test]
    fn ramp_delay_spreads_starts() {
        let mut p = profile(5, 10);
        p.ramp_up = Duration::from_millis(400);
        assert_eq!(p.ramp_delay(), Duration::from_millis(100));
    }

    #[test]
    fn ramp_delay_zero_for_single_user() {
        let mut p = profile(1, 10);
        p.ramp_up = Duration::from_secs(5);
        assert_eq!(p.ramp_delay(), Duration::ZERO);
    }

    #[test]
    fn from_config_copies_load_fields() {
        let mut config = RunConfig::default();
        config.users = 3;
        config.options.operations_per_user = Some(7);
        let p = LoadProfile::from_config(&config);
        assert_eq!(p.users, 3);
        assert_eq!(p.duration, Duration::from_secs(60));
        assert_eq!(p.max_operations, Some(7));
        assert_eq!(p.think_time, Duration::from_millis(100)..=Duration::from_millis(500));
    }

    // -----------------------------------------------------------------------
    // run_load
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn operation_cap_bounds_each_user() {
        let ctx = context();
        let mut p = profile(4, 5_000);
        p.max_operations = Some(3);
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
            fail_every: 0,
        });
        let reports = run_load(&ctx, &p, Arc::clone(&workload)).await;

        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.operations == 3 && r.errors == 0));
        assert_eq!(workload.calls.load(Ordering::SeqCst), 12);
        assert_eq!(ctx.metrics().counter("vu_test.operations"), 12);
        assert_eq!(ctx.metrics().counter("vu_test.virtual_users"), 4);
    }

    #[tokio::test]
    async fn users_stop_at_their_deadline() {
        let ctx = context();
        let p = profile(3, 60);
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
            fail_every: 0,
        });
        let reports = run_load(&ctx, &p, workload).await;
        for r in &reports {
            assert!(r.operations >= 1);
            // Last think-time pause is clamped to the deadline.
            assert!(r.elapsed < Duration::from_millis(60) + Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn errors_are_counted_not_fatal() {
        let ctx = context();
        let mut p = profile(2, 5_000);
        p.max_operations = Some(4);
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
            fail_every: 2,
        });
        let reports = run_load(&ctx, &p, workload).await;
        let total_errors: u64 = reports.iter().map(|r| r.errors).sum();
        let total_ops: u64 = reports.iter().map(|r| r.operations).sum();
        assert_eq!(total_errors + total_ops, 8);
        assert_eq!(total_errors, 4);
        assert_eq!(ctx.metrics().counter("vu_test.errors"), 4);
        assert_eq!(ctx.metrics().counter("vu_test.iteration_errors"), 4);
    }

    #[test]
    fn deadline_saturates_instead_of_overflowing() {
        let start = Instant::now();
        let deadline = deadline_after(start, Duration::MAX);
        assert!(deadline > start + Duration::from_secs(86_400 * 365));
        assert_eq!(
            deadline_after(start, Duration::from_secs(1)),
            start + Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn huge_duration_still_honours_operation_cap() {
        let ctx = context();
        let mut p = profile(2, 10);
        p.duration = Duration::MAX;
        p.max_operations = Some(1);
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
            fail_every: 0,
        });
        let reports = run_load(&ctx, &p, Arc::clone(&workload)).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.operations == 1));
        assert_eq!(workload.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_users_do_nothing() {
        let ctx = context();
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
            fail_every: 0,
        });
        assert!(run_load(&ctx, &profile(0, 10), workload).await.is_empty());
    }
}
