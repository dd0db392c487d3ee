use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use log::{error, info, warn};
use time::{Duration, OffsetDateTime, Time};
use tokio::task::JoinSet;

use crate::{RunOutcome, RunStatus, TimeWindow, WindowClock};

/// One fetch → parse → sink cycle over a window.
#[async_trait]
pub trait RecurringTask: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, window: &TimeWindow) -> RunOutcome;
}

/// Wall-clock cadence: fire every `every`, shifted `offset` past local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub every: Duration,
    pub offset: Duration,
}

impl Cadence {
    pub fn new(every: Duration, offset: Duration) -> Self {
        Self { every, offset }
    }

    /// First firing instant strictly after `now`, in `now`'s offset.
    pub fn next_after(&self, now: OffsetDateTime) -> OffsetDateTime {
        let midnight = now.replace_time(Time::MIDNIGHT);
        let every = self.every.whole_seconds().max(1);
        let since_first = (now - midnight).whole_seconds() - self.offset.whole_seconds();
        let steps = since_first.div_euclid(every) + 1;
        midnight + self.offset + Duration::seconds(steps * every)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "every {}m at +{}m",
            self.every.whole_minutes(),
            self.offset.whole_minutes()
        )
    }
}

/// A task bound to its cadence, trailing span and optional startup backfill.
pub struct IngestionJob {
    task: Arc<dyn RecurringTask>,
    cadence: Cadence,
    span: Duration,
    backfill_days: Option<u32>,
    clock: WindowClock,
    backfilled_through: Mutex<Option<String>>,
}

impl IngestionJob {
    pub fn new(task: Arc<dyn RecurringTask>, cadence: Cadence, clock: WindowClock) -> Self {
        Self {
            task,
            cadence,
            span: cadence.every,
            backfill_days: None,
            clock,
            backfilled_through: Mutex::new(None),
        }
    }

    pub fn with_span(mut self, span: Duration) -> Self {
        self.span = span;
        self
    }

    pub fn with_backfill(mut self, days: u32) -> Self {
        self.backfill_days = Some(days);
        self
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Run the startup backfill, if one is configured.
    pub async fn run_startup_at(&self, now: OffsetDateTime) -> Option<RunOutcome> {
        let days = self.backfill_days?;
        let window = self.clock.backfill_window_at(now, days);
        info!("[{}] startup backfill ({} days): {}", self.name(), days, window);

        let outcome = self.task.run(&window).await;
        log_outcome(self.name(), &window, &outcome);
        if !outcome.status.is_error() {
            *self.lock_backfill() = Some(window.end.clone());
        }
        Some(outcome)
    }

    /// Run the recurring tick for `now`. The first tick after a backfill only
    /// fetches what the backfill did not reach, and returns `None` when the
    /// backfill already covered its whole window.
    pub async fn run_tick_at(&self, now: OffsetDateTime) -> Option<RunOutcome> {
        let mut window = self.clock.trailing_window_at(now, self.span);

        if let Some(end) = self.lock_backfill().take() {
            match window.remainder_after(&end) {
                Some(remainder) => {
                    if remainder != window {
                        info!(
                            "[{}] tick {} narrowed to {}: backfill reached {}",
                            self.name(),
                            window,
                            remainder,
                            end
                        );
                    }
                    window = remainder;
                }
                None => {
                    info!(
                        "[{}] skipping tick {}: already covered by backfill through {}",
                        self.name(),
                        window,
                        end
                    );
                    return None;
                }
            }
        }

        let outcome = self.task.run(&window).await;
        log_outcome(self.name(), &window, &outcome);
        Some(outcome)
    }

    fn lock_backfill(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.backfilled_through
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_outcome(name: &str, window: &TimeWindow, outcome: &RunOutcome) {
    match outcome.status {
        RunStatus::Success => info!("[{}] {} -> {}", name, window, outcome),
        RunStatus::EmptyResponse | RunStatus::NoDataFound => {
            warn!("[{}] {} -> {}", name, window, outcome)
        }
        RunStatus::ProcessingError => error!(
            "[{}] {} -> {}: {}",
            name,
            window,
            outcome,
            outcome.errors.join("; ")
        ),
    }
}

/// Owns the jobs and drives each on its own tokio tasks.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Arc<IngestionJob>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: IngestionJob) -> &mut Self {
        self.jobs.push(Arc::new(job));
        self
    }

    pub fn jobs(&self) -> &[Arc<IngestionJob>] {
        &self.jobs
    }

    /// One startup task and one cadence loop per job. Aborting the set stops them.
    pub fn spawn(self) -> JoinSet<()> {
        let mut set = JoinSet::new();
        for job in self.jobs {
            info!("[{}] scheduled {}", job.name(), job.cadence());

            let startup = job.clone();
            set.spawn(async move {
                startup.run_startup_at(startup.clock.now()).await;
            });
            set.spawn(run_cadence(job));
        }
        set
    }
}

async fn run_cadence(job: Arc<IngestionJob>) {
    loop {
        let now = job.clock.now();
        let next = job.cadence.next_after(now);
        let wait = std::time::Duration::try_from(next - now).unwrap_or_default();
        tokio::time::sleep(wait).await;
        job.run_tick_at(next).await;
    }
}
