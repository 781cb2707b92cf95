//! Tick loop - fires the daily jobs
//!
//! Every tick checks each job against the local clock and its persisted run
//! marker. A job fires once its time of day has passed and it hasn't already
//! taken effect today, so restarts and long ticks never double-fire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::watch;

use crate::daemon::context::DaemonContext;
use crate::error::Result;
use crate::ipc::messages::DaemonEvent;

pub use crate::distribution::JOB_DISTRIBUTE;
pub const JOB_RECYCLE: &str = "job.recycle";

/// What a daily job does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Distribute,
    Recycle,
}

/// A job that fires once per local calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyJob {
    pub name: &'static str,
    pub kind: JobKind,
    /// Local time of day after which the job is due
    pub at: NaiveTime,
}

impl DailyJob {
    pub fn new(name: &'static str, kind: JobKind, at: NaiveTime) -> Self {
        Self { name, kind, at }
    }

    /// Due when today's firing time has passed and it hasn't run today
    pub fn is_due(&self, now: NaiveDateTime, last_run: Option<NaiveDate>) -> bool {
        now.time() >= self.at && last_run.is_none_or(|day| day < now.date())
    }
}

/// Configuration for the daemon tick loop
#[derive(Debug, Clone)]
pub struct TickConfig {
    pub tick_interval: Duration,
    /// Checked in order; recycling is listed first so resurfaced leads are
    /// callable before the day's distribution
    pub jobs: Vec<DailyJob>,
}

impl TickConfig {
    pub fn new(tick_interval: Duration, distribute_at: NaiveTime, recycle_at: NaiveTime) -> Self {
        Self {
            tick_interval,
            jobs: vec![
                DailyJob::new(JOB_RECYCLE, JobKind::Recycle, recycle_at),
                DailyJob::new(JOB_DISTRIBUTE, JobKind::Distribute, distribute_at),
            ],
        }
    }
}

/// Tick state tracks what happened across ticks
#[derive(Debug, Default)]
pub struct TickState {
    pub tick_count: u64,
    pub jobs_fired: u64,
    pub jobs_failed: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run one tick: fire every due job. Returns the names of jobs that fired.
pub async fn run_tick(ctx: &DaemonContext, config: &TickConfig, state: &mut TickState) -> Vec<&'static str> {
    state.tick_count += 1;
    let now = ctx.clock.now();
    let mut fired = Vec::new();

    for job in &config.jobs {
        let last_run = match ctx.store.last_run(job.name) {
            Ok(last) => last,
            Err(e) => {
                log::error!("Failed to read run marker for {}: {}", job.name, e);
                state.jobs_failed += 1;
                continue;
            }
        };
        if !job.is_due(now, last_run) {
            continue;
        }

        log::info!("Firing daily job {} for {}", job.name, now.date());
        match fire(ctx, job).await {
            Ok(true) => {
                if let Err(e) = ctx.store.mark_run(job.name, now.date()) {
                    log::error!("Failed to record run marker for {}: {}", job.name, e);
                }
                state.jobs_fired += 1;
                fired.push(job.name);
            }
            Ok(false) => {
                // Partial result, try again next tick
                state.jobs_failed += 1;
            }
            Err(e) => {
                log::error!("Daily job {} failed: {}", job.name, e);
                state.jobs_failed += 1;
            }
        }
    }

    fired
}

/// Run the job; Ok(false) means it should be retried
async fn fire(ctx: &DaemonContext, job: &DailyJob) -> Result<bool> {
    match job.kind {
        JobKind::Recycle => {
            let report = ctx.recycler.run_daily();
            ctx.broadcast(DaemonEvent::recycling_completed(&report));
            Ok(report.is_complete())
        }
        JobKind::Distribute => {
            // Also a no-op when a scheduler call already ran today's batch
            let report = ctx.distributor.scheduled_distribute_all().await?;
            for event in DaemonEvent::from_batch(&report) {
                ctx.broadcast(event);
            }
            Ok(true)
        }
    }
}

/// Tick until `shutdown` flips to true
pub async fn run_tick_loop(ctx: Arc<DaemonContext>, config: TickConfig, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut state = TickState::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let fired = run_tick(&ctx, &config, &mut state).await;
                if !fired.is_empty() {
                    log::debug!("Tick {} fired {:?}", state.tick_count, fired);
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }

    log::info!(
        "Tick loop stopped after {} ticks ({} jobs fired, {} failed)",
        state.tick_count,
        state.jobs_fired,
        state.jobs_failed
    );
}
