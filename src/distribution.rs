//! Trigger surface: every way leads get handed out.
//!
//! Scheduled, admin, self-service and billing triggers all end up in
//! [`Allocator::allocate`]; they differ only in how many leads they ask for
//! and which consumers they cover.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use tokio::sync::Mutex;

use crate::allocator::{AllocationOutcome, Allocator, REASON_NOTHING_REQUESTED};
use crate::clock::Clock;
use crate::domain::{Consumer, PlanTier};
use crate::error::{LeadflowError, Result};
use crate::quota::{Quota, QuotaPolicy};
use crate::store::DistributionStore;

pub const REASON_SUBSCRIPTION_INACTIVE: &str = "subscription not active";

/// Run marker for the once-a-day scheduled distribution
pub const JOB_DISTRIBUTE: &str = "job.distribute";

/// Who an admin distribution covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionTarget {
    AllActive,
    Consumer(String),
}

impl FromStr for DistributionTarget {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(LeadflowError::InvalidInput("empty distribution target".to_string())),
            "all-active" => Ok(DistributionTarget::AllActive),
            id => Ok(DistributionTarget::Consumer(id.to_string())),
        }
    }
}

impl fmt::Display for DistributionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionTarget::AllActive => write!(f, "all-active"),
            DistributionTarget::Consumer(id) => write!(f, "{}", id),
        }
    }
}

/// One consumer's line in a batch report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerResult {
    pub consumer_id: String,
    pub assigned: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cursor: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_lead_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

impl ConsumerResult {
    fn from_outcome(outcome: AllocationOutcome) -> Self {
        Self {
            consumer_id: outcome.consumer_id,
            assigned: outcome.assigned_count,
            new_cursor: Some(outcome.new_cursor),
            created_lead_ids: outcome.created_lead_ids,
            reason: outcome.reason,
            error: None,
            retryable: false,
        }
    }

    fn from_error(consumer_id: &str, err: &LeadflowError) -> Self {
        Self {
            consumer_id: consumer_id.to_string(),
            assigned: 0,
            new_cursor: None,
            created_lead_ids: Vec::new(),
            reason: None,
            error: Some(err.to_string()),
            retryable: err.is_retryable(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of a multi-consumer distribution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_assigned: usize,
    /// Sorted by consumer id
    pub per_consumer: Vec<ConsumerResult>,
    /// True when the day's scheduled distribution had already run
    #[serde(default)]
    pub already_ran: bool,
}

impl BatchReport {
    fn from_results(mut results: Vec<ConsumerResult>) -> Self {
        results.sort_by(|a, b| a.consumer_id.cmp(&b.consumer_id));
        Self {
            total_assigned: results.iter().map(|r| r.assigned).sum(),
            per_consumer: results,
            already_ran: false,
        }
    }

    fn already_ran() -> Self {
        Self {
            already_ran: true,
            ..Self::default()
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConsumerResult> {
        self.per_consumer.iter().filter(|r| r.is_error())
    }

    /// Every lead created in the batch, grouped by consumer
    pub fn created(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.per_consumer
            .iter()
            .filter(|r| !r.created_lead_ids.is_empty())
            .map(|r| (r.consumer_id.as_str(), r.created_lead_ids.as_slice()))
    }
}

/// Events the billing system reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    PlanUpgraded { consumer_id: String, tier: PlanTier },
    LeadPurchased { consumer_id: String, lead_id: String },
}

/// What handling a billing event did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingOutcome {
    PlanUpgraded { consumer: Consumer, allocation: AllocationOutcome },
    LeadPurchased { consumer_id: String, lead_id: String, created: bool },
}

/// Runs the distribution triggers against one allocator
pub struct Distributor {
    allocator: Arc<Allocator>,
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
    parallelism: usize,
    /// Serializes the scheduled run's marker check with its marker write
    scheduled: Mutex<()>,
}

impl Distributor {
    pub fn new(allocator: Arc<Allocator>, policy: QuotaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            allocator,
            policy,
            clock,
            parallelism: 4,
            scheduled: Mutex::new(()),
        }
    }

    /// Bound on concurrent allocations within a batch
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    fn store(&self) -> &Arc<dyn DistributionStore> {
        self.allocator.store()
    }

    /// Daily run: every active consumer gets today's quota.
    ///
    /// Takes effect at most once per local calendar day; later calls the same
    /// day return an empty report with `already_ran` set.
    pub async fn scheduled_distribute_all(&self) -> Result<BatchReport> {
        let _gate = self.scheduled.lock().await;
        let today = self.clock.today();
        if self.store().last_run(JOB_DISTRIBUTE)?.is_some_and(|day| day >= today) {
            log::info!("Scheduled distribution already ran on {}", today);
            return Ok(BatchReport::already_ran());
        }

        let consumers = self.store().list_active_consumers()?;
        let weekday = self.clock.weekday();
        log::info!("Scheduled distribution for {} active consumers ({})", consumers.len(), weekday);

        let requests = consumers
            .into_iter()
            .map(|c| {
                let quota = self.policy.resolve(c.plan_tier, weekday);
                (c, quota)
            })
            .collect();
        let report = self.run_batch(requests).await;

        // Per-consumer failures are in the report; the day still counts as run
        if let Err(e) = self.store().mark_run(JOB_DISTRIBUTE, today) {
            log::error!("Failed to record scheduled distribution for {}: {}", today, e);
        }
        Ok(report)
    }

    /// Admin override: a fixed count for one consumer or every active one
    pub async fn admin_distribute(&self, target: &DistributionTarget, count: u32) -> Result<BatchReport> {
        let consumers = match target {
            DistributionTarget::AllActive => self.store().list_active_consumers()?,
            DistributionTarget::Consumer(id) => vec![self.consumer(id)?],
        };
        log::info!("Admin distribution of {} leads to {} ({} consumers)", count, target, consumers.len());

        if count == 0 {
            let results = consumers
                .into_iter()
                .map(|c| ConsumerResult::from_outcome(AllocationOutcome::noop(c.id, c.cursor, REASON_NOTHING_REQUESTED)))
                .collect();
            return Ok(BatchReport::from_results(results));
        }

        let requests = consumers
            .into_iter()
            .map(|c| {
                let quota = Quota {
                    amount: count,
                    cadence: None,
                };
                (c, quota)
            })
            .collect();
        Ok(self.run_batch(requests).await)
    }

    /// Consumer-initiated: the consumer's current plan quota for today
    pub async fn self_distribute(&self, consumer_id: &str) -> Result<AllocationOutcome> {
        let consumer = self.consumer(consumer_id)?;
        if !consumer.subscription.is_active() {
            return Ok(AllocationOutcome::noop(consumer_id, consumer.cursor, REASON_SUBSCRIPTION_INACTIVE));
        }

        let quota = self.policy.resolve(consumer.plan_tier, self.clock.weekday());
        self.allocate_quota(&consumer, quota).await
    }

    /// Billing callback: record the new tier, then grant its full amount now
    pub async fn on_plan_upgraded(&self, consumer_id: &str, tier: PlanTier) -> Result<(Consumer, AllocationOutcome)> {
        let consumer = self.store().change_plan(consumer_id, tier)?;
        log::info!("Consumer {} moved to plan {}", consumer_id, tier);

        let quota = self.policy.immediate_grant(tier);
        let outcome = self.allocate_quota(&consumer, quota).await?;
        Ok((consumer, outcome))
    }

    /// Billing callback: record a single purchased lead; false on a repeat
    pub async fn on_lead_purchased(&self, consumer_id: &str, lead_id: &str) -> Result<bool> {
        let _guard = self.allocator.lock_consumer(consumer_id).await?;
        let created = self.store().record_purchase(consumer_id, lead_id)?;
        if created {
            log::info!("Consumer {} purchased lead {}", consumer_id, lead_id);
        } else {
            log::debug!("Repeat purchase of {} by {} ignored", lead_id, consumer_id);
        }
        Ok(created)
    }

    pub async fn handle_billing_event(&self, event: BillingEvent) -> Result<BillingOutcome> {
        match event {
            BillingEvent::PlanUpgraded { consumer_id, tier } => {
                let (consumer, allocation) = self.on_plan_upgraded(&consumer_id, tier).await?;
                Ok(BillingOutcome::PlanUpgraded { consumer, allocation })
            }
            BillingEvent::LeadPurchased { consumer_id, lead_id } => {
                let created = self.on_lead_purchased(&consumer_id, &lead_id).await?;
                Ok(BillingOutcome::LeadPurchased {
                    consumer_id,
                    lead_id,
                    created,
                })
            }
        }
    }

    fn consumer(&self, consumer_id: &str) -> Result<Consumer> {
        self.store()
            .get_consumer(consumer_id)?
            .ok_or_else(|| LeadflowError::ConsumerNotFound(consumer_id.to_string()))
    }

    async fn allocate_quota(&self, consumer: &Consumer, quota: Quota) -> Result<AllocationOutcome> {
        if let Some(reason) = quota.unavailable_reason() {
            log::debug!("No allocation for {}: {}", consumer.id, reason);
            return Ok(AllocationOutcome::noop(consumer.id.as_str(), consumer.cursor, reason));
        }
        self.allocator.allocate(&consumer.id, quota.amount).await
    }

    async fn run_batch(&self, requests: Vec<(Consumer, Quota)>) -> BatchReport {
        let results: Vec<ConsumerResult> = stream::iter(requests)
            .map(|(consumer, quota)| async move {
                match self.allocate_quota(&consumer, quota).await {
                    Ok(outcome) => ConsumerResult::from_outcome(outcome),
                    Err(e) => {
                        log::error!("Allocation for {} failed: {}", consumer.id, e);
                        ConsumerResult::from_error(&consumer.id, &e)
                    }
                }
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let report = BatchReport::from_results(results);
        tracing::info!(
            consumers = report.per_consumer.len(),
            total_assigned = report.total_assigned,
            failures = report.failures().count(),
            "Batch distribution finished"
        );
        report
    }
}
