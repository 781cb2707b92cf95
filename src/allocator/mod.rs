//! Allocator: hands a consumer up to N leads they don't yet hold.
//!
//! Every trigger goes through [`Allocator::allocate`]. The call takes the
//! consumer's lock, plans a scan from the stored cursor, and commits the cursor
//! move and the new rows together.

mod locks;
mod scan;

pub use locks::{ConsumerGuard, ConsumerLocks};
pub use scan::{ScanPlan, plan_scan};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Assignment, AssignmentKind};
use crate::error::{LeadflowError, Result};
use crate::store::DistributionStore;

pub const REASON_EMPTY_POOL: &str = "lead pool is empty";
pub const REASON_NOTHING_REQUESTED: &str = "nothing requested";
pub const REASON_HOLDS_EVERY_LEAD: &str = "consumer already holds every lead";

/// What one allocation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub consumer_id: String,
    pub assigned_count: usize,
    pub new_cursor: u64,
    pub created_lead_ids: Vec<String>,
    /// Pool slots visited by the scan
    pub visited: usize,
    /// Set when nothing was assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AllocationOutcome {
    /// Result that assigned nothing and left the cursor alone
    pub fn noop(consumer_id: impl Into<String>, cursor: u64, reason: impl Into<String>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            assigned_count: 0,
            new_cursor: cursor,
            created_lead_ids: Vec::new(),
            visited: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Serializes allocations per consumer over a shared store
pub struct Allocator {
    store: Arc<dyn DistributionStore>,
    locks: ConsumerLocks,
    lock_timeout: Duration,
}

impl Allocator {
    pub fn new(store: Arc<dyn DistributionStore>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: ConsumerLocks::new(),
            lock_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn DistributionStore> {
        &self.store
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Take the consumer's critical section for work outside `allocate`
    pub async fn lock_consumer(&self, consumer_id: &str) -> Result<ConsumerGuard> {
        self.locks.acquire(consumer_id, self.lock_timeout).await
    }

    /// Assign up to `requested` leads to the consumer.
    ///
    /// An empty pool, a zero request, or a consumer who already holds every
    /// lead produce a no-op outcome with a reason, not an error.
    pub async fn allocate(&self, consumer_id: &str, requested: u32) -> Result<AllocationOutcome> {
        let _guard = self.lock_consumer(consumer_id).await?;

        let consumer = self
            .store
            .get_consumer(consumer_id)?
            .ok_or_else(|| LeadflowError::ConsumerNotFound(consumer_id.to_string()))?;

        if requested == 0 {
            return Ok(AllocationOutcome::noop(consumer_id, consumer.cursor, REASON_NOTHING_REQUESTED));
        }

        let pool = self.store.ordered_lead_ids()?;
        if pool.is_empty() {
            log::debug!("Lead pool is empty, nothing to allocate for {}", consumer_id);
            return Ok(AllocationOutcome::noop(consumer_id, consumer.cursor, REASON_EMPTY_POOL));
        }

        let held = self.store.held_lead_ids(consumer_id)?;
        let plan = plan_scan(&pool, consumer.cursor, requested as usize, |id| held.contains(id));

        let rows: Vec<Assignment> = plan
            .created
            .iter()
            .map(|lead_id| Assignment::new(consumer_id, lead_id.as_str(), AssignmentKind::Subscription))
            .collect();
        let created = self
            .store
            .commit_allocation(consumer_id, consumer.cursor, plan.new_cursor, &rows)?;

        tracing::info!(
            consumer_id,
            requested,
            assigned = created.len(),
            visited = plan.visited,
            from_cursor = consumer.cursor,
            new_cursor = plan.new_cursor,
            "Allocated leads"
        );

        let reason = if created.is_empty() {
            Some(REASON_HOLDS_EVERY_LEAD.to_string())
        } else {
            None
        };

        Ok(AllocationOutcome {
            consumer_id: consumer_id.to_string(),
            assigned_count: created.len(),
            new_cursor: plan.new_cursor,
            created_lead_ids: created,
            visited: plan.visited,
            reason,
        })
    }
}
