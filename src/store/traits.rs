//! Store seams consumed by the allocator, recycler and trigger surface.
//!
//! Each collaborator the core talks to is a trait so the SQLite store can be
//! swapped (or wrapped with fault injection in tests).

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::domain::{Assignment, AssignmentKind, AssignmentStatus, Consumer, Lead, PlanTier};
use crate::error::Result;

/// Counts from one collection's recycling sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SweepCounts {
    pub decremented: u64,
    pub reset: u64,
    /// True when the collection had already been swept for the day
    pub already_ran: bool,
}

/// Append-only, ordered lead pool
pub trait LeadPoolStore: Send + Sync {
    /// Append a lead at the end of the pool
    fn append_lead(&self, payload: serde_json::Value) -> Result<Lead>;

    /// All leads in sequence order
    fn list_leads(&self) -> Result<Vec<Lead>>;

    /// Lead IDs in sequence order
    fn ordered_lead_ids(&self) -> Result<Vec<String>>;
}

/// Consumer directory
pub trait ConsumerStore: Send + Sync {
    /// Insert, or update plan/subscription of an existing consumer (cursor is kept)
    fn upsert_consumer(&self, consumer: &Consumer) -> Result<()>;

    fn get_consumer(&self, id: &str) -> Result<Option<Consumer>>;

    fn list_consumers(&self) -> Result<Vec<Consumer>>;

    /// Consumers whose subscription is active
    fn list_active_consumers(&self) -> Result<Vec<Consumer>>;

    /// Record a new plan tier and mark the subscription active
    fn change_plan(&self, id: &str, tier: PlanTier) -> Result<Consumer>;
}

/// Both assignment collections
pub trait AssignmentStore: Send + Sync {
    /// Lead IDs the consumer already holds in any collection
    fn held_lead_ids(&self, consumer_id: &str) -> Result<HashSet<String>>;

    /// Atomically move the consumer's cursor from `expected_cursor` to
    /// `new_cursor` and insert the subscription assignments.
    ///
    /// Fails with `CursorConflict` if the stored cursor is not `expected_cursor`.
    /// Rows whose (consumer, lead) already exists are skipped; the returned IDs
    /// are the leads actually inserted, in input order.
    fn commit_allocation(
        &self,
        consumer_id: &str,
        expected_cursor: u64,
        new_cursor: u64,
        assignments: &[Assignment],
    ) -> Result<Vec<String>>;

    /// Record a purchased assignment; false if the consumer already bought it
    fn record_purchase(&self, consumer_id: &str, lead_id: &str) -> Result<bool>;

    fn get_assignment(&self, kind: AssignmentKind, consumer_id: &str, lead_id: &str) -> Result<Option<Assignment>>;

    /// Apply a consumer status change and return the updated row
    fn update_assignment(
        &self,
        kind: AssignmentKind,
        consumer_id: &str,
        lead_id: &str,
        status: AssignmentStatus,
        countdown_days: Option<u32>,
    ) -> Result<Assignment>;

    fn list_assignments(&self, kind: AssignmentKind, consumer_id: &str) -> Result<Vec<Assignment>>;

    /// Run one day of countdown decay over a collection, at most once per `day`
    fn recycle_collection(&self, kind: AssignmentKind, day: NaiveDate) -> Result<SweepCounts>;
}

/// Last-run dates for daily jobs
pub trait RunMarkerStore: Send + Sync {
    fn last_run(&self, job: &str) -> Result<Option<NaiveDate>>;

    fn mark_run(&self, job: &str, day: NaiveDate) -> Result<()>;
}

/// Everything the distribution core needs from storage
pub trait DistributionStore: LeadPoolStore + ConsumerStore + AssignmentStore + RunMarkerStore {}

impl<T> DistributionStore for T where T: LeadPoolStore + ConsumerStore + AssignmentStore + RunMarkerStore {}
