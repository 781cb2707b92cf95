//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use leadflow::allocator::Allocator;
use leadflow::clock::FixedClock;
use leadflow::distribution::Distributor;
use leadflow::domain::{Assignment, AssignmentKind, AssignmentStatus, Consumer, Lead, PlanTier};
use leadflow::error::{LeadflowError, Result};
use leadflow::quota::QuotaPolicy;
use leadflow::store::{AssignmentStore, ConsumerStore, LeadPoolStore, RunMarkerStore, SqliteStore, SweepCounts};

/// Monday 2026-10-19
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// Tuesday 2026-10-20
pub fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
}

/// In-memory store with `leads` leads, returning their IDs in pool order
pub fn seeded_store(leads: usize) -> (SqliteStore, Vec<String>) {
    let store = SqliteStore::open_in_memory().unwrap();
    for i in 0..leads {
        store.append_lead(serde_json::json!({ "n": i })).unwrap();
    }
    let ids = store.ordered_lead_ids().unwrap();
    (store, ids)
}

pub fn distributor(store: Arc<FaultyStore>, day: NaiveDate, lock_timeout: Duration) -> Distributor {
    let allocator = Arc::new(Allocator::new(store, lock_timeout));
    Distributor::new(allocator, QuotaPolicy::default(), Arc::new(FixedClock::on(day)))
}

pub fn add_consumer(store: &dyn ConsumerStore, id: &str, tier: PlanTier) {
    store.upsert_consumer(&Consumer::new(id, tier)).unwrap();
}

/// SQLite store that fails chosen operations on demand
pub struct FaultyStore {
    inner: SqliteStore,
    failing_consumers: Mutex<HashSet<String>>,
    failing_collections: Mutex<HashSet<AssignmentKind>>,
}

impl FaultyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            failing_consumers: Mutex::new(HashSet::new()),
            failing_collections: Mutex::new(HashSet::new()),
        }
    }

    /// Make commits for this consumer fail
    pub fn fail_consumer(&self, id: &str) {
        self.failing_consumers.lock().unwrap().insert(id.to_string());
    }

    /// Make sweeps of this collection fail
    pub fn fail_collection(&self, kind: AssignmentKind) {
        self.failing_collections.lock().unwrap().insert(kind);
    }

    pub fn heal(&self) {
        self.failing_consumers.lock().unwrap().clear();
        self.failing_collections.lock().unwrap().clear();
    }
}

impl LeadPoolStore for FaultyStore {
    fn append_lead(&self, payload: serde_json::Value) -> Result<Lead> {
        self.inner.append_lead(payload)
    }

    fn list_leads(&self) -> Result<Vec<Lead>> {
        self.inner.list_leads()
    }

    fn ordered_lead_ids(&self) -> Result<Vec<String>> {
        self.inner.ordered_lead_ids()
    }
}

impl ConsumerStore for FaultyStore {
    fn upsert_consumer(&self, consumer: &Consumer) -> Result<()> {
        self.inner.upsert_consumer(consumer)
    }

    fn get_consumer(&self, id: &str) -> Result<Option<Consumer>> {
        self.inner.get_consumer(id)
    }

    fn list_consumers(&self) -> Result<Vec<Consumer>> {
        self.inner.list_consumers()
    }

    fn list_active_consumers(&self) -> Result<Vec<Consumer>> {
        self.inner.list_active_consumers()
    }

    fn change_plan(&self, id: &str, tier: PlanTier) -> Result<Consumer> {
        self.inner.change_plan(id, tier)
    }
}

impl AssignmentStore for FaultyStore {
    fn held_lead_ids(&self, consumer_id: &str) -> Result<HashSet<String>> {
        self.inner.held_lead_ids(consumer_id)
    }

    fn commit_allocation(
        &self,
        consumer_id: &str,
        expected_cursor: u64,
        new_cursor: u64,
        assignments: &[Assignment],
    ) -> Result<Vec<String>> {
        if self.failing_consumers.lock().unwrap().contains(consumer_id) {
            return Err(LeadflowError::Storage(format!("injected failure for {}", consumer_id)));
        }
        self.inner
            .commit_allocation(consumer_id, expected_cursor, new_cursor, assignments)
    }

    fn record_purchase(&self, consumer_id: &str, lead_id: &str) -> Result<bool> {
        self.inner.record_purchase(consumer_id, lead_id)
    }

    fn get_assignment(&self, kind: AssignmentKind, consumer_id: &str, lead_id: &str) -> Result<Option<Assignment>> {
        self.inner.get_assignment(kind, consumer_id, lead_id)
    }

    fn update_assignment(
        &self,
        kind: AssignmentKind,
        consumer_id: &str,
        lead_id: &str,
        status: AssignmentStatus,
        countdown_days: Option<u32>,
    ) -> Result<Assignment> {
        self.inner
            .update_assignment(kind, consumer_id, lead_id, status, countdown_days)
    }

    fn list_assignments(&self, kind: AssignmentKind, consumer_id: &str) -> Result<Vec<Assignment>> {
        self.inner.list_assignments(kind, consumer_id)
    }

    fn recycle_collection(&self, kind: AssignmentKind, day: NaiveDate) -> Result<SweepCounts> {
        if self.failing_collections.lock().unwrap().contains(&kind) {
            return Err(LeadflowError::Storage(format!("injected failure for {}", kind)));
        }
        self.inner.recycle_collection(kind, day)
    }
}

impl RunMarkerStore for FaultyStore {
    fn last_run(&self, job: &str) -> Result<Option<NaiveDate>> {
        self.inner.last_run(job)
    }

    fn mark_run(&self, job: &str, day: NaiveDate) -> Result<()> {
        self.inner.mark_run(job, day)
    }
}
