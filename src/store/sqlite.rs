//! SQLite-backed store for leads, consumers, assignments and run markers.
//!
//! One connection sits behind a `Mutex` since `rusqlite::Connection` isn't
//! Sync. Every multi-statement write runs in an `IMMEDIATE` transaction so
//! concurrent processes sharing the database file serialize on the write lock.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::domain::{Assignment, AssignmentKind, AssignmentStatus, Consumer, Lead, PlanTier};
use crate::error::{LeadflowError, Result};
use crate::id::now_ms;
use crate::store::traits::{AssignmentStore, ConsumerStore, LeadPoolStore, RunMarkerStore, SweepCounts};

const MARKER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Store implementation over a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        log::debug!("Opened lead database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Initialize the SQLite schema.
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                sequence INTEGER NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS consumers (
                id TEXT PRIMARY KEY,
                plan_tier TEXT NOT NULL,
                subscription TEXT NOT NULL,
                cursor INTEGER NOT NULL DEFAULT 0 CHECK (cursor >= 0),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_consumers_subscription ON consumers(subscription);

            CREATE TABLE IF NOT EXISTS subscription_assignments (
                consumer_id TEXT NOT NULL REFERENCES consumers(id),
                lead_id TEXT NOT NULL REFERENCES leads(id),
                status TEXT NOT NULL,
                action TEXT NOT NULL,
                countdown_days INTEGER CHECK (countdown_days IS NULL OR countdown_days >= 0),
                assigned_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (consumer_id, lead_id)
            );

            CREATE INDEX IF NOT EXISTS idx_subscription_countdown
                ON subscription_assignments(countdown_days) WHERE countdown_days IS NOT NULL;

            CREATE TABLE IF NOT EXISTS purchased_assignments (
                consumer_id TEXT NOT NULL REFERENCES consumers(id),
                lead_id TEXT NOT NULL REFERENCES leads(id),
                status TEXT NOT NULL,
                action TEXT NOT NULL,
                countdown_days INTEGER CHECK (countdown_days IS NULL OR countdown_days >= 0),
                assigned_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (consumer_id, lead_id)
            );

            CREATE INDEX IF NOT EXISTS idx_purchased_countdown
                ON purchased_assignments(countdown_days) WHERE countdown_days IS NOT NULL;

            CREATE TABLE IF NOT EXISTS run_markers (
                job TEXT PRIMARY KEY,
                last_run TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LeadflowError::Storage(format!("connection lock poisoned: {}", e)))
    }

    fn lead_exists(db: &Connection, lead_id: &str) -> Result<bool> {
        let found: Option<i64> = db
            .query_row("SELECT 1 FROM leads WHERE id = ?1", [lead_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn consumer_exists(db: &Connection, consumer_id: &str) -> Result<bool> {
        let found: Option<i64> = db
            .query_row("SELECT 1 FROM consumers WHERE id = ?1", [consumer_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_assignment(db: &Connection, assignment: &Assignment) -> Result<bool> {
        let sql = format!(
            "INSERT OR IGNORE INTO {}
             (consumer_id, lead_id, status, action, countdown_days, assigned_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            assignment.kind.table()
        );
        let inserted = db.execute(
            &sql,
            params![
                assignment.consumer_id,
                assignment.lead_id,
                assignment.status.as_str(),
                assignment.action.as_str(),
                assignment.countdown_days,
                assignment.assigned_at,
                assignment.updated_at,
            ],
        )?;
        Ok(inserted == 1)
    }

    fn write_assignment_state(db: &Connection, assignment: &Assignment) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = ?1, action = ?2, countdown_days = ?3, updated_at = ?4
             WHERE consumer_id = ?5 AND lead_id = ?6",
            assignment.kind.table()
        );
        db.execute(
            &sql,
            params![
                assignment.status.as_str(),
                assignment.action.as_str(),
                assignment.countdown_days,
                assignment.updated_at,
                assignment.consumer_id,
                assignment.lead_id,
            ],
        )?;
        Ok(())
    }

    fn select_assignments(db: &Connection, kind: AssignmentKind, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Assignment>> {
        let sql = format!(
            "SELECT consumer_id, lead_id, status, action, countdown_days, assigned_at, updated_at
             FROM {} WHERE {} ORDER BY assigned_at, lead_id",
            kind.table(),
            filter
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(args, AssignmentRow::from_row)?;

        let mut assignments = Vec::new();
        for row in rows {
            assignments.push(row?.into_assignment(kind)?);
        }
        Ok(assignments)
    }

    fn read_marker(db: &Connection, job: &str) -> Result<Option<NaiveDate>> {
        let raw: Option<String> = db
            .query_row("SELECT last_run FROM run_markers WHERE job = ?1", [job], |row| row.get(0))
            .optional()?;
        raw.map(|s| {
            NaiveDate::parse_from_str(&s, MARKER_DATE_FORMAT)
                .map_err(|e| LeadflowError::Storage(format!("bad run marker '{}' for {}: {}", s, job, e)))
        })
        .transpose()
    }

    fn write_marker(db: &Connection, job: &str, day: NaiveDate) -> Result<()> {
        db.execute(
            "INSERT INTO run_markers (job, last_run, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(job) DO UPDATE SET last_run = excluded.last_run, updated_at = excluded.updated_at",
            params![job, day.format(MARKER_DATE_FORMAT).to_string(), now_ms()],
        )?;
        Ok(())
    }
}

/// Raw consumer columns; enum parsing happens outside the rusqlite closure
struct ConsumerRow {
    id: String,
    plan_tier: String,
    subscription: String,
    cursor: i64,
    created_at: i64,
    updated_at: i64,
}

impl ConsumerRow {
    const COLUMNS: &'static str = "id, plan_tier, subscription, cursor, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            plan_tier: row.get(1)?,
            subscription: row.get(2)?,
            cursor: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_consumer(self) -> Result<Consumer> {
        Ok(Consumer {
            plan_tier: self.plan_tier.parse()?,
            subscription: self.subscription.parse()?,
            cursor: self.cursor.max(0) as u64,
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct AssignmentRow {
    consumer_id: String,
    lead_id: String,
    status: String,
    action: String,
    countdown_days: Option<u32>,
    assigned_at: i64,
    updated_at: i64,
}

impl AssignmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            consumer_id: row.get(0)?,
            lead_id: row.get(1)?,
            status: row.get(2)?,
            action: row.get(3)?,
            countdown_days: row.get(4)?,
            assigned_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_assignment(self, kind: AssignmentKind) -> Result<Assignment> {
        Ok(Assignment {
            consumer_id: self.consumer_id,
            lead_id: self.lead_id,
            kind,
            status: self.status.parse()?,
            action: self.action.parse()?,
            countdown_days: self.countdown_days,
            assigned_at: self.assigned_at,
            updated_at: self.updated_at,
        })
    }
}

impl LeadPoolStore for SqliteStore {
    fn append_lead(&self, payload: serde_json::Value) -> Result<Lead> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let next: i64 = tx.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM leads", [], |row| row.get(0))?;
        let lead = Lead::new(next, payload);
        tx.execute(
            "INSERT INTO leads (id, sequence, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![lead.id, lead.sequence, serde_json::to_string(&lead.payload)?, lead.created_at],
        )?;
        tx.commit()?;

        Ok(lead)
    }

    fn list_leads(&self) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, sequence, payload, created_at FROM leads ORDER BY sequence")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut leads = Vec::new();
        for row in rows {
            let (id, sequence, payload, created_at) = row?;
            leads.push(Lead {
                id,
                sequence,
                payload: serde_json::from_str(&payload)?,
                created_at,
            });
        }
        Ok(leads)
    }

    fn ordered_lead_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM leads ORDER BY sequence")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

impl ConsumerStore for SqliteStore {
    fn upsert_consumer(&self, consumer: &Consumer) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO consumers (id, plan_tier, subscription, cursor, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                plan_tier = excluded.plan_tier,
                subscription = excluded.subscription,
                updated_at = excluded.updated_at
            "#,
            params![
                consumer.id,
                consumer.plan_tier.as_str(),
                consumer.subscription.as_str(),
                consumer.cursor as i64,
                consumer.created_at,
                consumer.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_consumer(&self, id: &str) -> Result<Option<Consumer>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM consumers WHERE id = ?1", ConsumerRow::COLUMNS);
        let row = conn.query_row(&sql, [id], ConsumerRow::from_row).optional()?;
        row.map(ConsumerRow::into_consumer).transpose()
    }

    fn list_consumers(&self) -> Result<Vec<Consumer>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM consumers ORDER BY id", ConsumerRow::COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], ConsumerRow::from_row)?;

        let mut consumers = Vec::new();
        for row in rows {
            consumers.push(row?.into_consumer()?);
        }
        Ok(consumers)
    }

    fn list_active_consumers(&self) -> Result<Vec<Consumer>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM consumers WHERE subscription = 'active' ORDER BY id",
            ConsumerRow::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], ConsumerRow::from_row)?;

        let mut consumers = Vec::new();
        for row in rows {
            consumers.push(row?.into_consumer()?);
        }
        Ok(consumers)
    }

    fn change_plan(&self, id: &str, tier: PlanTier) -> Result<Consumer> {
        {
            let conn = self.conn()?;
            let updated = conn.execute(
                "UPDATE consumers SET plan_tier = ?1, subscription = 'active', updated_at = ?2 WHERE id = ?3",
                params![tier.as_str(), now_ms(), id],
            )?;
            if updated == 0 {
                return Err(LeadflowError::ConsumerNotFound(id.to_string()));
            }
        }
        self.get_consumer(id)?
            .ok_or_else(|| LeadflowError::ConsumerNotFound(id.to_string()))
    }
}

impl AssignmentStore for SqliteStore {
    fn held_lead_ids(&self, consumer_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT lead_id FROM subscription_assignments WHERE consumer_id = ?1
             UNION
             SELECT lead_id FROM purchased_assignments WHERE consumer_id = ?1",
        )?;
        let rows = stmt.query_map([consumer_id], |row| row.get::<_, String>(0))?;

        let mut held = HashSet::new();
        for row in rows {
            held.insert(row?);
        }
        Ok(held)
    }

    fn commit_allocation(
        &self,
        consumer_id: &str,
        expected_cursor: u64,
        new_cursor: u64,
        assignments: &[Assignment],
    ) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let moved = tx.execute(
            "UPDATE consumers SET cursor = ?1, updated_at = ?2 WHERE id = ?3 AND cursor = ?4",
            params![new_cursor as i64, now_ms(), consumer_id, expected_cursor as i64],
        )?;
        if moved == 0 {
            // Dropping the transaction rolls it back
            return if Self::consumer_exists(&tx, consumer_id)? {
                Err(LeadflowError::CursorConflict {
                    consumer_id: consumer_id.to_string(),
                })
            } else {
                Err(LeadflowError::ConsumerNotFound(consumer_id.to_string()))
            };
        }

        let mut created = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if Self::insert_assignment(&tx, assignment)? {
                created.push(assignment.lead_id.clone());
            } else {
                log::debug!(
                    "Skipping duplicate assignment consumer={} lead={}",
                    consumer_id,
                    assignment.lead_id
                );
            }
        }

        tx.commit()?;
        Ok(created)
    }

    fn record_purchase(&self, consumer_id: &str, lead_id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !Self::consumer_exists(&tx, consumer_id)? {
            return Err(LeadflowError::ConsumerNotFound(consumer_id.to_string()));
        }
        if !Self::lead_exists(&tx, lead_id)? {
            return Err(LeadflowError::LeadNotFound(lead_id.to_string()));
        }

        let assignment = Assignment::new(consumer_id, lead_id, AssignmentKind::Purchased);
        let inserted = Self::insert_assignment(&tx, &assignment)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn get_assignment(&self, kind: AssignmentKind, consumer_id: &str, lead_id: &str) -> Result<Option<Assignment>> {
        let conn = self.conn()?;
        let mut found = Self::select_assignments(
            &conn,
            kind,
            "consumer_id = ?1 AND lead_id = ?2",
            &[&consumer_id, &lead_id],
        )?;
        Ok(found.pop())
    }

    fn update_assignment(
        &self,
        kind: AssignmentKind,
        consumer_id: &str,
        lead_id: &str,
        status: AssignmentStatus,
        countdown_days: Option<u32>,
    ) -> Result<Assignment> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut assignment = Self::select_assignments(
            &tx,
            kind,
            "consumer_id = ?1 AND lead_id = ?2",
            &[&consumer_id, &lead_id],
        )?
        .pop()
        .ok_or_else(|| LeadflowError::AssignmentNotFound {
            consumer_id: consumer_id.to_string(),
            lead_id: lead_id.to_string(),
        })?;

        assignment.set_status(status, countdown_days);
        Self::write_assignment_state(&tx, &assignment)?;
        tx.commit()?;

        Ok(assignment)
    }

    fn list_assignments(&self, kind: AssignmentKind, consumer_id: &str) -> Result<Vec<Assignment>> {
        let conn = self.conn()?;
        Self::select_assignments(&conn, kind, "consumer_id = ?1", &[&consumer_id])
    }

    fn recycle_collection(&self, kind: AssignmentKind, day: NaiveDate) -> Result<SweepCounts> {
        let job = format!("recycle.{}", kind.as_str());
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(last) = Self::read_marker(&tx, &job)? {
            if last >= day {
                tx.commit()?;
                return Ok(SweepCounts {
                    already_ran: true,
                    ..SweepCounts::default()
                });
            }
        }

        let mut counts = SweepCounts::default();
        let candidates = Self::select_assignments(&tx, kind, "countdown_days IS NOT NULL", &[])?;
        for mut assignment in candidates {
            let effect = assignment.decay_one_day();
            if effect.decremented {
                counts.decremented += 1;
            }
            if effect.reset {
                counts.reset += 1;
            }
            if effect.changed() {
                Self::write_assignment_state(&tx, &assignment)?;
            }
        }

        Self::write_marker(&tx, &job, day)?;
        tx.commit()?;

        Ok(counts)
    }
}

impl RunMarkerStore for SqliteStore {
    fn last_run(&self, job: &str) -> Result<Option<NaiveDate>> {
        let conn = self.conn()?;
        Self::read_marker(&conn, job)
    }

    fn mark_run(&self, job: &str, day: NaiveDate) -> Result<()> {
        let conn = self.conn()?;
        Self::write_marker(&conn, job, day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn seeded_store(leads: usize) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..leads {
            store.append_lead(serde_json::json!({ "n": i })).unwrap();
        }
        store
            .upsert_consumer(&Consumer::new("c-1", PlanTier::Basic))
            .unwrap();
        store
    }

    fn fresh(lead_id: &str) -> Assignment {
        Assignment::new("c-1", lead_id, AssignmentKind::Subscription)
    }

    #[test]
    fn test_append_lead_assigns_increasing_sequence() {
        let store = seeded_store(3);
        let leads = store.list_leads().unwrap();
        let sequences: Vec<i64> = leads.iter().map(|l| l.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(leads[1].payload["n"], 1);

        let ids = store.ordered_lead_ids().unwrap();
        assert_eq!(ids, leads.iter().map(|l| l.id.clone()).collect::<Vec<_>>());
    }

    #[test]
    fn test_bulk_append_never_collides() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..2000 {
            store.append_lead(serde_json::json!({ "n": i })).unwrap();
        }
        let ids: HashSet<String> = store.ordered_lead_ids().unwrap().into_iter().collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db").join("leads.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.append_lead(serde_json::json!({})).unwrap();
            store.upsert_consumer(&Consumer::new("c-1", PlanTier::Free)).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_leads().unwrap().len(), 1);
        assert!(store.get_consumer("c-1").unwrap().is_some());
    }

    #[test]
    fn test_upsert_keeps_cursor() {
        let store = seeded_store(3);
        let ids = store.ordered_lead_ids().unwrap();
        store.commit_allocation("c-1", 0, 2, &[fresh(&ids[0])]).unwrap();

        let changed = Consumer::new("c-1", PlanTier::Premium);
        store.upsert_consumer(&changed).unwrap();

        let consumer = store.get_consumer("c-1").unwrap().unwrap();
        assert_eq!(consumer.cursor, 2);
        assert_eq!(consumer.plan_tier, PlanTier::Premium);
    }

    #[test]
    fn test_list_active_consumers_filters_subscription() {
        let store = seeded_store(0);
        store
            .upsert_consumer(&Consumer::new("c-2", PlanTier::Basic).with_subscription(crate::domain::SubscriptionStatus::Canceled))
            .unwrap();
        let active: Vec<String> = store.list_active_consumers().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(active, vec!["c-1".to_string()]);
        assert_eq!(store.list_consumers().unwrap().len(), 2);
    }

    #[test]
    fn test_change_plan_reactivates() {
        let store = seeded_store(0);
        store
            .upsert_consumer(&Consumer::new("c-1", PlanTier::Free).with_subscription(crate::domain::SubscriptionStatus::PastDue))
            .unwrap();
        let consumer = store.change_plan("c-1", PlanTier::Standard).unwrap();
        assert_eq!(consumer.plan_tier, PlanTier::Standard);
        assert!(consumer.subscription.is_active());
        assert!(matches!(
            store.change_plan("ghost", PlanTier::Basic),
            Err(LeadflowError::ConsumerNotFound(_))
        ));
    }

    #[test]
    fn test_commit_allocation_skips_duplicates() {
        let store = seeded_store(3);
        let ids = store.ordered_lead_ids().unwrap();

        let first = store.commit_allocation("c-1", 0, 1, &[fresh(&ids[0])]).unwrap();
        assert_eq!(first, vec![ids[0].clone()]);

        let second = store
            .commit_allocation("c-1", 1, 0, &[fresh(&ids[0]), fresh(&ids[1])])
            .unwrap();
        assert_eq!(second, vec![ids[1].clone()]);
        assert_eq!(store.list_assignments(AssignmentKind::Subscription, "c-1").unwrap().len(), 2);
    }

    #[test]
    fn test_commit_allocation_detects_cursor_conflict() {
        let store = seeded_store(3);
        let ids = store.ordered_lead_ids().unwrap();

        let err = store
            .commit_allocation("c-1", 2, 0, &[fresh(&ids[0])])
            .unwrap_err();
        assert!(matches!(err, LeadflowError::CursorConflict { .. }));
        assert!(err.is_retryable());
        // Nothing from the failed transaction is visible
        assert!(store.held_lead_ids("c-1").unwrap().is_empty());
    }

    #[test]
    fn test_commit_allocation_unknown_consumer() {
        let store = seeded_store(1);
        let err = store.commit_allocation("ghost", 0, 0, &[]).unwrap_err();
        assert!(matches!(err, LeadflowError::ConsumerNotFound(_)));
    }

    #[test]
    fn test_held_lead_ids_spans_both_collections() {
        let store = seeded_store(3);
        let ids = store.ordered_lead_ids().unwrap();
        store.commit_allocation("c-1", 0, 1, &[fresh(&ids[0])]).unwrap();
        assert!(store.record_purchase("c-1", &ids[2]).unwrap());

        let held = store.held_lead_ids("c-1").unwrap();
        assert_eq!(held.len(), 2);
        assert!(held.contains(&ids[0]) && held.contains(&ids[2]));
    }

    #[test]
    fn test_record_purchase_is_idempotent_and_validated() {
        let store = seeded_store(1);
        let ids = store.ordered_lead_ids().unwrap();
        assert!(store.record_purchase("c-1", &ids[0]).unwrap());
        assert!(!store.record_purchase("c-1", &ids[0]).unwrap());
        assert!(matches!(
            store.record_purchase("c-1", "lead-missing"),
            Err(LeadflowError::LeadNotFound(_))
        ));
        assert!(matches!(
            store.record_purchase("ghost", &ids[0]),
            Err(LeadflowError::ConsumerNotFound(_))
        ));
    }

    #[test]
    fn test_update_assignment_status() {
        let store = seeded_store(1);
        let ids = store.ordered_lead_ids().unwrap();
        store.commit_allocation("c-1", 0, 0, &[fresh(&ids[0])]).unwrap();

        let updated = store
            .update_assignment(AssignmentKind::Subscription, "c-1", &ids[0], AssignmentStatus::FollowUp, Some(3))
            .unwrap();
        assert_eq!(updated.countdown_days, Some(3));

        let stored = store
            .get_assignment(AssignmentKind::Subscription, "c-1", &ids[0])
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);

        let missing = store.update_assignment(AssignmentKind::Purchased, "c-1", &ids[0], AssignmentStatus::New, None);
        assert!(matches!(missing, Err(LeadflowError::AssignmentNotFound { .. })));
    }

    #[test]
    fn test_recycle_collection_once_per_day() {
        let store = seeded_store(2);
        let ids = store.ordered_lead_ids().unwrap();
        store
            .commit_allocation("c-1", 0, 0, &[fresh(&ids[0]), fresh(&ids[1])])
            .unwrap();
        store
            .update_assignment(AssignmentKind::Subscription, "c-1", &ids[0], AssignmentStatus::FollowUp, Some(1))
            .unwrap();
        store
            .update_assignment(AssignmentKind::Subscription, "c-1", &ids[1], AssignmentStatus::NotInterested, Some(3))
            .unwrap();

        let first = store.recycle_collection(AssignmentKind::Subscription, day(19)).unwrap();
        assert_eq!(first, SweepCounts { decremented: 2, reset: 1, already_ran: false });

        let again = store.recycle_collection(AssignmentKind::Subscription, day(19)).unwrap();
        assert!(again.already_ran);
        assert_eq!(again.decremented, 0);

        let a = store.get_assignment(AssignmentKind::Subscription, "c-1", &ids[1]).unwrap().unwrap();
        assert_eq!(a.countdown_days, Some(2));

        let next_day = store.recycle_collection(AssignmentKind::Subscription, day(20)).unwrap();
        assert_eq!(next_day.decremented, 1);
        assert_eq!(next_day.reset, 0);
    }

    #[test]
    fn test_recycle_markers_are_per_collection() {
        let store = seeded_store(0);
        store.recycle_collection(AssignmentKind::Subscription, day(19)).unwrap();
        let purchased = store.recycle_collection(AssignmentKind::Purchased, day(19)).unwrap();
        assert!(!purchased.already_ran);
        assert_eq!(store.last_run("recycle.purchased").unwrap(), Some(day(19)));
    }

    #[test]
    fn test_run_markers_roundtrip() {
        let store = seeded_store(0);
        assert_eq!(store.last_run("distribute").unwrap(), None);
        store.mark_run("distribute", day(18)).unwrap();
        store.mark_run("distribute", day(19)).unwrap();
        assert_eq!(store.last_run("distribute").unwrap(), Some(day(19)));
    }
}
