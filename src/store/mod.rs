//! Persistence for the lead pool, consumers, both assignment collections and
//! daily run markers.

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{AssignmentStore, ConsumerStore, DistributionStore, LeadPoolStore, RunMarkerStore, SweepCounts};
