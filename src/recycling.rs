//! Daily recycling sweep over both assignment collections.
//!
//! Each collection is swept in its own transaction with its own run marker, so
//! one failing collection doesn't stop or undo the other, and a second run on
//! the same day is a no-op for whatever already succeeded.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::domain::AssignmentKind;
use crate::store::{DistributionStore, SweepCounts};

/// A collection whose sweep failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionError {
    pub collection: AssignmentKind,
    pub message: String,
}

/// Combined outcome of one recycling run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecyclingReport {
    /// Calendar day the run was for
    pub day: Option<NaiveDate>,
    pub subscription: Option<SweepCounts>,
    pub purchased: Option<SweepCounts>,
    pub errors: Vec<CollectionError>,
}

impl RecyclingReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn counts(&self, kind: AssignmentKind) -> Option<&SweepCounts> {
        match kind {
            AssignmentKind::Subscription => self.subscription.as_ref(),
            AssignmentKind::Purchased => self.purchased.as_ref(),
        }
    }

    fn record(&mut self, kind: AssignmentKind, counts: SweepCounts) {
        match kind {
            AssignmentKind::Subscription => self.subscription = Some(counts),
            AssignmentKind::Purchased => self.purchased = Some(counts),
        }
    }
}

/// Runs the countdown decay once per local calendar day
pub struct Recycler {
    store: Arc<dyn DistributionStore>,
    clock: Arc<dyn Clock>,
}

impl Recycler {
    pub fn new(store: Arc<dyn DistributionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Sweep both collections for today
    pub fn run_daily(&self) -> RecyclingReport {
        self.run_for(self.clock.today())
    }

    /// Sweep both collections for `day`
    pub fn run_for(&self, day: NaiveDate) -> RecyclingReport {
        let mut report = RecyclingReport {
            day: Some(day),
            ..RecyclingReport::default()
        };

        for kind in AssignmentKind::ALL {
            match self.store.recycle_collection(kind, day) {
                Ok(counts) => {
                    if counts.already_ran {
                        log::info!("Recycling for {} already ran on {}", kind, day);
                    } else {
                        tracing::info!(
                            collection = kind.as_str(),
                            decremented = counts.decremented,
                            reset = counts.reset,
                            "Recycled assignments"
                        );
                    }
                    report.record(kind, counts);
                }
                Err(e) => {
                    log::error!("Recycling {} assignments failed: {}", kind, e);
                    report.errors.push(CollectionError {
                        collection: kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
