//! Per-consumer critical sections with a bounded wait.
//!
//! Allocation for one consumer (scheduled run, self-service, upgrade grant)
//! must never interleave. Each consumer id maps to its own async mutex; a
//! caller that can't get it within the timeout gets a retryable error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;

use crate::error::{LeadflowError, Result};

/// Held while a consumer's cursor is read, scanned and committed
#[derive(Debug)]
pub struct ConsumerGuard {
    consumer_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        log::trace!("Released lock for consumer {}", self.consumer_id);
    }
}

/// Registry of per-consumer locks
#[derive(Debug, Default)]
pub struct ConsumerLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConsumerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the consumer's lock, waiting at most `timeout`
    pub async fn acquire(&self, consumer_id: &str, timeout: Duration) -> Result<ConsumerGuard> {
        let lock = self.entry(consumer_id)?;
        let started = Instant::now();

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(ConsumerGuard {
                consumer_id: consumer_id.to_string(),
                _guard: guard,
            }),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(consumer_id, waited_ms, "Timed out waiting for consumer lock");
                Err(LeadflowError::LockTimeout {
                    consumer_id: consumer_id.to_string(),
                    waited_ms,
                })
            }
        }
    }

    fn entry(&self, consumer_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| LeadflowError::Storage(format!("lock registry poisoned: {}", e)))?;

        // Drop entries nobody holds or waits on
        locks.retain(|id, lock| id == consumer_id || Arc::strong_count(lock) > 1);

        Ok(locks
            .entry(consumer_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}
