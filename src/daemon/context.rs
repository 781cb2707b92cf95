//! Daemon context - shared state for request handlers and the tick loop

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::allocator::Allocator;
use crate::auth::SharedSecret;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::distribution::Distributor;
use crate::error::Result;
use crate::ipc::messages::DaemonEvent;
use crate::recycling::Recycler;
use crate::store::DistributionStore;

/// Shared context for all daemon request handlers
pub struct DaemonContext {
    pub store: Arc<dyn DistributionStore>,
    pub distributor: Distributor,
    pub recycler: Recycler,
    pub clock: Arc<dyn Clock>,
    /// Shared secret for scheduler, admin and billing callers
    pub auth: SharedSecret,
    pub event_tx: broadcast::Sender<DaemonEvent>,
}

impl DaemonContext {
    /// Wire the core components over `store` as configured
    pub fn new(store: Arc<dyn DistributionStore>, config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let auth = SharedSecret::from_sha256_hex(&config.auth.token_sha256)?;
        if !auth.is_configured() {
            log::warn!("auth.token_sha256 is empty; privileged methods will be refused");
        }

        let allocator = Arc::new(Allocator::new(store.clone(), config.allocation.lock_timeout()));
        let distributor = Distributor::new(allocator, config.quota.clone(), clock.clone())
            .with_parallelism(config.allocation.batch_parallelism);
        let recycler = Recycler::new(store.clone(), clock.clone());
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            store,
            distributor,
            recycler,
            clock,
            auth,
            event_tx,
        })
    }

    /// Context on the system clock in the configured offset
    pub fn with_system_clock(store: Arc<dyn DistributionStore>, config: &Config) -> Result<Self> {
        let clock = Arc::new(SystemClock::with_offset_minutes(config.schedule.utc_offset_minutes));
        Self::new(store, config, clock)
    }

    /// Use the IPC server's channel so events reach its clients
    pub fn with_event_sender(mut self, event_tx: broadcast::Sender<DaemonEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: DaemonEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::digest_hex;
    use crate::store::SqliteStore;

    #[test]
    fn test_context_rejects_bad_digest() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut config = Config::default();
        config.auth.token_sha256 = "not-hex".to_string();
        assert!(DaemonContext::with_system_clock(store, &config).is_err());
    }

    #[test]
    fn test_broadcast_reaches_subscriber() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut config = Config::default();
        config.auth.token_sha256 = digest_hex("secret");
        let ctx = DaemonContext::with_system_clock(store, &config).unwrap();
        assert!(ctx.auth.is_configured());

        let mut rx = ctx.subscribe();
        ctx.broadcast(DaemonEvent::new("recycling.completed", serde_json::json!({})));
        assert_eq!(rx.try_recv().unwrap().event, "recycling.completed");
    }
}
