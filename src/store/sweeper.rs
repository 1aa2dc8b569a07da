//! Stale flow context eviction
//!
//! Flows abandoned mid-way would otherwise persist forever; the sweeper
//! periodically evicts contexts untouched for longer than the configured
//! maximum age.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::FlowContextStore;
use crate::config::FlowConfig;

/// Background task evicting abandoned flow contexts
pub struct ContextSweeper {
    store: Arc<dyn FlowContextStore>,
    max_age: Duration,
    interval: Duration,
}

impl ContextSweeper {
    /// A sweeper over the given store, paced by the flow configuration
    pub fn new(store: Arc<dyn FlowContextStore>, config: &FlowConfig) -> Self {
        Self {
            store,
            max_age: Duration::from_secs(config.max_flow_age_secs),
            interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Run one eviction pass
    pub async fn sweep(&self) -> u64 {
        match self.store.delete_older_than(self.max_age).await {
            Ok(0) => 0,
            Ok(evicted) => {
                info!(evicted, "evicted stale flow contexts");
                evicted
            }
            Err(e) => {
                warn!(error = %e, "flow context sweep failed");
                0
            }
        }
    }

    /// Spawn the sweeper onto the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a fresh boot
            // does not sweep before anything could have aged.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
