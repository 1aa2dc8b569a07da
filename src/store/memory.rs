//! In-memory flow context store
//!
//! Backs tests and single-node deployments. Entries carry the instant of
//! their last write so the sweeper can evict abandoned flows.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{FlowContextRecord, FlowContextStore, StoreError};

/// DashMap-backed context store
#[derive(Default)]
pub struct InMemoryContextStore {
    contexts: DashMap<String, (FlowContextRecord, Instant)>,
}

impl InMemoryContextStore {
    /// An empty store
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
        }
    }

    /// Number of persisted contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the store holds no contexts
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[async_trait]
impl FlowContextStore for InMemoryContextStore {
    async fn store(&self, record: &FlowContextRecord) -> Result<(), StoreError> {
        self.contexts
            .insert(record.flow_id.clone(), (record.clone(), Instant::now()));
        Ok(())
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowContextRecord>, StoreError> {
        Ok(self
            .contexts
            .get(flow_id)
            .map(|entry| entry.value().0.clone()))
    }

    async fn update(&self, record: &FlowContextRecord) -> Result<(), StoreError> {
        if !self.contexts.contains_key(&record.flow_id) {
            return Err(StoreError::NotFound(record.flow_id.clone()));
        }
        self.contexts
            .insert(record.flow_id.clone(), (record.clone(), Instant::now()));
        Ok(())
    }

    async fn delete(&self, flow_id: &str) -> Result<(), StoreError> {
        self.contexts.remove(flow_id);
        Ok(())
    }

    async fn delete_older_than(&self, max_age: Duration) -> Result<u64, StoreError> {
        let before = self.contexts.len();
        self.contexts
            .retain(|_, (_, touched)| touched.elapsed() < max_age);
        Ok((before - self.contexts.len()) as u64)
    }
}
