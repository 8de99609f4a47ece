//! Loading and persisting file aggregates.
//!
//! After every save the aggregate's buffered domain events are drained and
//! handed to the event sink, so events are published only for persisted state.

use std::sync::Arc;

use stashguard_core::{AppError, AppResult, EventSink, FileAggregate, FileRepository};
use uuid::Uuid;

pub struct AggregateStore {
    repository: Arc<dyn FileRepository>,
    events: Arc<dyn EventSink>,
    max_access_log: usize,
}

impl AggregateStore {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        events: Arc<dyn EventSink>,
        max_access_log: usize,
    ) -> Self {
        Self {
            repository,
            events,
            max_access_log,
        }
    }

    pub fn repository(&self) -> &Arc<dyn FileRepository> {
        &self.repository
    }

    pub fn max_access_log(&self) -> usize {
        self.max_access_log
    }

    pub async fn load(&self, file_id: Uuid) -> AppResult<FileAggregate> {
        let record = self
            .repository
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;
        Ok(FileAggregate::from_record(record, self.max_access_log))
    }

    pub async fn insert(&self, aggregate: &mut FileAggregate) -> AppResult<()> {
        self.repository.create(aggregate.to_record()).await?;
        self.publish(aggregate).await;
        Ok(())
    }

    pub async fn save(&self, aggregate: &mut FileAggregate) -> AppResult<()> {
        self.repository.update(aggregate.to_record()).await?;
        self.publish(aggregate).await;
        Ok(())
    }

    /// Drain and publish events without persisting (access records only).
    pub async fn publish(&self, aggregate: &mut FileAggregate) {
        let events = aggregate.drain_events();
        if events.is_empty() {
            return;
        }
        tracing::debug!(
            file_id = %aggregate.id(),
            count = events.len(),
            "Publishing domain events"
        );
        self.events.publish(events).await;
    }
}
