use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Transport-agnostic domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentDomainEvent {
    Created { id: Uuid, at: DateTime<Utc> },
    Updated { id: Uuid, at: DateTime<Utc> },
    SoftDeleted { id: Uuid, at: DateTime<Utc> },
    Restored { id: Uuid, at: DateTime<Utc> },
    Purged { id: Uuid, at: DateTime<Utc> },
    Imported {
        inserted: u64,
        restored: u64,
        at: DateTime<Utc>,
    },
}

/// Publisher that only logs events; used when no transport is wired.
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

impl crate::domain::ports::EventPublisher<StudentDomainEvent> for TracingEventPublisher {
    fn publish(&self, event: &StudentDomainEvent) {
        tracing::debug!(?event, "student domain event");
    }
}
