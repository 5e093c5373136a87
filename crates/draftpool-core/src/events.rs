// Allocation events emitted after successful mutations.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::model::PaymentStatus;
use crate::store::PartyLink;

/// Something changed in the pool. Emitted after the store commit, never
/// before, so consumers can re-read and see the new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationEvent {
    #[serde(rename_all = "camelCase")]
    CandidateAdded {
        entry_id: String,
        team_id: String,
        eligible_for_auto_assign: bool,
    },
    #[serde(rename_all = "camelCase")]
    CandidateAssigned {
        entry_id: String,
        source_team_id: String,
        target_team_id: String,
        roster_entry_id: String,
        operator_id: String,
        party_link: Option<PartyLink>,
    },
    #[serde(rename_all = "camelCase")]
    CandidateDeclined { entry_id: String, team_id: String },
    #[serde(rename_all = "camelCase")]
    PaymentUpdated {
        entry_id: String,
        team_id: String,
        status: PaymentStatus,
    },
}

impl AllocationEvent {
    /// The team whose pool partition changed.
    pub fn pool_team_id(&self) -> &str {
        match self {
            AllocationEvent::CandidateAdded { team_id, .. }
            | AllocationEvent::CandidateDeclined { team_id, .. }
            | AllocationEvent::PaymentUpdated { team_id, .. } => team_id,
            AllocationEvent::CandidateAssigned { source_team_id, .. } => source_team_id,
        }
    }
}

/// Receiver of allocation events.
///
/// `emit` runs on the caller's thread right after a commit: it must be quick
/// and must not fail the operation that produced the event.
pub trait AllocationEventSink: Send + Sync {
    fn emit(&self, event: AllocationEvent);
}

/// Discards every event.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl AllocationEventSink for NoOpEventSink {
    fn emit(&self, _event: AllocationEvent) {}
}

/// Collects events in memory. Used by tests.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<AllocationEvent>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AllocationEvent> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event sink mutex poisoned").clear();
    }
}

impl AllocationEventSink for MockEventSink {
    fn emit(&self, event: AllocationEvent) {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .push(event);
    }
}
