// JSON message types exchanged with draft-room clients over the WebSocket.
//
// Every frame is `{"type": "...", "payload": {...}}`. Payload fields are
// camelCase.

use serde::{Deserialize, Serialize};

use draftpool_core::cross_team::CrossTeamPool;
use draftpool_core::model::{NewCandidate, PaymentUpdate, PoolEntry, TeamSummary};
use draftpool_core::{AllocationError, AssignRequest, DeclineResult, Intake};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    AddCandidate(NewCandidate),
    AssignToRoster(AssignRequest),
    DeclineCandidate(DeclinePayload),
    UpdatePayment(UpdatePaymentPayload),
    SubscribePool(SubscribePayload),
    CrossTeamPool(CrossTeamPayload),
    RegisterTeam(RegisterTeamPayload),
}

impl ClientMessage {
    /// Message type name as it appears on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::AddCandidate(_) => "ADD_CANDIDATE",
            ClientMessage::AssignToRoster(_) => "ASSIGN_TO_ROSTER",
            ClientMessage::DeclineCandidate(_) => "DECLINE_CANDIDATE",
            ClientMessage::UpdatePayment(_) => "UPDATE_PAYMENT",
            ClientMessage::SubscribePool(_) => "SUBSCRIBE_POOL",
            ClientMessage::CrossTeamPool(_) => "CROSS_TEAM_POOL",
            ClientMessage::RegisterTeam(_) => "REGISTER_TEAM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclinePayload {
    pub entry_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentPayload {
    pub entry_id: String,
    #[serde(flatten)]
    pub update: PaymentUpdate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTeamPayload {
    pub owner_id: String,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTeamPayload {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub sport: String,
    pub age_group: String,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl RegisterTeamPayload {
    pub fn into_team(self) -> TeamSummary {
        TeamSummary {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            sport: self.sport,
            age_group: self.age_group,
            capacity: self.capacity,
            current_size: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    IntakeResult(Intake),
    Assigned(AssignedPayload),
    Declined(DeclinedPayload),
    PaymentUpdated(Box<PoolEntry>),
    PoolSnapshot(PoolSnapshotPayload),
    CrossTeamPoolResult(CrossTeamPool),
    TeamRegistered(TeamSummary),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedPayload {
    pub entry_id: String,
    pub roster_entry_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclinedPayload {
    pub entry_id: String,
    pub result: DeclineResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshotPayload {
    pub team_id: String,
    pub entries: Vec<PoolEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl ServerMessage {
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            kind: kind.to_string(),
            message: message.into(),
            retryable: false,
        })
    }

    pub fn to_json(&self) -> String {
        // Every payload is plain data with string keys; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|e| internal_error_frame(&e.to_string()))
    }
}

/// Hand-built `ERROR` frame for when a reply itself fails to serialize.
fn internal_error_frame(message: &str) -> String {
    serde_json::json!({
        "type": "ERROR",
        "payload": {"kind": "INTERNAL", "message": message, "retryable": false},
    })
    .to_string()
}

impl From<&AllocationError> for ServerMessage {
    fn from(err: &AllocationError) -> Self {
        ServerMessage::Error(ErrorPayload {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        })
    }
}
