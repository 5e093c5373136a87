// Pool entry representation and its lifecycle state machine.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::payment::{Payment, PaymentStatus};
use crate::error::{AllocationError, Result};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle tag of a pool entry. `Drafted` and `Declined` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Waiting,
    Drafted,
    Declined,
}

/// Operations that can be attempted against an entry's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Assign,
    Decline,
    UpdatePayment,
}

/// Result of applying a [`LifecycleAction`] to an [`EntryStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The entry moves to the given status.
    Move(EntryStatus),
    /// The action is accepted but the status does not change.
    Stay,
    /// The entry was already resolved; the action must be rejected.
    Conflict,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Drafted => "drafted",
            EntryStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(EntryStatus::Waiting),
            "drafted" => Some(EntryStatus::Drafted),
            "declined" => Some(EntryStatus::Declined),
            _ => None,
        }
    }

    /// The full transition table. Payment corrections are accepted in every
    /// state and never move the lifecycle; declining twice is a no-op.
    pub fn apply(self, action: LifecycleAction) -> TransitionOutcome {
        match (self, action) {
            (EntryStatus::Waiting, LifecycleAction::Assign) => {
                TransitionOutcome::Move(EntryStatus::Drafted)
            }
            (EntryStatus::Waiting, LifecycleAction::Decline) => {
                TransitionOutcome::Move(EntryStatus::Declined)
            }
            (EntryStatus::Declined, LifecycleAction::Decline) => TransitionOutcome::Stay,
            (EntryStatus::Drafted, LifecycleAction::Decline) => TransitionOutcome::Conflict,
            (EntryStatus::Drafted | EntryStatus::Declined, LifecycleAction::Assign) => {
                TransitionOutcome::Conflict
            }
            (_, LifecycleAction::UpdatePayment) => TransitionOutcome::Stay,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a successful draft. Only exists inside [`EntryState::Drafted`],
/// so a drafted entry always carries every assignment field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub team_id: String,
    pub team_name: String,
    pub operator_id: String,
    pub assigned_at: DateTime<Utc>,
    pub round: Option<u32>,
    pub pick: Option<u32>,
    pub roster_entry_id: String,
}

/// Lifecycle state with the data each state owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryState {
    Waiting,
    Drafted(Assignment),
    Declined { reason: Option<String> },
}

impl EntryState {
    pub fn status(&self) -> EntryStatus {
        match self {
            EntryState::Waiting => EntryStatus::Waiting,
            EntryState::Drafted(_) => EntryStatus::Drafted,
            EntryState::Declined { .. } => EntryStatus::Declined,
        }
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            EntryState::Drafted(a) => Some(a),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Existing athlete profile, when the registrant already has one.
    #[serde(default)]
    pub profile_id: Option<String>,
    pub full_name: String,
    #[serde(default)]
    pub handle: Option<String>,
    pub date_of_birth: NaiveDate,
    pub gender: String,
}

/// Where the candidate registered: owner, sport, age group and the team the
/// registration came in under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    pub owner_id: String,
    pub sport: String,
    pub age_group_id: String,
    pub age_group_name: String,
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Registering party (guardian, or the athlete themselves).
    #[serde(default)]
    pub party_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// No linked guardian; the athlete registered on their own behalf.
    #[serde(default)]
    pub independent_athlete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfo {
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub physician_name: Option<String>,
    #[serde(default)]
    pub physician_phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniformInfo {
    #[serde(default)]
    pub jersey_size: Option<String>,
    #[serde(default)]
    pub shorts_size: Option<String>,
    #[serde(default)]
    pub preferred_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDetails {
    #[serde(default)]
    pub preferred_positions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub medical: Option<MedicalInfo>,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default)]
    pub uniform: Option<UniformInfo>,
    #[serde(default)]
    pub waiver_signed: bool,
}

/// Payment portion of an intake request. The remaining balance is never
/// accepted from callers; it is computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntake {
    pub total_amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Everything `AddCandidate` needs to create a pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCandidate {
    pub candidate: Candidate,
    pub targeting: Targeting,
    pub contact: Contact,
    pub payment: PaymentIntake,
    #[serde(default)]
    pub details: CandidateDetails,
}

impl NewCandidate {
    /// Reject malformed intake before anything touches the store.
    pub fn validate(&self) -> Result<()> {
        let required: &[(&str, &str)] = &[
            ("candidate.fullName", &self.candidate.full_name),
            ("targeting.ownerId", &self.targeting.owner_id),
            ("targeting.sport", &self.targeting.sport),
            ("targeting.ageGroupId", &self.targeting.age_group_id),
            ("targeting.teamId", &self.targeting.team_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AllocationError::validation(field, "must not be empty"));
            }
        }
        if self.payment.total_amount < 0 {
            return Err(AllocationError::validation(
                "payment.totalAmount",
                format!("must be >= 0, got {}", self.payment.total_amount),
            ));
        }
        if self.payment.amount_paid < 0 {
            return Err(AllocationError::validation(
                "payment.amountPaid",
                format!("must be >= 0, got {}", self.payment.amount_paid),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PoolEntry
// ---------------------------------------------------------------------------

/// A candidate registration waiting for, or resolved to, a team assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub id: String,
    pub candidate: Candidate,
    pub targeting: Targeting,
    pub contact: Contact,
    pub payment: Payment,
    pub state: EntryState,
    /// Computed once at intake and never re-derived.
    pub eligible_for_auto_assign: bool,
    pub details: CandidateDetails,
    pub created_at: DateTime<Utc>,
}

impl PoolEntry {
    /// Build a fresh `waiting` entry from a validated intake payload.
    pub fn from_intake(
        id: String,
        intake: NewCandidate,
        eligible_for_auto_assign: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        let payment = Payment::new(
            intake.payment.total_amount,
            intake.payment.amount_paid,
            intake.payment.status,
            intake.payment.method,
            intake.payment.notes,
        );
        PoolEntry {
            id,
            candidate: intake.candidate,
            targeting: intake.targeting,
            contact: intake.contact,
            payment,
            state: EntryState::Waiting,
            eligible_for_auto_assign,
            details: intake.details,
            created_at,
        }
    }

    pub fn status(&self) -> EntryStatus {
        self.state.status()
    }

    /// Auto-assignment gate: sole eligible team at intake and paid in full.
    pub fn qualifies_for_auto_assign(&self) -> bool {
        self.eligible_for_auto_assign && self.payment.status == PaymentStatus::PaidFull
    }

    /// Party whose "current team" follows this candidate once drafted:
    /// only independent athletes with a linked registering party.
    pub fn linked_party(&self) -> Option<&str> {
        if self.contact.independent_athlete {
            self.contact.party_id.as_deref().filter(|p| !p.is_empty())
        } else {
            None
        }
    }
}
