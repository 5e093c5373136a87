// Allocation engine: intake, assignment, decline and payment corrections.
//
// Every operation runs synchronously to completion on the caller's thread.
// The engine holds no locks between calls; concurrent callers are serialized
// by the store's conditional commits.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::eligibility::EligibilityResolver;
use crate::error::{AllocationError, Result};
use crate::events::{AllocationEvent, AllocationEventSink};
use crate::model::{
    Assignment, EntryStatus, LifecycleAction, NewCandidate, PaymentUpdate, PoolEntry, RosterEntry,
    TransitionOutcome,
};
use crate::store::{AssignmentCommit, CasOutcome, PartyLink, PoolStore, TeamDirectory};

/// Manual (or system) request to draft a pool entry onto a roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub entry_id: String,
    /// Team the entry registered under; the pool partition it lives in.
    pub source_team_id: String,
    pub operator_id: String,
    /// Cross-team draft target. Defaults to the source team.
    #[serde(default)]
    pub target_team_id: Option<String>,
    #[serde(default)]
    pub round: Option<u32>,
    #[serde(default)]
    pub pick: Option<u32>,
}

/// Result of `add_candidate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intake {
    pub entry_id: String,
    pub eligible_for_auto_assign: bool,
    /// Set when the intake auto-assigned the candidate.
    pub roster_entry_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineResult {
    Declined,
    /// The entry was already declined; nothing changed.
    AlreadyDeclined,
}

pub struct AllocationEngine {
    pool: Arc<dyn PoolStore>,
    teams: Arc<dyn TeamDirectory>,
    eligibility: EligibilityResolver,
    events: Arc<dyn AllocationEventSink>,
    system_operator_id: String,
}

impl AllocationEngine {
    pub fn new(
        pool: Arc<dyn PoolStore>,
        teams: Arc<dyn TeamDirectory>,
        events: Arc<dyn AllocationEventSink>,
        system_operator_id: impl Into<String>,
    ) -> Self {
        Self {
            eligibility: EligibilityResolver::new(Arc::clone(&teams)),
            pool,
            teams,
            events,
            system_operator_id: system_operator_id.into(),
        }
    }

    pub fn get_entry(&self, entry_id: &str) -> Result<PoolEntry> {
        self.pool
            .get_entry(entry_id)?
            .ok_or_else(|| AllocationError::entry_not_found(entry_id))
    }

    // ------------------------------------------------------------------
    // AddCandidate
    // ------------------------------------------------------------------

    /// Record a new registration and, when its team is the sole eligible one
    /// and it is paid in full, draft it immediately.
    ///
    /// The eligibility check and the insert are not one transaction. Two
    /// registrations racing a sibling-team creation can both see a sole team;
    /// the assignment guard keeps that to "both land on that team".
    pub fn add_candidate(&self, intake: NewCandidate) -> Result<Intake> {
        intake.validate()?;

        let t = &intake.targeting;
        let eligible = match self.eligibility.is_sole_eligible_team(
            &t.owner_id,
            &t.sport,
            &t.age_group_id,
            &t.team_id,
        ) {
            Ok(eligible) => eligible,
            Err(e) => {
                // Queue for manual drafting rather than lose the registration.
                warn!("eligibility check failed for team {}: {e}", t.team_id);
                false
            }
        };

        let entry = PoolEntry::from_intake(Uuid::now_v7().to_string(), intake, eligible, Utc::now());
        self.pool.insert_entry(&entry)?;
        info!(
            entry_id = %entry.id,
            team_id = %entry.targeting.team_id,
            eligible,
            payment_status = %entry.payment.status,
            "candidate added to pool"
        );
        self.events.emit(AllocationEvent::CandidateAdded {
            entry_id: entry.id.clone(),
            team_id: entry.targeting.team_id.clone(),
            eligible_for_auto_assign: eligible,
        });

        let mut roster_entry_id = None;
        if entry.qualifies_for_auto_assign() {
            let request = AssignRequest {
                entry_id: entry.id.clone(),
                source_team_id: entry.targeting.team_id.clone(),
                operator_id: self.system_operator_id.clone(),
                target_team_id: None,
                round: None,
                pick: None,
            };
            match self.assign_to_roster(&request) {
                Ok(id) => roster_entry_id = Some(id),
                Err(e) => warn!(
                    "auto-assignment of {} failed, left waiting: {e}",
                    entry.id
                ),
            }
        }

        Ok(Intake {
            entry_id: entry.id,
            eligible_for_auto_assign: eligible,
            roster_entry_id,
        })
    }

    // ------------------------------------------------------------------
    // AssignToRoster
    // ------------------------------------------------------------------

    /// Draft a waiting entry onto a roster. Returns the new roster entry id.
    ///
    /// Safe to retry after `StoreUnavailable`: a retry either commits or
    /// reports `AlreadyResolved` if the earlier attempt actually landed.
    pub fn assign_to_roster(&self, request: &AssignRequest) -> Result<String> {
        if request.operator_id.trim().is_empty() {
            return Err(AllocationError::validation("operatorId", "must not be empty"));
        }

        let entry = self.get_entry(&request.entry_id)?;
        if entry.targeting.team_id != request.source_team_id {
            return Err(AllocationError::entry_not_found(&request.entry_id));
        }
        let status = entry.status();
        match status.apply(LifecycleAction::Assign) {
            TransitionOutcome::Move(_) => {}
            TransitionOutcome::Stay | TransitionOutcome::Conflict => {
                return Err(AllocationError::AlreadyResolved {
                    entry_id: entry.id,
                    status,
                });
            }
        }

        let target_id = request
            .target_team_id
            .as_deref()
            .unwrap_or(&request.source_team_id);
        let team = self
            .teams
            .get_team(target_id)?
            .ok_or_else(|| AllocationError::team_not_found(target_id))?;

        let now = Utc::now();
        let roster_entry_id = Uuid::now_v7().to_string();
        let commit = AssignmentCommit {
            entry_id: entry.id.clone(),
            assignment: Assignment {
                team_id: team.id.clone(),
                team_name: team.name.clone(),
                operator_id: request.operator_id.clone(),
                assigned_at: now,
                round: request.round,
                pick: request.pick,
                roster_entry_id: roster_entry_id.clone(),
            },
            roster_entry: RosterEntry::snapshot(
                roster_entry_id.clone(),
                &entry,
                &team.id,
                request.round,
                request.pick,
                now,
            ),
            party_link: entry.linked_party().map(|party_id| PartyLink {
                party_id: party_id.to_string(),
                team_id: team.id.clone(),
            }),
        };

        match self.pool.commit_assignment(&commit)? {
            CasOutcome::Applied => {}
            CasOutcome::Current(status) => {
                debug!(entry_id = %entry.id, %status, "assignment lost the status race");
                return Err(AllocationError::AlreadyResolved {
                    entry_id: entry.id,
                    status,
                });
            }
            CasOutcome::Missing => return Err(AllocationError::entry_not_found(&entry.id)),
        }

        info!(
            entry_id = %entry.id,
            roster_entry_id = %roster_entry_id,
            target_team_id = %team.id,
            operator_id = %request.operator_id,
            "candidate drafted"
        );
        self.events.emit(AllocationEvent::CandidateAssigned {
            entry_id: entry.id,
            source_team_id: entry.targeting.team_id,
            target_team_id: team.id,
            roster_entry_id: roster_entry_id.clone(),
            operator_id: request.operator_id.clone(),
            party_link: commit.party_link,
        });
        Ok(roster_entry_id)
    }

    // ------------------------------------------------------------------
    // DeclineCandidate
    // ------------------------------------------------------------------

    /// Decline a waiting entry. Declining twice is a successful no-op;
    /// declining a drafted entry is `AlreadyResolved`.
    pub fn decline_candidate(&self, entry_id: &str, reason: Option<&str>) -> Result<DeclineResult> {
        let entry = self.get_entry(entry_id)?;

        let current = match self.pool.decline_entry(entry_id, reason)? {
            CasOutcome::Applied => {
                info!(entry_id, reason = reason.unwrap_or(""), "candidate declined");
                self.events.emit(AllocationEvent::CandidateDeclined {
                    entry_id: entry.id,
                    team_id: entry.targeting.team_id,
                });
                return Ok(DeclineResult::Declined);
            }
            CasOutcome::Current(status) => status,
            CasOutcome::Missing => return Err(AllocationError::entry_not_found(entry_id)),
        };

        match current.apply(LifecycleAction::Decline) {
            TransitionOutcome::Stay => {
                debug!(entry_id, "decline of already-declined entry ignored");
                Ok(DeclineResult::AlreadyDeclined)
            }
            TransitionOutcome::Conflict => Err(AllocationError::AlreadyResolved {
                entry_id: entry_id.to_string(),
                status: current,
            }),
            // The conditional update only misses when the entry is no
            // longer waiting, so this is a store inconsistency.
            TransitionOutcome::Move(_) => Err(AllocationError::StoreUnavailable {
                message: format!("decline of {entry_id} missed a waiting entry"),
            }),
        }
    }

    // ------------------------------------------------------------------
    // UpdatePayment
    // ------------------------------------------------------------------

    /// Correct payment fields. Accepted in every lifecycle state and never
    /// triggers assignment, even when the entry becomes paid in full.
    pub fn update_payment(&self, entry_id: &str, update: &PaymentUpdate) -> Result<PoolEntry> {
        update.validate()?;

        let entry = self
            .pool
            .update_payment(entry_id, update)?
            .ok_or_else(|| AllocationError::entry_not_found(entry_id))?;

        if entry.status() != EntryStatus::Waiting {
            debug!(entry_id, status = %entry.status(), "payment corrected on resolved entry");
        }
        info!(
            entry_id,
            amount_paid = entry.payment.amount_paid,
            remaining = entry.payment.remaining_balance,
            payment_status = %entry.payment.status,
            "payment updated"
        );
        self.events.emit(AllocationEvent::PaymentUpdated {
            entry_id: entry.id.clone(),
            team_id: entry.targeting.team_id.clone(),
            status: entry.payment.status,
        });
        Ok(entry)
    }
}
