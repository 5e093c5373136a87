// Storage seams consumed by the allocation engine.
//
// The engine only talks to these traits. `db::Database` implements all of
// them on SQLite; tests swap in wrappers to inject failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    Assignment, EntryStatus, PaymentUpdate, PoolEntry, RosterEntry, TeamSummary,
};

/// Filter for pool queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolFilter {
    pub team_id: Option<String>,
    pub owner_id: Option<String>,
    pub sport: Option<String>,
    pub age_group_id: Option<String>,
    pub status: Option<EntryStatus>,
}

impl PoolFilter {
    pub fn waiting_for_team(team_id: &str) -> Self {
        PoolFilter {
            team_id: Some(team_id.to_string()),
            status: Some(EntryStatus::Waiting),
            ..Default::default()
        }
    }
}

/// Result of a compare-and-set against an entry's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The entry was `waiting` and the write went through.
    Applied,
    /// The entry exists but was no longer `waiting`; nothing was written.
    Current(EntryStatus),
    /// No entry with that id.
    Missing,
}

/// Independent-athlete linkage recorded alongside an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyLink {
    pub party_id: String,
    pub team_id: String,
}

/// Every write an assignment makes. Stores must persist all of it in one
/// atomic unit, conditional on the entry still being `waiting`.
#[derive(Debug, Clone)]
pub struct AssignmentCommit {
    pub entry_id: String,
    pub assignment: Assignment,
    pub roster_entry: RosterEntry,
    pub party_link: Option<PartyLink>,
}

/// Pool entries, partitioned by the team the candidate registered under.
pub trait PoolStore: Send + Sync {
    fn insert_entry(&self, entry: &PoolEntry) -> Result<()>;

    fn get_entry(&self, entry_id: &str) -> Result<Option<PoolEntry>>;

    /// Entries matching `filter`, ordered by creation.
    fn query_entries(&self, filter: &PoolFilter) -> Result<Vec<PoolEntry>>;

    /// Atomically: move the entry `waiting -> drafted`, write the roster
    /// entry into the target team, and record the party link if any. The
    /// status check is re-validated inside the commit.
    fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<CasOutcome>;

    /// Move the entry `waiting -> declined`, conditional on its status.
    fn decline_entry(&self, entry_id: &str, reason: Option<&str>) -> Result<CasOutcome>;

    /// Read-modify-write of the payment fields only. Lifecycle columns are
    /// never touched. Returns the updated entry, or `None` if missing.
    fn update_payment(&self, entry_id: &str, update: &PaymentUpdate) -> Result<Option<PoolEntry>>;
}

/// Read side of team rosters. Roster entries are only ever created through
/// [`PoolStore::commit_assignment`].
pub trait RosterStore: Send + Sync {
    fn roster_for_team(&self, team_id: &str) -> Result<Vec<RosterEntry>>;

    fn roster_entry_for_pool_entry(&self, pool_entry_id: &str) -> Result<Option<RosterEntry>>;

    fn roster_size(&self, team_id: &str) -> Result<usize>;
}

/// Team lookup owned by the team-management subsystem.
///
/// Results are a snapshot; they are not isolated from concurrent team
/// creation or deletion.
pub trait TeamDirectory: Send + Sync {
    fn find_teams(
        &self,
        owner_id: &str,
        sport: Option<&str>,
        age_group: Option<&str>,
    ) -> Result<Vec<TeamSummary>>;

    fn get_team(&self, team_id: &str) -> Result<Option<TeamSummary>>;
}

/// Party profile records owned by the accounts subsystem.
pub trait PartyProfiles: Send + Sync {
    fn set_current_team(&self, party_id: &str, team_id: &str) -> Result<()>;
}

/// A party link committed with an assignment and not yet delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyLinkRecord {
    pub seq: i64,
    pub entry_id: String,
    pub link: PartyLink,
    pub created_at: DateTime<Utc>,
}

/// Durable queue of party links written inside assignment commits.
pub trait AssignmentOutbox: Send + Sync {
    /// Oldest undelivered links first.
    fn pending_party_links(&self, limit: usize) -> Result<Vec<PartyLinkRecord>>;

    fn mark_party_link_delivered(&self, seq: i64) -> Result<()>;
}
