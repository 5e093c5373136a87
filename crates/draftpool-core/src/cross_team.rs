// Read-only aggregation of waiting entries across one owner's teams.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::model::PoolEntry;
use crate::store::{PoolFilter, PoolStore, TeamDirectory};

/// Merged waiting pool for a multi-team draft room.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTeamPool {
    /// Waiting entries from every team that answered, oldest first.
    pub entries: Vec<PoolEntry>,
    /// Teams whose pool could not be read and were left out.
    pub skipped_teams: Vec<String>,
}

impl CrossTeamPool {
    pub fn is_complete(&self) -> bool {
        self.skipped_teams.is_empty()
    }
}

pub struct CrossTeamQuery {
    teams: Arc<dyn TeamDirectory>,
    pool: Arc<dyn PoolStore>,
}

impl CrossTeamQuery {
    pub fn new(teams: Arc<dyn TeamDirectory>, pool: Arc<dyn PoolStore>) -> Self {
        Self { teams, pool }
    }

    /// Best-effort: a team whose query fails is skipped rather than failing
    /// the whole read. Only a failed team lookup is an error.
    pub fn waiting_for_owner(
        &self,
        owner_id: &str,
        sport: Option<&str>,
        age_group: Option<&str>,
    ) -> Result<CrossTeamPool> {
        let teams = self.teams.find_teams(owner_id, sport, age_group)?;

        let mut result = CrossTeamPool::default();
        for team in teams {
            match self.pool.query_entries(&PoolFilter::waiting_for_team(&team.id)) {
                Ok(entries) => result.entries.extend(entries),
                Err(e) => {
                    warn!("skipping team {} in cross-team pool: {e}", team.id);
                    result.skipped_teams.push(team.id);
                }
            }
        }

        result
            .entries
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(result)
    }
}
