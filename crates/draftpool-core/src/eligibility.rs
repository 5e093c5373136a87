// Sole-eligible-team check that gates auto-assignment at intake.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::store::TeamDirectory;

/// Decides whether a registration's team is the only one its owner runs for
/// the sport and age group.
#[derive(Clone)]
pub struct EligibilityResolver {
    teams: Arc<dyn TeamDirectory>,
}

impl EligibilityResolver {
    pub fn new(teams: Arc<dyn TeamDirectory>) -> Self {
        Self { teams }
    }

    /// True iff exactly one team matches `(owner_id, sport, age_group)` and
    /// it is `team_id`. The answer reflects the directory at call time only;
    /// a sibling team created a moment later is not seen.
    pub fn is_sole_eligible_team(
        &self,
        owner_id: &str,
        sport: &str,
        age_group: &str,
        team_id: &str,
    ) -> Result<bool> {
        let matches = self
            .teams
            .find_teams(owner_id, Some(sport), Some(age_group))?;
        let sole = matches.len() == 1 && matches[0].id == team_id;
        debug!(
            owner_id,
            sport,
            age_group,
            team_id,
            matching = matches.len(),
            sole,
            "eligibility check"
        );
        Ok(sole)
    }
}
