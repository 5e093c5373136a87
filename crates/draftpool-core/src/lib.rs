// Registration pool allocation: intake, drafting and pool reads for team
// rosters. Re-exports every module so the server crate and integration tests
// can reach the public API.

pub mod cross_team;
pub mod db;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod profile_sync;
pub mod store;
pub mod watch;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{AllocationEngine, AssignRequest, DeclineResult, Intake};
pub use error::{AllocationError, Result};
