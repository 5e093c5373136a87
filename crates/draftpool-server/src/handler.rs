// Routes parsed client messages to the allocation engine and read layers.
//
// Everything here is synchronous and may block on SQLite; the WebSocket
// server calls `dispatch` from `spawn_blocking`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use draftpool_core::cross_team::CrossTeamQuery;
use draftpool_core::db::Database;
use draftpool_core::store::TeamDirectory;
use draftpool_core::watch::{PoolSnapshot, PoolWatch};
use draftpool_core::{AllocationEngine, AllocationError};

use crate::protocol::{
    AssignedPayload, ClientMessage, DeclinedPayload, RegisterTeamPayload, ServerMessage,
};

/// Everything a connection needs to serve requests, shared across
/// connections.
pub struct Services {
    pub db: Arc<Database>,
    pub engine: Arc<AllocationEngine>,
    pub watch: Arc<PoolWatch>,
    pub cross_team: CrossTeamQuery,
}

impl Services {
    /// Wire the engine, pool watch and cross-team query over one database.
    /// The pool watch is the engine's event sink so subscribers see every
    /// committed change.
    pub fn new(db: Arc<Database>, system_operator_id: &str) -> Self {
        let watch = Arc::new(PoolWatch::new(db.clone()));
        let engine = Arc::new(AllocationEngine::new(
            db.clone(),
            db.clone(),
            watch.clone(),
            system_operator_id,
        ));
        let cross_team = CrossTeamQuery::new(db.clone(), db.clone());
        Self {
            db,
            engine,
            watch,
            cross_team,
        }
    }
}

/// Result of handling one client frame.
pub enum Outcome {
    Reply(ServerMessage),
    /// The client subscribed to a team pool. The receiver already holds the
    /// current snapshot.
    Subscribed {
        team_id: String,
        receiver: watch::Receiver<PoolSnapshot>,
    },
}

impl From<ServerMessage> for Outcome {
    fn from(msg: ServerMessage) -> Self {
        Outcome::Reply(msg)
    }
}

/// Parse and handle one raw text frame.
pub fn dispatch(services: &Services, text: &str) -> Outcome {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse client message: {e}");
            return ServerMessage::error("BAD_REQUEST", format!("invalid message: {e}")).into();
        }
    };
    debug!(kind = msg.kind(), "client message");

    match handle(services, msg) {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_retryable() {
                warn!("request failed, client may retry: {e}");
            } else {
                debug!("request rejected: {e}");
            }
            ServerMessage::from(&e).into()
        }
    }
}

fn handle(services: &Services, msg: ClientMessage) -> Result<Outcome, AllocationError> {
    let engine = &services.engine;
    let reply = match msg {
        ClientMessage::AddCandidate(intake) => {
            ServerMessage::IntakeResult(engine.add_candidate(intake)?)
        }
        ClientMessage::AssignToRoster(request) => {
            let roster_entry_id = engine.assign_to_roster(&request)?;
            ServerMessage::Assigned(AssignedPayload {
                entry_id: request.entry_id,
                roster_entry_id,
            })
        }
        ClientMessage::DeclineCandidate(p) => {
            let result = engine.decline_candidate(&p.entry_id, p.reason.as_deref())?;
            ServerMessage::Declined(DeclinedPayload {
                entry_id: p.entry_id,
                result,
            })
        }
        ClientMessage::UpdatePayment(p) => {
            ServerMessage::PaymentUpdated(Box::new(engine.update_payment(&p.entry_id, &p.update)?))
        }
        ClientMessage::SubscribePool(p) => {
            let receiver = services.watch.subscribe(&p.team_id)?;
            return Ok(Outcome::Subscribed {
                team_id: p.team_id,
                receiver,
            });
        }
        ClientMessage::CrossTeamPool(p) => {
            let pool = services.cross_team.waiting_for_owner(
                &p.owner_id,
                p.sport.as_deref(),
                p.age_group.as_deref(),
            )?;
            if !pool.is_complete() {
                debug!(owner_id = %p.owner_id, skipped = ?pool.skipped_teams, "partial cross-team pool");
            }
            ServerMessage::CrossTeamPoolResult(pool)
        }
        ClientMessage::RegisterTeam(p) => ServerMessage::TeamRegistered(register_team(services, p)?),
    };
    Ok(Outcome::Reply(reply))
}

fn register_team(
    services: &Services,
    payload: RegisterTeamPayload,
) -> Result<draftpool_core::model::TeamSummary, AllocationError> {
    if payload.id.trim().is_empty() {
        return Err(AllocationError::validation("id", "must not be empty"));
    }
    let team = payload.into_team();
    services.db.upsert_team(&team).map_err(AllocationError::store)?;
    services
        .db
        .get_team(&team.id)?
        .ok_or_else(|| AllocationError::team_not_found(&team.id))
}
