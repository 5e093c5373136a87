// Delivers committed party links to the profile subsystem.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::store::{AssignmentOutbox, PartyProfiles};

/// Drains the assignment outbox into `PartyProfiles::set_current_team`.
///
/// Links are delivered oldest first. Delivery stops at the first failure so
/// a later link for the same party never overtakes an earlier one; the
/// remainder is picked up on the next run.
pub struct ProfileSync {
    outbox: Arc<dyn AssignmentOutbox>,
    profiles: Arc<dyn PartyProfiles>,
    batch_size: usize,
}

impl ProfileSync {
    pub fn new(
        outbox: Arc<dyn AssignmentOutbox>,
        profiles: Arc<dyn PartyProfiles>,
        batch_size: usize,
    ) -> Self {
        Self {
            outbox,
            profiles,
            batch_size: batch_size.max(1),
        }
    }

    /// Deliver up to one batch. Returns how many links were delivered.
    pub fn sync_pending(&self) -> Result<usize> {
        let pending = self.outbox.pending_party_links(self.batch_size)?;
        let mut delivered = 0;
        for record in pending {
            if let Err(e) = self
                .profiles
                .set_current_team(&record.link.party_id, &record.link.team_id)
            {
                warn!(
                    "party link {} for {} not delivered, will retry: {e}",
                    record.seq, record.link.party_id
                );
                break;
            }
            self.outbox.mark_party_link_delivered(record.seq)?;
            delivered += 1;
        }
        if delivered > 0 {
            info!(delivered, "party links synced");
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::db::Database;
    use crate::engine::AllocationEngine;
    use crate::error::AllocationError;
    use crate::events::NoOpEventSink;
    use crate::model::PaymentStatus;
    use crate::testutil::{intake, team};

    fn independent(name: &str) -> crate::model::NewCandidate {
        let mut c = intake(name, "t1", PaymentStatus::PaidFull);
        c.contact.independent_athlete = true;
        c.contact.party_id = Some(format!("party-{name}"));
        c
    }

    fn setup() -> (Arc<Database>, AllocationEngine) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        db.upsert_team(&team("t1", "football", "9U")).unwrap();
        let engine = AllocationEngine::new(db.clone(), db.clone(), Arc::new(NoOpEventSink), "system");
        (db, engine)
    }

    #[test]
    fn delivers_links_once() {
        let (db, engine) = setup();
        engine.add_candidate(independent("ava")).unwrap();
        engine.add_candidate(independent("ben")).unwrap();

        let sync = ProfileSync::new(db.clone(), db.clone(), 10);
        assert_eq!(sync.sync_pending().unwrap(), 2);
        assert_eq!(sync.sync_pending().unwrap(), 0);
        assert_eq!(
            db.current_team_for_party("party-ava").unwrap().as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn batch_size_limits_one_run() {
        let (db, engine) = setup();
        for name in ["a", "b", "c"] {
            engine.add_candidate(independent(name)).unwrap();
        }
        let sync = ProfileSync::new(db.clone(), db.clone(), 2);
        assert_eq!(sync.sync_pending().unwrap(), 2);
        assert_eq!(sync.sync_pending().unwrap(), 1);
    }

    /// Profiles that fail the first `failures` calls.
    struct FailingProfiles {
        failures: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl PartyProfiles for FailingProfiles {
        fn set_current_team(&self, party_id: &str, _team_id: &str) -> Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AllocationError::StoreUnavailable {
                    message: "profiles offline".into(),
                });
            }
            self.seen.lock().unwrap().push(party_id.to_string());
            Ok(())
        }
    }

    #[test]
    fn failure_stops_batch_and_retries_in_order() {
        let (db, engine) = setup();
        engine.add_candidate(independent("ava")).unwrap();
        engine.add_candidate(independent("ben")).unwrap();

        let profiles = Arc::new(FailingProfiles {
            failures: AtomicUsize::new(1),
            seen: Mutex::new(Vec::new()),
        });
        let sync = ProfileSync::new(db.clone(), profiles.clone(), 10);

        assert_eq!(sync.sync_pending().unwrap(), 0);
        assert_eq!(sync.sync_pending().unwrap(), 2);
        assert_eq!(
            *profiles.seen.lock().unwrap(),
            vec!["party-ava".to_string(), "party-ben".to_string()]
        );
    }
}
