// Live per-team view of waiting pool entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{AllocationEvent, AllocationEventSink};
use crate::model::PoolEntry;
use crate::store::{PoolFilter, PoolStore};

/// Snapshot of a team's `waiting` entries, oldest first.
pub type PoolSnapshot = Arc<Vec<PoolEntry>>;

/// Push-on-change subscriptions to each team's waiting pool.
///
/// Each subscriber receives the full current snapshot, never a diff. Wire it
/// into the engine as an [`AllocationEventSink`]; after every event touching a
/// team with live receivers the snapshot is re-read and published.
pub struct PoolWatch {
    pool: Arc<dyn PoolStore>,
    channels: Mutex<HashMap<String, Arc<TeamChannel>>>,
}

struct TeamChannel {
    sender: watch::Sender<PoolSnapshot>,
    /// Held across the store read and the publish so a slow reader can never
    /// overwrite a snapshot taken after it.
    publish: Mutex<()>,
}

impl TeamChannel {
    fn new() -> Self {
        Self {
            sender: watch::channel(Arc::new(Vec::new())).0,
            publish: Mutex::new(()),
        }
    }
}

impl PoolWatch {
    pub fn new(pool: Arc<dyn PoolStore>) -> Self {
        Self {
            pool,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Arc<TeamChannel>>> {
        self.channels.lock().expect("pool watch mutex poisoned")
    }

    fn load(&self, team_id: &str) -> Result<PoolSnapshot> {
        Ok(Arc::new(
            self.pool.query_entries(&PoolFilter::waiting_for_team(team_id))?,
        ))
    }

    /// Read the team's pool and publish it, one publisher per team at a time.
    fn publish(&self, team_id: &str, channel: &TeamChannel) -> Result<()> {
        let _turn = channel.publish.lock().expect("pool watch mutex poisoned");
        let snapshot = self.load(team_id)?;
        channel.sender.send_replace(snapshot);
        Ok(())
    }

    /// Subscribe to a team's waiting pool. The receiver's current value is
    /// a fresh snapshot; call `changed()` to wait for the next one.
    /// Re-subscribing is always safe and replays the full snapshot.
    pub fn subscribe(&self, team_id: &str) -> Result<watch::Receiver<PoolSnapshot>> {
        // Attach the receiver under the map lock so a concurrent refresh
        // cannot drop the channel as unwatched in between.
        let (channel, mut receiver) = {
            let mut channels = self.channels();
            let channel = Arc::clone(
                channels
                    .entry(team_id.to_string())
                    .or_insert_with(|| Arc::new(TeamChannel::new())),
            );
            let receiver = channel.sender.subscribe();
            (channel, receiver)
        };
        self.publish(team_id, &channel)?;
        receiver.borrow_and_update();
        debug!(team_id, receivers = channel.sender.receiver_count(), "pool subscription");
        Ok(receiver)
    }

    /// Re-read and publish a team's snapshot if anyone is listening.
    pub fn refresh(&self, team_id: &str) {
        let channel = {
            let mut channels = self.channels();
            match channels.get(team_id) {
                Some(channel) if channel.sender.receiver_count() > 0 => Arc::clone(channel),
                Some(_) => {
                    channels.remove(team_id);
                    return;
                }
                None => return,
            }
        };

        // The store read runs without holding the channel map lock.
        if let Err(e) = self.publish(team_id, &channel) {
            warn!("failed to refresh pool snapshot for team {team_id}: {e}");
        }
    }

    /// Number of teams with an open channel.
    pub fn watched_teams(&self) -> usize {
        self.channels().len()
    }
}

impl AllocationEventSink for PoolWatch {
    fn emit(&self, event: AllocationEvent) {
        self.refresh(event.pool_team_id());
    }
}
