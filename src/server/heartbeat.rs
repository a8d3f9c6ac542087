//! # Heartbeat Monitor
//!
//! While a leader is known, followers ping it at a fixed interval. The first
//! unanswered ping ends the loop and reports [`WatchOutcome::LeaderLost`]; the owner of the
//! monitor then starts a new election.
//!
//! Each loop belongs to a leader epoch owned by [`NodeState`]. Any later transition
//! (a fresh announcement, winning an election, shutdown) ends the epoch and cancels its
//! loop, so at most one loop is ever acting on behalf of this node. A loop that notices
//! its epoch is no longer current exits without acting.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::common::messages::Message;
use crate::server::messenger::Messenger;
use crate::server::registry::PeerRegistry;
use crate::server::state::{EpochGuard, NodeState};

/// Why a heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The leader stopped answering (or can no longer be resolved)
    LeaderLost,
    /// A newer epoch replaced this loop, or the node is shutting down
    Superseded,
}

pub struct HeartbeatMonitor {
    registry: Arc<PeerRegistry>,
    state: Arc<NodeState>,
    messenger: Messenger,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<PeerRegistry>,
        state: Arc<NodeState>,
        messenger: Messenger,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            state,
            messenger,
            interval,
        }
    }

    /// Ping the leader of `guard` until it fails or the epoch is superseded.
    pub async fn watch(&self, guard: &EpochGuard) -> WatchOutcome {
        loop {
            if guard.is_cancelled() || !self.state.is_current(guard.epoch) {
                return WatchOutcome::Superseded;
            }

            let address = match self.registry.resolve(&guard.leader_id) {
                Ok(peer) => peer.address.clone(),
                Err(e) => {
                    warn!("⚠️  cannot resolve leader: {}", e);
                    return WatchOutcome::LeaderLost;
                }
            };

            let answer = tokio::select! {
                _ = guard.cancelled() => return WatchOutcome::Superseded,
                result = self.messenger.send(&address, Message::Ping) => result,
            };

            match answer {
                Ok(_) => debug!("💓 leader {} is alive", guard.leader_id),
                Err(e) => {
                    if !self.state.is_current(guard.epoch) {
                        return WatchOutcome::Superseded;
                    }
                    warn!("⚠️  leader {} did not answer heartbeat: {}", guard.leader_id, e);
                    return WatchOutcome::LeaderLost;
                }
            }

            tokio::select! {
                _ = guard.cancelled() => return WatchOutcome::Superseded,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
