//! # Election Coordinator - Bully Algorithm
//!
//! ## Election Process
//!
//! 1. Only one round runs at a time on a node; further triggers while a round is in
//!    flight are dropped (they join the running round).
//! 2. Role becomes `Electing` and an `ElectionRequest` goes to every higher-ranked peer.
//! 3. If any of them acknowledges, this node yields: it becomes a follower and waits for
//!    the higher-ranked peer to win its own round and announce itself.
//! 4. If none acknowledges, this node is the leader and announces it to every other peer
//!    exactly once. Failed deliveries are logged and otherwise ignored.
//!
//! A single failed contact counts as "peer not available" for the whole round; there is
//! no retry before declaring leadership.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::common::messages::Message;
use crate::server::messenger::Messenger;
use crate::server::registry::PeerRegistry;
use crate::server::state::{NodeState, Role};

/// Result of one call to [`ElectionCoordinator::start_election`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No higher-ranked peer answered; this node declared itself leader.
    Won { announced_to: usize },
    /// These higher-ranked peers answered; one of them is expected to announce.
    Yielded { to: Vec<String> },
    /// Another round was already running on this node.
    AlreadyRunning,
}

/// Clears the in-flight flag when the round ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ElectionCoordinator {
    registry: Arc<PeerRegistry>,
    state: Arc<NodeState>,
    messenger: Messenger,
    in_flight: AtomicBool,
}

impl ElectionCoordinator {
    pub fn new(registry: Arc<PeerRegistry>, state: Arc<NodeState>, messenger: Messenger) -> Self {
        Self {
            registry,
            state,
            messenger,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one election round.
    ///
    /// `reason` is only used for logging ("startup", "forwarded", "leader-down").
    pub async fn start_election(&self, reason: &str) -> ElectionOutcome {
        let Some(_flight) = InFlight::claim(&self.in_flight) else {
            debug!(
                "🗳️  {} already electing, ignoring trigger ({})",
                self.registry.self_id(),
                reason
            );
            return ElectionOutcome::AlreadyRunning;
        };

        let self_id = self.registry.self_id().to_string();
        info!("🗳️  {} starting election ({})", self_id, reason);

        self.state.set_role(Role::Electing);

        let answered = self.contact_higher_ranked(&self_id).await;

        if !answered.is_empty() {
            info!(
                "📊 {} yields to higher-ranked peer(s): {}",
                self_id,
                answered.join(", ")
            );
            // An announcement may have arrived while we were asking around; a leader-down
            // reset (Unknown) still means we are waiting on a higher-ranked peer.
            self.state.set_role_if(&[Role::Electing, Role::Unknown], Role::Follower);
            return ElectionOutcome::Yielded { to: answered };
        }

        info!("🎉 {} won the election", self_id);
        // Ends any heartbeat epoch in the same step.
        self.state.transition(Role::Leader, Some(self_id.clone()));

        let announced_to = self.announce(&self_id).await;
        ElectionOutcome::Won { announced_to }
    }

    /// Send `ElectionRequest` to every higher-ranked peer at once and collect the ids that
    /// acknowledged, in rank order.
    async fn contact_higher_ranked(&self, self_id: &str) -> Vec<String> {
        let higher = self.registry.higher_ranked(self_id);
        if higher.is_empty() {
            return Vec::new();
        }

        let mut requests = JoinSet::new();
        for peer in higher {
            let messenger = self.messenger.clone();
            requests.spawn(async move {
                let result = messenger.send(&peer.address, Message::ElectionRequest).await;
                (peer.id, result.is_ok())
            });
        }

        let mut answered = Vec::new();
        while let Some(joined) = requests.join_next().await {
            if let Ok((id, true)) = joined {
                answered.push(id);
            }
        }
        answered.sort();
        answered
    }

    /// Announce `leader_id` to every other peer. Returns how many acknowledged.
    async fn announce(&self, leader_id: &str) -> usize {
        let mut deliveries = JoinSet::new();
        for peer in self.registry.others() {
            let messenger = self.messenger.clone();
            let peer = peer.clone();
            let message = Message::LeaderAnnouncement {
                leader_id: leader_id.to_string(),
            };
            deliveries.spawn(async move {
                let result = messenger.send(&peer.address, message).await;
                (peer.id, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(_))) => delivered += 1,
                Ok((id, Err(e))) => debug!("📤 announcement to {} lost: {}", id, e),
                Err(e) => debug!("📤 announcement task failed: {}", e),
            }
        }

        info!(
            "📤 {} announced leadership to {}/{} peer(s)",
            leader_id,
            delivered,
            self.registry.len() - 1
        );
        delivered
    }
}
