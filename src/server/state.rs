//! # Node State
//!
//! The single source of truth for this node's role and the leader it believes in. Role
//! and leader id live behind one mutex so every transition applies both or neither.
//!
//! The same mutex owns the heartbeat epoch. Every [`NodeState::transition`] ends the
//! running epoch, and following a leader opens the next one inside the same critical
//! section, so the leader being watched is always the leader in the snapshot.

use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Role of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No leader known and no election running (startup, or leader just lost)
    Unknown,
    /// Holding an election
    Electing,
    /// This node is the leader
    Leader,
    /// Following a leader, or waiting for a higher-ranked peer to announce itself
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Unknown => "unknown",
            Role::Electing => "electing",
            Role::Leader => "leader",
            Role::Follower => "follower",
        };
        f.write_str(name)
    }
}

/// Read-only copy of the node state at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub role: Role,
    #[serde(rename = "leaderID")]
    pub leader_id: Option<String>,
}

/// Handle on one leader epoch, returned by [`NodeState::transition`] when this node
/// starts following a leader.
#[derive(Debug, Clone)]
pub struct EpochGuard {
    pub epoch: u64,
    pub leader_id: String,
    cancel: CancellationToken,
}

impl EpochGuard {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once a later transition or shutdown has ended this epoch.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[derive(Debug)]
struct Inner {
    snapshot: Snapshot,
    epoch: u64,
    heartbeat: Option<CancellationToken>,
}

impl Inner {
    fn end_epoch(&mut self) {
        if let Some(cancel) = self.heartbeat.take() {
            cancel.cancel();
        }
        self.epoch += 1;
    }
}

#[derive(Debug)]
pub struct NodeState {
    self_id: String,
    shutdown: CancellationToken,
    inner: Mutex<Inner>,
}

impl NodeState {
    /// A fresh state in [`Role::Unknown`] with no leader.
    pub fn new(self_id: impl Into<String>) -> Self {
        Self::with_shutdown(self_id, CancellationToken::new())
    }

    /// Like [`new`](Self::new), but every epoch also ends when `shutdown` is cancelled.
    pub fn with_shutdown(self_id: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            self_id: self_id.into(),
            shutdown,
            inner: Mutex::new(Inner {
                snapshot: Snapshot {
                    role: Role::Unknown,
                    leader_id: None,
                },
                epoch: 0,
                heartbeat: None,
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    /// Set role and leader together and end the running heartbeat epoch.
    ///
    /// Following a leader opens a new epoch in the same step and returns its guard.
    pub fn transition(&self, role: Role, leader_id: Option<String>) -> Option<EpochGuard> {
        let mut inner = self.lock();
        let previous = std::mem::replace(
            &mut inner.snapshot,
            Snapshot {
                role,
                leader_id: leader_id.clone(),
            },
        );
        self.log_change(&previous, &inner.snapshot);
        inner.end_epoch();

        let leader_id = leader_id.filter(|_| role == Role::Follower)?;
        let cancel = self.shutdown.child_token();
        inner.heartbeat = Some(cancel.clone());
        debug!("💓 heartbeat epoch {} for leader {}", inner.epoch, leader_id);

        Some(EpochGuard {
            epoch: inner.epoch,
            leader_id,
            cancel,
        })
    }

    /// Change the role and keep whatever leader (and epoch) is current.
    pub fn set_role(&self, role: Role) -> Snapshot {
        let mut inner = self.lock();
        let previous = inner.snapshot.clone();
        inner.snapshot.role = role;
        self.log_change(&previous, &inner.snapshot);
        previous
    }

    /// Move to `role` only if the current role is one of `from`, keeping the known leader.
    pub fn set_role_if(&self, from: &[Role], role: Role) -> bool {
        let mut inner = self.lock();
        if !from.contains(&inner.snapshot.role) {
            return false;
        }
        let previous = inner.snapshot.clone();
        inner.snapshot.role = role;
        self.log_change(&previous, &inner.snapshot);
        true
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    /// Drop back to [`Role::Unknown`] if `epoch` is still the running one.
    ///
    /// Returns `true` for exactly one caller per epoch; that caller owns the follow-up
    /// election. Returns `false` when a newer transition happened in the meantime.
    pub fn forget_leader(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        let previous = std::mem::replace(
            &mut inner.snapshot,
            Snapshot {
                role: Role::Unknown,
                leader_id: None,
            },
        );
        self.log_change(&previous, &inner.snapshot);
        inner.end_epoch();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write replaces whole fields, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn log_change(&self, previous: &Snapshot, current: &Snapshot) {
        if previous != current {
            info!(
                "🔄 {} is now {} (leader: {})",
                self.self_id,
                current.role,
                current.leader_id.as_deref().unwrap_or("none")
            );
        }
    }
}
