//! # Server Components
//!
//! Everything one node runs, leaves first:
//!
//! - [`registry`]: static peer table and rank order
//! - [`messenger`]: outbound messages with a fixed timeout
//! - [`state`]: role and known leader, behind one lock
//! - [`heartbeat`]: epoch-tagged leader liveness loop
//! - [`election`]: bully election rounds
//! - [`middleware`]: wiring, inbound dispatch, bootstrap and shutdown
//! - [`http`]: HTTP+JSON endpoints

pub mod election;
pub mod heartbeat;
pub mod http;
pub mod messenger;
pub mod middleware;
pub mod registry;
pub mod state;

pub use middleware::ServerMiddleware;
pub use registry::{Peer, PeerRegistry};
pub use state::{NodeState, Role, Snapshot};
