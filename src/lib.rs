//! # Bully Leader Election
//!
//! Designates one leader among a fixed set of peers. Each node asks the peers that
//! outrank it (greater id) whether they are alive; the highest-ranked reachable node
//! declares itself leader and announces it, and followers watch the leader with
//! heartbeats and re-elect when it stops answering.

pub mod common;
pub mod server;

pub use common::messages::Message;
pub use server::ServerMiddleware;
