//! # Common Components
//!
//! Shared data structures used by every part of a node.
//!
//! ## Modules
//!
//! - [`messages`]: Election protocol messages and their wire mapping
//! - [`config`]: Peer table and election timing configuration
//! - [`error`]: Error taxonomy (configuration, communication, protocol)

pub mod config;
pub mod error;
pub mod messages;
