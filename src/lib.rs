//! Downloads previously-unseen media from a messaging conversation into a
//! per-conversation folder, keeping a durable ledger of message ids so
//! repeat runs never fetch the same attachment twice.

pub mod config;
pub mod ledger;
pub mod planner;
pub mod platform;
pub mod selector;
pub mod session;
pub mod syncer;
pub mod telemetry;
