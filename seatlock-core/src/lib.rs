//! # seatlock-core
//!
//! Single-active-editor coordination for shared documents.
//! Many users may open a resource, one of them holds the editing lease and
//! everyone else waits in a FIFO queue. The only synchronization device is
//! the store's per-resource transaction; the coordinator keeps no state
//! between calls and can run in any number of processes.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod presence;
pub mod queue;
pub mod retry;
pub mod types;

pub use config::QueueConfig;
pub use coordinator::Coordinator;
pub use error::{QueueError, QueueResult};

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod coordinator_test;
#[cfg(test)]
mod presence_test;
