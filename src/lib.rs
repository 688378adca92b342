//! # slotqueue
//!
//! Intrusive slot lists and a background task queue whose completion
//! callbacks are delivered on the host's own tick. A task monitor reports on
//! threads and Tokio tasks from the same tick, and an arena tree rounds out
//! the containers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use slotqueue::{BackgroundTaskQueue, IdleGrace, QueuedTask, Ticker};
//!
//! struct Compress(Vec<u8>);
//!
//! impl QueuedTask for Compress {
//!     fn process(&self) {
//!         // runs on the worker thread
//!     }
//!
//!     fn after_complete(&self) {
//!         println!("compressed {} bytes", self.0.len());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ticker = Ticker::new();
//!     tokio::spawn(ticker.clone().drive(Duration::from_millis(16)));
//!
//!     let queue = BackgroundTaskQueue::new(ticker);
//!     queue.enqueue(Compress(vec![0; 1024]), IdleGrace::After(Duration::from_secs(1)))?;
//!     Ok(())
//! }
//! ```

// ── Core ──────────────────────────────────────────────────────────────────────
pub mod background;
pub mod collections;
pub mod monitor;
pub mod ticker;

// ── Supporting ────────────────────────────────────────────────────────────────
pub mod config;
pub mod pool;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use background::{BackgroundTaskQueue, Backlog, QueueError, QueuedTask};
pub use collections::{NodeId, SlotId, SlotList, SlotListError, Tree, TreeError};
pub use config::{ConfigError, IdleGrace, QueueConfig};
pub use monitor::{Completion, MonitorError, TaskMonitor, WatchId};
pub use pool::{Lease, ObjectPool};
pub use ticker::{SubscriptionId, Ticker};
