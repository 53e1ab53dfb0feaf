//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request on an expensive route:
//!     → queue.rs (admission: busy slot, bounded wait list, wait timeout)
//!     → handler chain
//!         → timeouts.rs (deadline on control-plane response headers)
//! ```
//!
//! # Design Decisions
//! - Rejections are immediate or timer-bound; nothing is retried server-side
//! - Queue state is local to the process

pub mod queue;
pub mod timeouts;

pub use queue::{queue_requests, Queue, QueueError, QueueSlot};
