//! Application layer: the pipeline stages and the queues between them.
//!
//! ```text
//!  ConnectionAcceptor ──ingest bus──► BatchProcessor ──result bus──► ResultsWriter
//!   (1 task / client)                  (1 task)                       (1 dispatch task
//!                                                                      + 1 handler / client)
//! ```
//!
//! - **`bus`** – Bounded FIFO between two stages.  Publishing waits for space,
//!   so a slow stage throttles the one before it.
//! - **`batch_processor`** – Builds batches under a size/time budget and runs
//!   the detection model on them.
//! - **`results_writer`** – Routes each processed frame to its client's
//!   handler.  Per-client queues drop on overflow instead of blocking.
//! - **`worker_gauge`** – Counts live workers for health reporting.
//!
//! The orchestrator that starts and stops these stages lives in [`crate::app`]
//! because it also owns the socket-facing acceptor.

pub mod batch_processor;
pub mod bus;
pub mod results_writer;
pub mod worker_gauge;
