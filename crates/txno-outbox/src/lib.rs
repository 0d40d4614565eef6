//! Transactional outbox.
//!
//! Work is scheduled by writing a row in the caller's own database
//! transaction. Once that transaction commits the row is handed to a worker
//! pool for immediate execution; a periodic flush picks up anything that
//! was missed, failed, or deferred. Execution is at-least-once.
//!
//! ## Architecture
//!
//! ```text
//! schedule(tx) ──▶ outbox table ──▶ post-commit ──▶ Submitter ──▶ worker
//!                       ▲                                          │
//!                       │            flush (interval)              │
//!                       └──────── lock / invoke / delete ◀─────────┘
//! ```
//!
//! Within a topic, only the lowest-sequence pending entry is ever eligible,
//! so topics execute strictly in FIFO order.

mod config;
mod error;
mod flusher;
mod invoker;
mod listener;
mod outbox;
mod submitter;

pub use config::{OutboxConfig, MAX_DELAY};
pub use error::{OutboxError, OutboxResult};
pub use flusher::{spawn_flush_loop, FlushLoopHandle};
pub use invoker::{Handler, HandlerRegistry, InvocationError, InvocationResult, Invoker};
pub use listener::{Invoke, ListenerChain, ListenerEvent, OutboxListener, RecordingListener};
pub use outbox::{ProcessOutcome, ScheduleOptions, TransactionOutbox, TransactionOutboxBuilder};
pub use submitter::{ExecutorSubmitter, Job, Submitter, SubmitterConfig};
