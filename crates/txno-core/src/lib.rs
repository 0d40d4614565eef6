//! Core value types for the transactional outbox.
//!
//! This crate provides:
//! - [`Entry`]: one persisted unit of scheduled work and its retry state
//! - [`Invocation`]: the serialized description of what an entry runs
//! - [`Clock`]: the source of "now" used by every scheduling decision
//!
//! Nothing in here performs I/O. Persistence lives in `txno-database` and
//! the scheduling state machine lives in `txno-outbox`.

mod clock;
mod entry;
mod error;
mod invocation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{Entry, NO_TOPIC};
pub use error::{ValidationError, ValidationResult};
pub use invocation::Invocation;
