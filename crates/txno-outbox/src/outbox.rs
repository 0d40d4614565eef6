//! The outbox coordinator.
//!
//! Entry state machine:
//!
//! ```text
//! Pending ──claim──▶ Claimed ──ok──▶ Succeeded (deleted, or processed when keyed)
//!    ▲                  │
//!    └──── retry ───────┤ failure, attempts < ceiling
//!                       └──▶ Blocked (failure, attempts reached ceiling; unblock resets)
//! ```

use crate::config::later;
use crate::{
    InvocationError, Invoker, ListenerChain, OutboxConfig, OutboxError, OutboxListener,
    OutboxResult, Submitter,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};
use txno_core::{Clock, Entry, Invocation, SystemClock};
use txno_database::{
    in_transaction, in_write_transaction, DatabaseError, Dialect, DialectKind, Persistor,
    Transaction, TransactionManager,
};

/// Options for one `schedule` call.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    unique_request_id: Option<String>,
    topic: Option<String>,
    ordered_take_last: bool,
    delay: Option<Duration>,
    trace_context: BTreeMap<String, String>,
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a second schedule with the same key while the first is
    /// pending or retained.
    pub fn unique_request_id(mut self, id: impl Into<String>) -> Self {
        self.unique_request_id = Some(id.into());
        self
    }

    /// Run in FIFO order with every other entry on `topic`.
    pub fn ordered(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self.ordered_take_last = false;
        self
    }

    /// Like `ordered`, but a newer entry supersedes older pending ones.
    pub fn ordered_take_last(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self.ordered_take_last = true;
        self
    }

    /// Do not run before `delay` has passed. Delays beyond [`MAX_DELAY`]
    /// are rejected by `schedule`.
    ///
    /// [`MAX_DELAY`]: crate::MAX_DELAY
    pub fn delay_for_at_least(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Context restored around execution, e.g. a trace or request id.
    pub fn trace_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.trace_context = context;
        self
    }
}

/// What happened to one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Someone else holds or already handled the entry.
    NotLocked,
    Succeeded,
    /// Failed; will be retried.
    Failed,
    /// Failed and reached the attempt ceiling.
    Blocked,
}

/// Builder for [`TransactionOutbox`].
pub struct TransactionOutboxBuilder {
    manager: Arc<dyn TransactionManager>,
    invoker: Arc<dyn Invoker>,
    submitter: Arc<dyn Submitter>,
    dialect: Dialect,
    config: OutboxConfig,
    listeners: ListenerChain,
    clock: Arc<dyn Clock>,
}

impl TransactionOutboxBuilder {
    pub fn dialect(mut self, dialect: impl Into<Dialect>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn config(mut self, config: OutboxConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a listener. Listeners fire in the order added.
    pub fn listener(mut self, listener: Arc<dyn OutboxListener>) -> Self {
        self.listeners = self.listeners.and_then(listener);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> OutboxResult<TransactionOutbox> {
        self.config.validate()?;
        let persistor = Persistor::new(
            self.dialect,
            self.config.table_name.clone(),
            self.config.write_lock_timeout,
        )?;
        Ok(TransactionOutbox {
            inner: Arc::new(Inner {
                config: self.config,
                manager: self.manager,
                persistor,
                invoker: self.invoker,
                submitter: self.submitter,
                listener: self.listeners,
                clock: self.clock,
                shutting_down: AtomicBool::new(false),
            }),
        })
    }
}

/// Schedules work atomically with a caller's transaction and executes it
/// at least once.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TransactionOutbox {
    inner: Arc<Inner>,
}

struct Inner {
    config: OutboxConfig,
    manager: Arc<dyn TransactionManager>,
    persistor: Persistor,
    invoker: Arc<dyn Invoker>,
    submitter: Arc<dyn Submitter>,
    listener: ListenerChain,
    clock: Arc<dyn Clock>,
    shutting_down: AtomicBool,
}

impl TransactionOutbox {
    /// Start building an outbox. Defaults: SQLite dialect, default config,
    /// no listeners, system clock.
    pub fn builder(
        manager: Arc<dyn TransactionManager>,
        invoker: Arc<dyn Invoker>,
        submitter: Arc<dyn Submitter>,
    ) -> TransactionOutboxBuilder {
        TransactionOutboxBuilder {
            manager,
            invoker,
            submitter,
            dialect: Dialect::new(DialectKind::Sqlite),
            config: OutboxConfig::default(),
            listeners: ListenerChain::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Apply schema migrations when enabled.
    pub fn initialize(&self) -> OutboxResult<()> {
        if self.inner.config.migrate {
            self.inner.persistor.migrate(self.inner.manager.as_ref())?;
        } else {
            debug!("Migrations disabled");
        }
        info!(table = %self.inner.config.table_name, "Outbox initialized");
        Ok(())
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.inner.config
    }

    pub fn persistor(&self) -> &Persistor {
        &self.inner.persistor
    }

    pub fn transaction_manager(&self) -> &Arc<dyn TransactionManager> {
        &self.inner.manager
    }

    /// Record `invocation` for execution once `tx` commits.
    ///
    /// Nothing runs and nothing is visible if `tx` rolls back. After commit
    /// the `scheduled` notification fires and, for unordered entries without
    /// a delay, execution is attempted straight away.
    pub fn schedule(
        &self,
        tx: &dyn Transaction,
        invocation: Invocation,
        options: ScheduleOptions,
    ) -> OutboxResult<Entry> {
        if !tx.is_active() {
            return Err(OutboxError::NoTransaction);
        }
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(OutboxError::ShuttingDown);
        }

        let inner = &self.inner;
        let now = inner.clock.now();
        let submit_now = options.topic.is_none() && options.delay.is_none();

        // An entry headed straight for a worker is pushed back so a
        // concurrent flush leaves it alone meanwhile.
        let next_attempt_time = match options.delay {
            Some(delay) => later(now, delay)?,
            None if submit_now => later(now, inner.config.attempt_frequency)?,
            None => now,
        };

        let invocation = if options.trace_context.is_empty() {
            invocation
        } else {
            let mut context = invocation.trace_context.clone();
            context.extend(options.trace_context);
            invocation.with_trace_context(context)
        };

        let mut entry = Entry::with_random_id(invocation, next_attempt_time)
            .with_unique_request_id(options.unique_request_id)
            .with_topic(options.topic, options.ordered_take_last);
        entry.validate()?;

        inner
            .persistor
            .save(tx, &mut entry)
            .map_err(OutboxError::from_save)?;

        let hook_inner = Arc::clone(inner);
        let hook_entry = entry.clone();
        tx.add_post_commit_hook(Box::new(move || {
            hook_inner.listener.scheduled(&hook_entry);
            if submit_now {
                hook_inner.submit(hook_entry);
            }
        }));

        debug!(
            entry = %entry.description(),
            next_attempt_time = %entry.next_attempt_time,
            "Scheduled"
        );
        Ok(entry)
    }

    /// Claim due work and hand it to the submitter, then reap expired and
    /// superseded rows.
    ///
    /// Returns whether any work was found; callers may flush again at once
    /// when it was.
    pub fn flush(&self) -> OutboxResult<bool> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(OutboxError::ShuttingDown);
        }
        self.inner.flush()
    }

    /// Execute `entry` on the calling thread.
    pub fn process_now(&self, entry: Entry) -> OutboxResult<ProcessOutcome> {
        self.inner.process(entry)
    }

    /// Reset a blocked entry in its own transaction. Returns whether a
    /// blocked entry was found.
    ///
    /// The entry becomes due immediately but is not executed here; the next
    /// flush picks it up.
    pub fn unblock(&self, id: &str) -> OutboxResult<bool> {
        in_transaction(self.inner.manager.as_ref(), |tx| self.unblock_in(tx, id))
    }

    /// Reset a blocked entry inside the caller's transaction.
    pub fn unblock_in(&self, tx: &dyn Transaction, id: &str) -> OutboxResult<bool> {
        let now = self.inner.clock.now();
        let unblocked = self.inner.persistor.unblock(tx, id, now)?;
        if unblocked {
            info!(entry_id = %id, "Unblocked");
        } else {
            info!(entry_id = %id, "No blocked entry to unblock");
        }
        Ok(unblocked)
    }

    /// Stop scheduling and flushing. In-flight executions run to completion.
    pub fn shutdown(&self) {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Outbox shutting down");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

/// Result of the claim transaction, before failures are recorded.
enum Attempt {
    NotLocked,
    Succeeded(Value),
}

/// Reasons the claim transaction rolls back.
enum Abort {
    Invocation(InvocationError),
    Storage(OutboxError),
}

impl From<DatabaseError> for Abort {
    fn from(err: DatabaseError) -> Self {
        Abort::Storage(OutboxError::Database(err))
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, entry: Entry) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        let job_entry = entry.clone();
        let accepted = self.submitter.submit(
            &entry,
            Box::new(move || {
                let description = job_entry.description().to_string();
                if let Err(e) = inner.process(job_entry) {
                    warn!(entry = %description, error = %e, "Error processing entry");
                }
            }),
        );
        if accepted {
            debug!(entry = %entry.description(), "Submitted for immediate processing");
        }
    }

    fn flush(self: &Arc<Self>) -> OutboxResult<bool> {
        let now = self.clock.now();
        let limit = self.config.flush_batch_size;
        let push_back = later(now, self.config.attempt_frequency)?;

        let claim = |tx: &dyn Transaction| -> OutboxResult<Vec<Entry>> {
            let mut batch = self.persistor.select_next_in_topics(tx, limit, now)?;
            if batch.len() < limit {
                batch.extend(self.persistor.select_batch(tx, limit - batch.len(), now)?);
            }

            let mut claimed = Vec::with_capacity(batch.len());
            for mut entry in batch {
                entry.next_attempt_time = push_back;
                match self.persistor.update(tx, &mut entry) {
                    Ok(()) => claimed.push(entry),
                    Err(DatabaseError::OptimisticLock(_)) => {
                        debug!(entry = %entry.description(), "Claimed elsewhere during flush");
                    }
                    Err(e) => {
                        warn!(
                            entry = %entry.description(),
                            error = %e,
                            "Failed to claim entry; leaving it for a later flush"
                        );
                    }
                }
            }
            Ok(claimed)
        };
        let claimed = match in_write_transaction(self.manager.as_ref(), claim) {
            Ok(claimed) => claimed,
            Err(OutboxError::Database(DatabaseError::LockTimeout)) => {
                debug!("Outbox busy, nothing claimed this flush");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let found = !claimed.is_empty();
        if found {
            debug!(count = claimed.len(), "Flush found due entries");
        }
        for entry in claimed {
            self.submit(entry);
        }

        let expired = in_transaction(self.manager.as_ref(), |tx| {
            self.persistor.delete_processed_and_expired(tx, limit, now)
        })?;
        let outdated = in_transaction(self.manager.as_ref(), |tx| {
            self.persistor.delete_outdated_in_all_topics(tx)
        })?;
        if expired > 0 || outdated > 0 {
            debug!(expired, outdated, "Reaped entries");
        }

        Ok(found)
    }

    fn process(&self, mut entry: Entry) -> OutboxResult<ProcessOutcome> {
        let span = info_span!(
            "outbox",
            entry_id = %entry.id(),
            target = %entry.invocation().target,
            method = %entry.invocation().method,
            attempt = entry.attempts + 1,
            trace = ?entry.invocation().trace_context,
        );
        let _enter = span.enter();

        let attempt = in_transaction(self.manager.as_ref(), |tx| -> Result<Attempt, Abort> {
            if !self.persistor.lock(tx, &mut entry)? {
                return Ok(Attempt::NotLocked);
            }
            debug!(entry = %entry.description(), "Processing");

            let result = {
                let invoker = &self.invoker;
                let invocation = entry.invocation();
                let mut call = || invoker.invoke(invocation, tx);
                self.listener.wrap_invocation(&entry, &mut call)
            };
            let value = result.map_err(Abort::Invocation)?;

            if entry.unique_request_id().is_some() {
                let now = self.clock.now();
                entry.processed = true;
                entry.last_attempt_time = Some(now);
                entry.next_attempt_time = later(now, self.config.retention_threshold)
                    .map_err(Abort::Storage)?;
                self.persistor.update(tx, &mut entry)?;
            } else {
                self.persistor.delete(tx, &entry)?;
            }
            Ok(Attempt::Succeeded(value))
        });

        match attempt {
            Ok(Attempt::NotLocked) => {
                debug!(entry = %entry.description(), "Entry not locked, skipping");
                Ok(ProcessOutcome::NotLocked)
            }
            Ok(Attempt::Succeeded(value)) => {
                info!(entry = %entry.description(), "Processed");
                self.listener.success(&entry, &value);
                Ok(ProcessOutcome::Succeeded)
            }
            Err(Abort::Invocation(cause)) => self.record_failure(entry, cause),
            Err(Abort::Storage(OutboxError::Database(DatabaseError::OptimisticLock(_)))) => {
                debug!(entry = %entry.description(), "Lost optimistic lock while completing");
                Ok(ProcessOutcome::NotLocked)
            }
            Err(Abort::Storage(e)) => Err(e),
        }
    }

    fn record_failure(&self, mut entry: Entry, cause: InvocationError) -> OutboxResult<ProcessOutcome> {
        let now = self.clock.now();
        entry.attempts += 1;
        entry.last_attempt_time = Some(now);
        entry.next_attempt_time = later(now, self.config.attempt_frequency)?;
        entry.blocked = entry.attempts >= self.config.block_after_attempts;

        let recorded = in_transaction(self.manager.as_ref(), |tx| {
            self.persistor.update(tx, &mut entry)
        });
        match recorded {
            Ok(()) => {}
            Err(DatabaseError::OptimisticLock(_)) => {
                debug!(entry = %entry.description(), "Failure already recorded elsewhere");
                return Ok(ProcessOutcome::NotLocked);
            }
            Err(e) => return Err(e.into()),
        }

        if entry.blocked {
            error!(
                entry = %entry.description(),
                attempts = entry.attempts,
                error = %cause,
                "Blocking entry after too many failures; unblock it once the cause is fixed"
            );
        } else {
            warn!(
                entry = %entry.description(),
                attempts = entry.attempts,
                next_attempt_time = %entry.next_attempt_time,
                error = %cause,
                "Error invoking entry; will retry"
            );
        }

        self.listener.failure(&entry, &cause);
        if entry.blocked {
            self.listener.blocked(&entry, &cause);
            Ok(ProcessOutcome::Blocked)
        } else {
            Ok(ProcessOutcome::Failed)
        }
    }
}
