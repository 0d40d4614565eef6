//! Lifecycle notifications.
//!
//! Listeners observe entries as they move through the outbox. Every
//! notification fires after the transaction that recorded the change has
//! committed. A listener can also decorate the invocation itself through
//! `wrap_invocation`.

use crate::{InvocationError, InvocationResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use txno_core::Entry;

/// The call a listener wraps. Calling it runs the rest of the chain and
/// finally the handler.
pub type Invoke<'a> = &'a mut dyn FnMut() -> InvocationResult;

/// Receives outbox lifecycle events. Every method defaults to a no-op.
pub trait OutboxListener: Send + Sync {
    /// The entry's transaction committed. Fires before any execution result.
    fn scheduled(&self, _entry: &Entry) {}

    /// Decorate an invocation. Implementations should call `invoke` unless
    /// they mean to suppress the call.
    fn wrap_invocation(&self, _entry: &Entry, invoke: Invoke<'_>) -> InvocationResult {
        invoke()
    }

    /// The entry completed and will not run again. At-least-once delivery
    /// means the work itself may have run more than once before this.
    fn success(&self, _entry: &Entry, _result: &Value) {}

    /// An attempt failed and was recorded.
    fn failure(&self, _entry: &Entry, _cause: &InvocationError) {}

    /// The entry reached the attempt ceiling. Fires right after `failure`.
    fn blocked(&self, _entry: &Entry, _cause: &InvocationError) {}
}

/// Listeners invoked in sequence.
///
/// Events go to each listener in the order added. Invocation wrappers nest
/// outer-to-inner: the first listener's wrapper sees the call first.
#[derive(Clone, Default)]
pub struct ListenerChain {
    listeners: Vec<Arc<dyn OutboxListener>>,
}

impl ListenerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn and_then(mut self, listener: Arc<dyn OutboxListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn wrap_from(&self, index: usize, entry: &Entry, invoke: Invoke<'_>) -> InvocationResult {
        match self.listeners.get(index) {
            None => invoke(),
            Some(listener) => listener.wrap_invocation(entry, &mut || {
                self.wrap_from(index + 1, entry, &mut *invoke)
            }),
        }
    }
}

impl OutboxListener for ListenerChain {
    fn scheduled(&self, entry: &Entry) {
        for listener in &self.listeners {
            listener.scheduled(entry);
        }
    }

    fn wrap_invocation(&self, entry: &Entry, invoke: Invoke<'_>) -> InvocationResult {
        self.wrap_from(0, entry, invoke)
    }

    fn success(&self, entry: &Entry, result: &Value) {
        for listener in &self.listeners {
            listener.success(entry, result);
        }
    }

    fn failure(&self, entry: &Entry, cause: &InvocationError) {
        for listener in &self.listeners {
            listener.failure(entry, cause);
        }
    }

    fn blocked(&self, entry: &Entry, cause: &InvocationError) {
        for listener in &self.listeners {
            listener.blocked(entry, cause);
        }
    }
}

/// One notification captured by `RecordingListener`.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Scheduled { id: String },
    Success { id: String, result: Value },
    Failure { id: String, attempts: i32, error: String },
    Blocked { id: String, error: String },
}

/// Listener that records every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Events concerning one entry, in order.
    pub fn events_for(&self, id: &str) -> Vec<ListenerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| match event {
                ListenerEvent::Scheduled { id: e }
                | ListenerEvent::Success { id: e, .. }
                | ListenerEvent::Failure { id: e, .. }
                | ListenerEvent::Blocked { id: e, .. } => e == id,
            })
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: ListenerEvent) {
        self.events.lock().push(event);
    }
}

impl OutboxListener for RecordingListener {
    fn scheduled(&self, entry: &Entry) {
        self.push(ListenerEvent::Scheduled {
            id: entry.id().to_string(),
        });
    }

    fn success(&self, entry: &Entry, result: &Value) {
        self.push(ListenerEvent::Success {
            id: entry.id().to_string(),
            result: result.clone(),
        });
    }

    fn failure(&self, entry: &Entry, cause: &InvocationError) {
        self.push(ListenerEvent::Failure {
            id: entry.id().to_string(),
            attempts: entry.attempts,
            error: cause.to_string(),
        });
    }

    fn blocked(&self, entry: &Entry, cause: &InvocationError) {
        self.push(ListenerEvent::Blocked {
            id: entry.id().to_string(),
            error: cause.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use txno_core::Invocation;

    fn entry() -> Entry {
        Entry::new("e-1", Invocation::new("a", "b"), Utc::now())
    }

    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl OutboxListener for Tagging {
        fn scheduled(&self, _entry: &Entry) {
            self.log.lock().push(format!("scheduled:{}", self.tag));
        }

        fn wrap_invocation(&self, _entry: &Entry, invoke: Invoke<'_>) -> InvocationResult {
            self.log.lock().push(format!("enter:{}", self.tag));
            let result = invoke();
            self.log.lock().push(format!("exit:{}", self.tag));
            result
        }
    }

    #[test]
    fn events_fire_in_order_added() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ListenerChain::new()
            .and_then(Arc::new(Tagging { tag: "a", log: log.clone() }))
            .and_then(Arc::new(Tagging { tag: "b", log: log.clone() }));

        chain.scheduled(&entry());

        assert_eq!(*log.lock(), vec!["scheduled:a", "scheduled:b"]);
    }

    #[test]
    fn wrappers_nest_outer_to_inner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ListenerChain::new()
            .and_then(Arc::new(Tagging { tag: "a", log: log.clone() }))
            .and_then(Arc::new(Tagging { tag: "b", log: log.clone() }));

        let inner_log = log.clone();
        let result = chain.wrap_invocation(&entry(), &mut || {
            inner_log.lock().push("call".to_string());
            Ok(json!(42))
        });

        assert_eq!(result.unwrap(), json!(42));
        assert_eq!(
            *log.lock(),
            vec!["enter:a", "enter:b", "call", "exit:b", "exit:a"]
        );
    }

    #[test]
    fn empty_chain_just_invokes() {
        let chain = ListenerChain::new();
        assert!(chain.is_empty());
        let result = chain.wrap_invocation(&entry(), &mut || Ok(Value::Null));
        assert_eq!(result.unwrap(), Value::Null);
    }

    #[test]
    fn recording_listener_captures_events() {
        let recorder = RecordingListener::new();
        let mut e = entry();
        recorder.scheduled(&e);
        e.attempts = 1;
        recorder.failure(&e, &InvocationError::failed("boom"));
        recorder.success(&e, &json!("ok"));

        assert_eq!(
            recorder.events_for("e-1"),
            vec![
                ListenerEvent::Scheduled { id: "e-1".into() },
                ListenerEvent::Failure {
                    id: "e-1".into(),
                    attempts: 1,
                    error: "boom".into()
                },
                ListenerEvent::Success {
                    id: "e-1".into(),
                    result: json!("ok")
                },
            ]
        );
        assert!(recorder.events_for("other").is_empty());
    }
}
