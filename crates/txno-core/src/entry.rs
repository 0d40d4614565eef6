//! Outbox entry model.

use crate::{Invocation, ValidationError, ValidationResult};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// Value stored in the `topic` column when an entry is unordered.
pub const NO_TOPIC: &str = "*";

/// One scheduled unit of work and its lifecycle state.
///
/// Lifecycle:
/// - created pending with `attempts = 0`
/// - claimed by a worker (a lock, not a persisted status)
/// - on success deleted, or marked `processed` when it carries a
///   `unique_request_id` so later duplicates can be rejected
/// - on failure `attempts` grows and `next_attempt_time` moves forward
/// - once `attempts` reaches the configured ceiling the entry is `blocked`
///   until an operator unblocks it
#[derive(Debug, Clone)]
pub struct Entry {
    id: String,
    unique_request_id: Option<String>,
    topic: Option<String>,
    sequence: Option<i64>,
    ordered_take_last: bool,
    invocation: Invocation,
    pub last_attempt_time: Option<DateTime<Utc>>,
    /// Not eligible for claiming before this instant.
    pub next_attempt_time: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub attempts: i32,
    pub blocked: bool,
    pub processed: bool,
    /// Optimistic-concurrency counter. Only ever increases.
    pub version: i32,
    description: OnceLock<String>,
}

impl Entry {
    /// Create a fresh pending entry.
    pub fn new(
        id: impl Into<String>,
        invocation: Invocation,
        next_attempt_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            unique_request_id: None,
            topic: None,
            sequence: None,
            ordered_take_last: false,
            invocation,
            last_attempt_time: None,
            next_attempt_time,
            attempts: 0,
            blocked: false,
            processed: false,
            version: 0,
            description: OnceLock::new(),
        }
    }

    /// Create a pending entry with a random UUID.
    pub fn with_random_id(invocation: Invocation, next_attempt_time: DateTime<Utc>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), invocation, next_attempt_time)
    }

    pub fn with_unique_request_id(mut self, unique_request_id: Option<String>) -> Self {
        self.unique_request_id = unique_request_id;
        self.description = OnceLock::new();
        self
    }

    pub fn with_topic(mut self, topic: Option<String>, ordered_take_last: bool) -> Self {
        self.topic = topic;
        self.ordered_take_last = ordered_take_last;
        self.description = OnceLock::new();
        self
    }

    /// Restore a sequence number read back from storage.
    pub fn with_sequence(mut self, sequence: Option<i64>) -> Self {
        self.sequence = sequence;
        self.description = OnceLock::new();
        self
    }

    /// Immutable, globally unique id (a UUID).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Caller-supplied idempotency key.
    pub fn unique_request_id(&self) -> Option<&str> {
        self.unique_request_id.as_deref()
    }

    /// Ordering scope. `None` means unordered.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Position within the topic, assigned once at insert time.
    pub fn sequence(&self) -> Option<i64> {
        self.sequence
    }

    /// Only the newest entry in the topic needs to survive.
    pub fn ordered_take_last(&self) -> bool {
        self.ordered_take_last
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Replace the invocation with one freshly read from storage.
    pub fn set_invocation(&mut self, invocation: Invocation) {
        self.invocation = invocation;
        self.description = OnceLock::new();
    }

    /// Assign the per-topic sequence number.
    pub fn set_sequence(&mut self, sequence: i64) {
        self.sequence = Some(sequence);
        self.description = OnceLock::new();
    }

    /// Human-readable description used on every log line about this entry.
    ///
    /// Computed on first access and memoized; stringifying arguments can be
    /// expensive and this runs on every retry.
    pub fn description(&self) -> &str {
        self.description.get_or_init(|| {
            let args = self
                .invocation
                .args
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let mut description = format!(
                "{}.{}({}) [{}]",
                self.invocation.target, self.invocation.method, args, self.id
            );
            if let Some(uid) = &self.unique_request_id {
                description.push_str(&format!(" uid=[{}]", uid));
            }
            if let Some(topic) = &self.topic {
                let seq = self
                    .sequence
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "null".to_string());
                description.push_str(&format!(" seq=[{}/{}]", topic, seq));
            }
            description
        })
    }

    /// Check field-level invariants.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "id" });
        }
        null_or_not_blank("uniqueRequestId", self.unique_request_id.as_deref())?;
        null_or_not_blank("topic", self.topic.as_deref())?;
        if self.topic.as_deref() == Some(NO_TOPIC) {
            return Err(ValidationError::ReservedTopic(NO_TOPIC));
        }
        if self.invocation.target.trim().is_empty() {
            return Err(ValidationError::Missing {
                field: "invocation.target",
            });
        }
        if self.invocation.method.trim().is_empty() {
            return Err(ValidationError::Missing {
                field: "invocation.method",
            });
        }
        positive_or_zero("attempts", self.attempts)?;
        positive_or_zero("version", self.version)?;
        Ok(())
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.unique_request_id == other.unique_request_id
            && self.topic == other.topic
            && self.sequence == other.sequence
            && self.ordered_take_last == other.ordered_take_last
            && self.invocation == other.invocation
            && self.last_attempt_time == other.last_attempt_time
            && self.next_attempt_time == other.next_attempt_time
            && self.attempts == other.attempts
            && self.blocked == other.blocked
            && self.processed == other.processed
            && self.version == other.version
    }
}

fn null_or_not_blank(field: &'static str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ValidationError::Blank { field }),
        _ => Ok(()),
    }
}

fn positive_or_zero(field: &'static str, value: i32) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field,
            value: value as i64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Entry {
        let invocation = Invocation::new("mailer", "send")
            .with_arg("bob")
            .unwrap()
            .with_arg(2)
            .unwrap();
        Entry::new("e-1", invocation, Utc::now())
    }

    #[test]
    fn fresh_entry_is_valid_and_pending() {
        let entry = entry();
        assert!(entry.validate().is_ok());
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.version, 0);
        assert!(!entry.blocked);
        assert!(!entry.processed);
    }

    #[test]
    fn random_ids_differ() {
        let a = Entry::with_random_id(Invocation::new("a", "b"), Utc::now());
        let b = Entry::with_random_id(Invocation::new("a", "b"), Utc::now());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn blank_id_rejected() {
        let entry = Entry::new(" ", Invocation::new("a", "b"), Utc::now());
        assert_eq!(
            entry.validate(),
            Err(ValidationError::Missing { field: "id" })
        );
    }

    #[test]
    fn blank_unique_request_id_rejected() {
        let entry = entry().with_unique_request_id(Some("  ".to_string()));
        assert_eq!(
            entry.validate(),
            Err(ValidationError::Blank {
                field: "uniqueRequestId"
            })
        );
    }

    #[test]
    fn reserved_topic_rejected() {
        let entry = entry().with_topic(Some(NO_TOPIC.to_string()), false);
        assert_eq!(
            entry.validate(),
            Err(ValidationError::ReservedTopic(NO_TOPIC))
        );
    }

    #[test]
    fn blank_topic_rejected() {
        let entry = entry().with_topic(Some(String::new()), false);
        assert!(matches!(
            entry.validate(),
            Err(ValidationError::Blank { field: "topic" })
        ));
    }

    #[test]
    fn negative_counters_rejected() {
        let mut e = entry();
        e.attempts = -1;
        assert!(matches!(
            e.validate(),
            Err(ValidationError::Negative {
                field: "attempts",
                value: -1
            })
        ));

        let mut e = entry();
        e.version = -3;
        assert!(matches!(
            e.validate(),
            Err(ValidationError::Negative {
                field: "version",
                ..
            })
        ));
    }

    #[test]
    fn description_includes_call_and_keys() {
        let mut e = entry()
            .with_unique_request_id(Some("req-9".to_string()))
            .with_topic(Some("orders".to_string()), false);
        e.set_sequence(4);

        assert_eq!(
            e.description(),
            "mailer.send(\"bob\", 2) [e-1] uid=[req-9] seq=[orders/4]"
        );
    }

    #[test]
    fn description_is_memoized_until_invocation_changes() {
        let mut e = entry();
        let first = e.description().to_string();
        assert_eq!(e.description(), first);

        e.set_invocation(Invocation::new("other", "call"));
        assert_eq!(e.description(), "other.call() [e-1]");
    }

    #[test]
    fn equality_ignores_cached_description() {
        let a = entry();
        let b = a.clone();
        let _ = a.description();
        assert_eq!(a, b);
    }
}
