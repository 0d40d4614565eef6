//! Invocation descriptor.
//!
//! An invocation names a target and a method plus JSON arguments. It is
//! stored verbatim in the `invocation` column and resolved back into a
//! concrete call by whatever invoker the outbox was built with.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What an entry runs when it is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Identity of the handler target (e.g. "payments").
    pub target: String,
    /// Method on the target (e.g. "charge").
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Trace context captured at schedule time and restored on execution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trace_context: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args: Vec::new(),
            trace_context: BTreeMap::new(),
        }
    }

    /// Append an argument, serializing it to JSON.
    pub fn with_arg<T: Serialize>(mut self, arg: T) -> serde_json::Result<Self> {
        self.args.push(serde_json::to_value(arg)?);
        Ok(self)
    }

    /// Replace all arguments with pre-built JSON values.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_trace_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.trace_context = context;
        self
    }

    /// Decode the argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> serde_json::Result<T> {
        let value = self.args.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
