//! Resolving stored invocations into calls.

use crate::{OutboxError, OutboxResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use txno_core::Invocation;
use txno_database::{DatabaseError, Transaction};

/// Failure raised by scheduled work.
#[derive(Error, Debug)]
pub enum InvocationError {
    /// The handler reported a failure
    #[error("{0}")]
    Failed(String),

    /// Nothing is registered for this target and method
    #[error("No handler registered for {target}.{method}")]
    NoHandler { target: String, method: String },

    /// Arguments could not be decoded
    #[error("Invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// The handler's own database work failed
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl InvocationError {
    pub fn failed(message: impl Into<String>) -> Self {
        InvocationError::Failed(message.into())
    }
}

/// Result of running one invocation.
pub type InvocationResult = Result<Value, InvocationError>;

/// Runs a stored invocation.
///
/// The handler runs inside the transaction that claimed the entry, so any
/// writes it makes commit together with the entry's completion and roll back
/// if it fails.
pub trait Invoker: Send + Sync {
    fn invoke(&self, invocation: &Invocation, tx: &dyn Transaction) -> InvocationResult;
}

/// A registered handler.
pub type Handler = Arc<dyn Fn(&Invocation, &dyn Transaction) -> InvocationResult + Send + Sync>;

/// Invoker that dispatches on `(target, method)`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `target.method`.
    pub fn register<F>(
        &mut self,
        target: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> OutboxResult<()>
    where
        F: Fn(&Invocation, &dyn Transaction) -> InvocationResult + Send + Sync + 'static,
    {
        let key = (target.into(), method.into());
        if self.handlers.contains_key(&key) {
            return Err(OutboxError::HandlerAlreadyRegistered(format!(
                "{}.{}",
                key.0, key.1
            )));
        }
        self.handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    pub fn contains(&self, target: &str, method: &str) -> bool {
        self.handlers
            .contains_key(&(target.to_string(), method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Invoker for HandlerRegistry {
    fn invoke(&self, invocation: &Invocation, tx: &dyn Transaction) -> InvocationResult {
        let key = (invocation.target.clone(), invocation.method.clone());
        match self.handlers.get(&key) {
            Some(handler) => handler(invocation, tx),
            None => Err(InvocationError::NoHandler {
                target: key.0,
                method: key.1,
            }),
        }
    }
}
