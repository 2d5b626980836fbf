//! Error types for the scheduler.

use thiserror::Error;

/// Errors reported by a [`TriggerEngine`](crate::TriggerEngine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The recurrence name is not present in the engine's catalog.
    #[error("unknown recurrence: {0}")]
    UnknownRecurrence(String),

    /// A catalog entry was given an interval of zero or beyond the supported maximum.
    #[error("invalid interval for recurrence {name}: {seconds}s")]
    InvalidInterval { name: String, seconds: u64 },

    /// The engine could not be reached or refused the call.
    #[error("trigger engine unavailable: {0}")]
    Unavailable(String),
}

/// A fault raised while evaluating a condition predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConditionError(pub String);

impl ConditionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Trigger engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A condition predicate faulted. Aborts the enclosing batch.
    #[error("condition for {hook} failed: {source}")]
    Condition {
        hook: String,
        #[source]
        source: ConditionError,
    },

    /// Draining a hook hit the iteration cap before the engine ran dry.
    #[error("drain of {hook} exceeded {limit} iterations")]
    DrainLimit { hook: String, limit: usize },

    /// Invalid scheduler configuration.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}
