//! The trigger engine contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EngineError;
use crate::types::{Callback, Recurrence};

/// A time-based trigger engine holding pending occurrences per hook.
///
/// The engine decides when and where a due occurrence's bound callback runs.
/// Callers only create, remove and query occurrences.
#[async_trait]
pub trait TriggerEngine: Send + Sync {
    /// Register a recurring series starting at `first_run`.
    ///
    /// Scheduling the same hook at an instant it is already pending at is a no-op.
    async fn schedule_occurrence(
        &self,
        hook: &str,
        recurrence: &str,
        first_run: DateTime<Utc>,
        args: &[Value],
    ) -> Result<(), EngineError>;

    /// Earliest pending occurrence of `hook`, if any.
    async fn next_occurrence(&self, hook: &str) -> Result<Option<DateTime<Utc>>, EngineError>;

    /// Remove the occurrence of `hook` pending at `at`.
    ///
    /// Returns `false` if nothing was pending at that instant.
    async fn unschedule_occurrence(
        &self,
        at: DateTime<Utc>,
        hook: &str,
    ) -> Result<bool, EngineError>;

    /// Bind the handler invoked when `hook` fires. The latest bind wins.
    async fn bind_dispatch(&self, hook: &str, callback: Callback) -> Result<(), EngineError>;

    /// Add a recurrence unless one with the same name exists.
    async fn extend_recurrence_catalog(
        &self,
        name: &str,
        seconds: u64,
        label: &str,
    ) -> Result<(), EngineError>;

    /// Resolve a recurrence name.
    async fn recurrence(&self, name: &str) -> Result<Option<Recurrence>, EngineError>;
}
