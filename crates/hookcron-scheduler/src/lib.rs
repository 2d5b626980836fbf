//! Recurring-task registry and trigger-engine reconciliation.
//!
//! This crate provides:
//! - A registry of named recurring task definitions under one namespace
//! - A scheduler that keeps a trigger engine's pending occurrences in line
//!   with those definitions (idempotent scheduling, conditional admission,
//!   batch operations, drain-then-recreate rescheduling)
//! - Read-only queries combining the registry with live engine state
//! - An in-memory trigger engine that fires bound callbacks when due

mod catalog;
mod condition;
mod config;
mod engine;
mod error;
mod introspect;
mod memory;
mod registry;
mod scheduler;
mod types;

pub use catalog::{BUILTIN_RECURRENCES, IntervalCatalog, RecurrenceCatalog};
pub use condition::ConditionEvaluator;
pub use config::{DEFAULT_DRAIN_LIMIT, DEFAULT_SEPARATOR, SchedulerConfig};
pub use engine::TriggerEngine;
pub use error::{ConditionError, EngineError, SchedulerError};
pub use introspect::Partition;
pub use memory::{Fired, MemoryEngine};
pub use registry::Registry;
pub use scheduler::Scheduler;
pub use types::{Callback, Condition, MAX_INTERVAL_SECS, Occurrence, Recurrence, TaskDefinition};
