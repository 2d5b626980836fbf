//! Reconciliation of declared tasks against the trigger engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::IntervalCatalog;
use crate::condition::ConditionEvaluator;
use crate::config::SchedulerConfig;
use crate::engine::TriggerEngine;
use crate::error::{EngineError, SchedulerError};
use crate::registry::Registry;
use crate::types::{Callback, Condition, TaskDefinition};

/// Keeps a trigger engine's pending occurrences in line with a [`Registry`].
///
/// Nothing here locks the engine. Two schedulers reconciling against the
/// same engine at once can both see a hook as unscheduled and both add a
/// series; serialize reconciliation passes externally if that matters.
pub struct Scheduler<E: TriggerEngine + ?Sized> {
    engine: Arc<E>,
    registry: Registry,
    drain_limit: usize,
}

/// Emit a lifecycle event at info level if the definition asks for logging.
fn lifecycle(def: &TaskDefinition, event: &str, at: Option<DateTime<Utc>>) {
    if def.log {
        info!(hook = %def.hook, recurrence = %def.recurrence, at = ?at, "{}", event);
    } else {
        debug!(hook = %def.hook, recurrence = %def.recurrence, at = ?at, "{}", event);
    }
}

impl<E: TriggerEngine + ?Sized> Scheduler<E> {
    /// Create a scheduler with an empty registry.
    pub fn new(engine: Arc<E>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            registry: Registry::new(&config),
            drain_limit: config.drain_limit,
            engine,
        })
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Direct registry access. Changes made here are not pushed to the engine.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Recurrence vocabulary of the engine.
    pub fn intervals(&self) -> IntervalCatalog<'_, E> {
        IntervalCatalog::new(self.engine.as_ref())
    }

    /// First definition registered under `name`.
    pub fn find(&self, name: &str) -> Option<&TaskDefinition> {
        self.registry.find(name)
    }

    /// Register a definition and return its hook key.
    ///
    /// The recurrence must be known to the engine. A callback is bound to the
    /// engine's dispatch right away, whether or not the hook is scheduled.
    /// Nothing is registered if either step fails.
    pub async fn register(&mut self, def: TaskDefinition) -> Result<String, SchedulerError> {
        if self.engine.recurrence(&def.recurrence).await?.is_none() {
            return Err(EngineError::UnknownRecurrence(def.recurrence).into());
        }
        let hook = self.registry.hook_name(&def.name);
        if let Some(callback) = def.callback.clone() {
            self.engine.bind_dispatch(&hook, callback).await?;
        }
        let def = self.registry.push(def);
        lifecycle(def, "registered hook", def.first_run);
        Ok(hook)
    }

    /// Remove every definition registered under `name`. The engine is untouched.
    pub fn clear(&mut self, name: &str) -> usize {
        self.registry.clear(name)
    }

    /// Drain the hook's pending occurrences and remove its definitions.
    ///
    /// Returns the number of occurrences removed.
    pub async fn purge(&mut self, name: &str) -> Result<usize, SchedulerError> {
        let drained = self.unschedule(name).await?;
        let cleared = self.registry.clear(name);
        info!(hook = %self.registry.hook_name(name), drained, cleared, "purged hook");
        Ok(drained)
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Create a series for `def` unless one is already pending.
    async fn admit(&self, def: &TaskDefinition, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        if self.engine.next_occurrence(&def.hook).await?.is_some() {
            return Ok(false);
        }
        let start = def.start_at(now);
        self.engine
            .schedule_occurrence(&def.hook, &def.recurrence, start, &def.args)
            .await?;
        lifecycle(def, "scheduled hook", Some(start));
        Ok(true)
    }

    /// Schedule every registered definition whose condition admits it.
    ///
    /// Returns the number of series created. A faulting condition aborts the
    /// pass; hooks scheduled before it stay scheduled.
    pub async fn schedule_all(&self) -> Result<usize, SchedulerError> {
        let now = Utc::now();
        let mut created = 0;
        for def in self.registry.iter() {
            if !ConditionEvaluator::admits(def)? {
                lifecycle(def, "condition declined hook", None);
                continue;
            }
            if self.admit(def, now).await? {
                created += 1;
            }
        }
        debug!(created, total = self.registry.len(), "schedule pass complete");
        Ok(created)
    }

    /// Schedule one hook, honoring its condition.
    pub async fn schedule(&self, name: &str) -> Result<bool, SchedulerError> {
        let Some(def) = self.registry.find(name) else {
            return Ok(false);
        };
        if !ConditionEvaluator::admits(def)? {
            lifecycle(def, "condition declined hook", None);
            return Ok(false);
        }
        self.admit(def, Utc::now()).await
    }

    /// Schedule one hook if `condition` admits it, in addition to its own condition.
    pub async fn schedule_if(&self, name: &str, condition: &Condition) -> Result<bool, SchedulerError> {
        let Some(def) = self.registry.find(name) else {
            return Ok(false);
        };
        if !ConditionEvaluator::check(condition, def)? {
            return Ok(false);
        }
        self.schedule(name).await
    }

    /// Schedule each named hook. Unknown names are skipped.
    pub async fn schedule_batch<I, S>(&self, names: I) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut created = 0;
        for name in names {
            if self.schedule(name.as_ref()).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Schedule each named hook that `condition` admits.
    ///
    /// The condition is evaluated once per hook against its definition.
    pub async fn schedule_batch_if<I, S>(
        &self,
        names: I,
        condition: &Condition,
    ) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut created = 0;
        for name in names {
            if self.schedule_if(name.as_ref(), condition).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Schedule every definition that has no pending occurrence, ignoring conditions.
    pub async fn schedule_missed(&self) -> Result<usize, SchedulerError> {
        let now = Utc::now();
        let mut created = 0;
        for def in self.registry.iter() {
            if self.admit(def, now).await? {
                created += 1;
            }
        }
        if created > 0 {
            info!(created, "scheduled missed hooks");
        }
        Ok(created)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove every pending occurrence of `hook`.
    async fn drain(&self, hook: &str) -> Result<usize, SchedulerError> {
        let mut removed = 0;
        while let Some(at) = self.engine.next_occurrence(hook).await? {
            if removed >= self.drain_limit {
                warn!(hook, limit = self.drain_limit, "drain limit reached");
                return Err(SchedulerError::DrainLimit {
                    hook: hook.to_string(),
                    limit: self.drain_limit,
                });
            }
            if !self.engine.unschedule_occurrence(at, hook).await? {
                return Err(EngineError::Unavailable(format!(
                    "{} reported pending at {} but could not be removed",
                    hook, at
                ))
                .into());
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove every pending occurrence of the hook, registered or not.
    ///
    /// Returns the number of occurrences removed. The registry is untouched.
    pub async fn unschedule(&self, name: &str) -> Result<usize, SchedulerError> {
        let hook = self.registry.hook_name(name);
        let removed = self.drain(&hook).await?;
        if removed > 0 {
            match self.registry.find(name) {
                Some(def) => lifecycle(def, "unscheduled hook", None),
                None => debug!(hook = %hook, removed, "unscheduled unregistered hook"),
            }
        }
        Ok(removed)
    }

    /// Unschedule each named hook.
    pub async fn unschedule_batch<I, S>(&self, names: I) -> Result<usize, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        for name in names {
            removed += self.unschedule(name.as_ref()).await?;
        }
        Ok(removed)
    }

    /// Drain the hook and create exactly one new series.
    ///
    /// `recurrence` and `first_run` override the stored values for this
    /// series only. Returns `false` if the hook is not registered.
    pub async fn reschedule(
        &self,
        name: &str,
        recurrence: Option<&str>,
        first_run: Option<DateTime<Utc>>,
    ) -> Result<bool, SchedulerError> {
        let Some(def) = self.registry.find(name) else {
            return Ok(false);
        };
        let recurrence = recurrence.unwrap_or(def.recurrence.as_str());
        if self.engine.recurrence(recurrence).await?.is_none() {
            return Err(EngineError::UnknownRecurrence(recurrence.to_string()).into());
        }

        let drained = self.drain(&def.hook).await?;
        let start = first_run.unwrap_or_else(|| def.start_at(Utc::now()));
        self.engine
            .schedule_occurrence(&def.hook, recurrence, start, &def.args)
            .await?;

        if def.log {
            info!(hook = %def.hook, recurrence, at = %start, drained, "rescheduled hook");
        } else {
            debug!(hook = %def.hook, recurrence, at = %start, drained, "rescheduled hook");
        }
        Ok(true)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Reschedule the hook with a new recurrence, then store it.
    ///
    /// The stored value is left alone if rescheduling fails.
    pub async fn update_recurrence(
        &mut self,
        name: &str,
        recurrence: impl Into<String>,
    ) -> Result<bool, SchedulerError> {
        let recurrence = recurrence.into();
        if !self.reschedule(name, Some(&recurrence), None).await? {
            return Ok(false);
        }
        if let Some(def) = self.registry.find_mut(name) {
            def.recurrence = recurrence;
        }
        Ok(true)
    }

    /// Reschedule the hook from a new first run, then store it.
    ///
    /// The stored value is left alone if rescheduling fails.
    pub async fn update_first_run(
        &mut self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        if !self.reschedule(name, None, Some(at)).await? {
            return Ok(false);
        }
        if let Some(def) = self.registry.find_mut(name) {
            def.first_run = Some(at);
        }
        Ok(true)
    }

    /// Replace the stored arguments. Pending occurrences keep theirs until rescheduled.
    pub fn update_args(&mut self, name: &str, args: Vec<Value>) -> bool {
        match self.registry.find_mut(name) {
            Some(def) => {
                def.args = args;
                lifecycle(def, "updated hook arguments", None);
                true
            }
            None => false,
        }
    }

    /// Replace the callback and rebind the hook's dispatch to it.
    pub async fn update_callback(
        &mut self,
        name: &str,
        callback: Callback,
    ) -> Result<bool, SchedulerError> {
        let Some(def) = self.registry.find_mut(name) else {
            return Ok(false);
        };
        def.callback = Some(callback.clone());
        let hook = def.hook.clone();
        self.engine.bind_dispatch(&hook, callback).await?;
        if let Some(def) = self.registry.find(name) {
            lifecycle(def, "rebound hook callback", None);
        }
        Ok(true)
    }

    pub fn update_log(&mut self, name: &str, log: bool) -> bool {
        match self.registry.find_mut(name) {
            Some(def) => {
                def.log = log;
                true
            }
            None => false,
        }
    }

    pub fn update_condition(&mut self, name: &str, condition: Option<Condition>) -> bool {
        match self.registry.find_mut(name) {
            Some(def) => {
                def.condition = condition;
                true
            }
            None => false,
        }
    }
}
