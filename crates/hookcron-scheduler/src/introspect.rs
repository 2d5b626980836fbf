//! Read-only queries over the registry and the engine's live state.
//!
//! Every query scans the registry and asks the engine about each hook at
//! call time. Nothing is cached, so two consecutive queries can disagree if
//! the engine fired or was modified in between.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::engine::TriggerEngine;
use crate::error::SchedulerError;
use crate::scheduler::Scheduler;
use crate::types::TaskDefinition;

/// Registry keys split by whether the engine has anything pending for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub scheduled: Vec<String>,
    pub unscheduled: Vec<String>,
}

impl<E: TriggerEngine + ?Sized> Scheduler<E> {
    /// Next pending occurrence of every distinct hook, in registration order.
    async fn next_runs(&self) -> Result<Vec<(String, Option<DateTime<Utc>>)>, SchedulerError> {
        let mut runs = Vec::new();
        for hook in self.registry().keys() {
            let next = self.engine().next_occurrence(&hook).await?;
            runs.push((hook, next));
        }
        Ok(runs)
    }

    /// Hooks whose next occurrence satisfies `keep`.
    async fn hooks_where<F>(&self, keep: F) -> Result<Vec<String>, SchedulerError>
    where
        F: Fn(DateTime<Utc>) -> bool,
    {
        Ok(self
            .next_runs()
            .await?
            .into_iter()
            .filter_map(|(hook, next)| next.filter(|at| keep(*at)).map(|_| hook))
            .collect())
    }

    /// Split every registry key into scheduled and unscheduled.
    pub async fn partition(&self) -> Result<Partition, SchedulerError> {
        let mut partition = Partition::default();
        for (hook, next) in self.next_runs().await? {
            match next {
                Some(_) => partition.scheduled.push(hook),
                None => partition.unscheduled.push(hook),
            }
        }
        Ok(partition)
    }

    pub async fn scheduled_hooks(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.partition().await?.scheduled)
    }

    pub async fn unscheduled_hooks(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.partition().await?.unscheduled)
    }

    pub async fn is_scheduled(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(self.next_run(name).await?.is_some())
    }

    /// Next pending occurrence of the hook, registered or not.
    pub async fn next_run(&self, name: &str) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let hook = self.registry().hook_name(name);
        Ok(self.engine().next_occurrence(&hook).await?)
    }

    pub async fn count_scheduled(&self) -> Result<usize, SchedulerError> {
        Ok(self.partition().await?.scheduled.len())
    }

    pub async fn count_unscheduled(&self) -> Result<usize, SchedulerError> {
        Ok(self.partition().await?.unscheduled.len())
    }

    /// True if every registered hook is scheduled. Vacuously true when empty.
    pub async fn all_scheduled(&self) -> Result<bool, SchedulerError> {
        Ok(self.partition().await?.unscheduled.is_empty())
    }

    pub async fn any_scheduled(&self) -> Result<bool, SchedulerError> {
        Ok(!self.partition().await?.scheduled.is_empty())
    }

    /// Earliest next occurrence across all registered hooks.
    pub async fn earliest_next_run(&self) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        Ok(self.next_runs().await?.into_iter().filter_map(|(_, next)| next).min())
    }

    /// Latest next occurrence across all registered hooks.
    pub async fn latest_next_run(&self) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        Ok(self.next_runs().await?.into_iter().filter_map(|(_, next)| next).max())
    }

    /// Hooks whose next occurrence falls within `start..=end`.
    pub async fn hooks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, SchedulerError> {
        self.hooks_where(|at| at >= start && at <= end).await
    }

    /// Hooks whose next occurrence is strictly before `at`.
    pub async fn hooks_before(&self, at: DateTime<Utc>) -> Result<Vec<String>, SchedulerError> {
        self.hooks_where(|next| next < at).await
    }

    /// Hooks whose next occurrence is strictly after `at`.
    pub async fn hooks_after(&self, at: DateTime<Utc>) -> Result<Vec<String>, SchedulerError> {
        self.hooks_where(|next| next > at).await
    }

    // Registry-only filters. These never touch the engine.

    pub fn hooks_by_recurrence(&self, recurrence: &str) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.recurrence == recurrence)
    }

    /// Definitions whose arguments contain `value` at any position.
    pub fn hooks_by_arg(&self, value: &Value) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.args.contains(value))
    }

    /// Definitions whose argument at `index` equals `value`.
    pub fn hooks_by_arg_at(&self, index: usize, value: &Value) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.args.get(index) == Some(value))
    }

    pub fn hooks_with_condition(&self) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.condition.is_some())
    }

    pub fn hooks_with_logging(&self) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.log)
    }

    pub fn hooks_by_callback(&self, callback: &str) -> Vec<&TaskDefinition> {
        self.registry().filter(|d| d.callback_name() == Some(callback))
    }

    /// True if the first definition under `name` has exactly these arguments, in order.
    pub fn has_args(&self, name: &str, args: &[Value]) -> bool {
        self.find(name).is_some_and(|d| d.args == args)
    }
}
