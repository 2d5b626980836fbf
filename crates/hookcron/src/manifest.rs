//! Task manifests.
//!
//! A manifest is a JSON document declaring the scheduler configuration, any
//! extra recurrences, and the tasks to register:
//!
//! ```json
//! {
//!   "prefix": "shop",
//!   "intervals": [{ "name": "minutely", "seconds": 60, "label": "Every Minute" }],
//!   "tasks": [
//!     { "name": "digest", "recurrence": "daily", "args": ["ops@example.com"], "log": true },
//!     { "name": "alert", "recurrence": "minutely", "only_if_env": "SHOP_ALERTS" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use hookcron_scheduler::{Callback, Condition, MemoryEngine, Scheduler, SchedulerConfig, TaskDefinition};

/// A recurrence to add to the engine's catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalEntry {
    pub name: String,
    pub seconds: u64,
    pub label: String,
}

/// One task declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub name: String,
    pub recurrence: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub first_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log: bool,
    /// Only admit the task while this environment variable is set and non-empty.
    #[serde(default)]
    pub only_if_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(flatten)]
    pub config: SchedulerConfig,
    #[serde(default)]
    pub intervals: Vec<IntervalEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| miette::miette!("invalid manifest: {}", e))
    }

    /// Build a scheduler over a fresh in-memory engine with every task registered.
    ///
    /// Each task is bound to a callback that logs the arguments it fired with.
    pub async fn into_scheduler(self) -> Result<Scheduler<MemoryEngine>> {
        let mut scheduler = Scheduler::new(Arc::new(MemoryEngine::new()), self.config)
            .map_err(|e| miette::miette!("{}", e))?;

        for entry in &self.intervals {
            scheduler
                .intervals()
                .extend(&entry.name, entry.seconds, &entry.label)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
        }

        for task in self.tasks {
            let hook = scheduler.registry().hook_name(&task.name);
            let mut def = TaskDefinition::new(task.name, task.recurrence)
                .with_args(task.args)
                .with_log(task.log)
                .with_callback(log_callback(hook));
            if let Some(first_run) = task.first_run {
                def = def.with_first_run(first_run);
            }
            if let Some(var) = task.only_if_env {
                def = def.with_condition(env_condition(var));
            }
            scheduler
                .register(def)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
        }

        info!(tasks = scheduler.registry().len(), "loaded manifest");
        Ok(scheduler)
    }
}

fn log_callback(hook: String) -> Callback {
    Callback::new("log", move |args| {
        info!(hook = %hook, args = %serde_json::Value::from(args.to_vec()), "task fired");
        Ok(())
    })
}

fn env_condition(var: String) -> Condition {
    Condition::new(move || std::env::var(&var).is_ok_and(|v| !v.is_empty()))
}
