//! Scheduler types.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConditionError;

/// Handler invoked with the occurrence arguments when a hook fires.
pub type HandlerFn = dyn Fn(&[Value]) -> Result<(), String> + Send + Sync;

/// Predicate deciding whether a definition may be admitted to the engine.
pub type PredicateFn = dyn Fn(&TaskDefinition) -> Result<bool, ConditionError> + Send + Sync;

/// A named handler bound to a hook's dispatch.
///
/// Two callbacks are the same callback when their names match.
#[derive(Clone)]
pub struct Callback {
    name: String,
    handler: Arc<HandlerFn>,
}

impl Callback {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the handler.
    pub fn call(&self, args: &[Value]) -> Result<(), String> {
        (self.handler)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.name).finish()
    }
}

/// Optional activation predicate attached to a definition.
#[derive(Clone)]
pub struct Condition(Arc<PredicateFn>);

impl Condition {
    /// A predicate that ignores the definition.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |_| Ok(predicate())))
    }

    /// A predicate that inspects the definition being admitted.
    pub fn for_definition<F>(predicate: F) -> Self
    where
        F: Fn(&TaskDefinition) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |def| Ok(predicate(def))))
    }

    /// A predicate that can fault.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&TaskDefinition) -> Result<bool, ConditionError> + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub(crate) fn check(&self, def: &TaskDefinition) -> Result<bool, ConditionError> {
        (self.0)(def)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

/// A declared recurring task.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Short name, without the registry prefix.
    pub name: String,
    /// Namespaced hook key. Assigned by the registry on insertion.
    pub hook: String,
    /// Recurrence name, resolved through the engine's catalog.
    pub recurrence: String,
    /// Handler bound to the hook's dispatch.
    pub callback: Option<Callback>,
    /// Arguments passed to the handler at fire time.
    pub args: Vec<Value>,
    /// First run; `None` means "now" at scheduling time.
    pub first_run: Option<DateTime<Utc>>,
    /// Whether lifecycle events for this task are logged at info level.
    pub log: bool,
    /// Admission predicate; `None` always admits.
    pub condition: Option<Condition>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, recurrence: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            hook: name.clone(),
            name,
            recurrence: recurrence.into(),
            callback: None,
            args: Vec::new(),
            first_run: None,
            log: false,
            condition: None,
        }
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_first_run(mut self, at: DateTime<Utc>) -> Self {
        self.first_run = Some(at);
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// The instant a new series should start at.
    pub fn start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.first_run.unwrap_or(now)
    }

    pub fn callback_name(&self) -> Option<&str> {
        self.callback.as_ref().map(Callback::name)
    }
}

/// Longest interval a recurrence may have (about ten years).
pub const MAX_INTERVAL_SECS: u64 = 315_360_000;

/// A recurrence catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Interval length in seconds.
    pub seconds: u64,
    /// Human-readable label.
    pub label: String,
}

impl Recurrence {
    pub fn new(seconds: u64, label: impl Into<String>) -> Self {
        Self {
            seconds,
            label: label.into(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.seconds.min(MAX_INTERVAL_SECS) as i64)
    }
}

/// One pending firing of a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub hook: String,
    pub at: DateTime<Utc>,
    pub recurrence: String,
    pub args: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_defaults() {
        let def = TaskDefinition::new("digest", "daily");
        assert_eq!(def.name, "digest");
        assert_eq!(def.hook, "digest");
        assert_eq!(def.recurrence, "daily");
        assert!(def.callback.is_none());
        assert!(def.args.is_empty());
        assert!(def.first_run.is_none());
        assert!(!def.log);
        assert!(def.condition.is_none());
    }

    #[test]
    fn test_start_at_prefers_first_run() {
        let now = Utc::now();
        let later = now + Duration::hours(3);

        let def = TaskDefinition::new("digest", "daily");
        assert_eq!(def.start_at(now), now);

        let def = def.with_first_run(later);
        assert_eq!(def.start_at(now), later);
    }

    #[test]
    fn test_callback_invocation_and_name() {
        let cb = Callback::new("send_digest", |args| {
            if args.is_empty() {
                Err("no recipients".to_string())
            } else {
                Ok(())
            }
        });
        assert_eq!(cb.name(), "send_digest");
        assert!(cb.call(&[json!("ops@example.com")]).is_ok());
        assert_eq!(cb.call(&[]), Err("no recipients".to_string()));

        let def = TaskDefinition::new("digest", "daily").with_callback(cb);
        assert_eq!(def.callback_name(), Some("send_digest"));
    }

    #[test]
    fn test_condition_variants() {
        let def = TaskDefinition::new("alert", "hourly").with_args(vec![json!(3)]);

        assert_eq!(Condition::new(|| false).check(&def), Ok(false));
        assert_eq!(
            Condition::for_definition(|d| d.args.len() == 1).check(&def),
            Ok(true)
        );
        assert_eq!(
            Condition::fallible(|_| Err(ConditionError::new("boom"))).check(&def),
            Err(ConditionError::new("boom"))
        );
    }

    #[test]
    fn test_recurrence_interval() {
        let hourly = Recurrence::new(3600, "Once Hourly");
        assert_eq!(hourly.interval().num_seconds(), 3600);
    }
}
