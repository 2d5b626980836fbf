//! Admission conditions.

use tracing::trace;

use crate::error::SchedulerError;
use crate::types::{Condition, TaskDefinition};

/// Evaluates admission predicates.
///
/// Results are never cached: every call re-runs the predicate. A faulting
/// predicate is returned as [`SchedulerError::Condition`] so the caller's
/// batch stops at that definition.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluate the definition's own condition. No condition admits.
    pub fn admits(def: &TaskDefinition) -> Result<bool, SchedulerError> {
        match &def.condition {
            Some(condition) => Self::check(condition, def),
            None => Ok(true),
        }
    }

    /// Evaluate an external condition against a definition.
    pub fn check(condition: &Condition, def: &TaskDefinition) -> Result<bool, SchedulerError> {
        let admitted = condition
            .check(def)
            .map_err(|source| SchedulerError::Condition {
                hook: def.hook.clone(),
                source,
            })?;
        trace!(hook = %def.hook, admitted, "evaluated condition");
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConditionError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_no_condition_admits() {
        let def = TaskDefinition::new("digest", "daily");
        assert!(ConditionEvaluator::admits(&def).unwrap());
    }

    #[test]
    fn test_condition_re_evaluated_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let def = TaskDefinition::new("digest", "daily").with_condition(Condition::new(move || {
            counter.fetch_add(1, Ordering::SeqCst) % 2 == 0
        }));

        assert!(ConditionEvaluator::admits(&def).unwrap());
        assert!(!ConditionEvaluator::admits(&def).unwrap());
        assert!(ConditionEvaluator::admits(&def).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fault_carries_hook() {
        let mut def = TaskDefinition::new("alert", "hourly")
            .with_condition(Condition::fallible(|_| Err(ConditionError::new("db down"))));
        def.hook = "shop_alert".to_string();

        match ConditionEvaluator::admits(&def) {
            Err(SchedulerError::Condition { hook, source }) => {
                assert_eq!(hook, "shop_alert");
                assert_eq!(source.to_string(), "db down");
            }
            other => panic!("expected condition fault, got {:?}", other),
        }
    }
}
