//! Stateful property testing for scheduler reconciliation.
//!
//! Uses proptest-state-machine to drive random sequences of scheduling
//! operations against a Scheduler backed by MemoryEngine. The reference
//! model tracks:
//!
//! - Pending occurrences per hook (instant -> recurrence)
//! - The admission gate consulted by one hook's condition
//! - Duplicate series injected behind the scheduler's back (racing writers)

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use tokio::runtime::Runtime;

use hookcron_scheduler::{
    Condition, MemoryEngine, Scheduler, SchedulerConfig, TaskDefinition, TriggerEngine,
};

const PREFIX: &str = "sm";

/// (short name, stored recurrence, first run offset, gated by condition)
const HOOKS: [(&str, &str, i64, bool); 3] = [
    ("digest", "daily", 0, false),
    ("alert", "hourly", 30, true),
    ("cleanup", "weekly", 60, false),
];

const RECURRENCES: [&str; 3] = ["hourly", "daily", "weekly"];

fn at(offset: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(2_000_000_000 + offset, 0).unwrap()
}

fn hook_key(index: usize) -> String {
    format!("{}_{}", PREFIX, HOOKS[index].0)
}

/// Operations that can be performed against the scheduler.
#[derive(Debug, Clone)]
pub enum ReconcileOperation {
    /// Schedule every admitted hook without a pending occurrence.
    ScheduleAll,
    /// Schedule every hook without a pending occurrence, ignoring conditions.
    ScheduleMissed,
    /// Schedule one hook, honoring its condition.
    Schedule { hook: usize },
    /// Drain a hook.
    Unschedule { hook: usize },
    /// Drain a hook and create one series.
    Reschedule {
        hook: usize,
        recurrence: Option<usize>,
        start: i64,
    },
    /// Add an occurrence directly through the engine (a racing writer).
    Inject {
        hook: usize,
        offset: i64,
        recurrence: usize,
    },
    /// Flip the gate consulted by the gated hook's condition.
    SetGate { open: bool },
}

/// Reference model for engine state as seen through the scheduler.
#[derive(Clone, Debug, Default)]
pub struct ReconcileModel {
    /// Pending occurrences per hook index.
    pub pending: [BTreeMap<i64, String>; 3],
    /// Whether the gated hook's condition admits it.
    pub gate_open: bool,
}

impl ReconcileModel {
    fn admit(&mut self, index: usize, ignore_condition: bool) {
        let (_, recurrence, offset, gated) = HOOKS[index];
        if gated && !ignore_condition && !self.gate_open {
            return;
        }
        if self.pending[index].is_empty() {
            self.pending[index].insert(offset, recurrence.to_string());
        }
    }
}

impl ReferenceStateMachine for ReconcileModel {
    type State = Self;
    type Transition = ReconcileOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        any::<bool>()
            .prop_map(|gate_open| Self {
                gate_open,
                ..Self::default()
            })
            .boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => Just(ReconcileOperation::ScheduleAll),
            1 => Just(ReconcileOperation::ScheduleMissed),
            2 => (0usize..3).prop_map(|hook| ReconcileOperation::Schedule { hook }),
            2 => (0usize..3).prop_map(|hook| ReconcileOperation::Unschedule { hook }),
            2 => (0usize..3, prop::option::of(0usize..3), 0i64..500).prop_map(
                |(hook, recurrence, start)| ReconcileOperation::Reschedule { hook, recurrence, start }
            ),
            2 => (0usize..3, 0i64..500, 0usize..3).prop_map(|(hook, offset, recurrence)| {
                ReconcileOperation::Inject { hook, offset, recurrence }
            }),
            1 => any::<bool>().prop_map(|open| ReconcileOperation::SetGate { open }),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            ReconcileOperation::ScheduleAll => {
                for index in 0..HOOKS.len() {
                    state.admit(index, false);
                }
            }
            ReconcileOperation::ScheduleMissed => {
                for index in 0..HOOKS.len() {
                    state.admit(index, true);
                }
            }
            ReconcileOperation::Schedule { hook } => state.admit(*hook, false),
            ReconcileOperation::Unschedule { hook } => state.pending[*hook].clear(),
            ReconcileOperation::Reschedule {
                hook,
                recurrence,
                start,
            } => {
                let recurrence = recurrence
                    .map(|r| RECURRENCES[r])
                    .unwrap_or(HOOKS[*hook].1);
                state.pending[*hook].clear();
                state.pending[*hook].insert(*start, recurrence.to_string());
            }
            ReconcileOperation::Inject {
                hook,
                offset,
                recurrence,
            } => {
                state.pending[*hook]
                    .entry(*offset)
                    .or_insert_with(|| RECURRENCES[*recurrence].to_string());
            }
            ReconcileOperation::SetGate { open } => state.gate_open = *open,
        }
        state
    }
}

/// Test harness wrapping a real Scheduler with a tokio runtime.
pub struct ReconcileHarness {
    runtime: Runtime,
    scheduler: Scheduler<MemoryEngine>,
    gate: Arc<AtomicBool>,
}

impl ReconcileHarness {
    fn new(gate_open: bool) -> Self {
        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let gate = Arc::new(AtomicBool::new(gate_open));
        let mut scheduler = Scheduler::new(
            Arc::new(MemoryEngine::new()),
            SchedulerConfig::with_prefix(PREFIX),
        )
        .expect("valid config");

        runtime.block_on(async {
            for (name, recurrence, offset, gated) in HOOKS {
                let mut def = TaskDefinition::new(name, recurrence).with_first_run(at(offset));
                if gated {
                    let gate = gate.clone();
                    def = def.with_condition(Condition::new(move || gate.load(Ordering::SeqCst)));
                }
                scheduler.register(def).await.expect("register hook");
            }
        });

        Self {
            runtime,
            scheduler,
            gate,
        }
    }

    fn apply_operation(&self, op: &ReconcileOperation) {
        self.runtime.block_on(async {
            match op {
                ReconcileOperation::ScheduleAll => {
                    self.scheduler.schedule_all().await.expect("schedule_all");
                }
                ReconcileOperation::ScheduleMissed => {
                    self.scheduler.schedule_missed().await.expect("schedule_missed");
                }
                ReconcileOperation::Schedule { hook } => {
                    self.scheduler
                        .schedule(HOOKS[*hook].0)
                        .await
                        .expect("schedule");
                }
                ReconcileOperation::Unschedule { hook } => {
                    self.scheduler
                        .unschedule(HOOKS[*hook].0)
                        .await
                        .expect("unschedule");
                }
                ReconcileOperation::Reschedule {
                    hook,
                    recurrence,
                    start,
                } => {
                    let rescheduled = self
                        .scheduler
                        .reschedule(
                            HOOKS[*hook].0,
                            recurrence.map(|r| RECURRENCES[r]),
                            Some(at(*start)),
                        )
                        .await
                        .expect("reschedule");
                    assert!(rescheduled, "registered hook must reschedule");
                }
                ReconcileOperation::Inject {
                    hook,
                    offset,
                    recurrence,
                } => {
                    self.scheduler
                        .engine()
                        .schedule_occurrence(&hook_key(*hook), RECURRENCES[*recurrence], at(*offset), &[])
                        .await
                        .expect("inject occurrence");
                }
                ReconcileOperation::SetGate { open } => {
                    self.gate.store(*open, Ordering::SeqCst);
                }
            }
        });
    }

    fn verify_invariants(&self, model: &ReconcileModel) {
        self.runtime.block_on(async {
            // Invariant 1: pending occurrences match the model exactly
            for (index, expected) in model.pending.iter().enumerate() {
                let actual: BTreeMap<i64, String> = self
                    .scheduler
                    .engine()
                    .pending(&hook_key(index))
                    .await
                    .into_iter()
                    .map(|o| (o.at.timestamp() - at(0).timestamp(), o.recurrence))
                    .collect();
                assert_eq!(
                    &actual, expected,
                    "pending mismatch for {}: actual {:?} vs model {:?}",
                    HOOKS[index].0, actual, expected
                );
            }

            // Invariant 2: partition covers every hook exactly once
            let partition = self.scheduler.partition().await.expect("partition");
            assert_eq!(
                partition.scheduled.len() + partition.unscheduled.len(),
                HOOKS.len()
            );
            for (index, expected) in model.pending.iter().enumerate() {
                let key = hook_key(index);
                assert_eq!(
                    partition.scheduled.contains(&key),
                    !expected.is_empty(),
                    "partition disagrees for {}",
                    key
                );
            }

            // Invariant 3: earliest next run is the minimum over the model
            let expected_earliest = model
                .pending
                .iter()
                .filter_map(|series| series.keys().next().copied())
                .min()
                .map(at);
            assert_eq!(
                self.scheduler.earliest_next_run().await.expect("earliest"),
                expected_earliest
            );
        });
    }
}

impl StateMachineTest for ReconcileHarness {
    type SystemUnderTest = Self;
    type Reference = ReconcileModel;

    fn init_test(
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self::new(ref_state.gate_open)
    }

    fn apply(
        state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        state.apply_operation(&transition);
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        // Use fewer cases for CI, increase with PROPTEST_CASES env var
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn reconcile_state_machine_test(sequential 1..40 => ReconcileHarness);
}

// Additional targeted scenarios

#[tokio::test]
async fn test_digest_scenario() {
    let mut scheduler =
        Scheduler::new(Arc::new(MemoryEngine::new()), SchedulerConfig::default()).unwrap();
    scheduler
        .register(TaskDefinition::new("digest", "daily"))
        .await
        .unwrap();

    scheduler.schedule_all().await.unwrap();
    let pending = scheduler.engine().pending("digest").await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recurrence, "daily");

    scheduler.schedule_all().await.unwrap();
    assert_eq!(scheduler.engine().pending_count("digest").await, 1);
}

#[tokio::test]
async fn test_alert_scenario() {
    let mut scheduler =
        Scheduler::new(Arc::new(MemoryEngine::new()), SchedulerConfig::default()).unwrap();
    scheduler
        .register(TaskDefinition::new("alert", "hourly").with_condition(Condition::new(|| false)))
        .await
        .unwrap();

    scheduler.schedule_all().await.unwrap();
    assert_eq!(scheduler.engine().pending_count("alert").await, 0);
}

#[tokio::test]
async fn test_shared_recurrence_scenario() {
    let mut scheduler =
        Scheduler::new(Arc::new(MemoryEngine::new()), SchedulerConfig::default()).unwrap();
    scheduler
        .register(TaskDefinition::new("first", "hourly"))
        .await
        .unwrap();
    scheduler
        .register(TaskDefinition::new("middle", "daily"))
        .await
        .unwrap();
    scheduler
        .register(TaskDefinition::new("second", "hourly"))
        .await
        .unwrap();

    let hourly: Vec<_> = scheduler
        .hooks_by_recurrence("hourly")
        .into_iter()
        .map(|d| d.hook.clone())
        .collect();
    assert_eq!(hourly, vec!["first".to_string(), "second".to_string()]);
}
