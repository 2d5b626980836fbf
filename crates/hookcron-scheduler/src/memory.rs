//! In-process trigger engine.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::catalog::RecurrenceCatalog;
use crate::engine::TriggerEngine;
use crate::error::EngineError;
use crate::types::{Callback, Occurrence, Recurrence};

/// Minimum sleep duration between firing passes.
const MIN_SLEEP_SECS: u64 = 1;

/// Maximum sleep duration between firing passes.
const MAX_SLEEP_SECS: u64 = 60;

/// Result of firing one occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    pub hook: String,
    pub at: DateTime<Utc>,
    /// Name of the callback that ran, if one was bound.
    pub callback: Option<String>,
    /// Error returned by the callback.
    pub error: Option<String>,
    /// When the series fires next, if it was re-armed.
    pub next: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct EngineState {
    pending: BTreeMap<String, BTreeMap<DateTime<Utc>, Occurrence>>,
    handlers: HashMap<String, Callback>,
}

/// A [`TriggerEngine`] that keeps everything in memory.
#[derive(Default)]
pub struct MemoryEngine {
    state: RwLock<EngineState>,
    catalog: Mutex<RecurrenceCatalog>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// All pending occurrences of `hook`, earliest first.
    pub async fn pending(&self, hook: &str) -> Vec<Occurrence> {
        self.state
            .read()
            .await
            .pending
            .get(hook)
            .map(|series| series.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of pending occurrences of `hook`.
    pub async fn pending_count(&self, hook: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .get(hook)
            .map_or(0, BTreeMap::len)
    }

    /// Every pending occurrence, ordered by time.
    pub async fn all_pending(&self) -> Vec<Occurrence> {
        let state = self.state.read().await;
        let mut all: Vec<Occurrence> = state
            .pending
            .values()
            .flat_map(|series| series.values().cloned())
            .collect();
        all.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.hook.cmp(&b.hook)));
        all
    }

    /// Name of the callback bound to `hook`.
    pub async fn bound_callback(&self, hook: &str) -> Option<String> {
        self.state
            .read()
            .await
            .handlers
            .get(hook)
            .map(|cb| cb.name().to_string())
    }

    /// Fire every occurrence due at `now`, earliest first.
    ///
    /// Each fired series is re-armed at its next instant after `now`.
    /// Callback failures are logged and do not stop the pass.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Vec<Fired> {
        let mut due: Vec<(Occurrence, Option<Callback>, Option<DateTime<Utc>>)> = Vec::new();

        {
            let mut catalog = self.catalog.lock().await;
            let mut state = self.state.write().await;

            let mut taken = Vec::new();
            for series in state.pending.values_mut() {
                let keys: Vec<_> = series.range(..=now).map(|(at, _)| *at).collect();
                for at in keys {
                    if let Some(occurrence) = series.remove(&at) {
                        taken.push(occurrence);
                    }
                }
            }
            state.pending.retain(|_, series| !series.is_empty());
            taken.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.hook.cmp(&b.hook)));

            for occurrence in taken {
                let next = match catalog.get(&occurrence.recurrence) {
                    Some(recurrence) => Some(next_after(occurrence.at, &recurrence, now)),
                    None => {
                        warn!(
                            hook = %occurrence.hook,
                            recurrence = %occurrence.recurrence,
                            "recurrence no longer known, series not re-armed"
                        );
                        None
                    }
                };
                if let Some(next) = next {
                    let rearmed = Occurrence {
                        at: next,
                        ..occurrence.clone()
                    };
                    state
                        .pending
                        .entry(occurrence.hook.clone())
                        .or_default()
                        .entry(next)
                        .or_insert(rearmed);
                }
                let handler = state.handlers.get(&occurrence.hook).cloned();
                due.push((occurrence, handler, next));
            }
        }

        let mut fired = Vec::with_capacity(due.len());
        for (occurrence, handler, next) in due {
            let error = match &handler {
                Some(callback) => match callback.call(&occurrence.args) {
                    Ok(()) => {
                        debug!(hook = %occurrence.hook, callback = callback.name(), "hook fired");
                        None
                    }
                    Err(error) => {
                        warn!(
                            hook = %occurrence.hook,
                            callback = callback.name(),
                            error = %error,
                            "hook callback failed"
                        );
                        Some(error)
                    }
                },
                None => {
                    debug!(hook = %occurrence.hook, "hook fired with no callback bound");
                    None
                }
            };
            fired.push(Fired {
                hook: occurrence.hook,
                at: occurrence.at,
                callback: handler.map(|cb| cb.name().to_string()),
                error,
                next,
            });
        }
        fired
    }

    /// Calculate how long to sleep until the next occurrence is due.
    pub async fn calculate_sleep_duration(&self, now: DateTime<Utc>) -> std::time::Duration {
        let next_due = self
            .state
            .read()
            .await
            .pending
            .values()
            .filter_map(|series| series.keys().next().copied())
            .min();

        let secs = match next_due {
            Some(next) => {
                let diff = (next - now).num_seconds();
                (diff.max(MIN_SLEEP_SECS as i64) as u64).min(MAX_SLEEP_SECS)
            }
            None => MAX_SLEEP_SECS,
        };

        std::time::Duration::from_secs(secs)
    }

    /// Run the firing loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("trigger engine starting");

        loop {
            if *shutdown_rx.borrow() {
                info!("trigger engine shutting down");
                break;
            }

            let fired = self.run_due(Utc::now()).await;
            if !fired.is_empty() {
                debug!(count = fired.len(), "firing pass complete");
            }

            let sleep_duration = self.calculate_sleep_duration(Utc::now()).await;

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("trigger engine received shutdown signal");
                    }
                }
                _ = sleep(sleep_duration) => {}
            }
        }

        info!("trigger engine shut down gracefully");
    }
}

/// First instant of the series strictly after `now`.
fn next_after(at: DateTime<Utc>, recurrence: &Recurrence, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = recurrence.interval().num_seconds().max(1);
    let mut next = at + Duration::seconds(step);
    if next <= now {
        let behind = (now - next).num_seconds() / step;
        next += Duration::seconds(step * (behind + 1));
    }
    next
}

#[async_trait]
impl TriggerEngine for MemoryEngine {
    async fn schedule_occurrence(
        &self,
        hook: &str,
        recurrence: &str,
        first_run: DateTime<Utc>,
        args: &[Value],
    ) -> Result<(), EngineError> {
        if self.catalog.lock().await.get(recurrence).is_none() {
            return Err(EngineError::UnknownRecurrence(recurrence.to_string()));
        }

        let mut state = self.state.write().await;
        state
            .pending
            .entry(hook.to_string())
            .or_default()
            .entry(first_run)
            .or_insert_with(|| Occurrence {
                hook: hook.to_string(),
                at: first_run,
                recurrence: recurrence.to_string(),
                args: args.to_vec(),
            });
        Ok(())
    }

    async fn next_occurrence(&self, hook: &str) -> Result<Option<DateTime<Utc>>, EngineError> {
        Ok(self
            .state
            .read()
            .await
            .pending
            .get(hook)
            .and_then(|series| series.keys().next().copied()))
    }

    async fn unschedule_occurrence(
        &self,
        at: DateTime<Utc>,
        hook: &str,
    ) -> Result<bool, EngineError> {
        let mut state = self.state.write().await;
        let Some(series) = state.pending.get_mut(hook) else {
            return Ok(false);
        };
        let removed = series.remove(&at).is_some();
        if series.is_empty() {
            state.pending.remove(hook);
        }
        Ok(removed)
    }

    async fn bind_dispatch(&self, hook: &str, callback: Callback) -> Result<(), EngineError> {
        self.state
            .write()
            .await
            .handlers
            .insert(hook.to_string(), callback);
        Ok(())
    }

    async fn extend_recurrence_catalog(
        &self,
        name: &str,
        seconds: u64,
        label: &str,
    ) -> Result<(), EngineError> {
        self.catalog
            .lock()
            .await
            .extend(name, Recurrence::new(seconds, label))
    }

    async fn recurrence(&self, name: &str) -> Result<Option<Recurrence>, EngineError> {
        Ok(self.catalog.lock().await.get(name))
    }
}
