//! Recurrence vocabulary.
//!
//! The engine keeps a name -> [`Recurrence`] mapping that starts from the
//! built-in entries and is extended through transforms. Transforms run in
//! registration order when the mapping is materialized, so the first entry
//! registered for a name wins.

use std::collections::BTreeMap;

use tracing::debug;

use crate::engine::TriggerEngine;
use crate::error::{EngineError, SchedulerError};
use crate::types::{MAX_INTERVAL_SECS, Recurrence};

/// Built-in recurrences every catalog starts with.
pub const BUILTIN_RECURRENCES: [(&str, u64, &str); 4] = [
    ("hourly", 3_600, "Once Hourly"),
    ("twicedaily", 43_200, "Twice Daily"),
    ("daily", 86_400, "Once Daily"),
    ("weekly", 604_800, "Once Weekly"),
];

type CatalogTransform = Box<dyn Fn(&mut BTreeMap<String, Recurrence>) + Send + Sync>;

/// Lazily materialized recurrence mapping.
pub struct RecurrenceCatalog {
    transforms: Vec<CatalogTransform>,
    materialized: Option<BTreeMap<String, Recurrence>>,
}

impl Default for RecurrenceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecurrenceCatalog {
    /// Catalog holding only the built-in recurrences.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            materialized: None,
        }
    }

    /// Register a transform applied at materialization time.
    pub fn add_transform<F>(&mut self, transform: F)
    where
        F: Fn(&mut BTreeMap<String, Recurrence>) + Send + Sync + 'static,
    {
        self.transforms.push(Box::new(transform));
        self.materialized = None;
    }

    /// Add `name` unless an entry for it already exists.
    pub fn extend(&mut self, name: &str, recurrence: Recurrence) -> Result<(), EngineError> {
        if recurrence.seconds == 0 || recurrence.seconds > MAX_INTERVAL_SECS {
            return Err(EngineError::InvalidInterval {
                name: name.to_string(),
                seconds: recurrence.seconds,
            });
        }
        let name = name.to_string();
        self.add_transform(move |entries| {
            entries
                .entry(name.clone())
                .or_insert_with(|| recurrence.clone());
        });
        Ok(())
    }

    /// Look up a recurrence, materializing the mapping if needed.
    pub fn get(&mut self, name: &str) -> Option<Recurrence> {
        self.entries().get(name).cloned()
    }

    /// The full materialized mapping.
    pub fn entries(&mut self) -> &BTreeMap<String, Recurrence> {
        let transforms = &self.transforms;
        self.materialized.get_or_insert_with(|| {
            let mut entries: BTreeMap<String, Recurrence> = BUILTIN_RECURRENCES
                .iter()
                .map(|(name, seconds, label)| (name.to_string(), Recurrence::new(*seconds, *label)))
                .collect();
            for transform in transforms {
                transform(&mut entries);
            }
            debug!(count = entries.len(), "materialized recurrence catalog");
            entries
        })
    }
}

/// Extends the recurrence vocabulary of an engine.
pub struct IntervalCatalog<'a, E: ?Sized> {
    engine: &'a E,
}

impl<'a, E: TriggerEngine + ?Sized> IntervalCatalog<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Add a recurrence. Ignored by the engine if the name is already known.
    pub async fn extend(&self, name: &str, seconds: u64, label: &str) -> Result<(), SchedulerError> {
        self.engine
            .extend_recurrence_catalog(name, seconds, label)
            .await?;
        debug!(name, seconds, label, "extended recurrence catalog");
        Ok(())
    }

    /// Add several recurrences in order.
    pub async fn extend_many<I, S>(&self, entries: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator<Item = (S, Recurrence)>,
        S: AsRef<str>,
    {
        for (name, recurrence) in entries {
            self.extend(name.as_ref(), recurrence.seconds, &recurrence.label)
                .await?;
        }
        Ok(())
    }

    /// Resolve a recurrence name.
    pub async fn get(&self, name: &str) -> Result<Option<Recurrence>, SchedulerError> {
        Ok(self.engine.recurrence(name).await?)
    }
}
