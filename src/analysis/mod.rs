//! Analysis units: read input tables, compute derived columns, write output
//! tables. Each unit is a pure function over the stores with no state
//! retained across runs.

pub mod daily;
pub mod death_causes;
pub mod diagnostics;
pub mod hospitals;
pub mod outbreaks;
pub mod pyramid;
pub mod symptoms;
pub mod transmission;
pub mod vaccination;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::record::{Datum, Table};
use crate::store::{move_collection, Filter, StoreError, TableStore};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Columns identifying one independent partition of the daily series.
pub(crate) const PARTITION_COLUMNS: [&str; 3] = ["autonomous_region", "gender", "age_range"];

/// A single analysis unit, invoked once per scheduled run.
pub trait AnalysisUnit: Send + Sync {
    /// Stable unit name, used for logging and run reports.
    fn name(&self) -> &'static str;

    /// Runs the unit: read → transform → write. A failed unit writes
    /// nothing and is rerun in full by the scheduler.
    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError>;
}

/// Shared execution context: the two stores and the injected configuration.
///
/// Stores sit behind mutexes so independent units can run on worker threads;
/// each store call locks for the duration of that call only.
pub struct AnalysisContext<'a> {
    extracted: &'a Mutex<Box<dyn TableStore>>,
    analyzed: &'a Mutex<Box<dyn TableStore>>,
    pub config: &'a AnalysisConfig,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        extracted: &'a Mutex<Box<dyn TableStore>>,
        analyzed: &'a Mutex<Box<dyn TableStore>>,
        config: &'a AnalysisConfig,
    ) -> Self {
        AnalysisContext {
            extracted,
            analyzed,
            config,
        }
    }

    fn lock(
        store: &Mutex<Box<dyn TableStore>>,
    ) -> Result<MutexGuard<'_, Box<dyn TableStore>>, StoreError> {
        store
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }

    /// Reads a full collection from the extracted store.
    pub fn read_extracted(&self, collection: &str) -> Result<Table, AnalysisError> {
        let store = Self::lock(self.extracted)?;
        Ok(store.read(collection)?)
    }

    /// Filtered/projected read from the extracted store.
    pub fn read_extracted_where(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Table, AnalysisError> {
        let store = Self::lock(self.extracted)?;
        Ok(store.read_where(collection, filter, projection)?)
    }

    /// Filtered/projected read from the analyzed store (for the units that
    /// consume another unit's output).
    pub fn read_analyzed_where(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Table, AnalysisError> {
        let store = Self::lock(self.analyzed)?;
        Ok(store.read_where(collection, filter, projection)?)
    }

    /// Replaces an output collection wholesale.
    pub fn write_analyzed(&self, collection: &str, table: &Table) -> Result<(), AnalysisError> {
        let mut store = Self::lock(self.analyzed)?;
        store.write(collection, table)?;
        debug!(collection, rows = table.len(), "wrote analyzed collection");
        Ok(())
    }

    /// Relocates a collection verbatim from the extracted to the analyzed
    /// store (delete-then-copy).
    pub fn move_to_analyzed(&self, collection: &str) -> Result<usize, AnalysisError> {
        let source = Self::lock(self.extracted)?;
        let mut destination = Self::lock(self.analyzed)?;
        let moved = move_collection(&**source, &mut **destination, collection)?;
        debug!(collection, rows = moved, "moved collection");
        Ok(moved)
    }
}

/// Population reference broken down by (autonomous_region, age_range,
/// gender), with the source age buckets translated to the daily-data
/// taxonomy and the wide gender columns melted into rows.
pub(crate) fn population_by_cohort(ctx: &AnalysisContext<'_>) -> Result<Table, AnalysisError> {
    let mut population = ctx.read_extracted("population_ar")?;
    population.replace_column_values("age_range", &ctx.config.population_age_buckets);
    let grouped = population.group_sum(&["age_range", "autonomous_region"], &["M", "F", "total"]);
    Ok(grouped.melt(
        &["autonomous_region", "age_range"],
        &["M", "F", "total"],
        "gender",
        "population",
    ))
}

/// Per-region population totals (the `total` age range), as a
/// (autonomous_region, population) table.
pub(crate) fn population_totals(ctx: &AnalysisContext<'_>) -> Result<Table, AnalysisError> {
    let filter = Filter::new().eq("age_range", Datum::text("total"));
    let mut totals = ctx.read_extracted_where(
        "population_ar",
        &filter,
        Some(&["autonomous_region", "total"]),
    )?;
    totals.rename_column("total", "population");
    Ok(totals)
}
