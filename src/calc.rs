//! Rate and ratio calculators.
//!
//! Division policy: a zero or missing denominator resolves to `0` wherever
//! the result is persisted, never an error and never `NaN`. A missing
//! numerator over a valid denominator stays a `Null` marker.

use crate::record::{Datum, Table};

/// Count normalized to 100 000 inhabitants. Zero population yields `0`.
pub fn per_population(count: f64, population: f64) -> f64 {
    if population == 0.0 || !population.is_finite() || !count.is_finite() {
        return 0.0;
    }
    100_000.0 * count / population
}

/// Percentage ratio between two series. Zero denominator yields `0`.
pub fn ratio_percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    100.0 * numerator / denominator
}

/// Inverse of a cumulative-incidence value, floored for low incidence.
///
/// Below the threshold the fixed floor is returned instead of `100000 / ci`:
/// a deliberate floor against divide-by-near-zero blowups when incidence is
/// very low, not an error path.
pub fn inverted_incidence(incidence: f64, threshold: f64, floor: f64) -> f64 {
    if incidence > threshold {
        100_000.0 / incidence
    } else {
        floor
    }
}

/// Adds a per-100k column derived from a count column and a population
/// column. A missing or zero population stores `0`; a missing count over a
/// valid population stores `Null`.
pub fn add_per_population_column(
    table: &mut Table,
    count_column: &str,
    population_column: &str,
    output_column: &str,
) {
    for row in table.rows_mut() {
        let population = row.number(population_column);
        let count = row.number(count_column);
        let value = match (count, population) {
            (_, Some(population)) if population == 0.0 => Datum::Number(0.0),
            (_, None) => Datum::Number(0.0),
            (None, Some(_)) => Datum::Null,
            (Some(count), Some(population)) => Datum::number(per_population(count, population)),
        };
        row.set(output_column, value);
    }
}

/// Adds a percentage-ratio column between two existing columns. A missing
/// or zero denominator stores `0`; a missing numerator over a valid
/// denominator also stores `0`, matching the persistence policy for ratios.
pub fn add_ratio_column(
    table: &mut Table,
    numerator_column: &str,
    denominator_column: &str,
    output_column: &str,
) {
    for row in table.rows_mut() {
        let numerator = row.number(numerator_column).unwrap_or(0.0);
        let denominator = row.number(denominator_column).unwrap_or(0.0);
        row.set(
            output_column,
            Datum::number(ratio_percentage(numerator, denominator)),
        );
    }
}
