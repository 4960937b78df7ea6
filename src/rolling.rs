//! Partitioned calendar-window rolling engine.
//!
//! All time-ordered derivations (trailing sums/means, smoothed percentage
//! deltas, first differences, cumulative series) run per partition, the set
//! of rows sharing the partition key columns, over a date-sorted view, and
//! scatter their results back to the original row positions. Windows span
//! calendar days, not row counts: a gap in the data shrinks the set of
//! aggregated rows, never the wall-clock span. Windows are causal; a value
//! at date `d` never depends on rows after `d`.

use crate::error::AnalysisError;
use crate::record::{join_key, Datum, Record, Table};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

/// Aggregation applied over each partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RollingKind {
    /// Sum of non-missing values in a trailing calendar window
    Sum { days: i64, min_periods: usize },
    /// Mean of non-missing values in a trailing calendar window
    Mean { days: i64, min_periods: usize },
    /// Smoothed period-over-period delta: a trailing calendar mean over
    /// `mean_window_days`, then `100 * (later - earlier) / earlier` between
    /// the last and first values of each `span_rows`-row window of the
    /// smoothed series (`0` when the earlier value is `0`).
    /// `mean_window_days = 1` compares the raw series.
    PercentageChange { mean_window_days: i64, span_rows: usize },
    /// First difference; the first row of a partition yields no value
    Diff,
    /// Running total, reset at the start of each partition
    CumulativeSum,
    /// Running mean, with the count excluding missing values
    CumulativeMean,
}

/// One derived column: value column in, output column out.
#[derive(Debug, Clone)]
pub struct RollingOp {
    pub value_column: String,
    pub output_column: String,
    pub kind: RollingKind,
}

impl RollingOp {
    pub fn new(value_column: &str, output_column: &str, kind: RollingKind) -> Self {
        RollingOp {
            value_column: value_column.to_string(),
            output_column: output_column.to_string(),
            kind,
        }
    }
}

/// Computes the given rolling operations per partition and merges the
/// derived columns back onto the table.
///
/// Ops run in order, so a later op may consume an earlier op's output
/// column. The returned table has the same rows in the same order; every
/// row carries every output column, with `Null` where the aggregate is
/// undefined. Two rows sharing a date within one partition violate the
/// uniqueness invariant and abort the computation.
pub fn rolling_by_partition(
    table: &Table,
    partition_keys: &[&str],
    date_column: &str,
    ops: &[RollingOp],
) -> Result<Table, AnalysisError> {
    let mut result = table.clone();
    if result.is_empty() {
        for op in ops {
            result.set_column(&op.output_column, Datum::Null);
        }
        return Ok(result);
    }

    let partitions = partition_indices(&result, partition_keys, date_column)?;

    for op in ops {
        if !result.has_column(&op.value_column) {
            return Err(AnalysisError::MissingColumn {
                context: "rolling window".to_string(),
                column: op.value_column.clone(),
            });
        }

        result.set_column(&op.output_column, Datum::Null);
        for indices in partitions.values() {
            let series: Vec<(NaiveDate, Option<f64>)> = indices
                .iter()
                .map(|&(date, row)| (date, result.rows()[row].number(&op.value_column)))
                .collect();
            let computed = apply_kind(&series, op.kind);
            for (&(_, row), value) in indices.iter().zip(computed) {
                let datum = value.map(Datum::number).unwrap_or(Datum::Null);
                result.rows_mut()[row].set(op.output_column.as_str(), datum);
            }
        }
    }

    Ok(result)
}

/// Groups row positions by partition key and sorts each partition by date.
/// Rows whose partition key is missing do not participate (their outputs
/// stay `Null`).
fn partition_indices(
    table: &Table,
    partition_keys: &[&str],
    date_column: &str,
) -> Result<HashMap<String, Vec<(NaiveDate, usize)>>, AnalysisError> {
    let mut partitions: HashMap<String, Vec<(NaiveDate, usize)>> = HashMap::new();
    for (position, row) in table.rows().iter().enumerate() {
        let Some(key) = join_key(row, partition_keys) else {
            continue;
        };
        let date = row
            .date(date_column)
            .ok_or_else(|| AnalysisError::MissingColumn {
                context: "rolling window".to_string(),
                column: date_column.to_string(),
            })?;
        partitions.entry(key).or_default().push((date, position));
    }

    for indices in partitions.values_mut() {
        indices.sort_by_key(|&(date, _)| date);
        for pair in indices.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(AnalysisError::DuplicateDate {
                    partition: partition_label(&table.rows()[pair[0].1], partition_keys),
                    date: pair[0].0,
                });
            }
        }
    }
    Ok(partitions)
}

fn partition_label(row: &Record, partition_keys: &[&str]) -> String {
    partition_keys
        .iter()
        .map(|key| {
            row.get(key)
                .map(|datum| datum.to_string())
                .unwrap_or_else(|| "null".to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn apply_kind(series: &[(NaiveDate, Option<f64>)], kind: RollingKind) -> Vec<Option<f64>> {
    match kind {
        RollingKind::Sum { days, min_periods } => {
            calendar_window(series, days, min_periods, false)
        }
        RollingKind::Mean { days, min_periods } => calendar_window(series, days, min_periods, true),
        RollingKind::PercentageChange {
            mean_window_days,
            span_rows,
        } => percentage_change(series, mean_window_days, span_rows),
        RollingKind::Diff => diff(series),
        RollingKind::CumulativeSum => cumulative_sum(series),
        RollingKind::CumulativeMean => cumulative_mean(series),
    }
}

/// Trailing calendar-window aggregate over a date-sorted series.
fn calendar_window(
    series: &[(NaiveDate, Option<f64>)],
    days: i64,
    min_periods: usize,
    mean: bool,
) -> Vec<Option<f64>> {
    let days = days.max(1);
    let required = min_periods.max(1);
    let mut output = Vec::with_capacity(series.len());
    let mut start = 0;

    for (index, &(date, _)) in series.iter().enumerate() {
        let window_start = date - Duration::days(days - 1);
        while series[start].0 < window_start {
            start += 1;
        }

        let mut sum = 0.0;
        let mut count = 0usize;
        for &(_, value) in &series[start..=index] {
            if let Some(value) = value {
                sum += value;
                count += 1;
            }
        }

        if count < required {
            output.push(None);
        } else if mean {
            output.push(Some(sum / count as f64));
        } else {
            output.push(Some(sum));
        }
    }
    output
}

fn percentage_change(
    series: &[(NaiveDate, Option<f64>)],
    mean_window_days: i64,
    span_rows: usize,
) -> Vec<Option<f64>> {
    let span = span_rows.max(1);
    let smoothed = calendar_window(series, mean_window_days, 1, true);
    let mut output = Vec::with_capacity(series.len());

    for index in 0..series.len() {
        if index + 1 < span {
            output.push(None);
            continue;
        }
        let value = match (smoothed[index + 1 - span], smoothed[index]) {
            (Some(earlier), Some(later)) => {
                if earlier == 0.0 {
                    Some(0.0)
                } else {
                    Some(100.0 * (later - earlier) / earlier)
                }
            }
            _ => None,
        };
        output.push(value);
    }
    output
}

fn diff(series: &[(NaiveDate, Option<f64>)]) -> Vec<Option<f64>> {
    let mut output = Vec::with_capacity(series.len());
    for (index, &(_, value)) in series.iter().enumerate() {
        if index == 0 {
            output.push(None);
            continue;
        }
        let previous = series[index - 1].1;
        output.push(match (previous, value) {
            (Some(previous), Some(value)) => Some(value - previous),
            _ => None,
        });
    }
    output
}

fn cumulative_sum(series: &[(NaiveDate, Option<f64>)]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    series
        .iter()
        .map(|&(_, value)| {
            value.map(|value| {
                total += value;
                total
            })
        })
        .collect()
}

fn cumulative_mean(series: &[(NaiveDate, Option<f64>)]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    let mut count = 0usize;
    series
        .iter()
        .map(|&(_, value)| {
            if let Some(value) = value {
                total += value;
                count += 1;
            }
            if count == 0 {
                None
            } else {
                Some(total / count as f64)
            }
        })
        .collect()
}
