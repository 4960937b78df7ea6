//! Daily-series analyzers: cases, deaths, and hospitalizations.
//!
//! The three pipelines share their preparation step (join the daily
//! observations with the population reference) and compose the rolling
//! engine with the rate calculators.

use crate::analysis::{population_by_cohort, AnalysisContext, AnalysisUnit, PARTITION_COLUMNS};
use crate::calc::{add_per_population_column, add_ratio_column, inverted_incidence};
use crate::error::AnalysisError;
use crate::record::{Datum, Table};
use crate::rolling::{rolling_by_partition, RollingKind, RollingOp};
use tracing::info;

/// Daily observations joined with the population reference. Cohorts missing
/// from the population table drop out of the join (known-drop policy).
fn observations_with_population(ctx: &AnalysisContext<'_>) -> Result<Table, AnalysisError> {
    let daily = ctx.read_extracted("daily_data")?;
    let population = population_by_cohort(ctx)?;
    Ok(daily.inner_join(&population, &PARTITION_COLUMNS))
}

fn mean_op(value_column: &str, output_column: &str, days: i64) -> RollingOp {
    RollingOp::new(
        value_column,
        output_column,
        RollingKind::Mean {
            days,
            min_periods: 1,
        },
    )
}

/// Period-over-period increase columns for a raw daily metric: day, week,
/// two weeks, and month, compared over the unsmoothed series.
fn raw_increase_ops(value_column: &str, prefix: &str) -> Vec<RollingOp> {
    [
        ("daily_increase", 2),
        ("weekly_increase", 8),
        ("two_weeks_increase", 15),
        ("monthly_increase", 31),
    ]
    .iter()
    .map(|(suffix, span_rows)| {
        RollingOp::new(
            value_column,
            &format!("{}{}", prefix, suffix),
            RollingKind::PercentageChange {
                mean_window_days: 1,
                span_rows: *span_rows,
            },
        )
    })
    .collect()
}

/// Cases pipeline: per-population rates, cumulative incidence with its
/// inverted form, smoothed increase percentages, and moving averages.
pub struct DailyCases;

impl AnalysisUnit for DailyCases {
    fn name(&self) -> &'static str {
        "analyze_cases"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let observations = observations_with_population(ctx)?;
        let mut cases = observations.select(&[
            "date",
            "gender",
            "age_range",
            "autonomous_region",
            "new_cases",
            "total_cases",
            "population",
        ]);

        add_per_population_column(&mut cases, "new_cases", "population", "new_cases_per_population");
        add_per_population_column(
            &mut cases,
            "total_cases",
            "population",
            "total_cases_per_population",
        );

        let ops = [
            RollingOp::new(
                "new_cases_per_population",
                "ci_last_14_days",
                RollingKind::Sum {
                    days: 14,
                    min_periods: 1,
                },
            ),
            RollingOp::new(
                "new_cases",
                "daily_increase",
                RollingKind::PercentageChange {
                    mean_window_days: 7,
                    span_rows: 2,
                },
            ),
            RollingOp::new(
                "new_cases",
                "weekly_increase",
                RollingKind::PercentageChange {
                    mean_window_days: 14,
                    span_rows: 8,
                },
            ),
            RollingOp::new(
                "new_cases",
                "monthly_increase",
                RollingKind::PercentageChange {
                    mean_window_days: 60,
                    span_rows: 31,
                },
            ),
            mean_op("new_cases_per_population", "new_cases_ma_1w", 8),
            mean_op("new_cases_per_population", "new_cases_ma_2w", 15),
        ];
        let mut cases = rolling_by_partition(&cases, &PARTITION_COLUMNS, "date", &ops)?;

        let threshold = ctx.config.incidence_threshold;
        let floor = ctx.config.incidence_floor;
        for row in cases.rows_mut() {
            let inverted = match row.number("ci_last_14_days") {
                Some(incidence) => Datum::number(inverted_incidence(incidence, threshold, floor)),
                None => Datum::Number(floor),
            };
            row.set("inverted_ci", inverted);
        }

        cases.drop_columns(&["population"]);
        info!(rows = cases.len(), "analyzed daily cases");
        ctx.write_analyzed("cases", &cases)
    }
}

/// Deaths pipeline: per-population rates, raw increase percentages, moving
/// averages, and mortality ratios against the smoothed case series.
pub struct DailyDeaths;

impl AnalysisUnit for DailyDeaths {
    fn name(&self) -> &'static str {
        "analyze_deaths"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let observations = observations_with_population(ctx)?;
        let mut deaths = observations.select(&[
            "date",
            "gender",
            "age_range",
            "autonomous_region",
            "new_deaths",
            "total_deaths",
            "new_cases",
            "total_cases",
            "population",
        ]);

        add_per_population_column(
            &mut deaths,
            "new_deaths",
            "population",
            "new_deaths_per_population",
        );
        add_per_population_column(
            &mut deaths,
            "total_deaths",
            "population",
            "total_deaths_per_population",
        );
        // Helper for the mortality ratio, dropped before writing
        add_per_population_column(
            &mut deaths,
            "new_cases",
            "population",
            "new_cases_per_population",
        );

        let mut ops = raw_increase_ops("new_deaths", "");
        ops.push(mean_op("new_deaths_per_population", "new_deaths_ma_1w", 8));
        ops.push(mean_op("new_deaths_per_population", "new_deaths_ma_2w", 15));
        ops.push(mean_op("new_cases_per_population", "new_cases_ma_2w", 15));
        let mut deaths = rolling_by_partition(&deaths, &PARTITION_COLUMNS, "date", &ops)?;

        add_ratio_column(&mut deaths, "new_deaths_ma_2w", "new_cases_ma_2w", "mortality_2w");
        add_ratio_column(&mut deaths, "total_deaths", "total_cases", "mortality_total");

        deaths.drop_columns(&[
            "new_cases_ma_2w",
            "new_cases_per_population",
            "new_cases",
            "total_cases",
            "population",
        ]);
        info!(rows = deaths.len(), "analyzed daily deaths");
        ctx.write_analyzed("deaths", &deaths)
    }
}

/// Hospitalizations pipeline: ward and intensive-care admissions with their
/// rates, increases, moving averages, and ratios against the case series.
pub struct DailyHospitalizations;

impl AnalysisUnit for DailyHospitalizations {
    fn name(&self) -> &'static str {
        "analyze_hospitalizations"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let observations = observations_with_population(ctx)?;
        let mut hospitalizations = observations.select(&[
            "date",
            "gender",
            "age_range",
            "autonomous_region",
            "new_hospitalizations",
            "total_hospitalizations",
            "new_ic_hospitalizations",
            "total_ic_hospitalizations",
            "new_cases",
            "total_cases",
            "population",
        ]);

        for (count, rate) in [
            ("new_hospitalizations", "new_hospitalizations_per_population"),
            ("total_hospitalizations", "total_hospitalizations_per_population"),
            ("new_ic_hospitalizations", "new_ic_hospitalizations_per_population"),
            ("total_ic_hospitalizations", "total_ic_hospitalizations_per_population"),
            ("new_cases", "new_cases_per_population"),
        ] {
            add_per_population_column(&mut hospitalizations, count, "population", rate);
        }

        let mut ops = raw_increase_ops("new_hospitalizations", "hospitalizations_");
        ops.extend(raw_increase_ops("new_ic_hospitalizations", "ic_"));
        ops.push(mean_op(
            "new_hospitalizations_per_population",
            "new_hospitalizations_ma_1w",
            8,
        ));
        ops.push(mean_op(
            "new_hospitalizations_per_population",
            "new_hospitalizations_ma_2w",
            15,
        ));
        ops.push(mean_op("new_ic_hospitalizations_per_population", "new_ic_ma_1w", 8));
        ops.push(mean_op("new_ic_hospitalizations_per_population", "new_ic_ma_2w", 15));
        ops.push(mean_op("new_cases_per_population", "new_cases_ma_2w", 15));
        let mut hospitalizations =
            rolling_by_partition(&hospitalizations, &PARTITION_COLUMNS, "date", &ops)?;

        add_ratio_column(
            &mut hospitalizations,
            "new_hospitalizations_ma_2w",
            "new_cases_ma_2w",
            "hospitalization_ratio_2w",
        );
        add_ratio_column(
            &mut hospitalizations,
            "total_hospitalizations",
            "total_cases",
            "hospitalization_ratio_total",
        );
        add_ratio_column(
            &mut hospitalizations,
            "new_ic_ma_2w",
            "new_cases_ma_2w",
            "hospitalization_ic_ratio_2w",
        );
        add_ratio_column(
            &mut hospitalizations,
            "total_ic_hospitalizations",
            "total_cases",
            "hospitalization_ic_ratio_total",
        );

        hospitalizations.drop_columns(&[
            "new_cases_ma_2w",
            "new_cases_per_population",
            "new_cases",
            "total_cases",
            "population",
        ]);
        info!(rows = hospitalizations.len(), "analyzed daily hospitalizations");
        ctx.write_analyzed("hospitalizations", &hospitalizations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::store::{InMemoryTableStore, TableStore};
    use serde_json::json;
    use std::sync::Mutex;

    fn seeded_stores() -> (Mutex<Box<dyn TableStore>>, Mutex<Box<dyn TableStore>>) {
        let mut extracted = InMemoryTableStore::new();
        extracted
            .append_raw(
                "daily_data",
                &[
                    daily_row("2021-01-01", 10.0, 10.0, 1.0, 1.0),
                    daily_row("2021-01-02", 0.0, 10.0, 0.0, 1.0),
                    daily_row("2021-01-03", 20.0, 30.0, 2.0, 3.0),
                ],
            )
            .unwrap();
        extracted
            .append_raw(
                "population_ar",
                &[json!({
                    "autonomous_region": "A",
                    "age_range": "0-4",
                    "M": 0.0,
                    "F": 1000.0,
                    "total": 1000.0
                })],
            )
            .unwrap();
        (
            Mutex::new(Box::new(extracted) as Box<dyn TableStore>),
            Mutex::new(Box::new(InMemoryTableStore::new()) as Box<dyn TableStore>),
        )
    }

    fn daily_row(
        date: &str,
        new_cases: f64,
        total_cases: f64,
        new_deaths: f64,
        total_deaths: f64,
    ) -> serde_json::Value {
        json!({
            "date": date,
            "autonomous_region": "A",
            "gender": "F",
            "age_range": "0-9",
            "new_cases": new_cases,
            "total_cases": total_cases,
            "new_deaths": new_deaths,
            "total_deaths": total_deaths,
            "new_hospitalizations": 1.0,
            "total_hospitalizations": 2.0,
            "new_ic_hospitalizations": 0.0,
            "total_ic_hospitalizations": 0.0
        })
    }

    #[test]
    fn cases_rates_follow_the_population() {
        let (extracted, analyzed) = seeded_stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyCases.run(&ctx).unwrap();

        let cases = analyzed.lock().unwrap().read("cases").unwrap();
        assert_eq!(cases.len(), 3);
        let rates: Vec<Option<f64>> = cases
            .rows()
            .iter()
            .map(|row| row.number("new_cases_per_population"))
            .collect();
        assert_eq!(rates, vec![Some(1000.0), Some(0.0), Some(2000.0)]);
        // 14-day trailing sum of the rate
        assert_eq!(cases.rows()[2].number("ci_last_14_days"), Some(3000.0));
        // Helper column does not reach the output
        assert!(!cases.has_column("population"));
    }

    #[test]
    fn cases_inverted_incidence_uses_the_floor() {
        let (extracted, analyzed) = seeded_stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyCases.run(&ctx).unwrap();

        let cases = analyzed.lock().unwrap().read("cases").unwrap();
        // Incidence 1000 → inverted 100; incidence well above the threshold
        assert_eq!(cases.rows()[0].number("inverted_ci"), Some(100.0));
    }

    #[test]
    fn deaths_output_drops_case_helper_columns() {
        let (extracted, analyzed) = seeded_stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyDeaths.run(&ctx).unwrap();

        let deaths = analyzed.lock().unwrap().read("deaths").unwrap();
        assert_eq!(deaths.len(), 3);
        for helper in [
            "new_cases_ma_2w",
            "new_cases_per_population",
            "new_cases",
            "total_cases",
            "population",
        ] {
            assert!(!deaths.has_column(helper), "{} should be dropped", helper);
        }
        assert!(deaths.has_column("mortality_2w"));
        assert!(deaths.has_column("two_weeks_increase"));
    }

    #[test]
    fn deaths_mortality_total_is_a_percentage() {
        let (extracted, analyzed) = seeded_stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyDeaths.run(&ctx).unwrap();

        let deaths = analyzed.lock().unwrap().read("deaths").unwrap();
        // total_deaths 3 over total_cases 30
        assert_eq!(deaths.rows()[2].number("mortality_total"), Some(10.0));
    }

    #[test]
    fn hospitalizations_zero_case_average_yields_zero_ratio() {
        let (extracted, analyzed) = seeded_stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyHospitalizations.run(&ctx).unwrap();

        let hospitalizations = analyzed.lock().unwrap().read("hospitalizations").unwrap();
        assert_eq!(hospitalizations.len(), 3);
        // total_ic_hospitalizations is 0 throughout; the ratio is 0, never NaN
        for row in hospitalizations.rows() {
            assert_eq!(row.number("hospitalization_ic_ratio_total"), Some(0.0));
        }
        assert!(hospitalizations.has_column("ic_monthly_increase"));
        assert!(!hospitalizations.has_column("population"));
    }

    #[test]
    fn unmatched_population_cohorts_drop_out() {
        let (extracted, analyzed) = seeded_stores();
        extracted
            .lock()
            .unwrap()
            .append_raw(
                "daily_data",
                &[json!({
                    "date": "2021-01-01",
                    "autonomous_region": "B",
                    "gender": "F",
                    "age_range": "0-9",
                    "new_cases": 5.0,
                    "total_cases": 5.0
                })],
            )
            .unwrap();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DailyCases.run(&ctx).unwrap();

        let cases = analyzed.lock().unwrap().read("cases").unwrap();
        // Region B has no population reference: its row drops silently
        assert_eq!(cases.len(), 3);
        assert!(cases
            .rows()
            .iter()
            .all(|row| row.text("autonomous_region") == Some("A")));
    }
}
