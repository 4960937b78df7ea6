//! Diagnostic-tests analytics: whole-country aggregate rows, positivity
//! smoothing, cumulative totals, and the per-100k test rate.

use crate::analysis::{population_totals, AnalysisContext, AnalysisUnit};
use crate::calc::add_per_population_column;
use crate::error::AnalysisError;
use crate::record::Datum;
use crate::rolling::{rolling_by_partition, RollingKind, RollingOp};
use tracing::info;

pub struct DiagnosticTests;

impl AnalysisUnit for DiagnosticTests {
    fn name(&self) -> &'static str {
        "analyze_diagnostic_tests"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let config = ctx.config;
        let mut tests = ctx.read_extracted("diagnostic_tests")?;

        // Whole-country row per date: total tests, average positivity
        let totals = tests.group_sum(&["date"], &["total_diagnostic_tests"]);
        let positivity = tests.group_mean(&["date"], &["positivity"]);
        let mut national = totals.inner_join(&positivity, &["date"]);
        national.set_column(
            "autonomous_region",
            Datum::text(config.national_region.as_str()),
        );
        tests.concat(national);
        tests.sort_by(&["date", "autonomous_region"]);

        // The raw count is the daily figure; the cumulative sum becomes the
        // total under the original name.
        tests.rename_column("total_diagnostic_tests", "new_diagnostic_tests");

        let ops = [
            RollingOp::new(
                "positivity",
                "positivity_ma_14d",
                RollingKind::Mean {
                    days: 14,
                    min_periods: 1,
                },
            ),
            RollingOp::new(
                "new_diagnostic_tests",
                "total_diagnostic_tests",
                RollingKind::CumulativeSum,
            ),
            RollingOp::new(
                "new_diagnostic_tests",
                "new_diagnostic_tests_ma_14d",
                RollingKind::Mean {
                    days: 14,
                    min_periods: 1,
                },
            ),
            RollingOp::new("positivity", "average_positivity", RollingKind::CumulativeMean),
        ];
        let tests = rolling_by_partition(&tests, &["autonomous_region"], "date", &ops)?;

        let population = population_totals(ctx)?;
        let mut tests = tests.inner_join(&population, &["autonomous_region"]);
        add_per_population_column(
            &mut tests,
            "total_diagnostic_tests",
            "population",
            "total_tests_per_population",
        );
        tests.drop_columns(&["population"]);

        info!(rows = tests.len(), "analyzed diagnostic tests");
        ctx.write_analyzed("diagnostic_tests", &tests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::store::{InMemoryTableStore, TableStore};
    use serde_json::json;
    use std::sync::Mutex;

    fn tests_row(date: &str, region: &str, count: f64, positivity: f64) -> serde_json::Value {
        json!({
            "date": date,
            "autonomous_region": region,
            "total_diagnostic_tests": count,
            "positivity": positivity
        })
    }

    fn stores() -> (Mutex<Box<dyn TableStore>>, Mutex<Box<dyn TableStore>>) {
        let mut extracted = InMemoryTableStore::new();
        extracted
            .append_raw(
                "diagnostic_tests",
                &[
                    tests_row("2021-01-01", "Madrid", 100.0, 8.0),
                    tests_row("2021-01-01", "Galicia", 50.0, 4.0),
                    tests_row("2021-01-02", "Madrid", 200.0, 10.0),
                    tests_row("2021-01-02", "Galicia", 100.0, 6.0),
                ],
            )
            .unwrap();
        extracted
            .append_raw(
                "population_ar",
                &[
                    json!({"autonomous_region": "Madrid", "age_range": "total", "total": 10000.0}),
                    json!({"autonomous_region": "Galicia", "age_range": "total", "total": 5000.0}),
                    json!({"autonomous_region": "España", "age_range": "total", "total": 15000.0}),
                ],
            )
            .unwrap();
        (
            Mutex::new(Box::new(extracted) as Box<dyn TableStore>),
            Mutex::new(Box::new(InMemoryTableStore::new()) as Box<dyn TableStore>),
        )
    }

    #[test]
    fn whole_country_rows_aggregate_per_date() {
        let (extracted, analyzed) = stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DiagnosticTests.run(&ctx).unwrap();

        let tests = analyzed.lock().unwrap().read("diagnostic_tests").unwrap();
        // Two regions plus the national row, per date
        assert_eq!(tests.len(), 6);
        let national: Vec<_> = tests
            .rows()
            .iter()
            .filter(|row| row.text("autonomous_region") == Some("España"))
            .collect();
        assert_eq!(national.len(), 2);
        // Day one: 100 + 50 tests, mean positivity (8 + 4) / 2
        assert_eq!(national[0].number("new_diagnostic_tests"), Some(150.0));
        assert_eq!(national[0].number("positivity"), Some(6.0));
    }

    #[test]
    fn cumulative_totals_and_rates_accumulate_per_region() {
        let (extracted, analyzed) = stores();
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        DiagnosticTests.run(&ctx).unwrap();

        let tests = analyzed.lock().unwrap().read("diagnostic_tests").unwrap();
        let madrid: Vec<_> = tests
            .rows()
            .iter()
            .filter(|row| row.text("autonomous_region") == Some("Madrid"))
            .collect();
        assert_eq!(madrid[0].number("total_diagnostic_tests"), Some(100.0));
        assert_eq!(madrid[1].number("total_diagnostic_tests"), Some(300.0));
        // 300 tests per 10 000 inhabitants → 3000 per 100k
        assert_eq!(madrid[1].number("total_tests_per_population"), Some(3000.0));
        // Running mean of positivity: (8 + 10) / 2
        assert_eq!(madrid[1].number("average_positivity"), Some(9.0));
        // 14-day moving average smooths the sharp positivity line
        assert_eq!(madrid[1].number("positivity_ma_14d"), Some(9.0));
    }
}
