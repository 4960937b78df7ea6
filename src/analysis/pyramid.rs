//! Population-pyramid variation: national population by (age_range, gender)
//! minus the COVID-attributed deaths from the death-cause comparison.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use crate::record::Datum;
use crate::store::Filter;
use tracing::info;

pub struct PopulationPyramid;

impl AnalysisUnit for PopulationPyramid {
    fn name(&self) -> &'static str {
        "analyze_population_pyramid_variation"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let config = ctx.config;
        let covid = ctx.read_analyzed_where(
            "covid_vs_all_deaths",
            &Filter::default(),
            Some(&["gender", "age_range", "covid_deaths"]),
        )?;

        let national = Filter::new().eq(
            "autonomous_region",
            Datum::text(config.national_region.as_str()),
        );
        let mut population = ctx.read_extracted_where(
            "population_ar",
            &national,
            Some(&["age_range", "M", "F", "total"]),
        )?;
        population.replace_column_values("age_range", &config.death_causes_age_buckets);
        let grouped = population.group_sum(&["age_range"], &["M", "F", "total"]);
        let melted = grouped.melt(&["age_range"], &["M", "F", "total"], "gender", "alive_population");

        let mut pyramid = melted.inner_join(&covid, &["age_range", "gender"]);
        for row in pyramid.rows_mut() {
            let alive = row.number("alive_population").unwrap_or(0.0);
            let deaths = row.number("covid_deaths").unwrap_or(0.0);
            row.set("alive_population", Datum::number(alive - deaths));
        }

        info!(rows = pyramid.len(), "computed population pyramid variation");
        ctx.write_analyzed("population_pyramid_variation", &pyramid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::store::{InMemoryTableStore, TableStore};
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn subtracts_covid_deaths_from_the_national_pyramid() {
        let mut extracted = InMemoryTableStore::new();
        extracted
            .append_raw(
                "population_ar",
                &[
                    json!({
                        "autonomous_region": "España",
                        "age_range": "0-4",
                        "M": 1000.0, "F": 900.0, "total": 1900.0
                    }),
                    json!({
                        "autonomous_region": "España",
                        "age_range": "5-9",
                        "M": 500.0, "F": 400.0, "total": 900.0
                    }),
                    // Regional rows never contribute to the national pyramid
                    json!({
                        "autonomous_region": "Madrid",
                        "age_range": "0-4",
                        "M": 99.0, "F": 99.0, "total": 198.0
                    }),
                ],
            )
            .unwrap();
        let mut analyzed = InMemoryTableStore::new();
        analyzed
            .append_raw(
                "covid_vs_all_deaths",
                &[json!({"age_range": "0-9", "gender": "M", "covid_deaths": 100.0})],
            )
            .unwrap();

        let extracted: Mutex<Box<dyn TableStore>> = Mutex::new(Box::new(extracted));
        let analyzed: Mutex<Box<dyn TableStore>> = Mutex::new(Box::new(analyzed));
        let config = AnalysisConfig::default();
        let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

        PopulationPyramid.run(&ctx).unwrap();

        let pyramid = analyzed
            .lock()
            .unwrap()
            .read("population_pyramid_variation")
            .unwrap();
        // Only the (0-9, M) cohort matches the covid table
        assert_eq!(pyramid.len(), 1);
        let row = &pyramid.rows()[0];
        assert_eq!(row.text("age_range"), Some("0-9"));
        // 1000 + 500 national males, minus 100 covid deaths
        assert_eq!(row.number("alive_population"), Some(1400.0));
        assert_eq!(row.number("covid_deaths"), Some(100.0));
    }
}
