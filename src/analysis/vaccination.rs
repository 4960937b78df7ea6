//! Vaccination campaign analytics: per-population percentages, day-over-day
//! new-vaccination counts, their moving average, and the verbatim move of
//! the per-age collections.

use crate::analysis::{population_totals, AnalysisContext, AnalysisUnit};
use crate::calc::add_ratio_column;
use crate::error::AnalysisError;
use crate::rolling::{rolling_by_partition, RollingKind, RollingOp};
use tracing::info;

const AGES_COLLECTIONS: [&str; 2] = ["vaccination_ages_single", "vaccination_ages_complete"];

pub struct Vaccination;

impl AnalysisUnit for Vaccination {
    fn name(&self) -> &'static str {
        "analyze_vaccination"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let general = ctx.read_extracted("vaccination_general")?;
        let population = population_totals(ctx)?;

        let mut general = general.inner_join(&population, &["autonomous_region"]);
        add_ratio_column(
            &mut general,
            "number_fully_vaccinated_people",
            "population",
            "percentage_fully_vaccinated",
        );
        add_ratio_column(
            &mut general,
            "number_at_least_single_dose_people",
            "population",
            "percentage_at_least_single_dose",
        );
        general.drop_columns(&["population"]);
        general.sort_by(&["date", "autonomous_region"]);

        let ops = [
            RollingOp::new(
                "number_fully_vaccinated_people",
                "new_vaccinations",
                RollingKind::Diff,
            ),
            RollingOp::new(
                "new_vaccinations",
                "new_vaccinations_ma_7d",
                RollingKind::Mean {
                    days: 7,
                    min_periods: 1,
                },
            ),
        ];
        let general = rolling_by_partition(&general, &["autonomous_region"], "date", &ops)?;

        info!(rows = general.len(), "analyzed vaccination progress");
        ctx.write_analyzed("vaccination_general", &general)?;

        for collection in AGES_COLLECTIONS {
            ctx.move_to_analyzed(collection)?;
        }
        Ok(())
    }
}
