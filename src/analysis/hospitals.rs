//! Hospital-pressure analytics: whole-country aggregate rows and 14-day
//! smoothing of the bed-occupancy percentages.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use crate::record::Datum;
use crate::rolling::{rolling_by_partition, RollingKind, RollingOp};
use crate::store::Filter;
use tracing::info;

pub struct HospitalsPressure;

impl AnalysisUnit for HospitalsPressure {
    fn name(&self) -> &'static str {
        "analyze_hospitals_pressure"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let config = ctx.config;
        let mut pressure = ctx.read_extracted_where(
            "hospitals_pressure",
            &Filter::default(),
            Some(&[
                "autonomous_region",
                "date",
                "hospitalized_patients",
                "beds_percentage",
                "ic_patients",
                "ic_beds_percentage",
            ]),
        )?;

        // Whole-country row per date: summed patients, averaged percentages
        let patients = pressure.group_sum(&["date"], &["hospitalized_patients", "ic_patients"]);
        let beds = pressure.group_mean(&["date"], &["beds_percentage", "ic_beds_percentage"]);
        let mut national = patients.inner_join(&beds, &["date"]);
        national.set_column(
            "autonomous_region",
            Datum::text(config.national_region.as_str()),
        );
        pressure.concat(national);
        pressure.sort_by(&["date", "autonomous_region"]);

        let ops = [
            RollingOp::new(
                "beds_percentage",
                "beds_percentage_ma_14d",
                RollingKind::Mean {
                    days: 14,
                    min_periods: 1,
                },
            ),
            RollingOp::new(
                "ic_beds_percentage",
                "ic_beds_percentage_ma_14d",
                RollingKind::Mean {
                    days: 14,
                    min_periods: 1,
                },
            ),
        ];
        let pressure = rolling_by_partition(&pressure, &["autonomous_region"], "date", &ops)?;

        info!(rows = pressure.len(), "analyzed hospitals pressure");
        ctx.write_analyzed("hospitals_pressure", &pressure)
    }
}
