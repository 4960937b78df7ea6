//! Symptoms snapshot: projects the per-symptom percentage out of the
//! clinical-description collection and translates the symptom names.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use crate::record::Datum;
use crate::store::Filter;
use tracing::info;

pub struct Symptoms;

impl AnalysisUnit for Symptoms {
    fn name(&self) -> &'static str {
        "move_symptoms"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let config = ctx.config;
        let snapshot = Filter::new().eq("date", Datum::Date(config.symptoms_snapshot_date));
        let mut symptoms = ctx.read_extracted_where(
            "clinic_description",
            &snapshot,
            Some(&["symptom", "patients.total.percentage"]),
        )?;
        symptoms.replace_column_values("symptom", &config.symptom_translations);

        info!(rows = symptoms.len(), "extracted symptom percentages");
        ctx.write_analyzed("symptoms", &symptoms)
    }
}
