//! Transmission indicators: flattens the nested indicator object into
//! scalar columns and appends a whole-country mean row per date.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use crate::record::Datum;
use tracing::info;

const INDICATOR_COLUMNS: [&str; 3] = [
    "cases_unknown_contact",
    "identified_contacts_per_case",
    "asymptomatic_percentage",
];

pub struct TransmissionIndicators;

impl AnalysisUnit for TransmissionIndicators {
    fn name(&self) -> &'static str {
        "analyze_transmission_indicators"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let mut indicators = ctx.read_extracted("transmission_indicators")?;

        // Flatten once, right at the read boundary; a record missing one of
        // the sub-fields aborts the whole run.
        indicators.flatten_nested(
            "transmission_indicators",
            &["cases_unknown_contact", "percentage"],
            "cases_unknown_contact",
        )?;
        indicators.flatten_nested(
            "transmission_indicators",
            &["identified_contacts_per_case", "median"],
            "identified_contacts_per_case",
        )?;
        indicators.flatten_nested(
            "transmission_indicators",
            &["asymptomatic_percentage"],
            "asymptomatic_percentage",
        )?;
        indicators.drop_columns(&["transmission_indicators"]);

        let mut national = indicators.group_mean(&["date"], &INDICATOR_COLUMNS);
        national.set_column(
            "autonomous_region",
            Datum::text(ctx.config.national_region.as_str()),
        );
        indicators.concat(national);
        indicators.sort_by(&["date", "autonomous_region"]);

        info!(rows = indicators.len(), "analyzed transmission indicators");
        ctx.write_analyzed("transmission_indicators", &indicators)
    }
}
