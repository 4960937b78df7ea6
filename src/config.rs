//! Injected configuration for the analysis units.
//!
//! Translation tables and policy constants are immutable data handed to each
//! unit, never shared mutable state. The defaults mirror the source data
//! (Spanish national statistics); a JSON file can override any field.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// Configuration injected into every analysis unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Label of the whole-country aggregate rows
    pub national_region: String,
    /// Policy date the epidemic is counted from
    pub epidemic_start: NaiveDate,
    /// Days the newest data is assumed to lag behind the wall clock
    pub reporting_lag_days: i64,
    /// Injected "today" for the time-dependent death-cause unit;
    /// `None` falls back to the wall clock
    pub today: Option<NaiveDate>,
    /// Cause label attached to the derived COVID death rows
    pub covid_cause_label: String,
    /// Cause label of the all-causes aggregate in the death-causes table
    pub all_causes_label: String,
    /// Snapshot date of the clinical-description collection
    pub symptoms_snapshot_date: NaiveDate,
    /// Cumulative incidence below which the inverted value is floored
    pub incidence_threshold: f64,
    /// Floor value for the inverted incidence
    pub incidence_floor: f64,
    /// Population age buckets → daily-data age ranges
    pub population_age_buckets: HashMap<String, String>,
    /// Death-causes age buckets → daily-data age ranges (finer source taxonomy)
    pub death_causes_age_buckets: HashMap<String, String>,
    /// Symptom identifiers → display names
    pub symptom_translations: HashMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            national_region: "España".to_string(),
            epidemic_start: NaiveDate::from_ymd_opt(2020, 3, 15).expect("valid date"),
            reporting_lag_days: 7,
            today: None,
            covid_cause_label: "COVID-19".to_string(),
            all_causes_label: "Todas las causas".to_string(),
            symptoms_snapshot_date: NaiveDate::from_ymd_opt(2020, 5, 29).expect("valid date"),
            incidence_threshold: 10.0,
            incidence_floor: 10_000.0,
            population_age_buckets: string_map(&[
                ("0-4", "0-9"),
                ("5-9", "0-9"),
                ("10-14", "10-19"),
                ("15-19", "10-19"),
                ("20-24", "20-29"),
                ("25-29", "20-29"),
                ("30-34", "30-39"),
                ("35-39", "30-39"),
                ("40-44", "40-49"),
                ("45-49", "40-49"),
                ("50-54", "50-59"),
                ("55-59", "50-59"),
                ("60-64", "60-69"),
                ("65-69", "60-69"),
                ("70-74", "70-79"),
                ("75-79", "70-79"),
                ("80-84", "80+"),
                ("85-89", "80+"),
                ("≥90", "80+"),
                ("Total", "total"),
            ]),
            death_causes_age_buckets: string_map(&[
                ("0-1", "0-9"),
                ("0-4", "0-9"),
                ("1-4", "0-9"),
                ("5-9", "0-9"),
                ("10-14", "10-19"),
                ("15-19", "10-19"),
                ("20-24", "20-29"),
                ("25-29", "20-29"),
                ("30-34", "30-39"),
                ("35-39", "30-39"),
                ("40-44", "40-49"),
                ("45-49", "40-49"),
                ("50-54", "50-59"),
                ("55-59", "50-59"),
                ("60-64", "60-69"),
                ("65-69", "60-69"),
                ("70-74", "70-79"),
                ("75-79", "70-79"),
                ("80-84", "80+"),
                ("85-89", "80+"),
                ("90-94", "80+"),
                ("95+", "80+"),
                ("≥90", "80+"),
                ("Total", "total"),
            ]),
            symptom_translations: string_map(&[
                ("aki", "Infección aguda de riñón"),
                ("dhiarrea", "Diarrea"),
                ("other_respiratory", "Otras afecciones respiratorias"),
                ("vomit", "Vómitos"),
                ("dyspnoea", "Disnea"),
                ("fever", "Fiebre"),
                ("ards", "Síndrome de dificultad respiratoria aguda"),
                ("cough", "Tos"),
                ("sore_throat", "Dolor de garganta"),
            ]),
        }
    }
}

impl AnalysisConfig {
    /// Loads a configuration from a JSON file; absent fields keep their
    /// defaults.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reference date for the time-dependent death analytics: the injected
    /// (or wall-clock) "today" pushed back by the reporting lag, since the
    /// newest days of data may not be available yet.
    pub fn deaths_reference_date(&self) -> NaiveDate {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        today - chrono::Duration::days(self.reporting_lag_days)
    }
}

fn string_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
        .collect()
}
