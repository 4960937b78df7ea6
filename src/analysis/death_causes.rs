//! Death-cause ranking: merges the historical death-causes reference with
//! the COVID-attributed deaths derived from the daily-deaths output, ranks
//! causes per (age_range, gender), and compares COVID against all causes.
//!
//! This is the one time-dependent unit: the COVID death count is either the
//! trailing-365-day delta of the cumulative national series (once a full
//! year of data exists since the epidemic start) or a pro-rated
//! extrapolation to 365 days.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::calc::ratio_percentage;
use crate::error::AnalysisError;
use crate::record::{join_key, Datum, SortOrder, Table};
use crate::store::Filter;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::info;

const TOP_CAUSES: usize = 10;

/// National COVID deaths per (age_range, gender), normalized to a 365-day
/// window ending at the lag-adjusted reference date.
fn national_covid_deaths(ctx: &AnalysisContext<'_>) -> Result<Table, AnalysisError> {
    let config = ctx.config;
    let today = config.today.unwrap_or_else(|| Utc::now().date_naive());
    let reference = config.deaths_reference_date();
    let observed_days = (reference - config.epidemic_start).num_days();
    if observed_days <= 0 {
        return Err(AnalysisError::Config(format!(
            "reference date {} precedes the epidemic start {}",
            reference, config.epidemic_start
        )));
    }

    let projection = ["age_range", "total_deaths", "gender"];
    let at_reference = Filter::new()
        .eq("autonomous_region", Datum::text(config.national_region.as_str()))
        .eq("date", Datum::Date(reference));
    let mut covid = ctx.read_analyzed_where("deaths", &at_reference, Some(&projection))?;

    if (today - config.epidemic_start).num_days() >= 365 {
        // A full year of data exists: trailing-365-day delta of the
        // cumulative series.
        let year_ago = reference - Duration::days(365);
        let at_year_ago = Filter::new()
            .eq("autonomous_region", Datum::text(config.national_region.as_str()))
            .eq("date", Datum::Date(year_ago));
        let mut prior = ctx.read_analyzed_where("deaths", &at_year_ago, Some(&projection))?;
        prior.rename_column("total_deaths", "total_deaths_year_ago");

        let mut joined = covid.inner_join(&prior, &["age_range", "gender"]);
        for row in joined.rows_mut() {
            let current = row.number("total_deaths").unwrap_or(0.0);
            let previous = row.number("total_deaths_year_ago").unwrap_or(0.0);
            row.set("total_deaths", Datum::number(current - previous));
        }
        joined.drop_columns(&["total_deaths_year_ago"]);
        covid = joined;
    } else {
        // Less than a year observed: extrapolate to 365 days.
        let scale = 365.0 / observed_days as f64;
        for row in covid.rows_mut() {
            let observed = row.number("total_deaths").unwrap_or(0.0);
            row.set("total_deaths", Datum::number(observed * scale));
        }
    }

    covid.set_column("death_cause", Datum::text(config.covid_cause_label.as_str()));
    Ok(covid)
}

pub struct DeathCauseRanking;

impl AnalysisUnit for DeathCauseRanking {
    fn name(&self) -> &'static str {
        "analyze_death_causes"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let config = ctx.config;
        let covid = national_covid_deaths(ctx)?;

        let mut causes = ctx.read_extracted("death_causes")?;
        causes.replace_column_values("age_range", &config.death_causes_age_buckets);
        let causes = causes.group_sum(&["age_range", "death_cause", "gender"], &["total_deaths"]);

        let all_causes_label = config.all_causes_label.as_str();
        let mut all_causes = causes.clone();
        all_causes.retain(|row| row.text("death_cause") == Some(all_causes_label));
        let mut specific = causes;
        specific.retain(|row| row.text("death_cause") != Some(all_causes_label));

        // Rank causes (COVID included) within each (age_range, gender)
        let mut combined = covid.clone();
        combined.concat(specific);
        combined.sort_by_with(&[
            ("age_range", SortOrder::Descending),
            ("total_deaths", SortOrder::Descending),
            ("gender", SortOrder::Descending),
        ]);

        let mut ranked = Table::new();
        let mut kept: HashMap<String, usize> = HashMap::new();
        for row in combined.rows() {
            let Some(group) = join_key(row, &["age_range", "gender"]) else {
                continue;
            };
            let count = kept.entry(group).or_insert(0);
            if *count >= TOP_CAUSES {
                continue;
            }
            *count += 1;
            let mut row = row.clone();
            if let Some(total) = row.number("total_deaths") {
                row.set("total_deaths", Datum::number(total.round()));
            }
            ranked.push(row);
        }
        info!(rows = ranked.len(), "ranked top death causes");
        ctx.write_analyzed("top_death_causes", &ranked)?;

        // COVID's share of all-cause deaths per (age_range, gender)
        let mut covid_deaths = covid;
        covid_deaths.rename_column("total_deaths", "covid_deaths");
        covid_deaths.drop_columns(&["death_cause"]);
        let mut other_deaths = all_causes;
        other_deaths.rename_column("total_deaths", "other_deaths");
        other_deaths.drop_columns(&["death_cause"]);

        let mut versus = covid_deaths.inner_join(&other_deaths, &["age_range", "gender"]);
        for row in versus.rows_mut() {
            let covid = row.number("covid_deaths").unwrap_or(0.0);
            let other = row.number("other_deaths").unwrap_or(0.0);
            row.set(
                "covid_percentage",
                Datum::number(ratio_percentage(covid, covid + other)),
            );
        }
        info!(rows = versus.len(), "compared covid against all death causes");
        ctx.write_analyzed("covid_vs_all_deaths", &versus)
    }
}
