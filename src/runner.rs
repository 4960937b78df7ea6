//! Dependency-aware execution of all analysis units.
//!
//! The only ordering constraint is the chain daily-deaths → death-cause
//! ranking → population-pyramid variation; every other unit touches
//! disjoint output collections and runs on the rayon pool. A failed unit
//! writes nothing; units downstream of a failed chain link are skipped.

use crate::analysis::daily::{DailyCases, DailyDeaths, DailyHospitalizations};
use crate::analysis::death_causes::DeathCauseRanking;
use crate::analysis::diagnostics::DiagnosticTests;
use crate::analysis::hospitals::HospitalsPressure;
use crate::analysis::outbreaks::OutbreaksDescription;
use crate::analysis::pyramid::PopulationPyramid;
use crate::analysis::symptoms::Symptoms;
use crate::analysis::transmission::TransmissionIndicators;
use crate::analysis::vaccination::Vaccination;
use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use rayon::prelude::*;
use tracing::{error, info};

/// Outcome of one scheduled run over all units.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<&'static str>,
    pub failed: Vec<(&'static str, AnalysisError)>,
    pub skipped: Vec<&'static str>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

enum UnitOutcome {
    Completed(&'static str),
    Failed(&'static str, AnalysisError),
    Skipped(&'static str),
}

fn run_unit(ctx: &AnalysisContext<'_>, unit: &dyn AnalysisUnit) -> UnitOutcome {
    info!(unit = unit.name(), "running analysis unit");
    match unit.run(ctx) {
        Ok(()) => UnitOutcome::Completed(unit.name()),
        Err(err) => {
            error!(unit = unit.name(), error = %err, "analysis unit failed");
            UnitOutcome::Failed(unit.name(), err)
        }
    }
}

fn run_chain(ctx: &AnalysisContext<'_>, units: &[Box<dyn AnalysisUnit>]) -> Vec<UnitOutcome> {
    let mut outcomes = Vec::with_capacity(units.len());
    let mut broken = false;
    for unit in units {
        if broken {
            info!(unit = unit.name(), "skipping unit after upstream failure");
            outcomes.push(UnitOutcome::Skipped(unit.name()));
            continue;
        }
        let outcome = run_unit(ctx, unit.as_ref());
        if matches!(outcome, UnitOutcome::Failed(..)) {
            broken = true;
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Runs every analysis unit once: the dependent chain sequentially, the
/// independent units in parallel.
pub fn run_all(ctx: &AnalysisContext<'_>) -> RunSummary {
    let chain: Vec<Box<dyn AnalysisUnit>> = vec![
        Box::new(DailyDeaths),
        Box::new(DeathCauseRanking),
        Box::new(PopulationPyramid),
    ];
    let independent: Vec<Box<dyn AnalysisUnit>> = vec![
        Box::new(DailyCases),
        Box::new(DailyHospitalizations),
        Box::new(Vaccination),
        Box::new(DiagnosticTests),
        Box::new(HospitalsPressure),
        Box::new(TransmissionIndicators),
        Box::new(Symptoms),
        Box::new(OutbreaksDescription),
    ];

    let (chain_outcomes, independent_outcomes) = rayon::join(
        || run_chain(ctx, &chain),
        || {
            independent
                .par_iter()
                .map(|unit| run_unit(ctx, unit.as_ref()))
                .collect::<Vec<_>>()
        },
    );

    let mut summary = RunSummary::default();
    for outcome in chain_outcomes.into_iter().chain(independent_outcomes) {
        match outcome {
            UnitOutcome::Completed(name) => summary.completed.push(name),
            UnitOutcome::Failed(name, err) => summary.failed.push((name, err)),
            UnitOutcome::Skipped(name) => summary.skipped.push(name),
        }
    }
    info!(
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped.len(),
        "analysis run finished"
    );
    summary
}
