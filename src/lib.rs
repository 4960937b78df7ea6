pub mod analysis;
pub mod calc;
pub mod config;
pub mod error;
pub mod record;
pub mod rolling;
pub mod runner;
pub mod store;


pub use analysis::daily::{DailyCases, DailyDeaths, DailyHospitalizations};
pub use analysis::death_causes::DeathCauseRanking;
pub use analysis::diagnostics::DiagnosticTests;
pub use analysis::hospitals::HospitalsPressure;
pub use analysis::outbreaks::OutbreaksDescription;
pub use analysis::pyramid::PopulationPyramid;
pub use analysis::symptoms::Symptoms;
pub use analysis::transmission::TransmissionIndicators;
pub use analysis::vaccination::Vaccination;
pub use analysis::{AnalysisContext, AnalysisUnit};
pub use calc::{
    add_per_population_column, add_ratio_column, inverted_incidence, per_population,
    ratio_percentage,
};
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use record::{Datum, Record, SortOrder, Table};
pub use rolling::{rolling_by_partition, RollingKind, RollingOp};
pub use runner::{run_all, RunSummary};
pub use store::{
    move_collection, Filter, InMemoryTableStore, SqliteTableStore, StoreError, TableStore,
};
