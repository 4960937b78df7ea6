use chrono::NaiveDate;
use epi_analytics::{
    run_all, AnalysisConfig, AnalysisContext, DailyCases, AnalysisUnit, SqliteTableStore,
    TableStore,
};
use serde_json::json;
use std::sync::Mutex;

fn seeded_sqlite_store() -> SqliteTableStore {
    let mut store = SqliteTableStore::new_in_memory().unwrap();
    store
        .append_raw(
            "daily_data",
            &[
                json!({"date": "2021-01-01", "autonomous_region": "Madrid",
                       "gender": "F", "age_range": "0-9",
                       "new_cases": 10.0, "total_cases": 10.0,
                       "new_deaths": 0.0, "total_deaths": 0.0,
                       "new_hospitalizations": 1.0, "total_hospitalizations": 1.0,
                       "new_ic_hospitalizations": 0.0, "total_ic_hospitalizations": 0.0}),
                json!({"date": "2021-01-02", "autonomous_region": "Madrid",
                       "gender": "F", "age_range": "0-9",
                       "new_cases": 0.0, "total_cases": 10.0,
                       "new_deaths": 0.0, "total_deaths": 0.0,
                       "new_hospitalizations": 0.0, "total_hospitalizations": 1.0,
                       "new_ic_hospitalizations": 0.0, "total_ic_hospitalizations": 0.0}),
                json!({"date": "2021-01-03", "autonomous_region": "Madrid",
                       "gender": "F", "age_range": "0-9",
                       "new_cases": 20.0, "total_cases": 30.0,
                       "new_deaths": 1.0, "total_deaths": 1.0,
                       "new_hospitalizations": 2.0, "total_hospitalizations": 3.0,
                       "new_ic_hospitalizations": 1.0, "total_ic_hospitalizations": 1.0}),
            ],
        )
        .unwrap();
    store
        .append_raw(
            "population_ar",
            &[json!({"autonomous_region": "Madrid", "age_range": "0-4",
                     "M": 0.0, "F": 1000.0, "total": 1000.0})],
        )
        .unwrap();
    store
}

#[test]
fn cases_pipeline_runs_against_sqlite() {
    let extracted: Mutex<Box<dyn TableStore>> = Mutex::new(Box::new(seeded_sqlite_store()));
    let analyzed: Mutex<Box<dyn TableStore>> =
        Mutex::new(Box::new(SqliteTableStore::new_in_memory().unwrap()));
    let config = AnalysisConfig::default();
    let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

    DailyCases.run(&ctx).unwrap();

    let cases = analyzed.lock().unwrap().read("cases").unwrap();
    assert_eq!(cases.len(), 3);
    let rates: Vec<Option<f64>> = cases
        .rows()
        .iter()
        .map(|row| row.number("new_cases_per_population"))
        .collect();
    assert_eq!(rates, vec![Some(1000.0), Some(0.0), Some(2000.0)]);
    assert_eq!(cases.rows()[2].number("ci_last_14_days"), Some(3000.0));
}

#[test]
fn full_run_against_sqlite_persists_and_rereads() {
    let extracted: Mutex<Box<dyn TableStore>> = Mutex::new(Box::new(seeded_sqlite_store()));
    let analyzed: Mutex<Box<dyn TableStore>> =
        Mutex::new(Box::new(SqliteTableStore::new_in_memory().unwrap()));
    let config = AnalysisConfig {
        today: Some(NaiveDate::from_ymd_opt(2021, 1, 10).unwrap()),
        ..AnalysisConfig::default()
    };
    let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

    let summary = run_all(&ctx);
    assert!(summary.all_succeeded(), "failures: {:?}", summary.failed);

    // Rerunning over the same input replaces the outputs with identical rows
    let first = analyzed.lock().unwrap().read_raw("cases").unwrap();
    let summary = run_all(&ctx);
    assert!(summary.all_succeeded(), "failures: {:?}", summary.failed);
    let second = analyzed.lock().unwrap().read_raw("cases").unwrap();
    assert_eq!(first, second);
}
