//! Batch Analysis Binary
//!
//! Run with: `cargo run --bin epi-analytics`

use epi_analytics::{run_all, AnalysisConfig, AnalysisContext, SqliteTableStore, TableStore};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level:
    //   RUST_LOG=debug cargo run --bin epi-analytics
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let extracted_path =
        std::env::var("EXTRACTED_DB_PATH").unwrap_or_else(|_| "extracted.db".to_string());
    let analyzed_path =
        std::env::var("ANALYZED_DB_PATH").unwrap_or_else(|_| "analyzed.db".to_string());
    let config = match std::env::var("ANALYSIS_CONFIG") {
        Ok(path) => AnalysisConfig::from_file(&path)?,
        Err(_) => AnalysisConfig::default(),
    };

    let extracted: Mutex<Box<dyn TableStore>> =
        Mutex::new(Box::new(SqliteTableStore::new(&extracted_path)?));
    let analyzed: Mutex<Box<dyn TableStore>> =
        Mutex::new(Box::new(SqliteTableStore::new(&analyzed_path)?));
    let ctx = AnalysisContext::new(&extracted, &analyzed, &config);

    let summary = run_all(&ctx);
    for (unit, error) in &summary.failed {
        eprintln!("{} failed: {}", unit, error);
    }
    for unit in &summary.skipped {
        eprintln!("{} skipped (upstream failure)", unit);
    }

    if !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
