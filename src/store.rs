//! Table store adapter: the boundary between the analysis units and the two
//! document collections (extracted input tables, analyzed output tables).
//!
//! The adapter returns flat records; any semi-structured source field is
//! flattened once at this boundary (via dotted projection paths) or kept as
//! a `Nested` datum for an explicit flatten step right after the read call.

use crate::record::{Datum, Record, Table};
use rusqlite::Connection;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Errors raised by a table store backend.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying backend failure (connection, SQL, I/O)
    Backend(String),
    /// A stored document is not a flat-convertible JSON object
    MalformedDocument { collection: String, detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "backend error: {}", msg),
            StoreError::MalformedDocument { collection, detail } => {
                write!(f, "malformed document in '{}': {}", collection, detail)
            }
        }
    }
}

impl std::error::Error for StoreError {}

fn sql_error(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(format!("SQL error: {}", err))
}

/// Equality predicate over one or more columns.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Datum)>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    /// Adds an equality clause. All clauses must match (conjunction).
    pub fn eq(mut self, column: impl Into<String>, value: Datum) -> Self {
        self.clauses.push((column.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.clauses
            .iter()
            .all(|(column, expected)| record.get(column) == Some(expected))
    }
}

/// Uniform read/write interface over a named document collection.
///
/// `write` replaces the whole collection (overwrite, not append/upsert);
/// `read_raw`/`append_raw` move documents verbatim and exist for the
/// "just move" analyzers that relocate data without transforming it.
pub trait TableStore: Send {
    /// Reads a collection with an equality filter and an optional projection.
    ///
    /// Projection entries may use dotted paths (`patients.total.percentage`)
    /// to flatten one nested scalar at the read boundary; the output column
    /// takes the name of the last path segment. A dotted projection over a
    /// missing sub-field is an error, not a silent `Null`.
    fn read_where(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Table, StoreError>;

    /// Reads all rows and columns of a collection.
    fn read(&self, collection: &str) -> Result<Table, StoreError> {
        self.read_where(collection, &Filter::default(), None)
    }

    /// Replaces the entire contents of the collection with the given rows.
    fn write(&mut self, collection: &str, table: &Table) -> Result<(), StoreError>;

    /// Removes every document of the collection.
    fn delete_all(&mut self, collection: &str) -> Result<(), StoreError>;

    /// Reads the raw documents of a collection, untransformed.
    fn read_raw(&self, collection: &str) -> Result<Vec<Json>, StoreError>;

    /// Appends raw documents to a collection.
    fn append_raw(&mut self, collection: &str, documents: &[Json]) -> Result<(), StoreError>;
}

/// Relocates a collection between stores without transforming it:
/// delete-then-copy, matching the "just move" analyzers.
pub fn move_collection(
    source: &dyn TableStore,
    destination: &mut dyn TableStore,
    collection: &str,
) -> Result<usize, StoreError> {
    let documents = source.read_raw(collection)?;
    destination.delete_all(collection)?;
    destination.append_raw(collection, &documents)?;
    Ok(documents.len())
}

fn record_from_document(
    collection: &str,
    document: &Json,
    filter: &Filter,
    projection: Option<&[&str]>,
) -> Result<Option<Record>, StoreError> {
    let record = Record::from_json(document).ok_or_else(|| StoreError::MalformedDocument {
        collection: collection.to_string(),
        detail: "document is not an object".to_string(),
    })?;

    if !filter.matches(&record) {
        return Ok(None);
    }

    let Some(columns) = projection else {
        return Ok(Some(record));
    };

    let mut projected = Record::new();
    for entry in columns {
        if let Some((column, path)) = split_dotted(entry) {
            let source = record
                .get(column)
                .and_then(|datum| datum.json_path(&path))
                .ok_or_else(|| StoreError::MalformedDocument {
                    collection: collection.to_string(),
                    detail: format!("missing nested field '{}'", entry),
                })?;
            let leaf = path.last().map(|s| s.to_string()).unwrap_or_default();
            projected.set(leaf, Datum::from_json(source));
        } else if let Some(value) = record.get(entry) {
            projected.set(*entry, value.clone());
        }
    }
    Ok(Some(projected))
}

fn split_dotted<'a>(entry: &'a str) -> Option<(&'a str, Vec<&'a str>)> {
    let mut segments = entry.split('.');
    let column = segments.next()?;
    let path: Vec<&str> = segments.collect();
    if path.is_empty() {
        None
    } else {
        Some((column, path))
    }
}

fn documents_to_table(
    collection: &str,
    documents: &[Json],
    filter: &Filter,
    projection: Option<&[&str]>,
) -> Result<Table, StoreError> {
    let mut table = Table::new();
    for document in documents {
        if let Some(record) = record_from_document(collection, document, filter, projection)? {
            table.push(record);
        }
    }
    Ok(table)
}

/// In-memory table store, used by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableStore {
    collections: HashMap<String, Vec<Json>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        InMemoryTableStore::default()
    }
}

impl TableStore for InMemoryTableStore {
    fn read_where(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Table, StoreError> {
        let documents = self
            .collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default();
        documents_to_table(collection, documents, filter, projection)
    }

    fn write(&mut self, collection: &str, table: &Table) -> Result<(), StoreError> {
        let documents = table.rows().iter().map(Record::to_json).collect();
        self.collections.insert(collection.to_string(), documents);
        Ok(())
    }

    fn delete_all(&mut self, collection: &str) -> Result<(), StoreError> {
        self.collections.remove(collection);
        Ok(())
    }

    fn read_raw(&self, collection: &str) -> Result<Vec<Json>, StoreError> {
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }

    fn append_raw(&mut self, collection: &str, documents: &[Json]) -> Result<(), StoreError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend_from_slice(documents);
        Ok(())
    }
}

/// SQLite-backed table store.
///
/// Each collection lives in a single `documents` table as JSON rows, one
/// record per row, ordered by insertion position. The schema is created on
/// first use.
#[derive(Debug)]
pub struct SqliteTableStore {
    conn: Connection,
}

impl SqliteTableStore {
    /// Opens (or creates) a file-based store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).map_err(sql_error)?;
        let store = SqliteTableStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store. Useful for testing.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        let store = SqliteTableStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    document TEXT NOT NULL,
                    PRIMARY KEY (collection, position)
                )",
                [],
            )
            .map_err(sql_error)?;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_documents_collection
                 ON documents(collection)",
                [],
            )
            .map_err(sql_error)?;
        Ok(())
    }

    fn load_documents(&self, collection: &str) -> Result<Vec<Json>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT document FROM documents
                 WHERE collection = ?1 ORDER BY position",
            )
            .map_err(sql_error)?;
        let rows = stmt
            .query_map([collection], |row| row.get::<_, String>(0))
            .map_err(sql_error)?;

        let mut documents = Vec::new();
        for row in rows {
            let text = row.map_err(sql_error)?;
            let document: Json =
                serde_json::from_str(&text).map_err(|e| StoreError::MalformedDocument {
                    collection: collection.to_string(),
                    detail: format!("invalid JSON: {}", e),
                })?;
            documents.push(document);
        }
        Ok(documents)
    }

    fn next_position(&self, collection: &str) -> Result<i64, StoreError> {
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM documents WHERE collection = ?1",
                [collection],
                |row| row.get(0),
            )
            .map_err(sql_error)
    }

    fn insert_documents(&mut self, collection: &str, documents: &[Json]) -> Result<(), StoreError> {
        let start = self.next_position(collection)?;
        let tx = self.conn.transaction().map_err(sql_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO documents (collection, position, document)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(sql_error)?;
            for (offset, document) in documents.iter().enumerate() {
                stmt.execute(rusqlite::params![
                    collection,
                    start + offset as i64,
                    document.to_string()
                ])
                .map_err(sql_error)?;
            }
        }
        tx.commit().map_err(sql_error)
    }
}

impl TableStore for SqliteTableStore {
    fn read_where(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Table, StoreError> {
        let documents = self.load_documents(collection)?;
        documents_to_table(collection, &documents, filter, projection)
    }

    fn write(&mut self, collection: &str, table: &Table) -> Result<(), StoreError> {
        let documents: Vec<Json> = table.rows().iter().map(Record::to_json).collect();
        self.delete_all(collection)?;
        self.insert_documents(collection, &documents)
    }

    fn delete_all(&mut self, collection: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM documents WHERE collection = ?1", [collection])
            .map_err(sql_error)?;
        Ok(())
    }

    fn read_raw(&self, collection: &str) -> Result<Vec<Json>, StoreError> {
        self.load_documents(collection)
    }

    fn append_raw(&mut self, collection: &str, documents: &[Json]) -> Result<(), StoreError> {
        self.insert_documents(collection, documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample_table() -> Table {
        let mut table = Table::new();
        let mut row = Record::new();
        row.set("date", Datum::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()));
        row.set("autonomous_region", Datum::text("Madrid"));
        row.set("new_cases", Datum::Number(12.0));
        table.push(row);
        let mut row = Record::new();
        row.set("date", Datum::Date(NaiveDate::from_ymd_opt(2021, 1, 2).unwrap()));
        row.set("autonomous_region", Datum::text("Galicia"));
        row.set("new_cases", Datum::Number(3.0));
        table.push(row);
        table
    }

    #[test]
    fn sqlite_round_trip_preserves_rows() {
        let mut store = SqliteTableStore::new_in_memory().unwrap();
        let table = sample_table();
        store.write("daily_data", &table).unwrap();

        let restored = store.read("daily_data").unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn write_replaces_previous_contents() {
        let mut store = SqliteTableStore::new_in_memory().unwrap();
        store.write("cases", &sample_table()).unwrap();

        let mut replacement = Table::new();
        let mut row = Record::new();
        row.set("autonomous_region", Datum::text("Aragón"));
        replacement.push(row);
        store.write("cases", &replacement).unwrap();

        let restored = store.read("cases").unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.rows()[0].text("autonomous_region"), Some("Aragón"));
    }

    #[test]
    fn read_missing_collection_is_empty() {
        let store = SqliteTableStore::new_in_memory().unwrap();
        let table = store.read("nonexistent").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn read_where_applies_equality_filter_and_projection() {
        let mut store = InMemoryTableStore::new();
        store.write("daily_data", &sample_table()).unwrap();

        let filter = Filter::new().eq("autonomous_region", Datum::text("Madrid"));
        let table = store
            .read_where("daily_data", &filter, Some(&["date", "new_cases"]))
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].number("new_cases"), Some(12.0));
        assert!(!table.rows()[0].contains("autonomous_region"));
    }

    #[test]
    fn filter_on_date_column_matches_parsed_dates() {
        let mut store = InMemoryTableStore::new();
        store
            .append_raw(
                "clinic_description",
                &[
                    json!({"date": "2020-05-29", "symptom": "fever"}),
                    json!({"date": "2020-05-30", "symptom": "cough"}),
                ],
            )
            .unwrap();

        let filter = Filter::new().eq(
            "date",
            Datum::Date(NaiveDate::from_ymd_opt(2020, 5, 29).unwrap()),
        );
        let table = store.read_where("clinic_description", &filter, None).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].text("symptom"), Some("fever"));
    }

    #[test]
    fn dotted_projection_flattens_nested_scalar() {
        let mut store = InMemoryTableStore::new();
        store
            .append_raw(
                "clinic_description",
                &[json!({
                    "symptom": "fever",
                    "patients": {"total": {"percentage": 43.8}}
                })],
            )
            .unwrap();

        let table = store
            .read_where(
                "clinic_description",
                &Filter::default(),
                Some(&["symptom", "patients.total.percentage"]),
            )
            .unwrap();

        assert_eq!(table.rows()[0].number("percentage"), Some(43.8));
        assert!(!table.rows()[0].contains("patients"));
    }

    #[test]
    fn dotted_projection_over_missing_subfield_fails() {
        let mut store = InMemoryTableStore::new();
        store
            .append_raw(
                "clinic_description",
                &[json!({"symptom": "fever", "patients": {"total": {}}})],
            )
            .unwrap();

        let result = store.read_where(
            "clinic_description",
            &Filter::default(),
            Some(&["patients.total.percentage"]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn non_object_document_is_malformed() {
        let mut store = InMemoryTableStore::new();
        store.append_raw("broken", &[json!([1, 2, 3])]).unwrap();
        let result = store.read("broken");
        assert!(matches!(result, Err(StoreError::MalformedDocument { .. })));
    }

    #[test]
    fn move_collection_copies_documents_verbatim() {
        let mut source = InMemoryTableStore::new();
        let documents = vec![
            json!({"age_range": "20-29", "doses": {"first": 10}}),
            json!({"age_range": "30-39", "doses": {"first": 20}}),
        ];
        source.append_raw("vaccination_ages_single", &documents).unwrap();

        let mut destination = InMemoryTableStore::new();
        // Pre-existing stale contents must be deleted first
        destination
            .append_raw("vaccination_ages_single", &[json!({"stale": true})])
            .unwrap();

        let moved = move_collection(&source, &mut destination, "vaccination_ages_single").unwrap();
        assert_eq!(moved, 2);
        assert_eq!(
            destination.read_raw("vaccination_ages_single").unwrap(),
            documents
        );
    }

    #[test]
    fn sqlite_append_raw_extends_collection() {
        let mut store = SqliteTableStore::new_in_memory().unwrap();
        store.append_raw("outbreaks_description", &[json!({"a": 1})]).unwrap();
        store.append_raw("outbreaks_description", &[json!({"b": 2})]).unwrap();
        let documents = store.read_raw("outbreaks_description").unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0], json!({"a": 1}));
        assert_eq!(documents[1], json!({"b": 2}));
    }
}
