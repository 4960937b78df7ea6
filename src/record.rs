use crate::error::AnalysisError;
use chrono::NaiveDate;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

/// A single cell value inside a record.
///
/// `Null` is the explicit "no value" marker: non-finite floats are normalized
/// to it so that `NaN` never reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// Explicit absence of a value
    Null,
    /// Numeric value (always finite)
    Number(f64),
    /// Categorical / free-text value
    Text(String),
    /// Calendar day (no intra-day granularity)
    Date(NaiveDate),
    /// Semi-structured source field awaiting flattening
    Nested(Json),
}

impl Datum {
    /// Creates a numeric datum, normalizing non-finite values to `Null`.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Datum::Number(value)
        } else {
            Datum::Null
        }
    }

    /// Creates a text datum.
    pub fn text(value: impl Into<String>) -> Self {
        Datum::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Datum::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts a JSON value into a datum.
    ///
    /// Strings that parse as ISO 8601 dates (or date-times) become `Date`;
    /// objects and arrays stay `Nested` until explicitly flattened;
    /// non-finite numbers become `Null`.
    pub fn from_json(value: &Json) -> Self {
        match value {
            Json::Null => Datum::Null,
            Json::Bool(flag) => Datum::Number(if *flag { 1.0 } else { 0.0 }),
            Json::Number(number) => match number.as_f64() {
                Some(value) => Datum::number(value),
                None => Datum::Null,
            },
            Json::String(text) => parse_date_text(text)
                .map(Datum::Date)
                .unwrap_or_else(|| Datum::Text(text.clone())),
            Json::Object(_) | Json::Array(_) => Datum::Nested(value.clone()),
        }
    }

    /// Converts the datum back into a JSON value for storage.
    pub fn to_json(&self) -> Json {
        match self {
            Datum::Null => Json::Null,
            Datum::Number(value) => serde_json::Number::from_f64(*value)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Datum::Text(value) => Json::String(value.clone()),
            Datum::Date(value) => Json::String(value.format("%Y-%m-%d").to_string()),
            Datum::Nested(value) => value.clone(),
        }
    }

    /// Walks a path of object keys inside a `Nested` datum.
    pub fn json_path(&self, path: &[&str]) -> Option<&Json> {
        let Datum::Nested(root) = self else {
            return None;
        };
        let mut current = root;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Total ordering used for sorting and key comparison.
    ///
    /// Values of different kinds order by kind; `Null` sorts first.
    fn sort_cmp(&self, other: &Datum) -> Ordering {
        fn rank(datum: &Datum) -> u8 {
            match datum {
                Datum::Null => 0,
                Datum::Number(_) => 1,
                Datum::Date(_) => 2,
                Datum::Text(_) => 3,
                Datum::Nested(_) => 4,
            }
        }

        match (self, other) {
            (Datum::Number(a), Datum::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Datum::Date(a), Datum::Date(b)) => a.cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Canonical string form used for equality-based grouping and joining.
    fn key_repr(&self) -> Option<String> {
        match self {
            Datum::Null | Datum::Nested(_) => None,
            Datum::Number(value) => Some(format!("{}", value)),
            Datum::Text(value) => Some(value.clone()),
            Datum::Date(value) => Some(value.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Number(value) => write!(f, "{}", value),
            Datum::Text(value) => write!(f, "{}", value),
            Datum::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Datum::Nested(value) => write!(f, "{}", value),
        }
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|stamp| stamp.date_naive())
}

/// A flat record: an ordered map from column name to datum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: BTreeMap<String, Datum>,
}

impl Record {
    pub fn new() -> Self {
        Record {
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.fields.get(column)
    }

    /// Sets a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: Datum) {
        self.fields.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<Datum> {
        self.fields.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Numeric view of a column. Missing columns and `Null` both read as `None`.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.fields.get(column).and_then(Datum::as_number)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(Datum::as_text)
    }

    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.fields.get(column).and_then(Datum::as_date)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Builds a record from a JSON object. Returns `None` for non-objects.
    pub fn from_json(value: &Json) -> Option<Self> {
        let object = value.as_object()?;
        let mut record = Record::new();
        for (column, value) in object {
            record.set(column.clone(), Datum::from_json(value));
        }
        Some(record)
    }

    /// Serializes the record to a JSON object for storage.
    pub fn to_json(&self) -> Json {
        let mut object = serde_json::Map::new();
        for (column, value) in &self.fields {
            object.insert(column.clone(), value.to_json());
        }
        Json::Object(object)
    }
}

/// Sort direction for [`Table::sort_by_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// An in-memory table: a vector of flat records.
///
/// All analysis units operate on tables loaded wholesale from the store,
/// transformed in memory, and written back wholesale.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    rows: Vec<Record>,
}

impl Table {
    pub fn new() -> Self {
        Table { rows: Vec::new() }
    }

    pub fn from_rows(rows: Vec<Record>) -> Self {
        Table { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Record] {
        &mut self.rows
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    /// True if any row carries the column.
    pub fn has_column(&self, column: &str) -> bool {
        self.rows.iter().any(|row| row.contains(column))
    }

    /// Keeps only the rows matching the predicate.
    pub fn retain<F>(&mut self, predicate: F)
    where
        F: FnMut(&Record) -> bool,
    {
        self.rows.retain(predicate);
    }

    /// Returns a new table restricted to the given columns.
    ///
    /// Columns absent from a row are simply absent from the projected row.
    pub fn select(&self, columns: &[&str]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut projected = Record::new();
                for column in columns {
                    if let Some(value) = row.get(column) {
                        projected.set(*column, value.clone());
                    }
                }
                projected
            })
            .collect();
        Table { rows }
    }

    pub fn drop_columns(&mut self, columns: &[&str]) {
        for row in &mut self.rows {
            for column in columns {
                row.remove(column);
            }
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        for row in &mut self.rows {
            if let Some(value) = row.remove(from) {
                row.set(to, value);
            }
        }
    }

    /// Sets a column to the same value on every row.
    pub fn set_column(&mut self, column: &str, value: Datum) {
        for row in &mut self.rows {
            row.set(column, value.clone());
        }
    }

    /// Replaces text values in a column through a translation map.
    /// Values without a translation are left untouched.
    pub fn replace_column_values(&mut self, column: &str, translations: &HashMap<String, String>) {
        for row in &mut self.rows {
            let Some(current) = row.text(column) else {
                continue;
            };
            if let Some(translated) = translations.get(current) {
                row.set(column, Datum::Text(translated.clone()));
            }
        }
    }

    /// Stable ascending sort by the given columns.
    pub fn sort_by(&mut self, columns: &[&str]) {
        let specs: Vec<(&str, SortOrder)> = columns
            .iter()
            .map(|column| (*column, SortOrder::Ascending))
            .collect();
        self.sort_by_with(&specs);
    }

    /// Stable sort with a per-column direction.
    pub fn sort_by_with(&mut self, columns: &[(&str, SortOrder)]) {
        self.rows.sort_by(|a, b| {
            for (column, order) in columns {
                let left = a.get(column).unwrap_or(&Datum::Null);
                let right = b.get(column).unwrap_or(&Datum::Null);
                let ordering = match order {
                    SortOrder::Ascending => left.sort_cmp(right),
                    SortOrder::Descending => right.sort_cmp(left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Appends the rows of another table.
    pub fn concat(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }

    /// Inner join on an equality key set.
    ///
    /// Rows whose key is missing or `Null` on either side are dropped
    /// silently (the known-drop policy for unmatched cross-table keys).
    /// Non-key columns of the right side are copied onto the matched left
    /// row; on a column name collision the right value wins, so callers
    /// rename columns up front when both sides must survive.
    pub fn inner_join(&self, other: &Table, keys: &[&str]) -> Table {
        let mut right_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, row) in other.rows.iter().enumerate() {
            if let Some(key) = join_key(row, keys) {
                right_index.entry(key).or_default().push(position);
            }
        }

        let mut rows = Vec::new();
        for left in &self.rows {
            let Some(key) = join_key(left, keys) else {
                continue;
            };
            let Some(matches) = right_index.get(&key) else {
                continue;
            };
            for &position in matches {
                let mut joined = left.clone();
                let right = &other.rows[position];
                for column in right.columns().map(str::to_string).collect::<Vec<_>>() {
                    if keys.contains(&column.as_str()) {
                        continue;
                    }
                    if let Some(value) = right.get(&column) {
                        joined.set(column, value.clone());
                    }
                }
                rows.push(joined);
            }
        }
        Table { rows }
    }

    /// Groups by the key columns and sums the given numeric columns.
    ///
    /// Missing values are skipped; a group with no present values sums to 0.
    /// Groups appear in first-seen order.
    pub fn group_sum(&self, keys: &[&str], value_columns: &[&str]) -> Table {
        self.grouped(keys, value_columns, |values| {
            Datum::number(values.iter().sum())
        })
    }

    /// Groups by the key columns and averages the given numeric columns.
    ///
    /// A group with no present values yields `Null`.
    pub fn group_mean(&self, keys: &[&str], value_columns: &[&str]) -> Table {
        self.grouped(keys, value_columns, |values| {
            if values.is_empty() {
                Datum::Null
            } else {
                Datum::number(values.iter().sum::<f64>() / values.len() as f64)
            }
        })
    }

    fn grouped<F>(&self, keys: &[&str], value_columns: &[&str], fold: F) -> Table
    where
        F: Fn(&[f64]) -> Datum,
    {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (Record, Vec<Vec<f64>>)> = HashMap::new();

        for row in &self.rows {
            let Some(key) = join_key(row, keys) else {
                continue;
            };
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                let mut template = Record::new();
                for column in keys {
                    if let Some(value) = row.get(column) {
                        template.set(*column, value.clone());
                    }
                }
                (template, vec![Vec::new(); value_columns.len()])
            });
            for (slot, column) in value_columns.iter().enumerate() {
                if let Some(value) = row.number(column) {
                    entry.1[slot].push(value);
                }
            }
        }

        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            let Some((mut record, collected)) = groups.remove(&key) else {
                continue;
            };
            for (slot, column) in value_columns.iter().enumerate() {
                record.set(*column, fold(&collected[slot]));
            }
            rows.push(record);
        }
        Table { rows }
    }

    /// Unpivots wide columns into (variable, value) rows.
    ///
    /// For every row and every entry of `value_columns`, produces one output
    /// row carrying the id columns, `var_name` = the column name, and
    /// `value_name` = that column's datum.
    pub fn melt(
        &self,
        id_columns: &[&str],
        value_columns: &[&str],
        var_name: &str,
        value_name: &str,
    ) -> Table {
        let mut rows = Vec::with_capacity(self.rows.len() * value_columns.len());
        for column in value_columns {
            for row in &self.rows {
                let mut melted = Record::new();
                for id in id_columns {
                    if let Some(value) = row.get(id) {
                        melted.set(*id, value.clone());
                    }
                }
                melted.set(var_name, Datum::Text((*column).to_string()));
                melted.set(
                    value_name,
                    row.get(column).cloned().unwrap_or(Datum::Null),
                );
                rows.push(melted);
            }
        }
        Table { rows }
    }

    /// Flattens one scalar out of a nested source column.
    ///
    /// Reads `path` inside the `Nested` datum at `source_column` and stores
    /// the scalar under `output_column` on every row. A missing source
    /// column, a missing sub-field, or a non-scalar leaf is fatal for the
    /// caller's run: no partial flattening is applied.
    pub fn flatten_nested(
        &mut self,
        source_column: &str,
        path: &[&str],
        output_column: &str,
    ) -> Result<(), AnalysisError> {
        let mut extracted = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let source = row.get(source_column).ok_or_else(|| AnalysisError::MalformedField {
                column: source_column.to_string(),
                path: path.join("."),
            })?;
            let leaf = source
                .json_path(path)
                .ok_or_else(|| AnalysisError::MalformedField {
                    column: source_column.to_string(),
                    path: path.join("."),
                })?;
            let value = Datum::from_json(leaf);
            if matches!(value, Datum::Nested(_)) {
                return Err(AnalysisError::MalformedField {
                    column: source_column.to_string(),
                    path: path.join("."),
                });
            }
            extracted.push(value);
        }
        for (row, value) in self.rows.iter_mut().zip(extracted) {
            row.set(output_column, value);
        }
        Ok(())
    }
}

/// Canonical grouping/joining key for a record over the given columns.
/// `None` when any key column is missing, `Null`, or nested.
pub(crate) fn join_key(record: &Record, keys: &[&str]) -> Option<String> {
    let mut parts = Vec::with_capacity(keys.len());
    for column in keys {
        parts.push(record.get(column)?.key_repr()?);
    }
    Some(parts.join("\u{1f}"))
}
