//! Tabular assembly: combines normalized records into a table with
//! per-column inferred types and a canonical column ordering.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::AppError;
use crate::normalize::{context_column, value_to_string, NormalizedRecord};

/// Columns expected on every search result, ordered first for
/// readability when present. Context columns follow, up to the deepest
/// observed context path.
pub const PREFERRED_FIRST_COLUMNS: [&str; 13] = [
    "uri",
    "citation uri",
    "label",
    "item category",
    "project label",
    "project uri",
    "published",
    "updated",
    "latitude",
    "longitude",
    "early bce/ce",
    "late bce/ce",
    "context uri",
];

/// Inferred data type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    DateTime,
    Text,
}

/// An ordered collection of normalized records with per-column types.
///
/// Built fresh per query; never persisted (only the raw JSON pages are
/// cached).
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    types: HashMap<String, ColumnType>,
    rows: Vec<NormalizedRecord>,
    max_context_depth: usize,
}

impl Table {
    /// Assemble a table: discover columns, infer types, order columns.
    pub fn from_records(rows: Vec<NormalizedRecord>, max_context_depth: usize) -> Self {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        let mut table = Self {
            columns,
            types: HashMap::new(),
            rows,
            max_context_depth,
        };
        table.infer_types();
        table.reorder();
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.types.get(column).copied()
    }

    pub fn rows(&self) -> &[NormalizedRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Scan each column's values for its type. Boolean columns get their
    /// missing cells filled with an explicit `false`.
    fn infer_types(&mut self) {
        let mut types = HashMap::new();
        for column in &self.columns {
            types.insert(column.clone(), infer_column_type(column, &self.rows));
        }
        for (column, column_type) in &types {
            if *column_type == ColumnType::Bool {
                for row in &mut self.rows {
                    row.entry(column.clone()).or_insert(Value::Bool(false));
                }
            }
        }
        self.types = types;
    }

    /// Apply the canonical column ordering. Idempotent: reordering an
    /// already-ordered table is a no-op.
    ///
    /// Order: preferred-first columns (incl. context depth columns), then
    /// text columns by ascending distinct-value count (low-cardinality
    /// facets surface first), then boolean columns alphabetically, then
    /// everything else alphabetically.
    pub fn reorder(&mut self) {
        let first: Vec<String> = PREFERRED_FIRST_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain((1..=self.max_context_depth).map(context_column))
            .filter(|c| self.types.contains_key(c))
            .collect();
        let first_set: HashSet<&String> = first.iter().collect();

        let others: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !first_set.contains(c))
            .cloned()
            .collect();

        let counts: HashMap<String, usize> = others
            .iter()
            .filter(|c| self.types[*c] == ColumnType::Text)
            .map(|c| (c.clone(), self.distinct_count(c)))
            .collect();
        let mut text_columns: Vec<String> = others
            .iter()
            .filter(|c| self.types[*c] == ColumnType::Text)
            .cloned()
            .collect();
        // Stable sort: ties keep their current relative order, which is
        // what makes repeated reordering a no-op.
        text_columns.sort_by_key(|c| counts[c]);

        let mut bool_columns: Vec<String> = others
            .iter()
            .filter(|c| self.types[*c] == ColumnType::Bool)
            .cloned()
            .collect();
        bool_columns.sort();

        let middle_set: HashSet<&String> = text_columns.iter().chain(&bool_columns).collect();
        let mut final_columns: Vec<String> = others
            .iter()
            .filter(|c| !middle_set.contains(c))
            .cloned()
            .collect();
        final_columns.sort();

        let mut ordered = first;
        ordered.extend(text_columns);
        ordered.extend(bool_columns);
        ordered.extend(final_columns);
        self.columns = ordered;
    }

    /// Distinct values in a column, counting "missing" as one value when
    /// any row lacks the column.
    fn distinct_count(&self, column: &str) -> usize {
        self.rows
            .iter()
            .map(|row| row.get(column).map(|v| v.to_string()))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Write the table as CSV: a header row of column names, then one
    /// row per record with missing cells rendered empty.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), AppError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|column| row.get(column).map(value_to_string).unwrap_or_default())
                .collect();
            csv_writer.write_record(&cells)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn infer_column_type(column: &str, rows: &[NormalizedRecord]) -> ColumnType {
    let mut any = false;
    let mut all_bool = true;
    let mut all_number = true;
    let mut all_integral = true;
    let mut all_datetime = true;

    for row in rows {
        let Some(value) = row.get(column) else {
            continue;
        };
        match value {
            Value::Null => continue,
            Value::Bool(_) => {
                all_number = false;
                all_datetime = false;
            }
            Value::Number(n) => {
                all_bool = false;
                all_datetime = false;
                if n.as_i64().is_none() && n.as_u64().is_none() {
                    let integral = n.as_f64().is_some_and(|f| f.fract() == 0.0);
                    if !integral {
                        all_integral = false;
                    }
                }
            }
            Value::String(s) => {
                all_bool = false;
                all_number = false;
                if !is_datetime_like(s) {
                    all_datetime = false;
                }
            }
            _ => return ColumnType::Text,
        }
        any = true;
    }

    if !any {
        return ColumnType::Text;
    }
    if all_bool {
        ColumnType::Bool
    } else if all_number {
        if all_integral {
            ColumnType::Int
        } else {
            ColumnType::Float
        }
    } else if all_datetime {
        ColumnType::DateTime
    } else {
        ColumnType::Text
    }
}

fn is_datetime_like(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
