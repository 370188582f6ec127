//! Bulk value replacement over selected columns of a snapshot.

use crate::config::RowFilter;
use crate::error::ReconError;
use crate::snapshot::TabularSnapshot;
use crate::value::{values_equal, Value};

const OPERATION: &str = "sanitize";

/// What to replace. Raw strings are parsed with each column's type.
#[derive(Debug, Clone, Default)]
pub struct ReplaceRule {
    /// Columns to touch. `None` means every attribute column except the key.
    pub fields: Option<Vec<String>>,
    /// Value to look for. `None`, blank and `none` match null and empty cells.
    pub find: Option<String>,
    pub replace: String,
    /// Only rows passing this filter are touched.
    pub filter: Option<RowFilter>,
}

impl ReplaceRule {
    fn finds_null(&self) -> bool {
        self.find.as_deref().map_or(true, |raw| {
            let raw = raw.trim();
            raw.is_empty() || raw.eq_ignore_ascii_case("none")
        })
    }
}

/// Copy of `snapshot` with every matching cell replaced, and the number of
/// cells replaced. Rows are visited `chunk_size` at a time.
///
/// The replacement must parse for every column the rule can match in. A
/// `find` that does not parse for a column's type matches nothing there, so
/// the column is left alone.
pub fn replace_values(
    snapshot: &TabularSnapshot,
    rule: &ReplaceRule,
    chunk_size: usize,
) -> Result<(TabularSnapshot, usize), ReconError> {
    let targets = target_columns(snapshot, rule)?;
    let filter = match &rule.filter {
        Some(f) => {
            let column = snapshot.field_index(&f.column).ok_or_else(|| ReconError::SchemaMismatch {
                operation: OPERATION,
                dataset: snapshot.name().to_string(),
                field: f.column.clone(),
            })?;
            Some((column, f))
        }
        None => None,
    };

    let mut plan: Vec<(usize, Value, Value)> = Vec::with_capacity(targets.len());
    for column in targets {
        let field = &snapshot.fields()[column];
        let find = match rule.find.as_deref() {
            Some(raw) if !rule.finds_null() => match Value::parse_as(raw, field.field_type) {
                Ok(v) => v,
                Err(_) => {
                    log::debug!("{OPERATION} '{}': '{raw}' cannot occur in '{}'", snapshot.name(), field.name);
                    continue;
                }
            },
            _ => Value::Null,
        };
        let replacement = Value::parse_as(&rule.replace, field.field_type).map_err(|_| ReconError::TypeMismatch {
            dataset: snapshot.name().to_string(),
            field: field.name.clone(),
            expected: field.field_type,
            value: rule.replace.clone(),
        })?;
        plan.push((column, find, replacement));
    }

    let mut out = snapshot.clone();
    let mut replaced = 0usize;
    let rows = snapshot.row_count();
    let chunk = chunk_size.max(1);
    let mut start = 0;
    while start < rows {
        let end = (start + chunk).min(rows);
        log::debug!("{OPERATION} '{}': rows {}..{}", snapshot.name(), start, end);
        for row in start..end {
            if let Some((column, f)) = filter {
                if !f.matches(&snapshot.value(row, column)) {
                    continue;
                }
            }
            for (column, find, replacement) in &plan {
                if values_equal(&snapshot.value(row, *column), find) {
                    out.set_value(row, *column, replacement.clone())?;
                    replaced += 1;
                }
            }
        }
        start = end;
    }

    log::info!("{OPERATION} '{}': replaced {replaced} value(s)", snapshot.name());
    Ok((out, replaced))
}

fn target_columns(snapshot: &TabularSnapshot, rule: &ReplaceRule) -> Result<Vec<usize>, ReconError> {
    match &rule.fields {
        Some(names) => names
            .iter()
            .map(|name| {
                snapshot.field_index(name).ok_or_else(|| ReconError::SchemaMismatch {
                    operation: OPERATION,
                    dataset: snapshot.name().to_string(),
                    field: name.clone(),
                })
            })
            .collect(),
        None => Ok(snapshot
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name != snapshot.key_field())
            .map(|(i, _)| i)
            .collect()),
    }
}
