//! Columnar in-memory view of one dataset instance.

use serde::Serialize;

use crate::error::ReconError;
use crate::geometry::Geometry;
use crate::value::{FieldType, Value};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ColumnData {
    Text(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    fn new(ty: FieldType) -> Self {
        match ty {
            FieldType::Text => Self::Text(Vec::new()),
            FieldType::Number => Self::Number(Vec::new()),
            FieldType::Boolean => Self::Boolean(Vec::new()),
        }
    }

    fn get(&self, row: usize) -> Value {
        match self {
            Self::Text(v) => v[row].clone().map_or(Value::Null, Value::Text),
            Self::Number(v) => v[row].map_or(Value::Null, Value::number),
            Self::Boolean(v) => v[row].map_or(Value::Null, Value::Bool),
        }
    }

    /// Returns the value back when its type does not fit the column.
    fn push(&mut self, value: Value) -> Result<(), Value> {
        match (self, value) {
            (Self::Text(v), Value::Null) => v.push(None),
            (Self::Number(v), Value::Null) => v.push(None),
            (Self::Boolean(v), Value::Null) => v.push(None),
            (Self::Text(v), Value::Text(s)) => v.push(Some(s)),
            (Self::Number(v), Value::Number(n)) => v.push(Some(n.0)),
            (Self::Boolean(v), Value::Bool(b)) => v.push(Some(b)),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    fn set(&mut self, row: usize, value: Value) -> Result<(), Value> {
        match (self, value) {
            (Self::Text(v), Value::Null) => v[row] = None,
            (Self::Number(v), Value::Null) => v[row] = None,
            (Self::Boolean(v), Value::Null) => v[row] = None,
            (Self::Text(v), Value::Text(s)) => v[row] = Some(s),
            (Self::Number(v), Value::Number(n)) => v[row] = Some(n.0),
            (Self::Boolean(v), Value::Bool(b)) => v[row] = Some(b),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Self::Text(v) => Self::Text(rows.iter().map(|&r| v[r].clone()).collect()),
            Self::Number(v) => Self::Number(rows.iter().map(|&r| v[r]).collect()),
            Self::Boolean(v) => Self::Boolean(rows.iter().map(|&r| v[r]).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One time-stamped instance of a dataset: typed attribute columns, an
/// optional geometry column, a declared key field and an optional spatial
/// reference code. Read-only once built.
#[derive(Debug, Clone)]
pub struct TabularSnapshot {
    name: String,
    key_field: String,
    fields: Vec<FieldDef>,
    columns: Vec<ColumnData>,
    geometry_field: Option<String>,
    geometries: Vec<Option<Geometry>>,
    spatial_ref: Option<u32>,
    rows: usize,
}

impl TabularSnapshot {
    pub fn builder(name: impl Into<String>, key_field: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder::new(name, key_field)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn geometry_field(&self) -> Option<&str> {
        self.geometry_field.as_deref()
    }

    pub fn spatial_ref(&self) -> Option<u32> {
        self.spatial_ref
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Attribute field names followed by the geometry field name, if any.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        if let Some(g) = &self.geometry_field {
            names.push(g.clone());
        }
        names
    }

    /// Column index of the declared key field.
    pub fn key_index(&self, operation: &'static str) -> Result<usize, ReconError> {
        self.field_index(&self.key_field).ok_or_else(|| ReconError::SchemaMismatch {
            operation,
            dataset: self.name.clone(),
            field: self.key_field.clone(),
        })
    }

    pub fn value(&self, row: usize, column: usize) -> Value {
        self.columns[column].get(row)
    }

    pub fn value_by_name(&self, row: usize, field: &str) -> Option<Value> {
        self.field_index(field).map(|c| self.value(row, c))
    }

    pub fn geometry(&self, row: usize) -> Option<&Geometry> {
        self.geometries.get(row).and_then(|g| g.as_ref())
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry_field.is_some()
    }

    /// Materialize one row.
    pub fn record(&self, row: usize, key_column: usize) -> Record {
        Record {
            key: self.value(row, key_column),
            values: (0..self.fields.len()).map(|c| self.value(row, c)).collect(),
            geometry: self.geometry(row).cloned(),
        }
    }

    /// Copy of the snapshot keeping only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> TabularSnapshot {
        TabularSnapshot {
            name: self.name.clone(),
            key_field: self.key_field.clone(),
            fields: self.fields.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            geometry_field: self.geometry_field.clone(),
            geometries: if self.geometries.is_empty() {
                Vec::new()
            } else {
                rows.iter().map(|&r| self.geometries[r].clone()).collect()
            },
            spatial_ref: self.spatial_ref,
            rows: rows.len(),
        }
    }

    /// Overwrite one cell. The value must fit the column type.
    pub fn set_value(&mut self, row: usize, column: usize, value: Value) -> Result<(), ReconError> {
        let field = &self.fields[column];
        self.columns[column]
            .set(row, value)
            .map_err(|rejected| ReconError::TypeMismatch {
                dataset: self.name.clone(),
                field: field.name.clone(),
                expected: field.field_type,
                value: rejected.to_string(),
            })
    }

    /// Empty collection carrying this snapshot's schema.
    pub fn empty_collection(&self) -> FeatureCollection {
        FeatureCollection {
            name: self.name.clone(),
            key_field: self.key_field.clone(),
            fields: self.fields.clone(),
            geometry_field: self.geometry_field.clone(),
            records: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct SnapshotBuilder {
    snapshot: TabularSnapshot,
}

impl SnapshotBuilder {
    pub fn new(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            snapshot: TabularSnapshot {
                name: name.into(),
                key_field: key_field.into(),
                fields: Vec::new(),
                columns: Vec::new(),
                geometry_field: None,
                geometries: Vec::new(),
                spatial_ref: None,
                rows: 0,
            },
        }
    }

    /// Declare an attribute column. Must be called before any row is pushed.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.snapshot.fields.push(FieldDef::new(name, field_type));
        self.snapshot.columns.push(ColumnData::new(field_type));
        self
    }

    pub fn geometry_field(mut self, name: impl Into<String>) -> Self {
        self.snapshot.geometry_field = Some(name.into());
        self
    }

    pub fn spatial_ref(mut self, code: Option<u32>) -> Self {
        self.snapshot.spatial_ref = code;
        self
    }

    /// Append a row. `values` follow field declaration order.
    pub fn push_row(&mut self, values: Vec<Value>, geometry: Option<Geometry>) -> Result<(), ReconError> {
        let s = &mut self.snapshot;
        if values.len() != s.fields.len() {
            return Err(ReconError::Parse {
                dataset: s.name.clone(),
                row: s.rows + 1,
                column: String::new(),
                message: format!("expected {} values, got {}", s.fields.len(), values.len()),
            });
        }
        // Type-check the whole row before touching any column.
        for (field, value) in s.fields.iter().zip(&values) {
            if !value.fits(field.field_type) {
                return Err(ReconError::TypeMismatch {
                    dataset: s.name.clone(),
                    field: field.name.clone(),
                    expected: field.field_type,
                    value: value.to_string(),
                });
            }
        }
        for (column, value) in s.columns.iter_mut().zip(values) {
            // Cannot fail: checked above.
            let _ = column.push(value);
        }
        if s.geometry_field.is_some() {
            s.geometries.push(geometry);
        }
        s.rows += 1;
        Ok(())
    }

    pub fn row(mut self, values: Vec<Value>, geometry: Option<Geometry>) -> Result<Self, ReconError> {
        self.push_row(values, geometry)?;
        Ok(self)
    }

    pub fn build(self) -> TabularSnapshot {
        self.snapshot
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One materialized row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub key: Value,
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

/// Records sharing the schema of the snapshot they came from.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    pub name: String,
    pub key_field: String,
    pub fields: Vec<FieldDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_field: Option<String>,
    pub records: Vec<Record>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.records.iter().map(|r| &r.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lakes() -> TabularSnapshot {
        TabularSnapshot::builder("lakes", "UID")
            .field("UID", FieldType::Number)
            .field("NAME", FieldType::Text)
            .geometry_field("SHAPE")
            .spatial_ref(Some(4326))
            .row(vec![Value::number(1.0), Value::text("Lake")], Some(Geometry::point(0.0, 0.0)))
            .unwrap()
            .row(vec![Value::number(2.0), Value::Null], None)
            .unwrap()
            .build()
    }

    #[test]
    fn builder_stores_typed_columns() {
        let s = lakes();
        assert_eq!(s.row_count(), 2);
        assert_eq!(s.value(0, 1), Value::text("Lake"));
        assert_eq!(s.value(1, 1), Value::Null);
        assert_eq!(s.geometry(0), Some(&Geometry::point(0.0, 0.0)));
        assert_eq!(s.geometry(1), None);
        assert_eq!(s.field_names(), vec!["UID", "NAME", "SHAPE"]);
        assert_eq!(s.spatial_ref(), Some(4326));
    }

    #[test]
    fn builder_rejects_wrong_type() {
        let mut b = TabularSnapshot::builder("t", "UID").field("UID", FieldType::Number);
        let err = b.push_row(vec![Value::text("x")], None).unwrap_err();
        assert!(err.to_string().contains("UID"));
        assert_eq!(b.build().row_count(), 0);
    }

    #[test]
    fn builder_rejects_wrong_arity() {
        let mut b = TabularSnapshot::builder("t", "UID").field("UID", FieldType::Number);
        assert!(b.push_row(vec![], None).is_err());
    }

    #[test]
    fn missing_key_field_is_schema_mismatch() {
        let s = TabularSnapshot::builder("t", "GUID").field("UID", FieldType::Number).build();
        let err = s.key_index("reconcile").unwrap_err();
        assert!(matches!(err, ReconError::SchemaMismatch { .. }));
    }

    #[test]
    fn select_rows_keeps_order_and_geometry() {
        let s = lakes().select_rows(&[1, 0]);
        assert_eq!(s.row_count(), 2);
        assert_eq!(s.value(0, 0), Value::number(2.0));
        assert_eq!(s.geometry(1), Some(&Geometry::point(0.0, 0.0)));
    }

    #[test]
    fn set_value_checks_type() {
        let mut s = lakes();
        s.set_value(1, 1, Value::text("Pond")).unwrap();
        assert_eq!(s.value(1, 1), Value::text("Pond"));
        assert!(s.set_value(1, 1, Value::number(3.0)).is_err());
    }
}
