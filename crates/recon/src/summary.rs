use std::collections::BTreeSet;

use serde::Serialize;

use crate::snapshot::TabularSnapshot;

/// Counts, schema drift and spatial references of a snapshot pair.
///
/// Counts are raw row counts, taken before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub old_count: usize,
    pub new_count: usize,
    /// In `old` but not `new`, sorted.
    pub removed_fields: Vec<String>,
    /// In `new` but not `old`, sorted.
    pub added_fields: Vec<String>,
    pub old_spatial_ref: Option<u32>,
    pub new_spatial_ref: Option<u32>,
}

impl SummaryRecord {
    pub fn spatial_ref_changed(&self) -> bool {
        self.old_spatial_ref != self.new_spatial_ref
    }
}

pub fn summarize(old: &TabularSnapshot, new: &TabularSnapshot) -> SummaryRecord {
    let old_fields: BTreeSet<String> = old.field_names().into_iter().collect();
    let new_fields: BTreeSet<String> = new.field_names().into_iter().collect();
    SummaryRecord {
        old_count: old.row_count(),
        new_count: new.row_count(),
        removed_fields: old_fields.difference(&new_fields).cloned().collect(),
        added_fields: new_fields.difference(&old_fields).cloned().collect(),
        old_spatial_ref: old.spatial_ref(),
        new_spatial_ref: new.spatial_ref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldType, Value};

    #[test]
    fn summary_reports_schema_drift_and_raw_counts() {
        let old = TabularSnapshot::builder("old", "UID")
            .field("UID", FieldType::Number)
            .field("NAME", FieldType::Text)
            .field("ZONE", FieldType::Text)
            .geometry_field("WKT")
            .spatial_ref(Some(4326))
            .row(vec![Value::number(1.0), Value::Null, Value::Null], None)
            .unwrap()
            .row(vec![Value::number(1.0), Value::Null, Value::Null], None)
            .unwrap()
            .build();
        let new = TabularSnapshot::builder("new", "UID")
            .field("UID", FieldType::Number)
            .field("NAME", FieldType::Text)
            .field("DEPTH", FieldType::Number)
            .field("AREA", FieldType::Number)
            .spatial_ref(Some(3857))
            .build();

        let s = summarize(&old, &new);
        assert_eq!(s.old_count, 2);
        assert_eq!(s.new_count, 0);
        assert_eq!(s.removed_fields, vec!["WKT", "ZONE"]);
        assert_eq!(s.added_fields, vec!["AREA", "DEPTH"]);
        assert!(s.spatial_ref_changed());
    }
}
