use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::ReconError;
use crate::geometry::GeometryKind;
use crate::value::{FieldType, Value};

/// Rows per chunk when the config does not say otherwise. Smaller on
/// 32-bit hosts, where address space is the binding limit.
pub const fn default_chunk_size() -> usize {
    if cfg!(target_pointer_width = "32") {
        50_000
    } else {
        500_000
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub reconcile: Option<ReconcileConfig>,
    #[serde(default)]
    pub ranking: Vec<RankingConfig>,
    #[serde(default)]
    pub tracking: Option<TrackingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Multiplier applied to planar lengths; areas use its square.
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { unit_scale: default_unit_scale() }
    }
}

fn default_unit_scale() -> f64 {
    1.0
}

fn default_geometry_field() -> String {
    "WKT".into()
}

// ---------------------------------------------------------------------------
// Reconcile job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    pub key_field: String,
    /// Explicit allow-list. Defaults to the shared fields of both snapshots.
    #[serde(default)]
    pub compare_fields: Option<Vec<String>>,
    /// Never compared. Matched case-insensitively.
    #[serde(default = "default_exclude_fields")]
    pub exclude_fields: Vec<String>,
    pub old: SnapshotSource,
    pub new: SnapshotSource,
}

fn default_exclude_fields() -> Vec<String> {
    vec!["OBJECTID".into()]
}

/// Where one snapshot comes from and how to type its columns.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotSource {
    pub file: String,
    /// WKT column. Without it the snapshot has no geometry.
    #[serde(default)]
    pub geometry_field: Option<String>,
    #[serde(default)]
    pub spatial_ref: Option<u32>,
    /// Declared column types; undeclared columns load as text.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

// ---------------------------------------------------------------------------
// Ranking jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    pub name: String,
    pub geometry_kind: GeometryKind,
    pub old_dir: String,
    pub new_dir: String,
    /// Layer names; each resolves to `<dir>/<layer>.csv` on both sides.
    pub layers: Vec<String>,
    #[serde(default = "default_geometry_field")]
    pub geometry_field: String,
    pub grid: GridConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub file: String,
    pub id_field: String,
    #[serde(default = "default_geometry_field")]
    pub geometry_field: String,
}

// ---------------------------------------------------------------------------
// Tracking job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    pub old_dir: String,
    pub new_dir: String,
    #[serde(default = "default_geometry_field")]
    pub geometry_field: String,
    pub datasets: Vec<TrackedDataset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedDataset {
    pub name: String,
    #[serde(default)]
    pub filter: Option<RowFilter>,
    #[serde(default)]
    pub old_spatial_ref: Option<u32>,
    #[serde(default)]
    pub new_spatial_ref: Option<u32>,
}

/// Keep rows whose `column` equals one of `values`.
#[derive(Debug, Clone, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

impl RowFilter {
    /// Parse `column=v1|v2`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (column, values) = raw.split_once('=')?;
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        Some(Self { column: column.to_string(), values: values.split('|').map(str::to_string).collect() })
    }

    /// Whether the text form of `value` is one of the listed values.
    pub fn matches(&self, value: &Value) -> bool {
        let text = value.to_string();
        self.values.iter().any(|v| *v == text)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig = toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or_else(default_chunk_size)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let invalid = |msg: String| Err(ReconError::ConfigValidation(msg));

        if self.reconcile.is_none() && self.ranking.is_empty() && self.tracking.is_none() {
            return invalid("at least one of [reconcile], [[ranking]] or [tracking] is required".into());
        }
        if self.chunk_size == Some(0) {
            return invalid("chunk_size must be greater than 0".into());
        }
        let scale = self.backend.unit_scale;
        if !(scale.is_finite() && scale > 0.0) {
            return invalid(format!("backend.unit_scale must be a positive number, got {scale}"));
        }

        if let Some(rc) = &self.reconcile {
            if rc.key_field.trim().is_empty() {
                return invalid("reconcile.key_field must not be empty".into());
            }
            if matches!(&rc.compare_fields, Some(list) if list.is_empty()) {
                return invalid("reconcile.compare_fields must not be empty when given".into());
            }
        }

        let mut seen = HashSet::new();
        for job in &self.ranking {
            if job.name.trim().is_empty() {
                return invalid("ranking name must not be empty".into());
            }
            if !job.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return invalid(format!("ranking '{}': name may only use letters, digits, '_' and '-'", job.name));
            }
            if !seen.insert(job.name.as_str()) {
                return invalid(format!("ranking '{}' is defined twice", job.name));
            }
            if job.layers.is_empty() {
                return invalid(format!("ranking '{}': layers must not be empty", job.name));
            }
            if job.grid.id_field.trim().is_empty() {
                return invalid(format!("ranking '{}': grid.id_field must not be empty", job.name));
            }
        }

        if let Some(tracking) = &self.tracking {
            if tracking.datasets.is_empty() {
                return invalid("tracking.datasets must not be empty".into());
            }
            if tracking.datasets.iter().any(|d| d.name.trim().is_empty()) {
                return invalid("tracking dataset name must not be empty".into());
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RECONCILE_ONLY: &str = r#"
name = "Hydrography refresh"

[reconcile]
key_field = "UID"

[reconcile.old]
file = "old/hydro.csv"
geometry_field = "WKT"
spatial_ref = 4326

[reconcile.old.fields]
UID = "number"
DEPTH = "number"

[reconcile.new]
file = "new/hydro.csv"
"#;

    #[test]
    fn parse_reconcile_job() {
        let config = ReconConfig::from_toml(RECONCILE_ONLY).unwrap();
        assert_eq!(config.name, "Hydrography refresh");
        let rc = config.reconcile.unwrap();
        assert_eq!(rc.key_field, "UID");
        assert_eq!(rc.exclude_fields, vec!["OBJECTID"]);
        assert!(rc.compare_fields.is_none());
        assert_eq!(rc.old.fields.get("DEPTH"), Some(&FieldType::Number));
        assert_eq!(rc.old.spatial_ref, Some(4326));
        assert!(rc.new.geometry_field.is_none());
        assert_eq!(config.backend.unit_scale, 1.0);
    }

    #[test]
    fn chunk_size_defaults_by_pointer_width() {
        let config = ReconConfig::from_toml(RECONCILE_ONLY).unwrap();
        assert_eq!(config.effective_chunk_size(), default_chunk_size());
        assert!(default_chunk_size() == 50_000 || default_chunk_size() == 500_000);
    }

    #[test]
    fn parse_ranking_and_tracking() {
        let input = r#"
name = "Grid"
chunk_size = 1000

[backend]
unit_scale = 0.001

[[ranking]]
name = "wells"
geometry_kind = "point"
old_dir = "old"
new_dir = "new"
layers = ["wells", "springs"]

[ranking.grid]
file = "grid.csv"
id_field = "CELL_ID"

[tracking]
old_dir = "old"
new_dir = "new"

[[tracking.datasets]]
name = "roads"

[tracking.datasets.filter]
column = "F_CODE"
values = ["AP030"]
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.effective_chunk_size(), 1000);
        assert_eq!(config.ranking.len(), 1);
        assert_eq!(config.ranking[0].geometry_kind, GeometryKind::Point);
        assert_eq!(config.ranking[0].geometry_field, "WKT");
        assert_eq!(config.ranking[0].grid.geometry_field, "WKT");
        let tracking = config.tracking.unwrap();
        assert_eq!(tracking.datasets[0].filter.as_ref().unwrap().values, vec!["AP030"]);
    }

    #[test]
    fn rejects_config_without_jobs() {
        let err = ReconConfig::from_toml("name = \"empty\"").unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let input = format!("chunk_size = 0\n{RECONCILE_ONLY}");
        assert!(ReconConfig::from_toml(&input).is_err());
    }

    #[test]
    fn rejects_unknown_geometry_kind() {
        let input = r#"
name = "x"
[[ranking]]
name = "a"
geometry_kind = "multipatch"
old_dir = "o"
new_dir = "n"
layers = ["l"]
[ranking.grid]
file = "g.csv"
id_field = "ID"
"#;
        assert!(matches!(ReconConfig::from_toml(input), Err(ReconError::ConfigParse(_))));
    }

    #[test]
    fn rejects_duplicate_ranking_names() {
        let job = r#"
[[ranking]]
name = "a"
geometry_kind = "point"
old_dir = "o"
new_dir = "n"
layers = ["l"]
[ranking.grid]
file = "g.csv"
id_field = "ID"
"#;
        let input = format!("name = \"x\"\n{job}{job}");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn rejects_bad_unit_scale() {
        let input = format!("{RECONCILE_ONLY}\n[backend]\nunit_scale = 0.0\n");
        assert!(ReconConfig::from_toml(&input).is_err());
    }

    #[test]
    fn row_filter_parses_column_and_values() {
        let f = RowFilter::parse("F_CODE=AQ040|AP030").unwrap();
        assert_eq!(f.column, "F_CODE");
        assert_eq!(f.values, vec!["AQ040", "AP030"]);
        assert!(f.matches(&Value::text("AP030")));
        assert!(!f.matches(&Value::Null));
        assert!(RowFilter::parse("=x").is_none());
        assert!(RowFilter::parse("F_CODE").is_none());
    }
}
