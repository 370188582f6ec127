//! Grid ranking: merge feature layers per side, join them to a fixed grid,
//! aggregate per cell and rank the old→new change of every channel.
//!
//! Channels follow the geometry kind: points rank counts only, polylines add
//! length, polygons add length and area. Every grid cell appears in the
//! output exactly once, sorted by id.

use std::collections::HashMap;

use serde::Serialize;

use crate::backend::GeometryBackend;
use crate::error::ReconError;
use crate::geometry::{Bounds, Geometry, GeometryKind, Polygon};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One feature layer of a snapshot side. All features share `kind`.
#[derive(Debug, Clone)]
pub struct FeatureLayer {
    pub name: String,
    pub kind: GeometryKind,
    pub features: Vec<Geometry>,
}

impl FeatureLayer {
    pub fn new(name: impl Into<String>, kind: GeometryKind, features: Vec<Geometry>) -> Self {
        Self { name: name.into(), kind, features }
    }
}

/// One polygon of the ranking grid.
#[derive(Debug, Clone)]
pub struct CellShape {
    pub id: i64,
    geometry: Geometry,
    polygon: Polygon,
    bounds: Bounds,
}

impl CellShape {
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

/// Fixed polygon partition, cells sorted by id.
#[derive(Debug, Clone)]
pub struct Grid {
    name: String,
    cells: Vec<CellShape>,
}

impl Grid {
    /// Fails with `InvalidGrid` on an empty grid, a duplicate id or a cell
    /// that is not a single polygon.
    pub fn new(name: impl Into<String>, cells: Vec<(i64, Geometry)>) -> Result<Self, ReconError> {
        let name = name.into();
        if cells.is_empty() {
            return Err(ReconError::InvalidGrid(format!("grid '{name}' has no cells")));
        }
        let mut shapes = Vec::with_capacity(cells.len());
        for (id, geometry) in cells {
            let polygon = match geometry.polygons() {
                [single] => single.clone(),
                _ => {
                    return Err(ReconError::InvalidGrid(format!(
                        "grid '{name}': cell {id} is not a single polygon"
                    )))
                }
            };
            let bounds = geometry
                .bounds()
                .ok_or_else(|| ReconError::InvalidGrid(format!("grid '{name}': cell {id} is empty")))?;
            shapes.push(CellShape { id, geometry, polygon, bounds });
        }
        shapes.sort_by_key(|c| c.id);
        if let Some(w) = shapes.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(ReconError::InvalidGrid(format!("grid '{name}': duplicate cell id {}", w[0].id)));
        }
        Ok(Self { name, cells: shapes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[CellShape] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub id: i64,
    pub geometry: Geometry,
    pub old_count: u64,
    pub new_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_area: Option<f64>,
    pub score: f64,
    pub ranking: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_length: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_area: Option<i8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub geometry_kind: GeometryKind,
    /// Merged feature count per side.
    pub old_features: usize,
    pub new_features: usize,
    pub cells: Vec<GridCell>,
}

// ---------------------------------------------------------------------------
// Score and ranking table
// ---------------------------------------------------------------------------

/// Score of a channel whose old side is zero.
pub const NO_BASELINE: f64 = -1.0;

/// `new / old`, or [`NO_BASELINE`] when `old` is not positive.
pub fn score(old: f64, new: f64) -> f64 {
    if old > 0.0 {
        new / old
    } else {
        NO_BASELINE
    }
}

/// Threshold table, before the sign flip.
pub fn base_ranking(score: f64, new: f64) -> i8 {
    if score == NO_BASELINE {
        return if new > 0.0 { 5 } else { 1 };
    }
    match score {
        s if s <= 0.5 => 1,
        s if s <= 0.75 => 2,
        s if s <= 1.25 => 3,
        s if s <= 1.5 => 4,
        _ => 5,
    }
}

/// Final ranking of one channel: table, negated when the channel shrank,
/// and 0 when neither side has anything.
pub fn ranking_for(old: f64, new: f64) -> i8 {
    if old == 0.0 && new == 0.0 {
        return 0;
    }
    let base = base_ranking(score(old, new), new);
    if new - old < 0.0 {
        -base
    } else {
        base
    }
}

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct CellTotals {
    count: u64,
    length: f64,
    area: f64,
}

/// Rank every grid cell from the old and new layers of one geometry kind.
pub fn rank(
    grid: &Grid,
    old_layers: &[FeatureLayer],
    new_layers: &[FeatureLayer],
    kind: GeometryKind,
    backend: &dyn GeometryBackend,
) -> Result<Ranking, ReconError> {
    let old = merge(old_layers, kind)?;
    let new = merge(new_layers, kind)?;
    log::info!(
        "rank '{}': {} old / {} new {kind} feature(s) over {} cell(s)",
        grid.name(),
        old.len(),
        new.len(),
        grid.len()
    );

    let old_totals = aggregate(&old, grid, kind, backend)?;
    let new_totals = aggregate(&new, grid, kind, backend)?;

    let cells = grid
        .cells()
        .iter()
        .map(|shape| {
            let o = old_totals.get(&shape.id).copied().unwrap_or_default();
            let n = new_totals.get(&shape.id).copied().unwrap_or_default();
            build_cell(shape, kind, o, n)
        })
        .collect();

    Ok(Ranking { geometry_kind: kind, old_features: old.len(), new_features: new.len(), cells })
}

fn build_cell(shape: &CellShape, kind: GeometryKind, o: CellTotals, n: CellTotals) -> GridCell {
    let (old_count, new_count) = (o.count as f64, n.count as f64);
    let has_length = kind != GeometryKind::Point;
    let has_area = kind == GeometryKind::Polygon;
    let when = |on: bool, v: f64| on.then_some(v);

    GridCell {
        id: shape.id,
        geometry: shape.geometry.clone(),
        old_count: o.count,
        new_count: n.count,
        old_length: when(has_length, o.length),
        new_length: when(has_length, n.length),
        old_area: when(has_area, o.area),
        new_area: when(has_area, n.area),
        score: score(old_count, new_count),
        ranking: ranking_for(old_count, new_count),
        score_length: when(has_length, score(o.length, n.length)),
        ranking_length: has_length.then(|| ranking_for(o.length, n.length)),
        score_area: when(has_area, score(o.area, n.area)),
        ranking_area: has_area.then(|| ranking_for(o.area, n.area)),
    }
}

/// Concatenate the layers of one side, checking every geometry kind.
fn merge(layers: &[FeatureLayer], kind: GeometryKind) -> Result<Vec<&Geometry>, ReconError> {
    let mut merged = Vec::new();
    for layer in layers {
        let mismatch = |found: GeometryKind| ReconError::LayerKindMismatch {
            layer: layer.name.clone(),
            expected: kind.to_string(),
            found: found.to_string(),
        };
        if layer.kind != kind {
            return Err(mismatch(layer.kind));
        }
        if let Some(bad) = layer.features.iter().find(|g| g.kind() != kind) {
            return Err(mismatch(bad.kind()));
        }
        merged.extend(layer.features.iter());
    }
    Ok(merged)
}

fn aggregate(
    features: &[&Geometry],
    grid: &Grid,
    kind: GeometryKind,
    backend: &dyn GeometryBackend,
) -> Result<HashMap<i64, CellTotals>, ReconError> {
    let wrap = |operation: &'static str| {
        move |e: crate::backend::BackendError| ReconError::Backend { operation, message: e.message }
    };
    let mut totals: HashMap<i64, CellTotals> = HashMap::new();
    for feature in features {
        for piece in backend.intersect(feature, grid).map_err(wrap("intersect"))? {
            let t = totals.entry(piece.cell).or_default();
            t.count += 1;
            if kind != GeometryKind::Point {
                t.length += backend.length(&piece.geometry).map_err(wrap("length"))?;
            }
            if kind == GeometryKind::Polygon {
                t.area += backend.area(&piece.geometry).map_err(wrap("area"))?;
            }
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, GridPiece, PlanarBackend};

    fn grid() -> Grid {
        Grid::new(
            "grid",
            vec![
                (2, Geometry::rect(1.0, 0.0, 2.0, 1.0)),
                (1, Geometry::rect(0.0, 0.0, 1.0, 1.0)),
                (3, Geometry::rect(2.0, 0.0, 3.0, 1.0)),
            ],
        )
        .unwrap()
    }

    fn points(name: &str, pts: &[(f64, f64)]) -> FeatureLayer {
        FeatureLayer::new(name, GeometryKind::Point, pts.iter().map(|&(x, y)| Geometry::point(x, y)).collect())
    }

    #[test]
    fn ranking_table() {
        assert_eq!(ranking_for(10.0, 10.0), 3);
        assert_eq!(ranking_for(0.0, 5.0), 5);
        assert_eq!(ranking_for(5.0, 0.0), -1);
        assert_eq!(ranking_for(0.0, 0.0), 0);
        assert_eq!(ranking_for(4.0, 2.0), -1);
        assert_eq!(ranking_for(4.0, 3.0), -2);
        assert_eq!(ranking_for(4.0, 5.0), 3);
        assert_eq!(ranking_for(4.0, 6.0), 4);
        assert_eq!(ranking_for(4.0, 7.0), 5);
        assert_eq!(ranking_for(10.0, 8.0), -3);
    }

    #[test]
    fn table_boundaries_are_inclusive_on_the_right() {
        assert_eq!(base_ranking(0.0, 0.0), 1);
        assert_eq!(base_ranking(0.5, 1.0), 1);
        assert_eq!(base_ranking(0.75, 1.0), 2);
        assert_eq!(base_ranking(1.25, 1.0), 3);
        assert_eq!(base_ranking(1.5, 1.0), 4);
        assert_eq!(base_ranking(1.5000001, 1.0), 5);
        assert_eq!(base_ranking(NO_BASELINE, 3.0), 5);
        assert_eq!(base_ranking(NO_BASELINE, 0.0), 1);
    }

    #[test]
    fn score_sentinel() {
        assert_eq!(score(0.0, 3.0), NO_BASELINE);
        assert_eq!(score(4.0, 2.0), 0.5);
    }

    #[test]
    fn grid_rejects_duplicates_and_non_polygons() {
        let dup = Grid::new("g", vec![(1, Geometry::rect(0.0, 0.0, 1.0, 1.0)), (1, Geometry::rect(1.0, 0.0, 2.0, 1.0))]);
        assert!(matches!(dup, Err(ReconError::InvalidGrid(_))));
        let point = Grid::new("g", vec![(1, Geometry::point(0.0, 0.0))]);
        assert!(matches!(point, Err(ReconError::InvalidGrid(_))));
        assert!(Grid::new("g", vec![]).is_err());
    }

    #[test]
    fn points_rank_every_cell_in_id_order() {
        let old = vec![points("wells", &[(0.5, 0.5), (0.6, 0.6)]), points("springs", &[(1.5, 0.5)])];
        let new = vec![points("wells", &[(0.5, 0.5), (0.6, 0.6), (0.7, 0.7)])];
        let r = rank(&grid(), &old, &new, GeometryKind::Point, &PlanarBackend::default()).unwrap();

        assert_eq!(r.old_features, 3);
        assert_eq!(r.new_features, 3);
        let summary: Vec<(i64, u64, u64, i8)> =
            r.cells.iter().map(|c| (c.id, c.old_count, c.new_count, c.ranking)).collect();
        assert_eq!(summary, vec![(1, 2, 3, 4), (2, 1, 0, -1), (3, 0, 0, 0)]);
        assert!(r.cells.iter().all(|c| c.ranking_length.is_none() && c.old_area.is_none()));
    }

    #[test]
    fn polylines_add_length_channel() {
        let old = vec![FeatureLayer::new("roads", GeometryKind::Polyline, vec![Geometry::line(&[(0.0, 0.5), (1.0, 0.5)])])];
        let new = vec![FeatureLayer::new("roads", GeometryKind::Polyline, vec![Geometry::line(&[(0.0, 0.5), (2.0, 0.5)])])];
        let r = rank(&grid(), &old, &new, GeometryKind::Polyline, &PlanarBackend::default()).unwrap();

        let c1 = &r.cells[0];
        // The new line spans cells 1 and 2; the old one ends on their shared edge.
        assert_eq!((c1.old_count, c1.new_count), (1, 1));
        assert_eq!(c1.ranking, 3);
        assert_eq!(c1.ranking_length, Some(3));
        let c2 = &r.cells[1];
        assert_eq!((c2.old_count, c2.new_count), (0, 1));
        assert_eq!(c2.ranking_length, Some(5));
        assert_eq!(c2.score_length, Some(NO_BASELINE));
        assert_eq!(r.cells[2].ranking_length, Some(0));
        assert!(c1.ranking_area.is_none());
    }

    #[test]
    fn polygons_add_area_channel() {
        let old = vec![FeatureLayer::new("lakes", GeometryKind::Polygon, vec![Geometry::rect(0.0, 0.0, 1.0, 1.0)])];
        let new = vec![FeatureLayer::new("lakes", GeometryKind::Polygon, vec![Geometry::rect(0.0, 0.0, 1.0, 0.25)])];
        let r = rank(&grid(), &old, &new, GeometryKind::Polygon, &PlanarBackend::default()).unwrap();
        let c1 = &r.cells[0];
        assert_eq!(c1.old_area, Some(1.0));
        assert_eq!(c1.new_area, Some(0.25));
        assert_eq!(c1.ranking_area, Some(-1));
        assert_eq!(c1.ranking, 3);
        assert_eq!(r.cells[1].ranking_area, Some(0));
    }

    #[test]
    fn wrong_layer_kind_is_rejected() {
        let old = vec![points("wells", &[(0.5, 0.5)])];
        let err = rank(&grid(), &old, &[], GeometryKind::Polygon, &PlanarBackend::default()).unwrap_err();
        assert!(matches!(err, ReconError::LayerKindMismatch { ref layer, .. } if layer == "wells"));

        let mixed = vec![FeatureLayer::new("mixed", GeometryKind::Point, vec![Geometry::line(&[(0.0, 0.0), (1.0, 1.0)])])];
        assert!(rank(&grid(), &mixed, &[], GeometryKind::Point, &PlanarBackend::default()).is_err());
    }

    struct FailingBackend;

    impl GeometryBackend for FailingBackend {
        fn intersect(&self, _: &Geometry, _: &Grid) -> Result<Vec<GridPiece>, BackendError> {
            Err(BackendError::new("store offline"))
        }
        fn length(&self, _: &Geometry) -> Result<f64, BackendError> {
            Ok(0.0)
        }
        fn area(&self, _: &Geometry) -> Result<f64, BackendError> {
            Ok(0.0)
        }
    }

    #[test]
    fn backend_failure_is_wrapped_verbatim() {
        let old = vec![points("wells", &[(0.5, 0.5)])];
        let err = rank(&grid(), &old, &[], GeometryKind::Point, &FailingBackend).unwrap_err();
        assert_eq!(err.operation(), "intersect");
        assert!(err.to_string().contains("store offline"));
    }

    #[test]
    fn empty_sides_rank_zero() {
        let r = rank(&grid(), &[], &[], GeometryKind::Point, &PlanarBackend::default()).unwrap();
        assert_eq!(r.cells.len(), 3);
        assert!(r.cells.iter().all(|c| c.ranking == 0 && c.score == NO_BASELINE));
    }
}
