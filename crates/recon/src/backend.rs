//! Narrow geometry interface used by the ranker and the table tracker, and
//! the bundled planar implementation.

use std::fmt;

use crate::geometry::{Coord, Geometry, Polygon};
use crate::ranking::{CellShape, Grid};

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Failure raised by a backend. The message is surfaced to the user as is.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

/// The part of one feature that falls inside one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPiece {
    pub cell: i64,
    pub geometry: Geometry,
}

pub trait GeometryBackend {
    /// Split `feature` over the grid. A feature yields at most one piece per
    /// cell; features outside the grid yield none.
    fn intersect(&self, feature: &Geometry, grid: &Grid) -> Result<Vec<GridPiece>, BackendError>;

    /// Line length, or polygon perimeter. Zero for points.
    fn length(&self, geometry: &Geometry) -> Result<f64, BackendError>;

    /// Polygon area net of holes. Zero for points and lines.
    fn area(&self, geometry: &Geometry) -> Result<f64, BackendError>;
}

// ---------------------------------------------------------------------------
// Planar backend
// ---------------------------------------------------------------------------

/// Cartesian backend. Lengths are multiplied by `unit_scale`, areas by its
/// square. Line and polygon clipping need convex cells.
#[derive(Debug, Clone, Copy)]
pub struct PlanarBackend {
    pub unit_scale: f64,
}

impl Default for PlanarBackend {
    fn default() -> Self {
        Self { unit_scale: 1.0 }
    }
}

impl PlanarBackend {
    pub fn new(unit_scale: f64) -> Self {
        Self { unit_scale }
    }
}

impl GeometryBackend for PlanarBackend {
    fn intersect(&self, feature: &Geometry, grid: &Grid) -> Result<Vec<GridPiece>, BackendError> {
        let Some(bounds) = feature.bounds() else {
            return Ok(Vec::new());
        };
        let candidates = grid.cells().iter().filter(|c| c.bounds().overlaps(&bounds));

        match feature {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Ok(assign_points(feature, grid)),
            Geometry::LineString(line) => clip_lines(std::slice::from_ref(line), candidates),
            Geometry::MultiLineString(lines) => clip_lines(lines, candidates),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => clip_polygons(feature.polygons(), candidates),
        }
    }

    fn length(&self, geometry: &Geometry) -> Result<f64, BackendError> {
        let raw = match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => 0.0,
            Geometry::LineString(line) => path_length(line),
            Geometry::MultiLineString(lines) => lines.iter().map(|l| path_length(l)).sum(),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => geometry
                .polygons()
                .iter()
                .flat_map(|p| p.rings())
                .map(|r| ring_perimeter(r))
                .sum(),
        };
        finite("length", raw * self.unit_scale)
    }

    fn area(&self, geometry: &Geometry) -> Result<f64, BackendError> {
        let raw: f64 = geometry.polygons().iter().map(polygon_area).sum();
        finite("area", raw * self.unit_scale * self.unit_scale)
    }
}

fn finite(what: &str, v: f64) -> Result<f64, BackendError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(BackendError::new(format!("{what} is not finite")))
    }
}

// ---------------------------------------------------------------------------
// Measures
// ---------------------------------------------------------------------------

fn dist(a: &Coord, b: &Coord) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

fn path_length(path: &[Coord]) -> f64 {
    path.windows(2).map(|w| dist(&w[0], &w[1])).sum()
}

fn ring_perimeter(ring: &[Coord]) -> f64 {
    let open = open_ring(ring);
    let closing = match (open.first(), open.last()) {
        (Some(a), Some(b)) if open.len() > 1 => dist(b, a),
        _ => 0.0,
    };
    path_length(open) + closing
}

/// Shoelace area; positive for counter-clockwise rings.
fn signed_area(ring: &[Coord]) -> f64 {
    let open = open_ring(ring);
    let n = open.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = open[i];
        let b = open[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

fn polygon_area(p: &Polygon) -> f64 {
    let holes: f64 = p.interiors.iter().map(|r| signed_area(r).abs()).sum();
    (signed_area(&p.exterior).abs() - holes).max(0.0)
}

/// Drop the closing vertex of a closed ring.
fn open_ring(ring: &[Coord]) -> &[Coord] {
    match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a == b => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn cross(o: &Coord, a: &Coord, b: &Coord) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// Each point goes to the lowest-id cell containing it, edges included.
fn assign_points(feature: &Geometry, grid: &Grid) -> Vec<GridPiece> {
    let mut pieces: Vec<(i64, Vec<Coord>)> = Vec::new();
    for c in feature.coords() {
        let owner = grid
            .cells()
            .iter()
            .find(|cell| cell.bounds().contains(c) && polygon_contains(cell.polygon(), c));
        let Some(owner) = owner else { continue };
        match pieces.iter_mut().find(|(id, _)| *id == owner.id) {
            Some((_, pts)) => pts.push(*c),
            None => pieces.push((owner.id, vec![*c])),
        }
    }
    pieces.sort_by_key(|(id, _)| *id);
    pieces
        .into_iter()
        .map(|(cell, mut pts)| GridPiece {
            cell,
            geometry: if pts.len() == 1 { Geometry::Point(pts.remove(0)) } else { Geometry::MultiPoint(pts) },
        })
        .collect()
}

/// Even-odd containment over every ring; points on any ring count as inside.
fn polygon_contains(polygon: &Polygon, p: &Coord) -> bool {
    let mut inside = false;
    for ring in polygon.rings() {
        let open = open_ring(ring);
        let n = open.len();
        for i in 0..n {
            let a = &open[i];
            let b = &open[(i + 1) % n];
            if on_segment(a, b, p) {
                return true;
            }
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
    }
    inside
}

fn on_segment(a: &Coord, b: &Coord, p: &Coord) -> bool {
    cross(a, b, p) == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

// ---------------------------------------------------------------------------
// Convex cells
// ---------------------------------------------------------------------------

/// A grid cell prepared for clipping: open vertex list and orientation sign.
struct ConvexCell<'a> {
    vertices: &'a [Coord],
    orientation: f64,
    scale: f64,
}

impl<'a> ConvexCell<'a> {
    fn new(cell: &'a CellShape) -> Result<Self, BackendError> {
        let polygon = cell.polygon();
        let not_convex = || BackendError::new(format!("grid cell {} is not convex", cell.id));
        if !polygon.interiors.is_empty() {
            return Err(not_convex());
        }
        let vertices = open_ring(&polygon.exterior);
        let area = signed_area(vertices);
        if vertices.len() < 3 || area == 0.0 {
            return Err(BackendError::new(format!("grid cell {} is degenerate", cell.id)));
        }
        let orientation = area.signum();
        let n = vertices.len();
        for i in 0..n {
            let turn = cross(&vertices[i], &vertices[(i + 1) % n], &vertices[(i + 2) % n]);
            if turn * orientation < 0.0 {
                return Err(not_convex());
            }
        }
        Ok(Self { vertices, orientation, scale: area.abs() })
    }

    fn edges(&self) -> impl Iterator<Item = (&Coord, &Coord)> {
        let n = self.vertices.len();
        (0..n).map(move |i| (&self.vertices[i], &self.vertices[(i + 1) % n]))
    }

    /// Positive inside the half-plane of edge `a→b`, zero on it.
    fn side(&self, a: &Coord, b: &Coord, p: &Coord) -> f64 {
        cross(a, b, p) * self.orientation
    }
}

// ---------------------------------------------------------------------------
// Lines (Cyrus–Beck)
// ---------------------------------------------------------------------------

fn clip_lines<'g>(
    lines: &[Vec<Coord>],
    candidates: impl Iterator<Item = &'g CellShape>,
) -> Result<Vec<GridPiece>, BackendError> {
    let mut pieces = Vec::new();
    for cell in candidates {
        let convex = ConvexCell::new(cell)?;
        let mut parts: Vec<Vec<Coord>> = Vec::new();
        for line in lines {
            let mut current: Vec<Coord> = Vec::new();
            for w in line.windows(2) {
                match clip_segment(&convex, &w[0], &w[1]) {
                    Some((start, end)) => {
                        if current.last() != Some(&start) {
                            if current.len() > 1 {
                                parts.push(std::mem::take(&mut current));
                            }
                            current.clear();
                            current.push(start);
                        }
                        current.push(end);
                    }
                    None => {
                        if current.len() > 1 {
                            parts.push(std::mem::take(&mut current));
                        }
                        current.clear();
                    }
                }
            }
            if current.len() > 1 {
                parts.push(current);
            }
        }
        if parts.is_empty() {
            continue;
        }
        let geometry = if parts.len() == 1 {
            Geometry::LineString(parts.remove(0))
        } else {
            Geometry::MultiLineString(parts)
        };
        pieces.push(GridPiece { cell: cell.id, geometry });
    }
    Ok(pieces)
}

/// Portion of `p0→p1` inside the cell, `None` if empty or a single point.
fn clip_segment(cell: &ConvexCell<'_>, p0: &Coord, p1: &Coord) -> Option<(Coord, Coord)> {
    let d = Coord::new(p1.x - p0.x, p1.y - p0.y);
    let (mut t_in, mut t_out) = (0.0_f64, 1.0_f64);
    for (a, b) in cell.edges() {
        let num = cell.side(a, b, p0);
        let den = ((b.x - a.x) * d.y - (b.y - a.y) * d.x) * cell.orientation;
        if den == 0.0 {
            if num < 0.0 {
                return None;
            }
            continue;
        }
        let t = -num / den;
        if den > 0.0 {
            t_in = t_in.max(t);
        } else {
            t_out = t_out.min(t);
        }
        if t_in >= t_out {
            return None;
        }
    }
    let at = |t: f64| {
        if t == 0.0 {
            *p0
        } else if t == 1.0 {
            *p1
        } else {
            Coord::new(p0.x + t * d.x, p0.y + t * d.y)
        }
    };
    Some((at(t_in), at(t_out)))
}

// ---------------------------------------------------------------------------
// Polygons (Sutherland–Hodgman)
// ---------------------------------------------------------------------------

/// Relative area below which a clipped ring is treated as a sliver.
const SLIVER: f64 = 1e-12;

fn clip_polygons<'g>(
    polygons: &[Polygon],
    candidates: impl Iterator<Item = &'g CellShape>,
) -> Result<Vec<GridPiece>, BackendError> {
    let mut pieces = Vec::new();
    for cell in candidates {
        let convex = ConvexCell::new(cell)?;
        let mut parts: Vec<Polygon> = polygons.iter().flat_map(|p| clip_polygon(&convex, p)).collect();
        if parts.is_empty() {
            continue;
        }
        let geometry = if parts.len() == 1 {
            Geometry::Polygon(parts.remove(0))
        } else {
            Geometry::MultiPolygon(parts)
        };
        pieces.push(GridPiece { cell: cell.id, geometry });
    }
    Ok(pieces)
}

/// Clip one polygon to the cell.
///
/// Sutherland–Hodgman keeps a concave polygon connected through edges that
/// run back and forth along the cell boundary. Those edges are cancelled and
/// the rest is re-chained, so a polygon crossing the cell several times comes
/// back as several parts and holes cut by the boundary open onto it.
fn clip_polygon(cell: &ConvexCell<'_>, polygon: &Polygon) -> Vec<Polygon> {
    let mut edges = ring_edges(&clip_ring(cell, &oriented(&polygon.exterior, true)));
    for hole in &polygon.interiors {
        edges.extend(ring_edges(&clip_ring(cell, &oriented(hole, false))));
    }
    let edges = cancel_boundary_overlaps(cell, edges);

    let mut exteriors = Vec::new();
    let mut holes = Vec::new();
    for ring in chain_rings(edges) {
        let area = signed_area(&ring);
        if area > SLIVER * cell.scale {
            exteriors.push(Polygon::new(ring));
        } else if area < -SLIVER * cell.scale {
            holes.push(ring);
        }
    }
    for hole in holes {
        let owner = exteriors.iter().position(|p| polygon_contains(p, &hole[0])).unwrap_or(0);
        if let Some(part) = exteriors.get_mut(owner) {
            part.interiors.push(hole);
        }
    }
    exteriors
}

/// Open copy of `ring`, counter-clockwise when `ccw`, clockwise otherwise.
fn oriented(ring: &[Coord], ccw: bool) -> Vec<Coord> {
    let mut open = open_ring(ring).to_vec();
    if (signed_area(&open) > 0.0) != ccw {
        open.reverse();
    }
    open
}

/// Clip one open ring to the cell. The result is open and may be empty.
fn clip_ring(cell: &ConvexCell<'_>, ring: &[Coord]) -> Vec<Coord> {
    let mut output: Vec<Coord> = ring.to_vec();
    for (a, b) in cell.edges() {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let n = input.len();
        for i in 0..n {
            let cur = &input[i];
            let prev = &input[(i + n - 1) % n];
            let s_cur = cell.side(a, b, cur);
            let s_prev = cell.side(a, b, prev);
            if s_cur >= 0.0 {
                if s_prev < 0.0 {
                    output.push(crossing(prev, cur, s_prev, s_cur));
                }
                output.push(*cur);
            } else if s_prev >= 0.0 {
                output.push(crossing(prev, cur, s_prev, s_cur));
            }
        }
    }
    output.dedup();
    if output.len() > 1 && output.first() == output.last() {
        output.pop();
    }
    output
}

type Edge = (Coord, Coord);

fn ring_edges(open: &[Coord]) -> Vec<Edge> {
    let n = open.len();
    if n < 3 {
        return Vec::new();
    }
    (0..n).map(|i| (open[i], open[(i + 1) % n])).filter(|(p, q)| p != q).collect()
}

/// Relative distance within which a vertex counts as lying on a cell edge.
const ON_EDGE: f64 = 1e-9;

/// Replace the ring edges lying on each cell edge by their net coverage.
///
/// Along one cell edge, every ring edge covers an interval with direction
/// +1 or -1. Sub-intervals whose directions sum to zero are dropped; the
/// others are emitted once per unit of net direction.
fn cancel_boundary_overlaps(cell: &ConvexCell<'_>, edges: Vec<Edge>) -> Vec<Edge> {
    let cell_edges: Vec<(Coord, Coord)> = cell.edges().map(|(a, b)| (*a, *b)).collect();
    let mut on_boundary: Vec<Vec<Edge>> = vec![Vec::new(); cell_edges.len()];
    let mut out = Vec::with_capacity(edges.len());

    for (p, q) in edges {
        let host = cell_edges.iter().position(|(a, b)| {
            let tol = ON_EDGE * dist(a, b) * dist(a, b);
            cross(a, b, &p).abs() <= tol && cross(a, b, &q).abs() <= tol
        });
        match host {
            Some(i) => on_boundary[i].push((p, q)),
            None => out.push((p, q)),
        }
    }

    for ((a, b), lying) in cell_edges.iter().zip(on_boundary) {
        if lying.is_empty() {
            continue;
        }
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len2 = dx * dx + dy * dy;
        let param = |c: &Coord| ((c.x - a.x) * dx + (c.y - a.y) * dy) / len2;

        let mut stops: Vec<(f64, Coord)> =
            lying.iter().flat_map(|(p, q)| [(param(p), *p), (param(q), *q)]).collect();
        stops.sort_by(|x, y| x.0.total_cmp(&y.0));
        stops.dedup_by(|x, y| x.0 == y.0);

        for w in stops.windows(2) {
            let (t0, c0) = w[0];
            let (t1, c1) = w[1];
            let mid = (t0 + t1) / 2.0;
            let net: i32 = lying
                .iter()
                .map(|(p, q)| {
                    let (tp, tq) = (param(p), param(q));
                    if tp.min(tq) <= mid && mid <= tp.max(tq) {
                        if tq > tp {
                            1
                        } else {
                            -1
                        }
                    } else {
                        0
                    }
                })
                .sum();
            let edge = if net > 0 { (c0, c1) } else { (c1, c0) };
            for _ in 0..net.unsigned_abs() {
                out.push(edge);
            }
        }
    }
    out
}

/// Link directed edges head to tail into closed rings. Open chains are
/// dropped.
fn chain_rings(mut edges: Vec<Edge>) -> Vec<Vec<Coord>> {
    let mut rings = Vec::new();
    while let Some((start, mut end)) = edges.pop() {
        let mut ring = vec![start];
        while end != start {
            let Some(next) = edges.iter().position(|(p, _)| *p == end) else {
                break;
            };
            let (_, q) = edges.swap_remove(next);
            ring.push(end);
            end = q;
        }
        if end == start && ring.len() >= 3 {
            ring.push(start);
            rings.push(ring);
        }
    }
    rings
}

fn crossing(p: &Coord, q: &Coord, sp: f64, sq: f64) -> Coord {
    let t = sp / (sp - sq);
    Coord::new(p.x + t * (q.x - p.x), p.y + t * (q.y - p.y))
}
