//! Geometry ↔ raster conversion.
//!
//! `rasterize` turns a closed geometry into a [`BitGrid`] aligned to a
//! grid location; `to_geometry` is the inverse, tracing the boundary of
//! the populated cells back into geographic polygons. Geometries whose
//! rings are not closed are GFE-native paths that were *produced from* a
//! grid; they are passed through untouched so they are never degraded by
//! a second rasterization.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, CoordsIter};
use geo::{Geometry, LineString, MultiPolygon, Point, Polygon};
use tracing::debug;

use hazgrid_core::{TimeConstraints, TimeRange};

use crate::error::{RasterError, RasterResult};
use crate::grid::BitGrid;
use crate::location::GridLocation;

/// Result of [`rasterize`]. Callers must check for the pass-through
/// variant before treating the outcome as a fresh rasterization.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterOutcome {
    /// The geometry was rasterized into the grid's cell space.
    Raster(BitGrid),
    /// The geometry is already grid-derived (open rings) and was passed
    /// through unchanged.
    AlreadyRasterized(Geometry<f64>),
}

impl RasterOutcome {
    pub fn bit_grid(self) -> Option<BitGrid> {
        match self {
            RasterOutcome::Raster(bits) => Some(bits),
            RasterOutcome::AlreadyRasterized(_) => None,
        }
    }
}

/// True if every ring of the geometry is closed, i.e. the geometry is a
/// true area and safe to rasterize.
pub fn is_closed(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => true,
        Geometry::LineString(ls) => ls.is_closed() && ls.0.len() >= 4,
        Geometry::MultiLineString(mls) => {
            !mls.0.is_empty() && mls.0.iter().all(|ls| ls.is_closed() && ls.0.len() >= 4)
        }
        Geometry::GeometryCollection(gc) => !gc.is_empty() && gc.iter().all(is_closed),
        _ => false,
    }
}

/// Rasterize a geometry against a grid location.
///
/// Multi-part geometries are rasterized part by part and ORed together;
/// every part is transformed into the grid's pixel space first, so bits
/// are never combined across coordinate spaces. A cell is set when the
/// geometry contains its center.
pub fn rasterize(loc: &GridLocation, geometry: &Geometry<f64>) -> RasterResult<RasterOutcome> {
    if !is_closed(geometry) {
        debug!("open-ring geometry passed through without rasterization");
        return Ok(RasterOutcome::AlreadyRasterized(geometry.clone()));
    }
    for c in geometry.coords_iter() {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(RasterError::Transform(format!(
                "non-finite coordinate ({}, {})",
                c.x, c.y
            )));
        }
    }
    let mut bits = BitGrid::new(loc.nx, loc.ny);
    for polygon in closed_parts(geometry) {
        let mut part = BitGrid::new(loc.nx, loc.ny);
        rasterize_polygon(loc, &polygon, &mut part);
        bits.or_assign(&part);
    }
    Ok(RasterOutcome::Raster(bits))
}

fn closed_parts(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::LineString(ls) => vec![Polygon::new(ls.clone(), Vec::new())],
        Geometry::MultiLineString(mls) => mls
            .0
            .iter()
            .map(|ls| Polygon::new(ls.clone(), Vec::new()))
            .collect(),
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(closed_parts).collect(),
        _ => Vec::new(),
    }
}

fn rasterize_polygon(loc: &GridLocation, polygon: &Polygon<f64>, bits: &mut BitGrid) {
    let Some(rect) = polygon.bounding_rect() else {
        return;
    };
    let Some((x0, y0, x1, y1)) = loc.cell_bounds(rect.min(), rect.max()) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            if polygon.contains(&Point::from(loc.cell_center(x, y))) {
                bits.set(x, y, true);
            }
        }
    }
}

/// Trace the boundary of the populated cells into geographic polygons.
///
/// Rings are extracted by stitching the exposed cell edges (interior kept
/// on the left); counter-clockwise rings become shells, clockwise rings
/// become holes assigned to the smallest enclosing shell.
pub fn to_geometry(loc: &GridLocation, bits: &BitGrid) -> MultiPolygon<f64> {
    let rings = boundary_rings(bits);
    let mut shells: Vec<(Vec<(i64, i64)>, i64)> = Vec::new();
    let mut holes: Vec<Vec<(i64, i64)>> = Vec::new();
    for ring in rings {
        let area2 = signed_area2(&ring);
        if area2 > 0 {
            shells.push((ring, area2));
        } else {
            holes.push(ring);
        }
    }
    // Smallest shells first so each hole lands in its innermost shell.
    shells.sort_by_key(|(_, area2)| *area2);

    let grid_shells: Vec<Polygon<f64>> = shells
        .iter()
        .map(|(ring, _)| Polygon::new(grid_line_string(ring), Vec::new()))
        .collect();

    let mut shell_holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];
    for hole in &holes {
        let probe = interior_probe(hole);
        if let Some(i) = grid_shells.iter().position(|s| s.contains(&probe)) {
            shell_holes[i].push(geo_line_string(loc, hole));
        }
    }

    let polygons = shells
        .iter()
        .zip(shell_holes)
        .map(|((ring, _), holes)| Polygon::new(geo_line_string(loc, ring), holes))
        .collect();
    MultiPolygon(polygons)
}

/// Quantize an event time range to the grid's storage boundaries.
pub fn quantized_range(range: TimeRange, tc: &TimeConstraints) -> TimeRange {
    range.quantize(tc)
}

// ── Ring extraction ───────────────────────────────────────────────

type Vertex = (i64, i64);

/// Collect the directed exposed edges of all set cells and stitch them
/// into closed rings. Edges keep the set region on their left, so outer
/// boundaries come out counter-clockwise and cavity boundaries clockwise.
fn boundary_rings(bits: &BitGrid) -> Vec<Vec<Vertex>> {
    let mut edges: BTreeMap<Vertex, Vec<Vertex>> = BTreeMap::new();
    let mut push = |from: Vertex, to: Vertex| edges.entry(from).or_default().push(to);
    for (x, y) in bits.iter_set() {
        let (x, y) = (x as i64, y as i64);
        if !bits.get_i(x, y - 1) {
            push((x, y), (x + 1, y));
        }
        if !bits.get_i(x + 1, y) {
            push((x + 1, y), (x + 1, y + 1));
        }
        if !bits.get_i(x, y + 1) {
            push((x + 1, y + 1), (x, y + 1));
        }
        if !bits.get_i(x - 1, y) {
            push((x, y + 1), (x, y));
        }
    }

    let mut rings = Vec::new();
    while let Some((&start, _)) = edges.iter().next() {
        let first = pop_edge(&mut edges, start, 0);
        let mut ring = vec![start, first];
        let (mut prev, mut cur) = (start, first);
        while cur != start {
            let dir = (cur.0 - prev.0, cur.1 - prev.1);
            let Some(outs) = edges.get(&cur) else { break };
            // At a checkerboard junction two edges leave the same vertex;
            // taking the sharpest left turn keeps touching regions apart.
            let mut best = 0;
            let mut best_turn = i64::MIN;
            for (i, e) in outs.iter().enumerate() {
                let c = (e.0 - cur.0, e.1 - cur.1);
                let turn = dir.0 * c.1 - dir.1 * c.0;
                if turn > best_turn {
                    best_turn = turn;
                    best = i;
                }
            }
            let next = pop_edge(&mut edges, cur, best);
            ring.push(next);
            prev = cur;
            cur = next;
        }
        if ring.len() >= 5 {
            rings.push(simplify_ring(ring));
        }
    }
    rings
}

fn pop_edge(edges: &mut BTreeMap<Vertex, Vec<Vertex>>, from: Vertex, idx: usize) -> Vertex {
    let outs = edges.get_mut(&from).unwrap_or_else(|| unreachable!());
    let to = outs.remove(idx);
    if outs.is_empty() {
        edges.remove(&from);
    }
    to
}

/// Drop collinear vertices from a closed ring (first == last).
fn simplify_ring(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len() - 1;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let d1 = (cur.0 - prev.0, cur.1 - prev.1);
        let d2 = (next.0 - cur.0, next.1 - cur.1);
        if d1 != d2 {
            out.push(cur);
        }
    }
    if let Some(&first) = out.first() {
        out.push(first);
    }
    out
}

/// Twice the signed area of a closed ring (shoelace).
fn signed_area2(ring: &[Vertex]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum()
}

/// A point guaranteed to lie in the set region adjacent to a ring: the
/// midpoint of its first edge nudged a quarter-cell to the left.
fn interior_probe(ring: &[Vertex]) -> Point<f64> {
    let (a, b) = (ring[0], ring[1]);
    let mid = ((a.0 + b.0) as f64 / 2.0, (a.1 + b.1) as f64 / 2.0);
    let dir = ((b.0 - a.0) as f64, (b.1 - a.1) as f64);
    let len = (dir.0 * dir.0 + dir.1 * dir.1).sqrt();
    Point::new(mid.0 - dir.1 / len * 0.25, mid.1 + dir.0 / len * 0.25)
}

fn grid_line_string(ring: &[Vertex]) -> LineString<f64> {
    LineString::from(
        ring.iter()
            .map(|&(x, y)| (x as f64, y as f64))
            .collect::<Vec<_>>(),
    )
}

fn geo_line_string(loc: &GridLocation, ring: &[Vertex]) -> LineString<f64> {
    LineString::new(ring.iter().map(|&(x, y)| loc.vertex(x, y)).collect())
}
