//! Reference area partitioner
//!
//! Plain Voronoi cells clipped to the play area. Each cell starts as the
//! bounds rectangle and is cut by the perpendicular bisector towards every
//! other generator.

use std::collections::BTreeMap;

use sharespace_core::{AreaPartitioner, GeometryError, Point, Polygon, Rect};

/// Generators closer than this are treated as duplicates
const DUPLICATE_EPSILON: f64 = 1e-9;

#[inline]
fn dot(a: Point, b: Point) -> f64 {
    a.x * b.x + a.y * b.y
}

/// Voronoi partitioner bounded by a rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedVoronoi {
    bounds: Rect,
}

impl ClippedVoronoi {
    pub fn new(bounds: Rect) -> Self {
        ClippedVoronoi { bounds }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Cell of `site` against every other generator
    fn cell(&self, site: Point, others: impl Iterator<Item = Point>) -> Vec<Point> {
        let mut cell = self.bounds.to_polygon().vertices;
        for other in others {
            let normal = other - site;
            let mid = site.lerp(other, 0.5);
            cell = clip(&cell, normal, dot(normal, mid));
            if cell.is_empty() {
                break;
            }
        }
        cell
    }
}

impl Default for ClippedVoronoi {
    fn default() -> Self {
        Self::new(Rect::default())
    }
}

/// Sutherland-Hodgman against the half-plane `dot(normal, p) <= offset`
fn clip(polygon: &[Point], normal: Point, offset: f64) -> Vec<Point> {
    let inside = |p: Point| dot(normal, p) <= offset;
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, &current) in polygon.iter().enumerate() {
        let previous = polygon[(i + polygon.len() - 1) % polygon.len()];
        match (inside(previous), inside(current)) {
            (true, true) => out.push(current),
            (true, false) => out.push(intersect(previous, current, normal, offset)),
            (false, true) => {
                out.push(intersect(previous, current, normal, offset));
                out.push(current);
            }
            (false, false) => {}
        }
    }
    out
}

fn intersect(a: Point, b: Point, normal: Point, offset: f64) -> Point {
    let da = dot(normal, a) - offset;
    let db = dot(normal, b) - offset;
    a.lerp(b, da / (da - db))
}

impl AreaPartitioner for ClippedVoronoi {
    fn partition(&self, generators: &BTreeMap<usize, Point>) -> Result<BTreeMap<usize, Polygon>, GeometryError> {
        if let Some((key, p)) = generators.iter().find(|(_, p)| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(GeometryError::Degenerate(format!("generator {key} at ({}, {})", p.x, p.y)));
        }
        let points: Vec<(usize, Point)> = generators.iter().map(|(k, p)| (*k, *p)).collect();
        for (i, (a, pa)) in points.iter().enumerate() {
            if let Some((b, _)) = points[i + 1..].iter().find(|(_, pb)| pa.distance(*pb) < DUPLICATE_EPSILON) {
                return Err(GeometryError::Degenerate(format!("generators {a} and {b} coincide")));
            }
        }

        let mut cells = BTreeMap::new();
        for (key, site) in &points {
            let others = points.iter().filter(|(k, _)| k != key).map(|(_, p)| *p);
            let cell = Polygon::new(self.cell(*site, others));
            if cell.is_empty() {
                return Err(GeometryError::MissingCell(*key));
            }
            cells.insert(*key, cell);
        }
        Ok(cells)
    }
}
