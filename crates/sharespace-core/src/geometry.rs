//! Geometry primitives and the area partitioner interface
//!
//! The engine never computes areas itself. It produces generator points and
//! hands them to an [`AreaPartitioner`], which returns one polygon per
//! generator.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// 2D point on the floor plane, in metres
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    #[inline]
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn distance(self, other: Point) -> f64 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalized(self) -> Point {
        let len = self.length();
        if len <= f64::EPSILON {
            Point::ZERO
        } else {
            self / len
        }
    }

    /// Linear interpolation, `t = 0` yields `self`
    #[inline]
    pub fn lerp(self, to: Point, t: f64) -> Point {
        self + (to - self) * t
    }
}

impl Add for Point {
    type Output = Point;

    #[inline]
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    #[inline]
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    #[inline]
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point {
    type Output = Point;

    #[inline]
    fn div(self, rhs: f64) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

/// Axis-aligned play-area bounds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(min: Point, max: Point) -> Self {
        Rect { min, max }
    }

    /// Square area of the given edge length centred on the origin
    pub fn centered_square(size: f64) -> Self {
        let half = size / 2.0;
        Rect::new(Point::new(-half, -half), Point::new(half, half))
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> Point {
        self.min.lerp(self.max, 0.5)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ])
    }
}

impl Default for Rect {
    fn default() -> Self {
        Rect::centered_square(4.0)
    }
}

/// Simple polygon, vertices in order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Polygon { vertices }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.len() < 3
    }

    /// Signed shoelace area, positive for counter-clockwise order
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area centroid; falls back to the vertex mean for degenerate polygons
    pub fn centroid(&self) -> Point {
        let n = self.vertices.len();
        if n == 0 {
            return Point::ZERO;
        }
        let area = self.signed_area();
        if area.abs() <= 1e-12 {
            let sum = self.vertices.iter().fold(Point::ZERO, |acc, p| acc + *p);
            return sum / n as f64;
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let cross = a.x * b.y - b.x * a.y;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        Point::new(cx / (6.0 * area), cy / (6.0 * area))
    }

    pub fn translate(&self, offset: Point) -> Polygon {
        Polygon::new(self.vertices.iter().map(|p| *p + offset).collect())
    }
}

/// Splits the play area among a set of generator points.
///
/// Implementations may fail on degenerate input (duplicate or collinear
/// generators). Callers log and skip the affected sample.
pub trait AreaPartitioner: Send + Sync {
    fn partition(
        &self,
        generators: &BTreeMap<usize, Point>,
    ) -> Result<BTreeMap<usize, Polygon>, GeometryError>;
}

/// Pairwise attraction constant for weighted generators
pub const GENERATOR_ATTRACTION: f64 = 0.35;

/// Shift generator points so that heavier generators claim a larger cell.
///
/// Every pair pushes apart along their connecting direction with a force of
/// `G * w1 * w2`; each point moves by the force divided by its own weight.
pub fn weight_generators(positions: &[Point], weights: &[f64]) -> Vec<Point> {
    let mut shifted = positions.to_vec();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let (w1, w2) = (weights[i].max(f64::EPSILON), weights[j].max(f64::EPSILON));
            let direction = (positions[j] - positions[i]).normalized();
            let force = direction * (GENERATOR_ATTRACTION * w1 * w2);
            shifted[i] = shifted[i] - force / w1;
            shifted[j] = shifted[j] + force / w2;
        }
    }
    shifted
}
