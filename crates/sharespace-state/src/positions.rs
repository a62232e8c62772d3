//! Generator position tables
//!
//! Positions depend only on the play-area bounds. Regular positions sit on
//! the quarter grid around the area; focus positions collapse onto the
//! centre so the focused participant gets the middle of the area.

use sharespace_core::{Point, Rect};

/// Offsets of the focused generator while a switch is in progress
const SWITCH_FOCUS_OFFSETS: [Point; 4] = [
    Point::new(0.0, -0.4),
    Point::new(-0.4, 0.0),
    Point::new(0.0, 0.4),
    Point::new(0.4, 0.0),
];

/// Precomputed generator positions for every slot and focus situation
#[derive(Clone, Debug, PartialEq)]
pub struct StatePositions {
    /// One per slot, no focus held
    pub regular: [Point; 8],
    /// Corners for participants pushed aside by a focus, by slot / 2
    pub defocus: [Point; 4],
    /// Focused generator, by slot / 2
    pub focus: [Point; 4],
    /// Focused generator mid-switch, by slot / 2
    pub switch_focus: [Point; 4],
    center: Point,
}

impl StatePositions {
    pub fn new(bounds: Rect, regular_offset: f64) -> Self {
        let w = bounds.width();
        let h = bounds.height();
        let left = bounds.min.x + w / 4.0;
        let mid_x = bounds.min.x + w / 2.0;
        let right = bounds.min.x + w * 3.0 / 4.0;
        let low = bounds.min.y + h / 4.0;
        let mid_y = bounds.min.y + h / 2.0;
        let high = bounds.min.y + h * 3.0 / 4.0;

        let regular = [
            Point::new(left, low),
            Point::new(mid_x, low),
            Point::new(right, low),
            Point::new(right, mid_y),
            Point::new(right, high),
            Point::new(mid_x, high),
            Point::new(left, high),
            Point::new(left, mid_y),
        ];

        let (min, max) = (bounds.min, bounds.max);
        let o = regular_offset;
        let defocus = [
            Point::new(min.x + o, min.y + o),
            Point::new(max.x - o, min.y + o),
            Point::new(max.x - o, max.y - o),
            Point::new(min.x + o, max.y - o),
        ];

        let center = bounds.center();
        let focus = [center; 4];
        let switch_focus = SWITCH_FOCUS_OFFSETS.map(|offset| center + offset);

        StatePositions { regular, defocus, focus, switch_focus, center }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    /// Whether a generator sits in the central focus region
    pub fn is_central(&self, p: Point) -> bool {
        let d = p - self.center;
        d.x.abs() < 0.5 && d.y.abs() < 0.5
    }
}

impl Default for StatePositions {
    fn default() -> Self {
        StatePositions::new(Rect::default(), 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_grid() {
        let positions = StatePositions::new(Rect::centered_square(4.0), 0.5);
        assert_eq!(positions.regular[0], Point::new(-1.0, -1.0));
        assert_eq!(positions.regular[3], Point::new(1.0, 0.0));
        assert_eq!(positions.regular[7], Point::new(-1.0, 0.0));
        assert_eq!(positions.defocus[2], Point::new(1.5, 1.5));
        assert!(positions.focus.iter().all(|p| *p == Point::ZERO));
        assert_eq!(positions.switch_focus[1], Point::new(-0.4, 0.0));
    }

    #[test]
    fn test_is_central() {
        let positions = StatePositions::default();
        assert!(positions.is_central(positions.switch_focus[0]));
        assert!(!positions.is_central(positions.regular[1]));
    }
}
