//! Planar geometry helpers for drawing vectors.

use serde::{Deserialize, Serialize};

/// A point in page-pixel space (origin top-left). Serializes as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub f64, pub f64);

impl Point {
    pub fn x(&self) -> f64 {
        self.0
    }

    pub fn y(&self) -> f64 {
        self.1
    }
}

pub fn distance(p1: Point, p2: Point) -> f64 {
    (p2.0 - p1.0).hypot(p2.1 - p1.1)
}

pub fn midpoint(p1: Point, p2: Point) -> Point {
    Point((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0)
}

/// Undirected angle of a segment, in `[0, π)`.
pub fn line_angle(start: Point, end: Point) -> f64 {
    let angle = (end.1 - start.1).atan2(end.0 - start.0);
    if angle < 0.0 {
        angle + std::f64::consts::PI
    } else if angle >= std::f64::consts::PI {
        angle - std::f64::consts::PI
    } else {
        angle
    }
}

/// Perpendicular distance from `point` to the infinite line through
/// `start`-`end`.
pub fn point_to_line_distance(point: Point, start: Point, end: Point) -> f64 {
    let len = distance(start, end);
    if len == 0.0 {
        return distance(point, start);
    }
    let numerator = ((end.1 - start.1) * point.0 - (end.0 - start.0) * point.1
        + end.0 * start.1
        - end.1 * start.0)
        .abs();
    numerator / len
}

/// True if two segments are parallel within `angle_tolerance` radians and
/// both endpoints of the second lie within `distance_tolerance` of the
/// first's extension.
pub fn lines_collinear(
    line1: (Point, Point),
    line2: (Point, Point),
    angle_tolerance: f64,
    distance_tolerance: f64,
) -> bool {
    let mut diff = (line_angle(line1.0, line1.1) - line_angle(line2.0, line2.1)).abs();
    if diff > std::f64::consts::FRAC_PI_2 {
        diff = std::f64::consts::PI - diff;
    }
    if diff > angle_tolerance {
        return false;
    }
    point_to_line_distance(line2.0, line1.0, line1.1) < distance_tolerance
        && point_to_line_distance(line2.1, line1.0, line1.1) < distance_tolerance
}

/// Intersection of two segments, if they cross within both.
pub fn line_intersection(line1: (Point, Point), line2: (Point, Point)) -> Option<Point> {
    let (Point(x1, y1), Point(x2, y2)) = line1;
    let (Point(x3, y3), Point(x4, y4)) = line2;

    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-10 {
        return None;
    }

    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    let u = -((x1 - x2) * (y1 - y3) - (y1 - y2) * (x1 - x3)) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(Point(x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_and_midpoint() {
        assert_eq!(distance(Point(0.0, 0.0), Point(3.0, 4.0)), 5.0);
        assert_eq!(midpoint(Point(0.0, 0.0), Point(4.0, 2.0)), Point(2.0, 1.0));
    }

    #[test]
    fn test_line_angle_is_undirected() {
        let a = line_angle(Point(0.0, 0.0), Point(10.0, 10.0));
        let b = line_angle(Point(10.0, 10.0), Point(0.0, 0.0));
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_collinear() {
        let base = (Point(0.0, 0.0), Point(10.0, 0.0));
        assert!(lines_collinear(base, (Point(12.0, 1.0), Point(20.0, 1.0)), 0.05, 3.0));
        assert!(!lines_collinear(base, (Point(12.0, 5.0), Point(20.0, 5.0)), 0.05, 3.0));
        assert!(!lines_collinear(base, (Point(0.0, 0.0), Point(0.0, 10.0)), 0.05, 3.0));
    }

    #[test]
    fn test_intersection() {
        let h = (Point(0.0, 5.0), Point(10.0, 5.0));
        let v = (Point(5.0, 0.0), Point(5.0, 10.0));
        assert_eq!(line_intersection(h, v), Some(Point(5.0, 5.0)));

        let short = (Point(20.0, 0.0), Point(20.0, 10.0));
        assert_eq!(line_intersection(h, short), None);
        assert_eq!(line_intersection(h, h), None);
    }
}
