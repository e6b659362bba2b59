//! Line cleanup, snap point generation and quality grading.

use serde::{Deserialize, Serialize};

use super::geometry::{distance, line_intersection, lines_collinear, midpoint, Point};

/// Minimum segment length kept, in pixels.
pub const MIN_LINE_LENGTH: f64 = 5.0;
/// Endpoint gap bridged when merging collinear segments, in pixels.
pub const MERGE_TOLERANCE: f64 = 3.0;
/// Maximum angle between segments treated as collinear, in radians.
pub const ANGLE_TOLERANCE: f64 = 0.05;
/// Snap points closer than this are one point, in pixels.
pub const SNAP_DEDUPE_TOLERANCE: f64 = 2.0;

/// A stroked line segment in page-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub width: f64,
}

impl Segment {
    pub fn new(start: Point, end: Point, width: f64) -> Self {
        Self { start, end, width }
    }

    pub fn length(&self) -> f64 {
        distance(self.start, self.end)
    }

    fn ends(&self) -> (Point, Point) {
        (self.start, self.end)
    }
}

/// Kind of snap point, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapKind {
    Midpoint,
    Endpoint,
    Intersection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapPoint {
    #[serde(rename = "type")]
    pub kind: SnapKind,
    pub coords: Point,
}

/// How usable the extracted vectors are for snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorQuality {
    None,
    Poor,
    Medium,
    Good,
}

impl VectorQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Poor => "poor",
            Self::Medium => "medium",
            Self::Good => "good",
        }
    }
}

impl std::fmt::Display for VectorQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop short segments, then merge collinear neighbours.
pub fn clean_lines(lines: &[Segment]) -> Vec<Segment> {
    let filtered: Vec<Segment> = lines
        .iter()
        .filter(|s| s.length() >= MIN_LINE_LENGTH)
        .copied()
        .collect();
    merge_collinear_segments(&filtered)
}

/// Merge collinear segments whose endpoints nearly touch. A merged segment
/// spans the two farthest endpoints of its parts and keeps the width of the
/// first.
pub fn merge_collinear_segments(lines: &[Segment]) -> Vec<Segment> {
    if lines.len() <= 1 {
        return lines.to_vec();
    }

    let mut consumed = vec![false; lines.len()];
    let mut merged = Vec::new();

    for i in 0..lines.len() {
        if consumed[i] {
            continue;
        }
        let (mut start, mut end) = lines[i].ends();

        let mut changed = true;
        while changed {
            changed = false;
            for j in 0..lines.len() {
                if i == j || consumed[j] {
                    continue;
                }
                let other = lines[j].ends();
                if !lines_collinear((start, end), other, ANGLE_TOLERANCE, MERGE_TOLERANCE) {
                    continue;
                }
                let touching = [start, end].iter().any(|p| {
                    [other.0, other.1]
                        .iter()
                        .any(|q| distance(*p, *q) < MERGE_TOLERANCE)
                });
                if !touching {
                    continue;
                }

                let points = [start, end, other.0, other.1];
                let mut best = (start, end, distance(start, end));
                for p in points {
                    for q in points {
                        let d = distance(p, q);
                        if d > best.2 {
                            best = (p, q, d);
                        }
                    }
                }
                start = best.0;
                end = best.1;
                consumed[j] = true;
                changed = true;
            }
        }

        consumed[i] = true;
        merged.push(Segment::new(start, end, lines[i].width));
    }
    merged
}

/// Endpoints, midpoints and pairwise intersections, deduplicated. A point
/// standing for several candidates takes the strongest kind among them.
pub fn generate_snap_points(lines: &[Segment]) -> Vec<SnapPoint> {
    let mut candidates = Vec::with_capacity(lines.len() * 3);
    for line in lines {
        candidates.push(SnapPoint {
            kind: SnapKind::Endpoint,
            coords: line.start,
        });
        candidates.push(SnapPoint {
            kind: SnapKind::Endpoint,
            coords: line.end,
        });
        candidates.push(SnapPoint {
            kind: SnapKind::Midpoint,
            coords: midpoint(line.start, line.end),
        });
    }
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            if let Some(coords) = line_intersection(a.ends(), b.ends()) {
                candidates.push(SnapPoint {
                    kind: SnapKind::Intersection,
                    coords,
                });
            }
        }
    }

    let mut unique: Vec<Point> = Vec::new();
    for c in &candidates {
        if !unique
            .iter()
            .any(|u| distance(c.coords, *u) < SNAP_DEDUPE_TOLERANCE)
        {
            unique.push(c.coords);
        }
    }

    unique
        .into_iter()
        .map(|coords| {
            let kind = candidates
                .iter()
                .filter(|c| distance(c.coords, coords) < SNAP_DEDUPE_TOLERANCE)
                .map(|c| c.kind)
                .max()
                .unwrap_or(SnapKind::Midpoint);
            SnapPoint { kind, coords }
        })
        .collect()
}

pub fn assess_quality(cleaned_count: usize, snap_count: usize) -> VectorQuality {
    if cleaned_count == 0 {
        VectorQuality::None
    } else if cleaned_count >= 50 && snap_count >= 100 {
        VectorQuality::Good
    } else if cleaned_count >= 20 && snap_count >= 40 {
        VectorQuality::Medium
    } else {
        VectorQuality::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(Point(x1, y1), Point(x2, y2), 1.0)
    }

    #[test]
    fn test_short_lines_dropped() {
        let cleaned = clean_lines(&[seg(0.0, 0.0, 3.0, 0.0), seg(0.0, 10.0, 50.0, 10.0)]);
        assert_eq!(cleaned, vec![seg(0.0, 10.0, 50.0, 10.0)]);
    }

    #[test]
    fn test_collinear_segments_merge() {
        let cleaned = clean_lines(&[
            seg(0.0, 0.0, 10.0, 0.0),
            seg(11.0, 0.5, 20.0, 0.5),
            seg(21.0, 0.0, 40.0, 0.0),
        ]);
        assert_eq!(cleaned.len(), 1);
        let merged = cleaned[0];
        let xs = [merged.start.x(), merged.end.x()];
        assert!(xs.contains(&0.0) && xs.contains(&40.0));
    }

    #[test]
    fn test_gap_prevents_merge() {
        let cleaned = clean_lines(&[seg(0.0, 0.0, 10.0, 0.0), seg(20.0, 0.0, 30.0, 0.0)]);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn test_perpendicular_lines_not_merged() {
        let cleaned = clean_lines(&[seg(0.0, 0.0, 10.0, 0.0), seg(10.0, 0.0, 10.0, 10.0)]);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn test_snap_points_for_cross() {
        let lines = [seg(0.0, 50.0, 100.0, 50.0), seg(50.0, 0.0, 50.0, 100.0)];
        let snaps = generate_snap_points(&lines);
        // 4 endpoints, and both midpoints collapse into the intersection.
        assert_eq!(snaps.len(), 5);
        let center: Vec<_> = snaps
            .iter()
            .filter(|s| s.coords == Point(50.0, 50.0))
            .collect();
        assert_eq!(center.len(), 1);
        assert_eq!(center[0].kind, SnapKind::Intersection);
        assert_eq!(
            snaps.iter().filter(|s| s.kind == SnapKind::Endpoint).count(),
            4
        );
    }

    #[test]
    fn test_snap_point_serialization() {
        let snap = SnapPoint {
            kind: SnapKind::Endpoint,
            coords: Point(1.5, 2.0),
        };
        assert_eq!(
            serde_json::to_string(&snap).unwrap(),
            r#"{"type":"endpoint","coords":[1.5,2.0]}"#
        );
    }

    #[test]
    fn test_quality() {
        assert_eq!(assess_quality(0, 0), VectorQuality::None);
        assert_eq!(assess_quality(50, 100), VectorQuality::Good);
        assert_eq!(assess_quality(50, 99), VectorQuality::Medium);
        assert_eq!(assess_quality(20, 40), VectorQuality::Medium);
        assert_eq!(assess_quality(19, 400), VectorQuality::Poor);
    }
}
