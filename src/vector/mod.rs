//! Vector geometry extraction for takeoff drawing aids.
//!
//! Reads the line work of a PDF page straight from its content stream,
//! cleans it up and derives snap points (endpoints, midpoints and
//! intersections) for precise measuring on the drawing.

mod clean;
mod geometry;

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

pub use clean::{
    assess_quality, clean_lines, generate_snap_points, merge_collinear_segments, Segment,
    SnapKind, SnapPoint, VectorQuality,
};
pub use geometry::{distance, line_intersection, lines_collinear, midpoint, Point};

/// Default output resolution.
pub const DEFAULT_VECTOR_DPI: f64 = 150.0;

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("page {page} does not exist (document has {count})")]
    PageNotFound { page: u32, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStats {
    pub raw_count: usize,
    pub cleaned_count: usize,
    pub snap_count: usize,
}

/// Cleaned vectors of one page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorExtraction {
    pub page_number: u32,
    pub dpi: f64,
    pub lines: Vec<Segment>,
    pub snap_points: Vec<SnapPoint>,
    pub quality: VectorQuality,
    pub stats: VectorStats,
}

/// Extract the vectors of a 1-indexed page.
pub fn extract_page_vectors(
    pdf: &Path,
    page_number: u32,
    dpi: f64,
) -> Result<VectorExtraction, VectorError> {
    let doc = Document::load(pdf)?;
    extract_from_document(&doc, page_number, dpi)
}

/// Extract from an already loaded document.
pub fn extract_from_document(
    doc: &Document,
    page_number: u32,
    dpi: f64,
) -> Result<VectorExtraction, VectorError> {
    let pages = doc.get_pages();
    let page_id = *pages.get(&page_number).ok_or(VectorError::PageNotFound {
        page: page_number,
        count: pages.len(),
    })?;

    let media_box = media_box(doc, page_id);
    let content = Content::decode(&doc.get_page_content(page_id)?)?;
    let raw = collect_segments(&content, media_box, dpi / 72.0);

    let lines = clean_lines(&raw);
    let snap_points = generate_snap_points(&lines);
    let stats = VectorStats {
        raw_count: raw.len(),
        cleaned_count: lines.len(),
        snap_count: snap_points.len(),
    };
    tracing::debug!(
        "page {}: {} raw segments, {} cleaned, {} snap points",
        page_number,
        stats.raw_count,
        stats.cleaned_count,
        stats.snap_count
    );

    Ok(VectorExtraction {
        page_number,
        dpi,
        quality: assess_quality(stats.cleaned_count, stats.snap_count),
        lines,
        snap_points,
        stats,
    })
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(&operands[operands.len() - N..]) {
        *slot = number(obj)?;
    }
    Some(out)
}

/// Page MediaBox as `[x0, y0, x1, y1]`, inherited from the parent if needed.
/// Falls back to US Letter.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Some(rect) = rect_from(doc, dict) {
            return rect;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
        depth += 1;
        if depth > 32 {
            break;
        }
    }
    [0.0, 0.0, 612.0, 792.0]
}

fn rect_from(doc: &Document, dict: &Dictionary) -> Option<[f64; 4]> {
    let obj = dict.get(b"MediaBox").ok()?;
    let arr = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        other => other.as_array().ok()?,
    };
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, obj) in values.iter_mut().zip(arr) {
        *slot = number(obj)?;
    }
    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

/// Affine transform `[a b c d e f]` as in PDF.
type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m` applied first, then `n`.
fn concat(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

#[derive(Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    line_width: f64,
}

/// Walks content-stream operators and collects stroked and filled path
/// edges in page-pixel space.
struct PathWalker {
    media_box: [f64; 4],
    scale: f64,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    current: Option<Point>,
    subpath_start: Option<Point>,
    pending: Vec<Segment>,
    out: Vec<Segment>,
}

impl PathWalker {
    fn new(media_box: [f64; 4], scale: f64) -> Self {
        Self {
            media_box,
            scale,
            state: GraphicsState {
                ctm: IDENTITY,
                line_width: 1.0,
            },
            stack: Vec::new(),
            current: None,
            subpath_start: None,
            pending: Vec::new(),
            out: Vec::new(),
        }
    }

    /// User space to page pixels, origin top-left.
    fn to_pixels(&self, x: f64, y: f64) -> Point {
        let m = &self.state.ctm;
        let ux = m[0] * x + m[2] * y + m[4];
        let uy = m[1] * x + m[3] * y + m[5];
        Point(
            (ux - self.media_box[0]) * self.scale,
            (self.media_box[3] - uy) * self.scale,
        )
    }

    fn move_to(&mut self, p: Point) {
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    fn line_to(&mut self, p: Point) {
        if let Some(from) = self.current {
            self.pending
                .push(Segment::new(from, p, self.state.line_width * self.scale));
        }
        self.current = Some(p);
    }

    fn close(&mut self) {
        if let (Some(from), Some(start)) = (self.current, self.subpath_start) {
            if from != start {
                self.pending
                    .push(Segment::new(from, start, self.state.line_width * self.scale));
            }
            self.current = Some(start);
        }
    }

    fn finish_path(&mut self, keep: bool) {
        if keep {
            self.out.append(&mut self.pending);
        } else {
            self.pending.clear();
        }
        self.current = None;
        self.subpath_start = None;
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.stack.push(self.state),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.state.ctm = concat(&m, &self.state.ctm);
                }
            }
            "w" => {
                if let Some([w]) = numbers::<1>(operands) {
                    self.state.line_width = if w > 0.0 { w } else { 1.0 };
                }
            }
            "m" => {
                if let Some([x, y]) = numbers::<2>(operands) {
                    let p = self.to_pixels(x, y);
                    self.move_to(p);
                }
            }
            "l" => {
                if let Some([x, y]) = numbers::<2>(operands) {
                    let p = self.to_pixels(x, y);
                    self.line_to(p);
                }
            }
            // Curves are approximated by their chord.
            "c" => {
                if let Some([_, _, _, _, x, y]) = numbers::<6>(operands) {
                    let p = self.to_pixels(x, y);
                    self.line_to(p);
                }
            }
            "v" | "y" => {
                if let Some([_, _, x, y]) = numbers::<4>(operands) {
                    let p = self.to_pixels(x, y);
                    self.line_to(p);
                }
            }
            "re" => {
                if let Some([x, y, w, h]) = numbers::<4>(operands) {
                    let corners = [
                        self.to_pixels(x, y),
                        self.to_pixels(x + w, y),
                        self.to_pixels(x + w, y + h),
                        self.to_pixels(x, y + h),
                    ];
                    self.move_to(corners[0]);
                    for corner in &corners[1..] {
                        self.line_to(*corner);
                    }
                    self.close();
                }
            }
            "h" => self.close(),
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.finish_path(true),
            "s" | "b" | "b*" => {
                self.close();
                self.finish_path(true);
            }
            "n" => self.finish_path(false),
            _ => {}
        }
    }
}

/// Collect path segments from decoded page content.
pub(crate) fn collect_segments(content: &Content, media_box: [f64; 4], scale: f64) -> Vec<Segment> {
    let mut walker = PathWalker::new(media_box, scale);
    for op in &content.operations {
        walker.apply(&op.operator, &op.operands);
    }
    walker.out
}

#[cfg(test)]
mod tests {
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    use super::*;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn nums(values: &[f64]) -> Vec<Object> {
        values.iter().map(|v| Object::Real(*v as f32)).collect()
    }

    fn letter() -> [f64; 4] {
        [0.0, 0.0, 612.0, 792.0]
    }

    #[test]
    fn test_line_is_flipped_and_scaled() {
        let content = Content {
            operations: vec![
                op("m", nums(&[0.0, 792.0])),
                op("l", nums(&[72.0, 792.0])),
                op("S", vec![]),
            ],
        };
        let segments = collect_segments(&content, letter(), 2.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, Point(0.0, 0.0));
        assert_eq!(segments[0].end, Point(144.0, 0.0));
        assert_eq!(segments[0].width, 2.0);
    }

    #[test]
    fn test_rectangle_yields_four_edges() {
        let content = Content {
            operations: vec![op("re", nums(&[10.0, 10.0, 100.0, 50.0])), op("f", vec![])],
        };
        assert_eq!(collect_segments(&content, letter(), 1.0).len(), 4);
    }

    #[test]
    fn test_transform_stack_and_discard() {
        let content = Content {
            operations: vec![
                op("q", vec![]),
                op("cm", nums(&[1.0, 0.0, 0.0, 1.0, 100.0, 0.0])),
                op("m", nums(&[0.0, 0.0])),
                op("l", nums(&[10.0, 0.0])),
                op("S", vec![]),
                op("Q", vec![]),
                op("m", nums(&[0.0, 0.0])),
                op("l", nums(&[10.0, 0.0])),
                op("S", vec![]),
                op("m", nums(&[0.0, 0.0])),
                op("l", nums(&[50.0, 50.0])),
                op("n", vec![]),
            ],
        };
        let segments = collect_segments(&content, letter(), 1.0);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, Point(100.0, 792.0));
        assert_eq!(segments[1].start, Point(0.0, 792.0));
    }

    fn grid_pdf(dir: &Path) -> std::path::PathBuf {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut ops = Vec::new();
        for i in 0..5 {
            let offset = 100.0 + i as f64 * 50.0;
            ops.push(op("m", nums(&[offset, 100.0])));
            ops.push(op("l", nums(&[offset, 400.0])));
            ops.push(op("m", nums(&[100.0, offset])));
            ops.push(op("l", nums(&[400.0, offset])));
        }
        ops.push(op("S", vec![]));
        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let path = dir.join("grid.pdf");
        doc.save(&path).unwrap();
        path
    }

    #[test]
    fn test_extract_grid_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = grid_pdf(dir.path());

        let result = extract_page_vectors(&path, 1, 72.0).unwrap();
        assert_eq!(result.stats.raw_count, 10);
        assert_eq!(result.stats.cleaned_count, 10);
        // 20 endpoints + 10 midpoints + 25 crossings, minus coincident ones.
        assert!(result.snap_points.iter().any(|s| s.kind == SnapKind::Intersection));
        assert_eq!(result.quality, VectorQuality::Poor);

        assert!(matches!(
            extract_page_vectors(&path, 2, 72.0),
            Err(VectorError::PageNotFound { page: 2, count: 1 })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            extract_page_vectors(Path::new("/nonexistent/takeoff.pdf"), 1, 150.0),
            Err(VectorError::Pdf(_))
        ));
    }
}
