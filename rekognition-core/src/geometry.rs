//! Normalized image geometry: bounding boxes and regions of interest.
//!
//! All coordinates are fractions of the image width/height, matching the
//! coordinate space Rekognition reports boxes in.

use serde::{Deserialize, Serialize};

use crate::error::{RekognitionError, Result};

/// Tolerance used for boundary tests on polygon edges.
const EDGE_EPSILON: f32 = 1e-6;

/// Bounding box in normalized coordinates.
///
/// Field names serialize as `Width`/`Height`/`Left`/`Top`, the same shape the
/// Rekognition API uses, so attributes and events can carry it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            left,
            top,
        }
    }

    /// Center point `(left + width/2, top + height/2)`.
    pub fn center(&self) -> Point {
        Point {
            x: self.left + self.width / 2.0,
            y: self.top + self.height / 2.0,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// A point in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Configured region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Roi {
    Rect {
        x_min: f32,
        y_min: f32,
        x_max: f32,
        y_max: f32,
    },
    Polygon {
        polygon: Vec<[f32; 2]>,
    },
}

impl Roi {
    /// Checks the ROI is well formed: coordinates in [0,1], a non-empty
    /// rectangle, or a polygon with at least three vertices.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Rect {
                x_min,
                y_min,
                x_max,
                y_max,
            } => {
                for value in [x_min, y_min, x_max, y_max] {
                    if !(0.0..=1.0).contains(value) {
                        return Err(RekognitionError::Config(format!(
                            "roi coordinate {value} outside [0, 1]"
                        )));
                    }
                }
                if x_min >= x_max || y_min >= y_max {
                    return Err(RekognitionError::Config(
                        "roi minimum must be smaller than its maximum".into(),
                    ));
                }
            }
            Self::Polygon { polygon } => {
                if polygon.len() < 3 {
                    return Err(RekognitionError::Config(format!(
                        "roi polygon needs at least 3 points, got {}",
                        polygon.len()
                    )));
                }
                if polygon.iter().flatten().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err(RekognitionError::Config(
                        "roi polygon coordinate outside [0, 1]".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Outline vertices, in drawing order.
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Self::Rect {
                x_min,
                y_min,
                x_max,
                y_max,
            } => vec![
                Point::new(*x_min, *y_min),
                Point::new(*x_max, *y_min),
                Point::new(*x_max, *y_max),
                Point::new(*x_min, *y_max),
            ],
            Self::Polygon { polygon } => polygon.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
        }
    }

    /// Boundary-inclusive containment test.
    pub fn contains(&self, point: Point) -> bool {
        match self {
            Self::Rect {
                x_min,
                y_min,
                x_max,
                y_max,
            } => point.x >= *x_min && point.x <= *x_max && point.y >= *y_min && point.y <= *y_max,
            Self::Polygon { .. } => polygon_contains(&self.vertices(), point),
        }
    }
}

/// Whether the center of `bbox` lies inside `roi`. No ROI means everything counts.
pub fn in_roi(bbox: &BoundingBox, roi: Option<&Roi>) -> bool {
    match roi {
        None => true,
        Some(roi) => roi.contains(bbox.center()),
    }
}

fn polygon_contains(vertices: &[Point], point: Point) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    for i in 0..n {
        if on_segment(vertices[i], vertices[(i + 1) % n], point) {
            return true;
        }
    }

    // Even-odd ray casting towards +x.
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}
