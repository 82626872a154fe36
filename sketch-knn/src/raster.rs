//! Stroke rasterization
//!
//! Turns a free-hand drawing (an ordered list of poly-lines) into a square
//! grayscale image: the drawing is centred, uniformly scaled to fill the
//! canvas minus a padding margin, and rendered with anti-aliased lines of a
//! fixed pixel width.
//!
//! Intensities follow the training data convention: `1.0` is untouched
//! background and lower values are ink. Rows grow downward with input `y`.

use crate::core::unified_error::{errors, KnnResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// 8-bit channel depth the training images were produced with
const CHANNEL_MAX: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One continuous pen-down path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Vec<f64>, Vec<f64>)", into = "(Vec<f64>, Vec<f64>)")]
pub struct Stroke {
    pub points: Vec<Point>,
}

impl Stroke {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Builds a stroke from parallel coordinate lists; extra entries in the
    /// longer list are ignored.
    pub fn from_xy(xs: &[f64], ys: &[f64]) -> Self {
        Self {
            points: xs.iter().zip(ys).map(|(&x, &y)| Point { x, y }).collect(),
        }
    }

    /// Strokes with fewer than two points have no segments
    pub fn has_segments(&self) -> bool {
        self.points.len() >= 2
    }

    fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

impl From<(Vec<f64>, Vec<f64>)> for Stroke {
    fn from((xs, ys): (Vec<f64>, Vec<f64>)) -> Self {
        Stroke::from_xy(&xs, &ys)
    }
}

impl From<Stroke> for (Vec<f64>, Vec<f64>) {
    fn from(stroke: Stroke) -> Self {
        stroke.points.iter().map(|p| (p.x, p.y)).unzip()
    }
}

/// Parses a drawing in the QuickDraw simplified format, `[[[x..],[y..]], ...]`.
///
/// Strokes without segments are dropped.
pub fn strokes_from_quickdraw_json(json: &str) -> KnnResult<Vec<Stroke>> {
    let strokes: Vec<Stroke> =
        serde_json::from_str(json).map_err(|e| errors::invalid_json("<drawing>", e))?;
    Ok(strokes.into_iter().filter(Stroke::has_segments).collect())
}

/// Rasterization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Output edge length in pixels
    pub size: usize,
    /// Margin on each side, as a percentage of the longest bounding-box side
    pub padding_percent: f64,
    /// Ink line width in output pixels
    pub line_width: f64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            size: 28,
            padding_percent: 10.0,
            line_width: 3.0,
        }
    }
}

impl RasterConfig {
    pub fn validate(&self) -> KnnResult<()> {
        if self.size == 0 {
            return Err(errors::config_error("raster.size", "must be positive"));
        }
        if !(0.0..=50.0).contains(&self.padding_percent) {
            return Err(errors::config_error(
                "raster.padding_percent",
                format!("must lie in [0, 50], got {}", self.padding_percent),
            ));
        }
        if self.line_width.is_nan() || self.line_width <= 0.0 {
            return Err(errors::config_error(
                "raster.line_width",
                format!("must be positive, got {}", self.line_width),
            ));
        }
        Ok(())
    }

    /// Length of the flattened feature vector
    pub fn feature_len(&self) -> usize {
        self.size * self.size
    }
}

/// Square grid of intensities in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: Array2<f64>,
}

impl RasterImage {
    /// All-background image
    pub fn blank(size: usize) -> Self {
        Self {
            pixels: Array2::ones((size, size)),
        }
    }

    pub fn size(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn pixels(&self) -> &Array2<f64> {
        &self.pixels
    }

    /// Row-major flattening, the layout used for training vectors
    pub fn to_feature_vector(&self) -> Array1<f64> {
        self.pixels.iter().copied().collect()
    }

    /// Number of pixels carrying any ink
    pub fn ink_pixels(&self) -> usize {
        self.pixels.iter().filter(|&&v| v < 1.0).count()
    }
}

/// Rasterizes `strokes` onto a `size`×`size` canvas with the default line width.
///
/// `padding_percent` is clamped into `[0, 50]`. A drawing without any segment
/// yields a blank image.
pub fn rasterize(strokes: &[Stroke], size: usize, padding_percent: f64) -> RasterImage {
    let config = RasterConfig {
        size,
        padding_percent,
        ..RasterConfig::default()
    };
    rasterize_with(strokes, &config)
}

pub fn rasterize_with(strokes: &[Stroke], config: &RasterConfig) -> RasterImage {
    let size = config.size;
    let drawn: Vec<&Stroke> = strokes.iter().filter(|s| s.has_segments()).collect();
    let Some(bounds) = Bounds::of(&drawn) else {
        return RasterImage::blank(size);
    };

    let frame = Frame::fit(&bounds, config.padding_percent.clamp(0.0, 50.0), size);
    let half_width = config.line_width.max(f64::MIN_POSITIVE) / 2.0;

    // Coverage in [0, 1]; painting keeps the maximum so stroke order is irrelevant
    let mut coverage = Array2::<f64>::zeros((size, size));
    for stroke in drawn {
        for (a, b) in stroke.segments() {
            paint_segment(&mut coverage, frame.map(a), frame.map(b), half_width);
        }
    }

    let pixels = coverage.mapv(|c| {
        let level = ((1.0 - c) * CHANNEL_MAX).round();
        level / CHANNEL_MAX
    });
    RasterImage { pixels }
}

/// Axis-aligned bounding box of all drawn points
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Bounds {
    fn of(strokes: &[&Stroke]) -> Option<Bounds> {
        let mut points = strokes.iter().flat_map(|s| s.points.iter());
        let first = points.next()?;
        let init = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        Some(points.fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            min_y: b.min_y.min(p.y),
            max_x: b.max_x.max(p.x),
            max_y: b.max_y.max(p.y),
        }))
    }
}

/// Maps drawing coordinates onto canvas pixel coordinates
#[derive(Debug, Clone, Copy)]
struct Frame {
    origin_x: f64,
    origin_y: f64,
    scale: f64,
}

impl Frame {
    /// Square region of side `longest + 2 * pad` centred on the bounding box
    fn fit(bounds: &Bounds, padding_percent: f64, size: usize) -> Frame {
        let width = bounds.max_x - bounds.min_x;
        let height = bounds.max_y - bounds.min_y;
        let longest = width.max(height);
        let pad = longest * padding_percent / 100.0;
        let mut side = longest + 2.0 * pad;
        if side <= 0.0 {
            // every point coincides: draw a dot in the middle
            side = 1.0;
        }
        let center_x = (bounds.min_x + bounds.max_x) / 2.0;
        let center_y = (bounds.min_y + bounds.max_y) / 2.0;
        Frame {
            origin_x: center_x - side / 2.0,
            origin_y: center_y - side / 2.0,
            scale: size as f64 / side,
        }
    }

    fn map(&self, p: Point) -> Point {
        Point {
            x: (p.x - self.origin_x) * self.scale,
            y: (p.y - self.origin_y) * self.scale,
        }
    }
}

/// Marks pixels within `half_width` of segment `a`-`b` with a one pixel
/// linear falloff at the edge.
fn paint_segment(coverage: &mut Array2<f64>, a: Point, b: Point, half_width: f64) {
    let size = coverage.nrows();
    if size == 0 {
        return;
    }
    let reach = half_width + 1.0;
    let last = (size - 1) as f64;
    let col_lo = (a.x.min(b.x) - reach).floor().clamp(0.0, last) as usize;
    let col_hi = (a.x.max(b.x) + reach).ceil().clamp(0.0, last) as usize;
    let row_lo = (a.y.min(b.y) - reach).floor().clamp(0.0, last) as usize;
    let row_hi = (a.y.max(b.y) + reach).ceil().clamp(0.0, last) as usize;

    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            let center = Point {
                x: col as f64 + 0.5,
                y: row as f64 + 0.5,
            };
            let c = (half_width + 0.5 - distance_to_segment(center, a, b)).clamp(0.0, 1.0);
            let cell = &mut coverage[[row, col]];
            if c > *cell {
                *cell = c;
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = a.x + t * dx - p.x;
    let cy = a.y + t * dy - p.y;
    (cx * cx + cy * cy).sqrt()
}
