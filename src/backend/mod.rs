//! The drawing target the renderer talks to.
//!
//! All coordinates handed to a [`Backend`] are in document space: points, origin
//! at the top-left corner of the page, y growing downwards. Backends that use a
//! different convention (PDF) flip at page start.

pub mod pdf;
pub mod svg;

use std::path::PathBuf;

use crate::error::Result;
use crate::fonts::FontId;
use crate::model::{Color, LineCap, LineJoin, Orientation, Point};
use crate::structure::StructureTree;

/// Maps a CSS font-family list plus bold/italic to a font file.
pub type FontResolver<'a> = &'a (dyn Fn(&[String], bool, bool) -> Result<PathBuf> + Sync);

/// A marked-content span opened on the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Landscape when strictly wider than tall.
    pub fn orientation(self) -> Orientation {
        if self.width > self.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathOp {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CubicTo(f32, f32, f32, f32, f32, f32),
    Close,
}

// 4 * (sqrt(2) - 1) / 3
const KAPPA: f32 = 0.552_284_75;

/// A path in document space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathData {
    pub ops: Vec<PathOp>,
}

impl PathData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn move_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.ops.push(PathOp::MoveTo(x, y));
        self
    }

    pub fn line_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.ops.push(PathOp::LineTo(x, y));
        self
    }

    pub fn cubic_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) -> &mut Self {
        self.ops.push(PathOp::CubicTo(x1, y1, x2, y2, x3, y3));
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.ops.push(PathOp::Close);
        self
    }

    pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        let mut p = Self::new();
        p.move_to(x, y)
            .line_to(x + w, y)
            .line_to(x + w, y + h)
            .line_to(x, y + h)
            .close();
        p
    }

    /// Rectangle with quarter-ellipse corners. `r` is clamped to half the
    /// shorter side; zero gives a plain rectangle.
    pub fn rounded_rect(x: f32, y: f32, w: f32, h: f32, r: f32) -> Self {
        let r = r.min(0.5 * w).min(0.5 * h).max(0.0);
        if r == 0.0 {
            return Self::rect(x, y, w, h);
        }
        let c = r * (1.0 - KAPPA);
        let mut p = Self::new();
        p.move_to(x + r, y)
            .line_to(x + w - r, y)
            .cubic_to(x + w - c, y, x + w, y + c, x + w, y + r)
            .line_to(x + w, y + h - r)
            .cubic_to(x + w, y + h - c, x + w - c, y + h, x + w - r, y + h)
            .line_to(x + r, y + h)
            .cubic_to(x + c, y + h, x, y + h - c, x, y + h - r)
            .line_to(x, y + r)
            .cubic_to(x, y + c, x + c, y, x + r, y)
            .close();
        p
    }

    /// Ellipse centered at (`cx`, `cy`) built from four Bézier arcs.
    pub fn ellipse(cx: f32, cy: f32, rx: f32, ry: f32) -> Self {
        let (x, y) = (cx - rx, cy - ry);
        let (ox, oy) = (rx * KAPPA, ry * KAPPA);
        let (xe, ye) = (x + rx * 2.0, y + ry * 2.0);
        let mut p = Self::new();
        p.move_to(x, cy)
            .cubic_to(x, cy - oy, cx - ox, y, cx, y)
            .cubic_to(cx + ox, y, xe, cy - oy, xe, cy)
            .cubic_to(xe, cy + oy, cx + ox, ye, cx, ye)
            .cubic_to(cx - ox, ye, x, cy + oy, x, cy)
            .close();
        p
    }

    pub fn polyline(points: &[Point], close: bool) -> Self {
        let mut p = Self::new();
        let mut iter = points.iter();
        if let Some(first) = iter.next() {
            p.move_to(first.x, first.y);
            for pt in iter {
                p.line_to(pt.x, pt.y);
            }
            if close {
                p.close();
            }
        }
        p
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// Axial gradient between two points in document space.
    LinearGradient {
        start: (f32, f32),
        end: (f32, f32),
        stops: Vec<GradientStop>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub paint: Paint,
    pub opacity: f32,
    pub even_odd: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DashPattern {
    pub on: f32,
    pub off: f32,
    pub phase: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub opacity: f32,
    pub width: f32,
    pub dash: Option<DashPattern>,
    pub join: LineJoin,
    pub cap: LineCap,
}

impl Stroke {
    pub fn solid(color: Color, width: f32) -> Self {
        Self {
            color,
            opacity: 1.0,
            width,
            dash: None,
            join: LineJoin::default(),
            cap: LineCap::default(),
        }
    }
}

/// One run of same-styled text placed at an explicit baseline.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun<'a> {
    pub font: FontId,
    pub size: f32,
    pub x: f32,
    pub baseline: f32,
    pub text: &'a str,
    pub color: Color,
    pub opacity: f32,
    pub char_spacing: f32,
}

/// A stateful drawing target with page lifecycle and tagged-content support.
pub trait Backend {
    /// Size the current page has, or the next page will get.
    fn page_size(&self) -> Size;
    /// Change the size used by the next [`Backend::add_page`].
    fn set_page_size(&mut self, size: Size);
    fn add_page(&mut self);
    /// Called once a page's items are drawn, before its trailing clip
    /// restores and the watermark.
    fn end_page(&mut self) {}
    fn page_count(&self) -> usize;

    fn save_state(&mut self);
    fn restore_state(&mut self);
    /// Concatenate `[a b c d e f]` onto the current transform.
    fn transform(&mut self, matrix: [f32; 6]);
    /// Intersect the clip region with `rect`.
    fn clip_rect(&mut self, rect: Rect);

    /// Paint `path`. With both set the path is filled, then stroked.
    fn draw_path(&mut self, path: &PathData, fill: Option<&Fill>, stroke: Option<&Stroke>);
    fn draw_text(&mut self, run: &TextRun<'_>);
    /// Blit an image file or `data:` URI into `rect`.
    fn draw_image(&mut self, rect: Rect, src: &str, opacity: f32) -> Result<()>;
    fn draw_svg(&mut self, rect: Rect, svg: &str, fonts: FontResolver<'_>) -> Result<()>;

    fn link_uri(&mut self, rect: Rect, uri: &str);
    /// Internal jump to a 1-based page number.
    fn link_page(&mut self, rect: Rect, page: usize);

    fn begin_span(&mut self, tag: &str) -> SpanId;
    fn end_span(&mut self, span: SpanId);
    /// Mark following drawing as page decoration outside the structure tree.
    fn begin_artifact(&mut self) {}
    fn end_artifact(&mut self) {}
    /// Hand over the finished structure tree. Called once, after the last page.
    fn finish_structure(&mut self, tree: &StructureTree);
}
