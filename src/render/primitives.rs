//! Drawing of everything that is not a text line.

use crate::backend::{Backend, DashPattern, Fill, GradientStop, Paint, PathData, Rect, Stroke, svg};
use crate::error::Result;
use crate::fonts::FontBook;
use crate::model::{ClipRect, Color, ImageItem, Shape, SvgItem, Vector};

/// Evenly spaced stops, `1 / (n - 1)` apart.
pub fn gradient_stops(colors: &[Color]) -> Vec<GradientStop> {
    let step = if colors.len() > 1 {
        1.0 / (colors.len() - 1) as f32
    } else {
        0.0
    };
    colors
        .iter()
        .enumerate()
        .map(|(i, &color)| GradientStop {
            offset: (i as f32 * step).min(1.0),
            color,
        })
        .collect()
}

/// Gradient axis of a shape: horizontal across ellipses and rectangles, along
/// the segment for lines, first to last point for polylines.
fn gradient_axis(shape: &Shape) -> Option<((f32, f32), (f32, f32))> {
    match shape {
        Shape::Ellipse { x, y, r1, .. } => Some(((x - r1, *y), (x + r1, *y))),
        Shape::Rect { x, y, w, .. } => Some(((*x, *y), (x + w, *y))),
        Shape::Line { x1, y1, x2, y2 } => Some(((*x1, *y1), (*x2, *y2))),
        Shape::Polyline { points, .. } => match (points.first(), points.last()) {
            (Some(a), Some(b)) => Some(((a.x, a.y), (b.x, b.y))),
            _ => None,
        },
        Shape::Path { .. } => None,
    }
}

fn shape_path(shape: &Shape) -> Result<PathData> {
    Ok(match shape {
        Shape::Ellipse { x, y, r1, r2 } => PathData::ellipse(*x, *y, *r1, *r2),
        Shape::Rect { x, y, w, h, r } if *r > 0.0 => PathData::rounded_rect(*x, *y, *w, *h, *r),
        Shape::Rect { x, y, w, h, .. } => PathData::rect(*x, *y, *w, *h),
        Shape::Line { x1, y1, x2, y2 } => {
            let mut path = PathData::new();
            path.move_to(*x1, *y1).line_to(*x2, *y2);
            path
        }
        Shape::Polyline { points, close_path } => {
            let closes = *close_path
                || (points.len() > 1 && points.first() == points.last());
            PathData::polyline(points, closes && points.len() > 1)
        }
        Shape::Path { d } => svg::parse_path_data(d)?,
    })
}

/// Fill and stroke for a vector: both when fill and line color are given,
/// fill only when just a fill is given, otherwise a stroke in the line color
/// or black. A gradient takes the place of the fill color.
pub fn vector_paint(vector: &Vector) -> (Option<Fill>, Option<Stroke>) {
    let gradient = vector.linear_gradient.as_ref().and_then(|colors| {
        match gradient_axis(&vector.shape) {
            Some((start, end)) if !colors.is_empty() => Some(Paint::LinearGradient {
                start,
                end,
                stops: gradient_stops(colors),
            }),
            Some(_) => None,
            None => {
                log::warn!("Linear gradient is not supported on path vectors, ignoring");
                None
            }
        }
    });
    let fill = gradient.or(vector.color.map(Paint::Solid)).map(|paint| Fill {
        paint,
        opacity: vector.fill_opacity.unwrap_or(1.0),
        even_odd: false,
    });

    let stroke_color = match (&fill, vector.line_color) {
        (Some(_), Some(line)) => Some(line),
        (Some(_), None) => None,
        (None, line) => Some(line.unwrap_or(Color::BLACK)),
    };
    let stroke = stroke_color.map(|color| Stroke {
        color,
        opacity: vector.stroke_opacity.unwrap_or(1.0),
        width: vector.line_width.unwrap_or(1.0),
        dash: vector.dash.map(|d| DashPattern {
            on: d.length,
            off: d.space.unwrap_or(d.length),
            phase: d.phase,
        }),
        join: vector.line_join.unwrap_or_default(),
        cap: vector.line_cap.unwrap_or_default(),
    });
    (fill, stroke)
}

pub(crate) fn draw_vector(vector: &Vector, backend: &mut dyn Backend) -> Result<()> {
    let path = shape_path(&vector.shape)?;
    let (fill, stroke) = vector_paint(vector);
    backend.draw_path(&path, fill.as_ref(), stroke.as_ref());
    Ok(())
}

pub(crate) fn draw_image(image: &ImageItem, backend: &mut dyn Backend) -> Result<()> {
    let rect = Rect::new(image.x, image.y, image.width, image.height);
    backend.draw_image(rect, &image.src, image.opacity.unwrap_or(1.0))?;
    if let Some(uri) = &image.link {
        backend.link_uri(rect, uri);
    } else if let Some(page) = image.link_to_page {
        backend.link_page(rect, page);
    }
    Ok(())
}

pub(crate) fn draw_svg(item: &SvgItem, fonts: &FontBook, backend: &mut dyn Backend) -> Result<()> {
    let resolver = |families: &[String], bold: bool, italic: bool| {
        fonts.resolve_css_font(families, bold, italic)
    };
    let rect = Rect::new(item.x, item.y, item.width, item.height);
    backend.draw_svg(rect, &item.svg, &resolver)
}

pub(crate) fn begin_clip(clip: &ClipRect, backend: &mut dyn Backend) {
    backend.save_state();
    backend.clip_rect(Rect::new(clip.x, clip.y, clip.width, clip.height));
}

pub(crate) fn end_clip(backend: &mut dyn Backend) {
    backend.restore_state();
}
