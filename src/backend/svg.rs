//! SVG embedding through usvg.
//!
//! The parsed tree is replayed onto any [`Backend`] as paths, so SVG content
//! goes through the same fill/stroke/transform machinery as vector items.
//! Text is flattened to outlines by usvg; fonts are located through the
//! caller's [`FontResolver`].

use std::sync::{Arc, Mutex};

use usvg::fontdb;
use usvg::tiny_skia_path::{PathSegment, Transform};

use super::{Backend, DashPattern, Fill, FontResolver, GradientStop, Paint, PathData, Rect, Stroke};
use crate::error::{Error, Result};
use crate::model::{Color, LineCap, LineJoin};

/// Parse an SVG document. Font lookups for `<text>` go through `fonts`; the
/// first resolution failure aborts the parse.
pub fn parse_svg(svg: &str, fonts: FontResolver<'_>) -> Result<usvg::Tree> {
    let failure: Mutex<Option<Error>> = Mutex::new(None);

    let mut opts = usvg::Options::default();
    opts.font_resolver = usvg::FontResolver {
        select_font: Box::new(|font, db| {
            let families: Vec<String> = font.families().iter().map(family_name).collect();
            let bold = font.weight() >= 600;
            let italic = !matches!(font.style(), usvg::FontStyle::Normal);
            match fonts(&families, bold, italic) {
                Ok(path) => load_face(db, path),
                Err(e) => {
                    if let Ok(mut slot) = failure.lock() {
                        slot.get_or_insert(e);
                    }
                    None
                }
            }
        }),
        select_fallback: Box::new(|_, _, _| None),
    };

    let parsed = usvg::Tree::from_str(svg, &opts);
    drop(opts);
    if let Some(err) = failure.into_inner().ok().flatten() {
        return Err(err);
    }
    parsed.map_err(|e| Error::Svg(e.to_string()))
}

fn family_name(family: &usvg::FontFamily) -> String {
    match family {
        usvg::FontFamily::Serif => "serif".to_string(),
        usvg::FontFamily::SansSerif => "sans-serif".to_string(),
        usvg::FontFamily::Cursive => "cursive".to_string(),
        usvg::FontFamily::Fantasy => "fantasy".to_string(),
        usvg::FontFamily::Monospace => "monospace".to_string(),
        usvg::FontFamily::Named(name) => name.clone(),
    }
}

fn load_face(db: &mut Arc<fontdb::Database>, path: std::path::PathBuf) -> Option<fontdb::ID> {
    let known = db
        .faces()
        .find(|face| matches!(&face.source, fontdb::Source::File(p) if *p == path))
        .map(|face| face.id);
    if known.is_some() {
        return known;
    }
    let ids = Arc::make_mut(db).load_font_source(fontdb::Source::File(path));
    ids.first().copied()
}

/// Convert SVG path data (`d` attribute) into a document-space path.
pub fn parse_path_data(d: &str) -> Result<PathData> {
    let escaped = d
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;");
    let doc = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"><path d="{escaped}"/></svg>"#
    );
    let tree = usvg::Tree::from_str(&doc, &usvg::Options::default())
        .map_err(|e| Error::Svg(format!("path data {d:?}: {e}")))?;

    let mut out = PathData::new();
    collect_paths(tree.root(), Transform::identity(), &mut out);
    Ok(out)
}

fn collect_paths(group: &usvg::Group, ts: Transform, out: &mut PathData) {
    let ts = ts.pre_concat(group.transform());
    for child in group.children() {
        match child {
            usvg::Node::Group(g) => collect_paths(g, ts, out),
            usvg::Node::Path(p) => append_segments(p.data(), ts, out),
            usvg::Node::Image(_) | usvg::Node::Text(_) => {}
        }
    }
}

fn append_segments(path: &usvg::tiny_skia_path::Path, ts: Transform, out: &mut PathData) {
    // Quadratics are raised to cubics, PDF has no quad operator
    fn calc(n1: f32, n2: f32) -> f32 {
        (n1 + n2 * 2.0) / 3.0
    }
    let map = |mut p: usvg::tiny_skia_path::Point| {
        ts.map_point(&mut p);
        p
    };

    let mut prev = None;
    for segment in path.segments() {
        match segment {
            PathSegment::MoveTo(p) => {
                let p = map(p);
                out.move_to(p.x, p.y);
                prev = Some(p);
            }
            PathSegment::LineTo(p) => {
                let p = map(p);
                out.line_to(p.x, p.y);
                prev = Some(p);
            }
            PathSegment::QuadTo(p1, p2) => {
                let (p1, p2) = (map(p1), map(p2));
                let start = prev.unwrap_or(p1);
                out.cubic_to(
                    calc(start.x, p1.x),
                    calc(start.y, p1.y),
                    calc(p2.x, p1.x),
                    calc(p2.y, p1.y),
                    p2.x,
                    p2.y,
                );
                prev = Some(p2);
            }
            PathSegment::CubicTo(p1, p2, p3) => {
                let (p1, p2, p3) = (map(p1), map(p2), map(p3));
                out.cubic_to(p1.x, p1.y, p2.x, p2.y, p3.x, p3.y);
                prev = Some(p3);
            }
            PathSegment::Close => {
                out.close();
            }
        }
    }
}

/// Draw `tree` scaled into `rect`.
pub fn render_tree(tree: &usvg::Tree, rect: Rect, backend: &mut (impl Backend + ?Sized)) {
    let size = tree.size();
    let sx = if size.width() > 0.0 { rect.width / size.width() } else { 1.0 };
    let sy = if size.height() > 0.0 { rect.height / size.height() } else { 1.0 };

    backend.save_state();
    backend.clip_rect(rect);
    backend.transform([sx, 0.0, 0.0, sy, rect.x, rect.y]);
    render_group(tree.root(), 1.0, backend);
    backend.restore_state();
}

fn render_group(group: &usvg::Group, opacity: f32, backend: &mut (impl Backend + ?Sized)) {
    if group.clip_path().is_some() || group.mask().is_some() {
        log::debug!("SVG group {:?}: clip paths and masks are not rendered", group.id());
    }
    let opacity = opacity * group.opacity().get();

    backend.save_state();
    backend.transform(convert_transform(group.transform()));
    for child in group.children() {
        match child {
            usvg::Node::Group(g) => render_group(g, opacity, backend),
            usvg::Node::Path(p) => render_path(p, opacity, backend),
            usvg::Node::Text(t) => render_group(t.flattened(), opacity, backend),
            usvg::Node::Image(_) => log::debug!("Skipping raster image nested in SVG"),
        }
    }
    backend.restore_state();
}

fn render_path(path: &usvg::Path, opacity: f32, backend: &mut (impl Backend + ?Sized)) {
    if !path.is_visible() {
        return;
    }
    let mut data = PathData::new();
    append_segments(path.data(), Transform::identity(), &mut data);
    if data.is_empty() {
        return;
    }

    let fill = path.fill().and_then(|f| {
        convert_paint(f.paint()).map(|paint| Fill {
            paint,
            opacity: f.opacity().get() * opacity,
            even_odd: matches!(f.rule(), usvg::FillRule::EvenOdd),
        })
    });
    let stroke = path.stroke().and_then(|s| {
        let color = match convert_paint(s.paint())? {
            Paint::Solid(c) => c,
            Paint::LinearGradient { stops, .. } => stops.first().map(|s| s.color)?,
        };
        let dash = s.dasharray().and_then(|arr| match arr {
            [on, off, ..] => Some(DashPattern {
                on: *on,
                off: *off,
                phase: s.dashoffset(),
            }),
            [on] => Some(DashPattern {
                on: *on,
                off: *on,
                phase: s.dashoffset(),
            }),
            [] => None,
        });
        Some(Stroke {
            color,
            opacity: s.opacity().get() * opacity,
            width: s.width().get(),
            dash,
            join: match s.linejoin() {
                usvg::LineJoin::Round => LineJoin::Round,
                usvg::LineJoin::Bevel => LineJoin::Bevel,
                usvg::LineJoin::Miter | usvg::LineJoin::MiterClip => LineJoin::Miter,
            },
            cap: match s.linecap() {
                usvg::LineCap::Butt => LineCap::Butt,
                usvg::LineCap::Round => LineCap::Round,
                usvg::LineCap::Square => LineCap::Square,
            },
        })
    });

    match path.paint_order() {
        usvg::PaintOrder::FillAndStroke => backend.draw_path(&data, fill.as_ref(), stroke.as_ref()),
        usvg::PaintOrder::StrokeAndFill => {
            backend.draw_path(&data, None, stroke.as_ref());
            backend.draw_path(&data, fill.as_ref(), None);
        }
    }
}

fn convert_color(c: usvg::Color) -> Color {
    Color([c.red, c.green, c.blue])
}

fn convert_paint(paint: &usvg::Paint) -> Option<Paint> {
    match paint {
        usvg::Paint::Color(c) => Some(Paint::Solid(convert_color(*c))),
        usvg::Paint::LinearGradient(lg) => {
            let ts = lg.transform();
            let mut start = usvg::tiny_skia_path::Point::from_xy(lg.x1(), lg.y1());
            let mut end = usvg::tiny_skia_path::Point::from_xy(lg.x2(), lg.y2());
            ts.map_point(&mut start);
            ts.map_point(&mut end);
            let stops = lg
                .stops()
                .iter()
                .map(|s| GradientStop {
                    offset: s.offset().get(),
                    color: convert_color(s.color()),
                })
                .collect();
            Some(Paint::LinearGradient {
                start: (start.x, start.y),
                end: (end.x, end.y),
                stops,
            })
        }
        usvg::Paint::RadialGradient(rg) => {
            log::debug!("Radial gradient {:?} drawn with its first stop color", rg.id());
            rg.stops()
                .first()
                .map(|s| Paint::Solid(convert_color(s.color())))
        }
        usvg::Paint::Pattern(p) => {
            log::debug!("Pattern {:?} is not supported, skipping paint", p.id());
            None
        }
    }
}

fn convert_transform(ts: Transform) -> [f32; 6] {
    [ts.sx, ts.ky, ts.kx, ts.sy, ts.tx, ts.ty]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PathOp;

    #[test]
    fn path_data_keeps_absolute_coordinates() {
        let path = parse_path_data("M 10 20 L 30 20 L 30 40 Z").unwrap();
        assert_eq!(path.ops[0], PathOp::MoveTo(10.0, 20.0));
        assert_eq!(path.ops[1], PathOp::LineTo(30.0, 20.0));
        assert_eq!(path.ops[2], PathOp::LineTo(30.0, 40.0));
        assert!(path.ops.contains(&PathOp::Close));
    }

    #[test]
    fn quadratic_becomes_cubic() {
        let path = parse_path_data("M 0 0 Q 10 10 20 0").unwrap();
        assert!(matches!(path.ops[1], PathOp::CubicTo(_, _, _, _, x, y) if x == 20.0 && y == 0.0));
    }

    #[test]
    fn svg_text_with_unknown_font_fails() {
        let resolver = |families: &[String], bold: bool, italic: bool| -> Result<std::path::PathBuf> {
            Err(Error::FontResolution {
                family: families.first().cloned().unwrap_or_default(),
                bold,
                italic,
            })
        };
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="20">
            <text x="0" y="15" font-family="Nope" font-weight="bold">Hi</text></svg>"#;
        let Err(err) = parse_svg(svg, &resolver) else {
            panic!("expected font resolution to fail");
        };
        assert!(matches!(err, Error::FontResolution { bold: true, .. }));
    }
}
