//! Text line drawing, including deferred page-number substitution.

use std::collections::HashMap;

use crate::backend::{Backend, Fill, Paint, PathData, Rect, Stroke, TextRun};
use crate::error::{Error, Result};
use crate::fonts::{FontBook, FontId};
use crate::model::{Alignment, Color, Decoration, Inline, TextLine, VertAlign};

const SUPERSCRIPT_SHIFT: f32 = -0.75;
const SUBSCRIPT_SHIFT: f32 = 0.35;

/// Horizontal correction keeping an inline's alignment anchor in place when its
/// width changes from `old_width` to `new_width`.
pub fn alignment_shift(alignment: Alignment, old_width: f32, new_width: f32) -> f32 {
    let delta = old_width - new_width;
    match alignment {
        Alignment::Right => delta,
        Alignment::Center => delta / 2.0,
        Alignment::Left | Alignment::Justify => 0.0,
    }
}

/// A page reference replaced by the referenced node's page number.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedReference {
    pub text: String,
    pub width: f32,
    /// Added to the inline's x.
    pub shift: f32,
}

/// Resolve the inline's deferred page reference, if it has one.
pub fn resolve_reference(
    inline: &Inline,
    font: FontId,
    fonts: &FontBook,
    anchors: &HashMap<String, usize>,
) -> Result<Option<ResolvedReference>> {
    let Some(target) = &inline.page_reference else {
        return Ok(None);
    };
    let page = anchors
        .get(target)
        .ok_or_else(|| Error::UnresolvedReference(target.clone()))?;
    let text = page.to_string();
    let width = fonts.measure(font, &text, inline.font_size, inline.character_spacing);
    let shift = alignment_shift(inline.alignment, inline.width, width);
    Ok(Some(ResolvedReference { text, width, shift }))
}

struct Placed<'a> {
    inline: &'a Inline,
    font: FontId,
    text: std::borrow::Cow<'a, str>,
    x: f32,
    width: f32,
}

/// Draw every inline of `line`: backgrounds first, then text and links, then
/// decorations grouped over consecutive inlines.
pub(crate) fn draw_line(
    line: &TextLine,
    fonts: &FontBook,
    anchors: &HashMap<String, usize>,
    backend: &mut dyn Backend,
) -> Result<()> {
    let mut placed = Vec::with_capacity(line.inlines.len());
    for inline in &line.inlines {
        let font = fonts.lookup(&inline.font, inline.bold, inline.italics)?;
        let x = line.x + inline.x;
        let p = match resolve_reference(inline, font, fonts, anchors)? {
            Some(resolved) => Placed {
                inline,
                font,
                text: resolved.text.into(),
                x: x + resolved.shift,
                width: resolved.width,
            },
            None => Placed {
                inline,
                font,
                text: inline.text.as_str().into(),
                x,
                width: inline.width,
            },
        };
        placed.push(p);
    }

    for p in &placed {
        if let Some(background) = p.inline.background {
            let fill = Fill {
                paint: Paint::Solid(background),
                opacity: 1.0,
                even_odd: false,
            };
            let band = PathData::rect(p.x, line.y, p.width, line.height);
            backend.draw_path(&band, Some(&fill), None);
        }
    }

    let descent = line.height - line.ascender_height;
    for p in &placed {
        let inline = p.inline;
        let size = inline.font_size;
        let ascender = fonts.face(p.font).ascender_ratio() * size;
        let mut top = line.y + (line.height - ascender - descent);
        match inline.vertical_align {
            VertAlign::Superscript => top += SUPERSCRIPT_SHIFT * size,
            VertAlign::Subscript => top += SUBSCRIPT_SHIFT * size,
            VertAlign::Baseline => {}
        }

        backend.draw_text(&TextRun {
            font: p.font,
            size,
            x: p.x,
            baseline: top + ascender,
            text: &p.text,
            color: inline.color.unwrap_or(Color::BLACK),
            opacity: inline.opacity.unwrap_or(1.0),
            char_spacing: inline.character_spacing,
        });

        let area = Rect::new(p.x, line.y, p.width, line.height);
        if let Some(uri) = &inline.link {
            backend.link_uri(area, uri);
        } else if let Some(page) = inline.link_to_page {
            backend.link_page(area, page);
        }
    }

    draw_decorations(line, &placed, fonts, backend);
    Ok(())
}

fn draw_decorations(
    line: &TextLine,
    placed: &[Placed<'_>],
    fonts: &FontBook,
    backend: &mut dyn Backend,
) {
    let decoration_of = |p: &Placed<'_>| {
        p.inline.decoration.map(|d| {
            let color = p
                .inline
                .decoration_color
                .or(p.inline.color)
                .unwrap_or(Color::BLACK);
            (d, color)
        })
    };

    let mut i = 0;
    while i < placed.len() {
        let Some(key) = decoration_of(&placed[i]) else {
            i += 1;
            continue;
        };
        let mut end = i + 1;
        while end < placed.len() && decoration_of(&placed[end]) == Some(key) {
            end += 1;
        }
        let group = &placed[i..end];
        draw_decoration(line, group, key, fonts, backend);
        i = end;
    }
}

fn draw_decoration(
    line: &TextLine,
    group: &[Placed<'_>],
    (decoration, color): (Decoration, Color),
    fonts: &FontBook,
    backend: &mut dyn Backend,
) {
    let Some(biggest) = group
        .iter()
        .max_by(|a, b| a.inline.font_size.total_cmp(&b.inline.font_size))
    else {
        return;
    };
    let size = biggest.inline.font_size;
    let face = fonts.face(biggest.font);
    let ascent = face.ascender_ratio() * size;
    let descent = face.line_height(size) - ascent;
    let line_ascent = line.ascender_height;

    let first = &group[0];
    let last = &group[group.len() - 1];
    let width = last.x + last.width - first.x;
    let y = line.y
        + match decoration {
            Decoration::Underline => line_ascent + descent * 0.45,
            Decoration::Overline => line_ascent - ascent * 0.85,
            Decoration::LineThrough => line_ascent - ascent * 0.25,
        };
    let line_width = 0.5 + ((size - 8.0).max(0.0) / 2.0).floor() * 0.12;

    let mut path = PathData::new();
    path.move_to(first.x, y).line_to(first.x + width, y);
    backend.draw_path(&path, None, Some(&Stroke::solid(color, line_width)));
}
