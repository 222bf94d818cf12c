//! The render pass: pages in order, items in order, text lines through the
//! structure engine, everything else through the primitive dispatcher.

pub mod geometry;
pub mod policy;
pub mod primitives;
pub mod tagging;
pub mod text;

use std::collections::HashMap;

use crate::backend::{Backend, TextRun};
use crate::error::{Error, Result};
use crate::fonts::FontBook;
use crate::model::{DrawableItem, Page, TextLine, Watermark};
use crate::structure::StructureTree;

pub use tagging::{StructureTagEngine, TagWarning};

#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    /// Build a structure tree and emit marked content.
    pub tagged: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { tagged: true }
    }
}

/// What a finished pass leaves behind besides the backend's output.
#[derive(Debug)]
pub struct RenderOutcome {
    /// `None` for untagged passes.
    pub structure: Option<StructureTree>,
    pub warnings: Vec<TagWarning>,
    pub pages_rendered: usize,
}

/// Render `pages` with tagging enabled.
pub fn render(
    pages: &[Page],
    fonts: &FontBook,
    backend: &mut dyn Backend,
    progress: Option<&mut dyn FnMut(f32)>,
) -> Result<RenderOutcome> {
    render_with(pages, fonts, backend, RenderOptions::default(), progress)
}

/// Render `pages` onto `backend`.
///
/// The backend must already be sized for the first page, and `fonts` must be
/// the book the backend encodes text with ([`crate::PdfBackend::fonts`]), since
/// font ids are only meaningful within one book. Deferred page
/// references are checked before anything is drawn; a fatal error later in the
/// pass leaves the backend holding partial output that must be discarded.
pub fn render_with(
    pages: &[Page],
    fonts: &FontBook,
    backend: &mut dyn Backend,
    options: RenderOptions,
    mut progress: Option<&mut dyn FnMut(f32)>,
) -> Result<RenderOutcome> {
    let anchors = collect_anchors(pages);
    validate_references(pages, &anchors)?;

    let mut session = RenderSession {
        fonts,
        anchors,
        engine: options.tagged.then(StructureTagEngine::new),
        clip_depth: 0,
    };

    let total: usize = if progress.is_some() {
        pages.iter().map(|p| p.items.len()).sum()
    } else {
        0
    };
    let mut rendered = 0usize;

    for (index, page) in pages.iter().enumerate() {
        if index > 0
            && let Some(orientation) = page.orientation
        {
            let current = backend.page_size();
            if current.orientation() != orientation {
                log::debug!("Page {}: switching to {orientation}", index + 1);
                backend.set_page_size(current.swapped());
            }
        }
        backend.add_page();

        for item in &page.items {
            session.render_item(item, backend)?;
            rendered += 1;
            if let Some(report) = progress.as_deref_mut() {
                report(rendered as f32 / total.max(1) as f32);
            }
        }

        backend.end_page();
        session.close_clips(index, backend);
        if let Some(watermark) = &page.watermark {
            session.draw_watermark(watermark, backend)?;
        }
    }

    let (structure, warnings) = match session.engine.take() {
        Some(engine) => {
            let (tree, warnings) = engine.finish(backend);
            (Some(tree), warnings)
        }
        None => (None, Vec::new()),
    };

    Ok(RenderOutcome {
        structure,
        warnings,
        pages_rendered: pages.len(),
    })
}

/// Node id → 1-based page number of its first line.
pub fn collect_anchors(pages: &[Page]) -> HashMap<String, usize> {
    let mut anchors = HashMap::new();
    for (index, page) in pages.iter().enumerate() {
        for item in &page.items {
            if let DrawableItem::Line(TextLine {
                anchor: Some(anchor),
                ..
            }) = item
            {
                anchors.entry(anchor.clone()).or_insert(index + 1);
            }
        }
    }
    anchors
}

fn validate_references(pages: &[Page], anchors: &HashMap<String, usize>) -> Result<()> {
    let references = pages
        .iter()
        .flat_map(|p| &p.items)
        .filter_map(|item| match item {
            DrawableItem::Line(line) => Some(line),
            _ => None,
        })
        .flat_map(|line| &line.inlines)
        .filter_map(|inline| inline.page_reference.as_ref());
    for target in references {
        if !anchors.contains_key(target) {
            return Err(Error::UnresolvedReference(target.clone()));
        }
    }
    Ok(())
}

/// State owned by one render pass.
struct RenderSession<'a> {
    fonts: &'a FontBook,
    anchors: HashMap<String, usize>,
    engine: Option<StructureTagEngine>,
    clip_depth: usize,
}

impl RenderSession<'_> {
    fn render_item(&mut self, item: &DrawableItem, backend: &mut dyn Backend) -> Result<()> {
        match item {
            DrawableItem::Line(line) => self.render_line(line, backend)?,
            DrawableItem::Vector(vector) => primitives::draw_vector(vector, backend)?,
            DrawableItem::Image(image) => primitives::draw_image(image, backend)?,
            DrawableItem::Svg(svg) => primitives::draw_svg(svg, self.fonts, backend)?,
            DrawableItem::BeginClip(clip) => {
                primitives::begin_clip(clip, backend);
                self.clip_depth += 1;
            }
            DrawableItem::EndClip => {
                if self.clip_depth == 0 {
                    log::warn!("endClip without a matching beginClip, ignoring");
                } else {
                    primitives::end_clip(backend);
                    self.clip_depth -= 1;
                }
            }
        }
        Ok(())
    }

    fn render_line(&mut self, line: &TextLine, backend: &mut dyn Backend) -> Result<()> {
        let boundary = match self.engine.as_mut() {
            Some(engine) => engine.begin_line(line, backend),
            None => None,
        };
        text::draw_line(line, self.fonts, &self.anchors, backend)?;
        if let (Some(engine), Some(boundary)) = (self.engine.as_mut(), boundary) {
            engine.end_line(line, boundary, backend);
        }
        Ok(())
    }

    fn close_clips(&mut self, page_index: usize, backend: &mut dyn Backend) {
        if self.clip_depth > 0 {
            log::warn!(
                "Page {}: {} clip regions left open, closing",
                page_index + 1,
                self.clip_depth
            );
            for _ in 0..self.clip_depth {
                primitives::end_clip(backend);
            }
            self.clip_depth = 0;
        }
    }

    /// Centered text rotated by `angle` degrees about the page center.
    fn draw_watermark(&self, watermark: &Watermark, backend: &mut dyn Backend) -> Result<()> {
        let font = self
            .fonts
            .lookup(&watermark.font, watermark.bold, watermark.italics)?;
        let size = backend.page_size();
        let (cx, cy) = (size.width / 2.0, size.height / 2.0);
        let (sin, cos) = watermark.angle.to_radians().sin_cos();

        let x = cx - watermark.rendered_size.width / 2.0;
        let y = cy - watermark.rendered_size.height / 2.0;
        let ascender = self.fonts.face(font).ascender_ratio() * watermark.font_size;

        backend.begin_artifact();
        backend.save_state();
        backend.transform([
            cos,
            sin,
            -sin,
            cos,
            cx - (cx * cos - cy * sin),
            cy - (cx * sin + cy * cos),
        ]);
        backend.draw_text(&TextRun {
            font,
            size: watermark.font_size,
            x,
            baseline: y + ascender,
            text: &watermark.text,
            color: watermark.color,
            opacity: watermark.opacity,
            char_spacing: 0.0,
        });
        backend.restore_state();
        backend.end_artifact();
        Ok(())
    }
}
