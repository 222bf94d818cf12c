pub mod backend;
pub mod document;
mod error;
pub mod fonts;
pub mod model;
pub mod render;
pub mod structure;

pub use backend::pdf::{PdfBackend, PdfMetadata};
pub use backend::{Backend, Size};
pub use document::{DocumentDefinition, Overrides};
pub use error::{Error, Result};
pub use fonts::FontBook;
pub use render::{RenderOptions, RenderOutcome, TagWarning, render, render_with};
pub use structure::StructureTree;

use std::path::Path;
use std::time::Instant;

use render::geometry::{PageHeight, compute_auto_height, resolve_margins, resolve_page_geometry};

/// Render a loaded definition to PDF bytes.
pub fn render_document(doc: &DocumentDefinition) -> Result<(Vec<u8>, RenderOutcome)> {
    render_document_with_progress(doc, None)
}

pub fn render_document_with_progress(
    doc: &DocumentDefinition,
    progress: Option<&mut dyn FnMut(f32)>,
) -> Result<(Vec<u8>, RenderOutcome)> {
    let fonts = doc.font_book()?;
    let geometry = resolve_page_geometry(&doc.page_size, doc.page_orientation)?;
    let margins = resolve_margins(&doc.page_margins)?;
    let size = match geometry.height {
        PageHeight::Fixed(height) => Size::new(geometry.width, height),
        PageHeight::Auto => {
            let height = compute_auto_height(&doc.pages, &margins);
            log::debug!("Auto page height resolved to {height:.1}pt");
            Size::new(geometry.width, height)
        }
    };

    let mut backend = PdfBackend::new(&fonts, size).with_metadata(PdfMetadata {
        title: doc.title.clone(),
        language: doc.language.clone(),
    });
    let options = RenderOptions { tagged: doc.tagged };
    let outcome = render_with(&doc.pages, backend.fonts(), &mut backend, options, progress)?;
    let bytes = backend.finish()?;
    Ok((bytes, outcome))
}

/// Load `input`, apply `overrides`, and write the PDF to `output`.
pub fn render_document_file(
    input: &Path,
    output: &Path,
    overrides: &Overrides,
) -> Result<RenderOutcome> {
    render_document_file_with_progress(input, output, overrides, None)
}

pub fn render_document_file_with_progress(
    input: &Path,
    output: &Path,
    overrides: &Overrides,
    progress: Option<&mut dyn FnMut(f32)>,
) -> Result<RenderOutcome> {
    let t0 = Instant::now();

    let mut doc = DocumentDefinition::load(input)?;
    doc.apply(overrides);
    let t_load = t0.elapsed();

    let (bytes, outcome) = render_document_with_progress(&doc, progress)?;
    let t_render = t0.elapsed();

    std::fs::write(output, &bytes).map_err(Error::Io)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, render={:.1}ms, write={:.1}ms, total={:.1}ms (output {} bytes, {} pages, {} tag warnings)",
        t_load.as_secs_f64() * 1000.0,
        (t_render - t_load).as_secs_f64() * 1000.0,
        (t_total - t_render).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        bytes.len(),
        outcome.pages_rendered,
        outcome.warnings.len(),
    );

    Ok(outcome)
}
