use std::path::{Path, PathBuf};

use laidout_pdf::backend::{Backend, Rect};
use laidout_pdf::{Error, FontBook, PdfBackend, Result};

fn fixture_font() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts/Tuffy.ttf")
}

/// A book with one file-backed family, regular style only.
fn book_with_myfont() -> FontBook {
    let mut fonts = FontBook::new();
    fonts
        .register_file("MyFont", false, false, &fixture_font())
        .expect("fixture font registers");
    fonts
}

fn families(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn first_known_family_wins_case_insensitively() {
    let _ = env_logger::try_init();
    let fonts = book_with_myfont();

    let path = fonts
        .resolve_css_font(&families(&["'Nope'", "myfont"]), false, false)
        .expect("myfont resolves");
    assert_eq!(path, fixture_font());

    let quoted = fonts
        .resolve_css_font(&families(&["\"MYFONT\""]), false, false)
        .expect("quoted family resolves");
    assert_eq!(quoted, fixture_font());
}

#[test]
fn unknown_families_fall_back_to_default() {
    let _ = env_logger::try_init();
    let mut fonts = book_with_myfont();
    fonts.set_default_family("MyFont");

    let path = fonts
        .resolve_css_font(&families(&["Nope", "serif"]), false, false)
        .expect("default family resolves");
    assert_eq!(path, fixture_font());
}

#[test]
fn missing_style_is_an_error() {
    let _ = env_logger::try_init();
    let fonts = book_with_myfont();

    let result = fonts.resolve_css_font(&families(&["MyFont"]), true, false);
    assert!(matches!(
        result,
        Err(Error::FontResolution { ref family, bold: true, italic: false }) if family == "MyFont"
    ));
}

#[test]
fn builtin_default_has_no_file() {
    let _ = env_logger::try_init();
    let fonts = book_with_myfont();

    // Helvetica is the default but has no file usvg could load.
    let result = fonts.resolve_css_font(&families(&["Nope"]), false, false);
    assert!(matches!(
        result,
        Err(Error::FontResolution { ref family, .. }) if family == "Helvetica"
    ));
}

#[test]
fn svg_text_loads_resolved_font() {
    let _ = env_logger::try_init();
    let fonts = book_with_myfont();
    let resolver = |families: &[String], bold: bool, italic: bool| -> Result<PathBuf> {
        fonts.resolve_css_font(families, bold, italic)
    };
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="40">
        <text x="0" y="20" font-family="MyFont" font-size="16">Hi</text>
    </svg>"#;

    let mut backend = PdfBackend::new(&fonts, laidout_pdf::Size::new(200.0, 200.0));
    backend.add_page();
    backend
        .draw_svg(Rect::new(10.0, 10.0, 100.0, 40.0), svg, &resolver)
        .expect("svg with a registered family draws");

    let bytes = backend.finish().expect("finish");
    assert!(bytes.starts_with(b"%PDF-"));
}

#[test]
fn svg_text_with_unresolvable_font_fails() {
    let _ = env_logger::try_init();
    let fonts = book_with_myfont();
    let resolver = |families: &[String], bold: bool, italic: bool| -> Result<PathBuf> {
        fonts.resolve_css_font(families, bold, italic)
    };
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="40">
        <text x="0" y="20" font-family="Nope" font-weight="bold" font-size="16">Hi</text>
    </svg>"#;

    let mut backend = PdfBackend::new(&fonts, laidout_pdf::Size::new(200.0, 200.0));
    backend.add_page();
    let result = backend.draw_svg(Rect::new(10.0, 10.0, 100.0, 40.0), svg, &resolver);
    assert!(matches!(result, Err(Error::FontResolution { .. })));
}

#[test]
fn backend_exposes_the_book_it_encodes_with() {
    let fonts = book_with_myfont();
    let backend = PdfBackend::new(&fonts, laidout_pdf::Size::new(100.0, 100.0));
    assert!(std::ptr::eq(backend.fonts(), &fonts));
}
