//! The JSON document definition handed over by layout, and the option layering
//! applied on top of it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::fonts::{FamilyFiles, FontBook, font_dirs_from_env};
use crate::model::{DrawableItem, HeightSpec, MarginSpec, Orientation, Page, PageSizeSpec};

fn default_tagged() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDefinition {
    #[serde(default)]
    pub page_size: PageSizeSpec,
    #[serde(default)]
    pub page_orientation: Orientation,
    #[serde(default)]
    pub page_margins: MarginSpec,
    /// Family name → per-style font files.
    #[serde(default)]
    pub fonts: BTreeMap<String, FamilyFiles>,
    #[serde(default)]
    pub default_font: Option<String>,
    #[serde(default)]
    pub font_dirs: Vec<PathBuf>,
    #[serde(default = "default_tagged")]
    pub tagged: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

/// Settings given on the command line; each one set replaces the document's.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub page_size: Option<PageSizeSpec>,
    pub orientation: Option<Orientation>,
    pub margins: Option<MarginSpec>,
    pub tagged: Option<bool>,
    pub default_font: Option<String>,
    /// Added to the document's font directories.
    pub font_dirs: Vec<PathBuf>,
}

impl DocumentDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a definition from disk. Relative font and image paths are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
        })?;
        let mut doc = Self::from_json(&json)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            doc.resolve_paths(base);
        }
        Ok(doc)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for files in self.fonts.values_mut() {
            for path in [
                &mut files.normal,
                &mut files.bold,
                &mut files.italics,
                &mut files.bolditalics,
            ]
            .into_iter()
            .flatten()
            {
                rebase(path);
            }
        }
        self.font_dirs.iter_mut().for_each(rebase);

        for item in self.pages.iter_mut().flat_map(|p| p.items.iter_mut()) {
            if let DrawableItem::Image(image) = item
                && !image.src.starts_with("data:")
                && Path::new(&image.src).is_relative()
            {
                image.src = base.join(&image.src).to_string_lossy().into_owned();
            }
        }
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(size) = &overrides.page_size {
            self.page_size = size.clone();
        }
        if let Some(orientation) = overrides.orientation {
            self.page_orientation = orientation;
        }
        if let Some(margins) = &overrides.margins {
            self.page_margins = margins.clone();
        }
        if let Some(tagged) = overrides.tagged {
            self.tagged = tagged;
        }
        if let Some(font) = &overrides.default_font {
            self.default_font = Some(font.clone());
        }
        self.font_dirs.extend(overrides.font_dirs.iter().cloned());
    }

    /// Fonts for this document: configured families first, then whatever the
    /// font directories and `LAIDOUT_FONT_DIRS` provide.
    pub fn font_book(&self) -> Result<FontBook> {
        let mut book = FontBook::new();
        for (family, files) in &self.fonts {
            book.register_family(family, files)?;
        }
        let mut dirs = self.font_dirs.clone();
        dirs.extend(font_dirs_from_env());
        if !dirs.is_empty() {
            book.scan_dirs(&dirs);
        }
        if let Some(family) = &self.default_font {
            book.set_default_family(family);
        }
        Ok(book)
    }
}

/// Parse a command-line page size: a name (`A4`), or `WIDTHxHEIGHT` in points
/// where the height may be `auto`.
pub fn parse_page_size(value: &str) -> Result<PageSizeSpec> {
    let Some((w, h)) = value.split_once(['x', 'X']) else {
        return Ok(PageSizeSpec::Named(value.to_string()));
    };
    let width: f32 = w
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid page width in {value:?}")))?;
    let height = match h.trim() {
        auto if auto.eq_ignore_ascii_case("auto") => HeightSpec::Keyword("auto".to_string()),
        points => HeightSpec::Points(
            points
                .parse()
                .map_err(|_| Error::Config(format!("invalid page height in {value:?}")))?,
        ),
    };
    Ok(PageSizeSpec::Explicit { width, height })
}

/// Parse command-line margins: `40`, `40,20` or `10,20,30,40`.
pub fn parse_margins(value: &str) -> Result<MarginSpec> {
    let values: Vec<f32> = value
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Config(format!("invalid margins {value:?}")))?;
    match values.as_slice() {
        [single] => Ok(MarginSpec::Uniform(*single)),
        _ => Ok(MarginSpec::Sides(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagToken;

    #[test]
    fn minimal_definition_uses_defaults() {
        let doc = DocumentDefinition::from_json(r#"{ "pages": [] }"#).unwrap();
        assert!(doc.tagged);
        assert_eq!(doc.page_orientation, Orientation::Portrait);
        assert!(matches!(doc.page_size, PageSizeSpec::Named(ref n) if n == "A4"));
        assert!(matches!(doc.page_margins, MarginSpec::Uniform(m) if m == 40.0));
    }

    #[test]
    fn tag_tokens_parse_from_mixed_list() {
        let doc = DocumentDefinition::from_json(
            r#"{ "pages": [{ "items": [{ "type": "line", "item": {
                "x": 0, "y": 0, "height": 12, "ascenderHeight": 9,
                "tags": ["Table", "/TR", "", { "onetime": 2 }, 7],
                "startsNode": true, "endsNode": true
            }}]}]}"#,
        )
        .unwrap();
        let DrawableItem::Line(line) = &doc.pages[0].items[0] else {
            panic!("expected a line");
        };
        assert_eq!(
            line.tags,
            vec![
                TagToken::Open("Table".into()),
                TagToken::Close("TR".into()),
                TagToken::OnetimePop(2),
            ]
        );
    }

    #[test]
    fn overrides_replace_document_settings() {
        let mut doc = DocumentDefinition::from_json(r#"{ "pageOrientation": "portrait", "tagged": true }"#).unwrap();
        doc.apply(&Overrides {
            orientation: Some(Orientation::Landscape),
            tagged: Some(false),
            ..Default::default()
        });
        assert_eq!(doc.page_orientation, Orientation::Landscape);
        assert!(!doc.tagged);
    }

    #[test]
    fn cli_page_size_forms() {
        assert!(matches!(parse_page_size("Letter").unwrap(), PageSizeSpec::Named(n) if n == "Letter"));
        assert!(matches!(
            parse_page_size("300xauto").unwrap(),
            PageSizeSpec::Explicit { width, height: HeightSpec::Keyword(_) } if width == 300.0
        ));
        assert!(parse_page_size("abcx100").is_err());
        assert!(matches!(parse_margins("10,20").unwrap(), MarginSpec::Sides(v) if v == vec![10.0, 20.0]));
    }
}
