use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use pdf_writer::{Name, Pdf, Rect, Ref};
use serde::Deserialize;
use ttf_parser::Face;

use crate::error::{Error, Result};

/// Handle to a face registered in a [`FontBook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub(crate) usize);

/// Per-style font files of one family, as configured in a document definition.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FamilyFiles {
    #[serde(default)]
    pub normal: Option<PathBuf>,
    #[serde(default)]
    pub bold: Option<PathBuf>,
    #[serde(default)]
    pub italics: Option<PathBuf>,
    #[serde(default)]
    pub bolditalics: Option<PathBuf>,
}

impl FamilyFiles {
    fn styles(&self) -> impl Iterator<Item = (bool, bool, &PathBuf)> {
        [
            (false, false, self.normal.as_ref()),
            (true, false, self.bold.as_ref()),
            (false, true, self.italics.as_ref()),
            (true, true, self.bolditalics.as_ref()),
        ]
        .into_iter()
        .filter_map(|(b, i, p)| p.map(|p| (b, i, p)))
    }
}

pub(crate) enum FontData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl FontData {
    fn as_slice(&self) -> &[u8] {
        match self {
            FontData::Mapped(m) => m,
            FontData::Owned(v) => v,
        }
    }
}

pub(crate) enum FaceSource {
    /// One of the PDF base-14 fonts; no file, WinAnsi encoded.
    Standard(&'static str),
    File {
        path: PathBuf,
        data: FontData,
        index: u32,
    },
}

pub struct FontFace {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
    pub(crate) source: FaceSource,
    units_per_em: f32,
    ascender: f32,  // em fraction
    descender: f32, // em fraction, negative
    line_gap: f32,  // em fraction
}

impl FontFace {
    fn standard(family: &str, base_name: &'static str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
            italic,
            source: FaceSource::Standard(base_name),
            units_per_em: 1000.0,
            ascender: 0.718,
            descender: -0.207,
            line_gap: 0.231,
        }
    }

    fn from_data(
        family: &str,
        bold: bool,
        italic: bool,
        path: PathBuf,
        data: FontData,
        index: u32,
    ) -> Result<Self> {
        let face = Face::parse(data.as_slice(), index)
            .map_err(|e| Error::Font(format!("{}: {e}", path.display())))?;
        let units = face.units_per_em() as f32;
        let ascender = face.ascender() as f32 / units;
        let descender = face.descender() as f32 / units;
        let line_gap = face.line_gap() as f32 / units;
        Ok(Self {
            family: family.to_string(),
            bold,
            italic,
            units_per_em: units,
            ascender,
            descender,
            line_gap,
            source: FaceSource::File { path, data, index },
        })
    }

    /// Backing file, `None` for base-14 faces.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FaceSource::File { path, .. } => Some(path),
            FaceSource::Standard(_) => None,
        }
    }

    pub fn ascender_ratio(&self) -> f32 {
        self.ascender
    }

    pub fn descender_ratio(&self) -> f32 {
        self.descender
    }

    /// Natural line height at `size`.
    pub fn line_height(&self, size: f32) -> f32 {
        (self.ascender - self.descender + self.line_gap) * size
    }

    pub(crate) fn ttf(&self) -> Option<(Face<'_>, f32)> {
        match &self.source {
            FaceSource::File { data, index, .. } => Face::parse(data.as_slice(), *index)
                .ok()
                .map(|f| (f, self.units_per_em)),
            FaceSource::Standard(_) => None,
        }
    }

    /// Width of `text` at `size`, with `char_spacing` added between characters.
    pub fn text_width(&self, text: &str, size: f32, char_spacing: f32) -> f32 {
        let glyphs: f32 = match self.ttf() {
            Some((face, units)) => text
                .chars()
                .map(|ch| {
                    face.glyph_index(ch)
                        .and_then(|gid| face.glyph_hor_advance(gid))
                        .map(|adv| adv as f32 / units * size)
                        .unwrap_or(0.0)
                })
                .sum(),
            None => {
                let widths = helvetica_widths();
                text.chars()
                    .map(|ch| {
                        let byte = char_to_winansi(ch);
                        if byte >= 32 {
                            widths[(byte - 32) as usize] * size / 1000.0
                        } else {
                            0.0
                        }
                    })
                    .sum()
            }
        };
        let count = text.chars().count();
        glyphs + char_spacing * count.saturating_sub(1) as f32
    }
}

/// The set of fonts known to a render pass, keyed by lowercase family and style.
pub struct FontBook {
    faces: Vec<FontFace>,
    index: HashMap<(String, bool, bool), FontId>,
    default_family: String,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    pub const BUILTIN_FAMILY: &'static str = "Helvetica";

    /// A book holding only the built-in Helvetica family, which is also the default.
    pub fn new() -> Self {
        let mut book = Self {
            faces: Vec::new(),
            index: HashMap::new(),
            default_family: Self::BUILTIN_FAMILY.to_string(),
        };
        for (base, bold, italic) in [
            ("Helvetica", false, false),
            ("Helvetica-Bold", true, false),
            ("Helvetica-Oblique", false, true),
            ("Helvetica-BoldOblique", true, true),
        ] {
            book.insert(FontFace::standard(Self::BUILTIN_FAMILY, base, bold, italic), true);
        }
        book
    }

    fn insert(&mut self, face: FontFace, replace: bool) -> FontId {
        let key = (face.family.to_lowercase(), face.bold, face.italic);
        if !replace && let Some(&existing) = self.index.get(&key) {
            return existing;
        }
        let id = FontId(self.faces.len());
        self.faces.push(face);
        self.index.insert(key, id);
        id
    }

    pub fn default_family(&self) -> &str {
        &self.default_family
    }

    pub fn set_default_family(&mut self, family: &str) {
        if !self.has_family(family) {
            log::warn!("Default font family {family:?} is not registered");
        }
        self.default_family = family.to_string();
    }

    pub fn has_family(&self, family: &str) -> bool {
        let key = family.to_lowercase();
        self.index.keys().any(|(f, _, _)| *f == key)
    }

    /// Register one font file under an explicit family and style. Replaces any
    /// face previously known for that key.
    pub fn register_file(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        path: &Path,
    ) -> Result<FontId> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
        })?;
        let data = match unsafe { Mmap::map(&file) } {
            Ok(map) => FontData::Mapped(map),
            Err(_) => FontData::Owned(std::fs::read(path)?),
        };
        let face = FontFace::from_data(family, bold, italic, path.to_path_buf(), data, 0)?;
        Ok(self.insert(face, true))
    }

    pub fn register_family(&mut self, family: &str, files: &FamilyFiles) -> Result<()> {
        for (bold, italic, path) in files.styles() {
            self.register_file(family, bold, italic, path)?;
        }
        Ok(())
    }

    /// Index every font file under `dirs` by the family name in its name table.
    /// Explicitly registered faces win over scanned ones.
    pub fn scan_dirs(&mut self, dirs: &[PathBuf]) {
        let t0 = std::time::Instant::now();
        let mut files_scanned = 0u32;
        let mut registered = 0u32;
        let mut visited = HashSet::new();
        let mut stack: Vec<PathBuf> = dirs.to_vec();

        while let Some(dir) = stack.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else {
                log::debug!("Skipping unreadable font directory {}", dir.display());
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !is_font_file(&path) {
                    continue;
                }
                files_scanned += 1;
                let Ok(file) = std::fs::File::open(&path) else {
                    continue;
                };
                let Ok(map) = (unsafe { Mmap::map(&file) }) else {
                    continue;
                };
                let face_count = if is_font_collection(&path) {
                    ttf_parser::fonts_in_collection(&map).unwrap_or(1)
                } else {
                    1
                };
                let styles: Vec<(u32, String, bool, bool)> = (0..face_count)
                    .filter_map(|idx| read_font_style(&map, idx).map(|(f, b, i)| (idx, f, b, i)))
                    .collect();
                drop(map);
                for (idx, family, bold, italic) in styles {
                    if self.index.contains_key(&(family.to_lowercase(), bold, italic)) {
                        continue;
                    }
                    let Ok(file) = std::fs::File::open(&path) else {
                        continue;
                    };
                    let Ok(map) = (unsafe { Mmap::map(&file) }) else {
                        continue;
                    };
                    let data = FontData::Mapped(map);
                    if let Ok(face) =
                        FontFace::from_data(&family, bold, italic, path.clone(), data, idx)
                    {
                        self.insert(face, false);
                        registered += 1;
                    }
                }
            }
        }

        log::info!(
            "Font scan: {:.1}ms, {} files parsed, {} faces registered",
            t0.elapsed().as_secs_f64() * 1000.0,
            files_scanned,
            registered,
        );
    }

    /// Exact family (case-insensitive) and style, no fallback.
    pub fn resolve_style(&self, family: &str, bold: bool, italic: bool) -> Option<FontId> {
        self.index
            .get(&(primary_font_name(family).to_lowercase(), bold, italic))
            .copied()
    }

    /// Look up the face for laid-out text. Falls back to the regular style of the
    /// same family, then to the default family.
    pub fn lookup(&self, family: &str, bold: bool, italic: bool) -> Result<FontId> {
        if let Some(id) = self.resolve_style(family, bold, italic) {
            return Ok(id);
        }
        if (bold || italic)
            && let Some(id) = self.resolve_style(family, false, false)
        {
            log::debug!("Font {family} bold={bold} italic={italic} missing, using regular");
            return Ok(id);
        }
        let fallback = self
            .resolve_style(&self.default_family, bold, italic)
            .or_else(|| self.resolve_style(&self.default_family, false, false));
        match fallback {
            Some(id) => {
                log::warn!(
                    "Font not found: {family} bold={bold} italic={italic}, using {}",
                    self.default_family
                );
                Ok(id)
            }
            None => Err(Error::FontResolution {
                family: family.to_string(),
                bold,
                italic,
            }),
        }
    }

    /// Map a CSS font-family list plus style flags to a concrete font file.
    ///
    /// The first family in the list known to the book wins; if none is known the
    /// default family is used. The chosen family must have a file for the exact
    /// requested style.
    pub fn resolve_css_font(
        &self,
        families: &[String],
        bold: bool,
        italic: bool,
    ) -> Result<PathBuf> {
        let family = families
            .iter()
            .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\''))
            .find(|f| self.has_family(f))
            .unwrap_or(&self.default_family);

        self.resolve_style(family, bold, italic)
            .and_then(|id| self.face(id).path())
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::FontResolution {
                family: family.to_string(),
                bold,
                italic,
            })
    }

    pub fn face(&self, id: FontId) -> &FontFace {
        &self.faces[id.0]
    }

    pub fn measure(&self, id: FontId, text: &str, size: f32, char_spacing: f32) -> f32 {
        self.face(id).text_width(text, size, char_spacing)
    }
}

/// Directories listed in `LAIDOUT_FONT_DIRS`, separated like `PATH`.
pub fn font_dirs_from_env() -> Vec<PathBuf> {
    std::env::var_os("LAIDOUT_FONT_DIRS")
        .map(|val| {
            std::env::split_paths(&val)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn font_family_name(face: &Face) -> Option<String> {
    // Family (ID 1) rather than typographic family, so "Foo Display" stays apart from "Foo".
    for name in face.names() {
        if name.name_id == ttf_parser::name_id::FAMILY
            && name.is_unicode()
            && let Some(s) = name.to_string()
        {
            return Some(s);
        }
    }
    None
}

fn read_font_style(data: &[u8], face_index: u32) -> Option<(String, bool, bool)> {
    let face = Face::parse(data, face_index).ok()?;
    let family = font_family_name(&face)?;
    Some((family, face.is_bold(), face.is_italic()))
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn is_font_collection(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ttc"))
}

pub(crate) fn primary_font_name(name: &str) -> &str {
    name.split([',', ';']).next().unwrap_or(name).trim()
}

/// Map a single Unicode char to its WinAnsi byte, or 0 if unmappable.
fn char_to_winansi(c: char) -> u8 {
    match c as u32 {
        0x0020..=0x007F => c as u8,
        0x00A0..=0x00FF => c as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => 0,
    }
}

/// Convert a UTF-8 string to WinAnsi (Windows-1252) bytes for base-14 fonts.
pub(crate) fn to_winansi_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(char_to_winansi)
        .filter(|&b| b != 0)
        .collect()
}

/// Approximate Helvetica widths at 1000 units/em for WinAnsi chars 32..=255.
fn helvetica_widths() -> &'static [f32] {
    static WIDTHS: std::sync::OnceLock<Vec<f32>> = std::sync::OnceLock::new();
    WIDTHS.get_or_init(|| {
        (32u8..=255u8)
            .map(|b| match b {
                32 => 278.0,                          // space
                33..=47 => 333.0,                     // punctuation
                48..=57 => 556.0,                     // digits
                58..=64 => 333.0,                     // more punctuation
                73 | 74 => 278.0,                     // I J
                77 => 833.0,                          // M
                65..=90 => 667.0,                     // uppercase A-Z (average)
                91..=96 => 333.0,                     // brackets etc.
                102 | 105 | 106 | 108 | 116 => 278.0, // f i j l t
                109 | 119 => 833.0,                   // m w
                97..=122 => 556.0,                    // lowercase a-z (average)
                _ => 556.0,
            })
            .collect()
    })
}

/// Glyphs of one embedded face used so far, remapped for subsetting.
pub(crate) struct GlyphUsage {
    remapper: subsetter::GlyphRemapper,
    char_to_gid: BTreeMap<char, u16>,
    gid_widths: BTreeMap<u16, f32>, // remapped gid -> width in 1000-units
}

impl GlyphUsage {
    pub(crate) fn new() -> Self {
        Self {
            remapper: subsetter::GlyphRemapper::new(),
            char_to_gid: BTreeMap::new(),
            gid_widths: BTreeMap::new(),
        }
    }
}

/// Encode `text` for a content stream: big-endian remapped glyph ids for embedded
/// faces, WinAnsi bytes for base-14 faces.
pub(crate) fn encode_text(face: &FontFace, text: &str, usage: &mut GlyphUsage) -> Vec<u8> {
    let Some((ttf, units)) = face.ttf() else {
        return to_winansi_bytes(text);
    };
    let mut out = Vec::with_capacity(text.len() * 2);
    for ch in text.chars() {
        let gid = match ttf.glyph_index(ch) {
            Some(gid) => gid,
            None => {
                log::debug!("No glyph for {ch:?} in {}", face.family);
                ttf_parser::GlyphId(0)
            }
        };
        let new_gid = usage.remapper.remap(gid.0);
        usage.char_to_gid.entry(ch).or_insert(new_gid);
        usage.gid_widths.entry(new_gid).or_insert_with(|| {
            ttf.glyph_hor_advance(gid)
                .map(|adv| adv as f32 / units * 1000.0)
                .unwrap_or(0.0)
        });
        out.push((new_gid >> 8) as u8);
        out.push((new_gid & 0xFF) as u8);
    }
    out
}

/// Write the font dictionary for `face` at `font_ref`. Embedded faces are
/// subset to the glyphs recorded in `usage` and written as Type0/CIDFontType2
/// with Identity-H encoding.
pub(crate) fn embed_font(
    pdf: &mut Pdf,
    font_ref: Ref,
    face: &FontFace,
    usage: &GlyphUsage,
    alloc: &mut impl FnMut() -> Ref,
) -> Result<()> {
    let (path, data, index) = match &face.source {
        FaceSource::File { path, data, index } => (path, data, index),
        FaceSource::Standard(base) => {
            pdf.type1_font(font_ref)
                .base_font(Name(base.as_bytes()))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
            return Ok(());
        }
    };

    let t0 = std::time::Instant::now();
    let font_data = data.as_slice();
    let ttf = Face::parse(font_data, *index)
        .map_err(|e| Error::Font(format!("{}: {e}", path.display())))?;

    let units = ttf.units_per_em() as f32;
    let ascent = ttf.ascender() as f32 / units * 1000.0;
    let descent = ttf.descender() as f32 / units * 1000.0;
    let cap_height = ttf
        .capital_height()
        .map(|h| h as f32 / units * 1000.0)
        .unwrap_or(700.0);
    let bb = ttf.global_bounding_box();
    let bbox = Rect::new(
        bb.x_min as f32 / units * 1000.0,
        bb.y_min as f32 / units * 1000.0,
        bb.x_max as f32 / units * 1000.0,
        bb.y_max as f32 / units * 1000.0,
    );

    let subset_data = subsetter::subset(font_data, *index, &usage.remapper).unwrap_or_else(|e| {
        log::warn!("Font subsetting failed for {}: {e}, embedding full font", face.family);
        font_data.to_vec()
    });

    let descriptor_ref = alloc();
    let data_ref = alloc();
    let cid_font_ref = alloc();
    let tounicode_ref = alloc();

    let data_len = i32::try_from(subset_data.len())
        .map_err(|_| Error::Font(format!("{} is too large to embed", path.display())))?;
    pdf.stream(data_ref, &subset_data)
        .pair(Name(b"Length1"), data_len);

    let ps_name: String = face.family.chars().filter(|c| !c.is_whitespace()).collect();
    let ps_name = match (face.bold, face.italic) {
        (true, true) => format!("{ps_name}-BoldItalic"),
        (true, false) => format!("{ps_name}-Bold"),
        (false, true) => format!("{ps_name}-Italic"),
        (false, false) => ps_name,
    };

    let mut flags = pdf_writer::types::FontFlags::NON_SYMBOLIC;
    if face.italic {
        flags |= pdf_writer::types::FontFlags::ITALIC;
    }
    pdf.font_descriptor(descriptor_ref)
        .name(Name(ps_name.as_bytes()))
        .flags(flags)
        .bbox(bbox)
        .italic_angle(0.0)
        .ascent(ascent)
        .descent(descent)
        .cap_height(cap_height)
        .stem_v(if face.bold { 120.0 } else { 80.0 })
        .font_file2(data_ref);

    let system_info = pdf_writer::types::SystemInfo {
        registry: pdf_writer::Str(b"Adobe"),
        ordering: pdf_writer::Str(b"Identity"),
        supplement: 0,
    };
    {
        let mut cid = pdf.cid_font(cid_font_ref);
        cid.subtype(pdf_writer::types::CidFontType::Type2);
        cid.base_font(Name(ps_name.as_bytes()));
        cid.system_info(system_info);
        cid.font_descriptor(descriptor_ref);
        cid.default_width(0.0);
        cid.cid_to_gid_map_predefined(Name(b"Identity"));
        if !usage.gid_widths.is_empty() {
            let mut w = cid.widths();
            for (&gid, &width) in &usage.gid_widths {
                w.consecutive(gid, [width]);
            }
        }
    }

    let cmap_name = format!("{ps_name}-UTF16");
    let mut cmap = pdf_writer::types::UnicodeCmap::new(Name(cmap_name.as_bytes()), system_info);
    for (&ch, &gid) in &usage.char_to_gid {
        cmap.pair(gid, ch);
    }
    let cmap_data = cmap.finish();
    pdf.stream(tounicode_ref, cmap_data.as_slice());

    pdf.type0_font(font_ref)
        .base_font(Name(ps_name.as_bytes()))
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_font_ref)
        .to_unicode(tounicode_ref);

    log::debug!(
        "embed_font: {} bold={} italic={} glyphs={} → {:.1}ms",
        face.family,
        face.bold,
        face.italic,
        usage.gid_widths.len(),
        t0.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(())
}
