use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);

    pub fn to_unit(self) -> [f32; 3] {
        let [r, g, b] = self.0;
        [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
    }
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("lime", [0, 255, 0]),
    ("blue", [0, 0, 255]),
    ("navy", [0, 0, 128]),
    ("yellow", [255, 255, 0]),
    ("orange", [255, 165, 0]),
    ("purple", [128, 0, 128]),
    ("fuchsia", [255, 0, 255]),
    ("magenta", [255, 0, 255]),
    ("cyan", [0, 255, 255]),
    ("aqua", [0, 255, 255]),
    ("teal", [0, 128, 128]),
    ("maroon", [128, 0, 0]),
    ("olive", [128, 128, 0]),
    ("silver", [192, 192, 192]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("lightgray", [211, 211, 211]),
    ("lightgrey", [211, 211, 211]),
    ("darkgray", [169, 169, 169]),
    ("darkgrey", [169, 169, 169]),
    ("brown", [165, 42, 42]),
    ("pink", [255, 192, 203]),
];

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            let digits: Vec<u8> = hex
                .chars()
                .map(|c| c.to_digit(16).map(|d| d as u8))
                .collect::<Option<_>>()
                .ok_or_else(|| format!("invalid hex color {s:?}"))?;
            return match digits.as_slice() {
                [r, g, b] => Ok(Color([r * 17, g * 17, b * 17])),
                [r1, r2, g1, g2, b1, b2] => Ok(Color([r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2])),
                _ => Err(format!("invalid hex color {s:?}")),
            };
        }
        let lower = trimmed.to_ascii_lowercase();
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, rgb)| Color(*rgb))
            .ok_or_else(|| format!("unknown color {s:?}"))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => f.write_str("portrait"),
            Orientation::Landscape => f.write_str("landscape"),
        }
    }
}

/// Requested page size as written in a document definition. Resolved by
/// `render::geometry::resolve_page_geometry`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum PageSizeSpec {
    Named(String),
    Explicit { width: f32, height: HeightSpec },
    Other(serde_json::Value),
}

impl Default for PageSizeSpec {
    fn default() -> Self {
        PageSizeSpec::Named("A4".to_string())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum HeightSpec {
    Points(f32),
    Keyword(String), // only "auto" is meaningful
}

/// Margin shorthand: a scalar, `[horizontal, vertical]` or `[left, top, right, bottom]`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MarginSpec {
    Uniform(f32),
    Sides(Vec<f32>),
    Other(serde_json::Value),
}

impl Default for MarginSpec {
    fn default() -> Self {
        MarginSpec::Uniform(40.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VertAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decoration {
    Underline,
    Overline,
    LineThrough,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inline {
    pub text: String,
    pub font: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italics: bool,
    pub font_size: f32,
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub x: f32, // relative to line start
    pub width: f32,
    #[serde(default)]
    pub character_spacing: f32,
    #[serde(default)]
    pub background: Option<Color>,
    #[serde(default)]
    pub decoration: Option<Decoration>,
    #[serde(default)]
    pub decoration_color: Option<Color>,
    #[serde(default)]
    pub vertical_align: VertAlign,
    /// Anchor id of the node whose page number replaces `text` at draw time.
    #[serde(default)]
    pub page_reference: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub link_to_page: Option<usize>, // 1-based
}

/// A single structural directive attached to a line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagToken {
    Open(String),
    Close(String),
    /// Close this many ancestors regardless of their names.
    OnetimePop(u32),
}

impl fmt::Display for TagToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagToken::Open(name) => write!(f, "{name}"),
            TagToken::Close(name) => write!(f, "/{name}"),
            TagToken::OnetimePop(n) => write!(f, "{{onetime: {n}}}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTagToken {
    Name(String),
    Onetime { onetime: i64 },
    Other(serde_json::Value),
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<TagToken>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawTagToken>::deserialize(deserializer)?;
    let mut tokens = Vec::with_capacity(raw.len());
    for token in raw {
        match token {
            RawTagToken::Name(name) if name.is_empty() => {}
            RawTagToken::Name(name) => match name.strip_prefix('/') {
                Some(closed) if !closed.is_empty() => {
                    tokens.push(TagToken::Close(closed.to_string()))
                }
                Some(_) => log::warn!("Ignoring close tag without a name"),
                None => tokens.push(TagToken::Open(name)),
            },
            RawTagToken::Onetime { onetime } if onetime > 0 => {
                tokens.push(TagToken::OnetimePop(u32::try_from(onetime).unwrap_or(u32::MAX)))
            }
            RawTagToken::Onetime { onetime } => {
                log::warn!("Ignoring onetime pop with non-positive count {onetime}")
            }
            RawTagToken::Other(value) => log::warn!("Ignoring unexpected tag token {value}"),
        }
    }
    Ok(tokens)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub height: f32,
    pub ascender_height: f32,
    #[serde(default)]
    pub inlines: Vec<Inline>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<TagToken>,
    #[serde(default)]
    pub starts_node: bool,
    #[serde(default)]
    pub ends_node: bool,
    /// Node id other lines may reference for their page number.
    #[serde(default)]
    pub anchor: Option<String>,
}

impl TextLine {
    /// Whether the structure engine acts on this line at all.
    pub fn carries_structure(&self) -> bool {
        !self.tags.is_empty() && (self.starts_node || self.ends_node)
    }

    pub fn visible_text(&self) -> String {
        self.inlines.iter().map(|i| i.text.as_str()).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Dash {
    pub length: f32,
    #[serde(default)]
    pub space: Option<f32>,
    #[serde(default)]
    pub phase: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Shape {
    Ellipse {
        x: f32,
        y: f32,
        r1: f32,
        r2: f32,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        #[serde(default)]
        r: f32,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Polyline {
        points: Vec<Point>,
        #[serde(default, rename = "closePath")]
        close_path: bool,
    },
    /// SVG path data.
    Path { d: String },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vector {
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(default)]
    pub line_width: Option<f32>,
    #[serde(default)]
    pub dash: Option<Dash>,
    #[serde(default)]
    pub line_join: Option<LineJoin>,
    #[serde(default)]
    pub line_cap: Option<LineCap>,
    /// Fill color.
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub line_color: Option<Color>,
    #[serde(default)]
    pub fill_opacity: Option<f32>,
    #[serde(default)]
    pub stroke_opacity: Option<f32>,
    #[serde(default)]
    pub linear_gradient: Option<Vec<Color>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// File path or `data:` URI.
    pub src: String,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub link_to_page: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvgItem {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// SVG document source.
    pub svg: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A positioned drawable as produced by layout: `{ "type": ..., "item": {...} }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "camelCase")]
pub enum DrawableItem {
    Vector(Vector),
    Line(TextLine),
    Image(ImageItem),
    Svg(SvgItem),
    BeginClip(ClipRect),
    EndClip,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RenderedSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub text: String,
    #[serde(default = "default_watermark_color")]
    pub color: Color,
    #[serde(default = "default_watermark_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub angle: f32, // degrees, clockwise on the page
    pub font: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italics: bool,
    pub font_size: f32,
    pub rendered_size: RenderedSize,
}

fn default_watermark_color() -> Color {
    Color([128, 128, 128])
}

fn default_watermark_opacity() -> f32 {
    0.6
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Absent means the page keeps whatever physical size the previous page had.
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub watermark: Option<Watermark>,
    #[serde(default)]
    pub items: Vec<DrawableItem>,
}
