#![allow(dead_code)]

use laidout_pdf::backend::{Backend, Fill, FontResolver, PathData, Rect, Size, SpanId, Stroke, TextRun};
use laidout_pdf::model::{DrawableItem, Page};
use laidout_pdf::{Result, StructureTree};
use serde_json::{Value, json};

/// Everything a render pass asked of the backend, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    SetPageSize(Size),
    AddPage(Size),
    EndPage,
    Save,
    Restore,
    Transform([f32; 6]),
    Clip(Rect),
    Path {
        fill: Option<Fill>,
        stroke: Option<Stroke>,
    },
    Text {
        text: String,
        x: f32,
        baseline: f32,
        size: f32,
    },
    Image {
        src: String,
        rect: Rect,
        opacity: f32,
    },
    Svg(Rect),
    LinkUri(Rect, String),
    LinkPage(Rect, usize),
    BeginSpan(SpanId, String),
    EndSpan(SpanId),
    BeginArtifact,
    EndArtifact,
    FinishStructure(String),
}

pub struct RecordingBackend {
    pub ops: Vec<Op>,
    size: Size,
    pages: usize,
    next_span: usize,
}

impl RecordingBackend {
    pub fn new(size: Size) -> Self {
        Self {
            ops: Vec::new(),
            size,
            pages: 0,
            next_span: 0,
        }
    }

    pub fn texts(&self) -> Vec<(String, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Text { text, x, .. } => Some((text.clone(), *x)),
                _ => None,
            })
            .collect()
    }

    pub fn page_sizes(&self) -> Vec<Size> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::AddPage(size) => Some(*size),
                _ => None,
            })
            .collect()
    }

    pub fn swaps(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::SetPageSize(_)))
            .count()
    }

    pub fn paths(&self) -> Vec<(Option<Fill>, Option<Stroke>)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Path { fill, stroke } => Some((fill.clone(), stroke.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn spans_opened(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::BeginSpan(_, tag) => Some(tag.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Backend for RecordingBackend {
    fn page_size(&self) -> Size {
        self.size
    }

    fn set_page_size(&mut self, size: Size) {
        self.size = size;
        self.ops.push(Op::SetPageSize(size));
    }

    fn add_page(&mut self) {
        self.pages += 1;
        self.ops.push(Op::AddPage(self.size));
    }

    fn end_page(&mut self) {
        self.ops.push(Op::EndPage);
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn save_state(&mut self) {
        self.ops.push(Op::Save);
    }

    fn restore_state(&mut self) {
        self.ops.push(Op::Restore);
    }

    fn transform(&mut self, matrix: [f32; 6]) {
        self.ops.push(Op::Transform(matrix));
    }

    fn clip_rect(&mut self, rect: Rect) {
        self.ops.push(Op::Clip(rect));
    }

    fn draw_path(&mut self, _path: &PathData, fill: Option<&Fill>, stroke: Option<&Stroke>) {
        self.ops.push(Op::Path {
            fill: fill.cloned(),
            stroke: stroke.cloned(),
        });
    }

    fn draw_text(&mut self, run: &TextRun<'_>) {
        self.ops.push(Op::Text {
            text: run.text.to_string(),
            x: run.x,
            baseline: run.baseline,
            size: run.size,
        });
    }

    fn draw_image(&mut self, rect: Rect, src: &str, opacity: f32) -> Result<()> {
        self.ops.push(Op::Image {
            src: src.to_string(),
            rect,
            opacity,
        });
        Ok(())
    }

    fn draw_svg(&mut self, rect: Rect, _svg: &str, _fonts: FontResolver<'_>) -> Result<()> {
        self.ops.push(Op::Svg(rect));
        Ok(())
    }

    fn link_uri(&mut self, rect: Rect, uri: &str) {
        self.ops.push(Op::LinkUri(rect, uri.to_string()));
    }

    fn link_page(&mut self, rect: Rect, page: usize) {
        self.ops.push(Op::LinkPage(rect, page));
    }

    fn begin_span(&mut self, tag: &str) -> SpanId {
        let id = SpanId(self.next_span);
        self.next_span += 1;
        self.ops.push(Op::BeginSpan(id, tag.to_string()));
        id
    }

    fn end_span(&mut self, span: SpanId) {
        self.ops.push(Op::EndSpan(span));
    }

    fn begin_artifact(&mut self) {
        self.ops.push(Op::BeginArtifact);
    }

    fn end_artifact(&mut self) {
        self.ops.push(Op::EndArtifact);
    }

    fn finish_structure(&mut self, tree: &StructureTree) {
        self.ops.push(Op::FinishStructure(tree.outline()));
    }
}

pub fn a4() -> Size {
    Size::new(595.28, 841.89)
}

/// A single Helvetica inline at x 0.
pub fn inline(text: &str, width: f32) -> Value {
    json!({ "text": text, "font": "Helvetica", "fontSize": 10, "width": width })
}

/// A text line at `y` with one inline and the given raw tag tokens.
pub fn tagged_line(text: &str, y: f32, tags: Value, starts: bool, ends: bool) -> Value {
    json!({
        "type": "line",
        "item": {
            "x": 40, "y": y, "height": 12, "ascenderHeight": 9,
            "inlines": [inline(text, 20.0)],
            "tags": tags,
            "startsNode": starts,
            "endsNode": ends
        }
    })
}

pub fn plain_line(text: &str, y: f32) -> Value {
    json!({
        "type": "line",
        "item": { "x": 40, "y": y, "height": 12, "ascenderHeight": 9, "inlines": [inline(text, 20.0)] }
    })
}

pub fn item(value: Value) -> DrawableItem {
    serde_json::from_value(value).expect("valid item")
}

pub fn page(items: Vec<Value>) -> Page {
    Page {
        items: items.into_iter().map(item).collect(),
        ..Page::default()
    }
}

pub fn page_json(value: Value) -> Page {
    serde_json::from_value(value).expect("valid page")
}
