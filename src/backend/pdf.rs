//! Tagged PDF output through pdf-writer.
//!
//! Content is written in document space: every page stream starts with a
//! y-flip so callers can keep top-left coordinates. Objects that need page
//! references (links, structure elements, fonts) are written in [`PdfBackend::finish`].

use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use pdf_writer::types::{
    ActionType, AnnotationType, FunctionShadingType, LineCapStyle, LineJoinStyle, TabOrder,
};
use pdf_writer::writers::{NumberTree, StructChildren};
use pdf_writer::{Content, Dict, Filter, Finish, Name, Pdf, Ref, Str, TextStr};

use super::{
    Backend, Fill, FontResolver, GradientStop, Paint, PathData, PathOp, Rect, Size, SpanId, Stroke,
    TextRun,
};
use crate::error::{Error, Result};
use crate::fonts::{FontBook, FontId, GlyphUsage, embed_font, encode_text};
use crate::model::{Color, LineCap, LineJoin};
use crate::structure::{ElementId, StructureChild, StructureTree};

struct RefAlloc(i32);

impl RefAlloc {
    fn bump(&mut self) -> Ref {
        let r = Ref::new(self.0);
        self.0 += 1;
        r
    }
}

enum LinkTarget {
    Uri(String),
    Page(usize),
}

struct PageRecord {
    size: Size,
    content: Content,
    links: Vec<(pdf_writer::Rect, LinkTarget)>,
    /// Span owning each marked-content id on this page, indexed by MCID.
    mcid_owners: Vec<SpanId>,
}

struct SpanRecord {
    tag: String,
    parts: Vec<(usize, i32)>, // (page index, mcid)
}

struct FontSlot {
    name: String,
    font_ref: Ref,
    usage: GlyphUsage,
}

/// Options that end up in the document catalog and info dictionary.
#[derive(Clone, Debug, Default)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub language: Option<String>,
}

pub struct PdfBackend<'f> {
    fonts: &'f FontBook,
    pdf: Pdf,
    alloc: RefAlloc,
    metadata: PdfMetadata,
    next_size: Size,
    pages: Vec<PageRecord>,
    font_slots: BTreeMap<FontId, FontSlot>,
    images: HashMap<String, String>,
    x_objects: Vec<(String, Ref)>,
    ext_gstates: HashMap<(u32, u32), String>,
    ext_gstate_refs: Vec<(String, Ref)>,
    shadings: Vec<(String, Ref)>,
    spans: Vec<SpanRecord>,
    /// Spans not yet ended. Only the last one can have an active
    /// marked-content sequence; the others resume with a fresh MCID.
    open_spans: Vec<SpanId>,
    /// A BDC for the innermost open span is open on the current page.
    part_active: bool,
    in_artifact: bool,
    structure: Option<StructureTree>,
}

impl<'f> PdfBackend<'f> {
    pub fn new(fonts: &'f FontBook, page_size: Size) -> Self {
        Self {
            fonts,
            pdf: Pdf::new(),
            alloc: RefAlloc(1),
            metadata: PdfMetadata::default(),
            next_size: page_size,
            pages: Vec::new(),
            font_slots: BTreeMap::new(),
            images: HashMap::new(),
            x_objects: Vec::new(),
            ext_gstates: HashMap::new(),
            ext_gstate_refs: Vec::new(),
            shadings: Vec::new(),
            spans: Vec::new(),
            open_spans: Vec::new(),
            part_active: false,
            in_artifact: false,
            structure: None,
        }
    }

    pub fn with_metadata(mut self, metadata: PdfMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The font book text runs are resolved against.
    pub fn fonts(&self) -> &'f FontBook {
        self.fonts
    }

    fn current(&mut self) -> Option<&mut PageRecord> {
        let page = self.pages.last_mut();
        if page.is_none() {
            log::warn!("Drawing before the first page was added, ignoring");
        }
        page
    }

    fn ext_gstate(&mut self, fill_alpha: f32, stroke_alpha: f32) -> Option<String> {
        let fill_alpha = fill_alpha.clamp(0.0, 1.0);
        let stroke_alpha = stroke_alpha.clamp(0.0, 1.0);
        if fill_alpha >= 1.0 && stroke_alpha >= 1.0 {
            return None;
        }
        let key = (fill_alpha.to_bits(), stroke_alpha.to_bits());
        if let Some(name) = self.ext_gstates.get(&key) {
            return Some(name.clone());
        }
        let gs_ref = self.alloc.bump();
        self.pdf
            .ext_graphics(gs_ref)
            .non_stroking_alpha(fill_alpha)
            .stroking_alpha(stroke_alpha);
        let name = format!("GS{}", self.ext_gstate_refs.len() + 1);
        self.ext_gstate_refs.push((name.clone(), gs_ref));
        self.ext_gstates.insert(key, name.clone());
        Some(name)
    }

    fn shading(
        &mut self,
        start: (f32, f32),
        end: (f32, f32),
        stops: &[GradientStop],
    ) -> Option<String> {
        let function_ref = match stops {
            [] => return None,
            [only] => self.exponential(only.color, only.color),
            [first, second] => self.exponential(first.color, second.color),
            _ => {
                let mut functions = Vec::with_capacity(stops.len() - 1);
                let mut bounds = Vec::with_capacity(stops.len() - 2);
                let mut encode = Vec::with_capacity(2 * (stops.len() - 1));
                for (i, window) in stops.windows(2).enumerate() {
                    functions.push(self.exponential(window[0].color, window[1].color));
                    if i > 0 {
                        bounds.push(window[0].offset);
                    }
                    encode.extend([0.0, 1.0]);
                }
                let root = self.alloc.bump();
                let mut stitching = self.pdf.stitching_function(root);
                stitching.domain([0.0, 1.0]);
                stitching.functions(functions);
                stitching.bounds(bounds);
                stitching.encode(encode);
                stitching.finish();
                root
            }
        };

        let shading_ref = self.alloc.bump();
        let mut shading = self.pdf.function_shading(shading_ref);
        shading.shading_type(FunctionShadingType::Axial);
        shading.color_space().device_rgb();
        shading.function(function_ref);
        shading.coords([start.0, start.1, end.0, end.1]);
        shading.extend([true, true]);
        shading.finish();

        let name = format!("Sh{}", self.shadings.len() + 1);
        self.shadings.push((name.clone(), shading_ref));
        Some(name)
    }

    fn exponential(&mut self, c0: Color, c1: Color) -> Ref {
        let r = self.alloc.bump();
        let mut exp = self.pdf.exponential_function(r);
        exp.domain([0.0, 1.0]);
        exp.c0(c0.to_unit());
        exp.c1(c1.to_unit());
        exp.n(1.0);
        exp.finish();
        r
    }

    fn embed_image(&mut self, src: &str) -> Result<String> {
        if let Some(name) = self.images.get(src) {
            return Ok(name.clone());
        }
        let data = load_image_bytes(src)?;
        let format = image::guess_format(&data)
            .map_err(|e| Error::Image(format!("{}: {e}", short_src(src))))?;

        let xobj_ref = self.alloc.bump();
        let pdf_name = format!("Im{}", self.x_objects.len() + 1);

        if format == image::ImageFormat::Jpeg {
            let decoded = image::load_from_memory_with_format(&data, format)
                .map_err(|e| Error::Image(format!("{}: {e}", short_src(src))))?;
            let mut xobj = self.pdf.image_xobject(xobj_ref, &data);
            xobj.filter(Filter::DctDecode);
            xobj.width(decoded.width() as i32);
            xobj.height(decoded.height() as i32);
            if decoded.color().has_color() {
                xobj.color_space().device_rgb();
            } else {
                xobj.color_space().device_gray();
            }
            xobj.bits_per_component(8);
        } else {
            let decoded = image::load_from_memory_with_format(&data, format)
                .map_err(|e| Error::Image(format!("{}: {e}", short_src(src))))?;
            let rgba: image::RgbaImage = decoded.to_rgba8();
            let (w, h) = (rgba.width(), rgba.height());
            let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

            let rgb_data: Vec<u8> = rgba
                .pixels()
                .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
                .collect();
            let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb_data, 6);

            let smask_ref = if has_alpha {
                let alpha_data: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
                let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha_data, 6);
                let mask_ref = self.alloc.bump();
                let mut mask = self.pdf.image_xobject(mask_ref, &compressed_alpha);
                mask.filter(Filter::FlateDecode);
                mask.width(w as i32);
                mask.height(h as i32);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                Some(mask_ref)
            } else {
                None
            };

            let mut xobj = self.pdf.image_xobject(xobj_ref, &compressed_rgb);
            xobj.filter(Filter::FlateDecode);
            xobj.width(w as i32);
            xobj.height(h as i32);
            xobj.color_space().device_rgb();
            xobj.bits_per_component(8);
            if let Some(mask_ref) = smask_ref {
                xobj.s_mask(mask_ref);
            }
        }

        self.x_objects.push((pdf_name.clone(), xobj_ref));
        self.images.insert(src.to_string(), pdf_name.clone());
        Ok(pdf_name)
    }

    fn font_slot(&mut self, font: FontId) -> &mut FontSlot {
        let next_name = format!("F{}", self.font_slots.len() + 1);
        let alloc = &mut self.alloc;
        self.font_slots.entry(font).or_insert_with(|| FontSlot {
            name: next_name,
            font_ref: alloc.bump(),
            usage: GlyphUsage::new(),
        })
    }

    /// Start a marked-content sequence for `span` on the current page.
    fn open_part(&mut self, span: SpanId) {
        let page_index = self.pages.len().wrapping_sub(1);
        let Some(page) = self.pages.last_mut() else {
            return;
        };
        let mcid = page.mcid_owners.len() as i32;
        page.mcid_owners.push(span);
        let tag = &self.spans[span.0].tag;
        let mut mc = page
            .content
            .begin_marked_content_with_properties(Name(tag.as_bytes()));
        let mut properties = mc.properties();
        properties.pairs([(Name(b"MCID"), mcid)]);
        drop(properties);
        drop(mc);
        self.spans[span.0].parts.push((page_index, mcid));
    }

    fn close_part(&mut self) {
        if let Some(page) = self.pages.last_mut() {
            page.content.end_marked_content();
        }
    }

    /// Open a part for the innermost span before painting, unless one is
    /// already open or we are inside an artifact.
    fn ensure_part(&mut self) {
        if self.part_active || self.in_artifact || self.pages.is_empty() {
            return;
        }
        if let Some(&span) = self.open_spans.last() {
            self.open_part(span);
            self.part_active = true;
        }
    }

    /// Close the active part so q/Q and artifacts never straddle a BDC.
    fn suspend_part(&mut self) {
        if self.part_active {
            self.close_part();
            self.part_active = false;
        }
    }

    fn to_pdf_rect(&self, rect: Rect) -> pdf_writer::Rect {
        let height = self.pages.last().map_or(self.next_size.height, |p| p.size.height);
        pdf_writer::Rect::new(
            rect.x,
            height - rect.y - rect.height,
            rect.x + rect.width,
            height - rect.y,
        )
    }

    /// Assemble the remaining objects and return the PDF bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let t0 = std::time::Instant::now();
        if self.pages.is_empty() {
            log::warn!("No pages were rendered, writing a single blank page");
            self.add_page();
        }
        self.suspend_part();
        self.open_spans.clear();

        let catalog_id = self.alloc.bump();
        let pages_id = self.alloc.bump();
        let n = self.pages.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| self.alloc.bump()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| self.alloc.bump()).collect();

        let font_slots = std::mem::take(&mut self.font_slots);
        for (&id, slot) in &font_slots {
            let alloc = &mut self.alloc;
            let face = self.fonts.face(id);
            embed_font(&mut self.pdf, slot.font_ref, face, &slot.usage, &mut || alloc.bump())?;
        }
        let font_pairs: Vec<(String, Ref)> = font_slots
            .values()
            .map(|slot| (slot.name.clone(), slot.font_ref))
            .collect();

        let pages = std::mem::take(&mut self.pages);
        let page_annot_refs: Vec<Vec<Ref>> = pages
            .iter()
            .map(|page| {
                page.links
                    .iter()
                    .map(|(rect, target)| {
                        let annot_ref = self.alloc.bump();
                        let mut annot = self.pdf.annotation(annot_ref);
                        annot
                            .subtype(AnnotationType::Link)
                            .rect(*rect)
                            .border(0.0, 0.0, 0.0, None);
                        match target {
                            LinkTarget::Uri(uri) => {
                                annot
                                    .action()
                                    .action_type(ActionType::Uri)
                                    .uri(Str(uri.as_bytes()));
                            }
                            LinkTarget::Page(number) => {
                                let index = number.saturating_sub(1).min(n - 1);
                                annot
                                    .action()
                                    .action_type(ActionType::GoTo)
                                    .destination()
                                    .page(page_ids[index])
                                    .xyz(0.0, pages[index].size.height, None);
                            }
                        }
                        annot_ref
                    })
                    .collect()
            })
            .collect();

        let tagged = self.structure.as_ref().is_some_and(|s| !s.is_empty());
        let struct_tree_root = match self.structure.take() {
            Some(tree) if !tree.is_empty() => Some(self.write_structure(&tree, &pages, &page_ids)),
            _ => None,
        };

        for (i, page) in pages.iter().enumerate() {
            let mut page_writer = self.pdf.page(page_ids[i]);
            page_writer
                .media_box(pdf_writer::Rect::new(0.0, 0.0, page.size.width, page.size.height))
                .parent(pages_id)
                .contents(content_ids[i]);
            if !page_annot_refs[i].is_empty() {
                page_writer.annotations(page_annot_refs[i].iter().copied());
            }
            if tagged {
                page_writer.struct_parents(i as i32);
                if !page_annot_refs[i].is_empty() {
                    page_writer.tab_order(TabOrder::StructureOrder);
                }
            }
            let mut resources = page_writer.resources();
            if !font_pairs.is_empty() {
                let mut fonts = resources.fonts();
                for (name, font_ref) in &font_pairs {
                    fonts.pair(Name(name.as_bytes()), *font_ref);
                }
            }
            if !self.x_objects.is_empty() {
                let mut x_objects = resources.x_objects();
                for (name, r) in &self.x_objects {
                    x_objects.pair(Name(name.as_bytes()), *r);
                }
            }
            if !self.ext_gstate_refs.is_empty() {
                let mut states = resources.ext_g_states();
                for (name, r) in &self.ext_gstate_refs {
                    states.pair(Name(name.as_bytes()), *r);
                }
            }
            if !self.shadings.is_empty() {
                let mut shadings = resources.shadings();
                for (name, r) in &self.shadings {
                    shadings.pair(Name(name.as_bytes()), *r);
                }
            }
        }

        for (i, page) in pages.into_iter().enumerate() {
            let raw = page.content.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
            self.pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
        }

        self.pdf.pages(pages_id).kids(page_ids.iter().copied()).count(n as i32);

        {
            let mut catalog = self.pdf.catalog(catalog_id);
            catalog.pages(pages_id);
            if let Some(root) = struct_tree_root {
                catalog.pair(Name(b"StructTreeRoot"), root);
                catalog.mark_info().marked(true);
            }
            if let Some(lang) = &self.metadata.language {
                catalog.lang(TextStr(lang));
            }
            if self.metadata.title.is_some() {
                catalog.viewer_preferences().display_doc_title(true);
            }
        }

        let info_id = self.alloc.bump();
        let mut info = self.pdf.document_info(info_id);
        info.producer(TextStr(concat!("laidout-pdf ", env!("CARGO_PKG_VERSION"))));
        if let Some(title) = &self.metadata.title {
            info.title(TextStr(title));
        }
        info.finish();

        log::debug!(
            "PDF assembly: {} pages, {} fonts, {} images, {:.1}ms",
            n,
            font_pairs.len(),
            self.x_objects.len(),
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(self.pdf.finish())
    }

    fn write_structure(
        &mut self,
        tree: &StructureTree,
        pages: &[PageRecord],
        page_ids: &[Ref],
    ) -> Ref {
        let tree_root_ref = self.alloc.bump();
        let element_refs: Vec<Ref> = (0..tree.len()).map(|_| self.alloc.bump()).collect();
        let root = ElementId(0);

        // Spans nobody claimed still need a parent; they hang off the root element.
        let mut owned = vec![false; self.spans.len()];
        let mut span_parent: HashMap<SpanId, Ref> = HashMap::new();
        for id in tree.depth_first() {
            for span in tree.content_children(id) {
                if let Some(flag) = owned.get_mut(span.0) {
                    *flag = true;
                }
                span_parent.entry(span).or_insert(element_refs[id.0]);
            }
        }
        let orphans: Vec<SpanId> = (0..self.spans.len())
            .filter(|&i| !owned[i] && !self.spans[i].parts.is_empty())
            .map(SpanId)
            .collect();
        for span in &orphans {
            span_parent.insert(*span, element_refs[root.0]);
        }

        for id in tree.depth_first() {
            let element = tree.get(id);
            let mut writer = self.pdf.struct_element(element_refs[id.0]);
            writer.custom_kind(Name(element.name.as_bytes()));
            writer.parent(match element.parent {
                Some(parent) => element_refs[parent.0],
                None => tree_root_ref,
            });
            let first_page = element
                .children
                .iter()
                .find_map(|child| match child {
                    StructureChild::Content(span) => self.spans[span.0].parts.first().map(|p| p.0),
                    StructureChild::Element(_) => None,
                });
            if let Some(page) = first_page {
                writer.page(page_ids[page]);
            }

            let mut children = writer.children();
            for child in &element.children {
                match *child {
                    StructureChild::Element(el) => {
                        children.struct_element(element_refs[el.0]);
                    }
                    StructureChild::Content(span) => {
                        write_span_parts(&mut children, &self.spans[span.0].parts, page_ids)
                    }
                }
            }
            if id == root {
                for &span in &orphans {
                    write_span_parts(&mut children, &self.spans[span.0].parts, page_ids);
                }
            }
        }

        let mut dict = self.pdf.indirect(tree_root_ref).start::<Dict>();
        dict.pair(Name(b"Type"), Name(b"StructTreeRoot"));
        dict.insert(Name(b"K")).array().item(element_refs[root.0]);
        let mut parent_tree = dict.insert(Name(b"ParentTree")).start::<NumberTree<Ref>>();
        let mut nums = parent_tree.nums();
        let mut list_refs = Vec::with_capacity(pages.len());
        for (i, _) in pages.iter().enumerate() {
            let list_ref = self.alloc.bump();
            nums.insert(i as i32, list_ref);
            list_refs.push(list_ref);
        }
        nums.finish();
        parent_tree.finish();
        dict.pair(Name(b"ParentTreeNextKey"), pages.len() as i32);
        dict.finish();

        for (page, list_ref) in pages.iter().zip(list_refs) {
            let mut refs = self.pdf.indirect(list_ref).array();
            for span in &page.mcid_owners {
                refs.item(span_parent.get(span).copied().unwrap_or(element_refs[root.0]));
            }
        }

        tree_root_ref
    }
}

fn write_span_parts(children: &mut StructChildren<'_>, parts: &[(usize, i32)], page_ids: &[Ref]) {
    for &(page, mcid) in parts {
        children
            .marked_content_ref()
            .marked_content_id(mcid)
            .page(page_ids[page]);
    }
}

fn write_path(content: &mut Content, path: &PathData) {
    for op in &path.ops {
        match *op {
            PathOp::MoveTo(x, y) => {
                content.move_to(x, y);
            }
            PathOp::LineTo(x, y) => {
                content.line_to(x, y);
            }
            PathOp::CubicTo(x1, y1, x2, y2, x3, y3) => {
                content.cubic_to(x1, y1, x2, y2, x3, y3);
            }
            PathOp::Close => {
                content.close_path();
            }
        }
    }
}

fn apply_stroke_style(content: &mut Content, stroke: &Stroke) {
    let [r, g, b] = stroke.color.to_unit();
    content.set_stroke_rgb(r, g, b);
    content.set_line_width(stroke.width);
    content.set_line_join(match stroke.join {
        LineJoin::Miter => LineJoinStyle::MiterJoin,
        LineJoin::Round => LineJoinStyle::RoundJoin,
        LineJoin::Bevel => LineJoinStyle::BevelJoin,
    });
    content.set_line_cap(match stroke.cap {
        LineCap::Butt => LineCapStyle::ButtCap,
        LineCap::Round => LineCapStyle::RoundCap,
        LineCap::Square => LineCapStyle::ProjectingSquareCap,
    });
    if let Some(dash) = stroke.dash {
        content.set_dash_pattern([dash.on, dash.off], dash.phase);
    }
}

fn load_image_bytes(src: &str) -> Result<Vec<u8>> {
    if let Some(rest) = src.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::Image("malformed data URI".to_string()))?;
        if meta.ends_with(";base64") {
            return base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| Error::Image(format!("data URI: {e}")));
        }
        return Ok(payload.as_bytes().to_vec());
    }
    std::fs::read(src).map_err(|e| Error::Image(format!("{src}: {e}")))
}

fn short_src(src: &str) -> &str {
    if src.starts_with("data:") {
        src.split(',').next().unwrap_or("data:")
    } else {
        src
    }
}

impl Backend for PdfBackend<'_> {
    fn page_size(&self) -> Size {
        self.next_size
    }

    fn set_page_size(&mut self, size: Size) {
        self.next_size = size;
    }

    fn add_page(&mut self) {
        self.suspend_part();
        let size = self.next_size;
        let mut content = Content::new();
        content.transform([1.0, 0.0, 0.0, -1.0, 0.0, size.height]);
        self.pages.push(PageRecord {
            size,
            content,
            links: Vec::new(),
            mcid_owners: Vec::new(),
        });
        log::debug!("Page {}: {}x{}", self.pages.len(), size.width, size.height);
    }

    fn end_page(&mut self) {
        self.suspend_part();
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save_state(&mut self) {
        self.suspend_part();
        if let Some(page) = self.current() {
            page.content.save_state();
        }
    }

    fn restore_state(&mut self) {
        self.suspend_part();
        if let Some(page) = self.current() {
            page.content.restore_state();
        }
    }

    fn transform(&mut self, matrix: [f32; 6]) {
        if let Some(page) = self.current() {
            page.content.transform(matrix);
        }
    }

    fn clip_rect(&mut self, rect: Rect) {
        if let Some(page) = self.current() {
            page.content.rect(rect.x, rect.y, rect.width, rect.height);
            page.content.clip_nonzero();
            page.content.end_path();
        }
    }

    fn draw_path(&mut self, path: &PathData, fill: Option<&Fill>, stroke: Option<&Stroke>) {
        if path.is_empty() || (fill.is_none() && stroke.is_none()) || self.pages.is_empty() {
            return;
        }
        self.ensure_part();
        let gs = self.ext_gstate(
            fill.map_or(1.0, |f| f.opacity),
            stroke.map_or(1.0, |s| s.opacity),
        );

        // Gradients are painted through a clip, so the stroke goes separately.
        if let Some(Fill {
            paint: Paint::LinearGradient { start, end, stops },
            even_odd,
            ..
        }) = fill
        {
            let shading = self.shading(*start, *end, stops);
            let Some(page) = self.current() else { return };
            let content = &mut page.content;
            content.save_state();
            if let Some(gs) = &gs {
                content.set_parameters(Name(gs.as_bytes()));
            }
            if let Some(shading) = &shading {
                content.save_state();
                write_path(content, path);
                if *even_odd {
                    content.clip_even_odd();
                } else {
                    content.clip_nonzero();
                }
                content.end_path();
                content.shading(Name(shading.as_bytes()));
                content.restore_state();
            }
            if let Some(stroke) = stroke {
                apply_stroke_style(content, stroke);
                write_path(content, path);
                content.stroke();
            }
            content.restore_state();
            return;
        }

        let Some(page) = self.current() else { return };
        let content = &mut page.content;
        content.save_state();
        if let Some(gs) = &gs {
            content.set_parameters(Name(gs.as_bytes()));
        }
        if let Some(Fill {
            paint: Paint::Solid(color),
            ..
        }) = fill
        {
            let [r, g, b] = color.to_unit();
            content.set_fill_rgb(r, g, b);
        }
        if let Some(stroke) = stroke {
            apply_stroke_style(content, stroke);
        }
        write_path(content, path);
        let even_odd = fill.is_some_and(|f| f.even_odd);
        match (fill.is_some(), stroke.is_some(), even_odd) {
            (true, true, false) => content.fill_nonzero_and_stroke(),
            (true, true, true) => content.fill_even_odd_and_stroke(),
            (true, false, false) => content.fill_nonzero(),
            (true, false, true) => content.fill_even_odd(),
            _ => content.stroke(),
        };
        content.restore_state();
    }

    fn draw_text(&mut self, run: &TextRun<'_>) {
        if run.text.is_empty() || self.pages.is_empty() {
            return;
        }
        self.ensure_part();
        let gs = self.ext_gstate(run.opacity, 1.0);
        let fonts = self.fonts;
        let face = fonts.face(run.font);
        let slot = self.font_slot(run.font);
        let bytes = encode_text(face, run.text, &mut slot.usage);
        let font_name = slot.name.clone();

        let Some(page) = self.current() else { return };
        let content = &mut page.content;
        if let Some(gs) = &gs {
            content.save_state();
            content.set_parameters(Name(gs.as_bytes()));
        }
        let [r, g, b] = run.color.to_unit();
        content.set_fill_rgb(r, g, b);
        content.begin_text();
        content.set_font(Name(font_name.as_bytes()), run.size);
        if run.char_spacing != 0.0 {
            content.set_char_spacing(run.char_spacing);
        }
        // Text space is flipped back so glyphs stay upright.
        content.set_text_matrix([1.0, 0.0, 0.0, -1.0, run.x, run.baseline]);
        content.show(Str(&bytes));
        content.end_text();
        if gs.is_some() {
            content.restore_state();
        }
    }

    fn draw_image(&mut self, rect: Rect, src: &str, opacity: f32) -> Result<()> {
        if self.pages.is_empty() {
            return Ok(());
        }
        let name = self.embed_image(src)?;
        self.ensure_part();
        let gs = self.ext_gstate(opacity, opacity);
        if let Some(page) = self.current() {
            let content = &mut page.content;
            content.save_state();
            if let Some(gs) = &gs {
                content.set_parameters(Name(gs.as_bytes()));
            }
            content.transform([rect.width, 0.0, 0.0, -rect.height, rect.x, rect.y + rect.height]);
            content.x_object(Name(name.as_bytes()));
            content.restore_state();
        }
        Ok(())
    }

    fn draw_svg(&mut self, rect: Rect, svg: &str, fonts: FontResolver<'_>) -> Result<()> {
        let tree = super::svg::parse_svg(svg, fonts)?;
        super::svg::render_tree(&tree, rect, self);
        Ok(())
    }

    fn link_uri(&mut self, rect: Rect, uri: &str) {
        let rect = self.to_pdf_rect(rect);
        if let Some(page) = self.current() {
            page.links.push((rect, LinkTarget::Uri(uri.to_string())));
        }
    }

    fn link_page(&mut self, rect: Rect, page_number: usize) {
        let rect = self.to_pdf_rect(rect);
        if let Some(page) = self.current() {
            page.links.push((rect, LinkTarget::Page(page_number)));
        }
    }

    fn begin_span(&mut self, tag: &str) -> SpanId {
        let span = SpanId(self.spans.len());
        self.spans.push(SpanRecord {
            tag: tag.to_string(),
            parts: Vec::new(),
        });
        self.suspend_part();
        self.open_spans.push(span);
        span
    }

    fn end_span(&mut self, span: SpanId) {
        match self.open_spans.iter().rposition(|&s| s == span) {
            Some(pos) if pos + 1 == self.open_spans.len() => {
                self.suspend_part();
                self.open_spans.pop();
            }
            Some(pos) => {
                self.open_spans.remove(pos);
            }
            None => log::warn!("Ending span {} which is not open", span.0),
        }
    }

    fn begin_artifact(&mut self) {
        self.suspend_part();
        if let Some(page) = self.current() {
            page.content.begin_marked_content(Name(b"Artifact"));
            self.in_artifact = true;
        }
    }

    fn end_artifact(&mut self) {
        if !self.in_artifact {
            return;
        }
        if let Some(page) = self.pages.last_mut() {
            page.content.end_marked_content();
        }
        self.in_artifact = false;
    }

    fn finish_structure(&mut self, tree: &StructureTree) {
        self.structure = Some(tree.clone());
    }
}
