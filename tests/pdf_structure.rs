mod common;

use std::collections::BTreeMap;

use common::tagged_line;
use laidout_pdf::{DocumentDefinition, render_document};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use serde_json::{Value, json};

enum Frame {
    State,
    Marked(String, Option<i64>),
}

/// A string shown on a page and the marked-content sequences around it,
/// outermost first.
#[derive(Debug, PartialEq)]
struct ShownText {
    text: String,
    marks: Vec<(String, Option<i64>)>,
}

fn render(definition: Value) -> Document {
    let _ = env_logger::try_init();
    let doc = DocumentDefinition::from_json(&definition.to_string()).expect("definition");
    let (bytes, _) = render_document(&doc).expect("render");
    Document::load_mem(&bytes).expect("output parses")
}

fn page_content(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let page = doc.get_dictionary(page_id).expect("page dictionary");
    let contents = page.get(b"Contents").expect("page has contents");
    let stream_id = contents.as_reference().expect("single content stream");
    match doc.get_object(stream_id).expect("content object") {
        Object::Stream(s) => s.decompressed_content().unwrap_or_else(|_| s.content.clone()),
        other => panic!("content is not a stream: {other:?}"),
    }
}

/// Walk a page's operators, checking that q/Q and BDC/BMC/EMC nest inside
/// each other, and collect every shown string with its enclosing marks.
fn scan_page(doc: &Document, page_id: ObjectId) -> Vec<ShownText> {
    let content = Content::decode(&page_content(doc, page_id)).expect("content decodes");
    let mut stack: Vec<Frame> = Vec::new();
    let mut shown = Vec::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => stack.push(Frame::State),
            "Q" => assert!(
                matches!(stack.pop(), Some(Frame::State)),
                "Q does not close a q: {:?}",
                op
            ),
            "BDC" | "BMC" => {
                let tag = op.operands[0].as_name().expect("marked-content tag");
                let mcid = op
                    .operands
                    .get(1)
                    .and_then(|o| o.as_dict().ok())
                    .and_then(|d| d.get(b"MCID").ok())
                    .and_then(|o| o.as_i64().ok());
                stack.push(Frame::Marked(String::from_utf8_lossy(tag).into_owned(), mcid));
            }
            "EMC" => assert!(
                matches!(stack.pop(), Some(Frame::Marked(..))),
                "EMC does not close a marked-content sequence"
            ),
            "Tj" => {
                let text = match &op.operands[0] {
                    Object::String(bytes, _) => String::from_utf8_lossy(bytes).into_owned(),
                    other => panic!("unexpected Tj operand {other:?}"),
                };
                let marks = stack
                    .iter()
                    .filter_map(|f| match f {
                        Frame::Marked(tag, mcid) => Some((tag.clone(), *mcid)),
                        Frame::State => None,
                    })
                    .collect();
                shown.push(ShownText { text, marks });
            }
            _ => {}
        }
    }
    assert!(stack.is_empty(), "page ends with open q or marked content");
    shown
}

fn shown(text: &str, marks: &[(&str, Option<i64>)]) -> ShownText {
    ShownText {
        text: text.to_string(),
        marks: marks.iter().map(|(t, m)| (t.to_string(), *m)).collect(),
    }
}

fn struct_type(doc: &Document, element: ObjectId) -> String {
    let dict = doc.get_dictionary(element).expect("structure element");
    let name = dict.get(b"S").and_then(Object::as_name).expect("element type");
    String::from_utf8_lossy(name).into_owned()
}

/// The ParentTree as page key -> element owning each MCID.
fn parent_tree(doc: &Document) -> BTreeMap<i64, Vec<ObjectId>> {
    let root_id = doc
        .catalog()
        .and_then(|c| c.get(b"StructTreeRoot"))
        .and_then(Object::as_reference)
        .expect("catalog references the structure tree");
    let root = doc.get_dictionary(root_id).expect("structure tree root");
    let nums = root
        .get(b"ParentTree")
        .and_then(Object::as_dict)
        .and_then(|t| t.get(b"Nums"))
        .and_then(Object::as_array)
        .expect("parent tree nums");

    let mut out = BTreeMap::new();
    for pair in nums.chunks(2) {
        let key = pair[0].as_i64().expect("parent tree key");
        let list_id = pair[1].as_reference().expect("per-page array is indirect");
        let owners = doc
            .get_object(list_id)
            .and_then(Object::as_array)
            .expect("per-page owner array")
            .iter()
            .map(|o| o.as_reference().expect("owner reference"))
            .collect();
        out.insert(key, owners);
    }
    out
}

/// (page, MCID) of every marked-content reference among an element's kids.
fn content_refs(doc: &Document, element: ObjectId) -> Vec<(ObjectId, i64)> {
    let dict = doc.get_dictionary(element).expect("structure element");
    let Ok(kids) = dict.get(b"K").and_then(Object::as_array) else {
        return Vec::new();
    };
    kids.iter()
        .filter_map(|k| k.as_dict().ok())
        .filter_map(|mcr| {
            let page = mcr.get(b"Pg").and_then(Object::as_reference).ok()?;
            let mcid = mcr.get(b"MCID").and_then(Object::as_i64).ok()?;
            Some((page, mcid))
        })
        .collect()
}

fn struct_parents(doc: &Document, page_id: ObjectId) -> i64 {
    doc.get_dictionary(page_id)
        .and_then(|p| p.get(b"StructParents"))
        .and_then(Object::as_i64)
        .expect("page carries StructParents")
}

#[test]
fn page_end_closes_marked_content_before_clip_and_watermark() {
    let doc = render(json!({
        "pageSize": "A4",
        "pages": [
            {
                "watermark": {
                    "text": "DRAFT", "font": "Helvetica", "fontSize": 40, "angle": 45,
                    "renderedSize": { "width": 120, "height": 40 }
                },
                "items": [
                    { "type": "beginClip", "item": { "x": 0, "y": 0, "width": 500, "height": 800 } },
                    tagged_line("Para", 40.0, json!(["P"]), true, false)
                ]
            },
            { "items": [tagged_line("more", 40.0, json!(["/P"]), false, true)] }
        ]
    }));

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    assert_eq!(pages.len(), 2);

    // The clip is left open so it is restored at page end, after the EMC.
    assert_eq!(
        scan_page(&doc, pages[0]),
        vec![
            shown("Para", &[("P", Some(0))]),
            shown("DRAFT", &[("Artifact", None)]),
        ]
    );
    assert_eq!(scan_page(&doc, pages[1]), vec![shown("more", &[("P", Some(0))])]);

    // Both parts belong to the same P element.
    let tree = parent_tree(&doc);
    let first = &tree[&struct_parents(&doc, pages[0])];
    let second = &tree[&struct_parents(&doc, pages[1])];
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert_eq!(struct_type(&doc, first[0]), "P");
    assert_eq!(
        content_refs(&doc, first[0]),
        vec![(pages[0], 0), (pages[1], 0)]
    );
}

#[test]
fn parent_tree_matches_mcids_in_content() {
    let doc = render(json!({
        "pageSize": "A4",
        "pages": [{ "items": [
            tagged_line("a", 40.0, json!(["Sect", "P"]), true, false),
            tagged_line("b", 60.0, json!(["Span", "/Span"]), true, true),
            tagged_line("c", 80.0, json!(["/P"]), false, true),
            tagged_line("d", 100.0, json!(["/Sect"]), false, true),
            // Opens an element but closes nothing, so its content has no owner.
            tagged_line("e", 120.0, json!(["Note"]), true, true)
        ] }]
    }));

    let page = *doc.get_pages().values().next().expect("one page");
    let texts = scan_page(&doc, page);
    assert_eq!(
        texts,
        vec![
            shown("a", &[("P", Some(0))]),
            shown("b", &[("Span", Some(1))]),
            // P resumes under a fresh MCID once the Span ends.
            shown("c", &[("P", Some(2))]),
            shown("d", &[]),
            shown("e", &[("Note", Some(3))]),
        ]
    );

    let owners = &parent_tree(&doc)[&struct_parents(&doc, page)];
    let kinds: Vec<String> = owners.iter().map(|&id| struct_type(&doc, id)).collect();
    assert_eq!(kinds, vec!["P", "Span", "P", "Document"]);
    assert_eq!(owners[0], owners[2]);

    // Every MCID in the content appears exactly once among its owner's kids.
    for (mcid, &owner) in owners.iter().enumerate() {
        let refs = content_refs(&doc, owner);
        assert_eq!(
            refs.iter().filter(|&&r| r == (page, mcid as i64)).count(),
            1,
            "MCID {mcid} is not referenced by {}",
            struct_type(&doc, owner)
        );
    }
}
