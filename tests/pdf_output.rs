use laidout_pdf::{DocumentDefinition, Error, Overrides, render_document, render_document_file};
use serde_json::json;

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}

fn table_document() -> serde_json::Value {
    let line = |text: &str, y: f32, tags: serde_json::Value, starts: bool, ends: bool| {
        json!({
            "type": "line",
            "item": {
                "x": 40, "y": y, "height": 14, "ascenderHeight": 11,
                "inlines": [{ "text": text, "font": "Helvetica", "fontSize": 12, "width": 60 }],
                "tags": tags, "startsNode": starts, "endsNode": ends
            }
        })
    };
    json!({
        "pageSize": "A4",
        "title": "Quarterly report",
        "language": "en-US",
        "pages": [
            { "items": [
                line("Quarterly report", 40.0, json!(["H1", "/H1"]), true, true),
                line("Region", 780.0, json!(["Table", "TR", "TH"]), true, false),
                line("", 794.0, json!(["/TH"]), false, true),
                { "type": "vector", "item": {
                    "type": "rect", "x": 40, "y": 100, "w": 200, "h": 20,
                    "linearGradient": ["#ff0000", "#0000ff"]
                } }
            ] },
            { "orientation": "landscape", "items": [
                line("", 40.0, json!([{ "onetime": 1 }]), false, true),
                line("North", 40.0, json!(["TR", "TD"]), true, false),
                line("", 54.0, json!(["/TD", "/TR", "/Table"]), false, true)
            ] }
        ]
    })
}

#[test]
fn tagged_document_has_structure_tree() {
    let _ = env_logger::try_init();
    let doc = DocumentDefinition::from_json(&table_document().to_string()).expect("definition");
    let (bytes, outcome) = render_document(&doc).expect("render");

    assert!(bytes.starts_with(b"%PDF-"));
    assert!(contains(&bytes, "/StructTreeRoot"));
    assert!(contains(&bytes, "/MarkInfo"));
    assert!(contains(&bytes, "/ParentTree"));
    assert!(contains(&bytes, "/Lang"));
    assert!(contains(&bytes, "/Table"));
    assert!(contains(&bytes, "/ShadingType"));
    assert_eq!(outcome.pages_rendered, 2);
    assert_eq!(
        outcome.structure.map(|s| s.outline()).as_deref(),
        Some("Document(H1 Table(TR(TH) TR(TD)))")
    );
}

#[test]
fn untagged_document_has_no_structure_tree() {
    let _ = env_logger::try_init();
    let mut doc = DocumentDefinition::from_json(&table_document().to_string()).expect("definition");
    doc.apply(&Overrides {
        tagged: Some(false),
        ..Default::default()
    });
    let (bytes, outcome) = render_document(&doc).expect("render");

    assert!(bytes.starts_with(b"%PDF-"));
    assert!(!contains(&bytes, "/StructTreeRoot"));
    assert!(!contains(&bytes, "/MarkInfo"));
    assert!(outcome.structure.is_none());
}

#[test]
fn auto_height_sets_single_page_height() {
    let _ = env_logger::try_init();
    let doc = DocumentDefinition::from_json(
        &json!({
            "pageSize": { "width": 300, "height": "auto" },
            "pageMargins": 40,
            "pages": [{ "items": [
                { "type": "line", "item": { "x": 40, "y": 100, "height": 50, "ascenderHeight": 40 } },
                { "type": "line", "item": { "x": 40, "y": 300, "height": 20, "ascenderHeight": 16 } },
                { "type": "line", "item": { "x": 40, "y": 10, "height": 5, "ascenderHeight": 4 } }
            ] }]
        })
        .to_string(),
    )
    .expect("definition");
    let (bytes, _) = render_document(&doc).expect("render");
    assert!(contains(&bytes, "/MediaBox [0 0 300 360]"));
}

#[test]
fn unknown_page_size_fails() {
    let _ = env_logger::try_init();
    let doc = DocumentDefinition::from_json(r#"{ "pageSize": "Napkin", "pages": [] }"#).expect("definition");
    assert!(matches!(render_document(&doc), Err(Error::Config(_))));
}

#[test]
fn renders_definition_file_to_disk() {
    let _ = env_logger::try_init();
    let dir = std::env::temp_dir().join(format!("laidout-pdf-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let input = dir.join("report.json");
    let output = dir.join("report.pdf");
    std::fs::write(&input, table_document().to_string()).expect("write input");

    let outcome = render_document_file(&input, &output, &Overrides::default()).expect("render");
    let bytes = std::fs::read(&output).expect("read output");

    assert!(bytes.starts_with(b"%PDF-"));
    assert_eq!(outcome.pages_rendered, 2);
    let _ = std::fs::remove_dir_all(&dir);
}
