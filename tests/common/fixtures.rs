//! Source documents and metadata payloads used across scenarios.

use imprint::VectorMetadata;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::io::Cursor;

/// A single-page source PDF with the given page size and one text run.
pub fn source_pdf(width: f64, height: f64, text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![40.into(), ((height - 60.0) as f32).into()]),
            Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.encode().unwrap_or_else(|e| panic!("content encode: {e}")),
    )));
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            0.into(), 0.into(),
            (width as f32).into(), (height as f32).into(),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut cursor = Cursor::new(Vec::new());
    doc.save_to(&mut cursor)
        .unwrap_or_else(|e| panic!("source pdf save: {e}"));
    cursor.into_inner()
}

/// An A4 source document.
pub fn a4_source(text: &str) -> Vec<u8> {
    source_pdf(595.28, 841.89, text)
}

/// The standard scenario metadata: two pages, one slot per page, a serial
/// series `A001, A002, …` and no watermarks.
pub fn serial_metadata(source_key: &str, total_pages: u32) -> VectorMetadata {
    metadata_json(serde_json::json!({
        "sourcePdfKey": source_key,
        "ticketCrop": {
            "pageIndex": 0, "xRatio": 0.1, "yRatio": 0.1,
            "widthRatio": 0.8, "heightRatio": 0.6
        },
        "layout": { "pageSize": "A4", "totalPages": total_pages, "repeatPerPage": 1 },
        "series": [{
            "id": "serials", "prefix": "A", "padLength": 3, "start": 1, "step": 1,
            "font": "Helvetica", "fontSize": 12,
            "slots": [{ "xRatio": 0.1, "yRatio": 0.1 }]
        }],
        "watermarks": []
    }))
}

pub fn metadata_json(value: serde_json::Value) -> VectorMetadata {
    serde_json::from_value(value).unwrap_or_else(|e| panic!("metadata fixture: {e}"))
}
