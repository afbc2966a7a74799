use imprint::{PrintService, RenderConfig, VectorMetadata};
use imprint_traits::BlobStore;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::io::Cursor;
use std::sync::Arc;

/// A simple local demonstration: wires the in-memory collaborators, submits a
/// two-page render against a synthesized source document, and reports the
/// terminal job state.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let blobs = Arc::new(imprint_traits::InMemoryBlobStore::new());
    let store = Arc::new(imprint_traits::InMemoryMetadataStore::new());
    let kv = Arc::new(imprint_traits::InMemoryKvCache::new());

    blobs
        .put("documents/original/demo.pdf", sample_source_pdf("IMPRINT DEMO TICKET"))
        .await?;

    let service = PrintService::builder()
        .with_config(RenderConfig::from_env())
        .with_mac_secret("imprint-demo-secret")
        .with_blob_store(blobs.clone())
        .with_metadata_store(store)
        .with_kv_cache(kv)
        .build()?;

    let metadata: VectorMetadata = serde_json::from_value(serde_json::json!({
        "sourcePdfKey": "documents/original/demo.pdf",
        "ticketCrop": {
            "pageIndex": 0, "xRatio": 0.1, "yRatio": 0.1,
            "widthRatio": 0.8, "heightRatio": 0.6
        },
        "layout": { "pageSize": "A4", "totalPages": 2, "repeatPerPage": 2 },
        "series": [{
            "id": "serials", "prefix": "A", "padLength": 3, "start": 1, "step": 1,
            "font": "Helvetica", "fontSize": 12,
            "slots": [{ "xRatio": 0.1, "yRatio": 0.1 }]
        }],
        "watermarks": [{
            "type": "text", "id": "draft", "value": "DRAFT",
            "fontFamily": "Helvetica", "fontSize": 24, "opacity": 0.3,
            "rotate": -30, "position": { "x": 0.5, "y": 0.5 },
            "relativeTo": "object"
        }]
    }))?;

    println!("Submitting render job...");
    let outcome = service.submit("demo-admin", metadata).await?;
    println!("Admitted as job {}", outcome.job_id);

    service.drain().await;

    match service.job_status(&outcome.job_id).await? {
        Some(job) => {
            println!("Job finished: status={:?} progress={}", job.status, job.progress);
            if let Some(key) = &job.output.key {
                let bytes = blobs.get(key).await?;
                println!("Output at {key}: {} bytes", bytes.len());
            }
        }
        None => println!("Job record vanished (unexpected)"),
    }
    Ok(())
}

/// Builds a single-page A4 source PDF with one line of Helvetica text.
fn sample_source_pdf(text: &str) -> Vec<u8> {
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
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 760.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.encode().unwrap_or_default(),
    )));
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.28f32.into(), 841.89f32.into()],
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
    doc.save_to(&mut cursor).unwrap_or_default();
    cursor.into_inner()
}
