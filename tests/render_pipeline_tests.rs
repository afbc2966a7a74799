//! End-to-end render scenarios: admit, fan out, merge, terminalize.

mod common;

use common::fixtures::{a4_source, metadata_json, serial_metadata};
use common::pdf_assertions::{assert_page_contains, page_count};
use imprint::JobStatus;
use imprint_traits::BlobStore as _;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn admit_render_merge_produces_final_artifact() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("TICKET BODY"))
        .await
        .unwrap();

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 2))
        .await
        .unwrap();
    assert!(outcome.accepted);

    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress, 100);

    let key = job.output.key.as_deref().unwrap();
    assert_eq!(key, format!("documents/final/{}.pdf", outcome.job_id));
    assert!(job.output.url.is_some());
    assert!(job.output.expires_at.is_some());

    let bytes = h.blobs.get(key).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert_eq!(page_count(&bytes), 2);
    assert_page_contains(&bytes, 0, "A001");
    assert_page_contains(&bytes, 1, "A002");
}

#[tokio::test(flavor = "multi_thread")]
async fn single_page_job_still_goes_through_merge() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("ONE"))
        .await
        .unwrap();

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 1))
        .await
        .unwrap();
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    let bytes = h.blobs.get(job.output.key.as_deref().unwrap()).await.unwrap();
    assert_eq!(page_count(&bytes), 1);
    assert_page_contains(&bytes, 0, "A001");
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_reaches_terminal_and_audit_is_ordered() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("AUDIT"))
        .await
        .unwrap();

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 3))
        .await
        .unwrap();
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.rendered_pages, 3);

    let events: Vec<_> = job.audit.iter().map(|e| e.event).collect();
    use imprint_types::AuditEvent::*;
    assert_eq!(events.first(), Some(&JobCreated));
    assert!(events.contains(&JobEnqueued));
    assert!(events.iter().filter(|e| **e == PageRendered).count() == 3);
    assert!(events.contains(&JobDone));
    assert!(events.contains(&MergeTime));
    // Timestamps never go backwards.
    assert!(job.audit.windows(2).all(|w| w[0].at <= w[1].at));
}

#[tokio::test(flavor = "multi_thread")]
async fn document_reference_sources_resolve_through_the_store() {
    let h = common::harness();
    h.blobs
        .put("documents/original/stored.pdf", a4_source("STORED DOC"))
        .await
        .unwrap();
    h.store.put_document(imprint::DocumentRecord {
        id: "doc-7".into(),
        title: "Stored".into(),
        blob_key: "documents/original/stored.pdf".into(),
        mime: "application/pdf".into(),
        color_mode: imprint::ColorMode::Rgb,
        export_version: 1,
    });

    let outcome = h
        .service
        .submit("admin", serial_metadata("document:doc-7", 1))
        .await
        .unwrap();
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_source_fails_the_job_and_releases_the_lock() {
    let h = common::harness();

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/absent.pdf", 1))
        .await
        .unwrap();
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(!error.message.is_empty());
    assert!(job.audit.iter().any(|e| e.event == imprint_types::AuditEvent::JobFailed));

    // The lock is gone: a new submission for the same document is accepted.
    h.blobs
        .put("documents/original/absent.pdf", a4_source("NOW PRESENT"))
        .await
        .unwrap();
    let retry = h
        .service
        .submit("admin", serial_metadata("documents/original/absent.pdf", 1))
        .await
        .unwrap();
    assert!(retry.accepted);
    h.service.drain().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn output_url_is_served_for_done_jobs_only_while_live() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("URL"))
        .await
        .unwrap();

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 1))
        .await
        .unwrap();

    h.service.drain().await;
    let url = h
        .service
        .job_output_url(&outcome.job_id, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(url.is_some());

    // Expire the output: the reaper clears it and the URL disappears.
    h.store.mutate_job_raw(&outcome.job_id, |job| {
        job.output.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
    });
    h.service.run_reaper_once().await.unwrap();
    let url = h
        .service
        .job_output_url(&outcome.job_id, Duration::from_secs(60))
        .await
        .unwrap();
    assert!(url.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn watermarked_render_carries_the_overlay_text() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("BODY"))
        .await
        .unwrap();

    let metadata = metadata_json(serde_json::json!({
        "sourcePdfKey": "documents/original/t.pdf",
        "ticketCrop": {
            "pageIndex": 0, "xRatio": 0.0, "yRatio": 0.0,
            "widthRatio": 1.0, "heightRatio": 0.5
        },
        "layout": { "pageSize": "A4", "totalPages": 1, "repeatPerPage": 2 },
        "series": [{
            "id": "s", "prefix": "N", "padLength": 4, "start": 10, "step": 5,
            "font": "Helvetica", "fontSize": 10,
            "slots": [{ "xRatio": 0.2, "yRatio": 0.2 }]
        }],
        "watermarks": [
            {
                "type": "text", "id": "w1", "value": "SPECIMEN",
                "fontFamily": "Helvetica", "fontSize": 30, "opacity": 0.4,
                "rotate": -30, "position": { "x": 0.5, "y": 0.5 },
                "relativeTo": "object", "color": "#FF0000"
            },
            {
                "type": "svg", "id": "w2",
                "svgPath": "<svg viewBox=\"0 0 10 10\"><rect width=\"10\" height=\"10\" fill=\"#00FF00\"/></svg>",
                "opacity": 0.5, "rotate": 0,
                "position": { "x": 0.1, "y": 0.1 }, "relativeTo": "object", "scale": 1
            }
        ]
    }));

    let outcome = h.service.submit("admin", metadata).await.unwrap();
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    let bytes = h.blobs.get(job.output.key.as_deref().unwrap()).await.unwrap();
    // Two slots: both serials and both watermark copies.
    assert_page_contains(&bytes, 0, "N0010");
    assert_page_contains(&bytes, 0, "N0015");
    assert_page_contains(&bytes, 0, "SPECIMEN");
}
