//! Admission semantics: lock exclusivity, throttling, validation bounds.

mod common;

use common::fixtures::{a4_source, metadata_json, serial_metadata};
use imprint::{RenderConfig, SchedulerError};
use imprint_traits::BlobStore as _;

#[tokio::test(flavor = "multi_thread")]
async fn second_submission_returns_the_holder_job() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("BUSY"))
        .await
        .unwrap();

    // A render is already in flight for this document.
    use imprint_traits::{KvCache as _, LockAcquire};
    let held = h
        .kv
        .acquire_render_lock(
            "documents/original/t.pdf",
            "existing-job",
            std::time::Duration::from_secs(60),
            0,
        )
        .await
        .unwrap();
    assert_eq!(held, LockAcquire::Acquired);

    // Both rapid submissions come back with the holder's id.
    for _ in 0..2 {
        let outcome = h
            .service
            .submit("admin", serial_metadata("documents/original/t.pdf", 4))
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.job_id, "existing-job");
    }

    // Once released, admission accepts again.
    h.kv
        .release_render_lock("documents/original/t.pdf", "existing-job")
        .await
        .unwrap();
    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 4))
        .await
        .unwrap();
    assert!(outcome.accepted);
    h.service.drain().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn active_cap_throttles_other_documents() {
    let h = common::harness_with_config(RenderConfig {
        max_active_jobs: 1,
        ..RenderConfig::default()
    });
    h.blobs
        .put("documents/original/b.pdf", a4_source("B"))
        .await
        .unwrap();

    // One job is RUNNING somewhere in the fleet.
    use imprint_traits::KvCache as _;
    h.kv
        .acquire_render_lock(
            "documents/original/a.pdf",
            "running-job",
            std::time::Duration::from_secs(60),
            1,
        )
        .await
        .unwrap();

    let err = h
        .service
        .submit("admin", serial_metadata("documents/original/b.pdf", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Throttled { active: 1 }));

    // Capacity frees when the active job releases.
    h.kv
        .release_render_lock("documents/original/a.pdf", "running-job")
        .await
        .unwrap();
    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/b.pdf", 1))
        .await
        .unwrap();
    assert!(outcome.accepted);
    h.service.drain().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn page_cap_is_enforced_at_the_boundary() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("CAP"))
        .await
        .unwrap();

    // max_pages + 1 is rejected before anything is enqueued.
    let mut metadata = serial_metadata("documents/original/t.pdf", 701);
    let err = h.service.submit("admin", metadata.clone()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));
    assert!(!h.kv.has_string("vector:render:lock:documents/original/t.pdf"));

    // Exactly max_pages clears validation (not driven to completion here:
    // the series end stays within bounds and admission accepts).
    metadata.layout.total_pages = 700;
    let outcome = h.service.submit("admin", metadata).await.unwrap();
    assert!(outcome.accepted);
    h.service.drain().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn series_end_cap_is_enforced_at_the_boundary() {
    let h = common::harness();

    let metadata = |start: i64| {
        metadata_json(serde_json::json!({
            "sourcePdfKey": "documents/original/t.pdf",
            "ticketCrop": {
                "pageIndex": 0, "xRatio": 0.0, "yRatio": 0.0,
                "widthRatio": 1.0, "heightRatio": 1.0
            },
            "layout": { "pageSize": "A4", "totalPages": 2, "repeatPerPage": 1 },
            "series": [{
                "id": "s", "start": start, "step": 1,
                "font": "Helvetica", "fontSize": 12,
                "slots": [{ "xRatio": 0.1, "yRatio": 0.1 }]
            }]
        }))
    };
    h.blobs
        .put("documents/original/t.pdf", a4_source("SER"))
        .await
        .unwrap();

    // End lands exactly on the cap: accepted.
    let ok = h
        .service
        .submit("admin", metadata(1_000_000_000 - 1))
        .await
        .unwrap();
    assert!(ok.accepted);
    h.service.drain().await;

    // One further: rejected.
    let err = h.service.submit("admin", metadata(1_000_000_000)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_metadata_never_enqueues() {
    let h = common::harness();

    let bad = metadata_json(serde_json::json!({
        "sourcePdfKey": "documents/original/t.pdf",
        "ticketCrop": {
            "pageIndex": 0, "xRatio": 0.1, "yRatio": 0.1,
            "widthRatio": 0.0, "heightRatio": 0.4
        },
        "layout": { "pageSize": "A4", "totalPages": 2, "repeatPerPage": 1 }
    }));
    let err = h.service.submit("admin", bad).await.unwrap_err();
    let SchedulerError::Validation(issues) = err else {
        panic!("expected validation failure");
    };
    assert!(issues.iter().any(|i| i.field == "ticketCrop.widthRatio"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_outage_admits_without_exclusivity() {
    let h = common::harness();
    h.blobs
        .put("documents/original/t.pdf", a4_source("NOLOCK"))
        .await
        .unwrap();
    h.kv.set_unavailable(true);

    let outcome = h
        .service
        .submit("admin", serial_metadata("documents/original/t.pdf", 1))
        .await
        .unwrap();
    assert!(outcome.accepted);
    h.service.drain().await;

    let job = h.service.job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, imprint::JobStatus::Done);
}
