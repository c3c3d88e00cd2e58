mod common;

use common::{StorageCall, count_uploads, demo_request, harness, initiate_demo, part};
use std::sync::atomic::Ordering;
use video_uploads::{
    models::{
        principal::Principal,
        upload::{UploadStatus, Visibility},
    },
    services::{
        chunk_planner::DEFAULT_CHUNK_SIZE,
        upload_service::{InitiateUpload, ListFilter, UpdateUpload, UploadError},
    },
};

#[tokio::test]
async fn demo_upload_runs_from_initiate_to_completed() {
    let (service, storage) = harness().await;

    let initiated = initiate_demo(&service, 7).await;
    assert_eq!(initiated.chunk_size, DEFAULT_CHUNK_SIZE);
    assert_eq!(initiated.chunk_size, 104_857_600);
    assert_eq!(initiated.total_chunks, 3);
    assert_eq!(initiated.status, UploadStatus::Pending);
    assert_eq!(initiated.session_id, "session-1");
    assert!(initiated.object_key.starts_with("uploads/videos/7/"));
    assert!(initiated.object_key.ends_with(".mp4"));

    let parts = service
        .store
        .fetch_parts(initiated.record_id)
        .await
        .unwrap();
    let sizes: Vec<_> = parts.iter().map(|p| p.size_bytes).collect();
    assert_eq!(
        sizes,
        vec![
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_SIZE,
            250_000_000 - 2 * DEFAULT_CHUNK_SIZE
        ]
    );

    let urls = service
        .request_part_urls(Principal(7), initiated.record_id, &[1, 2, 3])
        .await
        .unwrap();
    assert_eq!(urls.len(), 3);

    let view = service
        .complete(
            Principal(7),
            initiated.record_id,
            vec![part(1, "e1"), part(2, "e2"), part(3, "e3")],
        )
        .await
        .unwrap();
    assert_eq!(view.status, UploadStatus::Completed);
    assert_eq!(view.progress, 100.0);
    assert!(view.completed_at.is_some());

    let stored = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, UploadStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert!(stored.completed_at.is_some());

    assert_eq!(storage.completes().len(), 1);
    assert!(storage.aborts().is_empty());
}

#[tokio::test]
async fn disallowed_mime_type_touches_nothing() {
    let (service, storage) = harness().await;

    let request = InitiateUpload {
        mime_type: "image/png".into(),
        ..demo_request()
    };
    let err = service.initiate(Principal(7), request).await.unwrap_err();

    assert!(matches!(err, UploadError::Validation(_)));
    assert_eq!(err.kind(), "validation_error");
    assert!(storage.calls().is_empty());
    assert_eq!(count_uploads(&service).await, 0);
}

#[tokio::test]
async fn invalid_metadata_is_rejected_before_storage() {
    let (service, storage) = harness().await;

    let cases = [
        InitiateUpload {
            title: "   ".into(),
            ..demo_request()
        },
        InitiateUpload {
            original_filename: String::new(),
            ..demo_request()
        },
        InitiateUpload {
            file_size: 0,
            ..demo_request()
        },
        InitiateUpload {
            file_size: 10 * 1024 * 1024 * 1024 + 1,
            ..demo_request()
        },
    ];

    for request in cases {
        let err = service.initiate(Principal(7), request).await.unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)), "{err:?}");
    }
    assert!(storage.calls().is_empty());
    assert_eq!(count_uploads(&service).await, 0);
}

#[tokio::test]
async fn mime_type_aliases_and_case_are_accepted() {
    let (service, _storage) = harness().await;

    for mime in ["video/quicktime", "VIDEO/WEBM", "video/x-matroska"] {
        let request = InitiateUpload {
            mime_type: mime.into(),
            ..demo_request()
        };
        service.initiate(Principal(7), request).await.unwrap();
    }
    assert_eq!(count_uploads(&service).await, 3);
}

#[tokio::test]
async fn storage_initiate_failure_persists_nothing() {
    let (service, storage) = harness().await;
    storage.fail_initiate.store(true, Ordering::SeqCst);

    let err = service
        .initiate(Principal(7), demo_request())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::StorageInit(_)));
    assert!(err.to_string().contains("backend unavailable"));
    assert_eq!(count_uploads(&service).await, 0);
    assert!(storage.aborts().is_empty());
}

#[tokio::test]
async fn persistence_failure_aborts_the_orphaned_session_once() {
    let (service, storage) = harness().await;
    sqlx::query("DROP TABLE upload_parts")
        .execute(&*service.store.db)
        .await
        .unwrap();

    let err = service
        .initiate(Principal(7), demo_request())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Store(_)));
    assert_eq!(err.kind(), "internal");

    let initiated_key = match &storage.calls()[0] {
        StorageCall::Initiate { key, .. } => key.clone(),
        other => panic!("unexpected first call {other:?}"),
    };
    assert_eq!(
        storage.aborts(),
        vec![StorageCall::Abort {
            key: initiated_key,
            session_id: "session-1".into(),
        }]
    );
    assert_eq!(count_uploads(&service).await, 0);
}

#[tokio::test]
async fn failing_cleanup_does_not_mask_persistence_error() {
    let (service, storage) = harness().await;
    storage.fail_abort.store(true, Ordering::SeqCst);
    sqlx::query("DROP TABLE upload_parts")
        .execute(&*service.store.db)
        .await
        .unwrap();

    let err = service
        .initiate(Principal(7), demo_request())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Store(_)));
    assert_eq!(storage.aborts().len(), 1);
}

#[tokio::test]
async fn part_urls_follow_request_order_and_mark_uploading() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let urls = service
        .request_part_urls(Principal(7), initiated.record_id, &[3, 1, 2])
        .await
        .unwrap();
    let numbers: Vec<_> = urls.iter().map(|u| u.part_number).collect();
    assert_eq!(numbers, vec![3, 1, 2]);
    assert!(urls[0].url.contains("partNumber=3"));
    assert!(urls[0].url.contains("expires=3600"));

    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Uploading);

    // A second request is fine and leaves the status alone.
    service
        .request_part_urls(Principal(7), initiated.record_id, &[2])
        .await
        .unwrap();
    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Uploading);

    let presigns = storage
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StorageCall::Presign { .. }))
        .count();
    assert_eq!(presigns, 4);
}

#[tokio::test]
async fn part_urls_reject_non_owner_and_bad_part_numbers() {
    let (service, _storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let err = service
        .request_part_urls(Principal(8), initiated.record_id, &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));

    for bad in [&[][..], &[0][..], &[4][..], &[1, 10_001][..]] {
        let err = service
            .request_part_urls(Principal(7), initiated.record_id, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)), "{bad:?}");
    }

    let err = service
        .request_part_urls(Principal(7), uuid::Uuid::new_v4(), &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotFound));
}

#[tokio::test]
async fn signing_failure_surfaces_and_leaves_status() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    storage.fail_sign.store(true, Ordering::SeqCst);

    let err = service
        .request_part_urls(Principal(7), initiated.record_id, &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::StorageSign(_)));

    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Pending);
}

#[tokio::test]
async fn part_urls_on_completed_upload_is_invalid_state() {
    let (service, _storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    service
        .complete(
            Principal(7),
            initiated.record_id,
            vec![part(1, "e1"), part(2, "e2"), part(3, "e3")],
        )
        .await
        .unwrap();

    let err = service
        .request_part_urls(Principal(7), initiated.record_id, &[1])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::InvalidState {
            status: UploadStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn completion_sends_parts_in_ascending_order() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    service
        .complete(
            Principal(7),
            initiated.record_id,
            vec![part(2, "e2"), part(1, "e1")],
        )
        .await
        .unwrap();

    match storage.completes().as_slice() {
        [StorageCall::Complete {
            key,
            session_id,
            parts,
        }] => {
            assert_eq!(key, &initiated.object_key);
            assert_eq!(session_id, &initiated.session_id);
            assert_eq!(parts, &vec![part(1, "e1"), part(2, "e2")]);
        }
        other => panic!("unexpected completion calls {other:?}"),
    }

    let stored = service
        .store
        .fetch_parts(initiated.record_id)
        .await
        .unwrap();
    assert_eq!(stored[1].etag.as_deref(), Some("e2"));
    assert!(stored[0].uploaded && stored[1].uploaded);
    assert!(!stored[2].uploaded);
}

#[tokio::test]
async fn completion_rejects_malformed_parts_without_calling_storage() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let cases = [
        vec![],
        vec![part(4, "e4")],
        vec![part(0, "e0")],
        vec![part(1, "  ")],
        vec![part(1, "e1"), part(1, "again")],
    ];
    for parts in cases {
        let err = service
            .complete(Principal(7), initiated.record_id, parts.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)), "{parts:?}");
    }

    let err = service
        .complete(Principal(9), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));

    assert!(storage.completes().is_empty());
    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Pending);
}

#[tokio::test]
async fn storage_completion_failure_marks_record_failed() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    storage.fail_complete.store(true, Ordering::SeqCst);

    let err = service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::StorageComplete(_)));
    assert!(err.to_string().contains("InvalidPart"));

    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Failed);
    assert!(record.completed_at.is_none());

    // Terminal: no automatic retry, no way back to uploading.
    storage.fail_complete.store(false, Ordering::SeqCst);
    let err = service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::InvalidState {
            status: UploadStatus::Failed,
            ..
        }
    ));
    let err = service
        .request_part_urls(Principal(7), initiated.record_id, &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidState { .. }));
    assert_eq!(storage.completes().len(), 1);
}

#[tokio::test]
async fn concurrent_completions_have_exactly_one_winner() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    storage.complete_delay_ms.store(50, Ordering::SeqCst);

    let parts = vec![part(1, "e1"), part(2, "e2"), part(3, "e3")];
    let (first, second) = tokio::join!(
        service.complete(Principal(7), initiated.record_id, parts.clone()),
        service.complete(Principal(7), initiated.record_id, parts),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let losers = outcomes
        .iter()
        .filter(|r| matches!(r, Err(UploadError::InvalidState { .. })))
        .count();
    assert_eq!((winners, losers), (1, 1));

    assert_eq!(storage.completes().len(), 1);
    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Completed);
    assert_eq!(record.progress, 100.0);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn part_reports_track_progress_until_completion() {
    let (service, _storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let view = service
        .report_part_uploaded(Principal(7), initiated.record_id, 1, "e1")
        .await
        .unwrap();
    assert_eq!(view.status, UploadStatus::Uploading);
    let expected = DEFAULT_CHUNK_SIZE as f64 * 100.0 / 250_000_000.0;
    assert!((view.progress - expected).abs() < 1e-9);

    service
        .report_part_uploaded(Principal(7), initiated.record_id, 2, "e2")
        .await
        .unwrap();
    let view = service
        .report_part_uploaded(Principal(7), initiated.record_id, 3, "e3")
        .await
        .unwrap();
    assert!(view.progress < 100.0);
    assert_eq!(view.status, UploadStatus::Uploading);

    let err = service
        .report_part_uploaded(Principal(8), initiated.record_id, 1, "e1")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));

    let err = service
        .report_part_uploaded(Principal(7), initiated.record_id, 1, "")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Validation(_)));

    let done = service
        .complete(
            Principal(7),
            initiated.record_id,
            vec![part(3, "e3"), part(1, "e1"), part(2, "e2")],
        )
        .await
        .unwrap();
    assert_eq!(done.progress, 100.0);
}

#[tokio::test]
async fn abort_marks_failed_and_discards_session() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let err = service
        .abort(Principal(8), initiated.record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));

    storage.fail_abort.store(true, Ordering::SeqCst);
    let view = service.abort(Principal(7), initiated.record_id).await.unwrap();
    assert_eq!(view.status, UploadStatus::Failed);
    assert_eq!(
        storage.aborts(),
        vec![StorageCall::Abort {
            key: initiated.object_key.clone(),
            session_id: initiated.session_id.clone(),
        }]
    );

    let err = service
        .abort(Principal(7), initiated.record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidState { .. }));
}

#[tokio::test]
async fn private_uploads_are_only_listed_for_their_owner() {
    let (service, _storage) = harness().await;

    let private_a = initiate_demo(&service, 1).await;
    let public_a = service
        .initiate(
            Principal(1),
            InitiateUpload {
                visibility: Some(Visibility::Public),
                ..demo_request()
            },
        )
        .await
        .unwrap();
    let unlisted_b = service
        .initiate(
            Principal(2),
            InitiateUpload {
                visibility: Some(Visibility::Unlisted),
                ..demo_request()
            },
        )
        .await
        .unwrap();

    let ids = |list: video_uploads::services::upload_service::UploadList| {
        list.uploads.into_iter().map(|u| u.id).collect::<Vec<_>>()
    };

    let for_a = ids(service
        .list(Some(Principal(1)), ListFilter::default())
        .await
        .unwrap());
    assert!(for_a.contains(&private_a.record_id));
    assert!(for_a.contains(&public_a.record_id));
    assert!(!for_a.contains(&unlisted_b.record_id));

    let for_b = ids(service
        .list(Some(Principal(2)), ListFilter::default())
        .await
        .unwrap());
    assert!(!for_b.contains(&private_a.record_id));
    assert!(for_b.contains(&public_a.record_id));
    assert!(for_b.contains(&unlisted_b.record_id));

    let anonymous = ids(service.list(None, ListFilter::default()).await.unwrap());
    assert_eq!(anonymous, vec![public_a.record_id]);

    let mine_b = ids(service
        .list(
            Some(Principal(2)),
            ListFilter {
                mine: true,
                ..Default::default()
            },
        )
        .await
        .unwrap());
    assert_eq!(mine_b, vec![unlisted_b.record_id]);

    // Single fetch follows the same rule.
    assert!(
        service
            .get(Some(Principal(1)), private_a.record_id)
            .await
            .is_ok()
    );
    assert!(matches!(
        service.get(Some(Principal(2)), private_a.record_id).await,
        Err(UploadError::NotFound)
    ));
    assert!(matches!(
        service.get(None, private_a.record_id).await,
        Err(UploadError::NotFound)
    ));
    assert!(service.get(None, public_a.record_id).await.is_ok());
}

#[tokio::test]
async fn list_filters_and_cursor_validation() {
    let (service, _storage) = harness().await;
    let first = initiate_demo(&service, 1).await;
    let second = initiate_demo(&service, 1).await;
    service
        .complete(Principal(1), first.record_id, vec![part(1, "e1")])
        .await
        .unwrap();

    let completed = service
        .list(
            Some(Principal(1)),
            ListFilter {
                status: Some(UploadStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(completed.uploads.len(), 1);
    assert_eq!(completed.uploads[0].id, first.record_id);

    let page = service
        .list(
            Some(Principal(1)),
            ListFilter {
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.uploads.len(), 1);
    let cursor = page.next_cursor.expect("second page expected");
    let next = service
        .list(
            Some(Principal(1)),
            ListFilter {
                limit: Some(1),
                cursor: Some(cursor),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(next.uploads.len(), 1);
    assert!(next.next_cursor.is_none());
    let mut both = vec![page.uploads[0].id, next.uploads[0].id];
    both.sort();
    let mut expected = vec![first.record_id, second.record_id];
    expected.sort();
    assert_eq!(both, expected);

    let err = service
        .list(
            None,
            ListFilter {
                mine: true,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Validation(_)));

    let err = service
        .list(
            None,
            ListFilter {
                cursor: Some("%%%".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Validation(_)));
}

#[tokio::test]
async fn record_write_failure_after_assembly_does_not_strand_processing() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    sqlx::query(
        "CREATE TRIGGER reject_part_updates BEFORE UPDATE ON upload_parts
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
    )
    .execute(&*service.store.db)
    .await
    .unwrap();

    let err = service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "internal");
    assert_eq!(storage.completes().len(), 1);

    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, UploadStatus::Failed);

    let err = service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::InvalidState {
            status: UploadStatus::Failed,
            ..
        }
    ));
    assert_eq!(storage.completes().len(), 1);
}

#[tokio::test]
async fn owner_can_edit_metadata_in_any_state() {
    let (service, _storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap();

    let view = service
        .update(
            Principal(7),
            initiated.record_id,
            UpdateUpload {
                title: Some("  Renamed  ".into()),
                visibility: Some(Visibility::Public),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(view.title, "Renamed");
    assert_eq!(view.visibility, Visibility::Public);
    assert_eq!(view.status, UploadStatus::Completed);
    assert!(service.get(None, initiated.record_id).await.is_ok());

    let err = service
        .update(
            Principal(8),
            initiated.record_id,
            UpdateUpload {
                title: Some("Mine now".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));

    for request in [
        UpdateUpload::default(),
        UpdateUpload {
            title: Some(" ".into()),
            ..Default::default()
        },
        UpdateUpload {
            title: Some("x".repeat(201)),
            ..Default::default()
        },
    ] {
        let err = service
            .update(Principal(7), initiated.record_id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
    }

    let record = service
        .store
        .fetch_upload(initiated.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.title, "Renamed");
}

#[tokio::test]
async fn deleting_open_upload_aborts_session_and_drops_parts() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;

    let err = service
        .delete(Principal(8), initiated.record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));
    assert!(storage.aborts().is_empty());

    service
        .delete(Principal(7), initiated.record_id)
        .await
        .unwrap();
    assert_eq!(
        storage.aborts(),
        vec![StorageCall::Abort {
            key: initiated.object_key.clone(),
            session_id: initiated.session_id.clone(),
        }]
    );
    assert_eq!(count_uploads(&service).await, 0);
    assert!(
        service
            .store
            .fetch_parts(initiated.record_id)
            .await
            .unwrap()
            .is_empty()
    );

    let err = service
        .delete(Principal(7), initiated.record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotFound));
}

#[tokio::test]
async fn deleting_completed_upload_skips_session_abort() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    service
        .complete(Principal(7), initiated.record_id, vec![part(1, "e1")])
        .await
        .unwrap();

    service
        .delete(Principal(7), initiated.record_id)
        .await
        .unwrap();
    assert!(storage.aborts().is_empty());
    assert_eq!(count_uploads(&service).await, 0);
}

#[tokio::test]
async fn upload_in_processing_cannot_be_deleted() {
    let (service, storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    storage.complete_delay_ms.store(50, Ordering::SeqCst);

    let (completed, deleted) = tokio::join!(
        service.complete(Principal(7), initiated.record_id, vec![part(1, "e1")]),
        async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            service.delete(Principal(7), initiated.record_id).await
        },
    );
    assert!(completed.is_ok());
    assert!(matches!(
        deleted,
        Err(UploadError::InvalidState {
            status: UploadStatus::Processing,
            ..
        })
    ));
    assert_eq!(count_uploads(&service).await, 1);
}

#[tokio::test]
async fn owner_sees_part_tracking() {
    let (service, _storage) = harness().await;
    let initiated = initiate_demo(&service, 7).await;
    service
        .report_part_uploaded(Principal(7), initiated.record_id, 2, "e2")
        .await
        .unwrap();

    let parts = service.parts(Principal(7), initiated.record_id).await.unwrap();
    let uploaded: Vec<_> = parts.iter().map(|p| (p.part_number, p.uploaded)).collect();
    assert_eq!(uploaded, vec![(1, false), (2, true), (3, false)]);
    assert_eq!(parts[1].etag.as_deref(), Some("e2"));

    let err = service
        .parts(Principal(8), initiated.record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Forbidden));
}
