//! Whole-job tests against mocked Drive, YouTube and OAuth endpoints

mod common;

use common::{FRESH_TOKEN, Fixture, RangeResponder, ResumableSession, file_list, payload};
use tube_relay::{Event, JobOutcome, JobState, LocalCleanup, SourceCleanup};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn mount_listing(fixture: &Fixture, files: &[(&str, &str, &str)]) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", format!("Bearer {FRESH_TOKEN}").as_str()))
        .and(query_param("orderBy", "createdTime desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_list(files)))
        .mount(&fixture.server)
        .await;
}

async fn mount_media(fixture: &Fixture, id: &str, data: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{id}")))
        .and(query_param("alt", "media"))
        .respond_with(RangeResponder { data })
        .mount(&fixture.server)
        .await;
}

async fn mount_session_start(fixture: &Fixture, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", fixture.session_uri().as_str()))
        .expect(expected)
        .mount(&fixture.server)
        .await;
}

async fn mount_session(fixture: &Fixture, session: &ResumableSession) {
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .respond_with(session.clone())
        .mount(&fixture.server)
        .await;
}

async fn mount_delete(fixture: &Fixture, id: &str, status: u16, expected: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("/drive/v3/files/{id}")))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(&fixture.server)
        .await;
}

#[tokio::test]
async fn publishes_newest_video_and_removes_source() {
    let fixture = Fixture::start().await;
    let data = payload(1000);
    mount_listing(
        &fixture,
        &[
            ("new-id", "My_Clip.mp4", "2024-03-02T09:00:00.000Z"),
            ("old-id", "Older.mp4", "2024-03-01T09:00:00.000Z"),
        ],
    )
    .await;
    mount_media(&fixture, "new-id", data.clone()).await;
    mount_session_start(&fixture, 1).await;
    let session = ResumableSession::new(0);
    mount_session(&fixture, &session).await;
    mount_delete(&fixture, "new-id", 204, 1).await;
    mount_delete(&fixture, "old-id", 204, 0).await;

    let job = fixture.job();
    let mut events = job.subscribe();
    let report = job.run().await.unwrap();

    assert_eq!(
        report.outcome,
        JobOutcome::Published {
            remote_id: "vid123".into(),
            url: Some("https://youtu.be/vid123".into()),
        }
    );
    assert_eq!(session.received(), data);
    assert_eq!(report.cleanup.source, Some(SourceCleanup::Deleted));
    assert_eq!(report.cleanup.local, Some(LocalCleanup::Deleted));
    assert!(!fixture.work_dir.path().join("My_Clip.mp4").exists());

    // The expired token was refreshed once and written back
    assert_eq!(fixture.token_store.save_count(), 1);
    assert_eq!(fixture.token_store.current().unwrap().access_token(), Some(FRESH_TOKEN));

    let mut last_state = None;
    while let Ok(event) = events.try_recv() {
        if let Event::StateChanged { to, .. } = event {
            last_state = Some(to);
        }
    }
    assert_eq!(last_state, Some(JobState::CleanedUp));
}

#[tokio::test]
async fn empty_folder_touches_nothing() {
    let fixture = Fixture::start().await;
    mount_listing(&fixture, &[]).await;
    mount_session_start(&fixture, 0).await;

    let report = fixture.job().run().await.unwrap();

    assert_eq!(report.outcome, JobOutcome::NothingToDo);
    assert!(report.outcome.is_success());
}

#[tokio::test]
async fn rejected_upload_keeps_source() {
    let fixture = Fixture::start().await;
    mount_listing(&fixture, &[("obj-1", "clip.mp4", "2024-03-02T09:00:00.000Z")]).await;
    mount_media(&fixture, "obj-1", payload(300)).await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 400, "message": "Invalid video metadata",
                      "errors": [{"reason": "invalidTitle"}]}
        })))
        .mount(&fixture.server)
        .await;
    mount_delete(&fixture, "obj-1", 204, 0).await;

    let report = fixture.job().run().await.unwrap();

    match report.outcome {
        JobOutcome::UploadFailed { code, error } => {
            assert_eq!(code, "api_error");
            assert!(error.contains("Invalid video metadata"), "{error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.cleanup.source, None);
    assert_eq!(report.cleanup.local, Some(LocalCleanup::Deleted));
}

#[tokio::test]
async fn transient_chunk_failures_resume_and_publish() {
    let fixture = Fixture::start().await;
    let data = payload(700);
    mount_listing(&fixture, &[("obj-1", "clip.mp4", "2024-03-02T09:00:00.000Z")]).await;
    mount_media(&fixture, "obj-1", data.clone()).await;
    mount_session_start(&fixture, 1).await;
    let session = ResumableSession::new(2);
    mount_session(&fixture, &session).await;
    mount_delete(&fixture, "obj-1", 204, 1).await;

    let report = fixture.job().run().await.unwrap();

    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(session.received(), data);
}

#[tokio::test]
async fn forbidden_source_delete_is_reported_not_fatal() {
    let fixture = Fixture::start().await;
    mount_listing(&fixture, &[("obj-1", "clip.mp4", "2024-03-02T09:00:00.000Z")]).await;
    mount_media(&fixture, "obj-1", payload(100)).await;
    mount_session_start(&fixture, 1).await;
    mount_session(&fixture, &ResumableSession::new(0)).await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/obj-1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {"code": 403, "message": "The user does not have sufficient permissions for this file.",
                      "errors": [{"reason": "insufficientFilePermissions"}]}
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let report = fixture.job().run().await.unwrap();

    assert!(matches!(report.outcome, JobOutcome::Published { .. }));
    assert!(matches!(
        report.cleanup.source,
        Some(SourceCleanup::PermissionDenied { .. })
    ));
    assert_eq!(report.cleanup.local, Some(LocalCleanup::Deleted));
}
