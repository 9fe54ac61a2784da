mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use pdfmaster::{ArtifactStore, SequentialIds, TempDirSink};
use pdfmaster_api::{app, AppState};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use common::*;

fn entries(sink: &TempDirSink) -> usize {
    std::fs::read_dir(sink.path()).unwrap().count()
}

#[tokio::test]
async fn test_staged_files_are_removed_from_disk() {
    let parent = tempfile::tempdir().unwrap();
    let sink = Arc::new(TempDirSink::new(Some(parent.path())).unwrap());
    assert!(sink.path().starts_with(parent.path()));

    let store = ArtifactStore::new(sink.clone(), Arc::new(SequentialIds::default()));
    let app = app(AppState::new(store));

    let request = multipart_request(
        "/api/v1/pdf/merge",
        vec![
            Part::pdf("files", "a.pdf", test_pdf(&[100])),
            Part::pdf("files", "b.pdf", test_pdf(&[200])),
        ],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.starts_with(b"%PDF"));
    assert_eq!(entries(&sink), 0);

    // failed requests leave nothing behind either
    let request = multipart_request(
        "/api/v1/pdf/split",
        vec![
            Part::pdf("file", "a.pdf", test_pdf(&[100])),
            Part::text("split_mode", "bogus"),
        ],
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(entries(&sink), 0);
}

#[tokio::test]
async fn test_sink_directory_removed_on_drop() {
    let parent = tempfile::tempdir().unwrap();
    let sink = TempDirSink::new(Some(parent.path())).unwrap();
    let path = sink.path().to_path_buf();
    assert!(path.is_dir());

    drop(sink);
    assert!(!path.exists());
}
