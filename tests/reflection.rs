//! `reflect`'s structured-failure paths: each of these is an expected
//! condition, not an error, so every assertion is against `ReflectResult`
//! rather than an `Err`.

mod common;

use memory_palace::reflection;

#[tokio::test]
async fn reflect_reports_structured_failure_for_a_missing_transcript() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let result = reflection::reflect(
        &storage,
        &model_client,
        "/nonexistent/path/transcript.txt",
        "default",
        None,
        false,
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert_eq!(result.extracted, 0);
    assert!(result.error.unwrap().contains("transcript not found"));
}

#[tokio::test]
async fn reflect_reports_structured_failure_for_a_too_short_transcript() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "too short").unwrap();

    let result = reflection::reflect(
        &storage,
        &model_client,
        file.path().to_str().unwrap(),
        "default",
        None,
        false,
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("too short to reflect on"));
}

#[tokio::test]
async fn reflect_reports_structured_failure_when_no_model_server_is_reachable() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "a".repeat(60)).unwrap();

    let result = reflection::reflect(
        &storage,
        &model_client,
        file.path().to_str().unwrap(),
        "default",
        Some("session-1"),
        false,
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("model server unavailable"));
}

#[tokio::test]
async fn reflect_dry_run_still_reports_a_missing_transcript_as_unsuccessful() {
    let storage = common::test_storage().await;
    let model_client = common::unreachable_model_client();

    let result = reflection::reflect(
        &storage,
        &model_client,
        "/nonexistent/path/transcript.txt",
        "default",
        None,
        true,
    )
    .await
    .unwrap();

    assert!(!result.success);
    assert!(!result.dry_run);
}
