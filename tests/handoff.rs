//! Inter-instance handoff bus: send/list/acknowledge across named
//! instances and the `"all"` broadcast target.

mod common;

use memory_palace::{handoff, PalaceError};

#[tokio::test]
async fn send_and_list_handoffs_for_the_named_instance() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string(), "beta".to_string()];

    handoff::send_handoff(
        &storage,
        &config,
        "alpha",
        "beta",
        "handoff",
        "deploy is done",
        Some("status update"),
    )
    .await
    .unwrap();

    let messages = handoff::get_handoffs(&storage, &config, "beta", false, None, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from_instance, "alpha");
    assert_eq!(messages[0].subject.as_deref(), Some("status update"));

    // Not addressed to alpha, so alpha's inbox stays empty.
    let for_alpha = handoff::get_handoffs(&storage, &config, "alpha", false, None, 10)
        .await
        .unwrap();
    assert!(for_alpha.is_empty());
}

#[tokio::test]
async fn broadcast_handoffs_reach_every_instance() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string(), "beta".to_string()];

    handoff::send_handoff(&storage, &config, "alpha", "all", "fyi", "heads up", None)
        .await
        .unwrap();

    let for_beta = handoff::get_handoffs(&storage, &config, "beta", false, None, 10)
        .await
        .unwrap();
    assert_eq!(for_beta.len(), 1);
}

#[tokio::test]
async fn send_handoff_rejects_broadcast_as_sender() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string()];

    let err = handoff::send_handoff(&storage, &config, "all", "alpha", "fyi", "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PalaceError::Validation(_)));
}

#[tokio::test]
async fn send_handoff_rejects_an_unconfigured_recipient() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string()];

    let err = handoff::send_handoff(&storage, &config, "alpha", "nobody", "fyi", "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PalaceError::Validation(_)));
}

#[tokio::test]
async fn send_handoff_rejects_an_unknown_message_type() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string(), "beta".to_string()];

    let err = handoff::send_handoff(&storage, &config, "alpha", "beta", "urgent!!", "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PalaceError::Validation(_)));
}

#[tokio::test]
async fn unread_only_filters_out_acknowledged_messages() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string(), "beta".to_string()];

    let id = handoff::send_handoff(&storage, &config, "alpha", "beta", "fyi", "first", None)
        .await
        .unwrap();
    handoff::send_handoff(&storage, &config, "alpha", "beta", "fyi", "second", None)
        .await
        .unwrap();

    handoff::mark_handoff_read(&storage, &config, id, "beta").await.unwrap();

    let unread = handoff::get_handoffs(&storage, &config, "beta", true, None, 10)
        .await
        .unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].content, "second");
}

#[tokio::test]
async fn mark_handoff_read_is_last_writer_wins() {
    let storage = common::test_storage().await;
    let mut config = common::test_config();
    config.instances = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];

    let id = handoff::send_handoff(&storage, &config, "alpha", "all", "fyi", "check this out", None)
        .await
        .unwrap();

    handoff::mark_handoff_read(&storage, &config, id, "beta").await.unwrap();
    handoff::mark_handoff_read(&storage, &config, id, "gamma").await.unwrap();

    let messages = handoff::get_handoffs(&storage, &config, "beta", false, None, 10)
        .await
        .unwrap();
    assert_eq!(messages[0].read_by.as_deref(), Some("gamma"));
}
