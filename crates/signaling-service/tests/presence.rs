//! Presence integration tests: online set, snapshots and online-flag
//! mirroring.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use signaling_service::protocol::ServerEvent;
use signaling_test_utils::fixtures::{ann, bo};
use signaling_test_utils::TestHarness;
use std::time::Duration;

#[tokio::test]
async fn test_online_set_tracks_live_connections() {
    let harness = TestHarness::new();

    let mut ann_phone = harness.connect(ann()).await;
    assert_eq!(
        ann_phone.next_event().await,
        ServerEvent::OnlineUsers(vec!["u-ann".into()])
    );

    let ann_laptop = harness.connect_quiet(ann()).await;
    let mut bo_conn = harness.connect(bo()).await;
    let both = ServerEvent::OnlineUsers(vec!["u-ann".into(), "u-bo".into()]);
    assert_eq!(bo_conn.next_event().await, both);
    ann_phone.drain().await;

    // Ann stays online while one connection remains.
    ann_laptop.close().await;
    assert_eq!(bo_conn.next_event().await, both);
    assert_eq!(harness.hub().online_users().await.unwrap(), vec!["u-ann", "u-bo"]);

    ann_phone.close().await;
    assert_eq!(
        bo_conn.next_event().await,
        ServerEvent::OnlineUsers(vec!["u-bo".into()])
    );

    let status = harness.hub().get_status().await.unwrap();
    assert_eq!(status.connections, 1);
    assert_eq!(status.online_users, 1);
}

#[tokio::test]
async fn test_online_flag_mirrored_on_first_and_last_connection() {
    let harness = TestHarness::new();

    let first = harness.connect_quiet(ann()).await;
    let second = harness.connect_quiet(ann()).await;
    assert_eq!(harness.online_calls(1).await, vec![("u-ann".to_string(), true)]);

    first.close().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.verifier.online_calls().len(), 1);

    second.close().await;
    assert_eq!(
        harness.online_calls(2).await,
        vec![("u-ann".to_string(), true), ("u-ann".to_string(), false)]
    );
}

#[tokio::test]
async fn test_online_flag_follows_reconnect_during_slow_offline_write() {
    let harness = TestHarness::builder()
        .offline_write_delay(Duration::from_millis(100))
        .build();

    let old_tab = harness.connect_quiet(ann()).await;
    let closing = tokio::spawn(old_tab.close());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _new_tab = harness.connect_quiet(ann()).await;
    closing.await.unwrap();

    assert_eq!(
        harness.online_calls(3).await,
        vec![
            ("u-ann".to_string(), true),
            ("u-ann".to_string(), false),
            ("u-ann".to_string(), true),
        ]
    );
    assert_eq!(harness.hub().online_users().await.unwrap(), vec!["u-ann"]);
}

#[tokio::test]
async fn test_closed_connection_stream_ends() {
    let harness = TestHarness::new();
    let mut conn = harness.connect_quiet(ann()).await;

    harness.hub().cancel();
    assert!(conn.is_closed().await);
}
