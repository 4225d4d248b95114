//! End-to-end session scenarios over the in-process transport.

use std::sync::Arc;

use termbridge_core::{
    BridgeConfig, CloseCode, CloseReason, Dimensions, Frame, PixelSize, TerminalSettings,
};
use termbridge_session::{spawn_session, MemoryConnector, SessionOptions};
use termbridge_surface::MountPoint;

fn config() -> Arc<BridgeConfig> {
    Arc::new(BridgeConfig {
        terminal: TerminalSettings {
            cell_width: 10,
            cell_height: 20,
            ..Default::default()
        },
        ..Default::default()
    })
}

#[tokio::test]
async fn test_normal_session() {
    let connector = MemoryConnector::new();
    let point = MountPoint::with_bounds(PixelSize::new(800, 480));
    let handle = spawn_session(
        "vm-42",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );

    let (target, peer) = connector.next_peer().await;
    assert_eq!(target.as_str(), "vm-42");

    peer.open();
    let info = handle
        .wait_until(|info| info.state.is_connected())
        .await
        .expect("session connects");
    assert_eq!(info.geometry, Some(Dimensions::new(24, 80)));
    assert_eq!(peer.sent_frames(), vec![Frame::resize(Dimensions::new(24, 80))]);

    peer.send_output("$ ");
    let snapshot = handle.snapshot().await.expect("snapshot");
    assert!(snapshot.screen.contains("$"));

    // User closes the view
    let report = handle.close().await.expect("driver report");
    assert_eq!(
        peer.local_close(),
        Some((CloseCode::Normal, "closed by user".to_string()))
    );
    assert_eq!(report.info.last_error, None);
    assert!(!report.transcript.contains("\x1b[31m"));
    assert!(report.transcript.ends_with("$ "));
}

#[tokio::test]
async fn test_abnormal_close_then_reopen() {
    let connector = MemoryConnector::new();
    let point = MountPoint::with_bounds(PixelSize::new(800, 480));
    let handle = spawn_session(
        "vm-42",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );
    let (_, peer) = connector.next_peer().await;
    peer.open();
    handle
        .wait_until(|info| info.state.is_connected())
        .await
        .expect("session connects");

    peer.close(CloseCode::Abnormal, "peer reset");
    let report = handle.join().await.expect("driver report");
    assert!(report.transcript.contains("1006"));
    assert!(report.transcript.contains("peer reset"));
    let reason = report.info.state.close_reason().expect("closed");
    assert!(matches!(reason, CloseReason::Abnormal { .. }));
    assert_eq!(reason.to_string(), "peer reset");
    assert_eq!(peer.unsubscribe_count(), 1);
    assert_eq!(point.listener_count(), 0);

    // Reopening builds a new session on a new transport
    let reopened = spawn_session(
        "vm-42",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );
    let (_, fresh) = connector.next_peer().await;
    assert_ne!(reopened.id(), report.info.id);
    assert_eq!(connector.connect_count(), 2);

    fresh.open();
    reopened
        .wait_until(|info| info.state.is_connected())
        .await
        .expect("reopened session connects");
    assert_eq!(peer.sent_frames().len(), 1);
    assert_eq!(fresh.sent_frames().len(), 1);
    reopened.close().await.expect("driver report");
}

#[tokio::test]
async fn test_malformed_frame_written_raw() {
    let connector = MemoryConnector::new();
    let point = MountPoint::with_bounds(PixelSize::new(800, 480));
    let handle = spawn_session(
        "vm-42",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );
    let (_, peer) = connector.next_peer().await;
    peer.open();
    peer.send_raw("plain text, not json");

    let report = handle.close().await.expect("driver report");
    assert!(report.transcript.contains("plain text, not json"));
    assert_eq!(report.stats.raw_messages, 1);
}

#[tokio::test]
async fn test_backend_diagnostic_close_before_open() {
    let connector = MemoryConnector::new();
    let point = MountPoint::with_bounds(PixelSize::new(800, 480));
    let handle = spawn_session(
        "vm-404",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );
    let (_, peer) = connector.next_peer().await;
    peer.send_raw("Error: VM not found.");
    peer.close(CloseCode::PolicyViolation, "VM not found");

    let report = handle.join().await.expect("driver report");
    assert!(report.transcript.contains("Error: VM not found."));
    assert!(matches!(
        report.info.state.close_reason(),
        Some(CloseReason::ConnectFailure { .. })
    ));
    assert!(report.info.last_error.is_some());
}

#[tokio::test]
async fn test_viewport_resize_while_connected() {
    let connector = MemoryConnector::new();
    let point = MountPoint::with_bounds(PixelSize::new(800, 480));
    let handle = spawn_session(
        "vm-42",
        Arc::new(connector.clone()),
        config(),
        SessionOptions::with_mount(point.mount()),
    );
    let (_, peer) = connector.next_peer().await;
    peer.open();
    handle
        .wait_until(|info| info.state.is_connected())
        .await
        .expect("session connects");

    point.set_bounds(PixelSize::new(1000, 600));
    let info = handle
        .wait_until(|info| info.geometry == Some(Dimensions::new(30, 100)))
        .await
        .expect("geometry updates");
    assert_eq!(info.geometry, Some(Dimensions::new(30, 100)));

    let report = handle.close().await.expect("driver report");
    assert_eq!(report.stats.resize_frames_sent, 2);
    assert_eq!(
        peer.sent_frames().last(),
        Some(&Frame::resize(Dimensions::new(30, 100)))
    );
}
