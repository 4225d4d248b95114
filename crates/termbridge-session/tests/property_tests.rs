//! Property-based tests for the session bridge.
//!
//! Uses proptest to drive a bridge over an in-process transport and check
//! its framing and teardown guarantees.

use proptest::prelude::*;
use std::sync::Arc;

use termbridge_core::{
    BridgeConfig, CloseCode, Dimensions, Frame, PixelSize, SessionState, TerminalSettings,
};
use termbridge_session::{MemoryConnector, RemotePeer, SessionBridge, SessionOptions};
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

fn open_session(point: &MountPoint) -> (SessionBridge, RemotePeer) {
    let connector = MemoryConnector::new();
    let mut bridge = SessionBridge::new("vm-42", Arc::new(connector.clone()), config());
    bridge
        .open(SessionOptions::with_mount(point.mount()))
        .expect("open session");
    let (_, peer) = connector.try_next_peer().expect("peer");
    (bridge, peer)
}

/// Keystrokes and pastes: printable text, control bytes and escape sequences.
fn keystroke() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{1,8}",
        Just("\r".to_string()),
        Just("\x03".to_string()),
        Just("\x1b[A".to_string()),
        Just("\x7f".to_string()),
        "[a-zé漢]{1,3}",
    ]
}

/// Container bounds in pixels.
fn bounds() -> impl Strategy<Value = (u32, u32)> {
    (1u32..2000, 1u32..1200)
}

fn input_frames(peer: &RemotePeer) -> Vec<Frame> {
    peer.sent_frames()
        .into_iter()
        .filter(|frame| matches!(frame, Frame::Input { .. }))
        .collect()
}

fn resize_frames(peer: &RemotePeer) -> Vec<Frame> {
    peer.sent_frames()
        .into_iter()
        .filter(|frame| matches!(frame, Frame::Resize { .. }))
        .collect()
}

proptest! {
    /// Every keystroke typed while connected becomes exactly one input
    /// frame, in typing order.
    #[test]
    fn one_input_frame_per_keystroke(keys in prop::collection::vec(keystroke(), 0..40)) {
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let (mut bridge, peer) = open_session(&point);
        peer.open();
        bridge.pump();

        for key in &keys {
            prop_assert!(bridge.dispatch_input(key));
        }

        let expected: Vec<Frame> = keys.iter().map(|key| Frame::input(key.as_str())).collect();
        prop_assert_eq!(input_frames(&peer), expected);
        prop_assert_eq!(bridge.stats().input_frames_sent, keys.len() as u64);
    }

    /// Keystrokes typed before the transport opens, or after close, never
    /// reach the transport.
    #[test]
    fn keystrokes_dropped_unless_connected(
        early in prop::collection::vec(keystroke(), 0..10),
        late in prop::collection::vec(keystroke(), 0..10),
    ) {
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let (mut bridge, peer) = open_session(&point);

        for key in &early {
            prop_assert!(!bridge.dispatch_input(key));
        }
        peer.open();
        bridge.pump();
        bridge.close();
        for key in &late {
            prop_assert!(!bridge.dispatch_input(key));
        }

        prop_assert!(input_frames(&peer).is_empty());
        prop_assert_eq!(bridge.stats().input_dropped, (early.len() + late.len()) as u64);
    }

    /// A resize frame is sent only when the fitted geometry differs from the
    /// last one sent, and always carries the surface's current geometry.
    #[test]
    fn resize_frames_are_deduplicated(sizes in prop::collection::vec(bounds(), 1..20)) {
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let (mut bridge, peer) = open_session(&point);
        peer.open();
        bridge.pump();

        let mut expected = vec![Frame::resize(Dimensions::new(24, 80))];
        let mut last = Dimensions::new(24, 80);
        for (width, height) in sizes {
            point.set_bounds(PixelSize::new(width, height));
            bridge.pump();
            let fitted = bridge.surface().expect("surface").dimensions();
            if fitted != last {
                expected.push(Frame::resize(fitted));
                last = fitted;
            }
        }

        prop_assert_eq!(resize_frames(&peer), expected);
        prop_assert_eq!(bridge.last_sent_geometry(), Some(last));
    }

    /// However many close paths fire, teardown runs once: one unsubscribe,
    /// one local close, and the state never leaves Closed.
    #[test]
    fn teardown_is_idempotent(paths in prop::collection::vec(0u8..4, 1..8), open_first in any::<bool>()) {
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let (mut bridge, peer) = open_session(&point);
        if open_first {
            peer.open();
            bridge.pump();
        }

        let mut first = None;
        for path in paths {
            match path {
                0 => { bridge.close(); }
                1 => { bridge.host_destroyed(); }
                2 => { peer.close(CloseCode::Abnormal, "peer reset"); bridge.pump(); }
                _ => { peer.fail("boom"); bridge.pump(); }
            }
            let state = bridge.state().clone();
            prop_assert!(state.is_closed());
            match &first {
                None => first = Some(state),
                Some(first) => prop_assert_eq!(first, &state),
            }
        }

        prop_assert_eq!(peer.unsubscribe_count(), 1);
        prop_assert_eq!(point.listener_count(), 0);
        prop_assert!(bridge.surface().expect("surface").is_disposed());
    }

    /// Output frames land in the surface verbatim.
    #[test]
    fn output_written_verbatim(chunks in prop::collection::vec("[ -~\r\n]{0,40}", 1..10)) {
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let (mut bridge, peer) = open_session(&point);
        peer.open();
        bridge.pump();
        let before = bridge.surface().expect("surface").transcript().to_string();

        for chunk in &chunks {
            peer.send_output(chunk);
        }
        bridge.pump();

        let after = bridge.surface().expect("surface").transcript().to_string();
        prop_assert_eq!(after, format!("{}{}", before, chunks.concat()));
        prop_assert_eq!(bridge.state(), &SessionState::Connected);
    }
}
