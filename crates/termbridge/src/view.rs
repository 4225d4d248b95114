//! The host-side terminal view.

use std::sync::Arc;

use tracing::{info, warn};

use termbridge_core::{BridgeConfig, SessionInfo, Target};
use termbridge_session::{
    spawn_session, ConnectionFactory, SessionHandle, SessionOptions, SessionReport, WsConnector,
};
use termbridge_surface::MountPoint;

/// A terminal panel in the host UI.
///
/// The view owns one mount point and at most one live session at a time.
/// Showing a target tears the previous session down completely before the
/// new one starts. Dropping the view destroys its session.
pub struct TerminalView {
    factory: Arc<dyn ConnectionFactory>,
    config: Arc<BridgeConfig>,
    mount: MountPoint,
    current: Option<SessionHandle>,
    last_target: Option<(Target, bool)>,
    last_report: Option<SessionReport>,
}

impl std::fmt::Debug for TerminalView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalView")
            .field("bounds", &self.mount.bounds())
            .field("session", &self.current.as_ref().map(SessionHandle::info))
            .field("last_target", &self.last_target)
            .finish()
    }
}

impl TerminalView {
    /// View opening sessions through `factory`.
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        config: Arc<BridgeConfig>,
        mount: MountPoint,
    ) -> Self {
        Self {
            factory,
            config,
            mount,
            current: None,
            last_target: None,
            last_report: None,
        }
    }

    /// View opening WebSocket sessions on the configured endpoint.
    pub fn websocket(config: BridgeConfig, mount: MountPoint) -> Self {
        let factory = Arc::new(WsConnector::from_settings(&config.session));
        Self::new(factory, Arc::new(config), mount)
    }

    /// The container sessions are attached to.
    pub fn mount_point(&self) -> &MountPoint {
        &self.mount
    }

    /// Open a session for `target`, closing any session already shown.
    ///
    /// `credentials_configured` only controls an advisory line written once
    /// the session connects.
    pub async fn show(
        &mut self,
        target: impl Into<Target>,
        credentials_configured: bool,
    ) -> &SessionHandle {
        self.hide().await;

        let target = target.into();
        info!("Showing terminal for target={}", target);
        let options =
            SessionOptions::with_mount(self.mount.mount()).credentials_configured(credentials_configured);
        let handle = spawn_session(
            target.clone(),
            self.factory.clone(),
            self.config.clone(),
            options,
        );
        self.last_target = Some((target, credentials_configured));
        self.current.insert(handle)
    }

    /// Close the current session and wait for it to finish.
    ///
    /// Returns false if no session was shown.
    pub async fn hide(&mut self) -> bool {
        let Some(handle) = self.current.take() else {
            return false;
        };
        match handle.close().await {
            Ok(report) => {
                info!(
                    "Terminal hidden: id={}, state={}",
                    report.info.id, report.info.state
                );
                self.last_report = Some(report);
            }
            Err(e) => warn!("Session driver failed during hide: {}", e),
        }
        true
    }

    /// Start a brand-new session for the last target shown.
    ///
    /// Returns `None` if nothing was ever shown.
    pub async fn reopen(&mut self) -> Option<&SessionHandle> {
        let (target, credentials_configured) = self.last_target.clone()?;
        Some(self.show(target, credentials_configured).await)
    }

    /// The session currently shown.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Status of the session currently shown.
    pub fn status(&self) -> Option<SessionInfo> {
        self.current.as_ref().map(SessionHandle::info)
    }

    /// Final report of the last session hidden or replaced.
    pub fn last_report(&self) -> Option<&SessionReport> {
        self.last_report.as_ref()
    }
}
