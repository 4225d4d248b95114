//! Mount points: the host-side containers a surface is placed in.
//!
//! The host owns a [`MountPoint`] and publishes the container's pixel bounds
//! whenever its layout changes. A surface holds a [`Mount`], which reads the
//! current bounds and can await the next change. This is the viewport
//! listener the session bridge registers while a session is live.

use std::sync::Arc;

use tokio::sync::watch;

use termbridge_core::PixelSize;

/// Host-side container that publishes its pixel bounds.
///
/// Cloning yields another handle to the same container. A mount point with
/// no bounds (never laid out, or hidden) is not available for attachment.
#[derive(Debug, Clone)]
pub struct MountPoint {
    bounds: Arc<watch::Sender<Option<PixelSize>>>,
}

impl MountPoint {
    /// Container that has not been laid out yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            bounds: Arc::new(tx),
        }
    }

    /// Container with known bounds.
    pub fn with_bounds(bounds: PixelSize) -> Self {
        let point = Self::new();
        point.set_bounds(bounds);
        point
    }

    /// Publish new bounds. Returns true if they differ from the current ones.
    pub fn set_bounds(&self, bounds: PixelSize) -> bool {
        self.bounds.send_if_modified(|current| {
            if *current == Some(bounds) {
                false
            } else {
                *current = Some(bounds);
                true
            }
        })
    }

    /// Mark the container as having no layout (hidden or removed).
    pub fn clear(&self) {
        self.bounds.send_if_modified(|current| current.take().is_some());
    }

    /// Current bounds.
    pub fn bounds(&self) -> Option<PixelSize> {
        *self.bounds.borrow()
    }

    /// Surface-side handle to this container.
    pub fn mount(&self) -> Mount {
        Mount {
            bounds: self.bounds.subscribe(),
        }
    }

    /// Number of live [`Mount`] handles.
    pub fn listener_count(&self) -> usize {
        self.bounds.receiver_count()
    }
}

impl Default for MountPoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Surface-side view of a [`MountPoint`].
#[derive(Debug, Clone)]
pub struct Mount {
    bounds: watch::Receiver<Option<PixelSize>>,
}

impl Mount {
    /// Current bounds of the container.
    pub fn bounds(&self) -> Option<PixelSize> {
        *self.bounds.borrow()
    }

    /// Whether the container currently has a layout.
    pub fn is_available(&self) -> bool {
        self.bounds().is_some()
    }

    /// Consume a pending bounds change without waiting.
    ///
    /// Returns `None` when nothing changed since the last observation.
    pub fn take_change(&mut self) -> Option<Option<PixelSize>> {
        if self.bounds.has_changed().unwrap_or(false) {
            Some(*self.bounds.borrow_and_update())
        } else {
            None
        }
    }

    /// Wait for the container's bounds to change.
    ///
    /// Returns `None` once every [`MountPoint`] handle has been dropped.
    pub async fn changed(&mut self) -> Option<Option<PixelSize>> {
        self.bounds.changed().await.ok()?;
        Some(*self.bounds.borrow_and_update())
    }
}
