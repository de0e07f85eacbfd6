//! Incognito mode
//!
//! A session-scoped switch that suppresses all progress persistence. It is
//! never written to disk and every new gate starts with tracking enabled.
//! UI surfaces subscribe to the watch channel to keep indicators and menu
//! labels in step with toggles.

use tokio::sync::watch;
use tracing::info;

/// Whether reading progress is being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Progress is saved normally
    Tracking,
    /// Saves and deletes are ignored
    Incognito,
}

impl TrackingMode {
    /// Label for a menu item that switches to the other mode
    pub fn toggle_label(self) -> &'static str {
        match self {
            TrackingMode::Tracking => "Enable Incognito Mode",
            TrackingMode::Incognito => "Disable Incognito Mode",
        }
    }

    /// Short status indicator text
    pub fn status_label(self) -> &'static str {
        match self {
            TrackingMode::Tracking => "Tracking",
            TrackingMode::Incognito => "Incognito",
        }
    }
}

/// Session switch gating writes to the progress store
#[derive(Debug)]
pub struct IncognitoGate {
    mode: watch::Sender<TrackingMode>,
}

impl Default for IncognitoGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IncognitoGate {
    /// Create a gate with tracking enabled
    pub fn new() -> Self {
        let (mode, _) = watch::channel(TrackingMode::Tracking);
        Self { mode }
    }

    /// Current mode
    pub fn mode(&self) -> TrackingMode {
        *self.mode.borrow()
    }

    /// Whether writes may reach the store
    pub fn is_tracking(&self) -> bool {
        self.mode() == TrackingMode::Tracking
    }

    /// Flip the mode and return the new one
    pub fn toggle(&self) -> TrackingMode {
        let mut next = TrackingMode::Tracking;
        self.mode.send_modify(|mode| {
            *mode = match *mode {
                TrackingMode::Tracking => TrackingMode::Incognito,
                TrackingMode::Incognito => TrackingMode::Tracking,
            };
            next = *mode;
        });
        info!("Tracking mode changed to {}", next.status_label());
        next
    }

    /// Set the mode explicitly
    pub fn set(&self, mode: TrackingMode) {
        // send_replace never fails, even with no subscribers
        let previous = self.mode.send_replace(mode);
        if previous != mode {
            info!("Tracking mode changed to {}", mode.status_label());
        }
    }

    /// Subscribe to mode changes
    pub fn subscribe(&self) -> watch::Receiver<TrackingMode> {
        self.mode.subscribe()
    }
}
