//! Connectivity alert.
//!
//! Decides when a "server unreachable" signal should be raised to
//! collaborators. Rendering a banner is their business; this module only
//! tracks whether one is showing, so multi-channel pages raise at most one.
//!
//! # Rules
//!
//! | Event | Condition | Effect |
//! |-------|-----------|--------|
//! | channel not subscribed within the alert timeout after a close | alerts enabled, no banner showing | [`AlertSignal::Disconnected`] |
//! | subscribe handshake out of trials | same | same |
//! | any channel reaches `Subscribed` | banner showing | [`AlertSignal::Restored`] |

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::channel::HandlerList;
use crate::config::Settings;
use crate::identifiers::Route;

// ============================================================================
// AlertSignal
// ============================================================================

/// A change in page-level connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertSignal {
    /// A channel lost the server; show the banner.
    Disconnected {
        /// The channel that triggered the alert.
        route: Route,
        /// Text to show.
        message: String,
    },
    /// A channel is subscribed again; hide the banner.
    Restored {
        /// The channel that recovered.
        route: Route,
    },
}

// ============================================================================
// Predicates
// ============================================================================

/// Returns `true` if no channel has its disconnect flag set.
pub fn all_connected<I>(alert_flags: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    alert_flags.into_iter().all(|triggered| !triggered)
}

/// Returns `true` if a disconnect should be signalled now.
#[inline]
#[must_use]
pub const fn should_raise(enabled: bool, banner_visible: bool) -> bool {
    enabled && !banner_visible
}

/// Returns `true` if a recovery should be signalled now.
#[inline]
#[must_use]
pub const fn should_clear(banner_visible: bool) -> bool {
    banner_visible
}

// ============================================================================
// AlertState
// ============================================================================

/// Page-wide banner state shared by every channel of a registry.
#[derive(Debug)]
pub struct AlertState {
    enabled: bool,
    message: String,
    banner_visible: AtomicBool,
    handlers: HandlerList<AlertSignal>,
}

impl AlertState {
    /// Creates the alert state described by `settings`.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: settings.show_alert,
            message: settings.alert_message.clone(),
            banner_visible: AtomicBool::new(false),
            handlers: HandlerList::default(),
        }
    }

    /// Handlers receiving [`AlertSignal`]s.
    #[inline]
    #[must_use]
    pub fn handlers(&self) -> &HandlerList<AlertSignal> {
        &self.handlers
    }

    /// Returns `true` while a disconnect banner is showing.
    #[inline]
    #[must_use]
    pub fn banner_visible(&self) -> bool {
        self.banner_visible.load(Ordering::SeqCst)
    }

    /// Signals a disconnect for `route` unless a banner is already showing.
    ///
    /// Returns `true` if a signal was emitted.
    pub fn raise(&self, route: &Route) -> bool {
        if !should_raise(self.enabled, self.banner_visible()) {
            return false;
        }
        if self.banner_visible.swap(true, Ordering::SeqCst) {
            return false;
        }

        warn!(route = %route, "Server unreachable, raising connectivity alert");
        self.handlers.emit(&AlertSignal::Disconnected {
            route: route.clone(),
            message: self.message.clone(),
        });
        true
    }

    /// Signals recovery if a banner is showing.
    ///
    /// Returns `true` if a signal was emitted.
    pub fn clear(&self, route: &Route) -> bool {
        if !should_clear(self.banner_visible()) {
            return false;
        }
        if !self.banner_visible.swap(false, Ordering::SeqCst) {
            return false;
        }

        info!(route = %route, "Connectivity restored");
        self.handlers.emit(&AlertSignal::Restored {
            route: route.clone(),
        });
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
