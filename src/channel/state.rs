//! Channel connection states.

use std::fmt;

// ============================================================================
// ChannelState
// ============================================================================

/// Where a channel is in its connect/subscribe lifecycle.
///
/// ```text
/// Disconnected ──► Connecting ──► Open ──► Subscribed
///                      ▲            │          │
///                      │            ▼          ▼
///                      └────── Reconnecting ◄──┘   (transport close)
///
/// any ──► Closing ──► Disconnected                 (unsubscribe / shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// No transport.
    #[default]
    Disconnected,
    /// A transport is opening.
    Connecting,
    /// The transport is open; no subscription acknowledgement yet.
    Open,
    /// The server acknowledged the subscription.
    Subscribed,
    /// The transport closed; a reconnect is scheduled.
    Reconnecting,
    /// Teardown requested; waiting for the transport to close.
    Closing,
}

impl ChannelState {
    /// Returns `true` if the transport is usable.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open | Self::Subscribed)
    }

    /// Returns `true` for states left by an intentional teardown.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Disconnected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(ChannelState::Open.is_connected());
        assert!(ChannelState::Subscribed.is_connected());
        assert!(!ChannelState::Reconnecting.is_connected());
        assert!(ChannelState::Closing.is_terminal());
        assert!(!ChannelState::Connecting.is_terminal());
        assert_eq!(ChannelState::default(), ChannelState::Disconnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChannelState::Subscribed.to_string(), "subscribed");
    }
}
