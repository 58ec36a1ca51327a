//! Connection phases.
//!
//! A session moves through
//! `Disconnected → Connecting → Settling → Handshaking → Polling` and falls
//! back to `Disconnected` whenever it ends. Every transition is published to
//! the host as a [`ConnectionEvent`].

/// Connection phase of a charger session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionPhase {
    /// No link to the charger.
    #[default]
    Disconnected,
    /// Requesting a transport-level connection.
    Connecting,
    /// Connected; waiting for GATT state to settle before any write.
    Settling,
    /// Running the bind and hardware info exchanges.
    Handshaking,
    /// Running poll cycles.
    Polling,
}

impl ConnectionPhase {
    /// Check if the transport link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Settling | Self::Handshaking | Self::Polling)
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Settling => write!(f, "Settling"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Polling => write!(f, "Polling"),
        }
    }
}

/// Event for connection phase changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Phase before the transition.
    pub previous: ConnectionPhase,
    /// The new connection phase.
    pub phase: ConnectionPhase,
}

impl ConnectionEvent {
    /// Whether the host-visible connected status is true after this event.
    pub fn connected(&self) -> bool {
        self.phase.is_connected()
    }
}
