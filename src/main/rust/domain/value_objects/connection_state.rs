use std::fmt;

/// Broker connection states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, initial and terminal state
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected and subscribed
    Connected,
    /// Broker reported a disconnect, will connect again
    Reconnecting { attempt: u32 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Reconnecting { attempt } => write!(f, "RECONNECTING (attempt {})", attempt),
        }
    }
}

impl ConnectionState {
    /// Value of the `connection_status` gauge (1 only while connected)
    pub fn as_metric(&self) -> i64 {
        if self.is_connected() {
            1
        } else {
            0
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}
