use std::fmt;

/// Lifecycle of a [`crate::session::ConnectionSession`].
///
/// ```text
/// Idle ──start──▶ Listening ──accept──▶ Connected ──close──▶ Closing ──▶ Closed
///                     │                    │  ▲
///                     │                    └──┘ readable / re-accept
///                     └──────── stop ──────┴──────────────────────────▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Connected,
    /// Transient: the peer's read subscription and handle are being released.
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
