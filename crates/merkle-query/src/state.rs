//! Connection lifecycle.
//!
//! ```text
//! ┌─────────────┐ connect ┌─────────┐  dialed  ┌───────────┐  probe ok  ┌───────┐
//! │ Unconnected │ ──────→ │ Dialing │ ───────→ │ Verifying │ ─────────→ │ Ready │
//! └─────────────┘         └─────────┘          └───────────┘            └───────┘
//!        ↑                     │  ↑   failure, backoff │                     │
//!        │                     │  └────────────────────┘                     │
//!        └── exhausted/cancel ─┘                                  connect ───┘
//!                                                          (tear down, redial)
//! ```
//!
//! [`close`](crate::MerkleQueryClient::close) moves any state to `Closed`.
//! Channels are never repaired in place: a failed attempt discards its
//! channel and the next attempt dials a new one.

use std::fmt;

/// Where a client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No channel exists and no connect is in progress.
    #[default]
    Unconnected,
    /// A transport connection is being opened.
    Dialing,
    /// The channel is open; waiting for readiness and the contract probe.
    Verifying,
    /// Verified and serving queries.
    Ready,
    /// Released by `close`.
    Closed,
}

impl ConnectionState {
    /// Returns `true` when queries may be issued.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Dialing => write!(f, "dialing"),
            Self::Verifying => write!(f, "verifying"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
