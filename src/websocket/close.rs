//! Close-status translation between the two legs of a proxied session.
//!
//! # Responsibilities
//! - Map a peer-supplied close code to one that is legal to send to the other peer
//! - Carry close code + reason as a transport-neutral `CloseEvent`
//!
//! # Design Decisions
//! - Application range (3000..5000) and the well-defined standard codes pass through
//! - Reserved, non-transmittable and unknown codes collapse to 1002 (protocol error)
//! - Only applied to closes received from a peer, never to locally initiated closes

/// Normal closure.
pub const NORMAL: u16 = 1000;
/// Endpoint going away (server shutdown, page navigation).
pub const GOING_AWAY: u16 = 1001;
/// Protocol error.
pub const PROTOCOL_ERROR: u16 = 1002;
/// Reserved: a close frame carried no status code. Never sent on the wire.
pub const NO_STATUS: u16 = 1005;
/// Reserved: the connection dropped without a close frame. Never sent on the wire.
pub const ABNORMAL: u16 = 1006;

/// Standard codes that are safe to relay to the other peer unchanged.
const PASS_THROUGH: [u16; 9] = [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011];

/// Translate a close code received from one peer into the code forwarded to the other.
pub fn adapt(code: u16) -> u16 {
    if (3000..5000).contains(&code) || PASS_THROUGH.contains(&code) {
        code
    } else {
        PROTOCOL_ERROR
    }
}

/// A close code plus optional reason text, originating from either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(NORMAL, "")
    }

    pub fn going_away() -> Self {
        Self::new(GOING_AWAY, "")
    }

    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self::new(PROTOCOL_ERROR, reason)
    }

    /// Stand-in for a close frame that arrived without a status code.
    pub fn no_status() -> Self {
        Self::new(NO_STATUS, "")
    }

    /// Stand-in for a connection that ended or failed without a close frame.
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL, "")
    }

    /// The event to forward to the opposite peer.
    ///
    /// The reason text survives only when the code is relayed verbatim; a rewritten
    /// code gets an empty reason so the peer never sees text that contradicts it.
    pub fn translated(&self) -> Self {
        let code = adapt(self.code);
        if code == self.code {
            self.clone()
        } else {
            Self::new(code, "")
        }
    }
}

impl std::fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}
