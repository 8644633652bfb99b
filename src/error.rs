//! Error taxonomy for the simulator core.
//!
//! A flat set of variants carrying a human-readable `String`, no external
//! error crate. Recovery policy: `InvalidArgument`/`InvalidState` are
//! configuration mistakes and should abort the run; `ProtocolViolation`/
//! `ReceptionFailure` are routine MAC-layer events the reader/tag already
//! recover from via their own timeout/retry logic and are surfaced only
//! through the [`crate::observer::SimObserver`] stream, never as a
//! propagated `Err`.

use std::fmt;

/// Errors produced by the codec, timing, event-queue and MAC layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Malformed input: odd-length EPC hex, out-of-range byte, unknown
    /// modulation, Q outside `0..=15`, negative duration, timer index
    /// outside `1..=7`.
    InvalidArgument(String),
    /// Mis-wired simulation: second reader attached to a channel, event
    /// targeting a destroyed entity, pop from an empty queue.
    InvalidState(String),
    /// rn16 mismatch in ACK/Req_RN/Read. Not fatal — the tag silently
    /// ignores the command.
    ProtocolViolation(String),
    /// Frame dropped to collision or the BER coin-flip. Not fatal — the
    /// reader simply times out and retries the slot.
    ReceptionFailure(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            SimError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            SimError::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            SimError::ReceptionFailure(msg) => write!(f, "reception failure: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;
