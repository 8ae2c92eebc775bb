//! Transport layer errors.

use std::io;
use thiserror::Error;

/// Errors raised by a [`Transport`](super::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link or device went away.
    #[error("Transport closed")]
    Closed,

    /// No frame arrived within the receive timeout.
    #[error("Timeout waiting for frame")]
    Timeout,

    /// The frame could not be transmitted.
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Why the send failed.
        reason: String,
    },

    /// The frame does not fit the caller's receive buffer.
    #[error("Frame of {len} bytes exceeds receive buffer of {capacity} bytes")]
    Oversized {
        /// Frame length.
        len: usize,
        /// Receive buffer length.
        capacity: usize,
    },

    /// Underlying I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// The source I/O error.
        #[from]
        source: io::Error,
    },
}

impl TransportError {
    /// Maps socket timeouts onto [`TransportError::Timeout`].
    ///
    /// Platforms disagree on whether an expired read timeout surfaces as
    /// `WouldBlock` or `TimedOut`; both mean the same thing here.
    #[must_use]
    pub fn from_recv_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io { source: err },
        }
    }

    /// Returns `true` for [`TransportError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert_eq!(format!("{}", TransportError::Closed), "Transport closed");
        assert_eq!(
            format!("{}", TransportError::Timeout),
            "Timeout waiting for frame"
        );
        let failed = TransportError::SendFailed {
            reason: "queue overflow".into(),
        };
        assert!(format!("{failed}").contains("queue overflow"));
        let big = TransportError::Oversized {
            len: 4000,
            capacity: 2064,
        };
        assert!(format!("{big}").contains("4000"));
    }

    #[test]
    fn transport_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: TransportError = io_err.into();
        assert!(format!("{err}").contains("refused"));
        assert!(matches!(err, TransportError::Io { .. }));
    }

    #[test]
    fn recv_timeouts_are_normalized() {
        let would_block = io::Error::new(io::ErrorKind::WouldBlock, "again");
        assert!(TransportError::from_recv_io(would_block).is_timeout());
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "late");
        assert!(TransportError::from_recv_io(timed_out).is_timeout());
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(!TransportError::from_recv_io(reset).is_timeout());
    }
}
