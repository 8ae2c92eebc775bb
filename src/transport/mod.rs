//! Transport adapter boundary.
//!
//! The harness talks to the device under test through the [`Transport`]
//! trait: a write-only send, a blocking receive with an optional timeout, and
//! a device identifier query used for diagnostics. Transports carry frames
//! opaquely and hold no protocol state.

pub mod error;
pub mod udp;

pub use error::TransportError;
pub use udp::UdpTransport;

use std::fmt;
use std::time::Duration;

/// 48-bit device identifier (typically a MAC address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(u64);

impl DeviceId {
    const MASK: u64 = 0xFFFF_FFFF_FFFF;

    /// Creates an identifier, discarding bits above 48.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw & Self::MASK)
    }

    /// Raw 48-bit value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses twelve hex digits, with or without `:` separators.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let digits: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.is_empty()
            || digits.len() > 12
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }
        u64::from_str_radix(&digits, 16).ok().map(Self::new)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

impl serde::Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Packet transport to the device under test.
pub trait Transport {
    /// Transmits one frame. Returns once the frame has been handed off.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Blocks until a frame arrives and copies it into `buf`.
    ///
    /// Returns the number of bytes written. `timeout = None` waits
    /// indefinitely; otherwise [`TransportError::Timeout`] is returned once
    /// the timeout elapses. A return of `Ok(0)` signals a transport-level
    /// fault to the caller.
    fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>)
    -> Result<usize, TransportError>;

    /// Queries the device identifier. Diagnostic only.
    fn device_identifier(&mut self) -> Result<DeviceId, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }

    fn device_identifier(&mut self) -> Result<DeviceId, TransportError> {
        (**self).device_identifier()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }

    fn device_identifier(&mut self) -> Result<DeviceId, TransportError> {
        (**self).device_identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_masks_to_48_bits() {
        let id = DeviceId::new(0xFFFF_0011_2233_4455);
        assert_eq!(id.get(), 0x0011_2233_4455);
        assert_eq!(id.to_string(), "001122334455");
    }

    #[test]
    fn device_id_parse_forms() {
        assert_eq!(
            DeviceId::parse("00:11:22:33:44:55"),
            Some(DeviceId::new(0x0011_2233_4455))
        );
        assert_eq!(DeviceId::parse("0xabcdef"), Some(DeviceId::new(0xAB_CDEF)));
        assert_eq!(DeviceId::parse("1234567890abc"), None);
        assert_eq!(DeviceId::parse("zz"), None);
        assert_eq!(DeviceId::parse(""), None);
        assert_eq!(DeviceId::parse("0x0xabc"), None);
        assert_eq!(DeviceId::parse("+abc"), None);
        assert_eq!(DeviceId::parse("0XABC"), Some(DeviceId::new(0xABC)));
    }
}
