//! Datagram transport to a device bridge.
//!
//! Each frame travels as one UDP datagram. The socket is connected to the
//! target, so datagrams from other peers are filtered by the kernel. Receive
//! timeouts are implemented with the socket read timeout.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::{DeviceId, Transport, TransportError};

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// UDP-backed [`Transport`].
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
    device_id: DeviceId,
    current_timeout: Option<Duration>,
}

impl UdpTransport {
    /// Binds `bind` and connects to `target`.
    ///
    /// UDP has no identity handshake, so the device identifier is supplied by
    /// the operator.
    pub fn connect(
        bind: SocketAddr,
        target: SocketAddr,
        device_id: DeviceId,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind)?;
        socket.connect(target)?;
        tracing::debug!(local = %socket.local_addr()?, %target, "udp transport connected");
        Ok(Self {
            socket,
            target,
            device_id,
            current_timeout: None,
        })
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Remote address frames are sent to.
    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    fn apply_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        // A zero duration is rejected by the socket API; treat it as the
        // shortest representable wait.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        if self.current_timeout != timeout {
            self.socket.set_read_timeout(timeout)?;
            self.current_timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let written = self.socket.send(frame)?;
        if written != frame.len() {
            return Err(TransportError::SendFailed {
                reason: format!("short datagram write: {written} of {} bytes", frame.len()),
            });
        }
        Ok(())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.apply_timeout(timeout)?;
        self.socket.recv(buf).map_err(TransportError::from_recv_io)
    }

    fn device_identifier(&mut self) -> Result<DeviceId, TransportError> {
        Ok(self.device_id)
    }
}
