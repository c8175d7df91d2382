//! Serial emulation over TCP: one client at a time, bytes in, lines out.

use crate::metrics::CLIENT_CONNECTED;
use probe_core::{LineEnding, Transport, TransportError};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{info, warn};

/// Longest a response line may wait on a client that stopped reading.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

pub struct TcpTransport {
    listener: TcpListener,
    client: Option<TcpStream>,
    inbound: VecDeque<u8>,
    line_ending: LineEnding,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn bind(addr: &str, line_ending: LineEnding) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, "Waiting for probe client");
        Ok(Self {
            listener,
            client: None,
            inbound: VecDeque::with_capacity(64),
            line_ending,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Zero is clamped to one millisecond; the socket layer treats zero as "no timeout".
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn accept(&mut self) {
        if self.client.is_some() {
            return;
        }
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!(error = %e, "Failed to set client nonblocking");
                    return;
                }
                if let Err(e) = stream.set_write_timeout(Some(self.write_timeout)) {
                    warn!(error = %e, "Failed to set client write timeout");
                    return;
                }
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(error = %e, "Failed to disable Nagle on client");
                }
                info!(client_addr = %addr, "Probe client connected");
                self.client = Some(stream);
                CLIENT_CONNECTED.set(1.0);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }

    fn fill(&mut self) {
        let Some(stream) = self.client.as_mut() else {
            return;
        };
        let mut temp = [0u8; 256];
        match stream.read(&mut temp) {
            Ok(0) => {
                info!("Probe client disconnected");
                self.drop_client();
            }
            Ok(n) => self.inbound.extend(&temp[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!(error = %e, "Client read failed");
                self.drop_client();
            }
        }
    }

    fn drop_client(&mut self) {
        self.client = None;
        self.inbound.clear();
        CLIENT_CONNECTED.set(0.0);
    }
}

impl Transport for TcpTransport {
    fn available(&mut self) -> bool {
        self.accept();
        if self.inbound.is_empty() {
            self.fill();
        }
        !self.inbound.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.inbound.is_empty() {
            self.accept();
            self.fill();
        }
        self.inbound.pop_front()
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let Some(stream) = self.client.as_mut() else {
            return Err(TransportError::Disconnected);
        };

        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(self.line_ending.as_bytes());

        // Whole-line blocking write, bounded by the write timeout. A client that
        // stops reading is dropped so the loop keeps polling.
        let result = stream
            .set_nonblocking(false)
            .and_then(|_| stream.write_all(&buf))
            .and_then(|_| stream.set_nonblocking(true));

        if let Err(e) = result {
            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                warn!(
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Client stopped reading, dropping it"
                );
            } else {
                warn!(error = %e, "Client write failed");
            }
            self.drop_client();
            return Err(e.into());
        }
        Ok(())
    }
}
