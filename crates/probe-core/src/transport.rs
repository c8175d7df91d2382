use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no peer connected")]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// Byte-in, line-out channel. Reads never block.
pub trait Transport {
    /// Whether at least one input byte can be read right now.
    fn available(&mut self) -> bool;

    fn read_byte(&mut self) -> Option<u8>;

    /// Writes `line` followed by the transport's line terminator.
    fn write_line(&mut self, line: &str) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn available(&mut self) -> bool {
        (**self).available()
    }

    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        (**self).write_line(line)
    }
}

/// Queue-backed transport for tests and loopback runs.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    line_ending: LineEnding,
    fail_writes: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn push_input(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        self.inbound.len()
    }

    pub fn output(&self) -> &[u8] {
        &self.outbound
    }

    /// Drains everything written so far as text.
    pub fn take_output(&mut self) -> String {
        let bytes = std::mem::take(&mut self.outbound);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Makes subsequent writes fail with `Disconnected`.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl Transport for MemoryTransport {
    fn available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.inbound.pop_front()
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::Disconnected);
        }
        self.outbound.extend_from_slice(line.as_bytes());
        self.outbound.extend_from_slice(self.line_ending.as_bytes());
        Ok(())
    }
}
