//! Host side of the probe protocol: send a command byte, read one line back.
//!
//! A reply that times out is still owed by the probe. The client keeps the
//! partial line and discards the late reply before the next request, so every
//! value it returns answers the request that asked for it.

use probe_core::{Command, ParseError, Response};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("probe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe closed the connection")]
    Closed,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ClientError {
    /// True when the read timed out and the reply may still arrive.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(e) if is_timeout(e))
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

pub struct ProbeClient<S: Read + Write> {
    reader: BufReader<S>,
    /// Bytes of a line that has not seen its terminator yet.
    partial: Vec<u8>,
    /// Replies that timed out and are expected late.
    owed: usize,
}

impl<S: Read + Write> ProbeClient<S> {
    /// Read timeouts are whatever the stream was configured with.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            partial: Vec::new(),
            owed: 0,
        }
    }

    pub fn request_reading(&mut self) -> Result<Response, ClientError> {
        self.resync()?;
        self.send_command(Command::Read)?;
        self.read_response()
    }

    pub fn send_command(&mut self, command: Command) -> Result<(), ClientError> {
        self.send_raw(&[command.byte()])
    }

    /// Sends bytes verbatim, including ones the probe will ignore.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let stream = self.reader.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    pub fn read_response(&mut self) -> Result<Response, ClientError> {
        match self.read_line() {
            Ok(line) => Ok(Response::parse(&line)?),
            Err(e) => {
                if e.is_timeout() {
                    self.owed += 1;
                }
                Err(e)
            }
        }
    }

    /// Replies still expected from requests that timed out.
    pub fn owed_replies(&self) -> usize {
        self.owed
    }

    /// Drops late replies to earlier requests. A reply that still has not
    /// arrived within one read timeout is taken as lost.
    pub fn resync(&mut self) -> Result<(), ClientError> {
        while self.owed > 0 {
            match self.read_line() {
                Ok(line) => {
                    self.owed -= 1;
                    debug!(line = line.trim_end(), "Discarded late reply");
                }
                Err(e) if e.is_timeout() => {
                    debug!(owed = self.owed, "Late replies never arrived");
                    self.owed = 0;
                    self.partial.clear();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ClientError> {
        // On error `read_until` leaves what it read in `partial`.
        let n = self.reader.read_until(b'\n', &mut self.partial)?;
        if n == 0 && self.partial.is_empty() {
            return Err(ClientError::Closed);
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Ok(line)
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}
