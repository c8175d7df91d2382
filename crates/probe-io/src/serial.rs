//! Serial-port transport for the probe and its host client.

use probe_core::{LineEnding, Transport, TransportError};
use serialport::{FlowControl, SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// Upper bound for a single blocking read or write.
    pub timeout: Duration,
    pub line_ending: LineEnding,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout: Duration::from_millis(100),
            line_ending: LineEnding::Lf,
        }
    }
}

/// Opens the raw port; shared by the transport and the host client.
pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>, TransportError> {
    let port = serialport::new(&config.path, config.baud_rate)
        .timeout(config.timeout)
        .flow_control(FlowControl::None)
        .open()
        .map_err(std::io::Error::from)?;
    info!(path = %config.path, baud = config.baud_rate, "Serial port opened");
    Ok(port)
}

/// Port names with a short type label, for `--list-ports` style output.
pub fn list_ports() -> Result<Vec<(String, &'static str)>, TransportError> {
    let ports = serialport::available_ports().map_err(std::io::Error::from)?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let kind = match port.port_type {
                SerialPortType::UsbPort(_) => "USB",
                SerialPortType::BluetoothPort => "Bluetooth",
                SerialPortType::PciPort => "PCI",
                SerialPortType::Unknown => "Unknown",
            };
            (port.port_name, kind)
        })
        .collect())
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    line_ending: LineEnding,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = open_port(config)?;
        Ok(Self::from_port(port, config.line_ending))
    }

    pub fn from_port(port: Box<dyn SerialPort>, line_ending: LineEnding) -> Self {
        Self { port, line_ending }
    }
}

impl Transport for SerialTransport {
    fn available(&mut self) -> bool {
        match self.port.bytes_to_read() {
            Ok(n) => n > 0,
            Err(e) => {
                warn!(error = %e, "Serial availability check failed");
                false
            }
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            Ok(_) => None,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => None,
            Err(e) => {
                warn!(error = %e, "Serial read failed");
                None
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(self.line_ending.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}
