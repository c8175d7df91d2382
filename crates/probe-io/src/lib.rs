pub mod client;
pub mod metrics;
#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;

pub use client::{ClientError, ProbeClient};
pub use metrics::{init_metrics, serve_metrics};
#[cfg(feature = "serial")]
pub use serial::{list_ports, open_port, SerialConfig, SerialTransport};
pub use tcp::TcpTransport;
