pub mod bridge;
#[cfg(feature = "simulation")]
pub mod bridge_sim;
pub mod command;
pub mod command_loop;
pub mod fault;
pub mod response;
pub mod rtd;
pub mod transport;

pub use bridge::{Reading, SensorBridge};
#[cfg(feature = "simulation")]
pub use bridge_sim::{FaultSchedule, SimulatedBridge};
pub use command::Command;
pub use command_loop::{CommandLoop, LoopConfig, LoopState, LoopStats};
pub use fault::FaultFlags;
pub use response::{FaultReport, ParseError, Response, FAULT_NOTICE};
pub use rtd::{ConfigError, RtdConfig, WireMode};
pub use transport::{LineEnding, MemoryTransport, Transport, TransportError};
