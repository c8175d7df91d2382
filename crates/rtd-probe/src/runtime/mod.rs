mod app;
mod config;
mod logging;
mod telemetry;

pub use app::{run, run_from_args, EXIT_CONFIG, EXIT_OK, EXIT_TRANSPORT};
pub use config::{RuntimeConfig, RuntimeConfigError, SensorKind};
pub use logging::init_tracing;
