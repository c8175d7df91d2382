use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, StatsPublisher};
use probe_core::{
    CommandLoop, FaultFlags, FaultSchedule, RtdConfig, SimulatedBridge, Transport, TransportError,
};
#[cfg(feature = "serial")]
use probe_io::serial::{SerialConfig, SerialTransport};
use probe_io::TcpTransport;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::{error, info};

pub const EXIT_OK: i32 = 0;
pub const EXIT_TRANSPORT: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

enum ProbeTransport {
    #[cfg(feature = "serial")]
    Serial(SerialTransport),
    Tcp(TcpTransport),
}

impl Transport for ProbeTransport {
    fn available(&mut self) -> bool {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(t) => t.available(),
            Self::Tcp(t) => t.available(),
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(t) => t.read_byte(),
            Self::Tcp(t) => t.read_byte(),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        match self {
            #[cfg(feature = "serial")]
            Self::Serial(t) => t.write_line(line),
            Self::Tcp(t) => t.write_line(line),
        }
    }
}

pub fn run_from_args() -> i32 {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return EXIT_OK;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> i32 {
    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref());

    let rtd = match config.validate() {
        Ok(rtd) => rtd,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return EXIT_CONFIG;
        }
    };

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let transport = match open_transport(&config) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to open transport");
            return EXIT_TRANSPORT;
        }
    };
    let bridge = build_bridge(&config, rtd);

    info!(
        sensor = ?config.sensor,
        nominal_ohms = rtd.nominal_ohms(),
        reference_ohms = rtd.reference_ohms(),
        wire_mode = %rtd.wire_mode(),
        poll_interval_ms = config.poll_interval_ms,
        "Starting probe command loop"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let timer_handle = config.run_seconds.map(|seconds| {
        info!(seconds, "Running for limited duration");
        let stop_timer = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop_timer.store(true, std::sync::atomic::Ordering::Relaxed);
        })
    });

    let mut probe = CommandLoop::new(bridge, transport, config.loop_config());
    let mut publisher = StatsPublisher::default();
    probe.run_with(&stop, |stats| publisher.publish(stats));

    if let Some(handle) = timer_handle {
        let _ = handle.join();
    }

    let stats = probe.stats();
    info!(
        polls = stats.polls,
        commands = stats.commands_processed,
        readings = stats.readings_reported,
        faults = stats.faults_reported,
        ignored_bytes = stats.ignored_bytes,
        write_failures = stats.write_failures,
        conversions = probe.bridge().conversions(),
        "Run complete"
    );
    EXIT_OK
}

fn open_transport(config: &RuntimeConfig) -> Result<ProbeTransport, TransportError> {
    #[cfg(feature = "serial")]
    if let Some(path) = &config.serial_path {
        let serial = SerialConfig {
            path: path.clone(),
            baud_rate: config.baud_rate,
            line_ending: config.line_ending(),
            ..Default::default()
        };
        return SerialTransport::open(&serial).map(ProbeTransport::Serial);
    }
    #[cfg(not(feature = "serial"))]
    if config.serial_path.is_some() {
        tracing::warn!("Built without serial support, serving on TCP instead");
    }

    TcpTransport::bind(&config.bind_addr, config.line_ending()).map(ProbeTransport::Tcp)
}

fn build_bridge(config: &RuntimeConfig, rtd: RtdConfig) -> SimulatedBridge {
    let mut bridge = SimulatedBridge::new(rtd)
        .with_temperature(config.sim_temp_c)
        .with_ramp(config.sim_ramp_c);
    if let Some(every) = config.fault_every {
        let flags = FaultFlags::from_bits(config.fault_bits);
        info!(every, fault = %flags, "Simulated fault injection enabled");
        bridge = bridge.with_fault_schedule(FaultSchedule { every, flags });
    }
    bridge
}
