use probe_core::{ConfigError, FaultReport, LineEnding, LoopConfig, RtdConfig, WireMode};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorKind {
    #[default]
    Pt100,
    Pt1000,
}

impl FromStr for SensorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pt100" => Ok(Self::Pt100),
            "pt1000" => Ok(Self::Pt1000),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("unsupported wire count {0} (expected 2, 3 or 4)")]
    InvalidWires(u8),

    #[error("--fault-every needs non-zero --fault-bits")]
    ZeroFaultBits,

    #[error(transparent)]
    Rtd(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub serial_path: Option<String>,
    pub baud_rate: u32,
    pub bind_addr: String,
    pub sensor: SensorKind,
    pub nominal_ohms: Option<f64>,
    pub reference_ohms: Option<f64>,
    pub wires: u8,
    pub sim_temp_c: f64,
    pub sim_ramp_c: f64,
    pub fault_every: Option<u64>,
    pub fault_bits: u8,
    pub fault_detail: bool,
    pub crlf: bool,
    pub precision: usize,
    pub poll_interval_ms: u64,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    /// Problems seen while parsing; reported by `validate`.
    pub arg_errors: Vec<(String, Option<String>)>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            serial_path: None,
            baud_rate: 9600,
            bind_addr: "127.0.0.1:7100".to_string(),
            sensor: SensorKind::Pt100,
            nominal_ohms: None,
            reference_ohms: None,
            wires: 4,
            sim_temp_c: 25.0,
            sim_ramp_c: 0.0,
            fault_every: None,
            fault_bits: 0x04,
            fault_detail: false,
            crlf: false,
            precision: 2,
            poll_interval_ms: 1,
            json_logs: false,
            log_file: None,
            metrics_addr: None,
            arg_errors: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--serial" => {
                    if let Some(v) = cfg.take(args, &mut i) {
                        cfg.serial_path = Some(v);
                    }
                }
                "--baud" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.baud_rate = v;
                    }
                }
                "--bind" => {
                    if let Some(v) = cfg.take(args, &mut i) {
                        cfg.bind_addr = v;
                    }
                }
                "--sensor" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.sensor = v;
                    }
                }
                "--rnominal" => {
                    cfg.nominal_ohms = cfg.take_parsed(args, &mut i);
                }
                "--rref" => {
                    cfg.reference_ohms = cfg.take_parsed(args, &mut i);
                }
                "--wires" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.wires = v;
                    }
                }
                "--sim-temp" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.sim_temp_c = v;
                    }
                }
                "--sim-ramp" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.sim_ramp_c = v;
                    }
                }
                "--fault-every" => {
                    cfg.fault_every = cfg.take_parsed(args, &mut i);
                }
                "--fault-bits" => {
                    if let Some(v) = cfg.take(args, &mut i) {
                        let hex = v.trim_start_matches("0x").trim_start_matches("0X");
                        match u8::from_str_radix(hex, 16) {
                            Ok(bits) => cfg.fault_bits = bits,
                            Err(_) => cfg.arg_errors.push((flag.to_string(), Some(v))),
                        }
                    }
                }
                "--fault-detail" => {
                    cfg.fault_detail = true;
                }
                "--crlf" => {
                    cfg.crlf = true;
                }
                "--precision" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.precision = v;
                    }
                }
                "--poll-interval-ms" => {
                    if let Some(v) = cfg.take_parsed(args, &mut i) {
                        cfg.poll_interval_ms = v;
                    }
                }
                "--run-seconds" => {
                    cfg.run_seconds = cfg.take_parsed(args, &mut i);
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-file" => {
                    cfg.log_file = cfg.take(args, &mut i).map(PathBuf::from);
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = cfg.take(args, &mut i);
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    fn take(&mut self, args: &[String], i: &mut usize) -> Option<String> {
        if *i + 1 < args.len() {
            *i += 1;
            Some(args[*i].clone())
        } else {
            self.arg_errors.push((args[*i].clone(), None));
            None
        }
    }

    fn take_parsed<T: FromStr>(&mut self, args: &[String], i: &mut usize) -> Option<T> {
        let flag = args[*i].clone();
        let value = self.take(args, i)?;
        match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.arg_errors.push((flag, Some(value)));
                None
            }
        }
    }

    /// Checks everything and returns the bridge configuration to start with.
    pub fn validate(&self) -> Result<RtdConfig, RuntimeConfigError> {
        if let Some((flag, value)) = self.arg_errors.first() {
            return Err(match value {
                Some(value) => RuntimeConfigError::InvalidValue {
                    flag: flag.clone(),
                    value: value.clone(),
                },
                None => RuntimeConfigError::MissingValue(flag.clone()),
            });
        }
        if self.fault_every.is_some() && self.fault_bits == 0 {
            return Err(RuntimeConfigError::ZeroFaultBits);
        }
        self.rtd_config()
    }

    pub fn rtd_config(&self) -> Result<RtdConfig, RuntimeConfigError> {
        let preset = match self.sensor {
            SensorKind::Pt100 => RtdConfig::pt100(),
            SensorKind::Pt1000 => RtdConfig::pt1000(),
        };
        let wire_mode =
            WireMode::from_count(self.wires).ok_or(RuntimeConfigError::InvalidWires(self.wires))?;
        Ok(RtdConfig::new(
            self.nominal_ohms.unwrap_or(preset.nominal_ohms()),
            self.reference_ohms.unwrap_or(preset.reference_ohms()),
            wire_mode,
        )?)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            precision: self.precision,
            fault_report: if self.fault_detail {
                FaultReport::Detailed
            } else {
                FaultReport::Notice
            },
        }
    }

    pub fn line_ending(&self) -> LineEnding {
        if self.crlf {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn print_help() {
        println!(
            r#"rtd-probe - PT100/PT1000 RTD probe with a single-byte serial command protocol

USAGE:
    rtd-probe [OPTIONS]

PROTOCOL:
    Send 'r' to read. The probe answers with one line: the temperature in
    degrees Celsius, or "Fault detected!" when the bridge latched a fault.
    Any other byte is ignored.

OPTIONS:
    --serial <PATH>         Serve on a serial port instead of TCP
    --baud <RATE>           Serial baud rate [default: 9600]
    --bind <ADDR>           TCP serial-emulation bind address [default: 127.0.0.1:7100]
    --sensor <KIND>         pt100 | pt1000 [default: pt100]
    --rnominal <OHMS>       Override the nominal (0 °C) resistance
    --rref <OHMS>           Override the reference resistor
    --wires <N>             RTD wiring: 2, 3 or 4 [default: 4]
    --sim-temp <C>          Simulated process temperature [default: 25.0]
    --sim-ramp <C>          Simulated temperature change per conversion [default: 0.0]
    --fault-every <N>       Latch a simulated fault on every Nth conversion
    --fault-bits <HEX>      Fault bits latched by --fault-every [default: 0x04]
    --fault-detail          Append the fault code and names to fault notices
    --crlf                  Terminate lines with CRLF instead of LF
    --precision <N>         Decimal places in temperature lines [default: 2]
    --poll-interval-ms <MS> Sleep between polls [default: 1]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-file <PATH>       Also write logs to a file
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,probe_core=trace)

EXAMPLES:
    # Simulated PT1000 on TCP, faulting every tenth read
    rtd-probe --sensor pt1000 --fault-every 10

    # Serve a USB serial adapter with metrics
    rtd-probe --serial /dev/ttyUSB0 --metrics-addr 0.0.0.0:9090
"#
        );
    }
}
