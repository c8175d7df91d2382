//! Host-side reader: asks a probe for readings and optionally records them.
//! With `--target` it also computes a heater output per reading.

use probe_core::Response;
use probe_io::{ClientError, ProbeClient};
use rtd_probe::control::{ControlConfig, ControlError, HeaterControl};
use rtd_probe::infra::ReadingRecorder;
use rtd_probe::runtime::init_tracing;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
enum OptionsError {
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("{0} needs --target")]
    NeedsTarget(String),

    #[error(transparent)]
    Control(#[from] ControlError),
}

#[derive(Debug, Clone, PartialEq)]
struct QueryOptions {
    serial_path: Option<String>,
    connect_addr: String,
    baud_rate: u32,
    count: u64,
    interval: Duration,
    timeout: Duration,
    settle: Option<Duration>,
    record_path: Option<PathBuf>,
    json_logs: bool,
    list_ports: bool,
    show_help: bool,
    target_c: Option<f64>,
    kp: Option<f64>,
    ki: Option<f64>,
    kd: Option<f64>,
    ramp_step: Option<f64>,
    ramp_limit: Option<f64>,
    max_output: Option<f64>,
    /// Problems seen while parsing; reported by `validate`.
    arg_errors: Vec<(String, Option<String>)>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            serial_path: None,
            connect_addr: "127.0.0.1:7100".to_string(),
            baud_rate: 9600,
            count: 1,
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(2000),
            settle: None,
            record_path: None,
            json_logs: false,
            list_ports: false,
            show_help: false,
            target_c: None,
            kp: None,
            ki: None,
            kd: None,
            ramp_step: None,
            ramp_limit: None,
            max_output: None,
            arg_errors: Vec::new(),
        }
    }
}

impl QueryOptions {
    fn from_args(args: &[String]) -> Self {
        let mut opts = QueryOptions::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--serial" => opts.serial_path = opts.take(args, &mut i),
                "--connect" => {
                    if let Some(v) = opts.take(args, &mut i) {
                        opts.connect_addr = v;
                    }
                }
                "--baud" => {
                    if let Some(v) = opts.take_parsed(args, &mut i) {
                        opts.baud_rate = v;
                    }
                }
                "--count" => {
                    if let Some(v) = opts.take_parsed(args, &mut i) {
                        opts.count = v;
                    }
                }
                "--interval-ms" => {
                    if let Some(ms) = opts.take_parsed(args, &mut i) {
                        opts.interval = Duration::from_millis(ms);
                    }
                }
                "--timeout-ms" => {
                    if let Some(ms) = opts.take_parsed(args, &mut i) {
                        opts.timeout = Duration::from_millis(ms);
                    }
                }
                "--settle-ms" => {
                    opts.settle = opts.take_parsed(args, &mut i).map(Duration::from_millis);
                }
                "--record" => opts.record_path = opts.take(args, &mut i).map(PathBuf::from),
                "--target" => opts.target_c = opts.take_parsed(args, &mut i),
                "--kp" => opts.kp = opts.take_parsed(args, &mut i),
                "--ki" => opts.ki = opts.take_parsed(args, &mut i),
                "--kd" => opts.kd = opts.take_parsed(args, &mut i),
                "--ramp-step" => opts.ramp_step = opts.take_parsed(args, &mut i),
                "--ramp-limit" => opts.ramp_limit = opts.take_parsed(args, &mut i),
                "--max-output" => opts.max_output = opts.take_parsed(args, &mut i),
                "--json-logs" => opts.json_logs = true,
                "--list-ports" => opts.list_ports = true,
                "--help" | "-h" => {
                    opts.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        opts
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

    /// Checks the options and builds the heater control when `--target` is given.
    fn validate(&self) -> Result<Option<HeaterControl>, OptionsError> {
        if let Some((flag, value)) = self.arg_errors.first() {
            return Err(match value {
                Some(value) => OptionsError::InvalidValue {
                    flag: flag.clone(),
                    value: value.clone(),
                },
                None => OptionsError::MissingValue(flag.clone()),
            });
        }

        let Some(target_c) = self.target_c else {
            let tuning = [
                ("--kp", self.kp),
                ("--ki", self.ki),
                ("--kd", self.kd),
                ("--ramp-step", self.ramp_step),
                ("--ramp-limit", self.ramp_limit),
                ("--max-output", self.max_output),
            ];
            return match tuning.iter().find(|(_, v)| v.is_some()) {
                Some((flag, _)) => Err(OptionsError::NeedsTarget(flag.to_string())),
                None => Ok(None),
            };
        };

        let mut config = ControlConfig::with_target(target_c);
        config.gains.kp = self.kp.unwrap_or(config.gains.kp);
        config.gains.ki = self.ki.unwrap_or(config.gains.ki);
        config.gains.kd = self.kd.unwrap_or(config.gains.kd);
        config.ramp_step = self.ramp_step.unwrap_or(config.ramp_step);
        config.ramp_limit = self.ramp_limit.unwrap_or(config.ramp_limit);
        config.max_output = self.max_output.unwrap_or(config.max_output);
        Ok(Some(HeaterControl::new(config)?))
    }

    /// Boards that reset when the port opens need a moment before the first command.
    fn settle_time(&self) -> Duration {
        self.settle.unwrap_or(if self.serial_path.is_some() {
            Duration::from_secs(2)
        } else {
            Duration::ZERO
        })
    }
}

fn print_help() {
    println!(
        r#"probe_query - read temperatures from an rtd-probe

USAGE:
    probe_query [OPTIONS]

OPTIONS:
    --serial <PATH>         Talk to the probe on a serial port
    --connect <ADDR>        Talk to the probe over TCP [default: 127.0.0.1:7100]
    --baud <RATE>           Serial baud rate [default: 9600]
    --count <N>             Number of readings, 0 for no limit [default: 1]
    --interval-ms <MS>      Delay between readings [default: 1000]
    --timeout-ms <MS>       Read timeout per reading [default: 2000]
    --settle-ms <MS>        Wait after opening the link [default: 2000 serial, 0 TCP]
    --record <PATH>         Append readings to a JSONL file
    --json-logs             Output logs in JSON format
    --list-ports            List serial ports and exit
    -h, --help              Print this help message

HEATER CONTROL:
    --target <C>            Drive a heater toward this temperature: ramp the
                            output until the probe reads the target, then PID
    --kp <GAIN>             Proportional gain [default: 0.65]
    --ki <GAIN>             Integral gain [default: 0.01]
    --kd <GAIN>             Derivative gain [default: 0.05]
    --ramp-step <V>         Output added per reading while ramping [default: 0.05]
    --ramp-limit <V>        Highest ramp output [default: 6.0]
    --max-output <V>        Upper output clamp [default: 12.0]

    With --target each line is "<temperature> <mode> <output>".
"#
    );
}

#[derive(Debug, Default)]
struct QuerySummary {
    readings: u64,
    faults: u64,
    missed: u64,
}

fn query<S: Read + Write>(
    mut client: ProbeClient<S>,
    opts: &QueryOptions,
    mut heater: Option<HeaterControl>,
    mut recorder: Option<&mut ReadingRecorder>,
) -> Result<QuerySummary, ClientError> {
    let mut summary = QuerySummary::default();
    let mut taken = 0u64;

    while opts.count == 0 || taken < opts.count {
        if taken > 0 {
            thread::sleep(opts.interval);
        }
        taken += 1;

        let response = match client.request_reading() {
            Ok(response) => Some(response),
            Err(ClientError::Parse(e)) => {
                warn!(error = %e, "Invalid data received");
                None
            }
            Err(e) if e.is_timeout() => {
                warn!("No response within timeout");
                None
            }
            Err(e) => return Err(e),
        };

        let shown = match &response {
            Some(Response::Temperature(value)) => {
                summary.readings += 1;
                info!(temperature_c = *value, "Reading");
                format!("{value:.2}")
            }
            Some(Response::Fault(bits)) => {
                summary.faults += 1;
                warn!(fault = ?bits.map(|b| b.to_string()), "Probe reported a fault");
                "fault".to_string()
            }
            None => {
                summary.missed += 1;
                "-".to_string()
            }
        };

        let Some(heater) = heater.as_mut() else {
            if let Some(response) = &response {
                println!("{shown}");
                if let Some(recorder) = recorder.as_deref_mut() {
                    if let Err(e) = recorder.record(response) {
                        warn!(error = %e, "Failed to record reading");
                    }
                }
            }
            continue;
        };

        let temperature_c = response
            .as_ref()
            .and_then(Response::temperature)
            .map(f64::from);
        let output_v = heater.step(temperature_c);
        let mode = heater.mode();
        debug!(%mode, output_v, "Heater output");
        println!("{shown} {mode} {output_v:.3}");
        if let Some(recorder) = recorder.as_deref_mut() {
            if let Err(e) = recorder.record_controlled(response.as_ref(), mode, output_v) {
                warn!(error = %e, "Failed to record reading");
            }
        }
    }
    Ok(summary)
}

fn run(opts: QueryOptions, heater: Option<HeaterControl>) -> Result<QuerySummary, ClientError> {
    let mut recorder = match &opts.record_path {
        Some(path) => {
            info!(path = %path.display(), "Recording readings");
            Some(ReadingRecorder::new(path)?)
        }
        None => None,
    };

    if let Some(config) = heater.as_ref().map(HeaterControl::config) {
        info!(
            target_c = config.target_c,
            kp = config.gains.kp,
            ki = config.gains.ki,
            kd = config.gains.kd,
            "Heater control enabled"
        );
    }

    if let Some(path) = &opts.serial_path {
        let port = probe_io::open_port(&probe_io::SerialConfig {
            path: path.clone(),
            baud_rate: opts.baud_rate,
            timeout: opts.timeout,
            ..Default::default()
        })
        .map_err(std::io::Error::other)?;
        thread::sleep(opts.settle_time());
        return query(ProbeClient::new(port), &opts, heater, recorder.as_mut());
    }

    let stream = TcpStream::connect(&opts.connect_addr)?;
    stream.set_read_timeout(Some(opts.timeout))?;
    info!(addr = %opts.connect_addr, "Connected to probe");
    thread::sleep(opts.settle_time());
    query(ProbeClient::new(stream), &opts, heater, recorder.as_mut())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let opts = QueryOptions::from_args(&args);
    if opts.show_help {
        print_help();
        return;
    }
    let heater = match opts.validate() {
        Ok(heater) => heater,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    if opts.list_ports {
        match probe_io::list_ports() {
            Ok(ports) if ports.is_empty() => println!("  (none)"),
            Ok(ports) => {
                for (name, kind) in ports {
                    println!("  {name} - {kind}");
                }
            }
            Err(e) => {
                eprintln!("Error listing ports: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let _log_guard = init_tracing(opts.json_logs, None);
    match run(opts, heater) {
        Ok(summary) => info!(
            readings = summary.readings,
            faults = summary.faults,
            missed = summary.missed,
            "Query complete"
        ),
        Err(e) => {
            error!(error = %e, "Query failed");
            std::process::exit(1);
        }
    }
}
