use crate::bridge::SensorBridge;
use crate::command::Command;
use crate::response::{FaultReport, Response};
use crate::transport::Transport;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub poll_interval: Duration,
    pub precision: usize,
    pub fault_report: FaultReport,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            precision: 2,
            fault_report: FaultReport::Notice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Reporting,
}

#[derive(Clone, Default, Debug)]
pub struct LoopStats {
    pub polls: u64,
    pub idle_polls: u64,
    pub commands_processed: u64,
    pub ignored_bytes: u64,
    pub readings_reported: u64,
    pub faults_reported: u64,
    pub write_failures: u64,
    pub last_temperature_c: Option<f32>,
    pub last_fault_bits: u8,
}

/// Request/response loop: one input byte per poll, one line per read command.
pub struct CommandLoop<B: SensorBridge, T: Transport> {
    bridge: B,
    transport: T,
    config: LoopConfig,
    state: LoopState,
    stats: LoopStats,
}

impl<B: SensorBridge, T: Transport> CommandLoop<B, T> {
    pub fn new(bridge: B, transport: T, config: LoopConfig) -> Self {
        Self {
            bridge,
            transport,
            config,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Runs one cycle. Returns at once when no input is pending.
    pub fn poll(&mut self) {
        self.stats.polls += 1;

        if !self.transport.available() {
            self.stats.idle_polls += 1;
            return;
        }
        let Some(byte) = self.transport.read_byte() else {
            self.stats.idle_polls += 1;
            return;
        };

        match Command::from_byte(byte) {
            Some(Command::Read) => {
                self.stats.commands_processed += 1;
                self.state = LoopState::Reporting;
                self.report_reading();
                self.state = LoopState::Idle;
            }
            None => {
                self.stats.ignored_bytes += 1;
                trace!("ignoring byte 0x{byte:02x}");
            }
        }
    }

    fn report_reading(&mut self) {
        let reading = self.bridge.read_temperature();

        if reading.is_faulted() {
            let line = Response::Fault(Some(reading.faults))
                .render(self.config.precision, self.config.fault_report);
            debug!("sensor fault {}", reading.faults);
            self.emit(&line);
            self.stats.faults_reported += 1;
            self.stats.last_fault_bits = reading.faults.bits();
            self.bridge.clear_fault();
        } else {
            let line = Response::Temperature(reading.value)
                .render(self.config.precision, self.config.fault_report);
            self.emit(&line);
            self.stats.readings_reported += 1;
            self.stats.last_temperature_c = Some(reading.value);
            self.stats.last_fault_bits = 0;
        }
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = self.transport.write_line(line) {
            self.stats.write_failures += 1;
            warn!("failed to write response: {e}");
        }
    }

    pub fn run(&mut self, stop: &AtomicBool) {
        self.run_with(stop, |_| {});
    }

    /// Polls until `stop` is set, handing the stats to `on_cycle` after each poll.
    pub fn run_with<F>(&mut self, stop: &AtomicBool, mut on_cycle: F)
    where
        F: FnMut(&LoopStats),
    {
        while !stop.load(Ordering::Relaxed) {
            self.poll();
            on_cycle(&self.stats);
            if !self.config.poll_interval.is_zero() {
                std::thread::sleep(self.config.poll_interval);
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (B, T) {
        (self.bridge, self.transport)
    }
}
