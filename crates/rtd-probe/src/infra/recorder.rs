//! JSONL recording of readings taken from a probe.

use crate::control::ControlMode;
use probe_core::{FaultFlags, Response};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One line of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sequence: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    /// Seconds since the first sample of this recorder
    pub elapsed_s: f64,
    pub temperature_c: Option<f32>,
    pub fault: bool,
    /// Only present when the probe sent detailed fault notices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_bits: Option<FaultFlags>,
    /// Heater output commanded after this reading, in closed-loop runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_v: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_mode: Option<ControlMode>,
}

pub struct ReadingRecorder {
    writer: BufWriter<File>,
    first_sample: Option<Instant>,
    sequence: u64,
}

impl ReadingRecorder {
    /// Opens `path` for appending, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(8192, file),
            first_sample: None,
            sequence: 0,
        })
    }

    pub fn record(&mut self, response: &Response) -> std::io::Result<SampleRecord> {
        self.write(Some(response), None)
    }

    /// Records one closed-loop step. `response` is `None` when the probe missed
    /// the reading; the commanded output is still logged.
    pub fn record_controlled(
        &mut self,
        response: Option<&Response>,
        mode: ControlMode,
        output_v: f64,
    ) -> std::io::Result<SampleRecord> {
        self.write(response, Some((mode, output_v)))
    }

    fn write(
        &mut self,
        response: Option<&Response>,
        control: Option<(ControlMode, f64)>,
    ) -> std::io::Result<SampleRecord> {
        let now = Instant::now();
        let first = *self.first_sample.get_or_insert(now);
        self.sequence += 1;

        let (temperature_c, fault_bits) = match response {
            Some(Response::Temperature(value)) => (Some(*value), None),
            Some(Response::Fault(bits)) => (None, *bits),
            None => (None, None),
        };
        let entry = SampleRecord {
            sequence: self.sequence,
            unix_us: unix_us(),
            elapsed_s: now.duration_since(first).as_secs_f64(),
            temperature_c,
            fault: response.is_some_and(Response::is_fault),
            fault_bits,
            output_v: control.map(|(_, v)| v),
            control_mode: control.map(|(mode, _)| mode),
        };

        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(entry)
    }
}

fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
