use crate::bridge::{Reading, SensorBridge};
use crate::fault::FaultFlags;
use crate::rtd::{RtdConfig, CODE_MAX};

/// Latch `flags` on every `every`-th conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSchedule {
    pub every: u64,
    pub flags: FaultFlags,
}

/// Simulated RTD bridge with a quantizing 15-bit ADC and a fault latch.
#[derive(Debug, Clone)]
pub struct SimulatedBridge {
    config: RtdConfig,
    process_temp_c: f64,
    ramp_c_per_read: f64,
    open_circuit: bool,
    schedule: Option<FaultSchedule>,
    latch: FaultFlags,
    conversions: u64,
    clears: u64,
}

impl SimulatedBridge {
    pub fn new(config: RtdConfig) -> Self {
        Self {
            config,
            process_temp_c: 25.0,
            ramp_c_per_read: 0.0,
            open_circuit: false,
            schedule: None,
            latch: FaultFlags::empty(),
            conversions: 0,
            clears: 0,
        }
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.process_temp_c = celsius;
        self
    }

    pub fn with_ramp(mut self, c_per_read: f64) -> Self {
        self.ramp_c_per_read = c_per_read;
        self
    }

    pub fn with_fault_schedule(mut self, schedule: FaultSchedule) -> Self {
        if schedule.every > 0 {
            self.schedule = Some(schedule);
        }
        self
    }

    pub fn config(&self) -> &RtdConfig {
        &self.config
    }

    pub fn set_temperature(&mut self, celsius: f64) {
        self.process_temp_c = celsius;
    }

    pub fn process_temperature(&self) -> f64 {
        self.process_temp_c
    }

    /// A broken lead saturates the ratio and trips the open-input comparators.
    pub fn set_open_circuit(&mut self, open: bool) {
        self.open_circuit = open;
    }

    pub fn inject_fault(&mut self, flags: FaultFlags) {
        self.latch |= flags;
    }

    pub fn latched(&self) -> FaultFlags {
        self.latch
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }

    fn convert(&mut self) -> u16 {
        if self.open_circuit {
            self.latch |= FaultFlags::RTD_HIGH_THRESHOLD | FaultFlags::RTDIN_LOW_OPEN;
            return CODE_MAX;
        }
        let code = self.config.celsius_to_code(self.process_temp_c);
        if code == CODE_MAX {
            self.latch |= FaultFlags::RTD_HIGH_THRESHOLD;
        } else if code == 0 {
            self.latch |= FaultFlags::RTD_LOW_THRESHOLD;
        }
        code
    }
}

impl SensorBridge for SimulatedBridge {
    fn read_temperature(&mut self) -> Reading {
        self.conversions += 1;
        if let Some(schedule) = self.schedule {
            if self.conversions % schedule.every == 0 {
                self.latch |= schedule.flags;
            }
        }

        let code = self.convert();
        let value = self.config.code_to_celsius(code) as f32;
        self.process_temp_c += self.ramp_c_per_read;

        Reading::new(value, self.latch)
    }

    fn clear_fault(&mut self) {
        self.latch = FaultFlags::empty();
        self.clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_process_temperature_within_adc_resolution() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100()).with_temperature(23.5);
        let reading = bridge.read_temperature();
        assert!(!reading.is_faulted());
        assert!((reading.value - 23.5).abs() < 0.05, "got {}", reading.value);
    }

    #[test]
    fn pt1000_reads_below_zero() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt1000()).with_temperature(-40.0);
        let reading = bridge.read_temperature();
        assert!((reading.value + 40.0).abs() < 0.1, "got {}", reading.value);
    }

    #[test]
    fn injected_fault_latches_until_cleared() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100());
        bridge.inject_fault(FaultFlags::OVER_UNDER_VOLTAGE);

        assert!(bridge.read_temperature().is_faulted());
        assert!(bridge.read_temperature().is_faulted());

        bridge.clear_fault();
        assert!(!bridge.read_temperature().is_faulted());
        assert_eq!(bridge.clears(), 1);
        assert_eq!(bridge.conversions(), 3);
    }

    #[test]
    fn open_circuit_trips_threshold_and_open_bits() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100());
        bridge.set_open_circuit(true);
        let reading = bridge.read_temperature();
        assert!(reading.faults.contains(FaultFlags::RTD_HIGH_THRESHOLD));
        assert!(reading.faults.contains(FaultFlags::RTDIN_LOW_OPEN));

        bridge.set_open_circuit(false);
        bridge.clear_fault();
        assert!(!bridge.read_temperature().is_faulted());
    }

    #[test]
    fn schedule_faults_every_nth_conversion() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100()).with_fault_schedule(
            FaultSchedule {
                every: 3,
                flags: FaultFlags::REFIN_HIGH,
            },
        );
        let faulted: Vec<bool> = (0..6)
            .map(|_| {
                let reading = bridge.read_temperature();
                if reading.is_faulted() {
                    bridge.clear_fault();
                }
                reading.is_faulted()
            })
            .collect();
        assert_eq!(faulted, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn zero_period_schedule_is_ignored() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100()).with_fault_schedule(
            FaultSchedule {
                every: 0,
                flags: FaultFlags::REFIN_HIGH,
            },
        );
        assert!(!bridge.read_temperature().is_faulted());
    }

    #[test]
    fn ramp_advances_after_each_conversion() {
        let mut bridge = SimulatedBridge::new(RtdConfig::pt100())
            .with_temperature(20.0)
            .with_ramp(1.0);
        let first = bridge.read_temperature().value;
        let second = bridge.read_temperature().value;
        assert!((second - first - 1.0).abs() < 0.1);
        assert!((bridge.process_temperature() - 22.0).abs() < 1e-9);
    }
}
