use probe_core::LoopStats;
use probe_io::metrics::{
    init_metrics, serve_metrics, COMMANDS_TOTAL, FAULTS_TOTAL, FAULT_CODE, IGNORED_BYTES_TOTAL,
    POLLS_TOTAL, READINGS_TOTAL, TEMPERATURE_C, WRITE_FAILURES_TOTAL,
};
use prometheus::IntCounter;
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Mirrors loop statistics into the Prometheus counters by delta.
#[derive(Default)]
pub struct StatsPublisher {
    last: LoopStats,
}

impl StatsPublisher {
    pub fn publish(&mut self, stats: &LoopStats) {
        if stats.polls == self.last.polls {
            return;
        }
        advance(&POLLS_TOTAL, stats.polls, self.last.polls);
        advance(&COMMANDS_TOTAL, stats.commands_processed, self.last.commands_processed);
        advance(&IGNORED_BYTES_TOTAL, stats.ignored_bytes, self.last.ignored_bytes);
        advance(&READINGS_TOTAL, stats.readings_reported, self.last.readings_reported);
        advance(&FAULTS_TOTAL, stats.faults_reported, self.last.faults_reported);
        advance(&WRITE_FAILURES_TOTAL, stats.write_failures, self.last.write_failures);

        if let Some(temp) = stats.last_temperature_c {
            TEMPERATURE_C.set(f64::from(temp));
        }
        FAULT_CODE.set(f64::from(stats.last_fault_bits));
        self.last = stats.clone();
    }
}

fn advance(counter: &IntCounter, now: u64, before: u64) {
    if now > before {
        counter.inc_by(now - before);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_deltas_only() {
        init();
        let start_polls = POLLS_TOTAL.get();
        let start_faults = FAULTS_TOTAL.get();
        let mut publisher = StatsPublisher::default();

        let mut stats = LoopStats {
            polls: 3,
            faults_reported: 1,
            last_fault_bits: 0x08,
            ..Default::default()
        };
        publisher.publish(&stats);
        publisher.publish(&stats);
        assert_eq!(POLLS_TOTAL.get() - start_polls, 3);
        assert_eq!(FAULTS_TOTAL.get() - start_faults, 1);
        assert_eq!(FAULT_CODE.get(), 8.0);

        stats.polls = 5;
        stats.readings_reported = 1;
        stats.last_temperature_c = Some(21.25);
        stats.last_fault_bits = 0;
        publisher.publish(&stats);
        assert_eq!(POLLS_TOTAL.get() - start_polls, 5);
        assert_eq!(TEMPERATURE_C.get(), 21.25);
        assert_eq!(FAULT_CODE.get(), 0.0);
    }
}
