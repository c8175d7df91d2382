use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_rtd-probe");

struct ProbeProcess {
    child: Child,
    addr: String,
}

impl ProbeProcess {
    fn start(extra_args: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .expect("Failed to bind ephemeral port for integration test");
        let addr = listener
            .local_addr()
            .expect("Failed to resolve bound address");
        let bind_addr = format!("127.0.0.1:{}", addr.port());
        drop(listener);

        let child = Command::new(BIN)
            .args(["--bind", &bind_addr, "--run-seconds", "30"])
            .args(extra_args)
            .spawn()
            .expect("Failed to start probe");

        Self {
            child,
            addr: bind_addr,
        }
    }

    /// Connects as the probe's single client, retrying until it listens (up to 5s).
    fn connect(&self) -> (TcpStream, BufReader<TcpStream>) {
        let start = Instant::now();
        let stream = loop {
            match TcpStream::connect(&self.addr) {
                Ok(stream) => break stream,
                Err(_) if start.elapsed() < Duration::from_secs(5) => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => panic!("probe never started listening: {e}"),
            }
        };
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }
}

impl Drop for ProbeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn request(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, bytes: &[u8]) -> String {
    stream.write_all(bytes).unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

#[test]
fn test_read_reports_simulated_temperature() {
    let probe = ProbeProcess::start(&["--sim-temp", "23.5"]);
    let (mut stream, mut reader) = probe.connect();

    let line = request(&mut stream, &mut reader, b"r");
    assert!(line.ends_with('\n') && !line.ends_with("\r\n"), "line {line:?}");

    let text = line.trim_end();
    let decimals = text.split('.').nth(1).expect("decimal point");
    assert_eq!(decimals.len(), 2, "line {line:?}");

    let value: f32 = text.parse().expect("temperature");
    assert!((value - 23.5).abs() < 0.05, "got {value}");
}

#[test]
fn test_unknown_bytes_are_ignored() {
    let probe = ProbeProcess::start(&["--sim-temp", "-12.0", "--sensor", "pt1000"]);
    let (mut stream, mut reader) = probe.connect();

    // Only the trailing 'r' produces a line.
    let line = request(&mut stream, &mut reader, b"hello R\nr");
    let value: f32 = line.trim_end().parse().expect("temperature");
    assert!((value + 12.0).abs() < 0.1, "got {value}");
}

#[test]
fn test_fault_notice_replaces_value() {
    let probe = ProbeProcess::start(&["--fault-every", "2", "--crlf"]);
    let (mut stream, mut reader) = probe.connect();

    let first = request(&mut stream, &mut reader, b"r");
    assert!(first.ends_with("\r\n"));
    assert!(first.trim_end().parse::<f32>().is_ok(), "line {first:?}");

    let second = request(&mut stream, &mut reader, b"r");
    assert_eq!(second, "Fault detected!\r\n");

    // The latch was cleared after the notice.
    let third = request(&mut stream, &mut reader, b"r");
    assert!(third.trim_end().parse::<f32>().is_ok(), "line {third:?}");
}

#[test]
fn test_detailed_fault_notice() {
    let probe = ProbeProcess::start(&["--fault-every", "1", "--fault-bits", "0x84", "--fault-detail"]);
    let (mut stream, mut reader) = probe.connect();

    let line = request(&mut stream, &mut reader, b"r");
    assert_eq!(line, "Fault detected! 0x84 rtd_high_threshold,over_under_voltage\n");
}

#[test]
fn test_help_exits_cleanly() {
    let output = Command::new(BIN).arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("USAGE"));
}

#[test]
fn test_invalid_config_exits_with_code_2() {
    let status = Command::new(BIN)
        .args(["--sensor", "pt1000", "--rref", "430"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_occupied_bind_address_exits_with_code_1() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = holder.local_addr().unwrap().to_string();

    let status = Command::new(BIN)
        .args(["--bind", &addr, "--run-seconds", "5"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
    drop(holder);
}
