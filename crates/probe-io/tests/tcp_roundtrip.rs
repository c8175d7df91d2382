use probe_core::{
    CommandLoop, FaultFlags, FaultSchedule, LineEnding, LoopConfig, Response, RtdConfig,
    SimulatedBridge,
};
use probe_io::{ProbeClient, TcpTransport};
use std::io::{ErrorKind, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

fn spawn_probe(bridge: SimulatedBridge) -> (String, Arc<AtomicBool>, thread::JoinHandle<()>) {
    let transport = TcpTransport::bind("127.0.0.1:0", LineEnding::CrLf).expect("bind probe");
    let addr = transport.local_addr().expect("local addr").to_string();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_loop = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        let mut lp = CommandLoop::new(bridge, transport, LoopConfig::default());
        lp.run(&stop_loop);
    });
    (addr, stop, handle)
}

fn connect(addr: &str) -> ProbeClient<TcpStream> {
    let stream = TcpStream::connect(addr).expect("connect to probe");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    ProbeClient::new(stream)
}

#[test]
fn reads_temperature_over_tcp() {
    let bridge = SimulatedBridge::new(RtdConfig::pt100()).with_temperature(23.5);
    let (addr, stop, handle) = spawn_probe(bridge);

    let mut client = connect(&addr);
    let value = client
        .request_reading()
        .unwrap()
        .temperature()
        .expect("clean reading");
    assert!((value - 23.5).abs() < 0.05, "got {value}");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn ignored_bytes_produce_no_line() {
    let bridge = SimulatedBridge::new(RtdConfig::pt1000()).with_temperature(-20.0);
    let (addr, stop, handle) = spawn_probe(bridge);

    let mut client = connect(&addr);
    client.send_raw(b"xyz\n").unwrap();
    // The next line can only be the answer to this read.
    let value = client.request_reading().unwrap().temperature().unwrap();
    assert!((value + 20.0).abs() < 0.1, "got {value}");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn fault_is_reported_then_cleared() {
    let bridge = SimulatedBridge::new(RtdConfig::pt100()).with_fault_schedule(FaultSchedule {
        every: 2,
        flags: FaultFlags::OVER_UNDER_VOLTAGE,
    });
    let (addr, stop, handle) = spawn_probe(bridge);

    let mut client = connect(&addr);
    assert!(!client.request_reading().unwrap().is_fault());
    assert_eq!(client.request_reading().unwrap(), Response::Fault(None));
    assert!(!client.request_reading().unwrap().is_fault());

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn client_that_never_reads_cannot_stall_the_loop() {
    let transport = TcpTransport::bind("127.0.0.1:0", LineEnding::Lf)
        .expect("bind probe")
        .with_write_timeout(Duration::from_millis(50));
    let addr = transport.local_addr().expect("local addr");
    let stop = Arc::new(AtomicBool::new(false));
    let stop_loop = Arc::clone(&stop);
    let (done_tx, done_rx) = mpsc::channel();

    thread::spawn(move || {
        let config = LoopConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        let bridge = SimulatedBridge::new(RtdConfig::pt100());
        let mut lp = CommandLoop::new(bridge, transport, config);
        lp.run(&stop_loop);
        let _ = done_tx.send(lp.stats().clone());
    });

    // Flood read commands and never read a reply until the probe hangs up.
    let mut stream = TcpStream::connect(addr).expect("connect to probe");
    stream
        .set_write_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let chunk = [b'r'; 4096];
    let start = Instant::now();
    let mut hung_up = false;
    while start.elapsed() < Duration::from_secs(15) {
        match stream.write_all(&chunk) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => {
                hung_up = true;
                break;
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    let stats = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("command loop kept running after stop");
    assert!(stats.commands_processed > 0);
    if hung_up {
        assert!(stats.write_failures >= 1, "stats {stats:?}");
    }
}
