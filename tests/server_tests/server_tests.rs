//! Tests for the Server
//!
//! These tests drive a real server on 127.0.0.1 and verify:
//! - The request/response scenario and the persisted lines
//! - Order preservation and multi-request connections
//! - Error frames for protocol and application failures
//! - Workers surviving bad connections
//! - Single-writer integrity under concurrent clients
//! - Admission control through the bounded work queue

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel;
use luckydraw::client::DrawClient;
use luckydraw::network::ServerStats;
use luckydraw::protocol::{encode_error, encode_request, read_frame, Frame};
use luckydraw::{Config, Contestant, DrawError, HashDraw, Server, Shutdown, ShutdownReport, WinnerPredicate};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    _temp: TempDir,
    results: PathBuf,
    addr: SocketAddr,
    shutdown: Shutdown,
    stats: Arc<ServerStats>,
    handle: JoinHandle<luckydraw::Result<ShutdownReport>>,
}

impl TestServer {
    fn start(workers: usize, predicate: Arc<dyn WinnerPredicate>) -> Self {
        let temp = TempDir::new().unwrap();
        let results = temp.path().join("winners");
        let config = Config::builder()
            .listen_addr("127.0.0.1:0")
            .workers(workers)
            .results_path(&results)
            .accept_poll_interval(Duration::from_millis(10))
            .shutdown_timeout(Duration::from_secs(5))
            .evaluation_delay(Duration::ZERO)
            .build();

        let server = Server::bind_with_predicate(config, predicate).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let stats = server.stats();
        let handle = thread::spawn(move || server.run());

        Self {
            _temp: temp,
            results,
            addr,
            shutdown,
            stats,
            handle,
        }
    }

    fn stop(self) -> (ShutdownReport, String) {
        self.shutdown.trigger();
        let report = self.handle.join().unwrap().unwrap();
        let contents = fs::read_to_string(&self.results).unwrap_or_default();
        (report, contents)
    }
}

fn contestant(first: &str, last: &str, document: &str, birth: &str) -> Contestant {
    Contestant::parse(first, last, document, birth).unwrap()
}

fn population(prefix: &str, n: usize) -> Vec<Contestant> {
    (0..n)
        .map(|i| {
            Contestant::parse(
                format!("{}{}", prefix, i),
                "Tester",
                format!("{}", 10_000 + i),
                "1990-05-01",
            )
            .unwrap()
        })
        .collect()
}

fn even_document() -> Arc<dyn WinnerPredicate> {
    Arc::new(|c: &Contestant| c.document().ends_with(['0', '2', '4', '6', '8']))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn assert_closed_by_server(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("Expected closed stream, read {} bytes", n),
        Err(e) => assert!(
            !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "Stream still open: {}",
            e
        ),
    }
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_scenario_returns_and_persists_winners() {
    let draw = Arc::new(HashDraw::new(17, Duration::ZERO));
    let server = TestServer::start(2, draw.clone());

    let batch = vec![
        contestant("Ana", "Gomez", "30111222", "1990-05-01"),
        contestant("Ian", "Diaz", "28555666", "1985-12-20"),
    ];
    let expected: Vec<Contestant> = batch.iter().filter(|c| draw.is_winner(c)).cloned().collect();

    let mut client = DrawClient::connect(server.addr).unwrap();
    let winners = client.submit(&batch).unwrap();
    client.close().unwrap();
    assert_eq!(winners, expected);

    let (report, contents) = server.stop();
    assert!(report.is_clean());
    let expected_lines: String = expected.iter().map(Contestant::result_line).collect();
    assert_eq!(contents, expected_lines);
}

#[test]
fn test_scenario_everyone_wins_with_modulus_one() {
    let server = TestServer::start(2, Arc::new(HashDraw::new(1, Duration::ZERO)));

    let batch = vec![
        contestant("Ana", "Gomez", "30111222", "1990-05-01"),
        contestant("Ian", "Diaz", "28555666", "1985-12-20"),
    ];
    let mut client = DrawClient::connect(server.addr).unwrap();
    assert_eq!(client.submit(&batch).unwrap(), batch);
    client.close().unwrap();

    let (report, contents) = server.stop();
    assert_eq!(report.writer.winners, 2);
    assert_eq!(
        contents,
        "Full name: Ana Gomez | Document: 30111222 | Date of Birth: 01/05/1990\n\
         Full name: Ian Diaz | Document: 28555666 | Date of Birth: 20/12/1985\n"
    );
}

#[test]
fn test_response_preserves_input_order() {
    let server = TestServer::start(1, even_document());
    let batch = population("Order", 40);

    let mut client = DrawClient::connect(server.addr).unwrap();
    let winners = client.submit(&batch).unwrap();
    client.close().unwrap();

    let expected: Vec<Contestant> = batch
        .into_iter()
        .filter(|c| c.document().ends_with(['0', '2', '4', '6', '8']))
        .collect();
    assert_eq!(winners, expected);

    let (_, contents) = server.stop();
    let persisted: Vec<String> = contents.lines().map(|l| format!("{}\n", l)).collect();
    let expected_lines: Vec<String> = expected.iter().map(Contestant::result_line).collect();
    assert_eq!(persisted, expected_lines);
}

#[test]
fn test_many_requests_on_one_connection() {
    let server = TestServer::start(1, even_document());
    let mut client = DrawClient::connect(server.addr).unwrap();

    assert!(client.submit(&[]).unwrap().is_empty());
    for round in 0..5 {
        let batch = population(&format!("R{}-", round), 10);
        assert_eq!(client.submit(&batch).unwrap().len(), 5);
    }
    client.close().unwrap();

    let (report, contents) = server.stop();
    assert_eq!(report.stats.requests, 6);
    assert_eq!(report.writer.batches, 5);
    assert_eq!(contents.lines().count(), 25);
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_unknown_message_code_gets_error_frame_then_close() {
    let server = TestServer::start(1, even_document());

    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.write_all(&[0x07]).unwrap();

    match read_frame(&mut stream).unwrap() {
        Frame::Error(message) => assert!(message.contains("Unknown message code")),
        other => panic!("Expected error frame, got {:?}", other),
    }
    assert_closed_by_server(&mut stream);

    let (report, _) = server.stop();
    assert_eq!(report.stats.failed, 1);
}

#[test]
fn test_client_error_frame_is_answered_with_error_frame() {
    let server = TestServer::start(1, even_document());

    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.write_all(&encode_error("client gave up")).unwrap();

    match read_frame(&mut stream).unwrap() {
        Frame::Error(message) => assert!(message.contains("client gave up")),
        other => panic!("Expected error frame, got {:?}", other),
    }
    assert_closed_by_server(&mut stream);
    server.stop();
}

#[test]
fn test_invalid_birth_date_reported_to_client() {
    let server = TestServer::start(1, even_document());

    let mut request = vec![0x00];
    for field in ["Ana", "Gomez", "30111222", "1990/05/01"] {
        request.extend_from_slice(&(field.len() as u32).to_be_bytes());
        request.extend_from_slice(field.as_bytes());
    }
    request.extend_from_slice(&u32::MAX.to_be_bytes());

    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.write_all(&request).unwrap();

    match read_frame(&mut stream).unwrap() {
        Frame::Error(message) => assert!(message.contains("invalid birth date")),
        other => panic!("Expected error frame, got {:?}", other),
    }
    server.stop();
}

#[test]
fn test_client_surfaces_server_error_as_application_error() {
    let server = TestServer::start(1, even_document());

    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.write_all(&[0x09]).unwrap();
    let err = luckydraw::protocol::read_response(&mut stream).unwrap_err();
    assert!(matches!(err, DrawError::Application(_)));
    server.stop();
}

#[test]
fn test_worker_survives_bad_connections() {
    let server = TestServer::start(1, even_document());

    for _ in 0..3 {
        let mut bad = TcpStream::connect(server.addr).unwrap();
        bad.write_all(&[0xFF]).unwrap();
        let _ = read_frame(&mut bad);
        assert_closed_by_server(&mut bad);

        // Peer vanishing mid-frame
        let mut truncated = TcpStream::connect(server.addr).unwrap();
        truncated.write_all(&encode_request(&population("T", 3))[..7]).unwrap();
        drop(truncated);
    }

    let mut client = DrawClient::connect(server.addr).unwrap();
    assert_eq!(client.submit(&population("Ok", 4)).unwrap().len(), 2);
    client.close().unwrap();

    let (report, _) = server.stop();
    assert!(report.is_clean());
    assert!(report.workers.connections >= 7);
    assert_eq!(report.workers.failed_connections, 6);
    assert_eq!(report.stats.failed, 6);
}

#[test]
fn test_truncated_frame_counts_as_failed_connection() {
    let server = TestServer::start(1, even_document());

    let mut truncated = TcpStream::connect(server.addr).unwrap();
    truncated.write_all(&encode_request(&population("T", 3))[..7]).unwrap();
    drop(truncated);

    let stats = Arc::clone(&server.stats);
    assert!(wait_until(Duration::from_secs(5), || stats.snapshot().completed == 1));
    assert_eq!(stats.snapshot().failed, 1);

    // A close between frames is not a failure
    let mut client = DrawClient::connect(server.addr).unwrap();
    client.submit(&population("Ok", 2)).unwrap();
    client.close().unwrap();
    assert!(wait_until(Duration::from_secs(5), || stats.snapshot().completed == 2));

    let (report, _) = server.stop();
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.workers.failed_connections, 1);
    assert_eq!(report.workers.connections, 2);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_clients_single_writer_integrity() {
    const CLIENTS: usize = 8;
    const ROUNDS: usize = 5;
    const BATCH: usize = 20;

    let server = TestServer::start(4, even_document());
    let addr = server.addr;

    let clients: Vec<_> = (0..CLIENTS)
        .map(|c| {
            thread::spawn(move || {
                let mut client = DrawClient::connect(addr).unwrap();
                let mut won = 0;
                for round in 0..ROUNDS {
                    let batch = population(&format!("C{}R{}-", c, round), BATCH);
                    won += client.submit(&batch).unwrap().len();
                }
                client.close().unwrap();
                won
            })
        })
        .collect();
    let returned: usize = clients.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(returned, CLIENTS * ROUNDS * BATCH / 2);

    let (report, contents) = server.stop();
    assert!(report.is_clean());
    assert_eq!(report.writer.winners as usize, returned);

    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), returned);
    assert!(lines.iter().all(|l| {
        l.starts_with("Full name: C")
            && l.contains(" Tester | Document: ")
            && l.ends_with(" | Date of Birth: 01/05/1990")
    }));
}

#[test]
fn test_backpressure_bounds_admitted_connections() {
    let (gate_tx, gate_rx) = channel::bounded::<()>(0);
    let gated: Arc<dyn WinnerPredicate> = Arc::new(move |_: &Contestant| {
        let _ = gate_rx.recv();
        true
    });
    let server = TestServer::start(1, gated);
    let addr = server.addr;

    // First client occupies the only worker
    let first = thread::spawn(move || {
        let mut client = DrawClient::connect(addr).unwrap();
        let winners = client.submit(&population("First", 1)).unwrap();
        client.close().unwrap();
        winners.len()
    });
    let stats = Arc::clone(&server.stats);
    assert!(wait_until(Duration::from_secs(5), || stats.snapshot().active == 1));

    // More clients pile up behind it
    let waiting: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let mut client = DrawClient::connect(addr).unwrap();
                let winners = client.submit(&population(&format!("W{}-", i), 1)).unwrap();
                client.close().unwrap();
                winners.len()
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(300));

    let snapshot = server.stats.snapshot();
    // One being served, one queued, one held by the acceptor
    assert!(snapshot.accepted <= 3, "accepted {}", snapshot.accepted);
    assert!(snapshot.peak_queue_depth <= 1);
    assert_eq!(snapshot.active, 1);

    // Open the gate: everyone is eventually served
    drop(gate_tx);
    assert_eq!(first.join().unwrap(), 1);
    for handle in waiting {
        assert_eq!(handle.join().unwrap(), 1);
    }

    let (report, contents) = server.stop();
    assert_eq!(report.stats.accepted, 5);
    assert!(report.stats.peak_queue_depth <= 1);
    assert_eq!(contents.lines().count(), 5);
}
