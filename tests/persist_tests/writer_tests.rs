//! Tests for the persistence writer
//!
//! These tests verify:
//! - Batches are persisted in queue order
//! - The termination sentinel stops the writer
//! - Concurrent producers never interleave lines
//! - Shutdown drains what is already queued

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use luckydraw::persist::{writer_queue, ResultWriter, WriterMessage};
use luckydraw::{Contestant, Shutdown};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("winners");
    (temp_dir, path)
}

fn winner(producer: usize, seq: usize) -> Contestant {
    Contestant::parse(
        format!("P{}", producer),
        format!("S{}", seq),
        format!("{}-{}", producer, seq),
        "1990-05-01",
    )
    .unwrap()
}

fn is_well_formed(line: &str) -> bool {
    line.starts_with("Full name: ")
        && line.contains(" | Document: ")
        && line.ends_with(" | Date of Birth: 01/05/1990")
}

// =============================================================================
// Sequential Tests
// =============================================================================

#[test]
fn test_writer_persists_batches_in_order() {
    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let writer = ResultWriter::open(&path, rx, Shutdown::new(), Duration::from_secs(1)).unwrap();

    tx.send(WriterMessage::Batch(vec![winner(0, 0), winner(0, 1)])).unwrap();
    tx.send(WriterMessage::Batch(vec![winner(0, 2)])).unwrap();
    tx.send(WriterMessage::Terminate).unwrap();

    let stats = writer.run().unwrap();
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.winners, 3);

    let contents = fs::read_to_string(&path).unwrap();
    let documents: Vec<&str> = contents
        .lines()
        .map(|l| l.split(" | ").nth(1).unwrap())
        .collect();
    assert_eq!(
        documents,
        vec!["Document: 0-0", "Document: 0-1", "Document: 0-2"]
    );
}

#[test]
fn test_sentinel_is_last_item_dequeued() {
    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let writer = ResultWriter::open(&path, rx, Shutdown::new(), Duration::from_secs(1)).unwrap();

    tx.send(WriterMessage::Batch(vec![winner(0, 0)])).unwrap();
    tx.send(WriterMessage::Terminate).unwrap();
    tx.send(WriterMessage::Batch(vec![winner(0, 1)])).unwrap();

    let stats = writer.run().unwrap();
    assert_eq!(stats.winners, 1);
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);

    // The writer dropped its receiver on exit
    assert!(tx.send(WriterMessage::Terminate).is_err());
}

#[test]
fn test_writer_exits_when_all_senders_drop() {
    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let writer = ResultWriter::open(&path, rx, Shutdown::new(), Duration::from_secs(1)).unwrap();

    tx.send(WriterMessage::Batch(vec![winner(0, 0)])).unwrap();
    drop(tx);

    let stats = writer.run().unwrap();
    assert_eq!(stats.winners, 1);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_producers_single_writer_integrity() {
    const PRODUCERS: usize = 8;
    const BATCHES: usize = 25;
    const BATCH_SIZE: usize = 7;

    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let writer = ResultWriter::open(&path, rx, Shutdown::new(), Duration::from_secs(5)).unwrap();
    let writer_handle = thread::spawn(move || writer.run());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = tx.clone();
            thread::spawn(move || {
                for b in 0..BATCHES {
                    let batch = (0..BATCH_SIZE).map(|i| winner(p, b * BATCH_SIZE + i)).collect();
                    tx.send(WriterMessage::Batch(batch)).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    tx.send(WriterMessage::Terminate).unwrap();

    let stats = writer_handle.join().unwrap().unwrap();
    let expected = (PRODUCERS * BATCHES * BATCH_SIZE) as u64;
    assert_eq!(stats.winners, expected);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len() as u64, expected);
    assert!(lines.iter().all(|l| is_well_formed(l)));

    // Each producer's lines keep their relative order
    for p in 0..PRODUCERS {
        let prefix = format!("Full name: P{} ", p);
        let seqs: Vec<usize> = lines
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .map(|l| {
                let name = l.split(" | ").next().unwrap();
                name.rsplit('S').next().unwrap().parse().unwrap()
            })
            .collect();
        assert_eq!(seqs, (0..BATCHES * BATCH_SIZE).collect::<Vec<_>>());
    }
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_drains_queued_batches_before_sentinel() {
    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let shutdown = Shutdown::new();
    let writer = ResultWriter::open(&path, rx, shutdown.clone(), Duration::from_secs(5)).unwrap();
    let handle = thread::spawn(move || writer.run());

    shutdown.trigger();
    for i in 0..10 {
        tx.send(WriterMessage::Batch(vec![winner(1, i)])).unwrap();
    }
    tx.send(WriterMessage::Terminate).unwrap();

    let stats = handle.join().unwrap().unwrap();
    assert_eq!(stats.winners, 10);
}

#[test]
fn test_shutdown_without_sentinel_ends_after_drain_window() {
    let (_temp, path) = setup_temp_store();
    let (tx, rx) = writer_queue();
    let shutdown = Shutdown::new();
    let writer =
        ResultWriter::open(&path, rx, shutdown.clone(), Duration::from_millis(100)).unwrap();
    let handle = thread::spawn(move || writer.run());

    let start = Instant::now();
    shutdown.trigger();
    let stats = handle.join().unwrap().unwrap();

    assert_eq!(stats.winners, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
    drop(tx);
}
