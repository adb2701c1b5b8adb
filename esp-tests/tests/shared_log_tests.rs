//! Integration Tests für das SharedLog
//!
//! Mehrere Threads schreiben gleichzeitig. Mit `CriticalSectionRawMutex`
//! (std-Implementierung von critical-section) dürfen keine Zeilen verloren
//! gehen oder sich vermischen.

use std::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_core::log::STORAGE_WRITE_ALERT;
use esp_core::{AlertSink, LogError, LogStorage, SharedLog, StorageError, StorageUsage};

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct MemoryStorage {
    lines: Vec<String>,
    fail_writes: bool,
}

impl LogStorage for MemoryStorage {
    fn append(&mut self, line: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        self.lines.push(line.to_string());
        Ok(())
    }

    fn usage(&mut self) -> Result<StorageUsage, StorageError> {
        Ok(StorageUsage {
            total_bytes: 10_000,
            used_bytes: self.lines.iter().map(|l| l.len() as u64).sum(),
        })
    }
}

#[derive(Default)]
struct MockAlerts {
    count: AtomicU32,
    last_matches: AtomicU32,
}

impl AlertSink for MockAlerts {
    fn send_alert(&self, text: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if text == STORAGE_WRITE_ALERT {
            self.last_matches.fetch_add(1, Ordering::Relaxed);
        }
    }
}

type TestLog<'a> = SharedLog<CriticalSectionRawMutex, MemoryStorage, &'a MockAlerts, 8>;

const THREADS: usize = 4;
const LINES_PER_THREAD: usize = 50;

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_concurrent_appends_keep_every_line() {
    let alerts = MockAlerts::default();
    let log: TestLog = SharedLog::new(MemoryStorage::default(), &alerts);

    std::thread::scope(|scope| {
        for worker in 0..THREADS {
            let log = &log;
            scope.spawn(move || {
                for line in 0..LINES_PER_THREAD {
                    let message = format!("worker {} line {}", worker, line);
                    log.append(1_700_000_000, &message).unwrap();
                }
            });
        }
    });

    let total = THREADS * LINES_PER_THREAD;
    assert_eq!(log.entry_count() as usize, total);
    assert_eq!(log.storage_failures(), 0);
    assert_eq!(alerts.count.load(Ordering::Relaxed), 0);

    let lines = log.with_storage(|s| s.lines.clone()).unwrap();
    assert_eq!(lines.len(), total);
    for line in &lines {
        assert!(line.starts_with("[2023-11-14 22:13:20] worker "), "{}", line);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    // Pro Thread bleibt die Reihenfolge erhalten
    for worker in 0..THREADS {
        let prefix = format!("] worker {} line ", worker);
        let order: Vec<usize> = lines
            .iter()
            .filter_map(|l| l.split_once(&prefix))
            .map(|(_, rest)| rest.trim_end().parse().unwrap())
            .collect();
        assert_eq!(order, (0..LINES_PER_THREAD).collect::<Vec<_>>());
    }

    let mut recent = 0;
    log.recent(|_| recent += 1).unwrap();
    assert_eq!(recent, 8);
}

#[test]
fn test_write_failure_alerts_and_keeps_ring() {
    let alerts = MockAlerts::default();
    let log: TestLog = SharedLog::new(
        MemoryStorage {
            lines: Vec::new(),
            fail_writes: true,
        },
        &alerts,
    );

    assert_eq!(log.append(0, "Net: connected"), Ok(()));
    assert_eq!(log.append(1, "Net: lost"), Ok(()));

    assert_eq!(log.storage_failures(), 2);
    assert_eq!(alerts.last_matches.load(Ordering::Relaxed), 2);

    let mut messages = Vec::new();
    log.recent(|entry| messages.push(entry.message.as_str().to_string()))
        .unwrap();
    assert_eq!(messages, vec!["Net: connected", "Net: lost"]);
}

#[test]
fn test_storage_access_while_logging_is_busy() {
    let alerts = MockAlerts::default();
    let log: TestLog = SharedLog::new(MemoryStorage::default(), &alerts);

    let nested = log
        .with_storage(|_| log.append(0, "from inside"))
        .unwrap();
    assert_eq!(nested, Err(LogError::Busy));
    assert_eq!(log.entry_count(), 0);

    let usage = log.with_storage(|s| s.usage()).unwrap().unwrap();
    assert_eq!(usage.used_bytes, 0);
}

#[test]
fn test_ring_overwrites_oldest() {
    let alerts = MockAlerts::default();
    let log: TestLog = SharedLog::new(MemoryStorage::default(), &alerts);

    for i in 0..12 {
        log.append(i, &format!("entry {}", i)).unwrap();
    }

    let mut timestamps = Vec::new();
    log.recent(|entry| timestamps.push(entry.timestamp)).unwrap();
    assert_eq!(timestamps, (4..12).collect::<Vec<u32>>());
    assert_eq!(log.with_storage(|s| s.lines.len()).unwrap(), 12);
}
