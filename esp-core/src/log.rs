//! SharedLog: Diagnose-Log für alle Tasks
//!
//! Jede Zeile wird unter einem einzigen Mutex
//! 1. mit Zeitstempel formatiert,
//! 2. an die Log-Datei auf dem persistenten Speicher angehängt,
//! 3. in den Ring-Buffer geschrieben (älteste Zeile fliegt raus).
//!
//! Schreibfehler des Speichers werden nie an den Aufrufer gemeldet,
//! sondern als Alert weitergegeben. Der Alert wird erst nach dem
//! Freigeben des Mutex gesendet.

use core::cell::RefCell;
use core::fmt::Write;

use chrono::{DateTime, Datelike, Timelike};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{HistoryBuf, String};

use crate::traits::{AlertSink, LogStorage};

/// Anzahl Einträge im Ring-Buffer
pub const LOG_RING_CAPACITY: usize = 32;

/// Maximale Länge einer Nachricht (längere werden abgeschnitten)
pub const LOG_MSG_SIZE: usize = 128;

/// `"[YYYY-MM-DD HH:MM:SS] "` + Nachricht + `'\n'`
pub const LOG_LINE_SIZE: usize = 22 + LOG_MSG_SIZE + 1;

/// Alert-Text bei fehlgeschlagenem Schreiben auf den Speicher
pub const STORAGE_WRITE_ALERT: &str = "SD Card Write Failed";

/// Ein Log-Eintrag, wird nach dem Anlegen nicht mehr verändert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Unix-Zeit in Sekunden
    pub timestamp: u32,
    pub message: String<LOG_MSG_SIZE>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogError {
    /// Mutex ist bereits belegt (Re-Entrance), Eintrag übersprungen
    Busy,
}

/// Kopiert `text` in einen heapless String, schneidet an Zeichengrenzen ab
fn truncated<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Formatiert eine Log-Zeile: `[YYYY-MM-DD HH:MM:SS] <message>\n`
pub fn format_log_line(unix_secs: u32, message: &str) -> String<LOG_LINE_SIZE> {
    let mut line = String::new();
    let dt = DateTime::from_timestamp(unix_secs as i64, 0).unwrap_or_default();
    let _ = write!(
        line,
        "[{:04}-{:02}-{:02} {:02}:{:02}:{:02}] ",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    );
    let body: String<LOG_MSG_SIZE> = truncated(message);
    let _ = line.push_str(&body);
    let _ = line.push('\n');
    line
}

struct LogState<S, const N: usize> {
    storage: S,
    ring: HistoryBuf<LogEntry, N>,
    entry_count: u32,
    storage_failures: u32,
}

/// Mutex-geschütztes Log
///
/// `M` bestimmt die Mutex-Art: `NoopRawMutex` auf dem Single-Core Executor,
/// `CriticalSectionRawMutex` wenn aus mehreren Threads geschrieben wird.
pub struct SharedLog<M: RawMutex, S: LogStorage, A: AlertSink, const N: usize = LOG_RING_CAPACITY>
{
    state: Mutex<M, RefCell<LogState<S, N>>>,
    alerts: A,
}

impl<M: RawMutex, S: LogStorage, A: AlertSink, const N: usize> SharedLog<M, S, A, N> {
    pub fn new(storage: S, alerts: A) -> Self {
        Self {
            state: Mutex::new(RefCell::new(LogState {
                storage,
                ring: HistoryBuf::new(),
                entry_count: 0,
                storage_failures: 0,
            })),
            alerts,
        }
    }

    /// Hängt eine Nachricht an
    ///
    /// Gibt nur `LogError::Busy` zurück, wenn der Mutex bereits vom
    /// gleichen Kontext gehalten wird. Speicherfehler bleiben intern.
    pub fn append(&self, now_unix: u32, message: &str) -> Result<(), LogError> {
        let line = format_log_line(now_unix, message);
        let entry = LogEntry {
            timestamp: now_unix,
            message: truncated(message),
        };

        let write_failed = self.state.lock(|cell| {
            let mut state = cell.try_borrow_mut().map_err(|_| LogError::Busy)?;
            let failed = state.storage.append(&line).is_err();
            if failed {
                state.storage_failures = state.storage_failures.saturating_add(1);
            }
            state.ring.write(entry);
            state.entry_count = state.entry_count.wrapping_add(1);
            Ok(failed)
        })?;

        if write_failed {
            self.alerts.send_alert(STORAGE_WRITE_ALERT);
        }
        Ok(())
    }

    /// Ruft `f` für jeden Eintrag im Ring-Buffer auf (älteste zuerst)
    pub fn recent(&self, mut f: impl FnMut(&LogEntry)) -> Result<(), LogError> {
        self.state.lock(|cell| {
            let state = cell.try_borrow().map_err(|_| LogError::Busy)?;
            for entry in state.ring.oldest_ordered() {
                f(entry);
            }
            Ok(())
        })
    }

    /// Anzahl der seit Boot angehängten Einträge
    pub fn entry_count(&self) -> u32 {
        self.state
            .lock(|cell| cell.try_borrow().map(|s| s.entry_count).unwrap_or(0))
    }

    /// Anzahl fehlgeschlagener Schreibzugriffe
    pub fn storage_failures(&self) -> u32 {
        self.state
            .lock(|cell| cell.try_borrow().map(|s| s.storage_failures).unwrap_or(0))
    }

    /// Exklusiver Zugriff auf den Speicher (z.B. für den Storage-Monitor)
    ///
    /// `f` darf nicht selbst loggen, sonst gibt es `LogError::Busy`.
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, LogError> {
        self.state.lock(|cell| {
            let mut state = cell.try_borrow_mut().map_err(|_| LogError::Busy)?;
            Ok(f(&mut state.storage))
        })
    }
}
