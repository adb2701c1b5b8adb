//! Geteilter Status: Single-Writer / Multi-Reader über Atomics
//!
//! Jeder Wert hat genau einen schreibenden Task:
//! - Achsen: MotorPoller-Task
//! - Verbindungszustand und Uhr: Connectivity-Task
//!
//! Leser (Renderer, MQTT, Supervisor) bekommen immer Kopien.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

use heapless::String;
use serde::Serialize;

use crate::logic::format_uptime;
use crate::types::{AXIS_COUNT, AxisId, AxisStatus, ConnectionState, Ticks};

const MIN_FLAG: u8 = 0x01;
const MAX_FLAG: u8 = 0x02;

/// Atomare Ablage eines `AxisStatus`
struct AxisStatusCell {
    position: AtomicI32,
    last_change: AtomicU32,
    limits: AtomicU8,
}

impl AxisStatusCell {
    const fn new() -> Self {
        Self {
            position: AtomicI32::new(0),
            last_change: AtomicU32::new(0),
            limits: AtomicU8::new(0),
        }
    }
}

/// Wanduhr: Unix-Zeit zum Boot-Zeitpunkt, gesetzt nach erfolgreichem SNTP
///
/// Vor der ersten Synchronisation zählt die Uhr ab 1970-01-01 plus Laufzeit.
pub struct WallClock {
    unix_at_boot: AtomicU32,
    synced: AtomicBool,
}

impl WallClock {
    pub const fn new() -> Self {
        Self {
            unix_at_boot: AtomicU32::new(0),
            synced: AtomicBool::new(false),
        }
    }

    /// Setzt die Uhr auf `unix_now` zum Laufzeitpunkt `uptime_secs`
    pub fn set_unix_time(&self, unix_now: u32, uptime_secs: u64) {
        let at_boot = unix_now.saturating_sub(uptime_secs as u32);
        self.unix_at_boot.store(at_boot, Ordering::Relaxed);
        self.synced.store(true, Ordering::Release);
    }

    /// Aktuelle Unix-Zeit in Sekunden
    pub fn now_unix(&self, uptime_secs: u64) -> u32 {
        self.unix_at_boot
            .load(Ordering::Relaxed)
            .wrapping_add(uptime_secs as u32)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only Sicht für UI und Fernwartung
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub connection: ConnectionState,
    pub axes: [AxisStatus; AXIS_COUNT],
    pub uptime_secs: u64,
    /// `"{d} days, {h} hours, {m} minutes, {s} seconds"`
    pub uptime: String<64>,
}

/// Geteilter System-Status
///
/// Wird einmal statisch angelegt und per `&'static` an alle Tasks verteilt.
pub struct SharedStatus {
    axes: [AxisStatusCell; AXIS_COUNT],
    connection: AtomicU8,
    clock: WallClock,
}

impl SharedStatus {
    pub const fn new() -> Self {
        Self {
            axes: [const { AxisStatusCell::new() }; AXIS_COUNT],
            connection: AtomicU8::new(0),
            clock: WallClock::new(),
        }
    }

    /// Veröffentlicht den Zustand einer Achse (nur vom MotorPoller-Task)
    pub fn publish_axis(&self, status: &AxisStatus) {
        let cell = &self.axes[status.id.index()];
        let mut limits = 0;
        if status.min_limit_active {
            limits |= MIN_FLAG;
        }
        if status.max_limit_active {
            limits |= MAX_FLAG;
        }
        cell.position.store(status.position, Ordering::Relaxed);
        cell.last_change
            .store(status.last_change_time, Ordering::Relaxed);
        cell.limits.store(limits, Ordering::Release);
    }

    /// Snapshot einer Achse
    pub fn axis(&self, id: AxisId) -> AxisStatus {
        let cell = &self.axes[id.index()];
        let limits = cell.limits.load(Ordering::Acquire);
        AxisStatus {
            id,
            position: cell.position.load(Ordering::Relaxed),
            min_limit_active: limits & MIN_FLAG != 0,
            max_limit_active: limits & MAX_FLAG != 0,
            last_change_time: cell.last_change.load(Ordering::Relaxed),
        }
    }

    pub fn axes(&self) -> [AxisStatus; AXIS_COUNT] {
        AxisId::ALL.map(|id| self.axis(id))
    }

    /// Setzt den Verbindungszustand (nur vom Connectivity-Task)
    pub fn set_connection(&self, state: ConnectionState) {
        self.connection.store(state.code(), Ordering::Release);
    }

    pub fn connection(&self) -> ConnectionState {
        ConnectionState::from_code(self.connection.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    /// Kompletter Snapshot für UI / MQTT
    pub fn snapshot(&self, uptime_secs: u64) -> StatusSnapshot {
        StatusSnapshot {
            connection: self.connection(),
            axes: self.axes(),
            uptime_secs,
            uptime: format_uptime(uptime_secs),
        }
    }

    /// Letzte Bewegung einer Achse
    pub fn last_change(&self, id: AxisId) -> Ticks {
        self.axes[id.index()].last_change.load(Ordering::Relaxed)
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}
