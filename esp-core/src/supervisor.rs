//! Supervisor: Liveness-Überwachung aller Worker-Tasks
//!
//! Jeder Worker meldet sich nach jedem Zyklus mit `check_in()`. Der
//! Supervisor-Task füttert den Hardware-Watchdog nur solange kein Worker
//! seine Deadline überschritten hat. Hängt ein Worker, bleibt das Füttern
//! aus und der Watchdog setzt den Chip zurück. Es gibt keine Teil-Recovery.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::types::{Ticks, elapsed};

/// Überwachte Worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Worker {
    Connectivity = 0,
    MotorPoller = 1,
    Indicator = 2,
    StorageMonitor = 3,
    Alerts = 4,
    WifiController = 5,
}

impl Worker {
    pub const COUNT: usize = 6;

    pub const ALL: [Worker; Worker::COUNT] = [
        Worker::Connectivity,
        Worker::MotorPoller,
        Worker::Indicator,
        Worker::StorageMonitor,
        Worker::Alerts,
        Worker::WifiController,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Worker::Connectivity => "connectivity",
            Worker::MotorPoller => "motor_poller",
            Worker::Indicator => "indicator",
            Worker::StorageMonitor => "storage_monitor",
            Worker::Alerts => "alerts",
            Worker::WifiController => "wifi_controller",
        }
    }
}

struct Slot {
    registered: AtomicBool,
    deadline_ms: AtomicU32,
    last_check_in: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            deadline_ms: AtomicU32::new(0),
            last_check_in: AtomicU32::new(0),
        }
    }
}

/// Deadline-Monitor, statisch angelegt und von allen Tasks geteilt
///
/// Jeder Slot wird nur von seinem Worker geschrieben (`check_in`) und nur
/// vom Supervisor gelesen.
pub struct LivenessMonitor {
    slots: [Slot; Worker::COUNT],
}

impl LivenessMonitor {
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::new() }; Worker::COUNT],
        }
    }

    /// Meldet einen Worker mit seiner Deadline an
    pub fn register(&self, worker: Worker, deadline_ms: u32, now: Ticks) {
        let slot = &self.slots[worker as usize];
        slot.deadline_ms.store(deadline_ms, Ordering::Relaxed);
        slot.last_check_in.store(now, Ordering::Relaxed);
        slot.registered.store(true, Ordering::Release);
    }

    /// Lebenszeichen eines Workers
    pub fn check_in(&self, worker: Worker, now: Ticks) {
        self.slots[worker as usize]
            .last_check_in
            .store(now, Ordering::Release);
    }

    /// Erster registrierter Worker dessen Deadline überschritten ist
    pub fn overdue(&self, now: Ticks) -> Option<Worker> {
        Worker::ALL.into_iter().find(|&worker| {
            let slot = &self.slots[worker as usize];
            if !slot.registered.load(Ordering::Acquire) {
                return false;
            }
            let last = slot.last_check_in.load(Ordering::Acquire);
            elapsed(now, last) > slot.deadline_ms.load(Ordering::Relaxed)
        })
    }

    /// Kürzeste Deadline aller registrierten Worker
    pub fn shortest_deadline(&self) -> Option<u32> {
        self.slots
            .iter()
            .filter(|slot| slot.registered.load(Ordering::Acquire))
            .map(|slot| slot.deadline_ms.load(Ordering::Relaxed))
            .min()
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Prüft ob der Supervisor schneller füttert als jede Deadline
///
/// Der Feed-Zyklus muss kürzer sein als jede Worker-Deadline und als der
/// Hardware-Watchdog selbst.
pub fn validate_feed_period(feed_ms: u32, worker_deadlines_ms: &[u32], watchdog_ms: u32) -> bool {
    feed_ms > 0 && feed_ms < watchdog_ms && worker_deadlines_ms.iter().all(|&d| feed_ms < d)
}
