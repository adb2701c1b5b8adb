// Library-Root: Wiederverwendbare Logik und Module
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

// Module
pub mod config;
pub mod hal;
pub mod tasks;

use core::fmt::Write;

use defmt::warn;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use heapless::String;

// Re-exports von esp-core
pub use esp_core::{
    AlertSink, ConnectionMethod, Indication, LivenessMonitor, NetEvent, Settings, SharedLog,
    SharedStatus, StatusEvent, Ticks, Transport, Worker,
};

use crate::config::{ALERT_QUEUE_CAPACITY, ALERT_TEXT_SIZE};
use crate::hal::SdStorage;
use crate::tasks::WifiCommand;

// ============================================================================
// Zeit
// ============================================================================

/// Millisekunden seit Boot als `Ticks` (läuft nach ~49 Tagen über)
pub fn now_ticks() -> Ticks {
    Instant::now().as_millis() as Ticks
}

/// Sekunden seit Boot
pub fn uptime_secs() -> u64 {
    Instant::now().as_secs()
}

// ============================================================================
// Type-Aliase für Channel-Typen
// ============================================================================
//
// Alle Tasks laufen auf einem Executor, daher reicht NoopRawMutex.

/// Endschalter-Events (MotorPoller → Indicator)
pub type StatusChannel = esp_core::StatusChannel<NoopRawMutex>;
pub type StatusSender = esp_core::StatusSender<'static, NoopRawMutex>;
pub type StatusReceiver = esp_core::StatusReceiver<'static, NoopRawMutex>;

/// Kapazität des Link-Event Channels
pub const NET_EVENT_CAPACITY: usize = 4;

/// Link-Events (Link-Monitor → Connectivity)
pub type NetEventChannel = Channel<NoopRawMutex, NetEvent, NET_EVENT_CAPACITY>;
pub type NetEventSender = Sender<'static, NoopRawMutex, NetEvent, NET_EVENT_CAPACITY>;
pub type NetEventReceiver = Receiver<'static, NoopRawMutex, NetEvent, NET_EVENT_CAPACITY>;

/// WiFi-Kommandos (Connectivity → WiFi Controller)
pub type WifiCommandChannel = Channel<NoopRawMutex, WifiCommand, 2>;
pub type WifiCommandSender = Sender<'static, NoopRawMutex, WifiCommand, 2>;
pub type WifiCommandReceiver = Receiver<'static, NoopRawMutex, WifiCommand, 2>;

/// Alert-Text, wird per MQTT veröffentlicht
pub type AlertText = String<ALERT_TEXT_SIZE>;

/// Alert-Queue (alle Tasks → MQTT)
pub type AlertChannel = Channel<NoopRawMutex, AlertText, ALERT_QUEUE_CAPACITY>;
pub type AlertReceiver = Receiver<'static, NoopRawMutex, AlertText, ALERT_QUEUE_CAPACITY>;

/// Zeit-Synchronisation anstoßen (Connectivity → SNTP)
pub type TimeSyncSignal = Signal<NoopRawMutex, Transport>;

/// Anzeige auf der Status-LED (Connectivity, Storage Monitor → Indicator)
pub type IndicationSignal = Signal<NoopRawMutex, Indication>;

/// "send alert" Implementierung: nicht-blockierend in die Alert-Queue
///
/// Ist die Queue voll, wird der Alert verworfen.
#[derive(Clone, Copy)]
pub struct AlertQueue {
    sender: Sender<'static, NoopRawMutex, AlertText, ALERT_QUEUE_CAPACITY>,
}

impl AlertQueue {
    pub fn new(channel: &'static AlertChannel) -> Self {
        Self {
            sender: channel.sender(),
        }
    }
}

impl AlertSink for AlertQueue {
    fn send_alert(&self, text: &str) {
        let alert = esp_core::config::text(text);
        if self.sender.try_send(alert).is_err() {
            warn!("Alert: queue full, dropping '{}'", text);
        }
    }
}

/// Das Diagnose-Log der Firmware (SD-Karte + Ring-Buffer)
pub type FirmwareLog = SharedLog<NoopRawMutex, SdStorage, AlertQueue>;

// ============================================================================
// Kontext für alle Tasks
// ============================================================================

/// Gemeinsame Referenzen, wird beim Spawnen an jeden Task kopiert
#[derive(Clone, Copy)]
pub struct Context {
    pub settings: &'static Settings,
    pub status: &'static SharedStatus,
    pub log: &'static FirmwareLog,
    pub liveness: &'static LivenessMonitor,
    pub alerts: AlertQueue,
}

impl Context {
    /// Schreibt eine Zeile ins Diagnose-Log
    ///
    /// Ist das Log gerade belegt, wird die Zeile nur über defmt ausgegeben.
    pub fn log(&self, message: &str) {
        let now_unix = self.status.clock().now_unix(uptime_secs());
        if self.log.append(now_unix, message).is_err() {
            warn!("Log: busy, skipped '{}'", message);
        }
    }

    /// Wie `log()`, mit Formatierung
    pub fn log_fmt(&self, args: core::fmt::Arguments<'_>) {
        let mut message: String<{ esp_core::log::LOG_MSG_SIZE }> = String::new();
        let _ = message.write_fmt(args);
        self.log(&message);
    }

    pub fn alert(&self, text: &str) {
        self.alerts.send_alert(text);
    }

    /// Lebenszeichen an den Supervisor
    pub fn check_in(&self, worker: Worker) {
        self.liveness.check_in(worker, now_ticks());
    }
}
