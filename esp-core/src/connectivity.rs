//! ConnectivityManager: Netzwerk-Aufbau mit Fallback-Leiter
//!
//! Reine State Machine ohne Hardware. Der Connectivity-Task ruft `poll()`
//! mit der aktuellen Zeit und optional einem `NetEvent` auf und führt die
//! zurückgegebene `NetAction` aus (Transport starten, SNTP, Alert).
//!
//! Leiter pro Zyklus:
//! 1. Transport der zuletzt erfolgreich war (DHCP)
//! 2. Der andere Transport (DHCP)
//! 3. WiFi mit statischer Adresse
//!
//! Ist die Leiter erschöpft, folgt eine Pause (Cooldown) und ein neuer Zyklus.

use crate::types::{
    ConnectionMethod, ConnectionState, NetEvent, Ticks, Transport, deadline_reached,
};

/// Anzahl der Stufen pro Zyklus
pub const LADDER_LEN: usize = 3;

/// Zeitlimits pro Stufe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttemptTimeouts {
    pub primary_ms: u32,
    pub secondary_ms: u32,
    pub fallback_static_ms: u32,
    /// Pause nach Verbindungsverlust oder erschöpfter Leiter
    pub cooldown_ms: u32,
}

impl AttemptTimeouts {
    pub const fn for_method(&self, method: ConnectionMethod) -> u32 {
        match method {
            ConnectionMethod::Primary => self.primary_ms,
            ConnectionMethod::Secondary => self.secondary_ms,
            ConnectionMethod::FallbackStatic => self.fallback_static_ms,
        }
    }
}

impl Default for AttemptTimeouts {
    fn default() -> Self {
        Self {
            primary_ms: 10_000,
            secondary_ms: 15_000,
            fallback_static_ms: 10_000,
            cooldown_ms: 5_000,
        }
    }
}

/// Reihenfolge der Versuche für einen Zyklus
///
/// Die statische Adresse kommt immer zuletzt und wird nie zur
/// bevorzugten Methode.
pub fn plan_ladder(last_successful: Transport) -> [ConnectionMethod; LADDER_LEN] {
    [
        last_successful.into(),
        last_successful.other().into(),
        ConnectionMethod::FallbackStatic,
    ]
}

/// Auftrag an den Connectivity-Task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetAction {
    /// Transport mit dieser Methode hochfahren
    Start(ConnectionMethod),
    /// Verbindung steht: Zeit synchronisieren, Alert senden
    Connected(ConnectionMethod),
    /// Verbindung verloren, neuer Zyklus nach dem Cooldown
    Disconnected,
    /// Alle Stufen ohne Erfolg, neuer Zyklus nach dem Cooldown
    CycleFailed,
}

/// State Machine für den Netzwerk-Aufbau
///
/// `last_successful` wird nur vom Connectivity-Task geschrieben. Andere
/// Tasks lesen den Zustand über `SharedStatus`.
pub struct ConnectivityManager {
    timeouts: AttemptTimeouts,
    state: ConnectionState,
    last_successful: Transport,
    ladder: [ConnectionMethod; LADDER_LEN],
    rung: usize,
    /// Ende des laufenden Versuchs bzw. des Cooldowns (None = sofort starten)
    deadline: Option<Ticks>,
    /// Letzte gestartete WiFi-Methode (DHCP oder statisch)
    wireless_method: ConnectionMethod,
}

impl ConnectivityManager {
    /// Erstellt den Manager im Zustand `Disconnected`
    ///
    /// Der erste `poll()` startet sofort einen Zyklus mit `preferred` als
    /// erster Stufe.
    pub fn new(timeouts: AttemptTimeouts, preferred: Transport) -> Self {
        Self {
            timeouts,
            state: ConnectionState::Disconnected,
            last_successful: preferred,
            ladder: plan_ladder(preferred),
            rung: 0,
            deadline: None,
            wireless_method: ConnectionMethod::Secondary,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_successful(&self) -> Transport {
        self.last_successful
    }

    /// Nächster Zeitpunkt an dem `poll()` ohne Event etwas tun würde
    ///
    /// None solange die Verbindung steht.
    pub fn next_deadline(&self) -> Option<Ticks> {
        match self.state {
            ConnectionState::Connected(_) => None,
            _ => self.deadline,
        }
    }

    /// Transition-Funktion
    ///
    /// Verarbeitet zuerst das Event, danach abgelaufene Zeitlimits.
    /// Pro Aufruf höchstens eine Aktion.
    pub fn poll(&mut self, now: Ticks, event: Option<NetEvent>) -> Option<NetAction> {
        let action = event.and_then(|event| self.handle_event(now, event));
        action.or_else(|| self.handle_timers(now))
    }

    fn handle_event(&mut self, now: Ticks, event: NetEvent) -> Option<NetAction> {
        match event {
            NetEvent::LinkUp(transport) => {
                if self.state.is_connected() {
                    return None;
                }
                let method = self.method_for(transport);
                self.state = ConnectionState::Connected(method);
                self.deadline = None;
                if method.is_dynamic() {
                    self.last_successful = method.transport();
                }
                Some(NetAction::Connected(method))
            }
            NetEvent::LinkDown(transport) => match self.state {
                ConnectionState::Connected(method) if method.transport() == transport => {
                    self.state = ConnectionState::Disconnected;
                    self.deadline = Some(now.wrapping_add(self.timeouts.cooldown_ms));
                    Some(NetAction::Disconnected)
                }
                _ => None,
            },
        }
    }

    fn handle_timers(&mut self, now: Ticks) -> Option<NetAction> {
        match self.state {
            ConnectionState::Connected(_) => None,
            ConnectionState::Disconnected => {
                if self.deadline.is_some_and(|d| !deadline_reached(now, d)) {
                    return None;
                }
                self.ladder = plan_ladder(self.last_successful);
                self.rung = 0;
                Some(self.start(now, self.ladder[0]))
            }
            _ => {
                if self.deadline.is_some_and(|d| !deadline_reached(now, d)) {
                    return None;
                }
                self.rung += 1;
                if self.rung < LADDER_LEN {
                    Some(self.start(now, self.ladder[self.rung]))
                } else {
                    self.state = ConnectionState::Disconnected;
                    self.deadline = Some(now.wrapping_add(self.timeouts.cooldown_ms));
                    Some(NetAction::CycleFailed)
                }
            }
        }
    }

    fn start(&mut self, now: Ticks, method: ConnectionMethod) -> NetAction {
        self.state = ConnectionState::trying(method);
        self.deadline = Some(now.wrapping_add(self.timeouts.for_method(method)));
        if method.transport() == Transport::Secondary {
            self.wireless_method = method;
        }
        NetAction::Start(method)
    }

    /// Methode zu einem Link-Up
    ///
    /// Ein verspätetes Link-Up eines früheren Versuchs zählt ebenfalls.
    fn method_for(&self, transport: Transport) -> ConnectionMethod {
        match self.state.attempt() {
            Some(method) if method.transport() == transport => method,
            _ => match transport {
                Transport::Primary => ConnectionMethod::Primary,
                Transport::Secondary => self.wireless_method,
            },
        }
    }
}
