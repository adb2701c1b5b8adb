//! Core Types für die CNC-Steuerung
//!
//! Datenstrukturen ohne Hardware-Dependencies

use serde::{Serialize, Serializer};

/// Anzahl der Bewegungsachsen (Y, Y', X)
pub const AXIS_COUNT: usize = 3;

/// Millisekunden seit Boot, läuft nach ~49 Tagen über (wie FreeRTOS Ticks)
///
/// u32 statt u64, weil der RISC-V/Xtensa-Core keine 64-Bit Atomics hat und
/// Zeitstempel zwischen Tasks atomar geteilt werden.
pub type Ticks = u32;

/// Verstrichene Zeit zwischen zwei Tick-Werten (überlaufsicher)
#[inline]
pub fn elapsed(now: Ticks, since: Ticks) -> u32 {
    now.wrapping_sub(since)
}

/// Prüft ob `deadline` erreicht ist (überlaufsicher, solange der Abstand < 24 Tage)
#[inline]
pub fn deadline_reached(now: Ticks, deadline: Ticks) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

// ============================================================================
// Achsen
// ============================================================================

/// Bewegungsachse - Index entspricht LED-Strip und Servo-Slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AxisId {
    Y = 0,
    YY = 1,
    X = 2,
}

impl AxisId {
    pub const ALL: [AxisId; AXIS_COUNT] = [AxisId::Y, AxisId::YY, AxisId::X];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            AxisId::Y => "Y",
            AxisId::YY => "YY",
            AxisId::X => "X",
        }
    }
}

impl core::convert::TryFrom<u8> for AxisId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AxisId::Y),
            1 => Ok(AxisId::YY),
            2 => Ok(AxisId::X),
            _ => Err(()),
        }
    }
}

/// Zustand einer Achse
///
/// Gehört exklusiv dem MotorPoller. Andere Tasks sehen nur Kopien
/// (über `SharedStatus::axis()`), nie Referenzen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisStatus {
    pub id: AxisId,
    /// Absolute Position in Encoder-Einheiten (gleiche Einheit wie `rail_length`)
    pub position: i32,
    pub min_limit_active: bool,
    pub max_limit_active: bool,
    /// Zeitpunkt der letzten Positionsänderung
    pub last_change_time: Ticks,
}

impl AxisStatus {
    pub const fn new(id: AxisId, now: Ticks) -> Self {
        Self {
            id,
            position: 0,
            min_limit_active: false,
            max_limit_active: false,
            last_change_time: now,
        }
    }
}

/// Endschalter-Event für Channel-Kommunikation (Poller → Renderer)
///
/// Wird nur bei Flanken gesendet, nicht bei jedem Poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusEvent {
    pub axis_id: AxisId,
    pub min_limit: bool,
    pub max_limit: bool,
}

// ============================================================================
// Netzwerk
// ============================================================================

/// Physischer Netzwerk-Transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    /// Kabelgebunden (W5500 Ethernet)
    Primary,
    /// WiFi Station
    Secondary,
}

impl Transport {
    pub const fn other(self) -> Self {
        match self {
            Transport::Primary => Transport::Secondary,
            Transport::Secondary => Transport::Primary,
        }
    }
}

/// Eine Stufe der Fallback-Leiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionMethod {
    /// Ethernet mit DHCP
    Primary,
    /// WiFi mit DHCP
    Secondary,
    /// WiFi mit statischer Adresse
    FallbackStatic,
}

impl ConnectionMethod {
    /// Transport über den diese Methode läuft
    pub const fn transport(self) -> Transport {
        match self {
            ConnectionMethod::Primary => Transport::Primary,
            ConnectionMethod::Secondary | ConnectionMethod::FallbackStatic => Transport::Secondary,
        }
    }

    /// DHCP-Methoden dürfen als "zuletzt erfolgreich" gemerkt werden
    pub const fn is_dynamic(self) -> bool {
        !matches!(self, ConnectionMethod::FallbackStatic)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionMethod::Primary => "ethernet",
            ConnectionMethod::Secondary => "wifi",
            ConnectionMethod::FallbackStatic => "wifi-static",
        }
    }
}

impl From<Transport> for ConnectionMethod {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Primary => ConnectionMethod::Primary,
            Transport::Secondary => ConnectionMethod::Secondary,
        }
    }
}

/// Zustand des ConnectivityManagers
///
/// `Connected` trägt immer die Methode mit der die Verbindung steht.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    TryingPrimary,
    TryingSecondary,
    TryingFallbackStatic,
    Connected(ConnectionMethod),
}

impl ConnectionState {
    pub const fn trying(method: ConnectionMethod) -> Self {
        match method {
            ConnectionMethod::Primary => ConnectionState::TryingPrimary,
            ConnectionMethod::Secondary => ConnectionState::TryingSecondary,
            ConnectionMethod::FallbackStatic => ConnectionState::TryingFallbackStatic,
        }
    }

    /// Methode die gerade versucht wird (None wenn nicht im Versuch)
    pub const fn attempt(self) -> Option<ConnectionMethod> {
        match self {
            ConnectionState::TryingPrimary => Some(ConnectionMethod::Primary),
            ConnectionState::TryingSecondary => Some(ConnectionMethod::Secondary),
            ConnectionState::TryingFallbackStatic => Some(ConnectionMethod::FallbackStatic),
            _ => None,
        }
    }

    pub const fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Kompakte Kodierung für atomare Ablage in `SharedStatus`
    pub const fn code(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::TryingPrimary => 1,
            ConnectionState::TryingSecondary => 2,
            ConnectionState::TryingFallbackStatic => 3,
            ConnectionState::Connected(ConnectionMethod::Primary) => 4,
            ConnectionState::Connected(ConnectionMethod::Secondary) => 5,
            ConnectionState::Connected(ConnectionMethod::FallbackStatic) => 6,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConnectionState::Disconnected),
            1 => Some(ConnectionState::TryingPrimary),
            2 => Some(ConnectionState::TryingSecondary),
            3 => Some(ConnectionState::TryingFallbackStatic),
            4 => Some(ConnectionState::Connected(ConnectionMethod::Primary)),
            5 => Some(ConnectionState::Connected(ConnectionMethod::Secondary)),
            6 => Some(ConnectionState::Connected(ConnectionMethod::FallbackStatic)),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::TryingPrimary => "trying_ethernet",
            ConnectionState::TryingSecondary => "trying_wifi",
            ConnectionState::TryingFallbackStatic => "trying_wifi_static",
            ConnectionState::Connected(ConnectionMethod::Primary) => "connected_ethernet",
            ConnectionState::Connected(ConnectionMethod::Secondary) => "connected_wifi",
            ConnectionState::Connected(ConnectionMethod::FallbackStatic) => {
                "connected_wifi_static"
            }
        }
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Netzwerk-Ereignisse vom Link-Monitor an den ConnectivityManager
///
/// Ersetzt die Event-Callbacks der Plattform: Events laufen über einen
/// begrenzten Channel und werden synchron vom Connectivity-Task verarbeitet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetEvent {
    /// Link steht und hat eine IPv4-Konfiguration
    LinkUp(Transport),
    /// Link verloren
    LinkDown(Transport),
}
