//! Laufzeit-Einstellungen (FIRECNC.CFG auf der SD-Karte)
//!
//! Jedes Feld hat einen Default, unvollständige Dateien sind erlaubt.
//! Nach dem Parsen wird immer `validate()` ausgeführt.

use core::net::Ipv4Addr;
use core::str::FromStr;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::connectivity::AttemptTimeouts;
use crate::renderer::{MAX_LEDS_PER_STRIP, RenderTiming, StripLayout};
use crate::supervisor::validate_feed_period;
use crate::types::{AXIS_COUNT, AxisId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// JSON nicht lesbar
    Parse,
    /// Buffer zu klein beim Serialisieren
    Serialize,
    InvalidLedCount(AxisId),
    InvalidLimitZone(AxisId),
    InvalidRailLength(AxisId),
    InvalidDimPercent,
    InvalidBlinkPeriod,
    InvalidFrameInterval,
    InvalidPollInterval,
    InvalidMonitorInterval,
    InvalidFeedPeriod,
    InvalidThreshold,
    InvalidAddress,
}

/// Baut einen heapless String aus einem &str (abgeschnitten wenn zu lang)
pub fn text<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub wifi_ssid: String<32>,
    pub wifi_password: String<64>,
    /// Leer = keine statische Fallback-Adresse konfiguriert
    pub static_ip: String<16>,
    pub gateway: String<16>,
    pub subnet_prefix: u8,
    pub dns_server: String<16>,
    pub ntp_server: String<64>,
    pub primary_timeout_ms: u32,
    pub secondary_timeout_ms: u32,
    pub static_timeout_ms: u32,
    pub cooldown_ms: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        let timeouts = AttemptTimeouts::default();
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            static_ip: String::new(),
            gateway: String::new(),
            subnet_prefix: 24,
            dns_server: String::new(),
            ntp_server: text("pool.ntp.org"),
            primary_timeout_ms: timeouts.primary_ms,
            secondary_timeout_ms: timeouts.secondary_ms,
            static_timeout_ms: timeouts.fallback_static_ms,
            cooldown_ms: timeouts.cooldown_ms,
        }
    }
}

/// Statische IPv4-Konfiguration für die letzte Fallback-Stufe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddress {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Option<Ipv4Addr>,
}

fn parse_optional_ip(s: &str) -> Result<Option<Ipv4Addr>, ConfigError> {
    if s.is_empty() {
        return Ok(None);
    }
    Ipv4Addr::from_str(s)
        .map(Some)
        .map_err(|_| ConfigError::InvalidAddress)
}

impl NetworkSettings {
    /// Statische Adresse, None wenn keine konfiguriert ist
    pub fn static_address(&self) -> Result<Option<StaticAddress>, ConfigError> {
        let Some(address) = parse_optional_ip(&self.static_ip)? else {
            return Ok(None);
        };
        if self.subnet_prefix > 32 {
            return Err(ConfigError::InvalidAddress);
        }
        Ok(Some(StaticAddress {
            address,
            prefix_len: self.subnet_prefix,
            gateway: parse_optional_ip(&self.gateway)?,
            dns: parse_optional_ip(&self.dns_server)?,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedSettings {
    pub blink_period_ms: u32,
    pub idle_timeout_secs: u32,
    /// Verbleibende Helligkeit im Idle (Prozent)
    pub idle_dim_percent: u8,
    pub frame_interval_ms: u32,
    pub boot_animation_ms: u32,
    pub limit_zone_cells: usize,
    pub marker_half_width: usize,
}

impl Default for LedSettings {
    fn default() -> Self {
        Self {
            blink_period_ms: 500,
            idle_timeout_secs: 30,
            idle_dim_percent: 30,
            frame_interval_ms: 50,
            boot_animation_ms: 3_000,
            limit_zone_cells: 20,
            marker_half_width: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSettings {
    /// Modbus Slave-ID des Servos
    pub slave_id: u8,
    pub led_count: usize,
    /// Schienenlänge in Encoder-Einheiten
    pub rail_length: i32,
    pub brightness: u8,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            slave_id: 1,
            led_count: 100,
            rail_length: 100_000,
            brightness: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSettings {
    pub poll_interval_ms: u32,
    pub read_timeout_ms: u32,
    pub baud_rate: u32,
}

impl Default for ServoSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            read_timeout_ms: 50,
            baud_rate: 19_200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub timeout_secs: u32,
    pub supervisor_feed_ms: u32,
    pub worker_deadline_ms: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            supervisor_feed_ms: 1_000,
            worker_deadline_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub monitor_interval_secs: u32,
    pub usage_threshold_percent: u8,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 60,
            usage_threshold_percent: 90,
        }
    }
}

/// Alle Einstellungen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkSettings,
    pub leds: LedSettings,
    /// Reihenfolge Y, YY, X
    pub axes: [AxisSettings; AXIS_COUNT],
    pub servos: ServoSettings,
    pub watchdog: WatchdogSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let axis = |slave_id| AxisSettings {
            slave_id,
            ..AxisSettings::default()
        };
        Self {
            network: NetworkSettings::default(),
            leds: LedSettings::default(),
            axes: [axis(1), axis(2), axis(3)],
            servos: ServoSettings::default(),
            watchdog: WatchdogSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Parst und validiert eine Einstellungsdatei
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let (settings, _) =
            serde_json_core::from_slice::<Settings>(bytes).map_err(|_| ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialisiert in `buf`, gibt die Anzahl geschriebener Bytes zurück
    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        serde_json_core::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for id in AxisId::ALL {
            let axis = &self.axes[id.index()];
            if axis.led_count == 0 || axis.led_count > MAX_LEDS_PER_STRIP {
                return Err(ConfigError::InvalidLedCount(id));
            }
            if self.leds.limit_zone_cells > axis.led_count / 2 {
                return Err(ConfigError::InvalidLimitZone(id));
            }
            if axis.rail_length <= 0 {
                return Err(ConfigError::InvalidRailLength(id));
            }
        }

        if self.leds.idle_dim_percent > 100 {
            return Err(ConfigError::InvalidDimPercent);
        }
        if self.leds.blink_period_ms == 0 {
            return Err(ConfigError::InvalidBlinkPeriod);
        }

        // Periodische Worker müssen innerhalb ihrer Deadline einchecken
        let deadline = self.watchdog.worker_deadline_ms;
        let frame = self.leds.frame_interval_ms;
        if frame == 0 || frame >= deadline {
            return Err(ConfigError::InvalidFrameInterval);
        }
        if self.servos.poll_interval_ms == 0 || self.poll_cycle_worst_case_ms() >= deadline {
            return Err(ConfigError::InvalidPollInterval);
        }
        let monitor = self.storage.monitor_interval_secs;
        if monitor == 0 || monitor.checked_mul(1000).is_none() {
            return Err(ConfigError::InvalidMonitorInterval);
        }

        let watchdog = &self.watchdog;
        if !validate_feed_period(
            watchdog.supervisor_feed_ms,
            &[watchdog.worker_deadline_ms],
            watchdog.timeout_secs.saturating_mul(1000),
        ) {
            return Err(ConfigError::InvalidFeedPeriod);
        }

        let threshold = self.storage.usage_threshold_percent;
        if threshold == 0 || threshold > 100 {
            return Err(ConfigError::InvalidThreshold);
        }

        self.network.static_address()?;
        Ok(())
    }

    pub fn strip_layout(&self, id: AxisId) -> StripLayout {
        let axis = &self.axes[id.index()];
        StripLayout {
            led_count: axis.led_count,
            rail_length: axis.rail_length,
            limit_zone_cells: self.leds.limit_zone_cells,
            marker_half_width: self.leds.marker_half_width,
            brightness: axis.brightness,
        }
    }

    pub fn strip_layouts(&self) -> [StripLayout; AXIS_COUNT] {
        AxisId::ALL.map(|id| self.strip_layout(id))
    }

    pub fn render_timing(&self) -> RenderTiming {
        RenderTiming {
            blink_period_ms: self.leds.blink_period_ms,
            idle_timeout_ms: self.leds.idle_timeout_secs.saturating_mul(1000),
            idle_dim_percent: self.leds.idle_dim_percent,
        }
    }

    pub fn attempt_timeouts(&self) -> AttemptTimeouts {
        AttemptTimeouts {
            primary_ms: self.network.primary_timeout_ms,
            secondary_ms: self.network.secondary_timeout_ms,
            fallback_static_ms: self.network.static_timeout_ms,
            cooldown_ms: self.network.cooldown_ms,
        }
    }

    pub fn slave_ids(&self) -> [u8; AXIS_COUNT] {
        self.axes.map(|axis| axis.slave_id)
    }

    /// Poll-Intervall plus zwei Reads pro Achse, die alle in den Timeout laufen
    pub fn poll_cycle_worst_case_ms(&self) -> u32 {
        let reads = (2 * AXIS_COUNT) as u32;
        self.servos
            .poll_interval_ms
            .saturating_add(self.servos.read_timeout_ms.saturating_mul(reads))
    }

    /// Deadline des Storage-Monitors: ein Intervall plus Reserve
    pub fn storage_deadline_ms(&self) -> u32 {
        self.storage
            .monitor_interval_secs
            .saturating_mul(1000)
            .saturating_add(self.watchdog.worker_deadline_ms)
    }

    /// Deadline des WiFi-Controllers: Start und Connect mit je dem
    /// längsten Versuchs-Timeout, plus Reserve
    pub fn wifi_deadline_ms(&self) -> u32 {
        let network = &self.network;
        let longest = network
            .primary_timeout_ms
            .max(network.secondary_timeout_ms)
            .max(network.static_timeout_ms);
        longest
            .saturating_mul(2)
            .saturating_add(self.watchdog.worker_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let settings = Settings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.slave_ids(), [1, 2, 3]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = br#"{"leds":{"idle_dim_percent":50},"storage":{"usage_threshold_percent":75}}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.leds.idle_dim_percent, 50);
        assert_eq!(settings.leds.blink_period_ms, 500);
        assert_eq!(settings.storage.usage_threshold_percent, 75);
        assert_eq!(settings.axes[2].slave_id, 3);
    }

    #[test]
    fn test_invalid_led_count_rejected() {
        let mut settings = Settings::default();
        settings.axes[1].led_count = MAX_LEDS_PER_STRIP + 1;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidLedCount(AxisId::YY))
        );
    }

    #[test]
    fn test_limit_zone_wider_than_half_strip_rejected() {
        let mut settings = Settings::default();
        settings.axes[0].led_count = 30;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidLimitZone(AxisId::Y))
        );
    }

    #[test]
    fn test_feed_period_must_beat_deadlines() {
        let mut settings = Settings::default();
        settings.watchdog.supervisor_feed_ms = 5_000;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidFeedPeriod));
    }

    #[test]
    fn test_slow_poll_interval_rejected() {
        let json = br#"{"servos":{"poll_interval_ms":10000},"leds":{"frame_interval_ms":0},"storage":{"monitor_interval_secs":0}}"#;
        assert_eq!(
            Settings::from_json(json),
            Err(ConfigError::InvalidFrameInterval)
        );

        let mut settings = Settings::default();
        settings.servos.poll_interval_ms = 10_000;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidPollInterval));

        // 4600 ms Intervall + 6 x 50 ms Timeout = 4900 ms, knapp unter 5 s
        settings.servos.poll_interval_ms = 4_600;
        assert_eq!(settings.validate(), Ok(()));
        settings.servos.read_timeout_ms = 70;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidPollInterval));

        settings = Settings::default();
        settings.servos.poll_interval_ms = 0;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidPollInterval));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut settings = Settings::default();
        settings.leds.frame_interval_ms = 0;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidFrameInterval));

        settings = Settings::default();
        settings.leds.frame_interval_ms = settings.watchdog.worker_deadline_ms;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidFrameInterval));

        settings = Settings::default();
        settings.storage.monitor_interval_secs = 0;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidMonitorInterval));

        settings.storage.monitor_interval_secs = u32::MAX / 100;
        assert_eq!(settings.validate(), Err(ConfigError::InvalidMonitorInterval));
    }

    #[test]
    fn test_worker_deadlines() {
        let mut settings = Settings::default();
        assert_eq!(settings.storage_deadline_ms(), 65_000);
        assert_eq!(settings.wifi_deadline_ms(), 2 * 15_000 + 5_000);
        assert_eq!(settings.poll_cycle_worst_case_ms(), 400);

        settings.storage.monitor_interval_secs = u32::MAX;
        assert_eq!(settings.storage_deadline_ms(), u32::MAX);
    }

    #[test]
    fn test_static_address() {
        let mut settings = Settings::default();
        assert_eq!(settings.network.static_address(), Ok(None));

        settings.network.static_ip = text("192.168.1.50");
        settings.network.gateway = text("192.168.1.1");
        let addr = settings.network.static_address().unwrap().unwrap();
        assert_eq!(addr.address, Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(addr.gateway, Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(addr.dns, None);

        settings.network.static_ip = text("192.168.1");
        assert_eq!(settings.validate(), Err(ConfigError::InvalidAddress));
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = Settings::default();
        settings.network.wifi_ssid = text("werkstatt");
        let mut buf = [0u8; 2048];
        let n = settings.to_json(&mut buf).unwrap();
        assert_eq!(Settings::from_json(&buf[..n]).unwrap(), settings);
    }
}
