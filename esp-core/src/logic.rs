//! Pure Business Logic Functions
//!
//! Funktionen ohne Hardware-Dependencies (testbar!)

use core::fmt::Write;
use core::ops::Range;

use heapless::String;
use rgb::RGB8;

use crate::types::{ConnectionMethod, Ticks};

/// Skaliert eine Farbe mit einem Helligkeitswert (0-255, 255 = unverändert)
///
/// # Beispiele
///
/// ```
/// # use rgb::RGB8;
/// # use esp_core::scale_color;
/// let white = RGB8 { r: 255, g: 255, b: 255 };
/// assert_eq!(scale_color(white, 255), white);
/// assert_eq!(scale_color(white, 0), RGB8 { r: 0, g: 0, b: 0 });
/// ```
pub fn scale_color(color: RGB8, scale: u8) -> RGB8 {
    let scale_channel = |c: u8| ((c as u16 * scale as u16) / 255) as u8;
    RGB8 {
        r: scale_channel(color.r),
        g: scale_channel(color.g),
        b: scale_channel(color.b),
    }
}

/// Dimmt eine Farbe auf `percent` Prozent ihrer Helligkeit
pub fn dim_color(color: RGB8, percent: u8) -> RGB8 {
    let percent = percent.min(100) as u16;
    let dim_channel = |c: u8| ((c as u16 * percent) / 100) as u8;
    RGB8 {
        r: dim_channel(color.r),
        g: dim_channel(color.g),
        b: dim_channel(color.b),
    }
}

/// Berechnet die LED-Zelle für eine Achsposition
///
/// `position / rail_length * led_count`, auf den Strip begrenzt.
/// Positionen außerhalb der Schiene landen auf der ersten bzw. letzten LED.
pub fn cell_for_position(position: i32, rail_length: i32, led_count: usize) -> usize {
    if rail_length <= 0 || led_count == 0 {
        return 0;
    }
    let clamped = position.clamp(0, rail_length) as i64;
    let cell = (clamped * led_count as i64) / rail_length as i64;
    (cell as usize).min(led_count - 1)
}

/// Zellbereich des Positions-Markers um `cell` (auf den Strip begrenzt)
pub fn marker_range(cell: usize, half_width: usize, led_count: usize) -> Range<usize> {
    if led_count == 0 {
        return 0..0;
    }
    let start = cell.saturating_sub(half_width);
    let end = cell.saturating_add(half_width).min(led_count - 1);
    start..end + 1
}

/// Blink-Phase: `true` = Alarmfarbe, `false` = Grundfarbe
///
/// Rein zeitbasiert, damit alle Strips synchron blinken.
pub fn blink_on(now: Ticks, period_ms: u32) -> bool {
    if period_ms == 0 {
        return true;
    }
    (now / period_ms) % 2 == 0
}

/// Position des "Auges" der Knight-Rider Boot-Animation
///
/// Läuft von 0 bis `led_count - 1` und zurück.
pub fn knight_rider_head(step: usize, led_count: usize) -> usize {
    if led_count <= 1 {
        return 0;
    }
    let period = 2 * (led_count - 1);
    let phase = step % period;
    if phase < led_count {
        phase
    } else {
        period - phase
    }
}

/// Dauer eines Blitzes der Verbindungs-Anzeige (an und aus)
pub const INDICATION_FLASH_MS: u32 = 150;

/// Dauer der grünen Anzeige nach statischem Fallback
pub const INDICATION_STATIC_MS: u32 = 3_000;

/// Farbe der Status-LED `elapsed_ms` nach einem Verbindungsaufbau
///
/// DHCP (Ethernet oder WiFi): zwei kurze blaue Blitze.
/// Statischer Fallback: 3 s grün.
/// `None` wenn die Anzeige vorbei ist.
pub fn connection_indication(method: ConnectionMethod, elapsed_ms: u32) -> Option<RGB8> {
    const BLUE: RGB8 = RGB8 { r: 0, g: 0, b: 255 };
    const GREEN: RGB8 = RGB8 { r: 0, g: 255, b: 0 };
    const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

    if method.is_dynamic() {
        let phase = elapsed_ms / INDICATION_FLASH_MS;
        match phase {
            0 | 2 => Some(BLUE),
            1 | 3 => Some(OFF),
            _ => None,
        }
    } else if elapsed_ms < INDICATION_STATIC_MS {
        Some(GREEN)
    } else {
        None
    }
}

/// Toggle-Periode des Rot-Blinkens bei voller SD-Karte
pub const STORAGE_FLASH_MS: u32 = 100;

/// Gesamtdauer des Rot-Blinkens
pub const STORAGE_FLASH_DURATION_MS: u32 = 20_000;

/// Schnelles Rot-Blinken der Status-LED, None wenn abgelaufen
pub fn storage_warning_indication(elapsed_ms: u32) -> Option<RGB8> {
    const RED: RGB8 = RGB8 { r: 255, g: 0, b: 0 };
    const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

    if elapsed_ms >= STORAGE_FLASH_DURATION_MS {
        None
    } else if (elapsed_ms / STORAGE_FLASH_MS) % 2 == 0 {
        Some(RED)
    } else {
        Some(OFF)
    }
}

/// Was die Status-LED gerade anzeigt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indication {
    /// Verbindung über diese Methode aufgebaut
    Connected(ConnectionMethod),
    /// SD-Karte über der Belegungsschwelle
    StorageHigh,
}

impl Indication {
    /// Farbe `elapsed_ms` nach dem Start, None wenn die Anzeige vorbei ist
    pub fn color(self, elapsed_ms: u32) -> Option<RGB8> {
        match self {
            Indication::Connected(method) => connection_indication(method, elapsed_ms),
            Indication::StorageHigh => storage_warning_indication(elapsed_ms),
        }
    }
}

/// Formatiert eine Laufzeit für den Status-Snapshot
///
/// `"{d} days, {h} hours, {m} minutes, {s} seconds"`
pub fn format_uptime(uptime_secs: u64) -> String<64> {
    let minutes = uptime_secs / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    let mut out = String::new();
    let _ = write!(
        out,
        "{} days, {} hours, {} minutes, {} seconds",
        days,
        hours % 24,
        minutes % 60,
        uptime_secs % 60
    );
    out
}
