//! Hardware Abstraction Traits
//!
//! Diese Traits definieren Schnittstellen für Hardware-Zugriff
//! ohne konkrete Implementierung.

use rgb::RGB8;

/// Fehler-Typ für LED-Operationen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedError {
    WriteFailed,
}

/// Trait für SmartLED Hardware-Zugriff
///
/// Abstrahiert den Zugriff auf einen RGB LED-Strip (WS2812/Neopixel).
///
/// # Implementierungen
/// - **Production:** RmtLedWriter (ESP32 RMT Peripheral)
/// - **Testing:** MockLedWriter (in-memory Mock)
pub trait SmartLedWriter: Send {
    /// Schreibt einen kompletten Frame auf den Strip
    ///
    /// `brightness` (0-255) skaliert alle Pixel beim Ausgeben, der Frame
    /// selbst bleibt unverändert.
    ///
    /// # Fehlerbehandlung
    /// Gibt `LedError::WriteFailed` zurück wenn Hardware-Zugriff fehlschlägt
    fn write(&mut self, pixels: &[RGB8], brightness: u8) -> Result<(), LedError>;
}

/// Fehler-Typ für Zugriffe auf den RS485-Bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Keine Antwort innerhalb des Timeouts
    Timeout,
    /// Antwort mit falscher Prüfsumme
    Crc,
    /// Servo hat mit einer Modbus-Exception geantwortet
    Exception(u8),
    /// UART-Fehler
    Io,
}

/// Trait für den Servo-Bus ("read holding registers")
///
/// Die Implementierung muss selbst zeitbegrenzt sein - ein Timeout
/// wird wie ein fehlgeschlagener Read behandelt.
#[allow(async_fn_in_trait)]
pub trait AxisBus {
    /// Liest `out.len()` Holding-Register ab `start` vom Slave `slave_id`
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        out: &mut [u16],
    ) -> Result<(), BusError>;
}

/// Richtungsumschaltung eines Halbduplex-Transceivers (RS485 DE-Pin)
pub trait BusDirection {
    fn set_transmit(&mut self);
    fn set_receive(&mut self);
}

/// Hält den Transceiver im Sendemodus solange der Guard lebt
///
/// Beim Drop wird auf Empfang zurückgeschaltet, auch wenn ein Timeout den
/// Sende-Future mitten im Schreiben abbricht.
pub struct TransmitGuard<'a, D: BusDirection> {
    direction: &'a mut D,
}

impl<'a, D: BusDirection> TransmitGuard<'a, D> {
    pub fn enable(direction: &'a mut D) -> Self {
        direction.set_transmit();
        Self { direction }
    }
}

impl<D: BusDirection> Drop for TransmitGuard<'_, D> {
    fn drop(&mut self) {
        self.direction.set_receive();
    }
}

/// Fehler-Typ für den persistenten Speicher (SD-Karte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    NotAvailable,
    WriteFailed,
    ReadFailed,
}

/// Belegung des persistenten Speichers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl StorageUsage {
    /// Belegung in Prozent (0 bei unbekannter Größe)
    pub fn usage_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let percent = self.used_bytes.saturating_mul(100) / self.total_bytes;
        percent.min(100) as u8
    }
}

/// Trait für das Log-Ziel auf dem persistenten Speicher
pub trait LogStorage {
    /// Hängt eine fertig formatierte Zeile (inkl. `\n`) an die Log-Datei an
    fn append(&mut self, line: &str) -> Result<(), StorageError>;

    /// Aktuelle Belegung des Speichers
    fn usage(&mut self) -> Result<StorageUsage, StorageError>;
}

/// Externer Alarm-Kanal ("send alert")
///
/// Fire-and-forget: darf nie blockieren und meldet keinen Zustellstatus.
pub trait AlertSink {
    fn send_alert(&self, text: &str);
}

impl<T: AlertSink> AlertSink for &T {
    fn send_alert(&self, text: &str) {
        (**self).send_alert(text)
    }
}
