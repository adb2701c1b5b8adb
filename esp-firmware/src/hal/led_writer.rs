// SmartLED Writer für die LED-Strips
//
// Implementiert esp_core::SmartLedWriter über das RMT Peripheral.
// Ein Writer pro Strip, jeder auf einem eigenen RMT TX-Kanal.

use esp_core::{LedError, SmartLedWriter, scale_color};
use esp_hal::Blocking;
use esp_hal::gpio::interconnect::PeripheralOutput;
use esp_hal::rmt::{PulseCode, TxChannelCreator};
use esp_hal_smartled::SmartLedsAdapter;
use rgb::RGB8;
use smart_leds_trait::SmartLedsWrite;

use esp_core::renderer::MAX_LEDS_PER_STRIP;

/// RMT-Buffer für einen kompletten Strip (24 Pulse pro LED + End-Marker)
pub const STRIP_BUFFER_SIZE: usize = esp_hal_smartled::buffer_size(MAX_LEDS_PER_STRIP);

/// RMT-Buffer für die einzelne Status-LED
pub const STATUS_BUFFER_SIZE: usize = esp_hal_smartled::buffer_size(1);

/// Real Hardware LED Writer
///
/// Hinweis: Der Buffer muss 'static sein, daher wird er in main.rs über
/// eine StaticCell angelegt und als Parameter übergeben.
pub struct RmtLedWriter<'a, const BUFFER_SIZE: usize> {
    led: SmartLedsAdapter<'a, BUFFER_SIZE>,
}

impl<'a, const BUFFER_SIZE: usize> RmtLedWriter<'a, BUFFER_SIZE> {
    /// Erstellt einen Writer auf einem RMT-Kanal
    ///
    /// # Parameter
    /// - `channel`: RMT TX-Kanal (rmt.channel0 .. rmt.channel3)
    /// - `pin`: GPIO der Datenleitung
    /// - `buffer`: Buffer für LED-Daten (erstellt mit smart_led_buffer! Macro)
    pub fn new<C, O>(channel: C, pin: O, buffer: &'a mut [PulseCode; BUFFER_SIZE]) -> Self
    where
        C: TxChannelCreator<'a, Blocking>,
        O: PeripheralOutput<'a>,
    {
        Self {
            led: SmartLedsAdapter::new(channel, pin, buffer),
        }
    }
}

impl<'a, const BUFFER_SIZE: usize> SmartLedWriter for RmtLedWriter<'a, BUFFER_SIZE> {
    fn write(&mut self, pixels: &[RGB8], brightness: u8) -> Result<(), LedError> {
        self.led
            .write(pixels.iter().map(|&pixel| scale_color(pixel, brightness)))
            .map_err(|_| LedError::WriteFailed)
    }
}

/// Writer für einen der drei Achsen-Strips
pub type StripWriter = RmtLedWriter<'static, STRIP_BUFFER_SIZE>;

/// Writer für die Onboard Status-LED
pub type StatusLedWriter = RmtLedWriter<'static, STATUS_BUFFER_SIZE>;
