// Onboard Buzzer (passiv, wird per GPIO mit 1 kHz getaktet)

use embassy_time::{Duration, Timer};
use esp_hal::gpio::Output;

use crate::config::{BEEP_FREQUENCY_HZ, BEEP_OFF_MS, BEEP_ON_MS};

pub struct Buzzer {
    pin: Output<'static>,
}

impl Buzzer {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }

    /// Ein Ton mit `BEEP_FREQUENCY_HZ` für `duration_ms`
    pub async fn tone(&mut self, duration_ms: u64) {
        let half_period = Duration::from_micros(500_000 / BEEP_FREQUENCY_HZ as u64);
        let cycles = duration_ms * BEEP_FREQUENCY_HZ as u64 / 1000;
        for _ in 0..cycles {
            self.pin.set_high();
            Timer::after(half_period).await;
            self.pin.set_low();
            Timer::after(half_period).await;
        }
    }

    /// `times` kurze Pieptöne
    pub async fn beep(&mut self, times: u8) {
        for _ in 0..times {
            self.tone(BEEP_ON_MS).await;
            Timer::after(Duration::from_millis(BEEP_OFF_MS)).await;
        }
    }
}
