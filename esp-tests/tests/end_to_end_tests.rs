//! End-to-End: Servo-Bus → MotorPoller → StatusChannel → IndicatorRenderer
//!
//! Läuft wie die Firmware-Tasks, nur mit Mocks und manueller Zeit.

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_core::poller::{LIMIT_STATUS_REGISTER, MIN_LIMIT_BIT, POSITION_REGISTER};
use esp_core::renderer::{ALARM_COLOR, MARKER_COLOR, TRACK_COLOR};
use esp_core::{
    AxisBus, AxisId, BusError, ConnectionMethod, ConnectionState, IndicatorRenderer, MotorPoller,
    Settings, SharedStatus, StatusChannel, StatusSnapshot,
};

#[derive(Default)]
struct MockAxisBus {
    status_words: [u16; 3],
    positions: [i32; 3],
}

impl AxisBus for MockAxisBus {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        out: &mut [u16],
    ) -> Result<(), BusError> {
        let index = slave_id.wrapping_sub(1) as usize;
        if index >= 3 {
            return Err(BusError::Timeout);
        }
        match start {
            LIMIT_STATUS_REGISTER => out[0] = self.status_words[index],
            POSITION_REGISTER => {
                let raw = self.positions[index] as u32;
                out[0] = (raw >> 16) as u16;
                out[1] = raw as u16;
            }
            _ => return Err(BusError::Exception(0x02)),
        }
        Ok(())
    }
}

/// Hält alle Teile der Pipeline zusammen
struct Pipeline {
    bus: MockAxisBus,
    poller: MotorPoller,
    channel: StatusChannel<CriticalSectionRawMutex>,
    renderer: IndicatorRenderer,
    status: SharedStatus,
}

impl Pipeline {
    fn new(settings: &Settings) -> Self {
        Self {
            bus: MockAxisBus::default(),
            poller: MotorPoller::new([1, 2, 3], 0),
            channel: StatusChannel::new(),
            renderer: IndicatorRenderer::new(settings.strip_layouts(), settings.render_timing()),
            status: SharedStatus::new(),
        }
    }

    /// Ein Poll-Zyklus und ein Frame zum Zeitpunkt `now`
    fn step(&mut self, now: u32) {
        let sender = self.channel.sender();
        block_on(self.poller.poll_cycle(&mut self.bus, now, &sender));
        for axis in self.poller.axes() {
            self.status.publish_axis(&axis);
        }

        let receiver = self.channel.receiver();
        let axes = self.status.axes();
        self.renderer.frame(now, &receiver, &axes);
    }
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    for axis in settings.axes.iter_mut() {
        axis.led_count = 100;
        axis.rail_length = 1000;
    }
    settings.leds.limit_zone_cells = 20;
    settings.leds.marker_half_width = 1;
    settings.leds.blink_period_ms = 500;
    settings
}

#[test]
fn test_move_to_center_moves_marker() {
    let settings = settings();
    let mut p = Pipeline::new(&settings);

    p.step(0);
    assert_eq!(p.renderer.strip(AxisId::Y).last_drawn_cell(), Some(0));
    assert_eq!(p.renderer.strip(AxisId::Y).pixels()[0], MARKER_COLOR);

    p.bus.positions[AxisId::Y.index()] = 500;
    p.step(100);

    let strip = p.renderer.strip(AxisId::Y);
    assert_eq!(strip.last_drawn_cell(), Some(50));
    assert_eq!(strip.pixels()[50], MARKER_COLOR);
    assert_eq!(strip.pixels()[0], TRACK_COLOR);
    assert_eq!(strip.pixels()[1], TRACK_COLOR);

    // Andere Achsen bleiben am Anfang
    assert_eq!(p.renderer.strip(AxisId::X).last_drawn_cell(), Some(0));
    assert_eq!(p.status.axis(AxisId::Y).position, 500);
    assert_eq!(p.status.last_change(AxisId::Y), 100);
}

#[test]
fn test_limit_switch_reaches_strip() {
    let settings = settings();
    let mut p = Pipeline::new(&settings);
    p.bus.positions = [500; 3];
    p.step(0);

    p.bus.status_words[AxisId::X.index()] = MIN_LIMIT_BIT;
    p.step(1_000);
    let strip = p.renderer.strip(AxisId::X);
    assert_eq!(strip.alarms(), (true, false));
    assert_eq!(strip.pixels()[0], ALARM_COLOR);
    assert_eq!(strip.pixels()[19], ALARM_COLOR);
    assert_eq!(strip.pixels()[20], TRACK_COLOR);
    assert!(p.status.axis(AxisId::X).min_limit_active);

    // Blink-Phase aus
    p.step(1_500);
    assert_eq!(p.renderer.strip(AxisId::X).pixels()[0], TRACK_COLOR);

    // Endschalter wieder frei
    p.bus.status_words[AxisId::X.index()] = 0;
    p.step(2_000);
    let strip = p.renderer.strip(AxisId::X);
    assert_eq!(strip.alarms(), (false, false));
    assert_eq!(strip.pixels()[0], TRACK_COLOR);
}

#[test]
fn test_snapshot_reflects_pipeline() {
    let settings = settings();
    let mut p = Pipeline::new(&settings);
    p.bus.positions[AxisId::YY.index()] = 250;
    p.bus.status_words[AxisId::YY.index()] = MIN_LIMIT_BIT;
    p.step(0);
    p.status
        .set_connection(ConnectionState::Connected(ConnectionMethod::Primary));

    let snapshot: StatusSnapshot = p.status.snapshot(90_061);
    assert_eq!(snapshot.axes[AxisId::YY.index()].position, 250);
    assert!(snapshot.axes[AxisId::YY.index()].min_limit_active);
    assert_eq!(snapshot.uptime.as_str(), "1 days, 1 hours, 1 minutes, 1 seconds");

    let mut buf = [0u8; 512];
    let len = serde_json_core::to_slice(&snapshot, &mut buf).unwrap();
    let json = core::str::from_utf8(&buf[..len]).unwrap();
    assert!(json.contains("\"position\":250"));
}
