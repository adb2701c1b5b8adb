//! Integration Tests für den IndicatorRenderer
//!
//! Diese Tests laufen auf dem Host (x86_64) und nutzen MockLedWriter

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_core::renderer::{ALARM_COLOR, BOOT_COLOR, MARKER_COLOR, OFF, TRACK_COLOR};
use esp_core::{
    AxisId, AxisStatus, ConnectionMethod, Indication, IndicatorRenderer, LedError, RenderTiming,
    SmartLedWriter, StatusChannel, StatusEvent, StatusLed, StripLayout, dim_color,
};
use rgb::RGB8;

// ============================================================================
// Mock LED Writer
// ============================================================================

#[derive(Default)]
pub struct MockLedWriter {
    pub last_frame: Vec<RGB8>,
    pub last_brightness: Option<u8>,
    pub write_count: usize,
    pub fail_next_write: bool,
}

impl MockLedWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SmartLedWriter for MockLedWriter {
    fn write(&mut self, pixels: &[RGB8], brightness: u8) -> Result<(), LedError> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(LedError::WriteFailed);
        }

        self.last_frame = pixels.to_vec();
        self.last_brightness = Some(brightness);
        self.write_count += 1;
        Ok(())
    }
}

// ============================================================================
// Hilfsfunktionen
// ============================================================================

const TIMING: RenderTiming = RenderTiming {
    blink_period_ms: 500,
    idle_timeout_ms: 30_000,
    idle_dim_percent: 30,
};

const LAYOUT: StripLayout = StripLayout {
    led_count: 100,
    rail_length: 1000,
    limit_zone_cells: 20,
    marker_half_width: 1,
    brightness: 64,
};

fn renderer() -> IndicatorRenderer {
    IndicatorRenderer::new([LAYOUT; 3], TIMING)
}

fn axes_at(position: i32, last_change: u32) -> [AxisStatus; 3] {
    AxisId::ALL.map(|id| AxisStatus {
        position,
        last_change_time: last_change,
        ..AxisStatus::new(id, 0)
    })
}

// ============================================================================
// Tests: MockLedWriter
// ============================================================================

#[test]
fn test_mock_led_writer_receives_frame() {
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));

    let strip = r.strip(AxisId::Y);
    let mut mock = MockLedWriter::new();
    mock.write(strip.pixels(), strip.layout().brightness).unwrap();

    assert_eq!(mock.write_count, 1);
    assert_eq!(mock.last_frame.len(), 100);
    assert_eq!(mock.last_frame[50], MARKER_COLOR);
    assert_eq!(mock.last_brightness, Some(64));
}

#[test]
fn test_mock_led_writer_recovers_after_fail() {
    let mut mock = MockLedWriter::new();
    mock.fail_next_write = true;

    let frame = [TRACK_COLOR; 4];
    assert_eq!(mock.write(&frame, 10), Err(LedError::WriteFailed));
    assert_eq!(mock.write_count, 0);

    assert!(mock.write(&frame, 10).is_ok());
    assert_eq!(mock.write_count, 1);
    assert_eq!(mock.last_brightness, Some(10));
}

// ============================================================================
// Tests: Marker
// ============================================================================

#[test]
fn test_marker_centered_on_position() {
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));

    let pixels = r.strip(AxisId::X).pixels();
    for (index, pixel) in pixels.iter().enumerate() {
        let expected = if (49..=51).contains(&index) {
            MARKER_COLOR
        } else {
            TRACK_COLOR
        };
        assert_eq!(*pixel, expected, "cell {}", index);
    }
    assert_eq!(r.strip(AxisId::X).last_drawn_cell(), Some(50));
}

#[test]
fn test_marker_move_restores_previous_cells() {
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));
    r.render(100, &axes_at(700, 100));

    let pixels = r.strip(AxisId::YY).pixels();
    assert_eq!(pixels[50], TRACK_COLOR);
    assert_eq!(pixels[49], TRACK_COLOR);
    assert_eq!(pixels[70], MARKER_COLOR);
    assert_eq!(r.strip(AxisId::YY).last_drawn_cell(), Some(70));
}

#[test]
fn test_position_outside_rail_clamped() {
    let mut r = renderer();
    r.render(0, &axes_at(-250, 0));
    assert_eq!(r.strip(AxisId::Y).last_drawn_cell(), Some(0));
    assert_eq!(r.strip(AxisId::Y).pixels()[0], MARKER_COLOR);
    assert_eq!(r.strip(AxisId::Y).pixels()[1], MARKER_COLOR);

    r.render(10, &axes_at(5_000, 10));
    assert_eq!(r.strip(AxisId::Y).last_drawn_cell(), Some(99));
    assert_eq!(r.strip(AxisId::Y).pixels()[0], TRACK_COLOR);
}

// ============================================================================
// Tests: Endschalter-Zonen
// ============================================================================

#[test]
fn test_min_limit_blinks_zone() {
    let mut r = renderer();
    r.apply_event(StatusEvent {
        axis_id: AxisId::Y,
        min_limit: true,
        max_limit: false,
    });

    r.render(0, &axes_at(500, 0));
    let pixels = r.strip(AxisId::Y).pixels();
    assert!(pixels[..20].iter().all(|p| *p == ALARM_COLOR));
    assert!(pixels[80..].iter().all(|p| *p == TRACK_COLOR));

    r.render(500, &axes_at(500, 0));
    let pixels = r.strip(AxisId::Y).pixels();
    assert!(pixels[..20].iter().all(|p| *p == TRACK_COLOR));
    assert_eq!(pixels[50], MARKER_COLOR);

    // Andere Achsen unberührt
    assert!(r.strip(AxisId::X).pixels()[..20].iter().all(|p| *p == TRACK_COLOR));
}

#[test]
fn test_limit_cleared_restores_zone() {
    let mut r = renderer();
    r.apply_event(StatusEvent {
        axis_id: AxisId::X,
        min_limit: false,
        max_limit: true,
    });
    r.render(0, &axes_at(500, 0));
    assert_eq!(r.strip(AxisId::X).pixels()[99], ALARM_COLOR);

    r.apply_event(StatusEvent {
        axis_id: AxisId::X,
        min_limit: false,
        max_limit: false,
    });
    r.render(20, &axes_at(500, 0));
    assert!(r.strip(AxisId::X).pixels()[80..].iter().all(|p| *p == TRACK_COLOR));
    assert_eq!(r.strip(AxisId::X).alarms(), (false, false));
}

#[test]
fn test_alarm_zone_under_marker_keeps_marker() {
    let mut r = renderer();
    r.render(0, &axes_at(0, 0));
    r.apply_event(StatusEvent {
        axis_id: AxisId::Y,
        min_limit: true,
        max_limit: false,
    });
    r.render(1_000, &axes_at(0, 0));

    let pixels = r.strip(AxisId::Y).pixels();
    assert_eq!(pixels[0], MARKER_COLOR);
    assert_eq!(pixels[1], MARKER_COLOR);
    assert_eq!(pixels[2], ALARM_COLOR);

    // Marker verlässt die Zone, darunter liegt wieder die Alarmfarbe
    r.render(1_100, &axes_at(500, 1_100));
    let pixels = r.strip(AxisId::Y).pixels();
    assert_eq!(pixels[0], ALARM_COLOR);
    assert_eq!(pixels[1], ALARM_COLOR);
}

// ============================================================================
// Tests: Idle-Dimmung
// ============================================================================

#[test]
fn test_idle_dims_track_and_movement_restores() {
    let dimmed = dim_color(TRACK_COLOR, 30);
    assert_eq!(dimmed, RGB8 { r: 76, g: 76, b: 76 });

    let mut r = renderer();
    r.render(0, &axes_at(500, 0));
    r.render(29_999, &axes_at(500, 0));
    assert!(!r.strip(AxisId::Y).is_dimmed());

    r.render(30_000, &axes_at(500, 0));
    let strip = r.strip(AxisId::Y);
    assert!(strip.is_dimmed());
    assert_eq!(strip.pixels()[10], dimmed);
    assert_eq!(strip.pixels()[50], MARKER_COLOR);

    r.render(30_100, &axes_at(600, 30_100));
    let strip = r.strip(AxisId::Y);
    assert!(!strip.is_dimmed());
    assert_eq!(strip.pixels()[10], TRACK_COLOR);
    // Zellen unter dem alten Marker kommen in voller Helligkeit zurück
    assert_eq!(strip.pixels()[50], TRACK_COLOR);
    assert_eq!(strip.pixels()[60], MARKER_COLOR);
}

#[test]
fn test_idle_dim_applied_once() {
    let dimmed = dim_color(TRACK_COLOR, 30);
    let mut r = renderer();
    r.render(30_000, &axes_at(500, 0));
    r.render(60_000, &axes_at(500, 0));
    r.render(90_000, &axes_at(500, 0));
    assert_eq!(r.strip(AxisId::YY).pixels()[0], dimmed);
}

#[test]
fn test_idle_again_after_movement_dims_again() {
    let dimmed = dim_color(TRACK_COLOR, 30);
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));
    r.render(30_000, &axes_at(500, 0));
    assert!(r.strip(AxisId::Y).is_dimmed());

    r.render(30_100, &axes_at(600, 30_100));
    assert!(!r.strip(AxisId::Y).is_dimmed());

    r.render(60_099, &axes_at(600, 30_100));
    assert!(!r.strip(AxisId::Y).is_dimmed());
    assert_eq!(r.strip(AxisId::Y).pixels()[10], TRACK_COLOR);

    // Zweite Idle-Phase dimmt wieder, auch unter dem alten Marker
    r.render(60_100, &axes_at(600, 30_100));
    let strip = r.strip(AxisId::Y);
    assert!(strip.is_dimmed());
    assert_eq!(strip.pixels()[10], dimmed);
    assert_eq!(strip.pixels()[50], dimmed);
    assert_eq!(strip.pixels()[60], MARKER_COLOR);
}

#[test]
fn test_alarm_blinks_full_red_while_dimmed() {
    let dimmed = dim_color(TRACK_COLOR, 30);
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));
    r.render(30_000, &axes_at(500, 0));
    r.apply_event(StatusEvent {
        axis_id: AxisId::Y,
        min_limit: true,
        max_limit: false,
    });

    // Blink-Phase an: Alarm in voller Helligkeit, Rest bleibt gedimmt
    r.render(31_000, &axes_at(500, 0));
    let strip = r.strip(AxisId::Y);
    assert!(strip.is_dimmed());
    assert!(strip.pixels()[..20].iter().all(|p| *p == ALARM_COLOR));
    assert_eq!(strip.pixels()[20], dimmed);
    assert!(strip.pixels()[80..].iter().all(|p| *p == dimmed));

    // Blink-Phase aus: Zone in gedimmter Grundfarbe
    r.render(31_500, &axes_at(500, 0));
    assert!(r.strip(AxisId::Y).pixels()[..20].iter().all(|p| *p == dimmed));

    // Bewegung hebt die Dimmung auf, der Alarm blinkt weiter
    r.render(32_000, &axes_at(500, 32_000));
    let strip = r.strip(AxisId::Y);
    assert!(!strip.is_dimmed());
    assert!(strip.pixels()[..20].iter().all(|p| *p == ALARM_COLOR));
    assert_eq!(strip.pixels()[20], TRACK_COLOR);

    r.render(32_500, &axes_at(500, 32_000));
    assert!(r.strip(AxisId::Y).pixels()[..20].iter().all(|p| *p == TRACK_COLOR));
}

// ============================================================================
// Tests: Status-LED
// ============================================================================

#[test]
fn test_status_led_storage_warning_flashes_then_off() {
    let red = ALARM_COLOR;
    let mut led = StatusLed::new(MockLedWriter::new(), 40);
    led.update(0).unwrap();
    assert_eq!(led.writer().last_frame, vec![OFF]);

    led.start(Indication::StorageHigh, 1_000);
    led.update(1_000).unwrap();
    assert_eq!(led.writer().last_frame, vec![red]);
    assert_eq!(led.writer().last_brightness, Some(40));

    led.update(1_100).unwrap();
    assert_eq!(led.writer().last_frame, vec![OFF]);
    assert_eq!(led.active(), Some(Indication::StorageHigh));

    led.update(1_200).unwrap();
    led.update(1_250).unwrap();
    assert_eq!(led.writer().last_frame, vec![red]);
    assert_eq!(led.writer().write_count, 4);

    // Nach 20 s aus
    led.update(21_000).unwrap();
    assert_eq!(led.writer().last_frame, vec![OFF]);
    assert_eq!(led.active(), None);
    assert_eq!(led.writer().write_count, 5);
}

#[test]
fn test_status_led_dark_phase_keeps_indication() {
    let mut led = StatusLed::new(MockLedWriter::new(), 40);
    led.start(Indication::Connected(ConnectionMethod::Secondary), 0);

    led.update(0).unwrap();
    assert_eq!(led.writer().last_frame[0].b, 255);
    led.update(200).unwrap();
    assert_eq!(led.writer().last_frame, vec![OFF]);

    // Zweiter Blitz kommt trotz dunkler Phase
    led.update(350).unwrap();
    assert_eq!(led.writer().last_frame[0].b, 255);

    led.update(600).unwrap();
    assert_eq!(led.active(), None);
    assert_eq!(led.writer().last_frame, vec![OFF]);
}

// ============================================================================
// Tests: Channel und Boot-Animation
// ============================================================================

#[test]
fn test_frame_drains_channel() {
    let channel = StatusChannel::<CriticalSectionRawMutex>::new();
    let sender = channel.sender();
    let receiver = channel.receiver();

    sender
        .try_send(StatusEvent {
            axis_id: AxisId::YY,
            min_limit: true,
            max_limit: false,
        })
        .unwrap();
    sender
        .try_send(StatusEvent {
            axis_id: AxisId::YY,
            min_limit: true,
            max_limit: true,
        })
        .unwrap();

    let mut r = renderer();
    assert_eq!(r.frame(0, &receiver, &axes_at(500, 0)), 2);
    assert_eq!(r.strip(AxisId::YY).alarms(), (true, true));
    assert_eq!(r.strip(AxisId::YY).pixels()[0], ALARM_COLOR);
    assert_eq!(r.strip(AxisId::YY).pixels()[99], ALARM_COLOR);

    assert_eq!(r.frame(10, &receiver, &axes_at(500, 0)), 0);
}

#[test]
fn test_boot_frame_then_reset() {
    let mut r = renderer();
    r.boot_frame(0);
    let pixels = r.strip(AxisId::X).pixels();
    assert_eq!(pixels[0], BOOT_COLOR);
    assert!(pixels[1..].iter().all(|p| *p == OFF));

    r.boot_frame(5);
    assert_eq!(r.strip(AxisId::X).pixels()[5], BOOT_COLOR);
    assert_eq!(r.strip(AxisId::X).pixels()[0], OFF);

    r.reset();
    r.render(0, &axes_at(500, 0));
    let pixels = r.strip(AxisId::X).pixels();
    assert_eq!(pixels[0], TRACK_COLOR);
    assert_eq!(pixels[50], MARKER_COLOR);
}

#[test]
fn test_redraw_same_cell_changes_nothing() {
    let mut r = renderer();
    r.render(0, &axes_at(500, 0));
    let before = r.strip(AxisId::Y).pixels().to_vec();

    // 504 landet ebenfalls auf Zelle 50
    r.render(100, &axes_at(504, 100));
    assert_eq!(r.strip(AxisId::Y).pixels(), before.as_slice());
    assert_eq!(r.strip(AxisId::Y).last_drawn_cell(), Some(50));
}
