//! IndicatorRenderer: Achszustand auf die drei LED-Strips abbilden
//!
//! Pro Frame:
//! 1. Endschalter-Events aus dem StatusChannel übernehmen
//! 2. Endschalter-Zonen am Anfang/Ende des Strips blinken lassen
//! 3. Positions-Marker verschieben (Backup/Restore statt Neuzeichnen)
//! 4. Idle-Dimmung der Grundfarbe
//!
//! Der Marker liegt nicht-destruktiv über der Grundfarbe: die Zellen unter
//! dem Marker werden im Backup-Buffer gesichert, Änderungen der Grundfarbe
//! unter dem Marker landen direkt im Backup. Dadurch werden pro Frame nur
//! Zellen angefasst, die sich wirklich ändern.

use core::ops::Range;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use rgb::RGB8;

use crate::channel::StatusReceiver;
use crate::logic::{
    Indication, blink_on, cell_for_position, dim_color, knight_rider_head, marker_range,
};
use crate::traits::{LedError, SmartLedWriter};
use crate::types::{AXIS_COUNT, AxisId, AxisStatus, StatusEvent, Ticks, elapsed};

/// Maximale Anzahl LEDs pro Strip (bestimmt die statischen Buffer)
pub const MAX_LEDS_PER_STRIP: usize = 120;

/// Grundfarbe der Schiene ("voll beleuchtet")
pub const TRACK_COLOR: RGB8 = RGB8 {
    r: 255,
    g: 255,
    b: 255,
};

/// Blinkfarbe bei aktivem Endschalter
pub const ALARM_COLOR: RGB8 = RGB8 { r: 255, g: 0, b: 0 };

/// Farbe des Positions-Markers
pub const MARKER_COLOR: RGB8 = RGB8 { r: 0, g: 255, b: 0 };

/// Farbe der Boot-Animation
pub const BOOT_COLOR: RGB8 = RGB8 { r: 0, g: 0, b: 255 };

pub const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// Geometrie eines Strips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripLayout {
    pub led_count: usize,
    /// Schienenlänge in Positions-Einheiten
    pub rail_length: i32,
    /// Breite der Endschalter-Zone an jedem Ende
    pub limit_zone_cells: usize,
    /// LEDs links und rechts der Marker-Mitte
    pub marker_half_width: usize,
    /// Ausgabe-Helligkeit (0-255)
    pub brightness: u8,
}

/// Zeitverhalten, für alle Strips gleich
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTiming {
    pub blink_period_ms: u32,
    pub idle_timeout_ms: u32,
    /// Verbleibende Helligkeit der Grundfarbe im Idle (Prozent)
    pub idle_dim_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Min = 0,
    Max = 1,
}

/// Zustand eines einzelnen Strips
pub struct StripRenderer {
    layout: StripLayout,
    frame: Vec<RGB8, MAX_LEDS_PER_STRIP>,
    backup: Vec<RGB8, MAX_LEDS_PER_STRIP>,
    last_drawn_cell: Option<usize>,
    min_alarm: bool,
    max_alarm: bool,
    zone_colors: [RGB8; 2],
    dimmed: bool,
}

impl StripRenderer {
    pub fn new(layout: StripLayout) -> Self {
        let mut layout = layout;
        layout.led_count = layout.led_count.min(MAX_LEDS_PER_STRIP);

        let mut strip = Self {
            layout,
            frame: Vec::new(),
            backup: Vec::new(),
            last_drawn_cell: None,
            min_alarm: false,
            max_alarm: false,
            zone_colors: [TRACK_COLOR; 2],
            dimmed: false,
        };
        strip.reset();
        strip
    }

    /// Setzt den Strip auf die Grundfarbe zurück (z.B. nach der Boot-Animation)
    ///
    /// Endschalter-Flags bleiben erhalten, der Marker wird beim nächsten
    /// Frame neu gezeichnet.
    pub fn reset(&mut self) {
        let count = self.layout.led_count;
        self.frame.clear();
        self.backup.clear();
        for _ in 0..count {
            let _ = self.frame.push(TRACK_COLOR);
            let _ = self.backup.push(TRACK_COLOR);
        }
        self.last_drawn_cell = None;
        self.zone_colors = [TRACK_COLOR; 2];
        self.dimmed = false;
    }

    pub fn layout(&self) -> &StripLayout {
        &self.layout
    }

    /// Aktueller Frame
    pub fn pixels(&self) -> &[RGB8] {
        &self.frame
    }

    /// Zuletzt gezeichnete Marker-Zelle (None vor dem ersten Frame)
    pub fn last_drawn_cell(&self) -> Option<usize> {
        self.last_drawn_cell
    }

    pub fn alarms(&self) -> (bool, bool) {
        (self.min_alarm, self.max_alarm)
    }

    pub fn is_dimmed(&self) -> bool {
        self.dimmed
    }

    pub fn set_limits(&mut self, min_limit: bool, max_limit: bool) {
        self.min_alarm = min_limit;
        self.max_alarm = max_limit;
    }

    /// Füllt den kompletten Frame mit einer Farbe (Alarme, Animationen)
    ///
    /// Überschreibt Marker und Backup-Zustand, danach ist `reset()` nötig.
    pub fn fill(&mut self, color: RGB8) {
        for pixel in self.frame.iter_mut() {
            *pixel = color;
        }
    }

    /// Ein Frame der Boot-Animation (Knight Rider)
    pub fn boot_frame(&mut self, step: usize) {
        self.fill(OFF);
        let head = knight_rider_head(step, self.layout.led_count);
        if let Some(pixel) = self.frame.get_mut(head) {
            *pixel = BOOT_COLOR;
        }
    }

    /// Rendert einen Frame für diese Achse
    pub fn render(&mut self, now: Ticks, axis: &AxisStatus, timing: &RenderTiming) {
        self.paint_limit_zones(now, timing);
        self.update_marker(axis.position);
        self.apply_idle_dim(now, axis.last_change_time, timing);
    }

    fn track_color(&self, timing: &RenderTiming) -> RGB8 {
        if self.dimmed {
            dim_color(TRACK_COLOR, timing.idle_dim_percent)
        } else {
            TRACK_COLOR
        }
    }

    fn marker_cells(&self) -> Range<usize> {
        match self.last_drawn_cell {
            Some(cell) => marker_range(cell, self.layout.marker_half_width, self.layout.led_count),
            None => 0..0,
        }
    }

    fn zone_range(&self, zone: Zone) -> Range<usize> {
        let count = self.layout.led_count;
        let width = self.layout.limit_zone_cells.min(count);
        match zone {
            Zone::Min => 0..width,
            Zone::Max => count - width..count,
        }
    }

    /// Setzt die Grundfarbe einer Zelle
    ///
    /// Liegt die Zelle unter dem Marker, wird nur das Backup geändert.
    fn set_base(&mut self, index: usize, color: RGB8) {
        if self.marker_cells().contains(&index) {
            self.backup[index] = color;
        } else {
            self.frame[index] = color;
        }
    }

    /// Endschalter-Zonen: Alarmfarbe und Grundfarbe im Blink-Takt
    ///
    /// Zellen werden nur neu gesetzt wenn sich die Zonenfarbe ändert.
    pub fn paint_limit_zones(&mut self, now: Ticks, timing: &RenderTiming) {
        let blink = blink_on(now, timing.blink_period_ms);
        let track = self.track_color(timing);

        for (zone, active) in [(Zone::Min, self.min_alarm), (Zone::Max, self.max_alarm)] {
            let desired = if active && blink { ALARM_COLOR } else { track };
            if self.zone_colors[zone as usize] == desired {
                continue;
            }
            for index in self.zone_range(zone) {
                self.set_base(index, desired);
            }
            self.zone_colors[zone as usize] = desired;
        }
    }

    /// Verschiebt den Positions-Marker
    ///
    /// Gleiche Zelle wie im letzten Frame: nichts passiert. Sonst wird der
    /// alte Bereich aus dem Backup wiederhergestellt, der neue Bereich
    /// gesichert und danach übermalt. Gibt `true` zurück wenn gezeichnet wurde.
    pub fn update_marker(&mut self, position: i32) -> bool {
        let cell = cell_for_position(position, self.layout.rail_length, self.layout.led_count);
        if self.last_drawn_cell == Some(cell) || self.layout.led_count == 0 {
            return false;
        }

        for index in self.marker_cells() {
            self.frame[index] = self.backup[index];
        }

        let range = marker_range(cell, self.layout.marker_half_width, self.layout.led_count);
        for index in range {
            self.backup[index] = self.frame[index];
            self.frame[index] = MARKER_COLOR;
        }

        self.last_drawn_cell = Some(cell);
        true
    }

    /// Idle-Dimmung der Grundfarbe
    ///
    /// Wird einmal pro Idle-Phase angewendet: nur Zellen in voller
    /// Grundfarbe werden gedimmt, bereits gedimmte nicht weiter. Bewegt
    /// sich die Achse wieder, wird die volle Helligkeit wiederhergestellt.
    pub fn apply_idle_dim(&mut self, now: Ticks, last_change: Ticks, timing: &RenderTiming) -> bool {
        let idle = elapsed(now, last_change) >= timing.idle_timeout_ms;
        let dimmed_track = dim_color(TRACK_COLOR, timing.idle_dim_percent);

        if idle && !self.dimmed {
            self.recolor(TRACK_COLOR, dimmed_track);
            self.dimmed = true;
            true
        } else if !idle && self.dimmed {
            self.recolor(dimmed_track, TRACK_COLOR);
            self.dimmed = false;
            true
        } else {
            false
        }
    }

    fn recolor(&mut self, from: RGB8, to: RGB8) {
        if from == to {
            return;
        }
        for pixel in self.frame.iter_mut().chain(self.backup.iter_mut()) {
            if *pixel == from {
                *pixel = to;
            }
        }
        for color in self.zone_colors.iter_mut() {
            if *color == from {
                *color = to;
            }
        }
    }
}

/// Renderer für alle drei Achsen
pub struct IndicatorRenderer {
    strips: [StripRenderer; AXIS_COUNT],
    timing: RenderTiming,
}

impl IndicatorRenderer {
    pub fn new(layouts: [StripLayout; AXIS_COUNT], timing: RenderTiming) -> Self {
        Self {
            strips: layouts.map(StripRenderer::new),
            timing,
        }
    }

    pub fn timing(&self) -> &RenderTiming {
        &self.timing
    }

    pub fn strip(&self, id: AxisId) -> &StripRenderer {
        &self.strips[id.index()]
    }

    /// Übernimmt ein Endschalter-Event
    pub fn apply_event(&mut self, event: StatusEvent) {
        self.strips[event.axis_id.index()].set_limits(event.min_limit, event.max_limit);
    }

    /// Liest alle anstehenden Events ohne zu blockieren
    ///
    /// Gibt die Anzahl der verarbeiteten Events zurück.
    pub fn drain_events<M: RawMutex>(&mut self, receiver: &StatusReceiver<'_, M>) -> usize {
        let mut count = 0;
        while let Ok(event) = receiver.try_receive() {
            self.apply_event(event);
            count += 1;
        }
        count
    }

    /// Rendert alle Strips für den Zeitpunkt `now`
    pub fn render(&mut self, now: Ticks, axes: &[AxisStatus; AXIS_COUNT]) {
        let timing = self.timing;
        for (strip, axis) in self.strips.iter_mut().zip(axes.iter()) {
            strip.render(now, axis, &timing);
        }
    }

    /// Kompletter Frame: Events übernehmen, dann rendern
    pub fn frame<M: RawMutex>(
        &mut self,
        now: Ticks,
        receiver: &StatusReceiver<'_, M>,
        axes: &[AxisStatus; AXIS_COUNT],
    ) -> usize {
        let events = self.drain_events(receiver);
        self.render(now, axes);
        events
    }

    pub fn boot_frame(&mut self, step: usize) {
        for strip in self.strips.iter_mut() {
            strip.boot_frame(step);
        }
    }

    pub fn fill_all(&mut self, color: RGB8) {
        for strip in self.strips.iter_mut() {
            strip.fill(color);
        }
    }

    pub fn reset(&mut self) {
        for strip in self.strips.iter_mut() {
            strip.reset();
        }
    }
}

/// Onboard Status-LED: zeigt eine Indication bis sie abgelaufen ist
///
/// Eine neue Indication ersetzt die laufende. Geschrieben wird nur wenn
/// sich die Farbe ändert.
pub struct StatusLed<L: SmartLedWriter> {
    writer: L,
    brightness: u8,
    active: Option<(Indication, Ticks)>,
    shown: Option<RGB8>,
}

impl<L: SmartLedWriter> StatusLed<L> {
    pub fn new(writer: L, brightness: u8) -> Self {
        Self {
            writer,
            brightness,
            active: None,
            shown: None,
        }
    }

    pub fn start(&mut self, indication: Indication, now: Ticks) {
        self.active = Some((indication, now));
    }

    pub fn active(&self) -> Option<Indication> {
        self.active.map(|(indication, _)| indication)
    }

    pub fn writer(&self) -> &L {
        &self.writer
    }

    /// Setzt die Farbe für `now`
    ///
    /// Dunkle Phasen einer Anzeige beenden sie nicht, erst wenn die
    /// Indication None liefert, geht die LED aus.
    pub fn update(&mut self, now: Ticks) -> Result<(), LedError> {
        let color = match self.active {
            Some((indication, since)) => match indication.color(elapsed(now, since)) {
                Some(color) => color,
                None => {
                    self.active = None;
                    OFF
                }
            },
            None => OFF,
        };

        if self.shown == Some(color) {
            return Ok(());
        }
        self.writer.write(&[color], self.brightness)?;
        self.shown = Some(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMING: RenderTiming = RenderTiming {
        blink_period_ms: 500,
        idle_timeout_ms: 10_000,
        idle_dim_percent: 30,
    };

    fn layout(led_count: usize) -> StripLayout {
        StripLayout {
            led_count,
            rail_length: 1000,
            limit_zone_cells: 3,
            marker_half_width: 1,
            brightness: 255,
        }
    }

    #[test]
    fn test_new_strip_is_track_colored() {
        let strip = StripRenderer::new(layout(20));
        assert_eq!(strip.pixels().len(), 20);
        assert!(strip.pixels().iter().all(|&p| p == TRACK_COLOR));
        assert_eq!(strip.last_drawn_cell(), None);
    }

    #[test]
    fn test_led_count_capped() {
        let strip = StripRenderer::new(layout(MAX_LEDS_PER_STRIP + 50));
        assert_eq!(strip.pixels().len(), MAX_LEDS_PER_STRIP);
    }

    #[test]
    fn test_first_marker_draw_has_no_restore() {
        let mut strip = StripRenderer::new(layout(20));
        assert!(strip.update_marker(500));
        assert_eq!(strip.last_drawn_cell(), Some(10));
        assert_eq!(&strip.pixels()[9..12], &[MARKER_COLOR; 3]);
        assert_eq!(strip.pixels()[8], TRACK_COLOR);
        assert_eq!(strip.pixels()[12], TRACK_COLOR);
    }

    #[test]
    fn test_alarm_under_marker_goes_to_backup() {
        let mut strip = StripRenderer::new(layout(20));
        strip.update_marker(0);
        strip.set_limits(true, false);
        strip.paint_limit_zones(0, &TIMING);

        // Marker bleibt sichtbar, Zelle 2 liegt außerhalb des Markers
        assert_eq!(strip.pixels()[0], MARKER_COLOR);
        assert_eq!(strip.pixels()[2], ALARM_COLOR);

        // Marker wandert weg: darunter kommt die Alarmfarbe zum Vorschein
        strip.update_marker(500);
        assert_eq!(&strip.pixels()[0..3], &[ALARM_COLOR; 3]);
    }

    #[test]
    fn test_blink_alternates_zone_color() {
        let mut strip = StripRenderer::new(layout(20));
        strip.set_limits(false, true);

        strip.paint_limit_zones(0, &TIMING);
        assert_eq!(&strip.pixels()[17..20], &[ALARM_COLOR; 3]);

        strip.paint_limit_zones(600, &TIMING);
        assert_eq!(&strip.pixels()[17..20], &[TRACK_COLOR; 3]);
        assert_eq!(strip.pixels()[16], TRACK_COLOR);
    }

    #[test]
    fn test_idle_dim_once_and_restore() {
        let mut strip = StripRenderer::new(layout(20));
        let dimmed = dim_color(TRACK_COLOR, TIMING.idle_dim_percent);

        assert!(!strip.apply_idle_dim(9_999, 0, &TIMING));
        assert!(strip.apply_idle_dim(10_000, 0, &TIMING));
        assert_eq!(strip.pixels()[5], dimmed);

        // Zweiter Idle-Frame dimmt nicht weiter
        assert!(!strip.apply_idle_dim(20_000, 0, &TIMING));
        assert_eq!(strip.pixels()[5], dimmed);

        // Bewegung: volle Helligkeit
        assert!(strip.apply_idle_dim(20_000, 19_000, &TIMING));
        assert_eq!(strip.pixels()[5], TRACK_COLOR);
    }
}
