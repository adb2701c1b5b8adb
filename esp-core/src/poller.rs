//! MotorPoller: Endschalter und Position der drei Servo-Achsen abfragen
//!
//! Register-Layout der LC10e Servos (Modbus Holding Register):
//! - 10: Status-Wort, Bit 0 = Min-Endschalter, Bit 1 = Max-Endschalter
//! - 20/21: Absolute Position (32 Bit, High-Word zuerst)

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::channel::{StatusSender, publish_status};
use crate::traits::{AxisBus, BusError};
use crate::types::{AXIS_COUNT, AxisId, AxisStatus, StatusEvent, Ticks};

/// Holding-Register mit den Endschalter-Bits
pub const LIMIT_STATUS_REGISTER: u16 = 10;

/// Erstes Holding-Register der 32-Bit Position
pub const POSITION_REGISTER: u16 = 20;

pub const MIN_LIMIT_BIT: u16 = 0x01;
pub const MAX_LIMIT_BIT: u16 = 0x02;
const LIMIT_MASK: u16 = MIN_LIMIT_BIT | MAX_LIMIT_BIT;

/// Zerlegt das Status-Wort in (min_limit, max_limit)
pub fn decode_limit_bits(word: u16) -> (bool, bool) {
    (word & MIN_LIMIT_BIT != 0, word & MAX_LIMIT_BIT != 0)
}

/// Setzt die 32-Bit Position aus zwei Registern zusammen (High-Word zuerst)
pub fn decode_position(high: u16, low: u16) -> i32 {
    (((high as u32) << 16) | low as u32) as i32
}

/// Ergebnis eines Poll-Zyklus über alle Achsen
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollReport {
    /// Events die im Channel gelandet sind
    pub events_sent: u8,
    /// Events die wegen vollem Channel verworfen wurden
    pub events_dropped: u8,
    /// Fehlgeschlagene Register-Reads (Limit + Position getrennt gezählt)
    pub read_failures: u8,
    /// Achsen deren Position sich geändert hat
    pub axes_moved: u8,
}

/// Zustand einer Achse inkl. letztem Endschalter-Sample
#[derive(Debug, Clone, Copy)]
struct AxisTracker {
    slave_id: u8,
    status: AxisStatus,
    limit_bits: u16,
}

/// Fragt alle Achsen ab und erkennt Flanken
///
/// Besitzt die `AxisStatus`-Werte exklusiv. Endschalter-Änderungen gehen
/// als `StatusEvent` in den Channel, Positionen werden nur gespeichert
/// und vom Firmware-Task in `SharedStatus` veröffentlicht.
pub struct MotorPoller {
    axes: [AxisTracker; AXIS_COUNT],
}

impl MotorPoller {
    /// Erstellt einen Poller für die Slave-IDs (Reihenfolge Y, YY, X)
    ///
    /// Alle Achsen starten ohne aktive Endschalter bei Position 0,
    /// die Idle-Zeit läuft ab `now`.
    pub fn new(slave_ids: [u8; AXIS_COUNT], now: Ticks) -> Self {
        let axes = AxisId::ALL.map(|id| AxisTracker {
            slave_id: slave_ids[id.index()],
            status: AxisStatus::new(id, now),
            limit_bits: 0,
        });
        Self { axes }
    }

    /// Aktueller Zustand einer Achse (Kopie)
    pub fn axis(&self, id: AxisId) -> AxisStatus {
        self.axes[id.index()].status
    }

    /// Alle Achsen (Kopie)
    pub fn axes(&self) -> [AxisStatus; AXIS_COUNT] {
        self.axes.map(|tracker| tracker.status)
    }

    /// Verarbeitet ein Endschalter-Sample
    ///
    /// Gibt nur dann ein Event zurück, wenn sich die Bits gegenüber dem
    /// vorherigen Sample dieser Achse geändert haben.
    pub fn sample_limits(&mut self, id: AxisId, word: u16) -> Option<StatusEvent> {
        let tracker = &mut self.axes[id.index()];
        let bits = word & LIMIT_MASK;
        if bits == tracker.limit_bits {
            return None;
        }

        tracker.limit_bits = bits;
        let (min_limit, max_limit) = decode_limit_bits(bits);
        tracker.status.min_limit_active = min_limit;
        tracker.status.max_limit_active = max_limit;

        Some(StatusEvent {
            axis_id: id,
            min_limit,
            max_limit,
        })
    }

    /// Verarbeitet ein Positions-Sample
    ///
    /// Bei Änderung wird die Idle-Zeit zurückgesetzt. Gibt `true` zurück
    /// wenn sich die Achse bewegt hat.
    pub fn sample_position(&mut self, id: AxisId, position: i32, now: Ticks) -> bool {
        let status = &mut self.axes[id.index()].status;
        if status.position == position {
            return false;
        }
        status.position = position;
        status.last_change_time = now;
        true
    }

    /// Ein kompletter Poll-Zyklus über alle Achsen
    ///
    /// Ein fehlgeschlagener Read gilt als "keine Änderung": der alte Wert
    /// bleibt erhalten und die übrigen Achsen werden trotzdem abgefragt.
    pub async fn poll_cycle<B: AxisBus, M: RawMutex>(
        &mut self,
        bus: &mut B,
        now: Ticks,
        sender: &StatusSender<'_, M>,
    ) -> PollReport {
        let mut report = PollReport::default();

        for id in AxisId::ALL {
            let slave_id = self.axes[id.index()].slave_id;

            match read_limit_word(bus, slave_id).await {
                Ok(word) => {
                    if let Some(event) = self.sample_limits(id, word) {
                        match publish_status(sender, event) {
                            Ok(()) => report.events_sent += 1,
                            Err(_) => report.events_dropped += 1,
                        }
                    }
                }
                Err(_) => report.read_failures += 1,
            }

            match read_position(bus, slave_id).await {
                Ok(position) => {
                    if self.sample_position(id, position, now) {
                        report.axes_moved += 1;
                    }
                }
                Err(_) => report.read_failures += 1,
            }
        }

        report
    }
}

async fn read_limit_word<B: AxisBus>(bus: &mut B, slave_id: u8) -> Result<u16, BusError> {
    let mut regs = [0u16; 1];
    bus.read_holding_registers(slave_id, LIMIT_STATUS_REGISTER, &mut regs)
        .await?;
    Ok(regs[0])
}

async fn read_position<B: AxisBus>(bus: &mut B, slave_id: u8) -> Result<i32, BusError> {
    let mut regs = [0u16; 2];
    bus.read_holding_registers(slave_id, POSITION_REGISTER, &mut regs)
        .await?;
    Ok(decode_position(regs[0], regs[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_limit_bits() {
        assert_eq!(decode_limit_bits(0x00), (false, false));
        assert_eq!(decode_limit_bits(0x01), (true, false));
        assert_eq!(decode_limit_bits(0x02), (false, true));
        assert_eq!(decode_limit_bits(0xFF), (true, true));
    }

    #[test]
    fn test_decode_position_negative() {
        assert_eq!(decode_position(0x0001, 0x0000), 65_536);
        assert_eq!(decode_position(0xFFFF, 0xFFFF), -1);
    }

    #[test]
    fn test_sample_limits_only_on_change() {
        let mut poller = MotorPoller::new([1, 2, 3], 0);

        assert_eq!(poller.sample_limits(AxisId::Y, 0), None);
        let event = poller.sample_limits(AxisId::Y, MIN_LIMIT_BIT);
        assert_eq!(
            event,
            Some(StatusEvent {
                axis_id: AxisId::Y,
                min_limit: true,
                max_limit: false
            })
        );
        assert_eq!(poller.sample_limits(AxisId::Y, MIN_LIMIT_BIT), None);
        assert!(poller.axis(AxisId::Y).min_limit_active);
    }

    #[test]
    fn test_sample_limits_ignores_unrelated_bits() {
        let mut poller = MotorPoller::new([1, 2, 3], 0);
        assert_eq!(poller.sample_limits(AxisId::X, 0x0100), None);
    }

    #[test]
    fn test_sample_position_resets_idle_timer() {
        let mut poller = MotorPoller::new([1, 2, 3], 0);

        assert!(!poller.sample_position(AxisId::X, 0, 100));
        assert_eq!(poller.axis(AxisId::X).last_change_time, 0);

        assert!(poller.sample_position(AxisId::X, 42, 200));
        let status = poller.axis(AxisId::X);
        assert_eq!(status.position, 42);
        assert_eq!(status.last_change_time, 200);
    }
}
