//! StatusChannel: Endschalter-Events vom MotorPoller zum IndicatorRenderer
//!
//! Begrenzter MPSC-Channel. Reihenfolge ist pro Achse FIFO, über Achsen
//! hinweg gibt es keine Garantie.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};

use crate::types::StatusEvent;

/// Kapazität des StatusChannels (Anzahl Events)
pub const STATUS_CHANNEL_CAPACITY: usize = 10;

/// Channel für Endschalter-Events (Poller → Renderer)
pub type StatusChannel<M> = Channel<M, StatusEvent, STATUS_CHANNEL_CAPACITY>;

/// Sender-Seite (MotorPoller)
pub type StatusSender<'a, M> = Sender<'a, M, StatusEvent, STATUS_CHANNEL_CAPACITY>;

/// Receiver-Seite (IndicatorRenderer)
pub type StatusReceiver<'a, M> = Receiver<'a, M, StatusEvent, STATUS_CHANNEL_CAPACITY>;

/// Sendet ein Event ohne zu blockieren
///
/// Bei vollem Channel wird das Event verworfen und zurückgegeben,
/// damit der Aufrufer es loggen kann. Die Poll-Schleife blockiert nie.
pub fn publish_status<M: RawMutex>(
    sender: &StatusSender<'_, M>,
    event: StatusEvent,
) -> Result<(), StatusEvent> {
    sender.try_send(event).map_err(|TrySendError::Full(dropped)| dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisId;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn event(axis_id: AxisId, min_limit: bool) -> StatusEvent {
        StatusEvent {
            axis_id,
            min_limit,
            max_limit: false,
        }
    }

    #[test]
    fn test_publish_until_full_then_drop() {
        let channel: StatusChannel<NoopRawMutex> = Channel::new();
        let sender = channel.sender();

        for i in 0..STATUS_CHANNEL_CAPACITY {
            assert!(publish_status(&sender, event(AxisId::Y, i % 2 == 0)).is_ok());
        }

        let overflow = event(AxisId::X, true);
        assert_eq!(publish_status(&sender, overflow), Err(overflow));
        assert_eq!(channel.len(), STATUS_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_per_axis_fifo() {
        let channel: StatusChannel<NoopRawMutex> = Channel::new();
        let sender = channel.sender();
        let receiver = channel.receiver();

        publish_status(&sender, event(AxisId::Y, true)).unwrap();
        publish_status(&sender, event(AxisId::X, true)).unwrap();
        publish_status(&sender, event(AxisId::Y, false)).unwrap();

        let received: heapless::Vec<StatusEvent, 4> =
            core::iter::from_fn(|| receiver.try_receive().ok()).collect();
        let y_events: heapless::Vec<bool, 4> = received
            .iter()
            .filter(|e| e.axis_id == AxisId::Y)
            .map(|e| e.min_limit)
            .collect();
        assert_eq!(y_events.as_slice(), &[true, false]);
    }
}
