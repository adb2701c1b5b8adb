// Motor Poll Task - fragt die Servos zyklisch über RS485 ab
use defmt::{debug, warn};
use embassy_time::{Duration, Ticker};
use esp_core::{AxisBus, MotorPoller, Worker};

use crate::hal::Rs485Bus;
use crate::{Context, StatusSender, now_ticks};

/// Poll-Logik, unabhängig vom konkreten Bus
///
/// Pro Zyklus werden Endschalter-Flanken als Events versendet und alle
/// Achsen in `SharedStatus` veröffentlicht.
pub async fn motor_poll_logic<B: AxisBus>(ctx: Context, mut bus: B, sender: StatusSender) {
    let mut poller = MotorPoller::new(ctx.settings.slave_ids(), now_ticks());
    for axis in poller.axes() {
        ctx.status.publish_axis(&axis);
    }

    let interval = Duration::from_millis(ctx.settings.servos.poll_interval_ms as u64);
    let mut ticker = Ticker::every(interval);
    let mut failing = false;

    loop {
        let report = poller.poll_cycle(&mut bus, now_ticks(), &sender).await;

        for axis in poller.axes() {
            ctx.status.publish_axis(&axis);
        }

        if report.events_dropped > 0 {
            warn!("Servo: Status channel full, {} events dropped", report.events_dropped);
            ctx.log("Servo: status events dropped");
        }

        // Nur Zustandswechsel ins Log, nicht jeden fehlgeschlagenen Zyklus
        let all_failed = report.read_failures as usize == 2 * esp_core::AXIS_COUNT;
        if all_failed != failing {
            failing = all_failed;
            if failing {
                warn!("Servo: No response from any axis");
                ctx.log("Servo: bus not responding");
            } else {
                ctx.log("Servo: bus responding again");
            }
        } else if report.read_failures > 0 {
            debug!("Servo: {} reads failed", report.read_failures);
        }

        ctx.check_in(Worker::MotorPoller);
        ticker.next().await;
    }
}

#[embassy_executor::task]
pub async fn motor_poll_task(ctx: Context, bus: Rs485Bus, sender: StatusSender) {
    motor_poll_logic(ctx, bus, sender).await;
}
