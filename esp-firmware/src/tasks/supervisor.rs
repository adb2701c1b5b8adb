// Supervisor Task - füttert den Hardware-Watchdog solange alle Worker leben
use defmt::{error, info};
use embassy_time::{Duration, Ticker};
use esp_core::Worker;
use esp_hal::peripherals::TIMG1;
use esp_hal::timer::timg::{MwdtStage, Wdt};

use crate::{Context, now_ticks};

/// Supervisor Task
///
/// Ist ein Worker überfällig, wird nicht mehr gefüttert. Der Watchdog setzt
/// den Chip dann nach `watchdog.timeout_secs` zurück.
#[embassy_executor::task]
pub async fn supervisor_task(ctx: Context, mut wdt: Wdt<TIMG1<'static>>) {
    let watchdog = &ctx.settings.watchdog;
    wdt.set_timeout(
        MwdtStage::Stage0,
        esp_hal::time::Duration::from_secs(watchdog.timeout_secs as u64),
    );
    wdt.enable();
    wdt.feed();
    info!(
        "Supervisor: Watchdog armed ({}s), feeding every {}ms",
        watchdog.timeout_secs, watchdog.supervisor_feed_ms
    );

    let mut ticker = Ticker::every(Duration::from_millis(watchdog.supervisor_feed_ms as u64));
    let mut stalled: Option<Worker> = None;

    loop {
        ticker.next().await;

        match ctx.liveness.overdue(now_ticks()) {
            None => wdt.feed(),
            Some(worker) => {
                if stalled.is_none() {
                    error!("Supervisor: Worker '{}' missed its deadline", worker.name());
                    ctx.log_fmt(format_args!(
                        "Supervisor: {} stalled, waiting for watchdog reset",
                        worker.name()
                    ));
                }
                stalled = Some(worker);
            }
        }
    }
}
