// Storage Monitor Task - prüft periodisch die Belegung der SD-Karte
use defmt::{info, warn};
use embassy_time::{Duration, Ticker};
use esp_core::{Indication, LogError, LogStorage, StorageUsage, Worker};

use crate::{Context, IndicationSignal};

pub const USAGE_HIGH_ALERT: &str = "SD Card Usage High";
pub const MONITOR_FAILED_ALERT: &str = "SD Card Monitor Failed";

const MIB: u64 = 1024 * 1024;

/// Belegung lesen, Fehler werden hier gemeldet
fn read_usage(ctx: &Context) -> Option<StorageUsage> {
    match ctx.log.with_storage(|sd| sd.usage()) {
        Ok(Ok(usage)) => Some(usage),
        Ok(Err(e)) => {
            warn!("SD: Usage check failed: {}", e);
            ctx.log("SD: usage check failed");
            ctx.alert(MONITOR_FAILED_ALERT);
            None
        }
        Err(LogError::Busy) => {
            warn!("SD: Log busy, usage check skipped");
            None
        }
    }
}

/// Storage Monitor Task
///
/// Liest die Belegung unter dem Log-Mutex. Oberhalb der Schwelle gibt es
/// einen Log-Eintrag, einen Alert und 20 s rotes Blinken der Status-LED.
/// Ein Lesefehler meldet "SD Card Monitor Failed".
#[embassy_executor::task]
pub async fn storage_monitor_task(ctx: Context, indication: &'static IndicationSignal) {
    let storage = &ctx.settings.storage;

    if let Some(usage) = read_usage(&ctx) {
        ctx.log_fmt(format_args!(
            "SD: total {} MB, used {} MB ({}%)",
            usage.total_bytes / MIB,
            usage.used_bytes / MIB,
            usage.usage_percent()
        ));
    }

    let mut ticker = Ticker::every(Duration::from_secs(storage.monitor_interval_secs as u64));
    loop {
        ticker.next().await;

        if let Some(usage) = read_usage(&ctx) {
            let percent = usage.usage_percent();
            info!(
                "SD: {} of {} bytes used ({}%)",
                usage.used_bytes, usage.total_bytes, percent
            );
            if percent > storage.usage_threshold_percent {
                warn!("SD: Usage {}% above threshold", percent);
                ctx.log_fmt(format_args!(
                    "SD: usage over {}% ({}%)",
                    storage.usage_threshold_percent, percent
                ));
                ctx.alert(USAGE_HIGH_ALERT);
                indication.signal(Indication::StorageHigh);
            }
        }

        ctx.check_in(Worker::StorageMonitor);
    }
}
