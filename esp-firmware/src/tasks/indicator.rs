// Indicator Task - Achszustand auf den drei LED-Strips, Status-LED
use defmt::{error, info, warn};
use embassy_futures::join::join;
use embassy_time::{Duration, Instant, Ticker, Timer};
use esp_core::renderer::{ALARM_COLOR, OFF};
use esp_core::{AxisId, IndicatorRenderer, Settings, SmartLedWriter, StatusEvent, StatusLed, Worker};

use crate::config::{
    FATAL_BEEP_COUNT, FATAL_FLASH_DURATION_MS, FATAL_FLASH_PERIOD_MS, FATAL_RESET_DELAY_MS,
    STATUS_LED_BRIGHTNESS,
};
use crate::hal::{Buzzer, StatusLedWriter, StripWriter};
use crate::{Context, IndicationSignal, StatusReceiver, now_ticks};

/// Schreibt alle Strips, Fehler werden nur geloggt
fn push_strips<L: SmartLedWriter>(renderer: &IndicatorRenderer, strips: &mut [L]) {
    for (id, writer) in AxisId::ALL.into_iter().zip(strips.iter_mut()) {
        let strip = renderer.strip(id);
        if writer
            .write(strip.pixels(), strip.layout().brightness)
            .is_err()
        {
            error!("LED: Failed to write strip {}", id.name());
        }
    }
}

/// Indicator-Logik, unabhängig von der LED-Hardware
pub async fn indicator_logic<L: SmartLedWriter, S: SmartLedWriter>(
    ctx: Context,
    mut strips: [L; 3],
    status_led: S,
    receiver: StatusReceiver,
    indication: &'static IndicationSignal,
) {
    let leds = &ctx.settings.leds;
    let mut renderer = IndicatorRenderer::new(ctx.settings.strip_layouts(), ctx.settings.render_timing());
    let mut status_led = StatusLed::new(status_led, STATUS_LED_BRIGHTNESS);
    let mut ticker = Ticker::every(Duration::from_millis(leds.frame_interval_ms as u64));

    info!("LED: Boot animation");
    let boot_start = Instant::now();
    let mut step = 0;
    while boot_start.elapsed() < Duration::from_millis(leds.boot_animation_ms as u64) {
        renderer.boot_frame(step);
        push_strips(&renderer, &mut strips);
        step += 1;
        ctx.check_in(Worker::Indicator);
        ticker.next().await;
    }

    renderer.reset();
    // Events aus der Boot-Phase wären sonst verloren
    for axis in ctx.status.axes() {
        renderer.apply_event(StatusEvent {
            axis_id: axis.id,
            min_limit: axis.min_limit_active,
            max_limit: axis.max_limit_active,
        });
    }
    info!("LED: Rendering");

    loop {
        let now = now_ticks();
        if let Some(next) = indication.try_take() {
            status_led.start(next, now);
        }

        renderer.frame(now, &receiver, &ctx.status.axes());
        push_strips(&renderer, &mut strips);
        if status_led.update(now).is_err() {
            warn!("LED: Failed to write status LED");
        }

        ctx.check_in(Worker::Indicator);
        ticker.next().await;
    }
}

#[embassy_executor::task]
pub async fn indicator_task(
    ctx: Context,
    strips: [StripWriter; 3],
    status_led: StatusLedWriter,
    receiver: StatusReceiver,
    indication: &'static IndicationSignal,
) {
    indicator_logic(ctx, strips, status_led, receiver, indication).await;
}

/// Alarm bei fehlender SD-Karte, endet mit einem Neustart
///
/// Alle Strips blinken rot/schwarz, der Buzzer piept parallel. Danach
/// bleibt Rot stehen bis zum Reset.
pub async fn fatal_storage_alarm(
    settings: &Settings,
    mut strips: [StripWriter; 3],
    buzzer: &mut Buzzer,
) -> ! {
    error!("SD: Storage unavailable, restarting after alarm");
    let mut renderer = IndicatorRenderer::new(settings.strip_layouts(), settings.render_timing());

    let flash = async {
        let start = Instant::now();
        let mut on = true;
        while start.elapsed() < Duration::from_millis(FATAL_FLASH_DURATION_MS) {
            renderer.fill_all(if on { ALARM_COLOR } else { OFF });
            push_strips(&renderer, &mut strips);
            on = !on;
            Timer::after(Duration::from_millis(FATAL_FLASH_PERIOD_MS)).await;
        }
    };
    join(flash, buzzer.beep(FATAL_BEEP_COUNT)).await;

    renderer.fill_all(ALARM_COLOR);
    push_strips(&renderer, &mut strips);
    Timer::after(Duration::from_millis(FATAL_RESET_DELAY_MS)).await;

    esp_hal::system::software_reset()
}
