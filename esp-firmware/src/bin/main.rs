// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi benötigt dynamischen Speicher)
extern crate alloc;

// Embassy Async Runtime
use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, StackResources};
use embassy_time::{Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use static_cell::StaticCell;

// ESP32-S3 HAL
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rmt::{PulseCode, Rmt};
use esp_hal::rng::Rng;
use esp_hal::spi::Mode as SpiMode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal_smartled::smart_led_buffer;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

// Projekt-Module und Konfiguration
use esp_cnc_steuerung::config::{
    ALERT_WORKER_DEADLINE_MS, CONFIG_BUFFER_SIZE, ETH_MAC_ADDRESS, ETH_SPI_FREQUENCY_MHZ,
    EXTRA_HEAP_SIZE, NET_SOCKETS, RMT_CLOCK_MHZ, SD_INIT_FREQUENCY_KHZ, WIFI_HEAP_SIZE,
    apply_build_defaults, default_settings,
};
use esp_cnc_steuerung::hal::{
    Buzzer, RmtLedWriter, Rs485Bus, STATUS_BUFFER_SIZE, STRIP_BUFFER_SIZE, SdStorage,
};
use esp_cnc_steuerung::tasks::{
    EthRunner, alerts_task, connectivity_task, eth_net_task, eth_runner_task, fatal_storage_alarm,
    indicator_task, link_monitor_task, motor_poll_task, storage_monitor_task, supervisor_task,
    time_sync_task, wifi_controller_task, wifi_net_task,
};
use esp_cnc_steuerung::{
    AlertChannel, AlertQueue, Context, FirmwareLog, IndicationSignal, LivenessMonitor,
    NetEventChannel, Settings, SharedStatus, StatusChannel, TimeSyncSignal, WifiCommandChannel,
    Worker, now_ticks,
};
use esp_core::renderer::MAX_LEDS_PER_STRIP;
use esp_core::validate_feed_period;

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

// Geteilter Zustand, von allen Tasks per &'static genutzt
static STATUS: SharedStatus = SharedStatus::new();
static LIVENESS: LivenessMonitor = LivenessMonitor::new();

/// Woher die Einstellungen stammen (wird nach dem Anlegen des Logs geloggt)
enum SettingsSource {
    File,
    Missing,
    Invalid,
}

/// Main Entry Point
///
/// Initialisiert Hardware, SD-Karte, Netzwerk und spawnt alle Tasks.
/// Danach schläft main() - alle Arbeit läuft in Tasks.
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // ESP32-S3 Konfiguration: CPU auf maximale Taktfrequenz (240 MHz)
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap Allocator initialisieren (WiFi braucht dynamischen Speicher!)
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    // Embassy Runtime initialisieren (Timer + Software Interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    info!("System: fireCNC booting");

    // ------------------------------------------------------------------
    // LEDs: drei Strips + Status-LED, je ein RMT-Kanal
    // ------------------------------------------------------------------
    let rmt = Rmt::new(peripherals.RMT, Rate::from_mhz(RMT_CLOCK_MHZ))
        .expect("Failed to initialize RMT");

    static STRIP_Y_BUFFER: StaticCell<[PulseCode; STRIP_BUFFER_SIZE]> = StaticCell::new();
    static STRIP_YY_BUFFER: StaticCell<[PulseCode; STRIP_BUFFER_SIZE]> = StaticCell::new();
    static STRIP_X_BUFFER: StaticCell<[PulseCode; STRIP_BUFFER_SIZE]> = StaticCell::new();
    static STATUS_LED_BUFFER: StaticCell<[PulseCode; STATUS_BUFFER_SIZE]> = StaticCell::new();

    let strips = [
        RmtLedWriter::new(
            rmt.channel0,
            peripherals.GPIO1,
            STRIP_Y_BUFFER.init(smart_led_buffer!(MAX_LEDS_PER_STRIP)),
        ),
        RmtLedWriter::new(
            rmt.channel1,
            peripherals.GPIO2,
            STRIP_YY_BUFFER.init(smart_led_buffer!(MAX_LEDS_PER_STRIP)),
        ),
        RmtLedWriter::new(
            rmt.channel2,
            peripherals.GPIO3,
            STRIP_X_BUFFER.init(smart_led_buffer!(MAX_LEDS_PER_STRIP)),
        ),
    ];
    let status_led = RmtLedWriter::new(
        rmt.channel3,
        peripherals.GPIO38,
        STATUS_LED_BUFFER.init(smart_led_buffer!(1)),
    );

    let mut buzzer = Buzzer::new(Output::new(
        peripherals.GPIO46,
        Level::Low,
        OutputConfig::default(),
    ));

    // ------------------------------------------------------------------
    // SD-Karte: ohne Log-Speicher kein Betrieb
    // ------------------------------------------------------------------
    let sd_spi = Spi::new(
        peripherals.SPI3,
        SpiConfig::default()
            .with_frequency(Rate::from_khz(SD_INIT_FREQUENCY_KHZ))
            .with_mode(SpiMode::_0),
    )
    .expect("Failed to initialize SD SPI")
    .with_sck(peripherals.GPIO48)
    .with_mosi(peripherals.GPIO47)
    .with_miso(peripherals.GPIO45);
    let sd_cs = Output::new(peripherals.GPIO40, Level::High, OutputConfig::default());

    let mut sd = match SdStorage::new(sd_spi, sd_cs, STATUS.clock()) {
        Ok(sd) => sd,
        Err(e) => {
            error!("SD: Initialization failed: {}", e);
            fatal_storage_alarm(&default_settings(), strips, &mut buzzer).await
        }
    };

    // Einstellungen aus FIRECNC.CFG, sonst Defaults
    let (settings, source) = {
        let mut buffer = [0u8; CONFIG_BUFFER_SIZE];
        match sd.read_config(&mut buffer) {
            Ok(len) => match Settings::from_json(&buffer[..len]) {
                Ok(mut settings) => {
                    apply_build_defaults(&mut settings);
                    (settings, SettingsSource::File)
                }
                Err(e) => {
                    warn!("Config: Invalid settings file: {}", e);
                    (default_settings(), SettingsSource::Invalid)
                }
            },
            Err(_) => (default_settings(), SettingsSource::Missing),
        }
    };
    static SETTINGS: StaticCell<Settings> = StaticCell::new();
    let settings: &'static Settings = SETTINGS.init(settings);

    // ------------------------------------------------------------------
    // Log, Alerts, Channels
    // ------------------------------------------------------------------
    static ALERT_CHANNEL: StaticCell<AlertChannel> = StaticCell::new();
    let alert_channel: &'static AlertChannel = ALERT_CHANNEL.init(AlertChannel::new());
    let alerts = AlertQueue::new(alert_channel);

    static LOG: StaticCell<FirmwareLog> = StaticCell::new();
    let log: &'static FirmwareLog = LOG.init(FirmwareLog::new(sd, alerts));

    let ctx = Context {
        settings,
        status: &STATUS,
        log,
        liveness: &LIVENESS,
        alerts,
    };

    ctx.log("System: boot");
    match source {
        SettingsSource::File => ctx.log("Config: loaded FIRECNC.CFG"),
        SettingsSource::Missing => ctx.log("Config: FIRECNC.CFG missing, using defaults"),
        SettingsSource::Invalid => ctx.log("Config: FIRECNC.CFG invalid, using defaults"),
    }

    static STATUS_CHANNEL: StaticCell<StatusChannel> = StaticCell::new();
    let status_channel: &'static StatusChannel = STATUS_CHANNEL.init(StatusChannel::new());

    static NET_EVENTS: StaticCell<NetEventChannel> = StaticCell::new();
    let net_events: &'static NetEventChannel = NET_EVENTS.init(NetEventChannel::new());

    static WIFI_COMMANDS: StaticCell<WifiCommandChannel> = StaticCell::new();
    let wifi_commands: &'static WifiCommandChannel = WIFI_COMMANDS.init(WifiCommandChannel::new());

    static TIME_SYNC: StaticCell<TimeSyncSignal> = StaticCell::new();
    let time_sync: &'static TimeSyncSignal = TIME_SYNC.init(TimeSyncSignal::new());

    static INDICATION: StaticCell<IndicationSignal> = StaticCell::new();
    let indication: &'static IndicationSignal = INDICATION.init(IndicationSignal::new());

    // ------------------------------------------------------------------
    // Supervisor: Deadlines pro Worker
    // ------------------------------------------------------------------
    let watchdog = &settings.watchdog;
    let deadlines = [
        (Worker::Connectivity, watchdog.worker_deadline_ms),
        (Worker::MotorPoller, watchdog.worker_deadline_ms),
        (Worker::Indicator, watchdog.worker_deadline_ms),
        (Worker::StorageMonitor, settings.storage_deadline_ms()),
        (Worker::Alerts, ALERT_WORKER_DEADLINE_MS),
        (Worker::WifiController, settings.wifi_deadline_ms()),
    ];
    let now = now_ticks();
    for (worker, deadline_ms) in deadlines {
        LIVENESS.register(worker, deadline_ms, now);
    }
    if !validate_feed_period(
        watchdog.supervisor_feed_ms,
        &deadlines.map(|(_, deadline_ms)| deadline_ms),
        watchdog.timeout_secs.saturating_mul(1000),
    ) {
        error!("Supervisor: Feed period not shorter than every deadline");
        ctx.log("Supervisor: feed period misconfigured");
    }

    // ------------------------------------------------------------------
    // RS485 Servo-Bus
    // ------------------------------------------------------------------
    let uart = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(settings.servos.baud_rate),
    )
    .expect("Failed to initialize RS485 UART")
    .with_tx(peripherals.GPIO17)
    .with_rx(peripherals.GPIO18)
    .into_async();
    let driver_enable = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());
    let servo_bus = Rs485Bus::new(uart, driver_enable, settings.servos.read_timeout_ms);

    // ------------------------------------------------------------------
    // Netzwerk: W5500 (Ethernet) und WiFi, je ein embassy-net Stack
    // ------------------------------------------------------------------
    // Random seed für TCP/IP Stack (von Hardware RNG)
    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let eth_spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(ETH_SPI_FREQUENCY_MHZ))
            .with_mode(SpiMode::_0),
    )
    .expect("Failed to initialize Ethernet SPI")
    .with_sck(peripherals.GPIO15)
    .with_miso(peripherals.GPIO14)
    .with_mosi(peripherals.GPIO13)
    .into_async();
    let eth_cs = Output::new(peripherals.GPIO16, Level::High, OutputConfig::default());
    let eth_int = Input::new(
        peripherals.GPIO12,
        InputConfig::default().with_pull(Pull::Up),
    );
    let eth_reset = Output::new(peripherals.GPIO39, Level::High, OutputConfig::default());
    let eth_spi = ExclusiveDevice::new(eth_spi_bus, eth_cs, embassy_time::Delay)
        .expect("Failed to create Ethernet SPI device");

    static ETH_STATE: StaticCell<embassy_net_wiznet::State<8, 8>> = StaticCell::new();
    let (eth_device, eth_runner): (_, EthRunner) = embassy_net_wiznet::new(
        ETH_MAC_ADDRESS,
        ETH_STATE.init(embassy_net_wiznet::State::new()),
        eth_spi,
        eth_int,
        eth_reset,
    )
    .await
    .expect("Failed to initialize W5500");

    static ETH_RESOURCES: StaticCell<StackResources<NET_SOCKETS>> = StaticCell::new();
    let (eth_stack, eth_net_runner) = embassy_net::new(
        eth_device,
        NetConfig::dhcpv4(Default::default()),
        ETH_RESOURCES.init(StackResources::new()),
        seed,
    );

    // WiFi Hardware initialisieren
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, wifi_interface) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    // IPv4 wird vom Connectivity-Task je nach Methode gesetzt (DHCP / statisch)
    static WIFI_RESOURCES: StaticCell<StackResources<NET_SOCKETS>> = StaticCell::new();
    let (wifi_stack, wifi_net_runner) = embassy_net::new(
        wifi_interface.sta,
        NetConfig::default(),
        WIFI_RESOURCES.init(StackResources::new()),
        seed.rotate_left(32),
    );

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------
    spawner.spawn(supervisor_task(ctx, TimerGroup::new(peripherals.TIMG1).wdt)).unwrap();

    spawner
        .spawn(indicator_task(
            ctx,
            strips,
            status_led,
            status_channel.receiver(),
            indication,
        ))
        .unwrap();
    spawner
        .spawn(motor_poll_task(ctx, servo_bus, status_channel.sender()))
        .unwrap();

    spawner.spawn(eth_runner_task(eth_runner)).unwrap();
    spawner.spawn(eth_net_task(eth_net_runner)).unwrap();
    spawner.spawn(wifi_net_task(wifi_net_runner)).unwrap();
    spawner
        .spawn(wifi_controller_task(ctx, wifi_controller, wifi_commands.receiver()))
        .unwrap();
    spawner
        .spawn(link_monitor_task(eth_stack, wifi_stack, net_events.sender()))
        .unwrap();
    spawner
        .spawn(connectivity_task(
            ctx,
            eth_stack,
            wifi_stack,
            wifi_commands.sender(),
            net_events.receiver(),
            time_sync,
            indication,
        ))
        .unwrap();
    spawner
        .spawn(time_sync_task(ctx, eth_stack, wifi_stack, time_sync))
        .unwrap();

    spawner
        .spawn(alerts_task(ctx, eth_stack, wifi_stack, alert_channel.receiver()))
        .unwrap();
    spawner.spawn(storage_monitor_task(ctx, indication)).unwrap();

    info!("System: All tasks started");

    // Main-Loop: schläft (alle Arbeit läuft in Tasks)
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
