// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen
// Board: Waveshare ESP32-S3-POE-ETH
//
// Laufzeit-Einstellungen (LED-Anzahl, Timeouts, Slave-IDs, ...) liegen in
// esp_core::config::Settings und werden beim Boot aus FIRECNC.CFG gelesen.
// Hier stehen nur Werte, die zur Compile-Zeit feststehen müssen.
#![allow(dead_code)]

use esp_core::config::{Settings, text};

// ============================================================================
// Pin-Zuordnung (nur zur Dokumentation, die Peripherals werden in main.rs
// direkt über peripherals.GPIOxx übergeben)
// ============================================================================

/// Datenleitungen der drei LED-Strips (Y, YY, X)
pub const LED_STRIP_PINS: [u8; 3] = [1, 2, 3];

/// Onboard WS2812 Status-LED
pub const STATUS_LED_PIN: u8 = 38;

/// Onboard Buzzer
pub const BUZZER_PIN: u8 = 46;

/// W5500 an SPI2: SCK, MISO, MOSI, CS, INT, RST
pub const ETH_SPI_PINS: [u8; 6] = [15, 14, 13, 16, 12, 39];

/// RS485 an UART2: TX, RX, RTS (Richtungsumschaltung)
pub const RS485_PINS: [u8; 3] = [17, 18, 21];

/// SD-Karte (SPI-Modus): SCK, MOSI (CMD), MISO (D0), CS (D3)
pub const SD_SPI_PINS: [u8; 4] = [48, 47, 45, 40];

// ============================================================================
// LED Konfiguration
// ============================================================================

/// RMT Taktfrequenz in MHz
/// 80 MHz ist optimal für WS2812 LED-Timing
pub const RMT_CLOCK_MHZ: u32 = 80;

/// Helligkeit der Status-LED (0-255)
pub const STATUS_LED_BRIGHTNESS: u8 = 40;

/// Blink-Periode des Alarms bei fehlender SD-Karte
pub const FATAL_FLASH_PERIOD_MS: u64 = 250;

/// Dauer des Alarm-Blinkens vor dem Dauerrot
pub const FATAL_FLASH_DURATION_MS: u64 = 10_000;

/// Wartezeit auf Dauerrot bevor der Chip neu startet
pub const FATAL_RESET_DELAY_MS: u64 = 5_000;

/// Anzahl Pieptöne beim Alarm
pub const FATAL_BEEP_COUNT: u8 = 3;

/// Buzzer: 1 kHz Ton für 100 ms, dann 100 ms Pause
pub const BEEP_FREQUENCY_HZ: u32 = 1_000;
pub const BEEP_ON_MS: u64 = 100;
pub const BEEP_OFF_MS: u64 = 100;

// ============================================================================
// RS485 / Servo-Bus
// ============================================================================

/// Maximale Länge einer Modbus RTU Antwort in Bytes
pub const MODBUS_FRAME_SIZE: usize = 64;

/// Maximale Anzahl Register pro Read
pub const MODBUS_MAX_REGISTERS: usize = 8;

// ============================================================================
// SD-Karte
// ============================================================================

/// Log-Datei im Root-Verzeichnis (8.3 Dateiname)
pub const LOG_FILE_NAME: &str = "SYSTEM.LOG";

/// Einstellungsdatei im Root-Verzeichnis (8.3 Dateiname)
pub const CONFIG_FILE_NAME: &str = "FIRECNC.CFG";

/// Maximale Größe der Einstellungsdatei
pub const CONFIG_BUFFER_SIZE: usize = 2048;

/// SPI-Takt der SD-Karte während der Initialisierung
pub const SD_INIT_FREQUENCY_KHZ: u32 = 400;

/// SPI-Takt der SD-Karte im Betrieb
pub const SD_FREQUENCY_MHZ: u32 = 16;

// ============================================================================
// Netzwerk Konfiguration
// ============================================================================

/// WiFi SSID (Netzwerk-Name)
/// Wird zur Build-Zeit aus der Environment Variable WIFI_SSID geladen
/// Setze diese in .env file (siehe .env.example)
pub const WIFI_SSID: &str = env!(
    "WIFI_SSID",
    "WiFi SSID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// WiFi Passwort
/// Wird zur Build-Zeit aus der Environment Variable WIFI_PASSWORD geladen
/// Setze diese in .env file (siehe .env.example)
pub const WIFI_PASSWORD: &str = env!(
    "WIFI_PASSWORD",
    "WiFi Password nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Statische Fallback-Adresse (optional, leer = keine)
pub const STATIC_IP: &str = match option_env!("STATIC_IP") {
    Some(ip) => ip,
    None => "",
};

pub const GATEWAY: &str = match option_env!("GATEWAY") {
    Some(ip) => ip,
    None => "",
};

pub const DNS_SERVER: &str = match option_env!("DNS_SERVER") {
    Some(ip) => ip,
    None => "",
};

/// Präfixlänge als Text, wird in `default_settings()` geparst
pub const SUBNET_PREFIX: &str = match option_env!("SUBNET_PREFIX") {
    Some(prefix) => prefix,
    None => "24",
};

pub const NTP_SERVER: &str = match option_env!("NTP_SERVER") {
    Some(server) => server,
    None => "pool.ntp.org",
};

/// SPI-Takt des W5500
pub const ETH_SPI_FREQUENCY_MHZ: u32 = 20;

/// Sockets pro Stack: DHCP, DNS, MQTT (TCP), SNTP (UDP) + Reserve
pub const NET_SOCKETS: usize = 6;

/// MAC-Adresse des W5500 (lokal administriert)
pub const ETH_MAC_ADDRESS: [u8; 6] = [0x02, 0xF1, 0x4E, 0xC0, 0x00, 0x01];

/// Heap-Größe für WiFi (Bytes)
/// WiFi benötigt dynamischen Speicher für Pakete
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

/// Intervall des Link-Monitors
pub const LINK_POLL_INTERVAL_MS: u64 = 500;

/// Maximale Wartezeit des Connectivity-Tasks ohne Check-In
pub const CONNECTIVITY_TICK_MS: u32 = 1_000;

/// SNTP: Anzahl Versuche und Abstand
pub const SNTP_ATTEMPTS: u8 = 10;
pub const SNTP_RETRY_DELAY_MS: u64 = 1_000;
pub const SNTP_TIMEOUT_MS: u64 = 1_000;
pub const SNTP_PORT: u16 = 123;

/// DNS Query Timeout in Sekunden
pub const DNS_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// MQTT Konfiguration (Alerts + Status)
// ============================================================================

/// MQTT Broker Hostname oder IP-Adresse
/// Wird zur Build-Zeit aus der Environment Variable MQTT_BROKER geladen
pub const MQTT_BROKER: &str = env!(
    "MQTT_BROKER",
    "MQTT Broker nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// MQTT Broker Port
/// Standard: 1883 (unverschlüsselt), 8883 (TLS)
pub const MQTT_PORT: u16 = 1883;

/// MQTT Client ID
pub const MQTT_CLIENT_ID: &str = env!(
    "MQTT_CLIENT_ID",
    "MQTT Client ID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Topic für Alerts ("Network Connected", "SD Card Write Failed", ...)
pub const MQTT_TOPIC_ALERT: &str = env!(
    "MQTT_TOPIC_ALERT",
    "MQTT Topic Alert nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Topic für den Status-Snapshot (JSON)
pub const MQTT_TOPIC_STATUS: &str = env!(
    "MQTT_TOPIC_STATUS",
    "MQTT Topic Status nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// MQTT Reconnect Delay in Sekunden
/// Wartezeit nach Verbindungsfehler vor erneutem Versuch
pub const MQTT_RECONNECT_DELAY_SECS: u64 = 5;

/// Timeout für einzelne MQTT-Operationen
pub const MQTT_IO_TIMEOUT_SECS: u64 = 10;

/// MQTT Buffer-Größe in Bytes
/// Muss groß genug für MQTT-Pakete sein
pub const MQTT_BUFFER_SIZE: usize = 1024;

/// Intervall der Status-Veröffentlichung
pub const STATUS_PUBLISH_INTERVAL_SECS: u64 = 10;

/// JSON-Buffer für den Status-Snapshot
pub const STATUS_JSON_BUFFER_SIZE: usize = 512;

/// Kapazität der Alert-Queue
pub const ALERT_QUEUE_CAPACITY: usize = 8;

/// Maximale Länge eines Alert-Texts
pub const ALERT_TEXT_SIZE: usize = 64;

// ============================================================================
// Supervisor
// ============================================================================

/// Deadline des MQTT/Alert-Tasks (blockiert bis zu MQTT_IO_TIMEOUT_SECS)
pub const ALERT_WORKER_DEADLINE_MS: u32 = 3 * (MQTT_IO_TIMEOUT_SECS as u32) * 1000;

/// Einstellungen ohne Datei auf der SD-Karte
///
/// Netzwerkdaten kommen aus der .env zur Build-Zeit.
pub fn default_settings() -> Settings {
    let mut settings = Settings::default();
    settings.network.wifi_ssid = text(WIFI_SSID);
    settings.network.wifi_password = text(WIFI_PASSWORD);
    settings.network.static_ip = text(STATIC_IP);
    settings.network.gateway = text(GATEWAY);
    settings.network.dns_server = text(DNS_SERVER);
    settings.network.ntp_server = text(NTP_SERVER);
    settings.network.subnet_prefix = SUBNET_PREFIX.parse().unwrap_or(24);
    settings
}

/// Ergänzt fehlende Netzwerkdaten einer geladenen Datei aus der .env
pub fn apply_build_defaults(settings: &mut Settings) {
    let defaults = default_settings();
    let network = &mut settings.network;
    if network.wifi_ssid.is_empty() {
        network.wifi_ssid = defaults.network.wifi_ssid;
        network.wifi_password = defaults.network.wifi_password;
    }
    if network.static_ip.is_empty() {
        network.static_ip = defaults.network.static_ip;
        network.gateway = defaults.network.gateway;
        network.dns_server = defaults.network.dns_server;
        network.subnet_prefix = defaults.network.subnet_prefix;
    }
}
