// SD-Karte (SPI-Modus, FAT32)
//
// Implementiert esp_core::LogStorage. Die Log-Datei wird für jede Zeile
// geöffnet und wieder geschlossen, damit der FAT-Eintrag nach jedem
// Schreibvorgang aktuell ist.

use chrono::{DateTime, Datelike, Timelike};
use defmt::{Debug2Format, info, warn};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{
    Mode, RawDirectory, RawFile, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use esp_core::{LogStorage, StorageError, StorageUsage, WallClock};
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;

use crate::config::{CONFIG_FILE_NAME, LOG_FILE_NAME, SD_FREQUENCY_MHZ};
use crate::uptime_secs;

type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
type SdVolumeManager = VolumeManager<SdCard<SdSpiDevice, Delay>, SdClock>;

/// Zeitstempel für FAT-Einträge aus der Wanduhr
///
/// Vor der ersten NTP-Synchronisation liefert die Uhr Sekunden seit Boot,
/// die Dateien bekommen dann ein Datum um 1970.
pub struct SdClock {
    clock: &'static WallClock,
}

impl TimeSource for SdClock {
    fn get_timestamp(&self) -> Timestamp {
        let unix = self.clock.now_unix(uptime_secs());
        let time = DateTime::from_timestamp(unix as i64, 0).unwrap_or_default();
        // FAT kennt keine Jahre vor 1980
        let year = time.year().clamp(1980, 2107) as u16;
        Timestamp::from_calendar(
            year,
            time.month() as u8,
            time.day() as u8,
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
        )
        .unwrap_or(Timestamp {
            year_since_1970: 10,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        })
    }
}

pub struct SdStorage {
    volume_mgr: SdVolumeManager,
    root: RawDirectory,
    total_bytes: u64,
}

impl SdStorage {
    /// Initialisiert Karte und Dateisystem
    ///
    /// Der SPI-Bus muss mit Init-Takt (400 kHz) übergeben werden, nach der
    /// Initialisierung wird auf `SD_FREQUENCY_MHZ` umgestellt.
    pub fn new(
        spi: Spi<'static, Blocking>,
        cs: Output<'static>,
        clock: &'static WallClock,
    ) -> Result<Self, StorageError> {
        let device =
            ExclusiveDevice::new(spi, cs, Delay::new()).map_err(|_| StorageError::NotAvailable)?;
        let card = SdCard::new(device, Delay::new());

        // Erster Zugriff initialisiert die Karte
        let total_bytes = card.num_bytes().map_err(|e| {
            warn!("SD: card init failed: {}", Debug2Format(&e));
            StorageError::NotAvailable
        })?;
        info!("SD: card size {} MB", total_bytes / (1024 * 1024));

        let fast = SpiConfig::default().with_frequency(Rate::from_mhz(SD_FREQUENCY_MHZ));
        if card.spi(|device| device.bus_mut().apply_config(&fast)).is_err() {
            warn!("SD: could not raise SPI clock, staying at init rate");
        }

        let volume_mgr = VolumeManager::new(card, SdClock { clock });
        let volume = volume_mgr
            .open_raw_volume(VolumeIdx(0))
            .map_err(|e| {
                warn!("SD: no FAT volume: {}", Debug2Format(&e));
                StorageError::NotAvailable
            })?;
        let root = volume_mgr
            .open_root_dir(volume)
            .map_err(|_| StorageError::NotAvailable)?;

        Ok(Self {
            volume_mgr,
            root,
            total_bytes,
        })
    }

    /// Liest FIRECNC.CFG nach `buf`, gibt die Länge zurück
    ///
    /// Fehlt die Datei, kommt `NotAvailable`. Passt sie nicht in den
    /// Buffer, kommt `ReadFailed`.
    pub fn read_config(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let file = self
            .volume_mgr
            .open_file_in_dir(self.root, CONFIG_FILE_NAME, Mode::ReadOnly)
            .map_err(|_| StorageError::NotAvailable)?;
        let result = self.read_to_end(file, buf);
        let _ = self.volume_mgr.close_file(file);
        result
    }

    fn read_to_end(&mut self, file: RawFile, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut filled = 0;
        loop {
            if filled == buf.len() {
                let mut extra = [0u8; 1];
                let more = self
                    .volume_mgr
                    .read(file, &mut extra)
                    .map_err(|_| StorageError::ReadFailed)?;
                return if more == 0 {
                    Ok(filled)
                } else {
                    Err(StorageError::ReadFailed)
                };
            }
            let n = self
                .volume_mgr
                .read(file, &mut buf[filled..])
                .map_err(|_| StorageError::ReadFailed)?;
            if n == 0 {
                return Ok(filled);
            }
            filled += n;
        }
    }

    /// Größe einer Datei im Root-Verzeichnis (0 wenn nicht vorhanden)
    fn file_size(&mut self, name: &str) -> Result<u64, StorageError> {
        match self.volume_mgr.find_directory_entry(self.root, name) {
            Ok(entry) => Ok(entry.size as u64),
            Err(embedded_sdmmc::Error::NotFound) => Ok(0),
            Err(_) => Err(StorageError::ReadFailed),
        }
    }
}

impl LogStorage for SdStorage {
    fn append(&mut self, line: &str) -> Result<(), StorageError> {
        let file = self
            .volume_mgr
            .open_file_in_dir(self.root, LOG_FILE_NAME, Mode::ReadWriteCreateOrAppend)
            .map_err(|_| StorageError::WriteFailed)?;
        let written = self.volume_mgr.write(file, line.as_bytes());
        let closed = self.volume_mgr.close_file(file);
        written
            .and(closed)
            .map_err(|_| StorageError::WriteFailed)
    }

    /// Belegung durch die Dateien der Steuerung
    fn usage(&mut self) -> Result<StorageUsage, StorageError> {
        let used_bytes = self.file_size(LOG_FILE_NAME)? + self.file_size(CONFIG_FILE_NAME)?;
        Ok(StorageUsage {
            total_bytes: self.total_bytes,
            used_bytes,
        })
    }
}
