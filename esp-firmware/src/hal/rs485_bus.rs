// RS485 Servo-Bus (Modbus RTU über UART2)
//
// Implementiert esp_core::AxisBus. Frames baut und prüft rmodbus, hier
// liegt nur der UART-Zugriff. Jeder Read ist zeitbegrenzt, ein Timeout
// wird wie ein fehlgeschlagener Read behandelt.

use embassy_time::{Duration, with_timeout};
use esp_core::{AxisBus, BusDirection, BusError, TransmitGuard};
use esp_hal::Async;
use esp_hal::gpio::Output;
use esp_hal::uart::Uart;
use rmodbus::client::ModbusRequest;
use rmodbus::{ErrorKind, ModbusProto, guess_response_frame_len};

use crate::config::{MODBUS_FRAME_SIZE, MODBUS_MAX_REGISTERS};

/// Adresse + Funktion + Byte-Count bzw. Exception-Code
const HEADER_LEN: usize = 3;

type Frame = heapless_modbus::Vec<u8, MODBUS_FRAME_SIZE>;
type Registers = heapless_modbus::Vec<u16, MODBUS_MAX_REGISTERS>;

/// Treiber-Freigabe des Transceivers (high = senden)
pub struct DriverEnable(Output<'static>);

impl BusDirection for DriverEnable {
    fn set_transmit(&mut self) {
        self.0.set_high();
    }

    fn set_receive(&mut self) {
        self.0.set_low();
    }
}

fn bus_error(kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::FrameCRCError => BusError::Crc,
        ErrorKind::IllegalFunction => BusError::Exception(0x01),
        ErrorKind::IllegalDataAddress => BusError::Exception(0x02),
        ErrorKind::IllegalDataValue => BusError::Exception(0x03),
        ErrorKind::SlaveDeviceFailure => BusError::Exception(0x04),
        _ => BusError::Io,
    }
}

pub struct Rs485Bus {
    uart: Uart<'static, Async>,
    driver_enable: DriverEnable,
    timeout: Duration,
}

impl Rs485Bus {
    pub fn new(uart: Uart<'static, Async>, driver_enable: Output<'static>, timeout_ms: u32) -> Self {
        Self {
            uart,
            driver_enable: DriverEnable(driver_enable),
            timeout: Duration::from_millis(timeout_ms as u64),
        }
    }

    /// Verwirft Reste einer verspäteten Antwort
    fn discard_pending(&mut self) {
        let mut scratch = [0u8; 16];
        while let Ok(n) = self.uart.read_buffered(&mut scratch) {
            if n == 0 {
                break;
            }
        }
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), BusError> {
        let _transmit = TransmitGuard::enable(&mut self.driver_enable);
        let mut written = 0;
        while written < frame.len() {
            written += self
                .uart
                .write_async(&frame[written..])
                .await
                .map_err(|_| BusError::Io)?;
        }
        self.uart.flush_async().await.map_err(|_| BusError::Io)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self
                .uart
                .read_async(&mut buf[filled..])
                .await
                .map_err(|_| BusError::Io)?;
        }
        Ok(())
    }

    /// Liest eine komplette Antwort, Länge ergibt sich aus dem Header
    async fn receive(&mut self, frame: &mut [u8; MODBUS_FRAME_SIZE]) -> Result<usize, BusError> {
        self.read_exact(&mut frame[..HEADER_LEN]).await?;
        let len = guess_response_frame_len(&frame[..HEADER_LEN], ModbusProto::Rtu)
            .map_err(bus_error)? as usize;
        if len < HEADER_LEN || len > MODBUS_FRAME_SIZE {
            return Err(BusError::Io);
        }
        self.read_exact(&mut frame[HEADER_LEN..len]).await?;
        Ok(len)
    }
}

impl AxisBus for Rs485Bus {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        out: &mut [u16],
    ) -> Result<(), BusError> {
        if out.len() > MODBUS_MAX_REGISTERS {
            return Err(BusError::Io);
        }

        let mut request = ModbusRequest::new(slave_id, ModbusProto::Rtu);
        let mut request_frame = Frame::new();
        request
            .generate_get_holdings(start, out.len() as u16, &mut request_frame)
            .map_err(bus_error)?;
        self.discard_pending();

        let timeout = self.timeout;
        let mut response = [0u8; MODBUS_FRAME_SIZE];
        let len = with_timeout(timeout, async {
            self.send(&request_frame).await?;
            self.receive(&mut response).await
        })
        .await
        .map_err(|_| BusError::Timeout)??;

        // Prüft CRC, Slave-ID und Exception-Antworten
        let mut registers = Registers::new();
        request
            .parse_u16(&response[..len], &mut registers)
            .map_err(bus_error)?;
        if registers.len() != out.len() {
            return Err(BusError::Io);
        }
        out.copy_from_slice(&registers);
        Ok(())
    }
}
