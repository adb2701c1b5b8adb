// Hardware Abstraction Layer (HAL) Module
//
// Hardware-Treiber hinter den Traits aus esp-core. Die Logik in esp-core
// kennt nur SmartLedWriter, AxisBus und LogStorage.

pub mod buzzer;
pub mod led_writer;
pub mod rs485_bus;
pub mod sd_storage;

pub use buzzer::Buzzer;
pub use led_writer::{
    RmtLedWriter, STATUS_BUFFER_SIZE, STRIP_BUFFER_SIZE, StatusLedWriter, StripWriter,
};
pub use rs485_bus::Rs485Bus;
pub use sd_storage::{SdClock, SdStorage};
