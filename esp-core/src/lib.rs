//! ESP Core - Platform-agnostic Logic and Traits
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert Traits, Zustandsautomaten und Pure Functions
//! der CNC-Steuerung. Alles hier ist auf dem Host testbar.

#![no_std]

pub mod channel;
pub mod config;
pub mod connectivity;
pub mod log;
pub mod logic;
pub mod poller;
pub mod renderer;
pub mod status;
pub mod supervisor;
pub mod traits;
pub mod types;

// Re-exports für einfachen Zugriff
pub use channel::{StatusChannel, StatusReceiver, StatusSender, publish_status};
pub use config::{ConfigError, Settings};
pub use connectivity::{AttemptTimeouts, ConnectivityManager, NetAction, plan_ladder};
pub use log::{LogEntry, LogError, SharedLog, format_log_line};
pub use logic::{
    Indication, blink_on, cell_for_position, connection_indication, dim_color, format_uptime,
    scale_color, storage_warning_indication,
};
pub use poller::{MotorPoller, PollReport};
pub use renderer::{IndicatorRenderer, RenderTiming, StatusLed, StripLayout, StripRenderer};
pub use status::{SharedStatus, StatusSnapshot, WallClock};
pub use supervisor::{LivenessMonitor, Worker, validate_feed_period};
pub use traits::{
    AlertSink, AxisBus, BusDirection, BusError, LedError, LogStorage, SmartLedWriter,
    StorageError, StorageUsage, TransmitGuard,
};
pub use types::{
    AXIS_COUNT, AxisId, AxisStatus, ConnectionMethod, ConnectionState, NetEvent, StatusEvent,
    Ticks, Transport,
};
