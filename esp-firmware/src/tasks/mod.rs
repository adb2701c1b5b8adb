// Task-Modul: Enthält alle Embassy Tasks
//
// Jeder Task läuft asynchron und unabhängig.
// Tasks kommunizieren über Embassy Channels und Signale
// (Servo → LED, Link-Monitor → Connectivity → SNTP/Status-LED, alle → MQTT).

pub mod alerts;
pub mod connectivity;
pub mod indicator;
pub mod motor_poll;
pub mod storage_monitor;
pub mod supervisor;
pub mod time_sync;

// Re-export Tasks für einfachen Import
pub use alerts::alerts_task;
pub use connectivity::{
    EthRunner, EthSpi, WifiCommand, connectivity_task, eth_net_task, eth_runner_task,
    link_monitor_task, wifi_controller_task, wifi_net_task,
};
pub use indicator::{fatal_storage_alarm, indicator_task};
pub use motor_poll::motor_poll_task;
pub use storage_monitor::storage_monitor_task;
pub use supervisor::supervisor_task;
pub use time_sync::time_sync_task;
