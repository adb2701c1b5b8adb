// Connectivity Tasks - Ethernet (W5500) zuerst, dann WiFi, dann statische IP
//
// Die Entscheidungen trifft esp_core::ConnectivityManager. Dieser Task
// übersetzt NetActions in Stack-Konfiguration und WiFi-Kommandos und
// liefert Link-Events zurück.

use defmt::{Debug2Format, error, info, warn};
use embassy_net::{ConfigV4, DhcpConfig, Ipv4Cidr, Runner, Stack, StaticConfigV4};
use embassy_net_wiznet::chip::W5500;
use embassy_time::{Duration, Timer, with_timeout};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_core::{
    ConnectionMethod, ConnectivityManager, Indication, NetAction, NetEvent, Transport, Worker,
};
use esp_hal::Async;
use esp_hal::gpio::{Input, Output};
use esp_hal::spi::master::Spi;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};

use crate::config::{CONNECTIVITY_TICK_MS, LINK_POLL_INTERVAL_MS};
use crate::{
    Context, IndicationSignal, NetEventReceiver, NetEventSender, TimeSyncSignal,
    WifiCommandReceiver, WifiCommandSender, now_ticks,
};

/// SPI-Device des W5500 (Bus exklusiv, CS per GPIO)
pub type EthSpi = ExclusiveDevice<Spi<'static, Async>, Output<'static>, embassy_time::Delay>;

/// Treiber-Runner des W5500
pub type EthRunner = embassy_net_wiznet::Runner<'static, W5500, EthSpi, Input<'static>, Output<'static>>;

/// Alert beim Verbindungsaufbau
pub const NETWORK_CONNECTED_ALERT: &str = "Network Connected";

/// Kommandos an den WiFi Controller Task
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum WifiCommand {
    /// Verbinden für diese Stufe der Fallback-Leiter
    Connect(ConnectionMethod),
    Disconnect,
}

/// Einmal starten, dann assoziieren. Beides begrenzt durch `timeout`.
async fn wifi_connect(ctx: &Context, controller: &mut WifiController<'static>, timeout: Duration) {
    if matches!(controller.is_started(), Ok(false)) {
        let network = &ctx.settings.network;
        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(network.wifi_ssid.as_str().into())
                .with_password(network.wifi_password.as_str().into()),
        );

        if let Err(e) = controller.set_config(&client_config) {
            error!("WiFi: Failed to set configuration: {}", Debug2Format(&e));
            return;
        }
        match with_timeout(timeout, controller.start_async()).await {
            Ok(Ok(())) => info!("WiFi: Started"),
            Ok(Err(e)) => {
                error!("WiFi: Failed to start: {}", Debug2Format(&e));
                return;
            }
            Err(_) => {
                warn!("WiFi: Start timed out");
                return;
            }
        }
    }

    if matches!(controller.is_connected(), Ok(true)) {
        return;
    }

    info!("WiFi: Connecting to '{}'...", ctx.settings.network.wifi_ssid.as_str());
    match with_timeout(timeout, controller.connect_async()).await {
        Ok(Ok(_)) => info!("WiFi: Associated"),
        Ok(Err(e)) => warn!("WiFi: Connection failed: {}", Debug2Format(&e)),
        Err(_) => warn!("WiFi: Connect timed out"),
    }
}

/// WiFi Controller Task
///
/// Besitzt den WifiController. Verbindet bzw. trennt nur auf Kommando,
/// Wiederholungen steuert der ConnectivityManager über seine Timeouts.
/// Jeder Aufruf ist durch den Timeout der jeweiligen Stufe begrenzt, damit
/// die Kommando-Queue nie dauerhaft voll bleibt.
#[embassy_executor::task]
pub async fn wifi_controller_task(
    ctx: Context,
    mut controller: WifiController<'static>,
    commands: WifiCommandReceiver,
) {
    info!("WiFi: Starting controller task");
    let timeouts = ctx.settings.attempt_timeouts();

    loop {
        ctx.check_in(Worker::WifiController);
        let tick = Duration::from_millis(CONNECTIVITY_TICK_MS as u64);
        let Ok(command) = with_timeout(tick, commands.receive()).await else {
            continue;
        };

        match command {
            WifiCommand::Connect(method) => {
                let timeout = Duration::from_millis(timeouts.for_method(method) as u64);
                wifi_connect(&ctx, &mut controller, timeout).await;
            }
            WifiCommand::Disconnect => {
                if matches!(controller.is_connected(), Ok(true)) {
                    // Disconnect gehört zur Ethernet-Stufe
                    let timeout = Duration::from_millis(
                        timeouts.for_method(ConnectionMethod::Primary) as u64,
                    );
                    match with_timeout(timeout, controller.disconnect_async()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("WiFi: Disconnect failed: {}", Debug2Format(&e)),
                        Err(_) => warn!("WiFi: Disconnect timed out"),
                    }
                }
            }
        }
    }
}

/// W5500 Treiber Task
#[embassy_executor::task]
pub async fn eth_runner_task(runner: EthRunner) -> ! {
    runner.run().await
}

/// Network Task für den Ethernet-Stack
#[embassy_executor::task]
pub async fn eth_net_task(mut runner: Runner<'static, embassy_net_wiznet::Device<'static>>) -> ! {
    runner.run().await
}

/// Network Task für den WiFi-Stack
#[embassy_executor::task]
pub async fn wifi_net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Link steht und IPv4-Konfiguration ist vorhanden
fn stack_up(stack: Stack<'static>) -> bool {
    stack.is_link_up() && stack.is_config_up()
}

/// Link Monitor Task
///
/// Beobachtet beide Stacks und meldet Flanken als NetEvent.
#[embassy_executor::task]
pub async fn link_monitor_task(
    eth_stack: Stack<'static>,
    wifi_stack: Stack<'static>,
    events: NetEventSender,
) {
    let mut was_up = [false; 2];

    loop {
        for (index, (transport, stack)) in [
            (Transport::Primary, eth_stack),
            (Transport::Secondary, wifi_stack),
        ]
        .into_iter()
        .enumerate()
        {
            let up = stack_up(stack);
            if up != was_up[index] {
                was_up[index] = up;
                let event = if up {
                    NetEvent::LinkUp(transport)
                } else {
                    NetEvent::LinkDown(transport)
                };
                info!("Net: {}", event);
                events.send(event).await;
            }
        }

        Timer::after(Duration::from_millis(LINK_POLL_INTERVAL_MS)).await;
    }
}

/// Connectivity Task
///
/// Treibt den ConnectivityManager: wartet auf Link-Events, höchstens aber
/// bis zur nächsten Deadline bzw. `CONNECTIVITY_TICK_MS`.
#[embassy_executor::task]
pub async fn connectivity_task(
    ctx: Context,
    eth_stack: Stack<'static>,
    wifi_stack: Stack<'static>,
    wifi_commands: WifiCommandSender,
    events: NetEventReceiver,
    time_sync: &'static TimeSyncSignal,
    indication: &'static IndicationSignal,
) {
    info!("Net: Starting connectivity task");
    let mut manager = ConnectivityManager::new(ctx.settings.attempt_timeouts(), Transport::Primary);
    let mut pending: Option<NetEvent> = None;

    loop {
        let now = now_ticks();
        if let Some(action) = manager.poll(now, pending.take()) {
            ctx.status.set_connection(manager.state());
            match action {
                NetAction::Start(method) => {
                    start_method(&ctx, method, wifi_stack, wifi_commands);
                }
                NetAction::Connected(method) => {
                    info!("Net: Connected via {}", method.as_str());
                    ctx.log_fmt(format_args!("Net: connected via {}", method.as_str()));
                    ctx.alert(NETWORK_CONNECTED_ALERT);
                    time_sync.signal(method.transport());
                    indication.signal(Indication::Connected(method));
                }
                NetAction::Disconnected => {
                    warn!("Net: Connection lost");
                    ctx.log("Net: connection lost");
                }
                NetAction::CycleFailed => {
                    warn!("Net: All methods failed, retrying after cooldown");
                    ctx.log("Net: all connection methods failed");
                }
            }
            continue;
        }

        ctx.check_in(Worker::Connectivity);

        let wait_ms = manager
            .next_deadline()
            .map(|deadline| deadline.wrapping_sub(now).min(CONNECTIVITY_TICK_MS))
            .unwrap_or(CONNECTIVITY_TICK_MS);

        pending = match with_timeout(Duration::from_millis(wait_ms as u64), events.receive()).await {
            Ok(event) => Some(event),
            // Ein Link der schon vor dem Versuch stand, liefert keine Flanke
            Err(_) if !manager.state().is_connected() => {
                if stack_up(eth_stack) {
                    Some(NetEvent::LinkUp(Transport::Primary))
                } else if stack_up(wifi_stack) {
                    Some(NetEvent::LinkUp(Transport::Secondary))
                } else {
                    None
                }
            }
            Err(_) => None,
        };
    }
}

/// Setzt eine Methode der Fallback-Leiter um
fn start_method(
    ctx: &Context,
    method: ConnectionMethod,
    wifi_stack: Stack<'static>,
    wifi_commands: WifiCommandSender,
) {
    info!("Net: Trying {}", method.as_str());
    ctx.log_fmt(format_args!("Net: trying {}", method.as_str()));

    let command = match method {
        // Ethernet läuft immer mit DHCP, WiFi wird freigegeben
        ConnectionMethod::Primary => WifiCommand::Disconnect,
        ConnectionMethod::Secondary => {
            wifi_stack.set_config_v4(ConfigV4::Dhcp(DhcpConfig::default()));
            WifiCommand::Connect(method)
        }
        ConnectionMethod::FallbackStatic => match ctx.settings.network.static_address() {
            Ok(Some(address)) => {
                let mut config = StaticConfigV4 {
                    address: Ipv4Cidr::new(address.address, address.prefix_len),
                    gateway: address.gateway,
                    dns_servers: Default::default(),
                };
                if let Some(dns) = address.dns {
                    let _ = config.dns_servers.push(dns);
                }
                wifi_stack.set_config_v4(ConfigV4::Static(config));
                WifiCommand::Connect(method)
            }
            Ok(None) => {
                warn!("Net: No static address configured");
                ctx.log("Net: no static address configured");
                return;
            }
            Err(e) => {
                error!("Net: Invalid static address: {}", e);
                ctx.log("Net: invalid static address");
                return;
            }
        },
    };

    if wifi_commands.try_send(command).is_err() {
        warn!("Net: WiFi controller busy, {} skipped", command);
        ctx.log("Net: wifi controller busy, attempt skipped");
    }
}
