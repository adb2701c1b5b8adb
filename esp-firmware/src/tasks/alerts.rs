// Alerts Task - Alerts und Status-Snapshot per MQTT
use defmt::{Debug2Format, error, info, warn};
use embassy_futures::select::{Either, select};
use embassy_net::{IpAddress, Stack, dns::DnsQueryType, tcp::TcpSocket};
use embassy_time::{Duration, Ticker, Timer, with_timeout};
use esp_core::{ConnectionState, Transport, Worker};

use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::utils::rng_generator::CountingRng;
use rust_mqtt::utils::types::EncodedString;

use crate::config::*;
use crate::{AlertReceiver, Context, uptime_secs};

/// MQTT Fehler-Typen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertError {
    DnsResolutionFailed,
    DnsTimeout,
    ConnectionFailed,
    ProtocolError,
    PublishFailed,
    Timeout,
    /// Verbindung über einen anderen Transport oder gar keine mehr
    NetworkChanged,
}

impl defmt::Format for AlertError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            AlertError::DnsResolutionFailed => defmt::write!(fmt, "DNS failed"),
            AlertError::DnsTimeout => defmt::write!(fmt, "DNS timeout"),
            AlertError::ConnectionFailed => defmt::write!(fmt, "Connection failed"),
            AlertError::ProtocolError => defmt::write!(fmt, "Protocol error"),
            AlertError::PublishFailed => defmt::write!(fmt, "Publish failed"),
            AlertError::Timeout => defmt::write!(fmt, "Timeout"),
            AlertError::NetworkChanged => defmt::write!(fmt, "Network changed"),
        }
    }
}

/// Alerts Task
///
/// - Wartet auf eine Verbindung (beliebiger Transport)
/// - Verbindet sich mit dem MQTT Broker über den aktiven Stack
/// - Published jeden Alert aus der Queue auf `MQTT_TOPIC_ALERT`
/// - Published alle `STATUS_PUBLISH_INTERVAL_SECS` den Status-Snapshot
///
/// Alerts die ohne Verbindung auflaufen, bleiben in der Queue bis sie voll
/// ist, weitere werden beim Einreihen verworfen.
#[embassy_executor::task]
pub async fn alerts_task(
    ctx: Context,
    eth_stack: Stack<'static>,
    wifi_stack: Stack<'static>,
    alerts: AlertReceiver,
) {
    info!("MQTT: Task started, waiting for network...");

    loop {
        let transport = wait_for_network(&ctx).await;
        let stack = match transport {
            Transport::Primary => eth_stack,
            Transport::Secondary => wifi_stack,
        };
        info!("MQTT: Network ready");

        match mqtt_connect_and_publish(&ctx, stack, transport, alerts).await {
            Ok(_) => warn!("MQTT: Connection closed normally"),
            Err(e) => error!("MQTT: Error: {}", e),
        }

        info!("MQTT: Reconnecting in {}s...", MQTT_RECONNECT_DELAY_SECS);
        ctx.check_in(Worker::Alerts);
        Timer::after(Duration::from_secs(MQTT_RECONNECT_DELAY_SECS)).await;
    }
}

/// Transport der aktuellen Verbindung
fn connected_transport(ctx: &Context) -> Option<Transport> {
    match ctx.status.connection() {
        ConnectionState::Connected(method) => Some(method.transport()),
        _ => None,
    }
}

/// Wartet bis der Connectivity-Task eine Verbindung meldet
async fn wait_for_network(ctx: &Context) -> Transport {
    loop {
        if let Some(transport) = connected_transport(ctx) {
            return transport;
        }
        ctx.check_in(Worker::Alerts);
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// Verbindet mit dem Broker und published bis zum ersten Fehler
async fn mqtt_connect_and_publish(
    ctx: &Context,
    stack: Stack<'static>,
    transport: Transport,
    alerts: AlertReceiver,
) -> Result<(), AlertError> {
    let io_timeout = Duration::from_secs(MQTT_IO_TIMEOUT_SECS);

    info!("MQTT: Resolving '{}'...", MQTT_BROKER);
    let broker_ip = resolve_hostname(stack, MQTT_BROKER).await?;
    info!("MQTT: Resolved to {}", Debug2Format(&broker_ip));
    ctx.check_in(Worker::Alerts);

    let mut rx_buffer = [0u8; 2048];
    let mut tx_buffer = [0u8; 2048];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(io_timeout));

    with_timeout(io_timeout, socket.connect((broker_ip, MQTT_PORT)))
        .await
        .map_err(|_| AlertError::Timeout)?
        .map_err(|_| AlertError::ConnectionFailed)?;
    info!("MQTT: TCP connected");
    ctx.check_in(Worker::Alerts);

    let rng = CountingRng(20000);
    let mut config = ClientConfig::<5, _>::new(MqttVersion::MQTTv5, rng);
    config.client_id = EncodedString {
        string: MQTT_CLIENT_ID,
        len: MQTT_CLIENT_ID.len() as u16,
    };
    config.keep_alive = 30;
    config.max_packet_size = MQTT_BUFFER_SIZE as u32;

    let mut send_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut recv_buffer = [0u8; MQTT_BUFFER_SIZE];

    let mut client = MqttClient::<_, 5, _>::new(
        socket,
        &mut send_buffer,
        MQTT_BUFFER_SIZE,
        &mut recv_buffer,
        MQTT_BUFFER_SIZE,
        config,
    );

    with_timeout(io_timeout, client.connect_to_broker())
        .await
        .map_err(|_| AlertError::Timeout)?
        .map_err(|_| AlertError::ProtocolError)?;
    info!("MQTT: Connected to broker");
    ctx.check_in(Worker::Alerts);

    let mut status_ticker = Ticker::every(Duration::from_secs(STATUS_PUBLISH_INTERVAL_SECS));
    let mut json = [0u8; STATUS_JSON_BUFFER_SIZE];

    loop {
        if connected_transport(ctx) != Some(transport) {
            return Err(AlertError::NetworkChanged);
        }

        match select(alerts.receive(), status_ticker.next()).await {
            Either::First(alert) => {
                info!("MQTT: Publishing alert '{}'", alert.as_str());
                with_timeout(
                    io_timeout,
                    client.send_message(
                        MQTT_TOPIC_ALERT,
                        alert.as_bytes(),
                        QualityOfService::QoS0,
                        false,
                    ),
                )
                .await
                .map_err(|_| AlertError::Timeout)?
                .map_err(|_| AlertError::PublishFailed)?;
            }
            Either::Second(()) => {
                let snapshot = ctx.status.snapshot(uptime_secs());
                let len = match serde_json_core::to_slice(&snapshot, &mut json) {
                    Ok(len) => len,
                    Err(_) => {
                        warn!("MQTT: Status snapshot does not fit buffer");
                        continue;
                    }
                };
                with_timeout(
                    io_timeout,
                    client.send_message(
                        MQTT_TOPIC_STATUS,
                        &json[..len],
                        QualityOfService::QoS0,
                        false,
                    ),
                )
                .await
                .map_err(|_| AlertError::Timeout)?
                .map_err(|_| AlertError::PublishFailed)?;
            }
        }

        ctx.check_in(Worker::Alerts);
    }
}

/// Löst Hostname zu IPv4-Adresse auf
async fn resolve_hostname(
    stack: Stack<'static>,
    hostname: &str,
) -> Result<embassy_net::Ipv4Address, AlertError> {
    let result = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(hostname, DnsQueryType::A),
    )
    .await;

    match result {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                if let IpAddress::Ipv4(ipv4) = addr {
                    return Ok(ipv4);
                }
            }
            Err(AlertError::DnsResolutionFailed)
        }
        Ok(Err(_)) => Err(AlertError::DnsResolutionFailed),
        Err(_) => Err(AlertError::DnsTimeout),
    }
}
