// Time Sync Task - SNTP nach jedem Verbindungsaufbau
use core::net::{IpAddr, SocketAddr, SocketAddrV4};
use core::str::FromStr;

use defmt::{Debug2Format, info, warn};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, Ipv4Address, Stack, dns::DnsQueryType};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use esp_core::{Transport, WallClock};
use sntpc::{NtpContext, NtpTimestampGenerator, NtpUdpSocket};

use crate::config::{
    DNS_TIMEOUT_SECS, SNTP_ATTEMPTS, SNTP_PORT, SNTP_RETRY_DELAY_MS, SNTP_TIMEOUT_MS,
};
use crate::{Context, TimeSyncSignal, uptime_secs};

/// Lokaler UDP-Port für die Anfragen
const LOCAL_PORT: u16 = 50_123;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TimeSyncError {
    /// UDP-Socket ließ sich nicht binden
    Socket,
    /// Servername nicht auflösbar
    Dns,
    /// Keine gültige Antwort nach allen Versuchen
    NoResponse,
}

/// embassy-net UDP-Socket für sntpc
struct SntpSocket<'a> {
    socket: UdpSocket<'a>,
}

impl NtpUdpSocket for SntpSocket<'_> {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> sntpc::Result<usize> {
        let SocketAddr::V4(addr) = addr else {
            return Err(sntpc::Error::Network);
        };
        self.socket
            .send_to(buf, (IpAddress::Ipv4(*addr.ip()), addr.port()))
            .await
            .map_err(|_| sntpc::Error::Network)?;
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> sntpc::Result<(usize, SocketAddr)> {
        let (len, meta) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(|_| sntpc::Error::Network)?;
        #[allow(unreachable_patterns)]
        let address = match meta.endpoint.addr {
            IpAddress::Ipv4(ip) => ip,
            _ => return Err(sntpc::Error::Network),
        };
        Ok((
            len,
            SocketAddr::V4(SocketAddrV4::new(address, meta.endpoint.port)),
        ))
    }
}

/// Sendezeitstempel für die Anfrage aus der Wanduhr
#[derive(Clone, Copy)]
struct ClockTimestamp {
    clock: &'static WallClock,
    uptime_micros: u64,
}

impl NtpTimestampGenerator for ClockTimestamp {
    fn init(&mut self) {
        self.uptime_micros = Instant::now().as_micros();
    }

    fn timestamp_sec(&self) -> u64 {
        self.clock.now_unix(self.uptime_micros / 1_000_000) as u64
    }

    fn timestamp_subsec_micros(&self) -> u32 {
        (self.uptime_micros % 1_000_000) as u32
    }
}

/// Time Sync Task
///
/// Wartet auf das Signal des Connectivity-Tasks und fragt den NTP-Server
/// über den Stack des verbundenen Transports ab.
#[embassy_executor::task]
pub async fn time_sync_task(
    ctx: Context,
    eth_stack: Stack<'static>,
    wifi_stack: Stack<'static>,
    trigger: &'static TimeSyncSignal,
) {
    loop {
        let transport = trigger.wait().await;
        let stack = match transport {
            Transport::Primary => eth_stack,
            Transport::Secondary => wifi_stack,
        };

        match sync_time(&ctx, stack).await {
            Ok(unix) => {
                ctx.status.clock().set_unix_time(unix, uptime_secs());
                info!("NTP: Time set to {}", unix);
                ctx.log("NTP: time synchronized");
            }
            Err(e) => {
                warn!("NTP: Sync failed: {}", e);
                ctx.log("NTP: time sync failed");
            }
        }
    }
}

/// Bis zu `SNTP_ATTEMPTS` Anfragen im Abstand von `SNTP_RETRY_DELAY_MS`
async fn sync_time(ctx: &Context, stack: Stack<'static>) -> Result<u32, TimeSyncError> {
    let server = resolve_server(stack, ctx.settings.network.ntp_server.as_str()).await?;
    let server = SocketAddr::new(IpAddr::V4(server), SNTP_PORT);

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(LOCAL_PORT).map_err(|_| TimeSyncError::Socket)?;
    let socket = SntpSocket { socket };

    let context = NtpContext::new(ClockTimestamp {
        clock: ctx.status.clock(),
        uptime_micros: 0,
    });

    for attempt in 1..=SNTP_ATTEMPTS {
        let result = with_timeout(
            Duration::from_millis(SNTP_TIMEOUT_MS),
            sntpc::get_time(server, &socket, context),
        )
        .await;
        match result {
            Ok(Ok(time)) => return Ok(time.sec()),
            Ok(Err(e)) => warn!("NTP: Attempt {}: {}", attempt, Debug2Format(&e)),
            Err(_) => warn!("NTP: Attempt {}: no answer", attempt),
        }
        Timer::after(Duration::from_millis(SNTP_RETRY_DELAY_MS)).await;
    }

    Err(TimeSyncError::NoResponse)
}

/// IP-Literal oder DNS-Auflösung
async fn resolve_server(stack: Stack<'static>, host: &str) -> Result<Ipv4Address, TimeSyncError> {
    if let Ok(address) = Ipv4Address::from_str(host) {
        return Ok(address);
    }

    let result = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(host, DnsQueryType::A),
    )
    .await;

    match result {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                if let IpAddress::Ipv4(ipv4) = addr {
                    return Ok(ipv4);
                }
            }
            Err(TimeSyncError::Dns)
        }
        Ok(Err(e)) => {
            warn!("NTP: DNS failed: {}", Debug2Format(&e));
            Err(TimeSyncError::Dns)
        }
        Err(_) => Err(TimeSyncError::Dns),
    }
}
