//! ICMP echo probe.
//!
//! Sends a short burst of echo requests to one address over a raw socket
//! and waits, up to a single run-wide deadline, for the matching replies.
//! The run succeeds when the socket could be opened and every request was
//! sent; packet loss is reported as quality, not as failure.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use pnet::packet::Packet;
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet::packet::icmpv6::{self, Icmpv6Packet, Icmpv6Types};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::transport::{
    self, TransportChannelType, TransportProtocol, TransportReceiver, TransportSender,
};
use tracing::debug;

use crate::error::{ProbeError, ProbeOutcome};

const TRANSPORT_BUFFER_SIZE: usize = 4096;
/// 8-byte echo header + 16 bytes of payload.
const ECHO_PACKET_LEN: usize = 24;
/// Smallest receive timeout the socket honours; shorter ones round down
/// to zero, which `SO_RCVTIMEO` reads as "no timeout".
const MIN_RECV_TIMEOUT: Duration = Duration::from_micros(1);

/// Echo burst settings.
#[derive(Debug, Clone)]
pub struct IcmpConfig {
    /// Echo requests per run.
    pub count: u32,
    /// Deadline for the whole run, replies included.
    pub timeout: Duration,
}

impl Default for IcmpConfig {
    fn default() -> Self {
        Self {
            count: 5,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Outcome of a completed echo run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoStats {
    pub sent: u32,
    pub received: u32,
    /// Round-trip time of each reply received.
    pub rtts: Vec<Duration>,
}

impl EchoStats {
    /// Percentage of requests without a reply, in `[0, 100]`.
    pub fn packet_loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        let received = self.received.min(self.sent);
        let lost = f64::from(self.sent - received);
        (lost / f64::from(self.sent) * 100.0).clamp(0.0, 100.0)
    }

    /// Mean round-trip time; zero when nothing came back.
    pub fn avg_rtt(&self) -> Duration {
        if self.rtts.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.rtts.iter().sum();
        total / self.rtts.len() as u32
    }
}

/// Something that can run an echo burst against an address.
pub trait EchoProber: Send + Sync + 'static {
    /// Echo requests sent per successful run.
    fn count(&self) -> u32;

    fn probe(&self, target: IpAddr) -> impl Future<Output = ProbeOutcome<EchoStats>> + Send;
}

/// Raw-socket echo prober. Needs `CAP_NET_RAW` (or root).
#[derive(Debug, Clone, Default)]
pub struct IcmpProber {
    config: IcmpConfig,
}

impl IcmpProber {
    pub fn new(config: IcmpConfig) -> Self {
        Self { config }
    }
}

impl EchoProber for IcmpProber {
    fn count(&self) -> u32 {
        self.config.count
    }

    fn probe(&self, target: IpAddr) -> impl Future<Output = ProbeOutcome<EchoStats>> + Send {
        let config = self.config.clone();
        async move {
            // pnet sockets are blocking; keep them off the async workers.
            tokio::task::spawn_blocking(move || run_echo(target, &config))
                .await
                .map_err(|e| ProbeError::Task(e.to_string()))?
        }
    }
}

fn run_echo(target: IpAddr, config: &IcmpConfig) -> ProbeOutcome<EchoStats> {
    let protocol = match target {
        IpAddr::V4(_) => TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp),
        IpAddr::V6(_) => TransportProtocol::Ipv6(IpNextHeaderProtocols::Icmpv6),
    };
    let (mut tx, mut rx) = transport::transport_channel(
        TRANSPORT_BUFFER_SIZE,
        TransportChannelType::Layer4(protocol),
    )
    .map_err(ProbeError::socket)?;

    let identifier: u16 = rand::random();
    let deadline = Instant::now() + config.timeout;
    let mut pending: HashMap<u16, Instant> = HashMap::new();

    for seq in 0..config.count {
        let seq = seq as u16;
        match target {
            IpAddr::V4(_) => send_echo_v4(&mut tx, target, identifier, seq)?,
            IpAddr::V6(_) => send_echo_v6(&mut tx, target, identifier, seq)?,
        }
        pending.insert(seq, Instant::now());
    }

    let mut stats = EchoStats {
        sent: config.count,
        ..EchoStats::default()
    };
    await_replies(target, identifier, deadline, &mut pending, &mut stats, &mut rx)
        .map_err(ProbeError::socket)?;

    debug!(
        %target,
        sent = stats.sent,
        received = stats.received,
        "echo run complete"
    );
    Ok(stats)
}

fn send_echo_v4(
    tx: &mut TransportSender,
    target: IpAddr,
    identifier: u16,
    seq: u16,
) -> ProbeOutcome<()> {
    let mut buf = [0u8; ECHO_PACKET_LEN];
    let mut packet = icmp::echo_request::MutableEchoRequestPacket::new(&mut buf)
        .ok_or(ProbeError::Packet("echo request buffer too small"))?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_identifier(identifier);
    packet.set_sequence_number(seq);
    let checksum = pnet::util::checksum(packet.packet(), 1);
    packet.set_checksum(checksum);

    tx.send_to(packet, target).map_err(ProbeError::socket)?;
    Ok(())
}

fn send_echo_v6(
    tx: &mut TransportSender,
    target: IpAddr,
    identifier: u16,
    seq: u16,
) -> ProbeOutcome<()> {
    let mut buf = [0u8; ECHO_PACKET_LEN];
    let mut packet = icmpv6::echo_request::MutableEchoRequestPacket::new(&mut buf)
        .ok_or(ProbeError::Packet("echo request buffer too small"))?;
    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
    packet.set_identifier(identifier);
    packet.set_sequence_number(seq);
    // The kernel fills in the ICMPv6 checksum on raw sockets.

    tx.send_to(packet, target).map_err(ProbeError::socket)?;
    Ok(())
}

/// Drain replies until every request is answered or the deadline passes.
fn await_replies(
    target: IpAddr,
    identifier: u16,
    deadline: Instant,
    pending: &mut HashMap<u16, Instant>,
    stats: &mut EchoStats,
    rx: &mut TransportReceiver,
) -> io::Result<()> {
    match target {
        IpAddr::V4(_) => {
            let mut iter = transport::icmp_packet_iter(rx);
            collect(target, identifier, deadline, pending, stats, |timeout| {
                Ok(iter
                    .next_with_timeout(timeout)?
                    .map(|(packet, from)| (from, parse_reply_v4(&packet))))
            })
        }
        IpAddr::V6(_) => {
            let mut iter = transport::icmpv6_packet_iter(rx);
            collect(target, identifier, deadline, pending, stats, |timeout| {
                Ok(iter
                    .next_with_timeout(timeout)?
                    .map(|(packet, from)| (from, parse_reply_v6(&packet))))
            })
        }
    }
}

/// `next` yields `(source, Some((identifier, seq)))` for echo replies and
/// `(source, None)` for any other ICMP traffic; `Ok(None)` means timeout.
fn collect<F>(
    target: IpAddr,
    identifier: u16,
    deadline: Instant,
    pending: &mut HashMap<u16, Instant>,
    stats: &mut EchoStats,
    mut next: F,
) -> io::Result<()>
where
    F: FnMut(Duration) -> io::Result<Option<(IpAddr, Option<(u16, u16)>)>>,
{
    while !pending.is_empty() {
        let Some(remaining) = receive_window(deadline, Instant::now()) else {
            break;
        };
        let Some((from, reply)) = next(remaining)? else {
            break;
        };
        let Some((id, seq)) = reply else {
            continue;
        };
        if from != target || id != identifier {
            continue;
        }
        if let Some(sent_at) = pending.remove(&seq) {
            stats.received += 1;
            stats.rtts.push(sent_at.elapsed());
        }
    }
    Ok(())
}

/// Time left to wait for replies, or `None` once the deadline is too close
/// to express as a socket timeout.
fn receive_window(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(now);
    (remaining >= MIN_RECV_TIMEOUT).then_some(remaining)
}

fn parse_reply_v4(packet: &IcmpPacket<'_>) -> Option<(u16, u16)> {
    if packet.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }
    let reply = icmp::echo_reply::EchoReplyPacket::new(packet.packet())?;
    Some((reply.get_identifier(), reply.get_sequence_number()))
}

fn parse_reply_v6(packet: &Icmpv6Packet<'_>) -> Option<(u16, u16)> {
    if packet.get_icmpv6_type() != Icmpv6Types::EchoReply {
        return None;
    }
    let reply = icmpv6::echo_reply::EchoReplyPacket::new(packet.packet())?;
    Some((reply.get_identifier(), reply.get_sequence_number()))
}

/// Parse a discovered address into a probe target.
pub fn parse_target(address: &str) -> ProbeOutcome<IpAddr> {
    address
        .trim()
        .parse()
        .map_err(|_| ProbeError::InvalidAddress(address.to_string()))
}
