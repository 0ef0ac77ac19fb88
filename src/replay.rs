//! Resend captured datagrams over UDP, paced by their capture timestamps.

use crate::capture::CapturedPayload;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 43, 44);
pub const DEFAULT_PORT: u16 = 12345;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid speed factor {0}: must be finite and non-negative without overflowing a delay")]
    InvalidSpeed(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub target: SocketAddr,
    /// Multicast TTL; ignored for unicast targets.
    pub ttl: u32,
    /// Playback rate: 2.0 replays twice as fast, 0.0 sends without delay.
    pub speed: f64,
    /// Deliver multicast back to the sending host.
    pub loopback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            target: SocketAddr::V4(SocketAddrV4::new(DEFAULT_GROUP, DEFAULT_PORT)),
            ttl: 255,
            speed: 1.0,
            loopback: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub sent: u64,
    pub bytes: u64,
    pub slept: Duration,
}

/// Delay before each datagram: the gap to the previous capture timestamp
/// divided by `speed`. The first datagram goes out immediately, as does every
/// datagram when `speed` is zero. Timestamps that run backwards give no delay.
/// A speed so small that a delay overflows [`Duration`] is rejected.
pub fn pacing_delays(timestamps: &[Duration], speed: f64) -> Result<Vec<Duration>, ReplayError> {
    if !speed.is_finite() || speed < 0.0 {
        return Err(ReplayError::InvalidSpeed(speed));
    }
    let mut prev: Option<Duration> = None;
    timestamps
        .iter()
        .map(|&ts| {
            let gap = prev.map(|p| ts.saturating_sub(p)).unwrap_or_default();
            prev = Some(ts);
            if speed == 0.0 {
                return Ok(Duration::ZERO);
            }
            Duration::try_from_secs_f64(gap.as_secs_f64() / speed).map_err(|_| ReplayError::InvalidSpeed(speed))
        })
        .collect()
}

fn open_socket(config: &ReplayConfig) -> Result<UdpSocket, ReplayError> {
    let bind: SocketAddr = match config.target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind)?;
    match config.target {
        SocketAddr::V4(v4) if v4.ip().is_multicast() => {
            socket.set_multicast_ttl_v4(config.ttl)?;
            socket.set_multicast_loop_v4(config.loopback)?;
        }
        SocketAddr::V6(v6) if v6.ip().is_multicast() => {
            socket.set_multicast_loop_v6(config.loopback)?;
        }
        _ => {}
    }
    Ok(socket)
}

/// Send every payload to `config.target` in order.
pub fn replay(payloads: &[CapturedPayload], config: &ReplayConfig) -> Result<ReplayStats, ReplayError> {
    let timestamps: Vec<Duration> = payloads.iter().map(|p| p.timestamp).collect();
    let delays = pacing_delays(&timestamps, config.speed)?;
    let socket = open_socket(config)?;
    tracing::info!(addr = %config.target, datagrams = payloads.len(), speed = config.speed, "replay started");

    let mut stats = ReplayStats::default();
    for (payload, delay) in payloads.iter().zip(delays) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
            stats.slept += delay;
        }
        let n = socket.send_to(&payload.payload, config.target)?;
        tracing::trace!(packet = payload.packet, bytes = n, "sent");
        stats.sent += 1;
        stats.bytes += n as u64;
    }
    tracing::info!(sent = stats.sent, bytes = stats.bytes, "replay finished");
    Ok(stats)
}
