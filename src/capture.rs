//! Capture files: pull UDP payloads out of pcap / pcapng recordings.
//!
//! Only IPv4/UDP is extracted. Supported link types: Ethernet (with 802.1Q /
//! 802.1ad tags), raw IP and Linux cooked capture v1. The UDP length field
//! bounds the payload, so Ethernet padding on short frames is never included.

use byteorder::{BigEndian, ByteOrder};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
const READER_CAPACITY: usize = 1 << 20;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;
const IPPROTO_UDP: u8 = 17;
const UDP_HEADER_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("pcap read error: {0}")]
    Pcap(String),
}

fn pcap_error<I: std::fmt::Debug>(e: PcapError<I>) -> CaptureError {
    CaptureError::Pcap(format!("{:?}", e))
}

/// One UDP payload found in a capture.
#[derive(Debug, Clone, Copy)]
pub struct CapturedDatagram<'a> {
    /// 1-based index of the packet in the capture (all packets, not only UDP).
    pub packet: u64,
    /// Capture time since the Unix epoch.
    pub timestamp: Duration,
    pub payload: &'a [u8],
}

/// Owned copy of a [`CapturedDatagram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayload {
    pub packet: u64,
    pub timestamp: Duration,
    pub payload: Vec<u8>,
}

impl From<CapturedDatagram<'_>> for CapturedPayload {
    fn from(d: CapturedDatagram<'_>) -> Self {
        CapturedPayload {
            packet: d.packet,
            timestamp: d.timestamp,
            payload: d.payload.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub packets: u64,
    pub udp_payloads: u64,
}

/// Read a capture file, calling `on_datagram` for every UDP payload.
///
/// The format (pcap or pcapng) is probed from the file magic.
pub fn read_capture_file<P, F>(path: P, on_datagram: F) -> Result<CaptureStats, CaptureError>
where
    P: AsRef<Path>,
    F: FnMut(CapturedDatagram<'_>),
{
    let path = path.as_ref();
    let mut probe = [0u8; 4];
    File::open(path)?.read_exact(&mut probe)?;
    let file = File::open(path)?;
    if probe == PCAPNG_MAGIC {
        read_pcapng(file, on_datagram)
    } else {
        read_legacy_pcap(file, on_datagram)
    }
}

/// All UDP payloads of a capture file, in capture order.
pub fn collect_payloads<P: AsRef<Path>>(path: P) -> Result<Vec<CapturedPayload>, CaptureError> {
    let mut out = Vec::new();
    read_capture_file(path, |d| out.push(d.into()))?;
    Ok(out)
}

pub fn read_legacy_pcap<R, F>(input: R, mut on_datagram: F) -> Result<CaptureStats, CaptureError>
where
    R: Read,
    F: FnMut(CapturedDatagram<'_>),
{
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(READER_CAPACITY, input).map_err(pcap_error)?;
    let mut stats = CaptureStats::default();
    let mut link = Some(LinkLayer::Ethernet);
    let mut nanos = false;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => {
                        link = LinkLayer::from_linktype(h.network);
                        nanos = h.is_nanosecond_precision();
                    }
                    PcapBlockOwned::Legacy(b) => {
                        stats.packets += 1;
                        if let Some(payload) = link.and_then(|l| l.udp_payload(b.data)) {
                            stats.udp_payloads += 1;
                            let sub = if nanos {
                                Duration::from_nanos(b.ts_usec as u64)
                            } else {
                                Duration::from_micros(b.ts_usec as u64)
                            };
                            on_datagram(CapturedDatagram {
                                packet: stats.packets,
                                timestamp: Duration::from_secs(b.ts_sec as u64) + sub,
                                payload,
                            });
                        }
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => reader.refill().map_err(pcap_error)?,
            Err(e) => return Err(pcap_error(e)),
        }
    }
    tracing::debug!(packets = stats.packets, udp = stats.udp_payloads, "legacy pcap read");
    Ok(stats)
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    link: Option<LinkLayer>,
    /// Timestamp units per second.
    units_per_sec: u64,
    offset_secs: i64,
}

impl Interface {
    const FALLBACK: Interface = Interface {
        link: Some(LinkLayer::Ethernet),
        units_per_sec: 1_000_000,
        offset_secs: 0,
    };

    fn udp_payload<'a>(&self, frame: &'a [u8]) -> Option<&'a [u8]> {
        self.link?.udp_payload(frame)
    }

    fn timestamp(&self, ts_high: u32, ts_low: u32) -> Duration {
        let raw = ((ts_high as u64) << 32) | ts_low as u64;
        let units = self.units_per_sec.max(1);
        let secs = (raw / units).saturating_add_signed(self.offset_secs);
        let nanos = (raw % units) as u128 * 1_000_000_000 / units as u128;
        Duration::new(secs, nanos as u32)
    }
}

/// `if_tsresol`: high bit set means a power of two, otherwise a power of ten.
fn units_per_sec(tsresol: u8) -> u64 {
    let exp = (tsresol & 0x7f) as u32;
    if tsresol & 0x80 != 0 {
        1u64.checked_shl(exp).unwrap_or(u64::MAX)
    } else {
        10u64.checked_pow(exp).unwrap_or(u64::MAX)
    }
}

pub fn read_pcapng<R, F>(input: R, mut on_datagram: F) -> Result<CaptureStats, CaptureError>
where
    R: Read,
    F: FnMut(CapturedDatagram<'_>),
{
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(READER_CAPACITY, input).map_err(pcap_error)?;
    let mut stats = CaptureStats::default();
    let mut interfaces: Vec<Interface> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::SectionHeader(_) => interfaces.clear(),
                        PcapNgBlock::InterfaceDescription(idb) => interfaces.push(Interface {
                            link: LinkLayer::from_linktype(idb.linktype),
                            units_per_sec: units_per_sec(idb.if_tsresol),
                            offset_secs: idb.if_tsoffset,
                        }),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            stats.packets += 1;
                            let iface = interfaces.get(epb.if_id as usize).unwrap_or(&Interface::FALLBACK);
                            if let Some(payload) = iface.udp_payload(epb.packet_data()) {
                                stats.udp_payloads += 1;
                                on_datagram(CapturedDatagram {
                                    packet: stats.packets,
                                    timestamp: iface.timestamp(epb.ts_high, epb.ts_low),
                                    payload,
                                });
                            }
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            stats.packets += 1;
                            // No timestamp in simple packet blocks.
                            let iface = interfaces.first().unwrap_or(&Interface::FALLBACK);
                            if let Some(payload) = iface.udp_payload(spb.packet_data()) {
                                stats.udp_payloads += 1;
                                on_datagram(CapturedDatagram {
                                    packet: stats.packets,
                                    timestamp: Duration::ZERO,
                                    payload,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => reader.refill().map_err(pcap_error)?,
            Err(e) => return Err(pcap_error(e)),
        }
    }
    tracing::debug!(packets = stats.packets, udp = stats.udp_payloads, "pcapng read");
    Ok(stats)
}

/// Framing in front of the IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    /// Ethernet II, any number of 802.1Q / 802.1ad tags.
    Ethernet,
    /// The frame is the IP packet.
    RawIp,
    /// Linux cooked capture v1 (16-byte pseudo header).
    LinuxSll,
}

impl LinkLayer {
    /// `None` for link types that never carry IPv4 in a supported framing.
    pub fn from_linktype(linktype: Linktype) -> Option<Self> {
        match linktype.0 {
            1 => Some(LinkLayer::Ethernet),
            101 | 228 => Some(LinkLayer::RawIp),
            113 => Some(LinkLayer::LinuxSll),
            other => {
                tracing::debug!(linktype = other, "unsupported link type; frames skipped");
                None
            }
        }
    }

    /// The IPv4 packet carried by `frame`.
    pub fn ipv4_packet(self, frame: &[u8]) -> Option<&[u8]> {
        match self {
            LinkLayer::RawIp => Some(frame),
            LinkLayer::LinuxSll => match BigEndian::read_u16(frame.get(14..16)?) {
                ETHERTYPE_IPV4 => frame.get(16..),
                _ => None,
            },
            LinkLayer::Ethernet => {
                let mut rest = frame.get(12..)?;
                loop {
                    let ethertype = BigEndian::read_u16(rest.get(..2)?);
                    rest = &rest[2..];
                    match ethertype {
                        ETHERTYPE_IPV4 => return Some(rest),
                        // Tag control info sits between this tag and the next ethertype.
                        ETHERTYPE_VLAN | ETHERTYPE_QINQ => rest = rest.get(2..)?,
                        _ => return None,
                    }
                }
            }
        }
    }

    /// UDP payload of `frame`, or `None` if it is not IPv4/UDP.
    pub fn udp_payload(self, frame: &[u8]) -> Option<&[u8]> {
        udp_in_ipv4(self.ipv4_packet(frame)?)
    }
}

/// The IPv4 total length and the UDP length both bound the result, so link
/// padding never leaks into the payload.
fn udp_in_ipv4(packet: &[u8]) -> Option<&[u8]> {
    let version_ihl = *packet.first()?;
    let header_len = usize::from(version_ihl & 0x0f) * 4;
    if version_ihl >> 4 != 4 || header_len < 20 || *packet.get(9)? != IPPROTO_UDP {
        return None;
    }
    let total_len = usize::from(BigEndian::read_u16(packet.get(2..4)?));
    let segment = packet.get(header_len..total_len.min(packet.len()))?;
    let udp_len = usize::from(BigEndian::read_u16(segment.get(4..6)?));
    if udp_len < UDP_HEADER_LEN {
        return None;
    }
    segment.get(UDP_HEADER_LEN..udp_len)
}
