use std::path::{Path, PathBuf};
use std::time::Duration;

use etherparse::{EtherType, Ethernet2HeaderSlice, NetSlice, SlicedPacket, TcpSlice, TransportSlice};
use indicatif::{ProgressBar, ProgressStyle};
use pcap::Capture;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::models::domain::{ArpFields, Ipv4Fields, Layers, PacketRecord, TcpFields};

const DNS_PORT: u16 = 53;
const DNS_HEADER_LEN: usize = 12;
const DNS_MAX_NAME_LEN: usize = 255;
const PROGRESS_STEP: usize = 1000;

const LINKTYPE_ETHERNET: i32 = 1;
// libpcap reports DLT values; savefile LINKTYPE_RAW (101) becomes DLT_RAW
const DLT_RAW: i32 = 12;
const DLT_RAW_OPENBSD: i32 = 14;
const LINKTYPE_RAW: i32 = 101;
const LINKTYPE_LINUX_SLL: i32 = 113;
const LINKTYPE_IPV4: i32 = 228;

/// Anything that can hand the analyzer a finite, ordered list of decoded packets.
pub trait PacketSource {
    fn read_packets(&mut self) -> Result<Vec<PacketRecord>, AnalysisError>;
}

impl PacketSource for Vec<PacketRecord> {
    fn read_packets(&mut self) -> Result<Vec<PacketRecord>, AnalysisError> {
        if self.is_empty() {
            return Err(AnalysisError::SourceUnavailable("no packets supplied".into()));
        }
        Ok(std::mem::take(self))
    }
}

/// Offline capture file (pcap or pcapng) read through libpcap.
pub struct PcapFileSource {
    path: PathBuf,
    progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkKind {
    Ethernet,
    RawIp,
    /// Linux cooked capture, as written by `tcpdump -i any`.
    LinuxSll,
    Unsupported(i32),
}

impl LinkKind {
    pub fn from_linktype(linktype: i32) -> Self {
        match linktype {
            LINKTYPE_ETHERNET => LinkKind::Ethernet,
            DLT_RAW | DLT_RAW_OPENBSD | LINKTYPE_RAW | LINKTYPE_IPV4 => LinkKind::RawIp,
            LINKTYPE_LINUX_SLL => LinkKind::LinuxSll,
            other => LinkKind::Unsupported(other),
        }
    }
}

impl PcapFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        PcapFileSource {
            path: path.as_ref().to_path_buf(),
            progress: false,
        }
    }

    /// Shows a packet counter on stderr while reading (hidden when not a terminal).
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PacketSource for PcapFileSource {
    fn read_packets(&mut self) -> Result<Vec<PacketRecord>, AnalysisError> {
        debug!("Reading capture file: {}", self.path.display());
        if !self.path.is_file() {
            return Err(AnalysisError::SourceUnavailable(format!(
                "capture file not found: {}",
                self.path.display()
            )));
        }

        let mut cap = Capture::from_file(&self.path).map_err(|e| {
            AnalysisError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let link = LinkKind::from_linktype(cap.get_datalink().0);
        if let LinkKind::Unsupported(linktype) = link {
            warn!("Unsupported link type {}; frames will not be decoded", linktype);
        }

        let progress = self.progress.then(|| reading_spinner(&self.path));
        let mut packets = Vec::new();
        loop {
            match cap.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts;
                    let timestamp = ts.tv_sec as f64 + ts.tv_usec as f64 * 1e-6;
                    packets.push(decode_frame(link, packet.data, timestamp));
                    if let Some(pb) = &progress {
                        if packets.len() % PROGRESS_STEP == 0 {
                            pb.set_position(packets.len() as u64);
                        }
                    }
                }
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => {
                    if let Some(pb) = &progress {
                        pb.abandon();
                    }
                    return Err(AnalysisError::SourceUnavailable(format!(
                        "error reading {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            }
        }

        if let Some(pb) = progress {
            pb.set_position(packets.len() as u64);
            pb.finish_and_clear();
        }

        if packets.is_empty() {
            return Err(AnalysisError::SourceUnavailable(format!(
                "no packets found in {}",
                self.path.display()
            )));
        }
        info!("Read {} packets from {}", packets.len(), self.path.display());
        Ok(packets)
    }
}

fn reading_spinner(path: &Path) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} packets read from {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(path.display().to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn decode_frame(link: LinkKind, data: &[u8], timestamp: f64) -> PacketRecord {
    let layers = match link {
        LinkKind::Ethernet => decode_ethernet(data),
        LinkKind::RawIp => SlicedPacket::from_ip(data)
            .map(|sliced| layers_from_sliced(&sliced))
            .unwrap_or(Layers::Other),
        LinkKind::LinuxSll => SlicedPacket::from_linux_sll(data)
            .map(|sliced| layers_from_sliced(&sliced))
            .unwrap_or(Layers::Other),
        LinkKind::Unsupported(_) => Layers::Other,
    };
    PacketRecord {
        timestamp,
        length: data.len(),
        layers,
    }
}

fn decode_ethernet(data: &[u8]) -> Layers {
    // Layer 2 parsing
    if let Ok(eth) = Ethernet2HeaderSlice::from_slice(data) {
        if eth.ether_type() == EtherType::ARP {
            return decode_arp(&data[eth.slice().len()..])
                .map(Layers::Arp)
                .unwrap_or(Layers::Other);
        }
    }

    match SlicedPacket::from_ethernet(data) {
        Ok(sliced) => layers_from_sliced(&sliced),
        Err(_) => Layers::Other,
    }
}

fn layers_from_sliced(sliced: &SlicedPacket) -> Layers {
    let ip = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            Ipv4Fields {
                source: header.source_addr().to_string(),
                destination: header.destination_addr().to_string(),
                protocol: header.protocol().0,
            }
        }
        _ => return Layers::Other,
    };

    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let fields = TcpFields {
                source_port: tcp.source_port(),
                destination_port: tcp.destination_port(),
                flags: tcp_flags(tcp),
            };
            if is_dns(fields.source_port, fields.destination_port) {
                // DNS over TCP carries a 2-byte length prefix
                let message = tcp.payload().get(2..).unwrap_or(&[]);
                if let Some(query) = dns_question(message) {
                    return Layers::Dns {
                        ip,
                        tcp: Some(fields),
                        query,
                    };
                }
            }
            Layers::Tcp { ip, tcp: fields }
        }
        Some(TransportSlice::Udp(udp)) if is_dns(udp.source_port(), udp.destination_port()) => {
            match dns_question(udp.payload()) {
                Some(query) => Layers::Dns { ip, tcp: None, query },
                None => Layers::Ip { ip },
            }
        }
        _ => Layers::Ip { ip },
    }
}

fn is_dns(source_port: u16, destination_port: u16) -> bool {
    source_port == DNS_PORT || destination_port == DNS_PORT
}

/// Flag letters in bit order, e.g. "S" for SYN or "SA" for SYN+ACK.
fn tcp_flags(tcp: &TcpSlice) -> String {
    [
        (tcp.fin(), 'F'),
        (tcp.syn(), 'S'),
        (tcp.rst(), 'R'),
        (tcp.psh(), 'P'),
        (tcp.ack(), 'A'),
        (tcp.urg(), 'U'),
        (tcp.ece(), 'E'),
        (tcp.cwr(), 'C'),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, letter)| *letter)
    .collect()
}

/// `None` if the payload is not a DNS message, `Some(None)` if it has no
/// usable question, otherwise the first question's name with a trailing dot.
fn dns_question(payload: &[u8]) -> Option<Option<String>> {
    if payload.len() < DNS_HEADER_LEN {
        return None;
    }
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    if qdcount == 0 {
        return Some(None);
    }

    let mut labels = Vec::new();
    let mut pos = DNS_HEADER_LEN;
    let mut name_len = 0;
    loop {
        let len = *payload.get(pos)? as usize;
        if len == 0 {
            break;
        }
        // compression pointers never start a question name
        if len & 0xC0 != 0 {
            return Some(None);
        }
        let label = payload.get(pos + 1..pos + 1 + len)?;
        name_len += len + 1;
        if name_len > DNS_MAX_NAME_LEN {
            return Some(None);
        }
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += len + 1;
    }

    let mut name = labels.join(".");
    name.push('.');
    Some(Some(name))
}

fn decode_arp(payload: &[u8]) -> Option<ArpFields> {
    let hw_len = *payload.get(4)? as usize;
    let proto_len = *payload.get(5)? as usize;
    let operation = u16::from_be_bytes([*payload.get(6)?, *payload.get(7)?]);

    let sender_hw = payload.get(8..8 + hw_len)?;
    let target_start = 8 + hw_len + proto_len;
    let target_hw = payload.get(target_start..target_start + hw_len)?;

    Some(ArpFields {
        sender_hw: format_mac(sender_hw),
        target_hw: format_mac(target_hw),
        operation,
    })
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
