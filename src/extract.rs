use std::thread;

use crossbeam_channel::unbounded;
use tracing::{debug, trace, warn};

use crate::error::AnalysisError;
use crate::models::domain::{
    ArpRecord, DnsRecord, Ipv4Fields, Layers, PacketRecord, SecurityRecord, TrafficRecord,
};
use crate::protocols::ProtocolMap;

/// Everything derived from one pass over the packet list, in packet order.
#[derive(Debug, Default, Clone)]
pub struct Features {
    pub traffic: Vec<TrafficRecord>,
    pub security: Vec<SecurityRecord>,
    pub dns: Vec<DnsRecord>,
    pub arp: Vec<ArpRecord>,
}

impl Features {
    fn append(&mut self, mut other: Features) {
        self.traffic.append(&mut other.traffic);
        self.security.append(&mut other.security);
        self.dns.append(&mut other.dns);
        self.arp.append(&mut other.arp);
    }
}

/// Dotted-quad check: four decimal octets of one to three digits, each <= 255.
pub fn is_valid_ipv4(addr: &str) -> bool {
    let mut octets = 0;
    for part in addr.split('.') {
        octets += 1;
        if octets > 4
            || part.is_empty()
            || part.len() > 3
            || !part.bytes().all(|b| b.is_ascii_digit())
        {
            return false;
        }
        match part.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => return false,
        }
    }
    octets == 4
}

/// Both addresses must be valid dotted quads and the source must not sit in `0.0.0.0/8`.
pub fn is_analyzable(ip: &Ipv4Fields) -> bool {
    is_valid_ipv4(&ip.source)
        && is_valid_ipv4(&ip.destination)
        && !ip.source.split('.').next().is_some_and(|first| first.parse::<u16>() == Ok(0))
}

fn valid_ip(packet: &PacketRecord) -> Option<&Ipv4Fields> {
    let ip = packet.layers.ip()?;
    if is_analyzable(ip) {
        Some(ip)
    } else {
        trace!("Skipping packet with invalid IPs: {} -> {}", ip.source, ip.destination);
        None
    }
}

pub fn extract_traffic(packet: &PacketRecord, protocols: &ProtocolMap) -> Option<TrafficRecord> {
    let ip = valid_ip(packet)?;
    let tcp = packet.layers.tcp();
    Some(TrafficRecord {
        src_ip: ip.source.clone(),
        dst_ip: ip.destination.clone(),
        protocol: ip.protocol,
        protocol_name: protocols.name(ip.protocol),
        size: packet.length,
        timestamp: packet.timestamp,
        src_port: tcp.map_or(0, |t| t.source_port),
        dst_port: tcp.map_or(0, |t| t.destination_port),
        tcp_flags: tcp.map(|t| t.flags.clone()).unwrap_or_default(),
    })
}

pub fn extract_security(packet: &PacketRecord) -> Option<SecurityRecord> {
    let ip = valid_ip(packet)?;
    let tcp = packet.layers.tcp();
    Some(SecurityRecord {
        src_ip: ip.source.clone(),
        dst_ip: ip.destination.clone(),
        protocol: ip.protocol,
        dst_port: tcp.map_or(0, |t| t.destination_port),
        tcp_flags: tcp.map(|t| t.flags.clone()).unwrap_or_default(),
        timestamp: packet.timestamp,
    })
}

pub fn extract_dns(packet: &PacketRecord) -> Option<DnsRecord> {
    match &packet.layers {
        Layers::Dns {
            ip,
            query: Some(query),
            ..
        } => Some(DnsRecord {
            src_ip: ip.source.clone(),
            dst_ip: ip.destination.clone(),
            query: Some(query.clone()),
        }),
        _ => None,
    }
}

pub fn extract_arp(packet: &PacketRecord) -> Option<ArpRecord> {
    match &packet.layers {
        Layers::Arp(arp) => Some(ArpRecord {
            src_mac: arp.sender_hw.clone(),
            dst_mac: arp.target_hw.clone(),
            operation: arp.operation,
        }),
        _ => None,
    }
}

fn extract_chunk(packets: &[PacketRecord], protocols: &ProtocolMap) -> Features {
    let mut features = Features::default();
    for packet in packets {
        if let Some(record) = extract_traffic(packet, protocols) {
            features.traffic.push(record);
        }
        if let Some(record) = extract_security(packet) {
            features.security.push(record);
        }
        if let Some(record) = extract_dns(packet) {
            features.dns.push(record);
        }
        if let Some(record) = extract_arp(packet) {
            features.arp.push(record);
        }
    }
    features
}

/// Splits the packets across `workers` threads and reassembles the results in
/// packet order.
pub fn extract_all(packets: &[PacketRecord], protocols: &ProtocolMap, workers: usize) -> Features {
    let workers = workers.clamp(1, packets.len().max(1));
    let chunk_size = packets.len().div_ceil(workers).max(1);
    debug!("Extracting features from {} packets on {} workers", packets.len(), workers);

    let (tx, rx) = unbounded();
    thread::scope(|scope| {
        for (index, chunk) in packets.chunks(chunk_size).enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let features = extract_chunk(chunk, protocols);
                tx.send((index, features))
                    .unwrap_or_else(|e| warn!("Channel error: {}", e));
            });
        }
    });
    drop(tx);

    let mut parts: Vec<(usize, Features)> = rx.iter().collect();
    parts.sort_by_key(|(index, _)| *index);

    let mut features = Features::default();
    for (_, part) in parts {
        features.append(part);
    }
    debug!(
        "Extracted {} traffic, {} security, {} DNS, {} ARP records",
        features.traffic.len(),
        features.security.len(),
        features.dns.len(),
        features.arp.len()
    );
    features
}

/// Extraction with the pipeline's terminal check applied.
pub fn extract_analyzable(
    packets: &[PacketRecord],
    protocols: &ProtocolMap,
    workers: usize,
) -> Result<Features, AnalysisError> {
    let features = extract_all(packets, protocols, workers);
    if features.traffic.is_empty() {
        return Err(AnalysisError::NoAnalyzableTraffic);
    }
    Ok(features)
}
