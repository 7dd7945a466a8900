#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use etherparse::PacketBuilder;

const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW: u32 = 101;
pub const LINKTYPE_LINUX_SLL: u32 = 113;

pub const FORM_BOUNDARY: &str = "netlens-test-boundary";

/// Writes a classic little-endian pcap file with an Ethernet link type.
pub fn write_pcap(path: &Path, frames: &[(f64, Vec<u8>)]) {
    write_pcap_with_link(path, LINKTYPE_ETHERNET, frames);
}

pub fn write_pcap_with_link(path: &Path, linktype: u32, frames: &[(f64, Vec<u8>)]) {
    let mut file = File::create(path).unwrap();
    let mut header = Vec::with_capacity(24);
    header.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&4u16.to_le_bytes());
    header.extend_from_slice(&0i32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&65535u32.to_le_bytes());
    header.extend_from_slice(&linktype.to_le_bytes());
    file.write_all(&header).unwrap();

    for (timestamp, frame) in frames {
        let secs = timestamp.floor();
        let micros = ((timestamp - secs) * 1e6).round() as u32;
        let mut record = Vec::with_capacity(16 + frame.len());
        record.extend_from_slice(&(secs as u32).to_le_bytes());
        record.extend_from_slice(&micros.to_le_bytes());
        record.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        record.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        record.extend_from_slice(frame);
        file.write_all(&record).unwrap();
    }
}

pub fn tcp_syn(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .tcp(src_port, dst_port, 1, 1024)
        .syn();
    let mut frame = Vec::new();
    builder.write(&mut frame, &[]).unwrap();
    frame
}

/// A bare IPv4 SYN, as stored under LINKTYPE_RAW.
pub fn raw_tcp_syn(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    let builder = PacketBuilder::ipv4(src, dst, 64)
        .tcp(src_port, dst_port, 1, 1024)
        .syn();
    let mut packet = Vec::new();
    builder.write(&mut packet, &[]).unwrap();
    packet
}

/// A Linux cooked (SLL) header in front of an IPv4 UDP datagram.
pub fn sll_udp(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut frame = vec![0x00, 0x04, 0x00, 0x01, 0x00, 0x06];
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&[0x00, 0x00, 0x08, 0x00]);
    let builder = PacketBuilder::ipv4(src, dst, 64).udp(src_port, dst_port);
    builder.write(&mut frame, &[0; 8]).unwrap();
    frame
}

pub fn udp(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .udp(src_port, dst_port);
    let mut frame = Vec::new();
    builder.write(&mut frame, payload).unwrap();
    frame
}

pub fn dns_query(name: &str) -> Vec<u8> {
    let mut msg = vec![0xbe, 0xef, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
    for label in name.split('.') {
        msg.push(label.len() as u8);
        msg.extend_from_slice(label.as_bytes());
    }
    msg.extend_from_slice(&[0, 0x00, 0x01, 0x00, 0x01]);
    msg
}

pub fn arp_request() -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&[0xff; 6]);
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&[0x08, 0x06]);
    frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&[192, 168, 1, 1]);
    frame.extend_from_slice(&[0; 6]);
    frame.extend_from_slice(&[192, 168, 1, 254]);
    frame
}

/// A small mixed capture: a 150-port SYN scan, DNS lookups, UDP noise and one ARP request.
pub fn mixed_capture() -> Vec<(f64, Vec<u8>)> {
    let mut frames = Vec::new();
    for port in 1..=150u16 {
        let syn = tcp_syn([10, 0, 0, 66], [10, 0, 0, 5], 40000, port);
        frames.push((1_700_000_000.0 + port as f64 * 0.01, syn));
    }
    for i in 0..4u16 {
        frames.push((
            1_700_000_001.0 + i as f64,
            udp([10, 0, 0, 7], [8, 8, 8, 8], 50000 + i, 53, &dns_query("example.com")),
        ));
    }
    frames.push((1_700_000_003.0, udp([10, 0, 0, 7], [10, 0, 0, 8], 6000, 7000, &[0; 32])));
    frames.push((1_700_000_003.5, udp([0, 1, 2, 3], [10, 0, 0, 8], 6000, 7000, &[0; 32])));
    frames.push((1_700_000_004.0, arp_request()));
    frames
}

/// A `multipart/form-data` body with a single file part.
pub fn form_upload(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: application/vnd.tcpdump.pcap\r\n\r\n",
        FORM_BOUNDARY, field, filename
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", FORM_BOUNDARY).as_bytes());
    body
}
