pub mod domain {
    /// IPv4 header fields as handed over by the packet source. Addresses stay
    /// strings here; validation happens during feature extraction.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Ipv4Fields {
        pub source: String,
        pub destination: String,
        pub protocol: u8,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct TcpFields {
        pub source_port: u16,
        pub destination_port: u16,
        pub flags: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ArpFields {
        pub sender_hw: String,
        pub target_hw: String,
        pub operation: u16,
    }

    /// Header layers present in a decoded frame. Decided once by the packet
    /// source so extraction matches instead of probing.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Layers {
        Tcp { ip: Ipv4Fields, tcp: TcpFields },
        Ip { ip: Ipv4Fields },
        /// DNS over UDP (`tcp: None`) or TCP. `query` is `None` when the
        /// message carries no question section.
        Dns {
            ip: Ipv4Fields,
            tcp: Option<TcpFields>,
            query: Option<String>,
        },
        Arp(ArpFields),
        Other,
    }

    impl Layers {
        pub fn ip(&self) -> Option<&Ipv4Fields> {
            match self {
                Layers::Tcp { ip, .. } | Layers::Ip { ip } | Layers::Dns { ip, .. } => Some(ip),
                Layers::Arp(_) | Layers::Other => None,
            }
        }

        pub fn tcp(&self) -> Option<&TcpFields> {
            match self {
                Layers::Tcp { tcp, .. } => Some(tcp),
                Layers::Dns { tcp, .. } => tcp.as_ref(),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct PacketRecord {
        pub timestamp: f64,
        pub length: usize,
        pub layers: Layers,
    }

    impl PacketRecord {
        pub fn tcp(
            timestamp: f64,
            length: usize,
            source: &str,
            destination: &str,
            ports: (u16, u16),
            flags: &str,
        ) -> Self {
            PacketRecord {
                timestamp,
                length,
                layers: Layers::Tcp {
                    ip: Ipv4Fields {
                        source: source.to_string(),
                        destination: destination.to_string(),
                        protocol: 6,
                    },
                    tcp: TcpFields {
                        source_port: ports.0,
                        destination_port: ports.1,
                        flags: flags.to_string(),
                    },
                },
            }
        }

        pub fn ip(
            timestamp: f64,
            length: usize,
            source: &str,
            destination: &str,
            protocol: u8,
        ) -> Self {
            PacketRecord {
                timestamp,
                length,
                layers: Layers::Ip {
                    ip: Ipv4Fields {
                        source: source.to_string(),
                        destination: destination.to_string(),
                        protocol,
                    },
                },
            }
        }
    }

    /// General traffic features, one per valid IPv4 packet.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TrafficRecord {
        pub src_ip: String,
        pub dst_ip: String,
        pub protocol: u8,
        pub protocol_name: String,
        pub size: usize,
        pub timestamp: f64,
        pub src_port: u16,
        pub dst_port: u16,
        pub tcp_flags: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct SecurityRecord {
        pub src_ip: String,
        pub dst_ip: String,
        pub protocol: u8,
        pub dst_port: u16,
        pub tcp_flags: String,
        pub timestamp: f64,
    }

    impl SecurityRecord {
        pub fn is_syn(&self) -> bool {
            self.protocol == 6 && self.tcp_flags.contains('S')
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct DnsRecord {
        pub src_ip: String,
        pub dst_ip: String,
        pub query: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct ArpRecord {
        pub src_mac: String,
        pub dst_mac: String,
        pub operation: u16,
    }
}

pub mod dto {
    use super::domain::TrafficRecord;
    use serde::{Deserialize, Serialize};

    /// One row of the exported traffic table.
    #[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
    pub struct TrafficRow {
        pub src_ip: String,
        pub dst_ip: String,
        pub protocol: String,
        pub size: usize,
        pub time: f64,
        pub src_port: u16,
        pub dst_port: u16,
        pub tcp_flags: String,
    }

    impl From<&TrafficRecord> for TrafficRow {
        fn from(record: &TrafficRecord) -> Self {
            TrafficRow {
                src_ip: record.src_ip.clone(),
                dst_ip: record.dst_ip.clone(),
                protocol: record.protocol_name.clone(),
                size: record.size,
                time: record.timestamp,
                src_port: record.src_port,
                dst_port: record.dst_port,
                tcp_flags: record.tcp_flags.clone(),
            }
        }
    }
}
