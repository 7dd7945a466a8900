use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use tracing::debug;

use crate::models::domain::TrafficRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolShare {
    pub protocol: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostPair {
    pub src_ip: String,
    pub dst_ip: String,
    pub count: usize,
    pub percentage: f64,
}

/// Protocol breakdown of one host pair; `percentage` is relative to the pair's own total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostPairProtocol {
    pub src_ip: String,
    pub dst_ip: String,
    pub protocol: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flow {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficStats {
    pub total_packets: usize,
    pub total_bytes: u64,
    pub protocols: Vec<ProtocolShare>,
    pub host_pairs: Vec<HostPair>,
    pub pair_protocols: Vec<HostPairProtocol>,
    pub flows: Vec<Flow>,
    pub first_seen: Option<f64>,
    pub last_seen: Option<f64>,
}

impl TrafficStats {
    pub fn from_records(records: &[TrafficRecord]) -> Self {
        let mut builder = StatsBuilder::default();
        for record in records {
            builder.update(record);
        }
        builder.finish()
    }

    pub fn time_span(&self) -> f64 {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Counts keyed groups, remembering the order each key first appeared.
struct Groups<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, usize)>,
}

impl<K> Default for Groups<K> {
    fn default() -> Self {
        Groups {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> Groups<K> {
    fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    fn count(&self, key: &K) -> usize {
        self.index.get(key).map_or(0, |&slot| self.entries[slot].1)
    }

    /// Entries by descending count; ties keep first-seen order.
    fn by_count(&self) -> Vec<(K, usize)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

type PairKey = (String, String);
type PairProtocolKey = (String, String, String);
type FlowKey = (String, String, u16, u16, String);

#[derive(Default)]
struct StatsBuilder {
    total_packets: usize,
    total_bytes: u64,
    protocols: Groups<String>,
    pairs: Groups<PairKey>,
    pair_protocols: Groups<PairProtocolKey>,
    flows: Groups<FlowKey>,
    first_seen: Option<f64>,
    last_seen: Option<f64>,
}

impl StatsBuilder {
    fn update(&mut self, record: &TrafficRecord) {
        self.total_packets += 1;
        self.total_bytes += record.size as u64;
        self.protocols.add(record.protocol_name.clone());
        self.pairs.add((record.src_ip.clone(), record.dst_ip.clone()));
        self.pair_protocols.add((
            record.src_ip.clone(),
            record.dst_ip.clone(),
            record.protocol_name.clone(),
        ));
        self.flows.add((
            record.src_ip.clone(),
            record.dst_ip.clone(),
            record.src_port,
            record.dst_port,
            record.protocol_name.clone(),
        ));
        self.first_seen = Some(
            self.first_seen
                .map_or(record.timestamp, |t| t.min(record.timestamp)),
        );
        self.last_seen = Some(
            self.last_seen
                .map_or(record.timestamp, |t| t.max(record.timestamp)),
        );
    }

    fn finish(self) -> TrafficStats {
        let total = self.total_packets;
        let percent = |count: usize, of: usize| {
            if of == 0 {
                0.0
            } else {
                count as f64 / of as f64 * 100.0
            }
        };

        let protocols = self
            .protocols
            .by_count()
            .into_iter()
            .map(|(protocol, count)| ProtocolShare {
                protocol,
                count,
                percentage: percent(count, total),
            })
            .collect();

        let host_pairs = self
            .pairs
            .by_count()
            .into_iter()
            .map(|((src_ip, dst_ip), count)| HostPair {
                src_ip,
                dst_ip,
                count,
                percentage: percent(count, total),
            })
            .collect();

        let mut pair_protocols: Vec<HostPairProtocol> = self
            .pair_protocols
            .entries
            .iter()
            .map(|((src_ip, dst_ip, protocol), count)| {
                let pair_total = self.pairs.count(&(src_ip.clone(), dst_ip.clone()));
                HostPairProtocol {
                    src_ip: src_ip.clone(),
                    dst_ip: dst_ip.clone(),
                    protocol: protocol.clone(),
                    count: *count,
                    percentage: percent(*count, pair_total),
                }
            })
            .collect();
        pair_protocols.sort_by(|a, b| {
            (&a.src_ip, &a.dst_ip, &a.protocol).cmp(&(&b.src_ip, &b.dst_ip, &b.protocol))
        });

        let mut flows: Vec<Flow> = self
            .flows
            .entries
            .into_iter()
            .map(|((src_ip, dst_ip, src_port, dst_port, protocol), count)| Flow {
                src_ip,
                dst_ip,
                src_port,
                dst_port,
                protocol,
                count,
            })
            .collect();
        flows.sort_by(|a, b| {
            b.count.cmp(&a.count).then_with(|| {
                (&a.src_ip, &a.dst_ip, a.src_port, a.dst_port, &a.protocol)
                    .cmp(&(&b.src_ip, &b.dst_ip, b.src_port, b.dst_port, &b.protocol))
            })
        });

        debug!(
            "Aggregated {} packets, {} bytes, {} protocols, {} host pairs, {} flows",
            total,
            self.total_bytes,
            self.protocols.entries.len(),
            self.pairs.entries.len(),
            flows.len()
        );

        TrafficStats {
            total_packets: total,
            total_bytes: self.total_bytes,
            protocols,
            host_pairs,
            pair_protocols,
            flows,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        src: &str,
        dst: &str,
        protocol: &str,
        ports: (u16, u16),
        size: usize,
        ts: f64,
    ) -> TrafficRecord {
        TrafficRecord {
            src_ip: src.into(),
            dst_ip: dst.into(),
            protocol: 0,
            protocol_name: protocol.into(),
            size,
            timestamp: ts,
            src_port: ports.0,
            dst_port: ports.1,
            tcp_flags: String::new(),
        }
    }

    fn sample() -> Vec<TrafficRecord> {
        let mut records = Vec::new();
        // pair A->B: 5 packets, pair C->D: 1 packet, pair E->F: 3 packets
        for i in 0..5 {
            let protocol = if i < 3 { "TCP" } else { "UDP" };
            records.push(record("10.0.0.1", "10.0.0.2", protocol, (1000, 80), 100, i as f64));
        }
        records.push(record("10.0.0.3", "10.0.0.4", "ICMP", (0, 0), 50, 2.5));
        for i in 0..3 {
            records.push(record("10.0.0.5", "10.0.0.6", "UDP", (5000 + i, 53), 70, 3.0));
        }
        records
    }

    #[test]
    fn protocol_percentages_sum_to_100() {
        let stats = TrafficStats::from_records(&sample());
        let sum: f64 = stats.protocols.iter().map(|p| p.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(stats.protocols[0].protocol, "UDP");
        assert_eq!(stats.protocols[0].count, 5);
        assert_eq!(stats.total_packets, 9);
        assert_eq!(stats.total_bytes, 5 * 100 + 50 + 3 * 70);
    }

    #[test]
    fn host_pairs_sorted_by_descending_count() {
        let stats = TrafficStats::from_records(&sample());
        let counts: Vec<usize> = stats.host_pairs.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![5, 3, 1]);
        assert!((stats.host_pairs[0].percentage - 5.0 / 9.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn host_pair_ties_keep_first_seen_order() {
        let records = vec![
            record("10.0.0.9", "10.0.0.1", "TCP", (1, 2), 60, 0.0),
            record("10.0.0.1", "10.0.0.9", "TCP", (1, 2), 60, 0.0),
        ];
        let stats = TrafficStats::from_records(&records);
        assert_eq!(stats.host_pairs[0].src_ip, "10.0.0.9");
        assert_eq!(stats.host_pairs[1].src_ip, "10.0.0.1");
    }

    #[test]
    fn pair_protocol_shares_sum_to_100_per_pair() {
        let stats = TrafficStats::from_records(&sample());
        let mut sums: HashMap<(String, String), f64> = HashMap::new();
        for share in &stats.pair_protocols {
            *sums
                .entry((share.src_ip.clone(), share.dst_ip.clone()))
                .or_insert(0.0) += share.percentage;
        }
        assert_eq!(sums.len(), 3);
        for sum in sums.values() {
            assert!((sum - 100.0).abs() < 1e-9);
        }
        let tcp = stats
            .pair_protocols
            .iter()
            .find(|s| s.src_ip == "10.0.0.1" && s.protocol == "TCP")
            .unwrap();
        assert!((tcp.percentage - 60.0).abs() < 1e-9);
    }

    #[test]
    fn flows_keyed_by_five_tuple() {
        let stats = TrafficStats::from_records(&sample());
        // A->B splits into a TCP and a UDP flow; E->F has three distinct source ports
        assert_eq!(stats.flows.len(), 2 + 1 + 3);
        assert_eq!(stats.flows[0].count, 3);
        assert_eq!(stats.flows[0].protocol, "TCP");
        assert_eq!(stats.flows.iter().map(|f| f.count).sum::<usize>(), 9);
    }

    #[test]
    fn tracks_time_bounds_out_of_order() {
        let records = vec![
            record("10.0.0.1", "10.0.0.2", "TCP", (1, 2), 60, 5.0),
            record("10.0.0.1", "10.0.0.2", "TCP", (1, 2), 60, 1.0),
            record("10.0.0.1", "10.0.0.2", "TCP", (1, 2), 60, 3.0),
        ];
        let stats = TrafficStats::from_records(&records);
        assert_eq!(stats.first_seen, Some(1.0));
        assert_eq!(stats.last_seen, Some(5.0));
        assert_eq!(stats.time_span(), 4.0);
    }

    #[test]
    fn empty_input_is_empty_stats() {
        let stats = TrafficStats::from_records(&[]);
        assert_eq!(stats.total_packets, 0);
        assert!(stats.protocols.is_empty());
        assert_eq!(stats.time_span(), 0.0);
    }
}
