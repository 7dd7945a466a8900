use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic;
use std::thread;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::domain::SecurityRecord;

pub const DEFAULT_PORT_SCAN_THRESHOLD: usize = 100;
pub const DEFAULT_FLOOD_RATE_THRESHOLD: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanAlert {
    pub src_ip: String,
    pub distinct_ports: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodAlert {
    pub dst_ip: String,
    pub packets: usize,
    /// Packets per second averaged over the whole capture span.
    pub rate: f64,
}

/// Conditions that reduce detection coverage without failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Degradation {
    NoSecurityRecords,
    ZeroTimeSpan,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::NoSecurityRecords => {
                write!(f, "no valid IP packets available for security analysis")
            }
            Degradation::ZeroTimeSpan => {
                write!(f, "capture time span is zero, flood detection skipped")
            }
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SuspiciousActivity {
    pub activity_type: String,
    pub source: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Detections {
    pub scans: Vec<ScanAlert>,
    pub floods: Vec<FloodAlert>,
    pub degradations: Vec<Degradation>,
}

impl Detections {
    pub fn activities(&self) -> Vec<SuspiciousActivity> {
        let scans = self.scans.iter().map(|scan| SuspiciousActivity {
            activity_type: "Port Scanning".to_string(),
            source: scan.src_ip.clone(),
            details: format!("SYN probes to {} distinct destination ports", scan.distinct_ports),
        });
        let floods = self.floods.iter().map(|flood| SuspiciousActivity {
            activity_type: "Potential DDoS Target".to_string(),
            source: flood.dst_ip.clone(),
            details: format!("{} packets at {:.2} packets/sec", flood.packets, flood.rate),
        });
        scans.chain(floods).collect()
    }
}

#[derive(Debug, Clone)]
pub struct TrafficAnalyzer {
    port_scan_threshold: usize,
    flood_rate_threshold: f64,
}

impl Default for TrafficAnalyzer {
    fn default() -> Self {
        TrafficAnalyzer::new(DEFAULT_PORT_SCAN_THRESHOLD, DEFAULT_FLOOD_RATE_THRESHOLD)
    }
}

impl TrafficAnalyzer {
    pub fn new(port_scan_threshold: usize, flood_rate_threshold: f64) -> Self {
        Self {
            port_scan_threshold,
            flood_rate_threshold,
        }
    }

    /// Runs both heuristics side by side. An empty record set is reported as
    /// degraded coverage, never as an error.
    pub fn detect_suspicious_traffic(&self, records: &[SecurityRecord]) -> Detections {
        if records.is_empty() {
            warn!("No valid IP packets found for security analysis");
            return Detections {
                degradations: vec![Degradation::NoSecurityRecords],
                ..Detections::default()
            };
        }

        let (scans, floods) = thread::scope(|scope| {
            let scans = scope.spawn(|| self.detect_port_scanning(records));
            let floods = self.detect_floods(records);
            match scans.join() {
                Ok(scans) => (scans, floods),
                Err(payload) => panic::resume_unwind(payload),
            }
        });

        let mut detections = Detections {
            scans,
            ..Detections::default()
        };
        match floods {
            Some(floods) => detections.floods = floods,
            None => detections.degradations.push(Degradation::ZeroTimeSpan),
        }
        detections
    }

    /// Sources whose TCP SYNs reach at least `port_scan_threshold` distinct
    /// destination ports. Repeated SYNs to one port count once.
    pub fn detect_port_scanning(&self, records: &[SecurityRecord]) -> Vec<ScanAlert> {
        debug!("Detecting port scanning");
        let mut ports_by_source: HashMap<&str, HashSet<u16>> = HashMap::new();
        for record in records.iter().filter(|r| r.is_syn()) {
            ports_by_source
                .entry(record.src_ip.as_str())
                .or_default()
                .insert(record.dst_port);
        }

        let mut scanners: Vec<ScanAlert> = ports_by_source
            .into_iter()
            .filter(|(_, ports)| ports.len() >= self.port_scan_threshold)
            .map(|(src_ip, ports)| ScanAlert {
                src_ip: src_ip.to_string(),
                distinct_ports: ports.len(),
            })
            .collect();
        scanners.sort_by(|a, b| {
            b.distinct_ports
                .cmp(&a.distinct_ports)
                .then_with(|| a.src_ip.cmp(&b.src_ip))
        });

        if !scanners.is_empty() {
            let sources: Vec<&str> = scanners.iter().map(|s| s.src_ip.as_str()).collect();
            warn!("Potential port scanners: {}", sources.join(", "));
        }
        debug!("Found {} potential scanners", scanners.len());
        scanners
    }

    /// Destinations whose average packet rate over the capture span exceeds
    /// `flood_rate_threshold`. Returns `None` when the span is zero.
    pub fn detect_floods(&self, records: &[SecurityRecord]) -> Option<Vec<FloodAlert>> {
        debug!("Detecting DDoS activity");
        let (min, max) = records.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), r| {
            (min.min(r.timestamp), max.max(r.timestamp))
        });
        let span = max - min;
        if span <= 0.0 {
            debug!("Time span is zero, skipping DDoS detection");
            return None;
        }

        let mut per_destination: HashMap<&str, usize> = HashMap::new();
        for record in records {
            *per_destination.entry(record.dst_ip.as_str()).or_insert(0) += 1;
        }

        let mut targets: Vec<FloodAlert> = per_destination
            .into_iter()
            .map(|(dst_ip, packets)| FloodAlert {
                dst_ip: dst_ip.to_string(),
                packets,
                rate: packets as f64 / span,
            })
            .filter(|alert| alert.rate > self.flood_rate_threshold)
            .collect();
        targets.sort_by(|a, b| b.packets.cmp(&a.packets).then_with(|| a.dst_ip.cmp(&b.dst_ip)));

        if !targets.is_empty() {
            let destinations: Vec<&str> = targets.iter().map(|t| t.dst_ip.as_str()).collect();
            warn!("Potential DDoS targets: {}", destinations.join(", "));
        }
        debug!("Found {} potential DDoS targets", targets.len());
        Some(targets)
    }
}
