use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::capture::PacketSource;
use crate::config::AnalyzerConfig;
use crate::detection::TrafficAnalyzer;
use crate::error::AnalysisError;
use crate::extract;
use crate::models::domain::{PacketRecord, TrafficRecord};
use crate::protocols::{self, ProtocolMap};
use crate::report::{AnalysisReport, Visualization};
use crate::stats::TrafficStats;
use crate::store::ResultStore;

/// Hook for IP geolocation of the traffic table.
pub trait GeoLocator: Send + Sync {
    fn locate(&self, ip: &str) -> Option<String>;

    fn enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGeoLocator;

impl GeoLocator for DisabledGeoLocator {
    fn locate(&self, _ip: &str) -> Option<String> {
        None
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// Result of a persisted run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: AnalysisReport,
    pub visualizations: Vec<Visualization>,
}

pub struct NetworkAnalyzer {
    config: AnalyzerConfig,
    protocols: &'static ProtocolMap,
    detector: TrafficAnalyzer,
    geo: Box<dyn GeoLocator>,
}

impl NetworkAnalyzer {
    /// Uses the process-wide protocol table.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_protocols(config, protocols::global())
    }

    pub fn with_protocols(config: AnalyzerConfig, protocols: &'static ProtocolMap) -> Self {
        let detector =
            TrafficAnalyzer::new(config.port_scan_threshold, config.flood_rate_threshold);
        NetworkAnalyzer {
            config,
            protocols,
            detector,
            geo: Box::new(DisabledGeoLocator),
        }
    }

    pub fn with_geolocator(mut self, geo: Box<dyn GeoLocator>) -> Self {
        self.geo = geo;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Reads the source and analyzes everything it yields.
    pub fn analyze_source<S: PacketSource>(
        &self,
        capture: &str,
        source: &mut S,
    ) -> Result<AnalysisReport, AnalysisError> {
        let packets = source.read_packets()?;
        self.analyze(capture, &packets)
    }

    pub fn analyze(
        &self,
        capture: &str,
        packets: &[PacketRecord],
    ) -> Result<AnalysisReport, AnalysisError> {
        debug!("Starting analysis pipeline for {}", capture);
        if packets.is_empty() {
            return Err(AnalysisError::SourceUnavailable(format!(
                "no packets found in {}",
                capture
            )));
        }

        let features = extract::extract_analyzable(packets, self.protocols, self.config.workers)?;
        let stats = TrafficStats::from_records(&features.traffic);
        let detections = self.detector.detect_suspicious_traffic(&features.security);
        let locations = self.locate_hosts(&features.traffic);

        info!(
            "Analyzed {}: {} packets, {} IPv4 records, {} scan alerts, {} flood alerts",
            capture,
            packets.len(),
            features.traffic.len(),
            detections.scans.len(),
            detections.floods.len()
        );

        Ok(AnalysisReport {
            capture: capture.to_string(),
            packets_read: packets.len(),
            security_records: features.security.len(),
            traffic: features.traffic,
            dns: features.dns,
            arp: features.arp,
            stats,
            detections,
            locations,
        })
    }

    /// Analyzes, then writes the traffic table and visualizations through `store`.
    pub fn run<S: PacketSource>(
        &self,
        capture: &str,
        source: &mut S,
        store: &ResultStore,
    ) -> Result<RunOutput, AnalysisError> {
        let report = self.analyze_source(capture, source)?;
        store.store_traffic(&report.rows())?;
        let visualizations = report.visualizations();
        store.store_visualizations(&visualizations)?;
        Ok(RunOutput {
            report,
            visualizations,
        })
    }

    fn locate_hosts(&self, traffic: &[TrafficRecord]) -> BTreeMap<String, String> {
        let mut locations = BTreeMap::new();
        if !self.geo.enabled() {
            debug!("Geolocation not enabled");
            return locations;
        }
        for record in traffic {
            for ip in [&record.src_ip, &record.dst_ip] {
                if locations.contains_key(ip) {
                    continue;
                }
                if let Some(country) = self.geo.locate(ip) {
                    locations.insert(ip.clone(), country);
                }
            }
        }
        locations
    }
}
