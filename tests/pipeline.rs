mod common;

use netlens::detection::Degradation;
use netlens::models::domain::PacketRecord;
use netlens::report::ChartKind;
use netlens::{
    AnalysisError, AnalyzerConfig, NetworkAnalyzer, PacketSource, PcapFileSource, ResultStore,
    Visualization,
};
use tempfile::tempdir;

fn analyzer() -> NetworkAnalyzer {
    NetworkAnalyzer::new(AnalyzerConfig {
        workers: 3,
        ..AnalyzerConfig::default()
    })
}

#[test]
fn analyzes_capture_file_end_to_end() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("mixed.pcap");
    common::write_pcap(&capture, &common::mixed_capture());

    let store = ResultStore::new(dir.path().join("traffic.csv"), dir.path().join("viz.json"));
    let output = analyzer()
        .run("mixed.pcap", &mut PcapFileSource::new(&capture), &store)
        .unwrap();
    let report = &output.report;

    assert_eq!(report.packets_read, 157);
    // the 0.1.2.3 source and the ARP frame are not analyzable
    assert_eq!(report.stats.total_packets, 155);
    assert_eq!(report.dns.len(), 4);
    assert_eq!(report.dns[0].query.as_deref(), Some("example.com."));
    assert_eq!(report.arp.len(), 1);
    assert_eq!(report.arp[0].operation, 1);

    assert_eq!(report.stats.protocols[0].protocol, "TCP");
    assert_eq!(report.stats.protocols[0].count, 150);
    let total: f64 = report.stats.protocols.iter().map(|p| p.percentage).sum();
    assert!((total - 100.0).abs() < 1e-9);

    assert_eq!(report.detections.scans.len(), 1);
    assert_eq!(report.detections.scans[0].src_ip, "10.0.0.66");
    assert_eq!(report.detections.scans[0].distinct_ports, 150);
    assert!(report.detections.floods.is_empty());

    let rows = store.load_traffic().unwrap();
    assert_eq!(rows.len(), 155);
    assert_eq!(rows[0].dst_port, 1);
    assert_eq!(rows[0].tcp_flags, "S");
    assert_eq!(rows[149].dst_port, 150);
    assert_eq!(rows[150].protocol, "UDP");

    let saved: Vec<Visualization> = store.load_visualizations().unwrap();
    assert_eq!(saved, output.visualizations);
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].chart.kind, ChartKind::Line);
    assert_eq!(saved[1].chart.data.labels[0], "0.0");
}

#[test]
fn scan_below_threshold_is_not_flagged() {
    let packets: Vec<PacketRecord> = (0..99u16)
        .map(|port| {
            PacketRecord::tcp(port as f64, 60, "10.0.0.66", "10.0.0.5", (40000, port), "S")
        })
        .collect();
    let report = analyzer().analyze("quiet", &packets).unwrap();
    assert!(report.detections.scans.is_empty());
}

#[test]
fn flood_over_two_seconds_is_flagged() {
    let mut packets: Vec<PacketRecord> = (0..3000)
        .map(|i| {
            let ts = 100.0 + 2.0 * i as f64 / 2999.0;
            PacketRecord::ip(ts, 60, "10.0.0.1", "10.0.0.200", 17)
        })
        .collect();
    packets.push(PacketRecord::ip(101.0, 60, "10.0.0.1", "10.0.0.201", 17));

    let report = analyzer().analyze("flood", &packets).unwrap();
    assert_eq!(report.detections.floods.len(), 1);
    assert_eq!(report.detections.floods[0].dst_ip, "10.0.0.200");
    assert!(report.detections.degradations.is_empty());
}

#[test]
fn zero_span_still_runs_scan_detection() {
    let packets: Vec<PacketRecord> = (0..120u16)
        .map(|port| PacketRecord::tcp(9.0, 60, "10.0.0.66", "10.0.0.5", (40000, port), "S"))
        .collect();
    let report = analyzer().analyze("burst", &packets).unwrap();
    assert_eq!(report.detections.scans.len(), 1);
    assert!(report.detections.floods.is_empty());
    assert_eq!(report.detections.degradations, vec![Degradation::ZeroTimeSpan]);
}

#[test]
fn raw_ip_capture_is_decoded() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("raw.pcap");
    let frames: Vec<(f64, Vec<u8>)> = (1..=120u16)
        .map(|port| {
            let syn = common::raw_tcp_syn([10, 9, 0, 1], [10, 9, 0, 2], 41000, port);
            (50.0 + port as f64 * 0.1, syn)
        })
        .collect();
    common::write_pcap_with_link(&capture, common::LINKTYPE_RAW, &frames);

    let report = analyzer()
        .analyze_source("raw.pcap", &mut PcapFileSource::new(&capture))
        .unwrap();
    assert_eq!(report.stats.total_packets, 120);
    assert_eq!(report.stats.protocols[0].protocol, "TCP");
    assert_eq!(report.detections.scans.len(), 1);
    assert_eq!(report.detections.scans[0].src_ip, "10.9.0.1");
}

#[test]
fn linux_cooked_capture_is_decoded() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("any.pcap");
    let frames = vec![
        (1.0, common::sll_udp([192, 168, 3, 4], [192, 168, 3, 5], 5353, 6000)),
        (2.0, common::sll_udp([192, 168, 3, 5], [192, 168, 3, 4], 6000, 5353)),
    ];
    common::write_pcap_with_link(&capture, common::LINKTYPE_LINUX_SLL, &frames);

    let report = analyzer()
        .analyze_source("any.pcap", &mut PcapFileSource::new(&capture))
        .unwrap();
    assert_eq!(report.stats.total_packets, 2);
    assert_eq!(report.traffic[0].src_ip, "192.168.3.4");
    assert_eq!(report.traffic[1].protocol_name, "UDP");
}

#[test]
fn progress_display_leaves_packets_unchanged() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("mixed.pcap");
    common::write_pcap(&capture, &common::mixed_capture());

    let plain = PcapFileSource::new(&capture).read_packets().unwrap();
    let shown = PcapFileSource::new(&capture)
        .with_progress(true)
        .read_packets()
        .unwrap();
    assert_eq!(plain, shown);
}

#[test]
fn empty_capture_file_is_source_unavailable() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("empty.pcap");
    common::write_pcap(&capture, &[]);

    let result = analyzer().analyze_source("empty.pcap", &mut PcapFileSource::new(&capture));
    assert!(matches!(result, Err(AnalysisError::SourceUnavailable(_))));
}

#[test]
fn arp_only_capture_has_no_analyzable_traffic() {
    let dir = tempdir().unwrap();
    let capture = dir.path().join("arp.pcap");
    let frames = [(1.0, common::arp_request()), (2.0, common::arp_request())];
    common::write_pcap(&capture, &frames);

    let store = ResultStore::new(dir.path().join("traffic.csv"), dir.path().join("viz.json"));
    let result = analyzer().run("arp.pcap", &mut PcapFileSource::new(&capture), &store);
    assert!(matches!(result, Err(AnalysisError::NoAnalyzableTraffic)));
    assert!(!store.traffic_path().exists());
}

#[test]
fn persistence_failure_is_distinct() {
    let dir = tempdir().unwrap();
    let store = ResultStore::new(
        dir.path().join("no-such-dir").join("traffic.csv"),
        dir.path().join("viz.json"),
    );
    let mut packets = vec![PacketRecord::ip(0.0, 60, "10.0.0.1", "10.0.0.2", 6)];
    let result = analyzer().run("unsaved", &mut packets, &store);
    assert!(matches!(result, Err(AnalysisError::Persistence(_))));
}
