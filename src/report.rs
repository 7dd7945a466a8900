use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::detection::Detections;
use crate::models::domain::{ArpRecord, DnsRecord, TrafficRecord};
use crate::models::dto::TrafficRow;
use crate::stats::TrafficStats;

const TOP_N: usize = 10;
const GIGA: f64 = 1e9;
const MEGA: f64 = 1e6;
const PALETTE: [&str; 5] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd"];

/// Everything one pipeline run derived from a capture.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub capture: String,
    pub packets_read: usize,
    pub traffic: Vec<TrafficRecord>,
    pub security_records: usize,
    pub dns: Vec<DnsRecord>,
    pub arp: Vec<ArpRecord>,
    pub stats: TrafficStats,
    pub detections: Detections,
    /// IP to country, filled only when a geolocator is enabled.
    pub locations: BTreeMap<String, String>,
}

impl AnalysisReport {
    pub fn rows(&self) -> Vec<TrafficRow> {
        self.traffic.iter().map(TrafficRow::from).collect()
    }

    pub fn visualizations(&self) -> Vec<Visualization> {
        build_visualizations(&self.stats, &self.traffic, &self.capture)
    }

    pub fn summary(&self) -> String {
        render_summary(self)
    }
}

// Chart.js-shaped visualization export

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub id: String,
    pub chart: Chart,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub data: ChartData,
    pub options: ChartOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Vec<String>>,
    pub border_color: Colors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Colors {
    Single(String),
    Palette(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub scales: Scales,
    pub plugins: Plugins,
    pub responsive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scales {
    pub x: Axis,
    pub y: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_at_zero: Option<bool>,
    pub title: Title,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugins {
    pub title: Title,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub display: bool,
    pub text: String,
}

impl Title {
    fn shown(text: impl Into<String>) -> Self {
        Title {
            display: true,
            text: text.into(),
        }
    }
}

fn options(x_title: &str, y_title: &str, y_from_zero: bool, chart_title: String) -> ChartOptions {
    ChartOptions {
        scales: Scales {
            x: Axis {
                begin_at_zero: None,
                title: Title::shown(x_title),
            },
            y: Axis {
                begin_at_zero: y_from_zero.then_some(true),
                title: Title::shown(y_title),
            },
        },
        plugins: Plugins {
            title: Title::shown(chart_title),
        },
        responsive: true,
    }
}

/// Protocol distribution bar chart plus, when any timestamps exist, a
/// bytes-per-timestamp line chart relative to the first packet.
pub fn build_visualizations(
    stats: &TrafficStats,
    traffic: &[TrafficRecord],
    capture: &str,
) -> Vec<Visualization> {
    debug!("Generating visualizations");
    let palette: Vec<String> = PALETTE.iter().map(|c| c.to_string()).collect();

    let bar = Chart {
        kind: ChartKind::Bar,
        data: ChartData {
            labels: stats.protocols.iter().map(|p| p.protocol.clone()).collect(),
            datasets: vec![Dataset {
                label: "Protocol Distribution".to_string(),
                data: stats.protocols.iter().map(|p| p.percentage).collect(),
                background_color: Some(palette.clone()),
                border_color: Colors::Palette(palette),
                border_width: Some(1),
                fill: None,
            }],
        },
        options: options(
            "Protocol",
            "Percentage",
            true,
            format!("Protocol Distribution ({})", capture),
        ),
    };

    let mut visualizations = vec![Visualization {
        id: Uuid::new_v4().to_string(),
        chart: bar,
        title: "Protocol Distribution".to_string(),
    }];

    let timeline = bytes_per_timestamp(traffic);
    match timeline.first() {
        Some(&(start, _)) => {
            let line = Chart {
                kind: ChartKind::Line,
                data: ChartData {
                    labels: timeline.iter().map(|(t, _)| axis_seconds(t - start)).collect(),
                    datasets: vec![Dataset {
                        label: "Packet Size Over Time".to_string(),
                        data: timeline.iter().map(|(_, bytes)| *bytes as f64).collect(),
                        background_color: None,
                        border_color: Colors::Single(PALETTE[0].to_string()),
                        border_width: None,
                        fill: Some(false),
                    }],
                },
                options: options(
                    "Time (seconds)",
                    "Packet Size (bytes)",
                    false,
                    format!("Packet Size Over Time ({})", capture),
                ),
            };
            visualizations.push(Visualization {
                id: Uuid::new_v4().to_string(),
                chart: line,
                title: "Packet Size Over Time".to_string(),
            });
        }
        None => warn!("No time-series data available for visualization"),
    }

    visualizations
}

/// Total frame bytes per distinct timestamp, ascending by time.
fn bytes_per_timestamp(traffic: &[TrafficRecord]) -> Vec<(f64, u64)> {
    let mut points: Vec<(f64, u64)> = traffic
        .iter()
        .map(|r| (r.timestamp, r.size as u64))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, u64)> = Vec::with_capacity(points.len());
    for (time, bytes) in points {
        match merged.last_mut() {
            Some(last) if last.0 == time => last.1 += bytes,
            _ => merged.push((time, bytes)),
        }
    }
    merged
}

/// Seconds rounded to two decimals, always with a fractional part ("0.0", "1.25").
fn axis_seconds(seconds: f64) -> String {
    let rounded = (seconds * 100.0).round() / 100.0;
    let label = rounded.to_string();
    if label.contains('.') {
        label
    } else {
        format!("{}.0", label)
    }
}

pub fn format_bandwidth(total_bytes: u64) -> String {
    let bytes = total_bytes as f64;
    if bytes < GIGA {
        format!("{:.2} Mbps", bytes / MEGA)
    } else {
        format!("{:.2} Gbps", bytes / GIGA)
    }
}

fn format_instant(seconds: f64) -> String {
    let secs = seconds.floor();
    let nanos = ((seconds - secs) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| format!("{:.6}", seconds))
}

/// Grid table with a `=` rule under the header; numeric columns right aligned.
fn grid(headers: &[&str], numeric: &[bool], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let rule = |fill: char| {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&fill.to_string().repeat(width + 2));
            line.push('+');
        }
        line
    };
    let line = |cells: &[String], align_numbers: bool| {
        let mut out = String::from("|");
        for (i, cell) in cells.iter().enumerate() {
            if align_numbers && numeric[i] {
                let _ = write!(out, " {:>width$} |", cell, width = widths[i]);
            } else {
                let _ = write!(out, " {:<width$} |", cell, width = widths[i]);
            }
        }
        out
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut out = vec![rule('-'), line(&header_cells, false), rule('=')];
    for row in rows {
        out.push(line(row, true));
        out.push(rule('-'));
    }
    if rows.is_empty() {
        out.push(rule('-'));
    }
    out.join("\n")
}

fn pct(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn render_summary(report: &AnalysisReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();

    let _ = writeln!(out, "Analysis for {}", report.capture);
    let _ = writeln!(
        out,
        "Packets read: {} ({} analyzable IPv4, {} DNS, {} ARP)",
        report.packets_read,
        stats.total_packets,
        report.dns.len(),
        report.arp.len()
    );
    if let (Some(first), Some(last)) = (stats.first_seen, stats.last_seen) {
        let _ = writeln!(
            out,
            "Capture window: {} -> {} ({:.2} s)",
            format_instant(first),
            format_instant(last),
            stats.time_span()
        );
    }
    let _ = writeln!(out, "Total bandwidth used: {}", format_bandwidth(stats.total_bytes));

    let _ = writeln!(out, "\nProtocol Distribution:\n");
    let rows: Vec<Vec<String>> = stats
        .protocols
        .iter()
        .map(|p| vec![p.protocol.clone(), p.count.to_string(), pct(p.percentage)])
        .collect();
    let table = grid(
        &["Protocol", "Count", "Percentage"],
        &[false, true, true],
        &rows,
    );
    let _ = writeln!(out, "{}", table);

    let _ = writeln!(out, "\nTop IP Address Communications (Top {}):\n", TOP_N);
    let rows: Vec<Vec<String>> = stats
        .host_pairs
        .iter()
        .take(TOP_N)
        .map(|p| vec![p.src_ip.clone(), p.dst_ip.clone(), p.count.to_string(), pct(p.percentage)])
        .collect();
    let _ = writeln!(
        out,
        "{}",
        grid(
            &["Source IP", "Destination IP", "Count", "Percentage"],
            &[false, false, true, true],
            &rows
        )
    );

    let _ = writeln!(out, "\nShare of Protocols Between IPs (Top {}):\n", TOP_N);
    let rows: Vec<Vec<String>> = stats
        .pair_protocols
        .iter()
        .take(TOP_N)
        .map(|p| {
            vec![
                p.src_ip.clone(),
                p.dst_ip.clone(),
                p.protocol.clone(),
                p.count.to_string(),
                pct(p.percentage),
            ]
        })
        .collect();
    let _ = writeln!(
        out,
        "{}",
        grid(
            &["Source IP", "Destination IP", "Protocol", "Count", "Percentage"],
            &[false, false, false, true, true],
            &rows
        )
    );

    let _ = writeln!(out, "\nFlow Analysis (Top {} Flows):\n", TOP_N);
    let rows: Vec<Vec<String>> = stats
        .flows
        .iter()
        .take(TOP_N)
        .map(|f| {
            vec![
                f.src_ip.clone(),
                f.dst_ip.clone(),
                f.src_port.to_string(),
                f.dst_port.to_string(),
                f.protocol.clone(),
                f.count.to_string(),
            ]
        })
        .collect();
    let _ = writeln!(
        out,
        "{}",
        grid(
            &[
                "Source IP",
                "Destination IP",
                "Source Port",
                "Destination Port",
                "Protocol",
                "Count",
            ],
            &[false, false, true, true, false, true],
            &rows
        )
    );

    let _ = writeln!(out, "\nSecurity Findings:\n");
    let activities = report.detections.activities();
    if activities.is_empty() {
        let _ = writeln!(out, "No suspicious activity detected.");
    }
    for activity in &activities {
        let _ = writeln!(
            out,
            "{} - {} - {}",
            activity.activity_type, activity.source, activity.details
        );
    }
    for degradation in &report.detections.degradations {
        let _ = writeln!(out, "Note: {}", degradation);
    }

    out
}
