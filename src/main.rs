use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use tracing::error;

use netlens::{logging, protocols, AnalyzerConfig, NetworkAnalyzer, PcapFileSource, ResultStore};

/// Analyze network traffic from PCAP files.
#[derive(Parser, Debug)]
#[command(name = "netlens", version, about)]
struct Cli {
    /// Capture file(s) to analyze (pcap or pcapng)
    #[arg(required = true, value_name = "PCAP")]
    pcap_files: Vec<PathBuf>,

    /// Distinct SYN-probed ports that flag a source as a scanner
    #[arg(long)]
    port_scan_threshold: Option<usize>,

    /// Packets per second to one destination that flag a flood
    #[arg(long)]
    flood_rate_threshold: Option<f64>,

    /// Traffic table output (CSV)
    #[arg(long, default_value = "network_analysis.csv")]
    output: PathBuf,

    /// Visualization output (JSON)
    #[arg(long, default_value = "visualizations.json")]
    viz_output: PathBuf,

    /// Protocol number to name overrides (JSON object)
    #[arg(long, value_name = "FILE")]
    protocol_map: Option<PathBuf>,

    /// Extraction worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Hide the packet counter shown while reading captures
    #[arg(long)]
    no_progress: bool,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn analyzer_config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::from_env();
        if let Some(threshold) = self.port_scan_threshold {
            config.port_scan_threshold = threshold;
        }
        if let Some(threshold) = self.flood_rate_threshold {
            config.flood_rate_threshold = threshold;
        }
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
        config
    }
}

/// With several captures, outputs are prefixed by each capture's file stem.
fn output_path(base: &Path, capture: &Path, prefixed: bool) -> PathBuf {
    if !prefixed {
        return base.to_path_buf();
    }
    let stem = capture
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let file = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}_{}", stem, file))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    protocols::install_from(cli.protocol_map.as_deref())?;

    let analyzer = NetworkAnalyzer::new(cli.analyzer_config());
    let prefixed = cli.pcap_files.len() > 1;
    let mut failures = 0;

    for path in &cli.pcap_files {
        let store = ResultStore::new(
            output_path(&cli.output, path, prefixed),
            output_path(&cli.viz_output, path, prefixed),
        );
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut source = PcapFileSource::new(path).with_progress(!cli.no_progress);
        match analyzer.run(&name, &mut source, &store) {
            Ok(output) => {
                println!("{}", output.report.summary());
                for viz in &output.visualizations {
                    let chart = serde_json::to_string_pretty(&viz.chart)?;
                    println!("\nVisualization: {}\n{}", viz.title, chart);
                }
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                error!("{}", e.user_message());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} captures failed", failures, cli.pcap_files.len()).into());
    }
    Ok(())
}
