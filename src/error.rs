use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort an analysis run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("packet source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("no analyzable IPv4 traffic found in capture")]
    NoAnalyzableTraffic,
    #[error("failed to persist results: {0}")]
    Persistence(#[from] StoreError),
    #[error("invalid protocol map: {0}")]
    ProtocolMap(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error writing {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("JSON error writing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AnalysisError {
    /// Message suitable for showing to whoever submitted the capture.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::SourceUnavailable(_) => {
                "The capture could not be read or contains no packets. \
                 Ensure it is a valid PCAP file."
                    .to_string()
            }
            AnalysisError::NoAnalyzableTraffic => {
                "The capture contains no valid IPv4 traffic to analyze.".to_string()
            }
            AnalysisError::Persistence(_) => "Analysis results could not be saved.".to_string(),
            AnalysisError::ProtocolMap(msg) => format!("Protocol map is invalid: {}", msg),
        }
    }
}
