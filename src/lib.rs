pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod protocols;
pub mod report;
pub mod server;
pub mod stats;
pub mod store;

pub use capture::{PacketSource, PcapFileSource};
pub use config::{AnalyzerConfig, ServerConfig};
pub use error::{AnalysisError, StoreError};
pub use pipeline::{NetworkAnalyzer, RunOutput};
pub use report::{AnalysisReport, Visualization};
pub use store::ResultStore;
