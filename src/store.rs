use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::dto::TrafficRow;
use crate::report::Visualization;

/// Write-once sink for one run's traffic table (CSV) and visualization export (JSON).
#[derive(Debug, Clone)]
pub struct ResultStore {
    traffic_path: PathBuf,
    visualization_path: PathBuf,
}

impl ResultStore {
    pub fn new(traffic_path: impl Into<PathBuf>, visualization_path: impl Into<PathBuf>) -> Self {
        Self {
            traffic_path: traffic_path.into(),
            visualization_path: visualization_path.into(),
        }
    }

    pub fn traffic_path(&self) -> &Path {
        &self.traffic_path
    }

    pub fn visualization_path(&self) -> &Path {
        &self.visualization_path
    }

    pub fn store_traffic(&self, rows: &[TrafficRow]) -> Result<(), StoreError> {
        debug!("Saving {} rows to {}", rows.len(), self.traffic_path.display());
        let csv_err = |source: csv::Error| StoreError::Csv {
            path: self.traffic_path.clone(),
            source,
        };

        let mut writer = csv::Writer::from_path(&self.traffic_path).map_err(csv_err)?;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| StoreError::Io {
            path: self.traffic_path.clone(),
            source,
        })?;
        info!("Results saved to {}", self.traffic_path.display());
        Ok(())
    }

    pub fn load_traffic(&self) -> Result<Vec<TrafficRow>, StoreError> {
        let csv_err = |source: csv::Error| StoreError::Csv {
            path: self.traffic_path.clone(),
            source,
        };
        let mut reader = csv::Reader::from_path(&self.traffic_path).map_err(csv_err)?;
        reader
            .deserialize()
            .collect::<Result<Vec<TrafficRow>, _>>()
            .map_err(csv_err)
    }

    pub fn store_visualizations(&self, visualizations: &[Visualization]) -> Result<(), StoreError> {
        debug!("Saving visualizations to {}", self.visualization_path.display());
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.visualization_path.clone(),
            source,
        };

        let file = File::create(&self.visualization_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, visualizations).map_err(|source| {
            StoreError::Json {
                path: self.visualization_path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(io_err)?;
        info!("Visualizations saved to {}", self.visualization_path.display());
        Ok(())
    }

    pub fn load_visualizations(&self) -> Result<Vec<Visualization>, StoreError> {
        let file = File::open(&self.visualization_path).map_err(|source| StoreError::Io {
            path: self.visualization_path.clone(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
            path: self.visualization_path.clone(),
            source,
        })
    }
}
