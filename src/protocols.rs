use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::error::AnalysisError;

const DEFAULT_PROTOCOLS: &[(u8, &str)] = &[
    (0, "HOPOPT"),
    (1, "ICMP"),
    (2, "IGMP"),
    (6, "TCP"),
    (17, "UDP"),
    (19, "CHARGEN"),
    (37, "Time"),
    (89, "OSPF"),
    (118, "STP"),
    (120, "SMP"),
    (127, "Private"),
    (170, "EMFAS"),
    (240, "Experimental"),
];

pub const DEFAULT_MAP_FILE: &str = "protocol_map.json";

static PROTOCOLS: OnceLock<ProtocolMap> = OnceLock::new();

/// IP protocol number to name lookup.
#[derive(Debug, Clone)]
pub struct ProtocolMap {
    names: HashMap<u8, String>,
}

impl Default for ProtocolMap {
    fn default() -> Self {
        ProtocolMap {
            names: DEFAULT_PROTOCOLS
                .iter()
                .map(|(number, name)| (*number, name.to_string()))
                .collect(),
        }
    }
}

impl ProtocolMap {
    pub fn name(&self, number: u8) -> String {
        self.names
            .get(&number)
            .cloned()
            .unwrap_or_else(|| format!("Unknown({})", number))
    }

    /// Merges `{"number": "name"}` pairs over the current entries.
    pub fn merge_json(&mut self, json: &str) -> Result<usize, AnalysisError> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| AnalysisError::ProtocolMap(e.to_string()))?;
        let count = raw.len();
        for (key, name) in raw {
            let number: u8 = key
                .trim()
                .parse()
                .map_err(|_| {
                    AnalysisError::ProtocolMap(format!(
                        "'{}' is not a protocol number (0-255)",
                        key
                    ))
                })?;
            self.names.insert(number, name);
        }
        Ok(count)
    }

    /// Defaults merged with the override file at `path`, if it exists.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let mut map = ProtocolMap::default();
        match fs::read_to_string(path) {
            Ok(json) => {
                let count = map.merge_json(&json)?;
                info!("Loaded {} protocol overrides from {}", count, path.display());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No {} found, using default protocol mapping", path.display());
            }
            Err(e) => {
                return Err(AnalysisError::ProtocolMap(format!("{}: {}", path.display(), e)));
            }
        }
        Ok(map)
    }
}

/// Installs the process-wide table. Only the first call wins; returns `false`
/// if a table was already in place.
pub fn install(map: ProtocolMap) -> bool {
    PROTOCOLS.set(map).is_ok()
}

/// Loads the override at `path` (or `protocol_map.json`) and installs it.
pub fn install_from(path: Option<&Path>) -> Result<&'static ProtocolMap, AnalysisError> {
    let map = ProtocolMap::load(path.unwrap_or_else(|| Path::new(DEFAULT_MAP_FILE)))?;
    if !install(map) {
        debug!("Protocol map already installed, keeping the existing table");
    }
    Ok(global())
}

/// The process-wide table, falling back to the defaults if nothing was installed.
pub fn global() -> &'static ProtocolMap {
    PROTOCOLS.get_or_init(ProtocolMap::default)
}
