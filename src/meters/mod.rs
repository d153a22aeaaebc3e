use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::ekm::encoding::{encode_ct_ratio, encode_digits};

pub mod validation;

pub use validation::Violation;

#[derive(Error, Debug)]
pub enum MeterConfigError {
    #[error("Unable to read meters file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse meters file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unable to parse meters file: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("{}", format_violations(.0))]
    Invalid(Vec<Violation>),
}

fn format_violations(violations: &[Violation]) -> String {
    violations.iter().map(|v| v.to_string()).collect::<Vec<String>>().join("\n")
}

/// A meter entry exactly as it is written in the batch file
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMeter {
    pub serial_number: String,
    pub rs485_hub_id: String,
    pub version: i64,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ct_ratio: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct MetersFile {
    #[serde(default)]
    pub meters: Vec<RawMeter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterConfig {
    pub serial_number: String,
    pub rs485_hub_id: String,
    pub version: u8,
    pub password: Option<String>,
    pub ct_ratio: Option<u16>,
    pub encoded_serial: String,
    pub encoded_password: Option<String>,
    pub encoded_ct_ratio: Option<String>,
}

impl MeterConfig {
    /// Builds the meter and its encoded fields. Only reachable through
    /// `MeterRegistry::load_and_prepare`, which runs `validation::validate_meter`
    /// first, so version and ratio are already in range when narrowed.
    pub(crate) fn prepare(raw: RawMeter) -> Self {
        let ct_ratio = raw.ct_ratio.map(|r| r as u16);

        MeterConfig {
            encoded_serial: encode_digits(&raw.serial_number),
            encoded_password: raw.password.as_deref().map(encode_digits),
            encoded_ct_ratio: ct_ratio.map(encode_ct_ratio),
            serial_number: raw.serial_number,
            rs485_hub_id: raw.rs485_hub_id,
            version: raw.version as u8,
            password: raw.password,
            ct_ratio,
        }
    }

    pub fn is_eligible(&self) -> bool {
        return self.password.is_some() && self.ct_ratio.is_some();
    }
}

/// The ordered batch of meters and how far the batch has been worked through
pub struct MeterRegistry {
    meters: Vec<Arc<MeterConfig>>,
    cursor: Option<usize>,
}

impl MeterRegistry {
    /// Validates the complete batch and reports all violations at once,
    /// nothing is prepared if a single entry is broken.
    pub fn load_and_prepare(raw: Vec<RawMeter>) -> Result<Self, MeterConfigError> {
        let violations: Vec<Violation> = raw.iter()
            .enumerate()
            .flat_map(|(index, meter)| validation::validate_meter(index, meter))
            .collect();

        if !violations.is_empty() {
            return Err(MeterConfigError::Invalid(violations));
        }

        let meters = raw.into_iter().map(|m| Arc::new(MeterConfig::prepare(m))).collect();
        return Ok(MeterRegistry { meters, cursor: None });
    }

    pub fn from_file(path: &Path) -> Result<Self, MeterConfigError> {
        let contents = fs::read_to_string(path)?;
        let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));

        let file: MetersFile = if is_yaml {
            serde_yml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };

        info!("Loaded {} meters from {}", file.meters.len(), path.display());
        return Self::load_and_prepare(file.meters);
    }

    /// First meter at or after `from` which has a password and a CT ratio
    pub fn next_eligible(&self, from: usize) -> Option<(usize, Arc<MeterConfig>)> {
        return self.meters.iter()
            .enumerate()
            .skip(from)
            .find(|(_, meter)| meter.is_eligible())
            .map(|(index, meter)| (index, meter.clone()));
    }

    /// Moves the cursor to the next eligible meter after the current one
    pub fn advance(&mut self) -> Option<(usize, Arc<MeterConfig>)> {
        let from = match self.cursor {
            Some(current) => current + 1,
            None => 0,
        };

        let next = self.next_eligible(from);
        if let Some((index, _)) = &next {
            self.cursor = Some(*index);
        }
        return next;
    }

    pub fn current_index(&self) -> Option<usize> {
        return self.cursor;
    }

    pub fn len(&self) -> usize {
        return self.meters.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.meters.is_empty();
    }

    pub fn eligible_count(&self) -> usize {
        return self.meters.iter().filter(|m| m.is_eligible()).count();
    }

    pub fn skipped(&self) -> impl Iterator<Item = &MeterConfig> {
        return self.meters.iter().filter(|m| !m.is_eligible()).map(|m| m.as_ref());
    }

    pub fn log_plan(&self) {
        info!("{} of {} meters have a password and CT ratio configured", self.eligible_count(), self.len());
        for meter in self.skipped() {
            warn!("Skipping meter {}, password or CT ratio missing", meter.serial_number);
            debug!("Skipped meter {} is encoded as {}", meter.serial_number, meter.encoded_serial);
        }
    }
}
