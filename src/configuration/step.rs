//! Configuration step metadata
//!
//! Per step file: a description, how mandatory the step is, an optional
//! plugin, and the forced and derived parameter overrides. Stored as JSON
//! next to the step files:
//!
//! ```json
//! {
//!   "steps": {
//!     "08_batt1.param": {
//!       "description": "Battery monitor",
//!       "mandatory_percent": 80,
//!       "forced_parameters": {
//!         "BATT_MONITOR": { "new_value": 4, "change_reason": "Analog voltage and current" }
//!       },
//!       "derived_parameters": {
//!         "BATT_ARM_VOLT": {
//!           "new_value": { "fc_parameter": "BATT_LOW_VOLT", "scale": 1.05 },
//!           "change_reason": "5% above low voltage"
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ardu_configurator_core::configuration::{OverrideKind, ParameterOverride};
use ardu_configurator_core::parameters::ParameterSet;

use crate::error::FilesystemError;

/// File name of the step metadata inside a vehicle directory
pub const STEPS_FILE: &str = "configuration_steps.json";

fn unit_scale() -> f64 {
    1.0
}

/// Value of a derived parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DerivedExpression {
    /// Fixed number
    Literal(f64),
    /// `fc[fc_parameter] * scale + offset`
    FcParameter {
        fc_parameter: String,
        #[serde(default = "unit_scale")]
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
}

impl DerivedExpression {
    /// Evaluate against the flight controller values
    ///
    /// `None` if a referenced parameter is unknown.
    pub fn evaluate(&self, fc: &ParameterSet) -> Option<f64> {
        match self {
            DerivedExpression::Literal(v) => Some(*v),
            DerivedExpression::FcParameter {
                fc_parameter,
                scale,
                offset,
            } => fc.value(fc_parameter).map(|v| v * scale + offset),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForcedEntry {
    pub new_value: Option<f64>,
    pub change_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedEntry {
    pub new_value: Option<DerivedExpression>,
    pub change_reason: Option<String>,
}

/// Metadata of one step file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepMetadata {
    pub description: String,
    /// 0 means the step may be skipped
    pub mandatory_percent: u8,
    /// Name of a plugin to activate while the step is shown
    pub plugin: Option<String>,
    pub forced_parameters: BTreeMap<String, ForcedEntry>,
    pub derived_parameters: BTreeMap<String, DerivedEntry>,
}

fn require_reason(
    file: &str,
    name: &str,
    kind: OverrideKind,
    reason: &Option<String>,
) -> Result<String, FilesystemError> {
    match reason.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(FilesystemError::MissingChangeReason {
            file: file.to_string(),
            name: name.to_string(),
            kind: kind_name(kind),
        }),
    }
}

fn kind_name(kind: OverrideKind) -> &'static str {
    match kind {
        OverrideKind::Forced => "forced",
        OverrideKind::Derived => "derived",
    }
}

fn missing_value(file: &str, name: &str, kind: OverrideKind) -> FilesystemError {
    FilesystemError::MissingValue {
        file: file.to_string(),
        name: name.to_string(),
        kind: kind_name(kind),
    }
}

impl StepMetadata {
    /// True if the operator may skip the step
    pub fn can_skip(&self) -> bool {
        self.mandatory_percent == 0
    }

    /// Validated forced overrides
    ///
    /// Every entry must carry a value and a change reason.
    pub fn forced_overrides(
        &self,
        file: &str,
    ) -> Result<Vec<(String, ParameterOverride)>, FilesystemError> {
        self.forced_parameters
            .iter()
            .map(|(name, entry)| {
                let kind = OverrideKind::Forced;
                let value = entry.new_value.ok_or_else(|| missing_value(file, name, kind))?;
                let reason = require_reason(file, name, kind, &entry.change_reason)?;
                Ok((name.clone(), ParameterOverride { kind, value, reason }))
            })
            .collect()
    }

    /// Validated and evaluated derived overrides
    ///
    /// Entries referencing unknown flight controller parameters are
    /// skipped with a warning.
    pub fn derived_overrides(
        &self,
        file: &str,
        fc: &ParameterSet,
    ) -> Result<Vec<(String, ParameterOverride)>, FilesystemError> {
        let mut overrides = Vec::new();
        for (name, entry) in &self.derived_parameters {
            let kind = OverrideKind::Derived;
            let expr = entry
                .new_value
                .as_ref()
                .ok_or_else(|| missing_value(file, name, kind))?;
            let reason = require_reason(file, name, kind, &entry.change_reason)?;
            match expr.evaluate(fc) {
                Some(value) => {
                    overrides.push((name.clone(), ParameterOverride { kind, value, reason }))
                }
                None => crate::log_warn!(
                    "Cannot derive {} in {}: {:?} needs flight controller values",
                    name,
                    file,
                    expr
                ),
            }
        }
        Ok(overrides)
    }
}

/// Metadata of all steps of a vehicle directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSteps {
    #[serde(default)]
    pub steps: BTreeMap<String, StepMetadata>,
}

impl ConfigurationSteps {
    /// Load from a JSON file; a missing file means no metadata
    pub fn load(path: &Path) -> Result<Self, FilesystemError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                crate::log_info!("No step metadata at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(FilesystemError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| FilesystemError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Metadata of a step, if any
    pub fn get(&self, file: &str) -> Option<&StepMetadata> {
        self.steps.get(file)
    }
}
