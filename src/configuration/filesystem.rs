//! Vehicle directory access
//!
//! A vehicle directory holds the numbered step files (`NN_name.param`),
//! the step metadata, an optional parameter documentation table and the
//! files written from flight controller snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use ardu_configurator_core::parameters::{
    export, format_compact_value, parse_bytes, CategorizedParameters, ExportDialect,
    ParamDocFlags, ParameterDoc, ParameterDocumentation, ParameterSet, Tolerance,
};

use super::step::{ConfigurationSteps, StepMetadata, STEPS_FILE};
use crate::error::FilesystemError;

/// Factory defaults as downloaded from the flight controller
pub const DEFAULT_PARAM_FILE: &str = "00_default.param";
/// Every flight controller parameter
pub const COMPLETE_PARAM_FILE: &str = "complete.param";
pub const NON_DEFAULT_READ_ONLY_FILE: &str = "non-default_read-only.param";
pub const NON_DEFAULT_CALIBRATIONS_FILE: &str = "non-default_writable_calibrations.param";
pub const NON_DEFAULT_OTHER_FILE: &str = "non-default_writable_non-calibrations.param";
pub const DOCUMENTATION_FILE: &str = "parameter_documentation.json";
pub const LAST_UPLOADED_FILE: &str = "last_uploaded_filename.txt";
pub const TUNING_REPORT_FILE: &str = "tuning_report.csv";

/// Rows of the tuning report
pub const TUNING_REPORT_PARAMETERS: [&str; 17] = [
    "ATC_ACCEL_P_MAX",
    "ATC_ACCEL_R_MAX",
    "ATC_ACCEL_Y_MAX",
    "ATC_ANG_PIT_P",
    "ATC_ANG_RLL_P",
    "ATC_ANG_YAW_P",
    "ATC_RAT_PIT_D",
    "ATC_RAT_PIT_I",
    "ATC_RAT_PIT_P",
    "ATC_RAT_RLL_D",
    "ATC_RAT_RLL_I",
    "ATC_RAT_RLL_P",
    "ATC_RAT_YAW_D",
    "ATC_RAT_YAW_I",
    "ATC_RAT_YAW_P",
    "INS_GYRO_FILTER",
    "MOT_THST_HOVER",
];

/// Columns of the tuning report
pub const TUNING_REPORT_FILES: [&str; 8] = [
    "11_initial_atc.param",
    "16_pid_adjustment.param",
    "23_quick_tune_results.param",
    "31_autotune_roll_results.param",
    "32_autotune_pitch_results.param",
    "33_autotune_yaw_results.param",
    "34_autotune_yawd_results.param",
    "35_autotune_roll_pitch_retune_results.param",
];

/// Documentation entry as stored in `parameter_documentation.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentationEntry {
    human_name: String,
    read_only: bool,
    calibration: bool,
    reboot_required: bool,
    min: Option<f64>,
    max: Option<f64>,
    units: Option<String>,
    values: BTreeMap<i64, String>,
    bitmask: BTreeMap<u32, String>,
}

impl From<DocumentationEntry> for ParameterDoc {
    fn from(entry: DocumentationEntry) -> Self {
        let mut flags = ParamDocFlags::empty();
        flags.set(ParamDocFlags::READ_ONLY, entry.read_only);
        flags.set(ParamDocFlags::CALIBRATION, entry.calibration);
        flags.set(ParamDocFlags::REBOOT_REQUIRED, entry.reboot_required);
        flags.set(ParamDocFlags::BITMASK, !entry.bitmask.is_empty());
        ParameterDoc {
            human_name: entry.human_name,
            flags,
            min: entry.min,
            max: entry.max,
            units: entry.units,
            values: entry.values,
            bitmask: entry.bitmask,
        }
    }
}

/// True for `NN_name.param` step files other than the defaults file
pub fn is_step_file(name: &str) -> bool {
    let bytes = name.as_bytes();
    name != DEFAULT_PARAM_FILE
        && name.ends_with(".param")
        && bytes.len() > 3 + ".param".len()
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'_'
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FilesystemError + '_ {
    move |source| FilesystemError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Files of one vehicle
#[derive(Debug, Clone)]
pub struct VehicleDirectory {
    root: PathBuf,
    steps: ConfigurationSteps,
    documentation: ParameterDocumentation,
}

impl VehicleDirectory {
    /// Open an existing vehicle directory
    ///
    /// Step metadata and documentation are optional; when present they
    /// must parse.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FilesystemError> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(io_error(&root))?;
        if !meta.is_dir() {
            return Err(FilesystemError::Io {
                path: root,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        let steps = ConfigurationSteps::load(&root.join(STEPS_FILE))?;
        let documentation = Self::load_documentation(&root.join(DOCUMENTATION_FILE))?;
        crate::log_info!(
            "Opened vehicle directory {} ({} step annotations, {} documented parameters)",
            root.display(),
            steps.steps.len(),
            documentation.len()
        );
        Ok(Self {
            root,
            steps,
            documentation,
        })
    }

    fn load_documentation(path: &Path) -> Result<ParameterDocumentation, FilesystemError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                crate::log_warn!("No parameter documentation at {}", path.display());
                return Ok(ParameterDocumentation::new());
            }
            Err(source) => {
                return Err(FilesystemError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let entries: BTreeMap<String, DocumentationEntry> =
            serde_json::from_str(&text).map_err(|source| FilesystemError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(entries
            .into_iter()
            .map(|(name, entry)| (name, ParameterDoc::from(entry)))
            .collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documentation(&self) -> &ParameterDocumentation {
        &self.documentation
    }

    pub fn steps(&self) -> &ConfigurationSteps {
        &self.steps
    }

    /// Metadata of a step; steps without an entry get the defaults
    pub fn step_metadata(&self, file: &str) -> StepMetadata {
        self.steps.get(file).cloned().unwrap_or_default()
    }

    /// Full path of a file inside the directory
    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Step files in ascending order
    pub fn step_files(&self) -> Result<Vec<String>, FilesystemError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let entry = entry.map_err(io_error(&self.root))?;
            if !entry.file_type().map_err(io_error(&self.root))?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_step_file(name) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parse a parameter file
    pub fn read_params(&self, file: &str) -> Result<ParameterSet, FilesystemError> {
        let path = self.path(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FilesystemError::StepNotFound(file.to_string()))
            }
            Err(source) => return Err(FilesystemError::Io { path, source }),
        };
        parse_bytes(&bytes).map_err(|source| FilesystemError::Parse { path, source })
    }

    /// Write a parameter file in Mission Planner order
    pub fn write_params(
        &self,
        file: &str,
        params: &ParameterSet,
        dialect: &ExportDialect,
    ) -> Result<(), FilesystemError> {
        let path = self.path(file);
        fs::write(&path, export(&params.sorted(), dialect)).map_err(io_error(&path))?;
        crate::log_debug!("Wrote {} parameters to {}", params.len(), path.display());
        Ok(())
    }

    /// Factory defaults, if they were written before
    pub fn read_defaults(&self) -> Result<Option<ParameterSet>, FilesystemError> {
        match self.read_params(DEFAULT_PARAM_FILE) {
            Ok(set) => Ok(Some(set)),
            Err(FilesystemError::StepNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write_defaults(&self, defaults: &ParameterSet) -> Result<(), FilesystemError> {
        self.write_params(DEFAULT_PARAM_FILE, defaults, &ExportDialect::Compact)
    }

    pub fn write_complete(&self, values: &ParameterSet) -> Result<(), FilesystemError> {
        self.write_params(COMPLETE_PARAM_FILE, values, &ExportDialect::Compact)
    }

    /// Write the three non-default category files
    pub fn write_categorized(
        &self,
        values: &ParameterSet,
        defaults: &ParameterSet,
        tolerance: Tolerance,
    ) -> Result<CategorizedParameters, FilesystemError> {
        let categorized = values.categorize_by_documentation(&self.documentation, defaults, tolerance);
        let files = [
            (
                NON_DEFAULT_READ_ONLY_FILE,
                &categorized.read_only,
                "Non-default read-only parameters\nFor reference only, they cannot be written",
            ),
            (
                NON_DEFAULT_CALIBRATIONS_FILE,
                &categorized.calibration,
                "Non-default writable calibration parameters\nSpecific to this vehicle",
            ),
            (
                NON_DEFAULT_OTHER_FILE,
                &categorized.other,
                "Non-default writable non-calibration parameters\nCan be reused on similar vehicles",
            ),
        ];
        for (file, params, description) in files {
            let dialect = ExportDialect::Annotated {
                description: description.to_string(),
            };
            self.write_params(file, params, &dialect)?;
        }
        Ok(categorized)
    }

    /// Step file uploaded last, if recorded
    pub fn last_uploaded(&self) -> Option<String> {
        let text = fs::read_to_string(self.path(LAST_UPLOADED_FILE)).ok()?;
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    pub fn write_last_uploaded(&self, file: &str) -> Result<(), FilesystemError> {
        let path = self.path(LAST_UPLOADED_FILE);
        fs::write(&path, file).map_err(io_error(&path))
    }

    /// Write `tuning_report.csv`
    ///
    /// One row per tuning parameter, one column per tuning step. Missing
    /// files and parameters leave the cell empty.
    pub fn write_tuning_report(&self) -> Result<PathBuf, FilesystemError> {
        let mut columns = Vec::with_capacity(TUNING_REPORT_FILES.len());
        for file in TUNING_REPORT_FILES {
            match self.read_params(file) {
                Ok(set) => columns.push(Some(set)),
                Err(FilesystemError::StepNotFound(_)) => columns.push(None),
                Err(e) => return Err(e),
            }
        }

        let mut csv = String::from("param");
        for file in TUNING_REPORT_FILES {
            csv.push(',');
            csv.push_str(file);
        }
        csv.push('\n');
        for name in TUNING_REPORT_PARAMETERS {
            csv.push_str(name);
            for column in &columns {
                csv.push(',');
                if let Some(value) = column.as_ref().and_then(|set| set.value(name)) {
                    csv.push_str(&format_compact_value(value));
                }
            }
            csv.push('\n');
        }

        let path = self.path(TUNING_REPORT_FILE);
        fs::write(&path, csv).map_err(io_error(&path))?;
        Ok(path)
    }
}
