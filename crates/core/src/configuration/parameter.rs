//! Per-step parameter domain object
//!
//! An `ArduPilotParameter` joins everything known about one parameter
//! while a configuration step is active: the value on disk, the
//! operator's edit, any forced/derived override, the flight controller's
//! value, the factory default and the documentation.

use core::fmt;

use crate::parameters::{validate_name_and_value, ParameterDoc, ParameterRecord, Tolerance, ValidationError};

/// Where an override comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    /// Always applied by the step
    Forced,
    /// Computed by the step and applied when it differs
    Derived,
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideKind::Forced => write!(f, "forced"),
            OverrideKind::Derived => write!(f, "derived"),
        }
    }
}

/// A value imposed by the configuration step, with its justification
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterOverride {
    /// Forced or derived
    pub kind: OverrideKind,
    /// Value to apply
    pub value: f64,
    /// Change reason written as the parameter comment
    pub reason: String,
}

/// Rejected edit or override
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEditError {
    /// Parameter is documented read-only
    ReadOnly {
        /// Parameter name
        name: String,
    },
    /// Override targets a parameter the step does not force or derive
    NotOverridable {
        /// Parameter name
        name: String,
        /// Kind of the rejected override
        kind: OverrideKind,
    },
    /// Operator edit targets a forced or derived parameter
    Locked {
        /// Parameter name
        name: String,
        /// Kind of override holding the value
        kind: OverrideKind,
    },
    /// Name or value failed validation
    Invalid(ValidationError),
}

impl fmt::Display for ParameterEditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterEditError::ReadOnly { name } => {
                write!(f, "Parameter {} is read-only", name)
            }
            ParameterEditError::NotOverridable { name, kind } => {
                write!(f, "Parameter {} is not a {} parameter", name, kind)
            }
            ParameterEditError::Locked { name, kind } => {
                write!(f, "Parameter {} has a {} value and cannot be edited", name, kind)
            }
            ParameterEditError::Invalid(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ParameterEditError {}

impl From<ValidationError> for ParameterEditError {
    fn from(err: ValidationError) -> Self {
        ParameterEditError::Invalid(err)
    }
}

/// Non-fatal value warnings shown to the operator
#[derive(Debug, Clone, PartialEq)]
pub enum ValueWarning {
    /// Outside the documented min/max
    OutOfRange {
        /// Offending value
        value: f64,
        /// Documented minimum
        min: Option<f64>,
        /// Documented maximum
        max: Option<f64>,
    },
    /// Sets undocumented bits
    InvalidBitmask {
        /// Offending value
        value: f64,
    },
}

impl fmt::Display for ValueWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueWarning::OutOfRange { value, min, max } => write!(
                f,
                "value {} is outside the documented range [{}, {}]",
                value,
                min.map_or("-inf".to_string(), |v| v.to_string()),
                max.map_or("inf".to_string(), |v| v.to_string())
            ),
            ValueWarning::InvalidBitmask { value } => {
                write!(f, "value {} sets undocumented bitmask bits", value)
            }
        }
    }
}

/// One parameter of the active configuration step
#[derive(Debug, Clone)]
pub struct ArduPilotParameter {
    name: String,
    base: ParameterRecord,
    new_value: Option<f64>,
    new_comment: Option<String>,
    override_kind: Option<OverrideKind>,
    derived: Option<ParameterOverride>,
    fc: Option<f64>,
    default: Option<f64>,
    doc: ParameterDoc,
    tolerance: Tolerance,
}

impl ArduPilotParameter {
    /// Create a parameter from its file record
    ///
    /// `override_kind` flags the parameter as forced or derived by the
    /// step; only flagged parameters accept [`Self::apply_override`].
    pub fn new(
        name: impl Into<String>,
        base: ParameterRecord,
        fc: Option<f64>,
        default: Option<f64>,
        doc: ParameterDoc,
        override_kind: Option<OverrideKind>,
    ) -> Self {
        Self {
            name: name.into(),
            base,
            new_value: None,
            new_comment: None,
            override_kind,
            derived: None,
            fc,
            default,
            doc,
            tolerance: Tolerance::default(),
        }
    }

    /// Use a non-default tolerance for dirty/change detection
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value and comment on disk
    pub fn base(&self) -> &ParameterRecord {
        &self.base
    }

    /// Operator or override edit, if any
    pub fn new_value(&self) -> Option<f64> {
        self.new_value
    }

    /// Pending override that has not been saved yet
    pub fn pending_override(&self) -> Option<&ParameterOverride> {
        self.derived.as_ref()
    }

    /// Forced/derived flag given by the step
    pub fn override_kind(&self) -> Option<OverrideKind> {
        self.override_kind
    }

    /// Last known flight controller value
    pub fn fc_value(&self) -> Option<f64> {
        self.fc
    }

    /// Factory default value
    pub fn default_value(&self) -> Option<f64> {
        self.default
    }

    /// Documentation metadata
    pub fn doc(&self) -> &ParameterDoc {
        &self.doc
    }

    /// Value that would be written to the file and uploaded
    pub fn effective_value(&self) -> f64 {
        self.new_value.unwrap_or(self.base.value)
    }

    /// Record that would be written to the file
    pub fn effective_record(&self) -> ParameterRecord {
        let comment = match &self.new_comment {
            Some(c) if c.is_empty() => None,
            Some(c) => Some(c.clone()),
            None => self.base.comment.clone(),
        };
        ParameterRecord {
            value: self.effective_value(),
            comment,
        }
    }

    /// True if the operator may edit the value
    pub fn is_editable(&self) -> bool {
        !self.doc.is_read_only() && self.override_kind.is_none()
    }

    /// Edited beyond tolerance, comment edited, or an override is pending
    pub fn is_dirty(&self) -> bool {
        let value_changed = self
            .new_value
            .is_some_and(|v| !self.tolerance.is_within(v, self.base.value));
        let comment_changed =
            self.new_comment.is_some() && self.effective_record().comment != self.base.comment;
        value_changed || comment_changed || self.derived.is_some()
    }

    /// True if uploading would change the flight controller's value
    ///
    /// An unknown FC value counts as a change.
    pub fn differs_from_fc(&self) -> bool {
        self.fc
            .is_none_or(|fc| !self.tolerance.is_within(self.effective_value(), fc))
    }

    /// True if the effective value equals the factory default
    pub fn is_default(&self) -> bool {
        self.default
            .is_some_and(|d| self.tolerance.is_within(self.effective_value(), d))
    }

    /// Update the flight controller value after a download
    pub fn set_fc_value(&mut self, value: Option<f64>) {
        self.fc = value;
    }

    /// Apply an operator edit
    ///
    /// Returns `true` if the effective value changed.
    pub fn set_new_value(&mut self, value: f64) -> Result<bool, ParameterEditError> {
        validate_name_and_value(&self.name, value)?;
        if self.doc.is_read_only() {
            return Err(ParameterEditError::ReadOnly {
                name: self.name.clone(),
            });
        }
        if let Some(kind) = self.override_kind {
            return Err(ParameterEditError::Locked {
                name: self.name.clone(),
                kind,
            });
        }
        let changed = !self.tolerance.is_within(value, self.effective_value());
        self.new_value = Some(value);
        Ok(changed)
    }

    /// Replace the change-reason comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        // An empty comment clears the one on disk
        self.new_comment = Some(comment.into().trim().to_string());
    }

    /// Apply a forced or derived value
    ///
    /// Rejected for read-only parameters and for parameters the step did
    /// not flag with the same override kind. On rejection nothing changes.
    pub fn apply_override(&mut self, ov: ParameterOverride) -> Result<(), ParameterEditError> {
        validate_name_and_value(&self.name, ov.value)?;
        if self.doc.is_read_only() {
            return Err(ParameterEditError::ReadOnly {
                name: self.name.clone(),
            });
        }
        if self.override_kind != Some(ov.kind) {
            return Err(ParameterEditError::NotOverridable {
                name: self.name.clone(),
                kind: ov.kind,
            });
        }
        let value_changes = !self.tolerance.is_within(ov.value, self.base.value);
        let comment_changes = self.base.comment.as_deref() != Some(ov.reason.as_str());
        if !value_changes && !comment_changes {
            // Already on disk, nothing left to consume
            return Ok(());
        }
        self.new_value = Some(ov.value);
        self.new_comment = Some(ov.reason.clone());
        self.derived = Some(ov);
        Ok(())
    }

    /// Warnings for a candidate value, based on the documentation
    pub fn value_warnings(&self, value: f64) -> Vec<ValueWarning> {
        let mut warnings = Vec::new();
        if !self.doc.is_in_range(value) {
            warnings.push(ValueWarning::OutOfRange {
                value,
                min: self.doc.min,
                max: self.doc.max,
            });
        }
        if !self.doc.is_valid_bitmask(value) {
            warnings.push(ValueWarning::InvalidBitmask { value });
        }
        warnings
    }

    /// Mark the current state as saved to disk
    pub fn commit(&mut self) {
        self.base = self.effective_record();
        self.new_value = None;
        self.new_comment = None;
        self.derived = None;
    }

    /// Drop the operator edit and any pending override
    pub fn discard(&mut self) {
        self.new_value = None;
        self.new_comment = None;
        self.derived = None;
    }
}
