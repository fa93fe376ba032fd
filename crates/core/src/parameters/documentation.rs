//! Parameter documentation metadata
//!
//! Per-parameter flags and ranges extracted from the autopilot's
//! parameter documentation. The documentation file itself is parsed by
//! the host crate; this module only holds the data.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;

bitflags! {
    /// Parameter documentation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamDocFlags: u8 {
        /// Value is reported by the autopilot and cannot be written
        const READ_ONLY = 0b0000_0001;
        /// Value is produced by a calibration procedure
        const CALIBRATION = 0b0000_0010;
        /// Value only takes effect after an autopilot reboot
        const REBOOT_REQUIRED = 0b0000_0100;
        /// Value is a bit mask
        const BITMASK = 0b0000_1000;
    }
}

/// Documentation for a single parameter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterDoc {
    /// One-line description
    pub human_name: String,
    /// Flags
    pub flags: ParamDocFlags,
    /// Inclusive lower bound, if documented
    pub min: Option<f64>,
    /// Inclusive upper bound, if documented
    pub max: Option<f64>,
    /// Unit abbreviation
    pub units: Option<String>,
    /// Enumerated values (value -> label)
    pub values: BTreeMap<i64, String>,
    /// Bit positions of a bitmask parameter (bit -> label)
    pub bitmask: BTreeMap<u32, String>,
}

impl ParameterDoc {
    /// True if the parameter cannot be written
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(ParamDocFlags::READ_ONLY)
    }

    /// True if the parameter is set by a calibration
    pub fn is_calibration(&self) -> bool {
        self.flags.contains(ParamDocFlags::CALIBRATION)
    }

    /// True if a change needs an autopilot reboot
    pub fn reboot_required(&self) -> bool {
        self.flags.contains(ParamDocFlags::REBOOT_REQUIRED)
    }

    /// Check a value against the documented range
    pub fn is_in_range(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    /// Check that a bitmask value only sets documented bits
    ///
    /// Always true for parameters without bitmask documentation.
    pub fn is_valid_bitmask(&self, value: f64) -> bool {
        if self.bitmask.is_empty() {
            return true;
        }
        if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return false;
        }
        let mask = value as u32;
        (0..32)
            .filter(|bit| mask & (1 << bit) != 0)
            .all(|bit| self.bitmask.contains_key(&bit))
    }
}

/// Documentation for all known parameters, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ParameterDocumentation {
    docs: HashMap<String, ParameterDoc>,
}

impl ParameterDocumentation {
    /// Create an empty documentation table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the documentation of a parameter
    pub fn insert(&mut self, name: impl Into<String>, doc: ParameterDoc) {
        self.docs.insert(name.into(), doc);
    }

    /// Documentation for a parameter
    pub fn get(&self, name: &str) -> Option<&ParameterDoc> {
        self.docs.get(name)
    }

    /// Flags of a parameter (empty if undocumented)
    pub fn flags(&self, name: &str) -> ParamDocFlags {
        self.docs.get(name).map(|d| d.flags).unwrap_or_default()
    }

    /// Number of documented parameters
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True if nothing is documented
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl FromIterator<(String, ParameterDoc)> for ParameterDocumentation {
    fn from_iter<I: IntoIterator<Item = (String, ParameterDoc)>>(iter: I) -> Self {
        Self {
            docs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_of_undocumented_parameter() {
        let docs = ParameterDocumentation::new();
        assert!(docs.flags("UNKNOWN").is_empty());
    }

    #[test]
    fn test_range_check() {
        let doc = ParameterDoc {
            min: Some(0.0),
            max: Some(10.0),
            ..Default::default()
        };
        assert!(doc.is_in_range(0.0));
        assert!(doc.is_in_range(10.0));
        assert!(!doc.is_in_range(10.5));
        assert!(!doc.is_in_range(-0.1));
        assert!(ParameterDoc::default().is_in_range(1e12));
    }

    #[test]
    fn test_bitmask_check() {
        let mut doc = ParameterDoc::default();
        doc.bitmask.insert(0, "first".into());
        doc.bitmask.insert(2, "third".into());
        assert!(doc.is_valid_bitmask(0.0));
        assert!(doc.is_valid_bitmask(5.0));
        assert!(!doc.is_valid_bitmask(2.0));
        assert!(!doc.is_valid_bitmask(1.5));
        assert!(!doc.is_valid_bitmask(-1.0));
    }

    #[test]
    fn test_flag_accessors() {
        let doc = ParameterDoc {
            flags: ParamDocFlags::READ_ONLY | ParamDocFlags::REBOOT_REQUIRED,
            ..Default::default()
        };
        assert!(doc.is_read_only());
        assert!(doc.reboot_required());
        assert!(!doc.is_calibration());
    }
}
