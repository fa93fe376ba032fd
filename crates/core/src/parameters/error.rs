//! Parameter error types
//!
//! Provides validation errors for parameter names and values, and load
//! errors for parameter files. All of these are raised before any
//! network or file write takes place.

use core::fmt;

/// Rejected parameter name or value
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Name is the empty string
    EmptyName,
    /// Name exceeds the 16 character MAVLink limit
    NameTooLong {
        /// Offending name
        name: String,
        /// Its length in characters
        length: usize,
    },
    /// Name has characters outside `[A-Z0-9_]` or does not start with a letter
    InvalidNameFormat {
        /// Offending name
        name: String,
    },
    /// Value is NaN or infinite
    NonFiniteValue {
        /// Parameter the value was meant for
        name: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyName => write!(f, "Parameter name cannot be empty"),
            ValidationError::NameTooLong { name, length } => write!(
                f,
                "Parameter name {} is too long ({} > {} characters)",
                name,
                length,
                super::name::MAX_NAME_LEN
            ),
            ValidationError::InvalidNameFormat { name } => {
                write!(f, "Parameter name {} has an invalid format", name)
            }
            ValidationError::NonFiniteValue { name } => {
                write!(f, "Parameter {} value must be a finite number", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Reason a parameter file could not be loaded
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// File content is not valid UTF-8
    NotUtf8,
    /// Line has a name but no value field
    MissingValue,
    /// Value field is not a number
    InvalidValue(String),
    /// Name appears more than once in the same file
    DuplicateName(String),
    /// Name failed validation
    InvalidName(ValidationError),
}

/// Parameter file load failure
///
/// Loading is all-or-nothing, so a single error aborts the whole file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// 1-based line number, `None` for whole-file errors
    pub line: Option<usize>,
    /// What went wrong
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn at(line: usize, kind: ParseErrorKind) -> Self {
        Self {
            line: Some(line),
            kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        match &self.kind {
            ParseErrorKind::NotUtf8 => write!(
                f,
                "file is not UTF-8 encoded; re-save it as UTF-8 (plain ASCII is fine)"
            ),
            ParseErrorKind::MissingValue => write!(f, "missing parameter value"),
            ParseErrorKind::InvalidValue(value) => {
                write!(f, "invalid parameter value {:?}", value)
            }
            ParseErrorKind::DuplicateName(name) => {
                write!(f, "duplicated parameter {}", name)
            }
            ParseErrorKind::InvalidName(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        assert!(ValidationError::EmptyName.to_string().contains("cannot be empty"));

        let err = ValidationError::NameTooLong {
            name: "ABCDEFGHIJKLMNOPQ".into(),
            length: 17,
        };
        assert!(err.to_string().contains("too long"));

        let err = ValidationError::InvalidNameFormat { name: "1ABC".into() };
        assert!(err.to_string().contains("invalid format"));
    }

    #[test]
    fn test_parse_error_includes_line() {
        let err = ParseError::at(7, ParseErrorKind::MissingValue);
        assert_eq!(err.to_string(), "line 7: missing parameter value");
    }

    #[test]
    fn test_not_utf8_has_hint() {
        let err = ParseError {
            line: None,
            kind: ParseErrorKind::NotUtf8,
        };
        assert!(err.to_string().contains("UTF-8"));
    }
}
