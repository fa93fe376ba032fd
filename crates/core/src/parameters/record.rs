//! Parameter value/comment pair and tolerance comparison

/// Default absolute tolerance
pub const DEFAULT_ATOL: f64 = 0.0;

/// Default relative tolerance (0.01 %)
pub const DEFAULT_RTOL: f64 = 1e-4;

/// A parameter value as stored in a parameter file
///
/// `PartialEq` is exact: value and comment must both match. Use
/// [`Tolerance`] to compare values the way the flight controller does.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterRecord {
    /// Parameter value
    pub value: f64,
    /// Optional change reason or annotation
    pub comment: Option<String>,
}

impl ParameterRecord {
    /// Create a record without a comment
    pub fn new(value: f64) -> Self {
        Self {
            value,
            comment: None,
        }
    }

    /// Create a record with a comment
    ///
    /// An empty or whitespace-only comment is stored as `None`.
    pub fn with_comment(value: f64, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        let trimmed = comment.trim();
        Self {
            value,
            comment: if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            },
        }
    }
}

/// Floating point comparator with absolute and relative bounds
///
/// Two values match when `|a - b| <= atol + rtol * max(|a|, |b|)`. Using
/// the larger magnitude keeps the comparison symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Absolute tolerance
    pub atol: f64,
    /// Relative tolerance
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: DEFAULT_ATOL,
            rtol: DEFAULT_RTOL,
        }
    }
}

impl Tolerance {
    /// Exact comparison (`atol = rtol = 0`)
    pub const EXACT: Tolerance = Tolerance {
        atol: 0.0,
        rtol: 0.0,
    };

    /// Create a comparator with explicit bounds
    pub const fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// True when `a` and `b` are equal within tolerance
    pub fn is_within(&self, a: f64, b: f64) -> bool {
        if a == b {
            // Covers infinities of the same sign
            return true;
        }
        let bound = self.atol + self.rtol * a.abs().max(b.abs());
        (a - b).abs() <= bound
    }
}

/// Compare two values with the default tolerance
pub fn is_within_tolerance(a: f64, b: f64) -> bool {
    Tolerance::default().is_within(a, b)
}
