//! Reset-required policy
//!
//! Decides whether changing a parameter needs a flight controller reset
//! before the new value takes effect.

/// Default name suffixes that may need a reset
pub const DEFAULT_RESET_SUFFIXES: [&str; 4] = ["_TYPE", "_EN", "_ENABLE", "SID_AXIS"];

/// How sure we are that a change needs a reset
///
/// Ordered so that the strongest requirement of a batch is its `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ResetRequirement {
    /// No reset signal
    #[default]
    None,
    /// Name heuristic matched; ask the operator
    Possible,
    /// Documentation says a reboot is required; reset automatically
    Definite,
}

/// Explicit, overridable suffix table
///
/// The suffix list is a heuristic. It is kept as data so callers can
/// extend or replace it instead of inferring broader rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPolicy {
    suffixes: Vec<String>,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self::with_suffixes(DEFAULT_RESET_SUFFIXES)
    }
}

impl ResetPolicy {
    /// Create a policy with a custom suffix list
    pub fn with_suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured suffixes
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Requirement for a parameter whose value is about to change
    pub fn requirement(&self, name: &str, reboot_required: bool) -> ResetRequirement {
        if reboot_required {
            ResetRequirement::Definite
        } else if self.suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            ResetRequirement::Possible
        } else {
            ResetRequirement::None
        }
    }
}

/// Seconds to wait after a reset
///
/// `max(file_ms, fc_ms) / 1000 + 1`, rounded up to whole seconds.
pub fn reset_wait_seconds(file_boot_delay_ms: f64, fc_boot_delay_ms: f64) -> u64 {
    let delay_ms = file_boot_delay_ms.max(fc_boot_delay_ms).max(0.0);
    (delay_ms / 1000.0 + 1.0).ceil() as u64
}
