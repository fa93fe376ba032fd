//! Parameter name rules
//!
//! ArduPilot parameter names are at most 16 characters (MAVLink
//! `param_id` width), upper case, and start with a letter:
//! `^[A-Z][A-Z0-9_]{0,15}$`.

use core::cmp::Ordering;

use super::error::ValidationError;

/// Maximum parameter name length (MAVLink standard)
pub const MAX_NAME_LEN: usize = 16;

/// Validate a parameter name
///
/// Checks run in order: empty, too long, then character set.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let length = name.chars().count();
    if length > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            name: name.to_string(),
            length,
        });
    }

    let mut chars = name.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    let rest_ok = chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !leading_ok || !rest_ok {
        return Err(ValidationError::InvalidNameFormat {
            name: name.to_string(),
        });
    }

    Ok(())
}

/// Validate a name/value pair before it is sent to the flight controller
pub fn validate_name_and_value(name: &str, value: f64) -> Result<(), ValidationError> {
    validate_name(name)?;
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Compare two names in Mission Planner order
///
/// Names are split on `_` and compared part by part; when one name is a
/// prefix of the other the shorter one sorts first. `RC1_MAX` therefore
/// sorts before `RC1_MAX_X` and `RC10_MIN` after `RC1_TRIM`.
pub fn mission_planner_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('_');
    let mut right = b.split('_');
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => match l.cmp(r) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}
