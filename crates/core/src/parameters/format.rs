//! Parameter file text format
//!
//! Line-oriented: one `NAME<sep>VALUE[ # comment]` per line where the
//! separator is a comma, space or tab. Blank lines and lines starting
//! with `#` are ignored. Parsing is all-or-nothing.

use core::fmt::Write as _;

use super::error::{ParseError, ParseErrorKind};
use super::name::validate_name;
use super::record::ParameterRecord;
use super::set::ParameterSet;

/// Output dialect for [`export`]
#[derive(Debug, Clone, PartialEq)]
pub enum ExportDialect {
    /// `NAME,VALUE[  # comment]`, trailing zeros stripped
    Compact,
    /// `NAME<pad>VALUE  # comment`, names padded to 16 columns
    FixedWidth,
    /// Fixed-width body preceded by a `#` preamble block
    Annotated {
        /// Free text placed in the preamble, one `#` line per text line
        description: String,
    },
}

/// Parse a parameter file from raw bytes
///
/// Non-UTF-8 content is rejected with a remediation hint.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParameterSet, ParseError> {
    let text = core::str::from_utf8(bytes).map_err(|_| ParseError {
        line: None,
        kind: ParseErrorKind::NotUtf8,
    })?;
    parse(text)
}

/// Parse a parameter file from text
pub fn parse(text: &str) -> Result<ParameterSet, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut params = ParameterSet::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (body, comment) = match line.split_once('#') {
            Some((body, comment)) => (body.trim(), Some(comment.trim())),
            None => (line, None),
        };

        let (name, value) = split_name_value(body)
            .ok_or_else(|| ParseError::at(line_no, ParseErrorKind::MissingValue))?;

        validate_name(name)
            .map_err(|e| ParseError::at(line_no, ParseErrorKind::InvalidName(e)))?;

        let value: f64 = value
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| {
                ParseError::at(line_no, ParseErrorKind::InvalidValue(value.to_string()))
            })?;

        if params.contains(name) {
            return Err(ParseError::at(
                line_no,
                ParseErrorKind::DuplicateName(name.to_string()),
            ));
        }

        let record = match comment {
            Some(c) => ParameterRecord::with_comment(value, c),
            None => ParameterRecord::new(value),
        };
        params.insert(name, record);
    }

    Ok(params)
}

fn split_name_value(body: &str) -> Option<(&str, &str)> {
    let (name, value) = [',', ' ', '\t']
        .iter()
        .find_map(|sep| body.split_once(*sep))?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some((name.trim(), value))
}

/// Render a value with 6 decimals, stripping trailing zeros
pub fn format_compact_value(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Render a parameter set in the given dialect
///
/// Parameters are written in the set's insertion order; call
/// [`ParameterSet::sorted`] first for Mission Planner order.
pub fn export(params: &ParameterSet, dialect: &ExportDialect) -> String {
    let mut out = String::new();

    if let ExportDialect::Annotated { description } = dialect {
        for line in description.lines() {
            let _ = writeln!(out, "# {}", line);
        }
        let _ = writeln!(out, "# {} parameters", params.len());
        out.push('\n');
    }

    for (name, record) in params.iter() {
        match dialect {
            ExportDialect::Compact => {
                let _ = write!(out, "{},{}", name, format_compact_value(record.value));
            }
            ExportDialect::FixedWidth | ExportDialect::Annotated { .. } => {
                let _ = write!(out, "{:<16} {:.6}", name, record.value);
            }
        }
        if let Some(comment) = &record.comment {
            let _ = write!(out, "  # {}", comment);
        }
        out.push('\n');
    }

    out
}
