//! Parameter data model
//!
//! Value/comment records, tolerance comparison, the ordered
//! `ParameterSet` with its diff/merge/categorize operations, and the
//! text file dialects. Nothing in here performs I/O.

pub mod documentation;
pub mod error;
pub mod format;
pub mod name;
pub mod record;
pub mod set;

pub use documentation::{ParamDocFlags, ParameterDoc, ParameterDocumentation};
pub use error::{ParseError, ParseErrorKind, ValidationError};
pub use format::{export, format_compact_value, parse, parse_bytes, ExportDialect};
pub use name::{mission_planner_cmp, validate_name, validate_name_and_value, MAX_NAME_LEN};
pub use record::{is_within_tolerance, ParameterRecord, Tolerance, DEFAULT_ATOL, DEFAULT_RTOL};
pub use set::{CategorizedParameters, ParameterSet};
