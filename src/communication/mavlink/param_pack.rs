//! Packed parameter file decoder
//!
//! ArduPilot exposes all parameters as the virtual file
//! `@PARAM/param.pck`. With `?withdefaults=1` each entry may also carry
//! its factory default.
//!
//! # Format (little endian)
//!
//! - Header: `magic: u16`, `num_params: u16`, `total_params: u16`
//! - Zero bytes between entries are padding
//! - Entry: `type_flags: u8` (low nibble type, high nibble flags, bit 0
//!   of the flags = default follows), `name_info: u8` (low nibble =
//!   characters shared with the previous name, high nibble = new
//!   characters - 1), new name bytes, value, optional default

use ardu_configurator_core::parameters::{ParameterRecord, ParameterSet};

use crate::error::FlightControllerError;

/// Virtual file holding all parameters and their defaults
pub const PARAM_PACK_PATH: &str = "@PARAM/param.pck?withdefaults=1";

/// Header magic without defaults
pub const PARAM_PACK_MAGIC: u16 = 0x671b;

/// Header magic with defaults
pub const PARAM_PACK_MAGIC_DEFAULTS: u16 = 0x671c;

const HEADER_LEN: usize = 6;
const FLAG_HAS_DEFAULT: u8 = 0x01;

/// Value encodings used in the packed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Float = 4,
}

impl PackedType {
    fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            1 => Some(PackedType::Int8),
            2 => Some(PackedType::Int16),
            3 => Some(PackedType::Int32),
            4 => Some(PackedType::Float),
            _ => None,
        }
    }

    /// Encoded size in bytes
    pub fn size(self) -> usize {
        match self {
            PackedType::Int8 => 1,
            PackedType::Int16 => 2,
            PackedType::Int32 | PackedType::Float => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            PackedType::Int8 => bytes[0] as i8 as f64,
            PackedType::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            PackedType::Int32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            PackedType::Float => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        }
    }
}

/// Decoded packed parameter file
#[derive(Debug, Clone, Default)]
pub struct PackedParameters {
    /// Current values
    pub values: ParameterSet,
    /// Factory defaults (values without an explicit default map to themselves)
    pub defaults: ParameterSet,
    /// Total parameter count advertised in the header
    pub total: u16,
}

fn invalid(msg: impl Into<String>) -> FlightControllerError {
    FlightControllerError::InvalidParamPack(msg.into())
}

/// Decode a packed parameter file
pub fn decode_param_pack(data: &[u8]) -> Result<PackedParameters, FlightControllerError> {
    if data.len() < HEADER_LEN {
        return Err(invalid(format!("file too short ({} bytes)", data.len())));
    }
    let magic = u16::from_le_bytes([data[0], data[1]]);
    let num_params = u16::from_le_bytes([data[2], data[3]]);
    let total = u16::from_le_bytes([data[4], data[5]]);
    let with_defaults = match magic {
        PARAM_PACK_MAGIC => false,
        PARAM_PACK_MAGIC_DEFAULTS => true,
        other => return Err(invalid(format!("bad magic 0x{:04x}", other))),
    };

    let mut result = PackedParameters {
        total,
        ..Default::default()
    };
    let mut last_name: Vec<u8> = Vec::new();
    let mut pos = HEADER_LEN;

    loop {
        while pos < data.len() && data[pos] == 0 {
            pos += 1;
        }
        if pos >= data.len() {
            break;
        }
        if pos + 2 > data.len() {
            return Err(invalid("truncated entry header"));
        }

        let type_flags = data[pos];
        let name_info = data[pos + 1];
        let ptype = PackedType::from_nibble(type_flags & 0x0f)
            .ok_or_else(|| invalid(format!("unknown type {}", type_flags & 0x0f)))?;
        let has_default = with_defaults && (type_flags >> 4) & FLAG_HAS_DEFAULT != 0;
        let common_len = (name_info & 0x0f) as usize;
        let name_len = ((name_info >> 4) & 0x0f) as usize + 1;
        pos += 2;

        if common_len > last_name.len() {
            return Err(invalid("name prefix longer than previous name"));
        }
        let value_len = ptype.size() * if has_default { 2 } else { 1 };
        if pos + name_len + value_len > data.len() {
            return Err(invalid("truncated entry"));
        }

        let mut name = last_name[..common_len].to_vec();
        name.extend_from_slice(&data[pos..pos + name_len]);
        pos += name_len;

        let value = ptype.decode(&data[pos..]);
        let default = if has_default {
            ptype.decode(&data[pos + ptype.size()..])
        } else {
            value
        };
        pos += value_len;

        let name_str =
            String::from_utf8(name.clone()).map_err(|_| invalid("parameter name is not UTF-8"))?;
        result.values.insert(name_str.clone(), ParameterRecord::new(value));
        if with_defaults {
            result.defaults.insert(name_str, ParameterRecord::new(default));
        }
        last_name = name;
    }

    if result.values.len() != num_params as usize {
        crate::log_warn!(
            "Packed parameter file announced {} parameters but contained {}",
            num_params,
            result.values.len()
        );
    }

    Ok(result)
}
