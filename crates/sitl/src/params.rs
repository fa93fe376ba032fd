//! Parameter table of the simulated flight controller.
//!
//! Values are held as `f32`, the width MAVLink carries, so a round trip
//! through the simulator shows the same rounding a real autopilot does.

use ardu_configurator_core::parameters::validate_name_and_value;

use crate::error::SimulatorError;

/// Packed file magic without defaults.
pub const PACK_MAGIC: u16 = 0x671b;
/// Packed file magic with defaults.
pub const PACK_MAGIC_DEFAULTS: u16 = 0x671c;

/// One simulated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct SimParameter {
    pub name: String,
    pub value: f32,
    pub default: f32,
}

/// Name-sorted parameter table.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    entries: Vec<SimParameter>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace a parameter.
    pub fn insert(&mut self, name: &str, value: f64, default: f64) -> Result<(), SimulatorError> {
        validate_name_and_value(name, value)?;
        validate_name_and_value(name, default)?;
        let param = SimParameter {
            name: name.to_string(),
            value: value as f32,
            default: default as f32,
        };
        match self.position(name) {
            Ok(i) => self.entries[i] = param,
            Err(i) => self.entries.insert(i, param),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SimParameter> {
        self.position(name).ok().map(|i| &self.entries[i])
    }

    /// Index reported in PARAM_VALUE messages.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.position(name).ok()
    }

    /// Store a new value, returning what was stored.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<f32, SimulatorError> {
        let i = self
            .position(name)
            .map_err(|_| SimulatorError::ParameterNotFound(name.to_string()))?;
        self.entries[i].value = value as f32;
        Ok(self.entries[i].value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimParameter> {
        self.entries.iter()
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|p| p.name.as_str().cmp(name))
    }

    /// Encode the table as `@PARAM/param.pck`.
    pub fn encode_pack(&self, with_defaults: bool) -> Vec<u8> {
        let magic = if with_defaults {
            PACK_MAGIC_DEFAULTS
        } else {
            PACK_MAGIC
        };
        let count = self.entries.len() as u16;
        let mut out = Vec::with_capacity(6 + self.entries.len() * 12);
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());

        let mut last: &[u8] = &[];
        for param in &self.entries {
            let name = param.name.as_bytes();
            let common = name
                .iter()
                .zip(last)
                .take_while(|(a, b)| a == b)
                .count()
                .min(15)
                .min(name.len() - 1);
            let has_default =
                with_defaults && param.default.to_bits() != param.value.to_bits();
            let ty = if has_default {
                PackType::fitting(param.value).max(PackType::fitting(param.default))
            } else {
                PackType::fitting(param.value)
            };

            out.push(ty as u8 | if has_default { 0x10 } else { 0 });
            out.push(((name.len() - common - 1) << 4) as u8 | common as u8);
            out.extend_from_slice(&name[common..]);
            ty.encode(param.value, &mut out);
            if has_default {
                ty.encode(param.default, &mut out);
            }
            last = name;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PackType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Float = 4,
}

impl PackType {
    /// Smallest encoding that holds `value` exactly.
    fn fitting(value: f32) -> Self {
        if value.fract() != 0.0 || value.abs() >= 16_777_216.0 {
            PackType::Float
        } else if (i8::MIN as f32..=i8::MAX as f32).contains(&value) {
            PackType::Int8
        } else if (i16::MIN as f32..=i16::MAX as f32).contains(&value) {
            PackType::Int16
        } else {
            PackType::Int32
        }
    }

    fn encode(self, value: f32, out: &mut Vec<u8>) {
        match self {
            PackType::Int8 => out.push(value as i8 as u8),
            PackType::Int16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            PackType::Int32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            PackType::Float => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}
