//! Per-compilation code generation state
//!
//! A [`CgenState`] lives for the compilation of one execution unit's query
//! function. It owns the IR module being built, one [`LiteralBuffer`] per
//! participating device and the cache of literals already materialized into
//! module globals. It is mutated through `&mut` only; concurrent compilations
//! each get their own state.

use super::ir::{CodeValue, GlobalId, IrModule};
use super::literals::{LiteralBuffer, LiteralValue, MAX_STRING_FIELD};
use crate::string_dictionary::StringDictionaryRegistry;
use crate::types::{Constant, EncodingType, NULL_DICT_ID, NULL_DOUBLE, NULL_FLOAT, SqlType};
use crate::{Error, Result};
use std::collections::HashMap;

/// Module globals holding an already decoded hoisted literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializedLiteral {
    /// Scalar value (integer, floating point, boolean or dictionary id)
    Scalar {
        /// Global holding the value
        value: GlobalId,
    },
    /// Unencoded string
    String {
        /// Global holding the start displacement (always 0)
        start: GlobalId,
        /// Global holding the absolute payload address
        start_address: GlobalId,
        /// Global holding the payload length
        length: GlobalId,
    },
}

/// Literal offset -> globals holding its decoded value
#[derive(Debug, Default)]
pub struct GlobalLiteralCache {
    entries: HashMap<usize, MaterializedLiteral>,
}

impl GlobalLiteralCache {
    /// Globals for the literal at `offset`
    pub fn get(&self, offset: usize) -> Option<MaterializedLiteral> {
        self.entries.get(&offset).copied()
    }

    /// Remember the globals for the literal at `offset`
    pub fn insert(&mut self, offset: usize, materialized: MaterializedLiteral) -> Result<()> {
        if self.entries.insert(offset, materialized).is_some() {
            return Err(Error::invariant(format!(
                "literal at offset {offset} materialized twice"
            )));
        }
        Ok(())
    }

    /// Number of materialized literals
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was materialized yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Code generation session for one query function
#[derive(Debug)]
pub struct CgenState {
    module: IrModule,
    literals: Vec<LiteralBuffer>,
    literal_cache: GlobalLiteralCache,
}

impl CgenState {
    /// Start a session compiling for `device_count` devices
    pub fn new(module_name: impl Into<String>, device_count: usize) -> Result<Self> {
        if device_count == 0 {
            return Err(Error::invariant("code generation needs at least one device"));
        }
        Ok(Self {
            module: IrModule::new(module_name),
            literals: vec![LiteralBuffer::new(); device_count],
            literal_cache: GlobalLiteralCache::default(),
        })
    }

    /// Number of devices the function is compiled for
    pub fn device_count(&self) -> usize {
        self.literals.len()
    }

    /// Module under construction
    pub fn module(&self) -> &IrModule {
        &self.module
    }

    /// Mutable module under construction
    pub fn module_mut(&mut self) -> &mut IrModule {
        &mut self.module
    }

    /// Finish the session and keep the module
    pub fn into_module(self) -> IrModule {
        self.module
    }

    /// Next free literal byte of a device
    pub fn literal_bytes_high_watermark(&self, device_id: usize) -> Result<usize> {
        Ok(self.literal_buffer(device_id)?.high_watermark())
    }

    /// Literal buffer of a device
    pub fn literal_buffer(&self, device_id: usize) -> Result<&LiteralBuffer> {
        self.literals
            .get(device_id)
            .ok_or_else(|| Error::invariant(format!("no literal buffer for device {device_id}")))
    }

    /// Serialized literal buffer of every device, in device order
    pub fn serialize_literals(&self) -> Result<Vec<Vec<u8>>> {
        self.literals.iter().map(LiteralBuffer::serialize).collect()
    }

    /// Cache of materialized literals
    pub fn literal_cache(&self) -> &GlobalLiteralCache {
        &self.literal_cache
    }

    /// Mutable cache of materialized literals
    pub fn literal_cache_mut(&mut self) -> &mut GlobalLiteralCache {
        &mut self.literal_cache
    }

    /// Add a string to the module constant pool
    pub fn add_string_constant(&mut self, value: &str) -> CodeValue {
        self.module.add_string_constant(value)
    }

    /// Offset of `constant` in the literal buffer of `device_id`, registering
    /// it if this device has not seen it yet
    pub fn get_or_add_literal(
        &mut self,
        constant: &Constant,
        enc_type: EncodingType,
        dict_id: i32,
        device_id: usize,
        dictionaries: &StringDictionaryRegistry,
    ) -> Result<usize> {
        let value = literal_value(constant, enc_type, dict_id, dictionaries)?;
        let buffer = self
            .literals
            .get_mut(device_id)
            .ok_or_else(|| Error::invariant(format!("no literal buffer for device {device_id}")))?;
        Ok(buffer.get_or_add(value))
    }
}

/// Literal buffer representation of a constant
fn literal_value(
    constant: &Constant,
    enc_type: EncodingType,
    dict_id: i32,
    dictionaries: &StringDictionaryRegistry,
) -> Result<LiteralValue> {
    let type_info = constant.type_info();
    let is_null = constant.is_null();
    let null_or = |int: fn(i64) -> Result<LiteralValue>| -> Result<LiteralValue> {
        if is_null {
            int(type_info.inline_int_null_value()?)
        } else {
            int(type_info.fit_int_storage(constant.int_value()?)?)
        }
    };

    match type_info.codegen_type() {
        SqlType::Boolean => {
            if is_null {
                Ok(LiteralValue::Int8(type_info.inline_int_null_value()? as i8))
            } else if type_info.notnull {
                Ok(LiteralValue::Bool(constant.bool_value()?))
            } else {
                Ok(LiteralValue::Int8(constant.bool_value()? as i8))
            }
        }
        SqlType::SmallInt => null_or(|v| Ok(LiteralValue::Int16(v as i16))),
        SqlType::Int => null_or(|v| Ok(LiteralValue::Int32(v as i32))),
        SqlType::BigInt
        | SqlType::Time
        | SqlType::Timestamp
        | SqlType::Date
        | SqlType::IntervalDayTime
        | SqlType::IntervalYearMonth => null_or(|v| Ok(LiteralValue::Int64(v))),
        SqlType::Float => Ok(LiteralValue::Float(if is_null {
            NULL_FLOAT
        } else {
            constant.float_value()?
        })),
        SqlType::Double => Ok(LiteralValue::Double(if is_null {
            NULL_DOUBLE
        } else {
            constant.double_value()?
        })),
        SqlType::Char | SqlType::Varchar | SqlType::Text => {
            if enc_type == EncodingType::Dict {
                if is_null {
                    // a null id never needs the dictionary contents
                    let null_id = dictionaries
                        .get(dict_id)
                        .map(|dict| dict.null_id())
                        .unwrap_or(NULL_DICT_ID);
                    return Ok(LiteralValue::Int32(null_id));
                }
                let dict = dictionaries.get(dict_id)?;
                return Ok(LiteralValue::Int32(dict.id_of(constant.str_value()?)));
            }
            if is_null {
                return Ok(LiteralValue::Str(String::new()));
            }
            let s = constant.str_value()?;
            if s.len() > MAX_STRING_FIELD {
                return Err(Error::precondition(format!(
                    "string literal of {} bytes exceeds {MAX_STRING_FIELD}",
                    s.len()
                )));
            }
            Ok(LiteralValue::Str(s.to_string()))
        }
        other => Err(Error::invariant(format!(
            "cannot hoist a constant of type {}",
            other.name()
        ))),
    }
}
