//! Constant code generation and literal hoisting
//!
//! A constant is either embedded as an immediate or hoisted into the literal
//! buffer. Hoisted literals are decoded once in the query function's entry
//! block, stored into module globals, and every use in the body reloads the
//! global. Registering the same literal again in the same session leaves the
//! literal buffer's high-water mark untouched, which is how a repeat is told
//! apart from a first sighting.

use super::cgen_state::{CgenState, MaterializedLiteral};
use super::ir::{Block, CodeValue, IrType, LITERALS_ARG};
use super::literals::{MAX_STRING_FIELD, STRING_LENGTH_MASK, STRING_OFFSET_MASK, STRING_OFFSET_SHIFT};
use super::CompilationOptions;
use crate::string_dictionary::StringDictionaryRegistry;
use crate::types::{Constant, EncodingType, NULL_DICT_ID, NULL_DOUBLE, NULL_FLOAT, SqlType};
use crate::{Error, Result};
use tracing::debug;

/// Generates code for constants within one [`CgenState`]
pub struct ConstantCodegen<'a> {
    state: &'a mut CgenState,
    dictionaries: &'a StringDictionaryRegistry,
}

impl<'a> ConstantCodegen<'a> {
    /// Bind the generator to a session and the dictionaries used to encode
    /// string constants
    pub fn new(state: &'a mut CgenState, dictionaries: &'a StringDictionaryRegistry) -> Self {
        Self {
            state,
            dictionaries,
        }
    }

    /// Values representing `constant` in the generated function.
    ///
    /// Returns one value for scalars and dictionary ids and three values
    /// (start, address, length) for unencoded strings.
    pub fn codegen(
        &mut self,
        constant: &Constant,
        enc_type: EncodingType,
        dict_id: i32,
        co: &CompilationOptions,
    ) -> Result<Vec<CodeValue>> {
        if co.hoist_literals {
            // every device must see the same literal set
            let constants = vec![constant; self.state.device_count()];
            return self.codegen_hoisted_constants(&constants, enc_type, dict_id);
        }

        let type_info = constant.type_info();
        match type_info.codegen_type() {
            SqlType::Boolean => {
                if constant.is_null() {
                    return Ok(vec![CodeValue::int(8, type_info.inline_int_null_value()?)]);
                }
                let value = constant.bool_value()? as i64;
                let bits = if type_info.notnull { 1 } else { 8 };
                Ok(vec![CodeValue::int(bits, value)])
            }
            SqlType::SmallInt
            | SqlType::Int
            | SqlType::BigInt
            | SqlType::Time
            | SqlType::Timestamp
            | SqlType::Date
            | SqlType::IntervalDayTime
            | SqlType::IntervalYearMonth => Ok(vec![codegen_int_const(constant)?]),
            SqlType::Float => Ok(vec![CodeValue::ConstFloat(if constant.is_null() {
                NULL_FLOAT
            } else {
                constant.float_value()?
            })]),
            SqlType::Double => Ok(vec![CodeValue::ConstDouble(if constant.is_null() {
                NULL_DOUBLE
            } else {
                constant.double_value()?
            })]),
            SqlType::Char | SqlType::Varchar | SqlType::Text => {
                if constant.is_null() {
                    if enc_type == EncodingType::Dict {
                        let null_id = self
                            .dictionaries
                            .get(dict_id)
                            .map(|dict| dict.null_id())
                            .unwrap_or(NULL_DICT_ID);
                        return Ok(vec![CodeValue::int(32, null_id as i64)]);
                    }
                    return Ok(vec![
                        CodeValue::int(64, 0),
                        CodeValue::NullPtr,
                        CodeValue::int(32, 0),
                    ]);
                }
                let s = constant.str_value()?;
                if enc_type == EncodingType::Dict {
                    let id = self.dictionaries.get(dict_id)?.id_of(s);
                    return Ok(vec![CodeValue::int(32, id as i64)]);
                }
                if s.len() > MAX_STRING_FIELD {
                    return Err(Error::precondition(format!(
                        "string constant of {} bytes exceeds {MAX_STRING_FIELD}",
                        s.len()
                    )));
                }
                Ok(vec![
                    CodeValue::int(64, 0),
                    self.state.add_string_constant(s),
                    CodeValue::int(32, s.len() as i64),
                ])
            }
            other => Err(Error::invariant(format!(
                "unsupported constant type {} reached code generation",
                other.name()
            ))),
        }
    }

    /// Values reading the hoisted literal from each device's literal buffer.
    ///
    /// `constants` holds one copy of the literal per device; all must share
    /// the same type. The returned values have the same shape as
    /// [`ConstantCodegen::codegen`].
    pub fn codegen_hoisted_constants(
        &mut self,
        constants: &[&Constant],
        enc_type: EncodingType,
        dict_id: i32,
    ) -> Result<Vec<CodeValue>> {
        let first = constants
            .first()
            .ok_or_else(|| Error::invariant("no constants to hoist"))?;
        let type_info = *first.type_info();

        let initial_watermark = self.state.literal_bytes_high_watermark(0)?;

        let mut lit_off: Option<usize> = None;
        for (device_id, constant) in constants.iter().enumerate() {
            if *constant.type_info() != type_info {
                return Err(Error::invariant(format!(
                    "device {device_id} hoists a {} literal, device 0 a {}",
                    constant.type_info(),
                    type_info
                )));
            }
            let dev_lit_off = self.state.get_or_add_literal(
                constant,
                enc_type,
                dict_id,
                device_id,
                self.dictionaries,
            )?;
            match lit_off {
                None => lit_off = Some(dev_lit_off),
                Some(off) if off != dev_lit_off => {
                    return Err(Error::invariant(format!(
                        "device {device_id} placed literal at offset {dev_lit_off}, device 0 at {off}"
                    )));
                }
                Some(_) => {}
            }
        }
        let lit_off = lit_off.ok_or_else(|| Error::invariant("literal was not registered"))?;

        let allocated_watermark = self.state.literal_bytes_high_watermark(0)?;
        let is_unencoded_string = type_info.is_string() && enc_type != EncodingType::Dict;

        if allocated_watermark == initial_watermark {
            debug!(offset = lit_off, "reusing materialized literal");
            return self.load_materialized_literal(lit_off, is_unencoded_string);
        }

        debug!(
            offset = lit_off,
            type_info = %type_info,
            devices = constants.len(),
            "hoisting literal"
        );
        let literal_name = format!("literal_{lit_off}");
        let module = self.state.module_mut();
        let lit_buff = module
            .arg_by_name(LITERALS_ARG)
            .ok_or_else(|| Error::invariant("query function has no literals argument"))?;
        let lit_buf_start = module.gep(
            Block::Entry,
            lit_buff.clone(),
            CodeValue::int(64, lit_off as i64),
        );

        let materialized = if is_unencoded_string {
            // packed offset + length, 16 bits each
            let off_and_len = module.load(Block::Entry, lit_buf_start, IrType::Int(32));
            let masked = module.and(
                Block::Entry,
                off_and_len.clone(),
                CodeValue::int(32, STRING_OFFSET_MASK as i64),
            );
            let off = module.lshr(
                Block::Entry,
                masked,
                CodeValue::int(32, STRING_OFFSET_SHIFT as i64),
            );
            let len = module.and(
                Block::Entry,
                off_and_len,
                CodeValue::int(32, STRING_LENGTH_MASK as i64),
            );

            let var_start = CodeValue::int(64, 0);
            let var_start_address = module.gep(Block::Entry, lit_buff, off);
            module.set_name(&var_start_address, format!("{literal_name}_start_address"));
            module.set_name(&len, format!("{literal_name}_length"));

            let start = module.add_global(format!("global_{literal_name}_start"), var_start.ty())?;
            let start_address = module.add_global(
                format!("global_{literal_name}_start_address"),
                var_start_address.ty(),
            )?;
            let length = module.add_global(format!("global_{literal_name}_length"), len.ty())?;

            module.store(Block::Entry, var_start, start);
            module.store(Block::Entry, var_start_address, start_address);
            module.store(Block::Entry, len, length);

            MaterializedLiteral::String {
                start,
                start_address,
                length,
            }
        } else {
            let val_bits = type_info.bit_width()?;
            if val_bits % 8 != 0 {
                return Err(Error::invariant(format!(
                    "literal width of {val_bits} bits is not byte-sized"
                )));
            }
            let val_ty = match type_info.codegen_type() {
                SqlType::Float => IrType::Float,
                SqlType::Double => IrType::Double,
                _ => IrType::Int(val_bits),
            };
            let lit_lv = module.load(Block::Entry, lit_buf_start, val_ty);

            let to_return = if type_info.is_boolean() && type_info.notnull && val_bits > 1 {
                module.icmp_sgt(Block::Entry, lit_lv, CodeValue::int(val_bits, 0))
            } else {
                lit_lv
            };
            module.set_name(&to_return, literal_name.clone());

            let value = module.add_global(format!("global_{literal_name}"), to_return.ty())?;
            module.store(Block::Entry, to_return, value);

            MaterializedLiteral::Scalar { value }
        };

        self.state.literal_cache_mut().insert(lit_off, materialized)?;
        self.load_materialized_literal(lit_off, is_unencoded_string)
    }

    fn load_materialized_literal(
        &mut self,
        lit_off: usize,
        is_unencoded_string: bool,
    ) -> Result<Vec<CodeValue>> {
        let materialized = self.state.literal_cache().get(lit_off).ok_or_else(|| {
            Error::invariant(format!(
                "literal at offset {lit_off} was registered but never materialized"
            ))
        })?;
        let module = self.state.module_mut();
        match (materialized, is_unencoded_string) {
            (
                MaterializedLiteral::String {
                    start,
                    start_address,
                    length,
                },
                true,
            ) => Ok(vec![
                module.load_global(Block::Body, start),
                module.load_global(Block::Body, start_address),
                module.load_global(Block::Body, length),
            ]),
            (MaterializedLiteral::Scalar { value }, false) => {
                Ok(vec![module.load_global(Block::Body, value)])
            }
            _ => Err(Error::invariant(format!(
                "literal at offset {lit_off} was materialized with a different shape"
            ))),
        }
    }
}

fn codegen_int_const(constant: &Constant) -> Result<CodeValue> {
    let type_info = constant.type_info();
    let bits = type_info.bit_width()?;
    let value = if constant.is_null() {
        type_info.inline_int_null_value()?
    } else {
        type_info.fit_int_storage(constant.int_value()?)?
    };
    Ok(CodeValue::int(bits, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ExecutorDeviceType;
    use crate::codegen::ir::{Instruction, Pointer, RuntimeValue};
    use crate::string_dictionary::InMemoryStringDictionary;
    use crate::types::TypeInfo;
    use std::sync::Arc;

    fn no_hoist() -> CompilationOptions {
        CompilationOptions {
            device_type: ExecutorDeviceType::Cpu,
            hoist_literals: false,
        }
    }

    fn hoist() -> CompilationOptions {
        CompilationOptions {
            device_type: ExecutorDeviceType::Gpu,
            hoist_literals: true,
        }
    }

    fn dictionaries() -> StringDictionaryRegistry {
        let registry = StringDictionaryRegistry::new();
        registry.register(3, Arc::new(InMemoryStringDictionary::from_values(["foo", "bar"])));
        registry
    }

    #[test]
    fn test_boolean_immediates() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 1).unwrap();
        let mut cg = ConstantCodegen::new(&mut state, &dicts);

        let v = cg
            .codegen(&Constant::boolean(true).not_null(), EncodingType::None, 0, &no_hoist())
            .unwrap();
        assert_eq!(v, vec![CodeValue::int(1, 1)]);

        let v = cg
            .codegen(&Constant::boolean(false), EncodingType::None, 0, &no_hoist())
            .unwrap();
        assert_eq!(v, vec![CodeValue::int(8, 0)]);

        let v = cg
            .codegen(
                &Constant::null(TypeInfo::new(SqlType::Boolean)),
                EncodingType::None,
                0,
                &no_hoist(),
            )
            .unwrap();
        assert_eq!(v, vec![CodeValue::int(8, i8::MIN as i64)]);
    }

    #[test]
    fn test_unsupported_type_is_invariant_violation() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 1).unwrap();
        let mut cg = ConstantCodegen::new(&mut state, &dicts);
        let point = Constant::null(TypeInfo::new(SqlType::Point));
        for co in [no_hoist(), hoist()] {
            let err = cg.codegen(&point, EncodingType::None, 0, &co).unwrap_err();
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_dict_string_immediate() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 1).unwrap();
        let mut cg = ConstantCodegen::new(&mut state, &dicts);
        let v = cg
            .codegen(&Constant::dict_text("bar", 3), EncodingType::Dict, 3, &no_hoist())
            .unwrap();
        assert_eq!(v, vec![CodeValue::int(32, 1)]);
    }

    #[test]
    fn test_hoisted_scalar_first_and_second_pass() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 2).unwrap();
        let c = Constant::int(42);

        let first = ConstantCodegen::new(&mut state, &dicts)
            .codegen(&c, EncodingType::None, 0, &hoist())
            .unwrap();
        let entry_after_first = state.module().instruction_count(Block::Entry);
        // gep + load + store
        assert_eq!(entry_after_first, 3);
        assert_eq!(state.literal_bytes_high_watermark(0).unwrap(), 4);

        let second = ConstantCodegen::new(&mut state, &dicts)
            .codegen(&c, EncodingType::None, 0, &hoist())
            .unwrap();
        assert_eq!(state.module().instruction_count(Block::Entry), entry_after_first);
        assert_eq!(state.literal_bytes_high_watermark(0).unwrap(), 4);
        assert_eq!(state.literal_cache().len(), 1);

        for values in [&first, &second] {
            assert_eq!(values.len(), 1);
            assert!(matches!(
                state.module().defining_instruction(&values[0]),
                Some(Instruction::LoadGlobal { .. })
            ));
        }
        assert!(state.module().global_by_name("global_literal_0").is_some());
    }

    #[test]
    fn test_hoisted_not_null_boolean_is_normalized() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 1).unwrap();
        let v = ConstantCodegen::new(&mut state, &dicts)
            .codegen(&Constant::boolean(true).not_null(), EncodingType::None, 0, &hoist())
            .unwrap();
        assert_eq!(v[0].ty(), IrType::Int(1));
        let literals = state.serialize_literals().unwrap();
        let out = state.module().evaluate(&literals[0], &v).unwrap();
        assert_eq!(out[0], RuntimeValue::Int { bits: 1, value: 1 });
    }

    #[test]
    fn test_hoisted_string_reads_back() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 2).unwrap();
        let v = ConstantCodegen::new(&mut state, &dicts)
            .codegen(&Constant::text("hello"), EncodingType::None, 0, &hoist())
            .unwrap();
        assert_eq!(v.len(), 3);
        assert!(state.module().global_by_name("global_literal_0_start_address").is_some());

        for literals in state.serialize_literals().unwrap() {
            let out = state.module().evaluate(&literals, &v).unwrap();
            assert_eq!(out[0].as_int(), Some(0));
            let len = out[2].as_int().unwrap() as usize;
            let ptr = out[1].as_ptr().unwrap();
            assert_eq!(ptr, Pointer::Literals(4));
            let bytes = state.module().read_bytes(&literals, ptr, len).unwrap();
            assert_eq!(bytes, b"hello");
        }
    }

    #[test]
    fn test_mismatched_device_types_rejected() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 2).unwrap();
        let a = Constant::int(1);
        let b = Constant::bigint(1);
        let err = ConstantCodegen::new(&mut state, &dicts)
            .codegen_hoisted_constants(&[&a, &b], EncodingType::None, 0)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_hoist_rejected() {
        let dicts = dictionaries();
        let mut state = CgenState::new("m", 1).unwrap();
        let err = ConstantCodegen::new(&mut state, &dicts)
            .codegen_hoisted_constants(&[], EncodingType::None, 0)
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
