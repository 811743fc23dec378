//! Recording IR module
//!
//! Stand-in for the native code generator. It records the instructions the
//! compiler emits into a single query function with two blocks:
//!
//! - `entry`: runs once per kernel invocation, before the row loop. Hoisted
//!   literals are decoded here and stored into module globals.
//! - `body`: the per-row code. It only reads the globals.
//!
//! [`IrModule::evaluate`] interprets the function against a device literal
//! buffer, which is how kernels are "run" by the executor and how tests check
//! that generated code reads back the constants it was given.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Name of the query function argument pointing at the literal buffer
pub const LITERALS_ARG: &str = "literals";

/// Value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Integer of the given bit width
    Int(u32),
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Byte pointer
    Ptr,
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(bits) => write!(f, "i{bits}"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Ptr => f.write_str("i8*"),
        }
    }
}

/// Index of an instruction in the query function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(usize);

/// Index of a module global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(usize);

/// Block an instruction is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Function entry, executed once before the body
    Entry,
    /// Function body
    Body,
}

/// A value usable as an instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum CodeValue {
    /// Integer immediate
    ConstInt {
        /// Bit width
        bits: u32,
        /// Value, sign-extended to 64 bits
        value: i64,
    },
    /// Float immediate
    ConstFloat(f32),
    /// Double immediate
    ConstDouble(f64),
    /// Null byte pointer
    NullPtr,
    /// Pointer to a string in the module constant pool
    StringConstant(usize),
    /// Query function argument
    Arg(usize),
    /// Result of an instruction
    Inst {
        /// Producing instruction
        id: InstId,
        /// Result type
        ty: IrType,
    },
}

impl CodeValue {
    /// Integer immediate of the given width
    pub fn int(bits: u32, value: i64) -> Self {
        Self::ConstInt {
            bits,
            value: sign_extend(bits, value as u64),
        }
    }

    /// Type of the value
    pub fn ty(&self) -> IrType {
        match self {
            Self::ConstInt { bits, .. } => IrType::Int(*bits),
            Self::ConstFloat(_) => IrType::Float,
            Self::ConstDouble(_) => IrType::Double,
            Self::NullPtr | Self::StringConstant(_) | Self::Arg(_) => IrType::Ptr,
            Self::Inst { ty, .. } => *ty,
        }
    }

    /// Whether the value is an immediate
    pub fn is_constant(&self) -> bool {
        !matches!(self, Self::Arg(_) | Self::Inst { .. })
    }

    /// Immediate integer value, if any
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Self::ConstInt { value, .. } => Some(*value),
            _ => None,
        }
    }

    fn inst_id(&self) -> Option<InstId> {
        match self {
            Self::Inst { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Recorded instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `base + offset` in bytes
    Gep {
        /// Base pointer
        base: CodeValue,
        /// Byte offset
        offset: CodeValue,
    },
    /// Typed load through a pointer
    Load {
        /// Address
        ptr: CodeValue,
        /// Loaded type
        ty: IrType,
    },
    /// Bitwise and
    And {
        /// Left operand
        lhs: CodeValue,
        /// Right operand
        rhs: CodeValue,
    },
    /// Logical shift right
    LShr {
        /// Value
        lhs: CodeValue,
        /// Shift amount
        rhs: CodeValue,
    },
    /// Signed greater-than comparison, yields `i1`
    ICmpSgt {
        /// Left operand
        lhs: CodeValue,
        /// Right operand
        rhs: CodeValue,
    },
    /// Store into a module global
    Store {
        /// Stored value
        value: CodeValue,
        /// Destination
        global: GlobalId,
    },
    /// Load from a module global
    LoadGlobal {
        /// Source
        global: GlobalId,
    },
}

#[derive(Debug, Clone)]
struct InstructionRecord {
    inst: Instruction,
    ty: Option<IrType>,
    name: Option<String>,
}

/// Module-level named storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    /// Global name
    pub name: String,
    /// Stored type
    pub ty: IrType,
}

/// The generated query function
#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Function name
    pub name: String,
    args: Vec<(String, IrType)>,
    instructions: Vec<InstructionRecord>,
    entry: Vec<InstId>,
    body: Vec<InstId>,
}

impl IrFunction {
    fn new(name: impl Into<String>, args: Vec<(String, IrType)>) -> Self {
        Self {
            name: name.into(),
            args,
            instructions: Vec::new(),
            entry: Vec::new(),
            body: Vec::new(),
        }
    }

    fn block(&self, block: Block) -> &[InstId] {
        match block {
            Block::Entry => &self.entry,
            Block::Body => &self.body,
        }
    }
}

/// Module holding one query function, its globals and its string constants
#[derive(Debug, Clone)]
pub struct IrModule {
    name: String,
    globals: Vec<GlobalVariable>,
    global_index: HashMap<String, GlobalId>,
    string_constants: Vec<String>,
    query_func: IrFunction,
}

impl IrModule {
    /// Create a module whose query function takes the literal buffer pointer
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            query_func: IrFunction::new(
                format!("{name}_query_func"),
                vec![(LITERALS_ARG.to_string(), IrType::Ptr)],
            ),
            name,
            globals: Vec::new(),
            global_index: HashMap::new(),
            string_constants: Vec::new(),
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The query function
    pub fn query_func(&self) -> &IrFunction {
        &self.query_func
    }

    /// Query function argument by name
    pub fn arg_by_name(&self, name: &str) -> Option<CodeValue> {
        self.query_func
            .args
            .iter()
            .position(|(arg, _)| arg == name)
            .map(CodeValue::Arg)
    }

    /// Add a string to the constant pool and return a pointer to its bytes.
    /// Identical strings share one pool entry.
    pub fn add_string_constant(&mut self, value: &str) -> CodeValue {
        if let Some(index) = self.string_constants.iter().position(|s| s == value) {
            return CodeValue::StringConstant(index);
        }
        self.string_constants.push(value.to_string());
        CodeValue::StringConstant(self.string_constants.len() - 1)
    }

    /// Strings in the constant pool
    pub fn string_constants(&self) -> &[String] {
        &self.string_constants
    }

    /// Create a named global. Names are unique within the module.
    pub fn add_global(&mut self, name: impl Into<String>, ty: IrType) -> Result<GlobalId> {
        let name = name.into();
        if self.global_index.contains_key(&name) {
            return Err(Error::invariant(format!("global {name} defined twice")));
        }
        let id = GlobalId(self.globals.len());
        self.global_index.insert(name.clone(), id);
        self.globals.push(GlobalVariable { name, ty });
        Ok(id)
    }

    /// Global by name
    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.global_index.get(name).copied()
    }

    /// Global definition
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.0]
    }

    /// All globals in definition order
    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    /// Byte pointer arithmetic
    pub fn gep(&mut self, block: Block, base: CodeValue, offset: CodeValue) -> CodeValue {
        self.push(block, Instruction::Gep { base, offset }, Some(IrType::Ptr))
    }

    /// Typed load
    pub fn load(&mut self, block: Block, ptr: CodeValue, ty: IrType) -> CodeValue {
        self.push(block, Instruction::Load { ptr, ty }, Some(ty))
    }

    /// Bitwise and
    pub fn and(&mut self, block: Block, lhs: CodeValue, rhs: CodeValue) -> CodeValue {
        let ty = lhs.ty();
        self.push(block, Instruction::And { lhs, rhs }, Some(ty))
    }

    /// Logical shift right
    pub fn lshr(&mut self, block: Block, lhs: CodeValue, rhs: CodeValue) -> CodeValue {
        let ty = lhs.ty();
        self.push(block, Instruction::LShr { lhs, rhs }, Some(ty))
    }

    /// Signed greater-than
    pub fn icmp_sgt(&mut self, block: Block, lhs: CodeValue, rhs: CodeValue) -> CodeValue {
        self.push(block, Instruction::ICmpSgt { lhs, rhs }, Some(IrType::Int(1)))
    }

    /// Store into a global
    pub fn store(&mut self, block: Block, value: CodeValue, global: GlobalId) {
        self.push(block, Instruction::Store { value, global }, None);
    }

    /// Load from a global
    pub fn load_global(&mut self, block: Block, global: GlobalId) -> CodeValue {
        let ty = self.globals[global.0].ty;
        self.push(block, Instruction::LoadGlobal { global }, Some(ty))
    }

    /// Name an instruction result. Immediates carry no name.
    pub fn set_name(&mut self, value: &CodeValue, name: impl Into<String>) {
        if let Some(id) = value.inst_id() {
            self.query_func.instructions[id.0].name = Some(name.into());
        }
    }

    /// Name of an instruction result
    pub fn value_name(&self, value: &CodeValue) -> Option<&str> {
        value
            .inst_id()
            .and_then(|id| self.query_func.instructions[id.0].name.as_deref())
    }

    /// Instructions of a block, in order
    pub fn instructions(&self, block: Block) -> impl Iterator<Item = &Instruction> + '_ {
        self.query_func
            .block(block)
            .iter()
            .map(move |id| &self.query_func.instructions[id.0].inst)
    }

    /// Number of instructions in a block
    pub fn instruction_count(&self, block: Block) -> usize {
        self.query_func.block(block).len()
    }

    /// Instruction producing `value`, if it is an instruction result
    pub fn defining_instruction(&self, value: &CodeValue) -> Option<&Instruction> {
        value
            .inst_id()
            .map(|id| &self.query_func.instructions[id.0].inst)
    }

    fn push(&mut self, block: Block, inst: Instruction, ty: Option<IrType>) -> CodeValue {
        let id = InstId(self.query_func.instructions.len());
        self.query_func.instructions.push(InstructionRecord {
            inst,
            ty,
            name: None,
        });
        match block {
            Block::Entry => self.query_func.entry.push(id),
            Block::Body => self.query_func.body.push(id),
        }
        // stores have no result; callers never use the returned value
        CodeValue::Inst {
            id,
            ty: ty.unwrap_or(IrType::Int(0)),
        }
    }

    /// Run the query function against `literals` and return the runtime
    /// values of `outputs`.
    pub fn evaluate(&self, literals: &[u8], outputs: &[CodeValue]) -> Result<Vec<RuntimeValue>> {
        let mut frame = Frame {
            module: self,
            literals,
            values: vec![None; self.query_func.instructions.len()],
            globals: vec![None; self.globals.len()],
        };
        for id in self.query_func.entry.iter().chain(self.query_func.body.iter()) {
            frame.execute(*id)?;
        }
        outputs.iter().map(|value| frame.resolve(value)).collect()
    }

    /// Bytes behind a pointer produced by [`IrModule::evaluate`]
    pub fn read_bytes<'a>(
        &'a self,
        literals: &'a [u8],
        ptr: Pointer,
        len: usize,
    ) -> Result<&'a [u8]> {
        let (bytes, offset): (&[u8], usize) = match ptr {
            Pointer::Null if len == 0 => return Ok(&[]),
            Pointer::Null => return Err(Error::invariant("read through a null pointer")),
            Pointer::Literals(offset) => (literals, offset),
            Pointer::StringConstant { index, offset } => (
                self.string_constants
                    .get(index)
                    .ok_or_else(|| Error::invariant(format!("no string constant {index}")))?
                    .as_bytes(),
                offset,
            ),
        };
        bytes
            .get(offset..offset + len)
            .ok_or_else(|| Error::invariant(format!("read of {len} bytes at {offset} out of bounds")))
    }
}

/// Address produced while evaluating a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    /// Null pointer
    Null,
    /// Offset into the device literal buffer
    Literals(usize),
    /// Offset into a string of the module constant pool
    StringConstant {
        /// Pool index
        index: usize,
        /// Byte offset inside the string
        offset: usize,
    },
}

/// Value produced while evaluating a module
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    /// Integer of the given width, sign-extended
    Int {
        /// Bit width
        bits: u32,
        /// Value
        value: i64,
    },
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Pointer
    Ptr(Pointer),
}

impl RuntimeValue {
    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Pointer payload
    pub fn as_ptr(&self) -> Option<Pointer> {
        match self {
            Self::Ptr(p) => Some(*p),
            _ => None,
        }
    }
}

struct Frame<'a> {
    module: &'a IrModule,
    literals: &'a [u8],
    values: Vec<Option<RuntimeValue>>,
    globals: Vec<Option<RuntimeValue>>,
}

impl Frame<'_> {
    fn resolve(&self, value: &CodeValue) -> Result<RuntimeValue> {
        Ok(match value {
            CodeValue::ConstInt { bits, value } => RuntimeValue::Int {
                bits: *bits,
                value: *value,
            },
            CodeValue::ConstFloat(v) => RuntimeValue::Float(*v),
            CodeValue::ConstDouble(v) => RuntimeValue::Double(*v),
            CodeValue::NullPtr => RuntimeValue::Ptr(Pointer::Null),
            CodeValue::StringConstant(index) => RuntimeValue::Ptr(Pointer::StringConstant {
                index: *index,
                offset: 0,
            }),
            CodeValue::Arg(index) => match self.module.query_func.args.get(*index) {
                Some((name, _)) if name == LITERALS_ARG => RuntimeValue::Ptr(Pointer::Literals(0)),
                _ => return Err(Error::invariant(format!("unbound function argument {index}"))),
            },
            CodeValue::Inst { id, .. } => self.values[id.0].ok_or_else(|| {
                Error::invariant(format!("instruction %{} used before it executed", id.0))
            })?,
        })
    }

    fn resolve_int(&self, value: &CodeValue) -> Result<(u32, i64)> {
        match self.resolve(value)? {
            RuntimeValue::Int { bits, value } => Ok((bits, value)),
            other => Err(Error::invariant(format!("expected an integer, got {other:?}"))),
        }
    }

    fn execute(&mut self, id: InstId) -> Result<()> {
        let module = self.module;
        let record = &module.query_func.instructions[id.0];
        let result = match &record.inst {
            Instruction::Gep { base, offset } => {
                let (_, off) = self.resolve_int(offset)?;
                let off = usize::try_from(off)
                    .map_err(|_| Error::invariant(format!("negative pointer offset {off}")))?;
                let ptr = match self.resolve(base)? {
                    RuntimeValue::Ptr(Pointer::Literals(base)) => Pointer::Literals(base + off),
                    RuntimeValue::Ptr(Pointer::StringConstant { index, offset }) => {
                        Pointer::StringConstant {
                            index,
                            offset: offset + off,
                        }
                    }
                    other => return Err(Error::invariant(format!("gep on {other:?}"))),
                };
                Some(RuntimeValue::Ptr(ptr))
            }
            Instruction::Load { ptr, ty } => {
                let ptr = self
                    .resolve(ptr)?
                    .as_ptr()
                    .ok_or_else(|| Error::invariant("load through a non-pointer"))?;
                Some(self.load(ptr, *ty)?)
            }
            Instruction::And { lhs, rhs } => {
                let (bits, l) = self.resolve_int(lhs)?;
                let (_, r) = self.resolve_int(rhs)?;
                Some(RuntimeValue::Int {
                    bits,
                    value: sign_extend(bits, (l & r) as u64),
                })
            }
            Instruction::LShr { lhs, rhs } => {
                let (bits, l) = self.resolve_int(lhs)?;
                let (_, r) = self.resolve_int(rhs)?;
                let unsigned = (l as u64) & width_mask(bits);
                Some(RuntimeValue::Int {
                    bits,
                    value: sign_extend(bits, unsigned >> r),
                })
            }
            Instruction::ICmpSgt { lhs, rhs } => {
                let (_, l) = self.resolve_int(lhs)?;
                let (_, r) = self.resolve_int(rhs)?;
                Some(RuntimeValue::Int {
                    bits: 1,
                    value: (l > r) as i64,
                })
            }
            Instruction::Store { value, global } => {
                self.globals[global.0] = Some(self.resolve(value)?);
                None
            }
            Instruction::LoadGlobal { global } => Some(self.globals[global.0].ok_or_else(|| {
                Error::invariant(format!(
                    "global {} read before it was stored",
                    self.module.globals[global.0].name
                ))
            })?),
        };
        self.values[id.0] = result;
        Ok(())
    }

    fn load(&self, ptr: Pointer, ty: IrType) -> Result<RuntimeValue> {
        let width = match ty {
            IrType::Int(bits) if bits % 8 == 0 => bits as usize / 8,
            IrType::Int(bits) => {
                return Err(Error::invariant(format!("load of non byte-sized i{bits}")));
            }
            IrType::Float => 4,
            IrType::Double => 8,
            IrType::Ptr => return Err(Error::invariant("pointer loads are not supported")),
        };
        let bytes = self.module.read_bytes(self.literals, ptr, width)?;
        Ok(match ty {
            IrType::Int(8) => RuntimeValue::Int {
                bits: 8,
                value: bytemuck::pod_read_unaligned::<i8>(bytes) as i64,
            },
            IrType::Int(16) => RuntimeValue::Int {
                bits: 16,
                value: bytemuck::pod_read_unaligned::<i16>(bytes) as i64,
            },
            IrType::Int(32) => RuntimeValue::Int {
                bits: 32,
                value: bytemuck::pod_read_unaligned::<i32>(bytes) as i64,
            },
            IrType::Int(64) => RuntimeValue::Int {
                bits: 64,
                value: bytemuck::pod_read_unaligned::<i64>(bytes),
            },
            IrType::Float => RuntimeValue::Float(bytemuck::pod_read_unaligned::<f32>(bytes)),
            IrType::Double => RuntimeValue::Double(bytemuck::pod_read_unaligned::<f64>(bytes)),
            other => return Err(Error::invariant(format!("unsupported load type {other}"))),
        })
    }
}

fn width_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

fn sign_extend(bits: u32, value: u64) -> i64 {
    // i1 is a truth value, kept as 0/1
    if bits == 1 {
        return (value & 1) as i64;
    }
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

impl fmt::Display for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstInt { bits, value } => write!(f, "i{bits} {value}"),
            Self::ConstFloat(v) => write!(f, "float {v}"),
            Self::ConstDouble(v) => write!(f, "double {v}"),
            Self::NullPtr => f.write_str("i8* null"),
            Self::StringConstant(index) => write!(f, "i8* @.str.{index}"),
            Self::Arg(index) => write!(f, "i8* %arg{index}"),
            Self::Inst { id, ty } => write!(f, "{ty} %{}", id.0),
        }
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (index, s) in self.string_constants.iter().enumerate() {
            writeln!(f, "@.str.{index} = private constant {s:?}")?;
        }
        for global in &self.globals {
            writeln!(f, "@{} = internal global {}", global.name, global.ty)?;
        }
        let args: Vec<String> = self
            .query_func
            .args
            .iter()
            .map(|(name, ty)| format!("{ty} %{name}"))
            .collect();
        writeln!(f, "define void @{}({}) {{", self.query_func.name, args.join(", "))?;
        for (label, block) in [("entry", Block::Entry), ("body", Block::Body)] {
            writeln!(f, "{label}:")?;
            for id in self.query_func.block(block) {
                let record = &self.query_func.instructions[id.0];
                let lhs = match (&record.name, record.ty) {
                    (_, None) => String::new(),
                    (Some(name), Some(_)) => format!("%{} ({name}) = ", id.0),
                    (None, Some(_)) => format!("%{} = ", id.0),
                };
                let text = match &record.inst {
                    Instruction::Gep { base, offset } => format!("getelementptr {base}, {offset}"),
                    Instruction::Load { ptr, ty } => format!("load {ty}, {ptr}"),
                    Instruction::And { lhs, rhs } => format!("and {lhs}, {rhs}"),
                    Instruction::LShr { lhs, rhs } => format!("lshr {lhs}, {rhs}"),
                    Instruction::ICmpSgt { lhs, rhs } => format!("icmp sgt {lhs}, {rhs}"),
                    Instruction::Store { value, global } => {
                        format!("store {value}, @{}", self.globals[global.0].name)
                    }
                    Instruction::LoadGlobal { global } => {
                        let g = &self.globals[global.0];
                        format!("load {}, @{}", g.ty, g.name)
                    }
                };
                writeln!(f, "  {lhs}{text}")?;
            }
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_immediate_sign_extends() {
        assert_eq!(CodeValue::int(8, 0xff).as_const_int(), Some(-1));
        assert_eq!(CodeValue::int(1, 1).as_const_int(), Some(1));
        assert_eq!(CodeValue::int(32, 42).as_const_int(), Some(42));
        assert_eq!(CodeValue::int(32, 42).ty(), IrType::Int(32));
    }

    #[test]
    fn test_duplicate_global_is_invariant_violation() {
        let mut module = IrModule::new("m");
        module.add_global("g", IrType::Int(32)).unwrap();
        assert!(module.add_global("g", IrType::Int(32)).unwrap_err().is_fatal());
        assert!(module.global_by_name("g").is_some());
    }

    #[test]
    fn test_evaluate_load_and_store() {
        let mut module = IrModule::new("m");
        let base = module.arg_by_name(LITERALS_ARG).unwrap();
        let ptr = module.gep(Block::Entry, base, CodeValue::int(64, 4));
        let loaded = module.load(Block::Entry, ptr, IrType::Int(32));
        let global = module.add_global("g", IrType::Int(32)).unwrap();
        module.store(Block::Entry, loaded, global);
        let out = module.load_global(Block::Body, global);

        let mut literals = vec![0u8; 8];
        literals[4..8].copy_from_slice(bytemuck::bytes_of(&-7i32));
        let values = module.evaluate(&literals, &[out]).unwrap();
        assert_eq!(values[0], RuntimeValue::Int { bits: 32, value: -7 });
    }

    #[test]
    fn test_lshr_is_logical() {
        let mut module = IrModule::new("m");
        let masked = module.and(
            Block::Entry,
            CodeValue::int(32, -1),
            CodeValue::int(32, 0xffff_0000u32 as i32 as i64),
        );
        let shifted = module.lshr(Block::Entry, masked, CodeValue::int(32, 16));
        let values = module.evaluate(&[], &[shifted]).unwrap();
        assert_eq!(values[0].as_int(), Some(0xffff));
    }

    #[test]
    fn test_out_of_bounds_load_fails() {
        let mut module = IrModule::new("m");
        let base = module.arg_by_name(LITERALS_ARG).unwrap();
        let v = module.load(Block::Entry, base, IrType::Int(64));
        assert!(module.evaluate(&[0u8; 4], &[v]).is_err());
    }

    #[test]
    fn test_string_constants_are_pooled() {
        let mut module = IrModule::new("m");
        let a = module.add_string_constant("abc");
        let b = module.add_string_constant("abc");
        assert_eq!(a, b);
        assert_eq!(module.string_constants().len(), 1);
        let bytes = module
            .read_bytes(&[], Pointer::StringConstant { index: 0, offset: 1 }, 2)
            .unwrap();
        assert_eq!(bytes, b"bc");
    }

    #[test]
    fn test_display_lists_blocks() {
        let mut module = IrModule::new("m");
        let g = module.add_global("global_literal_0", IrType::Int(32)).unwrap();
        module.store(Block::Entry, CodeValue::int(32, 1), g);
        module.load_global(Block::Body, g);
        let text = module.to_string();
        assert!(text.contains("entry:"));
        assert!(text.contains("store i32 1, @global_literal_0"));
        assert!(text.contains("load i32, @global_literal_0"));
    }
}
