//! Query function code generation
//!
//! - [`ir`]: the recording IR module and its evaluator
//! - [`literals`]: per-device literal buffer layout
//! - [`cgen_state`]: per-compilation state (module, literal buffers, globals)
//! - [`constant`]: constant emission and literal hoisting

pub mod cgen_state;
pub mod constant;
pub mod ir;
pub mod literals;

pub use cgen_state::{CgenState, GlobalLiteralCache, MaterializedLiteral};
pub use constant::ConstantCodegen;
pub use ir::{Block, CodeValue, IrModule, IrType, Pointer, RuntimeValue};
pub use literals::{LiteralBuffer, LiteralValue};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class a kernel is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorDeviceType {
    /// Host CPU
    Cpu,
    /// GPU devices
    Gpu,
}

impl fmt::Display for ExecutorDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
        }
    }
}

/// Options fixed for one compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilationOptions {
    /// Target device class
    pub device_type: ExecutorDeviceType,
    /// Read constants from the literal buffer instead of embedding them
    pub hoist_literals: bool,
}

impl CompilationOptions {
    /// Hoisting enabled for `device_type`
    pub fn defaults(device_type: ExecutorDeviceType) -> Self {
        Self {
            device_type,
            hoist_literals: true,
        }
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self::defaults(ExecutorDeviceType::Cpu)
    }
}
