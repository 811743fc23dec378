//! Lodestar Core - Query Compiler Core
//!
//! This crate turns relational-algebra execution units into device kernels:
//! - Typed SQL constants and their null sentinels
//! - Constant code generation, as immediates or hoisted literals
//! - Per-device literal buffers with packed string headers
//! - Relational-algebra and table-function execution units
//! - Kernel dispatch over interchangeable thread-pool backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Executor                        │
//! │   (compile, code cache, dispatch)           │
//! └──────┬───────────────────────────┬──────────┘
//!        │                           │
//! ┌──────┴───────────────────┐ ┌─────┴──────────┐
//! │   Constant Codegen        │ │  Thread Pool   │
//! │ (immediates, hoisting)    │ │ (futures, work │
//! └──────┬───────────────────┘ │  stealing,     │
//!        │                      │  inline)       │
//! ┌──────┴───────────────────┐ └────────────────┘
//! │   CgenState               │
//! │ (IR module, literal       │
//! │  buffers, global cache)   │
//! └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use lodestar_core::codegen::{CgenState, CompilationOptions, ConstantCodegen, ExecutorDeviceType};
//! use lodestar_core::string_dictionary::StringDictionaryRegistry;
//! use lodestar_core::types::{Constant, EncodingType};
//!
//! let dictionaries = StringDictionaryRegistry::new();
//! let mut state = CgenState::new("example", 2)?;
//! let co = CompilationOptions::defaults(ExecutorDeviceType::Gpu);
//!
//! let values = ConstantCodegen::new(&mut state, &dictionaries)
//!     .codegen(&Constant::int(42), EncodingType::None, 0, &co)?;
//! assert_eq!(values.len(), 1);
//! assert_eq!(state.literal_bytes_high_watermark(1)?, 4);
//! # Ok::<(), lodestar_core::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod codegen;
pub mod config;
pub mod error;
pub mod execution_unit;
pub mod executor;
pub mod string_dictionary;
pub mod threadpool;
pub mod types;

pub use config::{ExecutorConfig, ThreadPoolConfig};
pub use error::{Error, Result};
pub use execution_unit::{RelAlgExecutionUnit, TableFunctionExecutionUnit};
pub use executor::{CompiledKernel, Executor};
pub use threadpool::{ThreadPool, ThreadPoolBackend};
pub use types::{Constant, EncodingType, SqlType, TypeInfo};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_executor() {
        let executor = Executor::new(
            ExecutorConfig::default(),
            Arc::new(string_dictionary::StringDictionaryRegistry::new()),
        )
        .unwrap();
        assert_eq!(executor.dispatcher().backend(), ThreadPoolBackend::Futures);
        assert_eq!(executor.code_cache_len(), 0);
    }
}
