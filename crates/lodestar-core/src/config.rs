//! Executor configuration
//!
//! Loaded from TOML (string or file) or from `LODESTAR_*` environment
//! variables. Missing keys take their defaults.
//!
//! ```toml
//! hoist_literals = true
//! cpu_only = false
//! num_gpus = 2
//!
//! [thread_pool]
//! enable_modern_thread_pool = true
//! kernel_arena_width = 8
//! ```

use crate::threadpool::ThreadPoolBackend;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Kernel dispatch settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Run kernels on the work-stealing arena instead of a thread per kernel
    pub enable_modern_thread_pool: bool,
    /// Arena width; 0 uses the available parallelism
    pub kernel_arena_width: usize,
    /// Explicit backend, overriding `enable_modern_thread_pool`
    pub backend: Option<ThreadPoolBackend>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            enable_modern_thread_pool: false,
            kernel_arena_width: 0,
            backend: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Backend kernels are dispatched with
    pub fn backend(&self) -> ThreadPoolBackend {
        match self.backend {
            Some(backend) => backend,
            None if self.enable_modern_thread_pool => ThreadPoolBackend::WorkStealing,
            None => ThreadPoolBackend::Futures,
        }
    }

    /// Effective arena width
    pub fn arena_width(&self) -> usize {
        if self.kernel_arena_width > 0 {
            return self.kernel_arena_width;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Query compiler and executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Hoist constants into the literal buffer
    pub hoist_literals: bool,
    /// Never compile for GPU
    pub cpu_only: bool,
    /// GPUs to use (ignored when `cpu_only`)
    pub num_gpus: usize,
    /// First GPU to use
    pub start_gpu: usize,
    /// Allocate projection output with the bump allocator
    pub enable_bump_allocator: bool,
    /// Trace the generated module after each compilation
    pub jit_debug_ir: bool,
    /// Compiled kernels kept in the code cache
    pub code_cache_size: usize,
    /// Kernel dispatch
    pub thread_pool: ThreadPoolConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            hoist_literals: true,
            cpu_only: false,
            num_gpus: 1,
            start_gpu: 0,
            enable_bump_allocator: false,
            jit_debug_ir: false,
            code_cache_size: 128,
            thread_pool: ThreadPoolConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded executor configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults overridden by `LODESTAR_*` environment variables.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_from_env("LODESTAR_HOIST_LITERALS", &mut config.hoist_literals);
        override_from_env("LODESTAR_CPU_ONLY", &mut config.cpu_only);
        override_from_env("LODESTAR_NUM_GPUS", &mut config.num_gpus);
        override_from_env("LODESTAR_START_GPU", &mut config.start_gpu);
        override_from_env("LODESTAR_ENABLE_BUMP_ALLOCATOR", &mut config.enable_bump_allocator);
        override_from_env("LODESTAR_JIT_DEBUG_IR", &mut config.jit_debug_ir);
        override_from_env("LODESTAR_CODE_CACHE_SIZE", &mut config.code_cache_size);
        override_from_env(
            "LODESTAR_ENABLE_MODERN_THREAD_POOL",
            &mut config.thread_pool.enable_modern_thread_pool,
        );
        override_from_env(
            "LODESTAR_KERNEL_ARENA_WIDTH",
            &mut config.thread_pool.kernel_arena_width,
        );
        if let Ok(backend) = std::env::var("LODESTAR_THREAD_POOL_BACKEND") {
            match backend.as_str() {
                "futures" => config.thread_pool.backend = Some(ThreadPoolBackend::Futures),
                "work_stealing" => {
                    config.thread_pool.backend = Some(ThreadPoolBackend::WorkStealing)
                }
                "inline" => config.thread_pool.backend = Some(ThreadPoolBackend::Inline),
                other => warn!("Ignoring unknown LODESTAR_THREAD_POOL_BACKEND {:?}", other),
            }
        }
        config
    }

    /// Reject settings no executor can run with
    pub fn validate(&self) -> Result<()> {
        if self.code_cache_size == 0 {
            return Err(Error::config("code_cache_size must be at least 1"));
        }
        if !self.cpu_only && self.num_gpus == 0 {
            return Err(Error::config("num_gpus must be at least 1 unless cpu_only is set"));
        }
        Ok(())
    }

    /// Number of devices kernels are compiled for
    pub fn device_count(&self, gpu: bool) -> usize {
        if gpu && !self.cpu_only {
            self.num_gpus.max(1)
        } else {
            1
        }
    }
}

fn override_from_env<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring unparsable {}={:?}", name, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: &[&str] = &[
        "LODESTAR_HOIST_LITERALS",
        "LODESTAR_CPU_ONLY",
        "LODESTAR_NUM_GPUS",
        "LODESTAR_START_GPU",
        "LODESTAR_ENABLE_BUMP_ALLOCATOR",
        "LODESTAR_JIT_DEBUG_IR",
        "LODESTAR_CODE_CACHE_SIZE",
        "LODESTAR_ENABLE_MODERN_THREAD_POOL",
        "LODESTAR_KERNEL_ARENA_WIDTH",
        "LODESTAR_THREAD_POOL_BACKEND",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            // SAFETY: env tests are serialized
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert!(config.hoist_literals);
        assert!(!config.cpu_only);
        assert_eq!(config.num_gpus, 1);
        assert_eq!(config.thread_pool.backend(), ThreadPoolBackend::Futures);
        assert!(config.thread_pool.arena_width() >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            num_gpus = 4
            jit_debug_ir = true

            [thread_pool]
            enable_modern_thread_pool = true
            kernel_arena_width = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.num_gpus, 4);
        assert!(config.jit_debug_ir);
        assert!(config.hoist_literals);
        assert_eq!(config.code_cache_size, 128);
        assert_eq!(config.thread_pool.backend(), ThreadPoolBackend::WorkStealing);
        assert_eq!(config.thread_pool.arena_width(), 6);
    }

    #[test]
    fn test_backend_override() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            [thread_pool]
            enable_modern_thread_pool = true
            backend = "inline"
            "#,
        )
        .unwrap();
        assert_eq!(config.thread_pool.backend(), ThreadPoolBackend::Inline);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ExecutorConfig::from_toml_str("num_gpus = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = ExecutorConfig::from_toml_str("code_cache_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(ExecutorConfig::from_toml_str("num_gpus = 0").is_err());
        assert!(ExecutorConfig::from_toml_str("num_gpus = 0\ncpu_only = true").is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cpu_only = true\nstart_gpu = 1").unwrap();
        let config = ExecutorConfig::from_file(file.path()).unwrap();
        assert!(config.cpu_only);
        assert_eq!(config.start_gpu, 1);
        assert_eq!(config.device_count(true), 1);

        let err = ExecutorConfig::from_file(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        // SAFETY: env tests are serialized
        unsafe {
            std::env::set_var("LODESTAR_HOIST_LITERALS", "false");
            std::env::set_var("LODESTAR_NUM_GPUS", "3");
            std::env::set_var("LODESTAR_KERNEL_ARENA_WIDTH", "5");
            std::env::set_var("LODESTAR_THREAD_POOL_BACKEND", "work_stealing");
        }
        let config = ExecutorConfig::from_env();
        clear_env();

        assert!(!config.hoist_literals);
        assert_eq!(config.num_gpus, 3);
        assert_eq!(config.device_count(true), 3);
        assert_eq!(config.device_count(false), 1);
        assert_eq!(config.thread_pool.arena_width(), 5);
        assert_eq!(config.thread_pool.backend(), ThreadPoolBackend::WorkStealing);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        // SAFETY: env tests are serialized
        unsafe {
            std::env::set_var("LODESTAR_NUM_GPUS", "lots");
            std::env::set_var("LODESTAR_THREAD_POOL_BACKEND", "gpu");
        }
        let config = ExecutorConfig::from_env();
        clear_env();
        assert_eq!(config, ExecutorConfig::default());
    }
}
