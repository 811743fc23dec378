//! Kernel compilation and dispatch
//!
//! [`Executor::compile`] generates the query function for an execution unit:
//! every constant leaf goes through [`ConstantCodegen`], and the resulting
//! module is packaged with one serialized literal buffer per device.
//! [`Executor::dispatch`] then runs the kernel once per device on the
//! configured thread pool.
//!
//! Compiled kernels are cached by an xxh3 hash of the unit's caching
//! description and the compilation options.

use crate::codegen::{
    CgenState, CodeValue, CompilationOptions, ConstantCodegen, ExecutorDeviceType, IrModule,
    RuntimeValue,
};
use crate::config::ExecutorConfig;
use crate::execution_unit::RelAlgExecutionUnit;
use crate::string_dictionary::StringDictionaryRegistry;
use crate::threadpool::KernelDispatcher;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Values of every constant leaf, in leaf order, as seen by one device
pub type KernelOutput = Vec<Vec<RuntimeValue>>;

/// Generated query function plus per-device literal buffers
#[derive(Debug)]
pub struct CompiledKernel {
    cache_key: u64,
    options: CompilationOptions,
    use_bump_allocator: bool,
    module: IrModule,
    outputs: Vec<Vec<CodeValue>>,
    literals: Vec<Vec<u8>>,
    device_ids: Vec<usize>,
}

impl CompiledKernel {
    /// Code cache key
    pub fn cache_key(&self) -> u64 {
        self.cache_key
    }

    /// Options the kernel was compiled with
    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Whether output buffers use the bump allocator
    pub fn use_bump_allocator(&self) -> bool {
        self.use_bump_allocator
    }

    /// Generated module
    pub fn module(&self) -> &IrModule {
        &self.module
    }

    /// Generated values of each constant leaf
    pub fn outputs(&self) -> &[Vec<CodeValue>] {
        &self.outputs
    }

    /// Devices the kernel runs on
    pub fn device_count(&self) -> usize {
        self.literals.len()
    }

    /// Physical device of each literal buffer; GPU ids start at `start_gpu`
    pub fn device_ids(&self) -> &[usize] {
        &self.device_ids
    }

    /// Serialized literal buffer of `device_id`
    pub fn literal_buffer(&self, device_id: usize) -> Result<&[u8]> {
        self.literals
            .get(device_id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::dispatch(format!("kernel has no device {device_id}")))
    }

    /// Run the kernel against the literal buffer of `device_id`
    pub fn run(&self, device_id: usize) -> Result<KernelOutput> {
        let literals = self.literal_buffer(device_id)?;
        self.outputs
            .iter()
            .map(|values| self.module.evaluate(literals, values))
            .collect()
    }

    /// Summary for logs and EXPLAIN-style output
    pub fn explain(&self) -> serde_json::Value {
        serde_json::json!({
            "module": self.module.name(),
            "cache_key": format!("{:016x}", self.cache_key),
            "device_type": self.options.device_type,
            "hoist_literals": self.options.hoist_literals,
            "use_bump_allocator": self.use_bump_allocator,
            "devices": self.device_count(),
            "device_ids": self.device_ids,
            "constants": self.outputs.len(),
            "literal_bytes": self.literals.iter().map(Vec::len).collect::<Vec<_>>(),
            "globals": self.module.globals().iter().map(|g| g.name.clone()).collect::<Vec<_>>(),
            "entry_instructions": self.module.instruction_count(crate::codegen::Block::Entry),
            "body_instructions": self.module.instruction_count(crate::codegen::Block::Body),
        })
    }
}

/// Bounded kernel cache; least recently used entries are evicted first
struct CodeCache {
    capacity: usize,
    entries: HashMap<u64, Arc<CompiledKernel>>,
    recency: VecDeque<u64>,
}

impl CodeCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    fn get(&mut self, key: u64) -> Option<Arc<CompiledKernel>> {
        let kernel = self.entries.get(&key)?.clone();
        self.touch(key);
        Some(kernel)
    }

    fn insert(&mut self, kernel: Arc<CompiledKernel>) -> Arc<CompiledKernel> {
        let key = kernel.cache_key();
        // a concurrent compilation of the same unit may have won
        if let Some(existing) = self.get(key) {
            return existing;
        }
        while self.entries.len() >= self.capacity {
            match self.recency.pop_front() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    debug!(key = format!("{evicted:016x}"), "evicted compiled kernel");
                }
                None => break,
            }
        }
        self.entries.insert(key, kernel.clone());
        self.recency.push_back(key);
        kernel
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.recency.iter().position(|k| *k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

/// Compiles execution units and dispatches the resulting kernels
pub struct Executor {
    config: ExecutorConfig,
    dictionaries: Arc<StringDictionaryRegistry>,
    dispatcher: KernelDispatcher,
    code_cache: Mutex<CodeCache>,
}

impl Executor {
    /// Create an executor
    pub fn new(config: ExecutorConfig, dictionaries: Arc<StringDictionaryRegistry>) -> Result<Self> {
        config.validate()?;
        let dispatcher = KernelDispatcher::new(&config.thread_pool)?;
        info!(
            backend = %dispatcher.backend(),
            hoist_literals = config.hoist_literals,
            cpu_only = config.cpu_only,
            num_gpus = config.num_gpus,
            "executor ready"
        );
        Ok(Self {
            code_cache: Mutex::new(CodeCache::new(config.code_cache_size)),
            config,
            dictionaries,
            dispatcher,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// String dictionaries used for dictionary-encoded constants
    pub fn dictionaries(&self) -> &Arc<StringDictionaryRegistry> {
        &self.dictionaries
    }

    /// Kernel dispatcher
    pub fn dispatcher(&self) -> &KernelDispatcher {
        &self.dispatcher
    }

    /// Options for compiling `ra_exe_unit` on `device_type`.
    ///
    /// `cpu_only` and a CPU-mode hint force CPU.
    pub fn compilation_options(
        &self,
        ra_exe_unit: &RelAlgExecutionUnit,
        device_type: ExecutorDeviceType,
    ) -> CompilationOptions {
        let device_type = if self.config.cpu_only || ra_exe_unit.query_hint.cpu_mode {
            ExecutorDeviceType::Cpu
        } else {
            device_type
        };
        CompilationOptions {
            device_type,
            hoist_literals: self.config.hoist_literals,
        }
    }

    /// Generate the kernel for `ra_exe_unit`, reusing a cached one when the
    /// unit and options match
    pub fn compile(
        &self,
        ra_exe_unit: &RelAlgExecutionUnit,
        co: &CompilationOptions,
    ) -> Result<Arc<CompiledKernel>> {
        let co = CompilationOptions {
            hoist_literals: co.hoist_literals,
            ..self.compilation_options(ra_exe_unit, co.device_type)
        };
        let cache_key = kernel_cache_key(ra_exe_unit, &co);

        if let Some(kernel) = self.code_cache.lock().get(cache_key) {
            debug!(key = format!("{cache_key:016x}"), "code cache hit");
            return Ok(kernel);
        }

        let start = Instant::now();
        let device_count = self
            .config
            .device_count(co.device_type == ExecutorDeviceType::Gpu);
        let mut state = CgenState::new(format!("kernel_{cache_key:016x}"), device_count)?;

        let constants = ra_exe_unit.constant_leaves();
        let mut outputs = Vec::with_capacity(constants.len());
        {
            let mut codegen = ConstantCodegen::new(&mut state, &self.dictionaries);
            for constant in &constants {
                let type_info = constant.type_info();
                outputs.push(codegen.codegen(
                    constant,
                    type_info.compression,
                    type_info.comp_param,
                    &co,
                )?);
            }
        }

        if self.config.jit_debug_ir {
            trace!("generated module:\n{}", state.module());
        }

        let literals = state.serialize_literals()?;
        let use_bump_allocator = co.device_type == ExecutorDeviceType::Gpu
            && (ra_exe_unit.use_bump_allocator || self.config.enable_bump_allocator);
        let first_device = match co.device_type {
            ExecutorDeviceType::Gpu => self.config.start_gpu,
            ExecutorDeviceType::Cpu => 0,
        };
        let kernel = Arc::new(CompiledKernel {
            cache_key,
            options: co,
            use_bump_allocator,
            module: state.into_module(),
            outputs,
            literals,
            device_ids: (first_device..first_device + device_count).collect(),
        });
        debug!(
            key = format!("{cache_key:016x}"),
            device_type = %co.device_type,
            devices = device_count,
            constants = constants.len(),
            literal_bytes = kernel.literals.first().map(Vec::len).unwrap_or(0),
            elapsed_us = start.elapsed().as_micros() as u64,
            "compiled kernel"
        );

        Ok(self.code_cache.lock().insert(kernel))
    }

    /// Run `kernel` once per device; results are in device order
    pub fn dispatch(&self, kernel: &Arc<CompiledKernel>) -> Result<Vec<KernelOutput>> {
        let start = Instant::now();
        let mut pool = self.dispatcher.pool::<Result<KernelOutput>>();
        for device_id in 0..kernel.device_count() {
            let kernel = kernel.clone();
            pool.spawn(move || kernel.run(device_id))?;
        }
        let results = pool.join()?.into_iter().collect::<Result<Vec<_>>>()?;
        info!(
            key = format!("{:016x}", kernel.cache_key()),
            backend = %self.dispatcher.backend(),
            devices = ?kernel.device_ids(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "dispatched kernel"
        );
        Ok(results)
    }

    /// Compile and dispatch in one step
    pub fn execute(
        &self,
        ra_exe_unit: &RelAlgExecutionUnit,
        device_type: ExecutorDeviceType,
    ) -> Result<Vec<KernelOutput>> {
        let co = self.compilation_options(ra_exe_unit, device_type);
        let kernel = self.compile(ra_exe_unit, &co)?;
        self.dispatch(&kernel)
    }

    /// Cached kernels
    pub fn code_cache_len(&self) -> usize {
        self.code_cache.lock().len()
    }

    /// Drop all cached kernels
    pub fn clear_code_cache(&self) {
        self.code_cache.lock().clear();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("cached_kernels", &self.code_cache_len())
            .finish()
    }
}

fn kernel_cache_key(ra_exe_unit: &RelAlgExecutionUnit, co: &CompilationOptions) -> u64 {
    let desc = format!(
        "{}\n\tDevice: {}\n\tHoist: {}",
        ra_exe_unit.desc_for_caching(),
        co.device_type,
        co.hoist_literals
    );
    xxhash_rust::xxh3::xxh3_64(desc.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution_unit::{Expr, SqlOp};
    use crate::threadpool::ThreadPoolBackend;
    use crate::types::{Constant, SqlType, TypeInfo};

    fn unit_with(constants: Vec<Constant>) -> RelAlgExecutionUnit {
        let col = Expr::column(1, 1, 0, TypeInfo::new(SqlType::Int));
        RelAlgExecutionUnit {
            quals: constants
                .into_iter()
                .map(|c| {
                    Expr::bin_oper(
                        TypeInfo::new(SqlType::Boolean),
                        SqlOp::Eq,
                        col.clone(),
                        Expr::constant(c),
                    )
                })
                .collect(),
            target_exprs: vec![col],
            ..Default::default()
        }
    }

    fn executor(config: ExecutorConfig) -> Executor {
        Executor::new(config, Arc::new(StringDictionaryRegistry::new())).unwrap()
    }

    fn inline_config() -> ExecutorConfig {
        let mut config = ExecutorConfig {
            num_gpus: 2,
            ..Default::default()
        };
        config.thread_pool.backend = Some(ThreadPoolBackend::Inline);
        config
    }

    #[test]
    fn test_cpu_hint_forces_cpu() {
        let exec = executor(inline_config());
        let mut unit = unit_with(vec![Constant::int(1)]);
        let co = exec.compilation_options(&unit, ExecutorDeviceType::Gpu);
        assert_eq!(co.device_type, ExecutorDeviceType::Gpu);

        unit.query_hint.cpu_mode = true;
        let co = exec.compilation_options(&unit, ExecutorDeviceType::Gpu);
        assert_eq!(co.device_type, ExecutorDeviceType::Cpu);
        let kernel = exec.compile(&unit, &co).unwrap();
        assert_eq!(kernel.device_count(), 1);
    }

    #[test]
    fn test_code_cache_hit_and_eviction() {
        let exec = executor(ExecutorConfig {
            code_cache_size: 2,
            ..inline_config()
        });
        let co = CompilationOptions::defaults(ExecutorDeviceType::Gpu);
        let a = unit_with(vec![Constant::int(1)]);
        let b = unit_with(vec![Constant::int(2)]);
        let c = unit_with(vec![Constant::int(3)]);

        let ka = exec.compile(&a, &co).unwrap();
        assert!(Arc::ptr_eq(&ka, &exec.compile(&a, &co).unwrap()));
        exec.compile(&b, &co).unwrap();
        // touching `a` makes `b` the eviction candidate
        exec.compile(&a, &co).unwrap();
        exec.compile(&c, &co).unwrap();
        assert_eq!(exec.code_cache_len(), 2);
        assert!(Arc::ptr_eq(&ka, &exec.compile(&a, &co).unwrap()));

        exec.clear_code_cache();
        assert_eq!(exec.code_cache_len(), 0);
    }

    #[test]
    fn test_hoisting_flag_changes_cache_key() {
        let exec = executor(inline_config());
        let unit = unit_with(vec![Constant::int(7)]);
        let hoisted = exec
            .compile(&unit, &CompilationOptions::defaults(ExecutorDeviceType::Cpu))
            .unwrap();
        let immediate = exec
            .compile(
                &unit,
                &CompilationOptions {
                    device_type: ExecutorDeviceType::Cpu,
                    hoist_literals: false,
                },
            )
            .unwrap();
        assert_ne!(hoisted.cache_key(), immediate.cache_key());
        assert_eq!(immediate.literal_buffer(0).unwrap().len(), 0);
        assert_eq!(immediate.outputs()[0], vec![CodeValue::int(32, 7)]);
    }

    #[test]
    fn test_dispatch_returns_device_order() {
        let exec = executor(inline_config());
        let unit = unit_with(vec![Constant::int(42), Constant::bigint(-5)]);
        let co = CompilationOptions::defaults(ExecutorDeviceType::Gpu);
        let kernel = exec.compile(&unit, &co).unwrap();
        assert_eq!(kernel.device_count(), 2);

        let results = exec.dispatch(&kernel).unwrap();
        assert_eq!(results.len(), 2);
        for output in results {
            assert_eq!(output[0][0].as_int(), Some(42));
            assert_eq!(output[1][0].as_int(), Some(-5));
        }
        assert!(kernel.literal_buffer(2).is_err());
    }

    #[test]
    fn test_explain_summary() {
        let exec = executor(inline_config());
        let unit = unit_with(vec![Constant::text("abc")]);
        let kernel = exec
            .compile(&unit, &CompilationOptions::defaults(ExecutorDeviceType::Gpu))
            .unwrap();
        let explain = kernel.explain();
        assert_eq!(explain["devices"], 2);
        assert_eq!(explain["device_ids"], serde_json::json!([0, 1]));
        assert_eq!(explain["device_type"], "gpu");
        assert_eq!(explain["constants"], 1);
        assert_eq!(explain["literal_bytes"][0], 7);
        assert_eq!(explain["globals"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_start_gpu_offsets_device_ids() {
        let exec = executor(ExecutorConfig {
            start_gpu: 2,
            num_gpus: 3,
            ..inline_config()
        });
        let unit = unit_with(vec![Constant::int(9)]);
        let gpu = exec
            .compile(&unit, &CompilationOptions::defaults(ExecutorDeviceType::Gpu))
            .unwrap();
        assert_eq!(gpu.device_ids(), &[2, 3, 4]);
        assert_eq!(gpu.explain()["device_ids"], serde_json::json!([2, 3, 4]));
        assert_eq!(exec.dispatch(&gpu).unwrap().len(), 3);

        let cpu = exec
            .compile(&unit, &CompilationOptions::defaults(ExecutorDeviceType::Cpu))
            .unwrap();
        assert_eq!(cpu.device_ids(), &[0]);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = Executor::new(
            ExecutorConfig {
                code_cache_size: 0,
                ..Default::default()
            },
            Arc::new(StringDictionaryRegistry::new()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
