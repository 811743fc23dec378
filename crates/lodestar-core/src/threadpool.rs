//! Kernel dispatch thread pools
//!
//! A [`ThreadPool`] is a task group: tasks are spawned one at a time and
//! [`ThreadPool::join`] blocks until all of them finished, returning their
//! results in spawn order. `ThreadPool<()>` is the non-value form.
//!
//! Three backends implement the same contract:
//!
//! ```text
//! Futures       one OS thread per task, joined in spawn order
//! WorkStealing  tasks run on a shared rayon pool (the kernel arena);
//!               a result slot is reserved per spawn before the task runs
//! Inline        tasks run on the joining thread, in spawn order
//! ```
//!
//! A panic inside a task is re-raised in the thread calling `join` once every
//! other task has finished. Nothing is retried.

use crate::config::ThreadPoolConfig;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Unit of work accepted by a task group
pub type Task<T> = Box<dyn FnOnce() -> T + Send + 'static>;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Task group implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPoolBackend {
    /// One thread per task
    Futures,
    /// Shared rayon arena
    WorkStealing,
    /// Deterministic, runs on the joining thread
    Inline,
}

impl fmt::Display for ThreadPoolBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Futures => write!(f, "futures"),
            Self::WorkStealing => write!(f, "work_stealing"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// Spawn/join contract shared by all backends
pub trait TaskGroup<T: Send + 'static>: Send {
    /// Schedule `task`; its result takes the next slot
    fn spawn_boxed(&mut self, task: Task<T>) -> Result<()>;

    /// Wait for every task and return results in spawn order
    fn join_all(self: Box<Self>) -> Result<Vec<T>>;

    /// Number of spawned tasks
    fn len(&self) -> usize;

    /// Whether nothing was spawned
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend kind
    fn backend(&self) -> ThreadPoolBackend;
}

/// One OS thread per task
pub struct FuturesTaskGroup<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> FuturesTaskGroup<T> {
    /// Create an empty group
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }
}

impl<T> Default for FuturesTaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskGroup<T> for FuturesTaskGroup<T> {
    fn spawn_boxed(&mut self, task: Task<T>) -> Result<()> {
        let handle = thread::Builder::new()
            .name(format!("lodestar-kernel-{}", self.handles.len()))
            .spawn(task)?;
        self.handles.push(handle);
        Ok(())
    }

    fn join_all(self: Box<Self>) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.handles.len());
        let mut first_panic: Option<PanicPayload> = None;
        for handle in self.handles {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(payload) => {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        Ok(results)
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn backend(&self) -> ThreadPoolBackend {
        ThreadPoolBackend::Futures
    }
}

/// Tasks run on a shared rayon pool
pub struct WorkStealingTaskGroup<T> {
    arena: Arc<rayon::ThreadPool>,
    slots: Vec<Arc<Mutex<Option<T>>>>,
    done_tx: Sender<Option<PanicPayload>>,
    done_rx: Receiver<Option<PanicPayload>>,
}

impl<T> WorkStealingTaskGroup<T> {
    /// Create an empty group running on `arena`
    pub fn new(arena: Arc<rayon::ThreadPool>) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            arena,
            slots: Vec::new(),
            done_tx,
            done_rx,
        }
    }
}

impl<T: Send + 'static> TaskGroup<T> for WorkStealingTaskGroup<T> {
    fn spawn_boxed(&mut self, task: Task<T>) -> Result<()> {
        // reserved before the task can run
        let slot = Arc::new(Mutex::new(None));
        self.slots.push(slot.clone());
        let done_tx = self.done_tx.clone();
        self.arena.spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(value) => {
                    *slot.lock() = Some(value);
                    None
                }
                Err(payload) => Some(payload),
            };
            // the receiver lives as long as the group; a send error means
            // the group was dropped without joining
            let _ = done_tx.send(outcome);
        });
        Ok(())
    }

    fn join_all(self: Box<Self>) -> Result<Vec<T>> {
        let mut first_panic: Option<PanicPayload> = None;
        for _ in 0..self.slots.len() {
            match self.done_rx.recv() {
                Ok(Some(payload)) => {
                    first_panic.get_or_insert(payload);
                }
                Ok(None) => {}
                Err(_) => return Err(Error::dispatch("kernel arena dropped a task")),
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.lock()
                    .take()
                    .ok_or_else(|| Error::dispatch(format!("task {idx} finished without a result")))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn backend(&self) -> ThreadPoolBackend {
        ThreadPoolBackend::WorkStealing
    }
}

/// Runs every task on the joining thread, in spawn order
pub struct InlineTaskGroup<T> {
    tasks: Vec<Task<T>>,
}

impl<T> InlineTaskGroup<T> {
    /// Create an empty group
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<T> Default for InlineTaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskGroup<T> for InlineTaskGroup<T> {
    fn spawn_boxed(&mut self, task: Task<T>) -> Result<()> {
        self.tasks.push(task);
        Ok(())
    }

    fn join_all(self: Box<Self>) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        let mut first_panic: Option<PanicPayload> = None;
        for task in self.tasks {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(value) => results.push(value),
                Err(payload) => {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        Ok(results)
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn backend(&self) -> ThreadPoolBackend {
        ThreadPoolBackend::Inline
    }
}

/// Task group returning `T` per task
pub struct ThreadPool<T: Send + 'static> {
    group: Box<dyn TaskGroup<T>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Wrap a backend
    pub fn with_group(group: Box<dyn TaskGroup<T>>) -> Self {
        Self { group }
    }

    /// One thread per task
    pub fn futures() -> Self {
        Self::with_group(Box::new(FuturesTaskGroup::new()))
    }

    /// Tasks on `arena`
    pub fn work_stealing(arena: Arc<rayon::ThreadPool>) -> Self {
        Self::with_group(Box::new(WorkStealingTaskGroup::new(arena)))
    }

    /// Tasks run at join on the calling thread
    pub fn inline() -> Self {
        Self::with_group(Box::new(InlineTaskGroup::new()))
    }

    /// Schedule `f`
    pub fn spawn<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.group.spawn_boxed(Box::new(f))
    }

    /// Wait for all tasks; results are in spawn order
    pub fn join(self) -> Result<Vec<T>> {
        self.group.join_all()
    }

    /// Number of spawned tasks
    pub fn len(&self) -> usize {
        self.group.len()
    }

    /// Whether nothing was spawned
    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    /// Backend kind
    pub fn backend(&self) -> ThreadPoolBackend {
        self.group.backend()
    }
}

/// Creates thread pools of the configured backend.
///
/// The work-stealing backend shares one rayon pool across every
/// [`ThreadPool`] created here.
#[derive(Clone)]
pub struct KernelDispatcher {
    backend: ThreadPoolBackend,
    arena: Option<Arc<rayon::ThreadPool>>,
}

impl KernelDispatcher {
    /// Build the dispatcher described by `config`
    pub fn new(config: &ThreadPoolConfig) -> Result<Self> {
        let backend = config.backend();
        let arena = match backend {
            ThreadPoolBackend::WorkStealing => {
                let width = config.arena_width();
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(width)
                    .thread_name(|idx| format!("lodestar-arena-{idx}"))
                    .build()?;
                debug!(width, "built kernel arena");
                Some(Arc::new(pool))
            }
            ThreadPoolBackend::Futures | ThreadPoolBackend::Inline => None,
        };
        Ok(Self { backend, arena })
    }

    /// Backend of the pools this dispatcher creates
    pub fn backend(&self) -> ThreadPoolBackend {
        self.backend
    }

    /// Width of the kernel arena, if the backend has one
    pub fn arena_width(&self) -> Option<usize> {
        self.arena.as_ref().map(|arena| arena.current_num_threads())
    }

    /// Fresh task group
    pub fn pool<T: Send + 'static>(&self) -> ThreadPool<T> {
        match (&self.arena, self.backend) {
            (Some(arena), _) => ThreadPool::work_stealing(arena.clone()),
            (None, ThreadPoolBackend::Inline) => ThreadPool::inline(),
            (None, _) => ThreadPool::futures(),
        }
    }
}

impl fmt::Debug for KernelDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelDispatcher")
            .field("backend", &self.backend)
            .field("arena_width", &self.arena_width())
            .finish()
    }
}
