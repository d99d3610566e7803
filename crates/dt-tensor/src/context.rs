use crate::backend::Backend;
use crate::config::{ContractAction, LayoutConfig};
use crate::device::Device;
use crate::error::{Result, TensorError};
use crate::storage::{BufferHandle, StreamId};
use crate::tensor::Tensor;

/// A bounded unit of work: one backend, one ordered stream, and an arena of
/// temporary allocations.
///
/// Every buffer allocated through the context is released when the context
/// is torn down, either explicitly through [`teardown`](Context::teardown) or
/// on drop. Descriptors handed out by this crate must not outlive it.
///
/// Contexts are single-threaded by construction (`&mut self` on every
/// allocating call); parallelism belongs to the backend.
#[derive(Debug)]
pub struct Context<'b> {
    backend: &'b dyn Backend,
    stream: StreamId,
    config: LayoutConfig,
    live: Vec<BufferHandle>,
    retired: Vec<BufferHandle>,
    closed: bool,
}

impl<'b> Context<'b> {
    pub fn new(backend: &'b dyn Backend) -> Result<Self> {
        Self::with_config(backend, LayoutConfig::default())
    }

    pub fn with_config(backend: &'b dyn Backend, config: LayoutConfig) -> Result<Self> {
        let stream = backend.create_stream()?;
        log::debug!("context opened on {} with stream {:?}", backend.name(), stream);
        Ok(Context {
            backend,
            stream,
            config,
            live: Vec::new(),
            retired: Vec::new(),
            closed: false,
        })
    }

    pub fn backend(&self) -> &'b dyn Backend {
        self.backend
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Allocates through the backend and records the buffer in the arena.
    pub fn allocate(&mut self, nbytes: usize, device: Device) -> Result<BufferHandle> {
        let handle = self.backend.allocate(nbytes, device)?;
        log::debug!("allocated {}", handle);
        self.live.push(handle);
        Ok(handle)
    }

    /// Marks the memory of a descriptor that is being replaced as released.
    ///
    /// Borrowed descriptors and memory this context did not allocate are left
    /// alone. Retired buffers are freed by [`reclaim_retired`] or at teardown,
    /// never while other descriptors might still alias them implicitly.
    ///
    /// [`reclaim_retired`]: Context::reclaim_retired
    pub fn retire(&mut self, tensor: Tensor) {
        if !tensor.is_owned() {
            return;
        }
        let handle = tensor.storage();
        if let Some(pos) = self.live.iter().position(|h| *h == handle) {
            self.live.swap_remove(pos);
            log::debug!("retired {}", handle);
            self.retired.push(handle);
        }
    }

    /// Frees every retired buffer now. Returns how many were freed.
    ///
    /// A failed free does not stop the others; the first failure is reported
    /// after every retired buffer has been handed back.
    pub fn reclaim_retired(&mut self) -> Result<usize> {
        let mut freed = 0;
        let mut first_err = None;
        for handle in std::mem::take(&mut self.retired) {
            match self.backend.free(&handle) {
                Ok(()) => freed += 1,
                Err(e) => {
                    log::warn!("freeing retired {}: {}", handle, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(freed),
        }
    }

    /// Buffers allocated by this context and still in use.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// Buffers retired but not yet freed.
    pub fn retired_allocations(&self) -> usize {
        self.retired.len()
    }

    /// Waits for everything issued on this context's stream.
    pub fn synchronize(&self) -> Result<()> {
        self.backend.synchronize(self.stream)
    }

    /// Checks a precondition. A false `cond` is a contract violation, handled
    /// according to [`LayoutConfig::contract_action`].
    pub fn contract(&self, cond: bool, message: impl FnOnce() -> String) -> Result<()> {
        if cond {
            return Ok(());
        }
        self.escalate(Err(TensorError::ContractViolation(message())))
    }

    /// Passes `result` through, aborting on a contract violation when the
    /// configuration asks for it.
    pub fn escalate<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_contract_violation() {
                log::error!("{}", err);
                if self.config.contract_action == ContractAction::Abort {
                    eprintln!("fatal: {}", err);
                    std::process::abort();
                }
            }
        }
        result
    }

    /// Releases every buffer and the stream, reporting the first failure.
    pub fn teardown(mut self) -> Result<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_err = None;
        if let Err(e) = self.backend.synchronize(self.stream) {
            first_err.get_or_insert(e);
        }
        let handles: Vec<BufferHandle> = self.live.drain(..).chain(self.retired.drain(..)).collect();
        log::debug!("context teardown releases {} buffers", handles.len());
        for handle in handles {
            if let Err(e) = self.backend.free(&handle) {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.backend.destroy_stream(self.stream) {
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            log::warn!("context teardown: {}", e);
        }
    }
}
