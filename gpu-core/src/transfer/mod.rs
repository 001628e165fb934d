//! Transfer pipeline (C7 + C8 + C9): task definitions, the five logical queues, the executors
//! that perform each task's GPU-side effect, and the dup engine's per-frame replay.
//!
//! [`Transfers`] is the facade [`crate::context::Context`] (C10) holds: one dedicated worker
//! thread drains the UD domain (Upload/Download), while CPY/EV/DUP are drained on demand from
//! whichever thread calls `Context::frame`.

pub mod dup;
pub mod executor;
pub mod queue;
pub mod task;

pub use dup::DupEngine;
pub use queue::{TransferQueues, UdReceivers};
pub use task::{Domain, NextStep, Queued, Task, UdMessage};

use crate::error::{Error, Result};
use crate::gpu::SharedGpu;
use crate::registry::Registry;
use crossbeam_channel::Select;
use log::error;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Patches a chained follow-up task with the outcome of the task that just completed.
///
/// `UploadDone`/`DownloadDone` are built by the caller before the chain's first task has even
/// run, so their `ok` flag (and `DownloadDone`'s `data`) cannot be known until now — this is the
/// one place that reaches into an already-constructed `next` task to fill them in.
pub(crate) fn patch_completion(result: &Result<Option<Vec<u8>>>, next: &mut Task) {
    let ok = result.is_ok();
    match next {
        Task::UploadDone { ok: o, .. } => *o = ok,
        Task::DownloadDone { ok: o, data, .. } => {
            *o = ok;
            if let Ok(Some(bytes)) = result {
                *data = bytes.clone();
            }
        }
        _ => {}
    }
}

/// Executes one popped task, forwards a `BufferDownload`'s bytes to its caller-supplied channel,
/// patches and enqueues its chained follow-up, and logs (rather than propagates) execution
/// failures — per spec.md §7, completion events fire even on error.
fn run_task(gpu: &SharedGpu, registry: &RwLock<Registry>, queues: &TransferQueues, queued: Queued) {
    let Queued { task, next } = queued;
    let result = executor::execute(gpu, registry, &task);

    if let (Task::BufferDownload { result: tx, .. }, Ok(bytes)) = (&task, &result) {
        let _ = tx.send(bytes.clone().unwrap_or_default());
    }

    if let Err(e) = &result {
        error!("transfer task failed: {e}");
    }

    if let Some(NextStep { domain, mut queued }) = next {
        patch_completion(&result, &mut queued.task);
        queues.push(domain, *queued);
    }
}

/// Executes a task chain synchronously and in order, without touching any queue at all, returning
/// the terminal task alongside whatever bytes its own execution produced.
///
/// Used by [`crate::context::Context`]'s `wait: true` upload paths: those callers cannot tolerate
/// the chain being enqueued and drained later by some unrelated call to `frame`, so this walks
/// `queued.next` directly on the calling thread instead of handing tasks to the UD worker or a
/// domain queue. Returning the terminal task lets the caller run it through the same
/// `UploadDone`/`DownloadDone` handling `Context::frame`'s Event drain would otherwise have done
/// for it. A chain that reaches a `Dup` task is rejected — dup updates are inherently spread
/// across `frame(image_index)` calls and have no synchronous completion to wait on.
pub(crate) fn run_chain_sync(gpu: &SharedGpu, registry: &RwLock<Registry>, mut queued: Queued) -> Result<(Option<Vec<u8>>, Task)> {
    loop {
        if matches!(queued.task, Task::DupUpload { .. } | Task::DupCopy { .. }) {
            return Err(Error::SyncWaitUnsupportedForDup);
        }

        let result = executor::execute(gpu, registry, &queued.task);

        if let (Task::BufferDownload { result: tx, .. }, Ok(bytes)) = (&queued.task, &result) {
            let _ = tx.send(bytes.clone().unwrap_or_default());
        }

        if let Err(e) = &result {
            error!("transfer task failed: {e}");
        }

        match queued.next {
            Some(NextStep { queued: next, .. }) => {
                let mut next = *next;
                patch_completion(&result, &mut next.task);
                queued = next;
            }
            None => return result.map(|data| (data, queued.task)),
        }
    }
}

fn run_ud_worker(gpu: SharedGpu, registry: Arc<RwLock<Registry>>, queues: Arc<TransferQueues>, ud: UdReceivers) {
    loop {
        let mut select = Select::new();
        let upload_idx = select.recv(&ud.upload_rx);
        let download_idx = select.recv(&ud.download_rx);
        let ready = select.ready();

        let msg = if ready == upload_idx {
            ud.upload_rx.try_recv()
        } else if ready == download_idx {
            ud.download_rx.try_recv()
        } else {
            continue;
        };

        match msg {
            Ok(UdMessage::Stop) => break,
            Ok(UdMessage::Task(queued)) => run_task(&gpu, &registry, &queues, queued),
            Err(_) => continue,
        }
    }
}

/// Owns the transfer queues (C7), the UD worker thread, and the dup slot table (C9). Transfer
/// executors (C8) are free functions in [`executor`]; this struct just sequences calls into them.
pub struct Transfers {
    queues: Arc<TransferQueues>,
    dup: DupEngine,
    worker: Option<JoinHandle<()>>,
}

impl Transfers {
    pub fn new(gpu: SharedGpu, registry: Arc<RwLock<Registry>>, dup_capacity: usize, swapchain_count: usize) -> Self {
        let (queues, ud_receivers) = TransferQueues::new();
        let queues = Arc::new(queues);
        let worker = {
            let queues = queues.clone();
            std::thread::spawn(move || run_ud_worker(gpu, registry, queues, ud_receivers))
        };

        Self { queues, dup: DupEngine::new(dup_capacity, swapchain_count), worker: Some(worker) }
    }

    pub fn push(&self, domain: Domain, item: Queued) {
        self.queues.push(domain, item);
    }

    pub fn set_swapchain_count(&mut self, count: usize) {
        self.dup.set_swapchain_count(count);
    }

    /// Runs every task currently queued on the Copy domain, in FIFO order, chaining follow-ups.
    pub fn pump_copy(&self, gpu: &SharedGpu, registry: &RwLock<Registry>) {
        for queued in self.queues.drain_copy() {
            run_task(gpu, registry, &self.queues, queued);
        }
    }

    /// Pops every pending Event task for the caller (typically [`crate::context::Context`]) to
    /// interpret; events never carry GPU-side work of their own.
    pub fn drain_event(&self) -> Vec<Queued> {
        self.queues.drain_event()
    }

    /// Feeds every pending Dup task into the slot table, replays the whole table against
    /// `image_index` (spec.md §4.9), and pushes every slot that fully retired this call's chained
    /// follow-up onto its target domain — `DupEngine::frame` can only return them, not enqueue
    /// them itself, since it has no handle on `self.queues`.
    pub fn frame_dup(&mut self, gpu: &SharedGpu, registry: &RwLock<Registry>, image_index: u32) -> Result<()> {
        {
            let locked = registry.read();
            for queued in self.queues.drain_dup() {
                self.dup.enqueue(&locked, queued);
            }
        }
        for next in self.dup.frame(gpu, registry, image_index)? {
            self.queues.push(next.domain, *next.queued);
        }
        Ok(())
    }

    /// Enqueues the stop sentinel and joins the UD worker thread. Idempotent: a second call is a
    /// no-op since the handle is only `Some` once.
    pub fn shutdown(&mut self) {
        self.queues.stop_worker();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Transfers {
    fn drop(&mut self) {
        self.shutdown();
    }
}
