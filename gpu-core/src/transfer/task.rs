//! The transfer task union (spec.md §3 "Transfer Task") and the chaining wrapper that lets an
//! executor enqueue a dependent follow-up task atomically on completion.
//!
//! Grounded on `transfers_utils.h`'s task struct, which tags each task with a kind and carries a
//! `next`-style completion callback; this crate makes the chain an explicit owned value instead
//! of a function pointer, since the "next" step is always one of a small closed set of domains.

use crate::dat::Dat;
use crate::extent::Shape;
use crate::handle::{BufferHandle, DatHandle, ImageHandle};
use crossbeam_channel::Sender;

/// Which logical queue (spec.md §4.7) a task or its chained follow-up belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Upload,
    Download,
    Copy,
    Event,
    Dup,
}

pub enum Task {
    BufferUpload { buffer: BufferHandle, offset: u64, data: Vec<u8> },
    BufferDownload { buffer: BufferHandle, offset: u64, size: u64, result: Sender<Vec<u8>> },
    BufferCopy { src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64 },
    ImageFromBuffer { image: ImageHandle, image_offset: Shape, shape: Shape, buffer: BufferHandle, buffer_offset: u64 },
    ImageToBuffer { image: ImageHandle, image_offset: Shape, shape: Shape, buffer: BufferHandle, buffer_offset: u64 },
    ImageCopy { src_image: ImageHandle, src_offset: Shape, dst_image: ImageHandle, dst_offset: Shape, shape: Shape },
    /// Routed to the dup engine (C9) rather than executed immediately; a mappable dup Dat's
    /// upload skips staging entirely and becomes this directly.
    DupUpload { dat: DatHandle, offset: u64, data: Vec<u8> },
    /// A non-mappable dup Dat's upload chains through a staging buffer first; this is the
    /// dup-engine-routed follow-up that copies out of that staging region.
    DupCopy { staging: BufferHandle, staging_offset: u64, dat: DatHandle, offset: u64, size: u64 },
    /// Fires once an upload chain fully lands, success or failure (spec.md §9). Carries the
    /// transient staging Dat to tear down, if the upload allocated one ad hoc.
    UploadDone { transient_staging: Option<Box<Dat>>, ok: bool },
    /// Fires once a download chain fully lands. `data` duplicates what was already sent to the
    /// call's own result channel, so general listeners (logging, release hooks) don't need to
    /// race the call-specific receiver. Carries the transient staging Dat to tear down, mirroring
    /// `UploadDone`, if the download routed through one.
    DownloadDone { size: u64, data: Vec<u8>, ok: bool, transient_staging: Option<Box<Dat>> },
}

/// A task plus the `(domain, task)` that must be enqueued once this one finishes.
///
/// spec.md §4.7: "Each task may carry a 'next' item; when the executor finishes a task it
/// enqueues the next atomically onto the designated target queue." `Box` makes the chain
/// representable despite `Queued` containing another `Queued`.
pub struct Queued {
    pub task: Task,
    pub next: Option<NextStep>,
}

/// The domain a chained follow-up task must land on, paired with the task itself.
pub struct NextStep {
    pub domain: Domain,
    pub queued: Box<Queued>,
}

impl Queued {
    pub fn new(task: Task) -> Self {
        Self { task, next: None }
    }

    /// Attaches `next` as the follow-up to enqueue on `domain` once this task completes.
    pub fn then(self, domain: Domain, next: Task) -> Self {
        self.chain(domain, Queued::new(next))
    }

    /// Attaches an already-assembled sub-chain as the follow-up to enqueue on `domain`. Lets a
    /// three-step chain (e.g. upload-to-staging → copy → done) be built inside-out.
    pub fn chain(mut self, domain: Domain, next: Queued) -> Self {
        self.next = Some(NextStep { domain, queued: Box::new(next) });
        self
    }
}

/// Messages the UD (Upload/Download) worker thread consumes: a real task, or the stop sentinel
/// spec.md §4.7 describes ("the worker thread is stopped by enqueuing a sentinel null task").
pub enum UdMessage {
    Task(Queued),
    Stop,
}
