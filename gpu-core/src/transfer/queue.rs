//! Transfer Queues (C7): five logical queues across four processing domains (spec.md §4.7).
//!
//! Grounded on `transfers.c`'s "deq" (deque) abstraction: push to the back, pop from the front,
//! plus a "process everything currently enqueued" drain used by the CPY/EV/DUP domains.
//! `crossbeam_channel` backs each domain; CPY/EV/DUP drain with `try_recv` in a loop (so draining
//! never blocks even transiently, matching `transfers.c`'s non-blocking drain), while the single
//! UD worker thread blocks on a `Select` over the Upload and Download receivers.

use super::task::{Domain, Queued, UdMessage};
use crossbeam_channel::{unbounded, Receiver, Sender};

pub struct TransferQueues {
    upload_tx: Sender<UdMessage>,
    download_tx: Sender<UdMessage>,
    copy_tx: Sender<Queued>,
    copy_rx: Receiver<Queued>,
    event_tx: Sender<Queued>,
    event_rx: Receiver<Queued>,
    dup_tx: Sender<Queued>,
    dup_rx: Receiver<Queued>,
}

/// The receiving halves handed to the UD worker thread at spawn time.
pub struct UdReceivers {
    pub upload_rx: Receiver<UdMessage>,
    pub download_rx: Receiver<UdMessage>,
}

impl TransferQueues {
    pub fn new() -> (Self, UdReceivers) {
        let (upload_tx, upload_rx) = unbounded();
        let (download_tx, download_rx) = unbounded();
        let (copy_tx, copy_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (dup_tx, dup_rx) = unbounded();

        (
            Self { upload_tx, download_tx, copy_tx, copy_rx, event_tx, event_rx, dup_tx, dup_rx },
            UdReceivers { upload_rx, download_rx },
        )
    }

    /// Enqueues `item` onto `domain`'s back. FIFO within the domain; no ordering is implied
    /// across domains (spec.md §5).
    pub fn push(&self, domain: Domain, item: Queued) {
        match domain {
            Domain::Upload => {
                let _ = self.upload_tx.send(UdMessage::Task(item));
            }
            Domain::Download => {
                let _ = self.download_tx.send(UdMessage::Task(item));
            }
            Domain::Copy => {
                let _ = self.copy_tx.send(item);
            }
            Domain::Event => {
                let _ = self.event_tx.send(item);
            }
            Domain::Dup => {
                let _ = self.dup_tx.send(item);
            }
        }
    }

    /// Pops everything currently available from `Copy` without blocking.
    pub fn drain_copy(&self) -> Vec<Queued> {
        self.copy_rx.try_iter().collect()
    }

    /// Pops everything currently available from `Event` without blocking.
    pub fn drain_event(&self) -> Vec<Queued> {
        self.event_rx.try_iter().collect()
    }

    /// Pops everything currently available from `Dup` without blocking.
    pub fn drain_dup(&self) -> Vec<Queued> {
        self.dup_rx.try_iter().collect()
    }

    /// Enqueues the stop sentinel on both UD queues so the worker thread exits its wait loop.
    pub fn stop_worker(&self) {
        let _ = self.upload_tx.send(UdMessage::Stop);
        let _ = self.download_tx.send(UdMessage::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::task::Task;

    #[test]
    fn copy_domain_drains_fifo() {
        let (queues, _ud) = TransferQueues::new();
        queues.push(Domain::Copy, Queued::new(Task::BufferCopy { src: Default::default(), src_offset: 0, dst: Default::default(), dst_offset: 0, size: 1 }));
        queues.push(Domain::Copy, Queued::new(Task::BufferCopy { src: Default::default(), src_offset: 0, dst: Default::default(), dst_offset: 0, size: 2 }));

        let drained = queues.drain_copy();
        assert_eq!(drained.len(), 2);
        let sizes: Vec<u64> = drained
            .iter()
            .map(|q| match &q.task {
                Task::BufferCopy { size, .. } => *size,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn drain_without_pending_items_returns_empty() {
        let (queues, _ud) = TransferQueues::new();
        assert!(queues.drain_event().is_empty());
        assert!(queues.drain_dup().is_empty());
    }

    #[test]
    fn chained_next_travels_with_the_task() {
        let task = Queued::new(Task::BufferUpload { buffer: Default::default(), offset: 0, data: vec![1, 2, 3] })
            .then(Domain::Event, Task::UploadDone { transient_staging: None, ok: true });
        let next = task.next.expect("chained follow-up");
        assert_eq!(next.domain, Domain::Event);
        assert!(matches!(next.queued.task, Task::UploadDone { .. }));
    }
}
