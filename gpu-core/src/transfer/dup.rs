//! Dup Transfer Engine (C9): a fixed-capacity slot table that spreads an update to a multi-buffered
//! region across `swapchain_count` frames, one sub-slice per frame, instead of stalling the whole
//! pipeline to touch every sub-slice at once.
//!
//! Grounded on `transfers_utils.h`'s dup-task bookkeeping: a task is inserted once (deduplicated on
//! its target) and then replayed by `frame(image_index)` until every sub-slice has seen it.

use crate::dat::Dat;
use crate::error::{Error, Result};
use crate::gpu::SharedGpu;
use crate::handle::{BufferHandle, DatHandle};
use crate::registry::Registry;
use crate::transfer::task::{NextStep, Queued, Task};
use ash::vk;
use log::error;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Upload,
    Copy,
}

/// Dedup key, per spec.md §3's Dup Slot Table: `(kind, region.buffer, region.offsets[0], offset,
/// size)`. `kind` separates a `DupUpload` from a `DupCopy` targeting the same bytes, which the
/// source treats as distinct task shapes rather than collapsing at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    kind: Kind,
    buffer: BufferHandle,
    base_offset: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

struct Slot {
    key: SlotKey,
    task: Task,
    /// Follow-up chained onto the `Queued` this slot was built from (e.g. an `UploadDone` tearing
    /// down a transient staging Dat). Held here rather than fired at enqueue time, since a dup
    /// task's own completion is only observable once every sub-slice has seen it.
    next: Option<NextStep>,
    done: Vec<bool>,
    /// A recurrent slot is never retired; it keeps re-applying its task on every frame it sees.
    /// Nothing in spec.md names how a slot becomes recurrent, so this crate never sets it — see
    /// DESIGN.md's Open Question resolution.
    recurrent: bool,
}

/// Fixed-capacity dup slot table plus the per-frame replay logic (spec.md §4.9).
pub struct DupEngine {
    slots: Vec<Option<Slot>>,
    swapchain_count: usize,
}

impl DupEngine {
    pub fn new(capacity: usize, swapchain_count: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, swapchain_count: swapchain_count.max(1) }
    }

    /// Updates the swapchain image count once it becomes known; only affects slots inserted after
    /// this call (existing slots keep whatever `done` length they were created with, per spec.md
    /// §4.5 step 1's "default to an upper bound and log a warning" one-time fallback).
    pub fn set_swapchain_count(&mut self, count: usize) {
        self.swapchain_count = count.max(1);
    }

    fn key_for(registry: &Registry, dat: DatHandle, offset: vk::DeviceSize, size: vk::DeviceSize, kind: Kind) -> Option<SlotKey> {
        let region = registry.dat(dat)?.region();
        Some(SlotKey { kind, buffer: region.buffer, base_offset: region.offsets[0], offset, size })
    }

    /// Inserts a `DupUpload`/`DupCopy` task into the table, deduplicating on its target key. A
    /// task matching an already-queued slot's key replaces it and resets the slot's progress,
    /// since new data supersedes whatever the old slot was about to propagate — including
    /// whatever completion event the superseded task carried.
    ///
    /// `queued.next` (e.g. an `UploadDone` tearing down a transient staging Dat) is held on the
    /// slot rather than enqueued here: unlike every other task kind, a dup task's completion is
    /// only observable once `frame` has replayed it against every sub-slice, so the follow-up has
    /// to wait for the slot to retire. [`DupEngine::frame`] returns retired slots' follow-ups for
    /// the caller to push onto their target domain.
    pub fn enqueue(&mut self, registry: &Registry, queued: Queued) {
        let Queued { task, next } = queued;
        let key = match &task {
            Task::DupUpload { dat, offset, data } => Self::key_for(registry, *dat, *offset, data.len() as vk::DeviceSize, Kind::Upload),
            Task::DupCopy { dat, offset, size, .. } => Self::key_for(registry, *dat, *offset, *size, Kind::Copy),
            _ => {
                error!("DupEngine::enqueue called with a non-dup task");
                return;
            }
        };
        let Some(key) = key else {
            error!("dup task enqueued against an unknown Dat handle");
            return;
        };

        if let Some(slot) = self.slots.iter_mut().flatten().find(|s| s.key == key) {
            slot.task = task;
            slot.next = next;
            slot.done.iter_mut().for_each(|d| *d = false);
            return;
        }

        let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) else {
            error!("{}", Error::DupTableFull(self.slots.len()));
            return;
        };

        *free = Some(Slot { key, task, next, done: vec![false; self.swapchain_count], recurrent: false });
    }

    /// Replays every pending slot's task against sub-slice `image_index`, retiring non-recurrent
    /// slots once every sub-slice has been touched (spec.md §4.9, §8 invariant 7) and collecting
    /// each retired slot's chained follow-up for the caller to enqueue on its target domain.
    pub fn frame(&mut self, gpu: &SharedGpu, registry: &RwLock<Registry>, image_index: u32) -> Result<Vec<NextStep>> {
        let idx = image_index as usize;
        let mut retired = Vec::new();

        for slot in self.slots.iter_mut() {
            let Some(s) = slot else { continue };
            if idx >= s.done.len() || (s.done[idx] && !s.recurrent) {
                continue;
            }

            apply(gpu, registry, &s.task, idx)?;
            s.done[idx] = true;

            if !s.recurrent && s.done.iter().all(|d| *d) {
                if let Some(next) = s.next.take() {
                    retired.push(next);
                }
                *slot = None;
            }
        }
        Ok(retired)
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

fn apply(gpu: &SharedGpu, registry: &RwLock<Registry>, task: &Task, image_index: usize) -> Result<()> {
    match task {
        Task::DupUpload { dat, offset, data } => {
            let registry = registry.read();
            let region = registry.dat(*dat).expect("dup slot's Dat handle is live").region();
            let buffer = registry.buffer(region.buffer).expect("dup slot's buffer handle is live");
            buffer.upload(region.offset(image_index as u32) + offset, data)
        }

        Task::DupCopy { staging, staging_offset, dat, offset, size } => {
            let registry = registry.read();
            let staging_buf = registry.buffer(*staging).expect("dup staging buffer is live").handle();
            let region = registry.dat(*dat).expect("dup slot's Dat handle is live").region();
            let dst_buf = registry.buffer(region.buffer).expect("dup slot's buffer handle is live").handle();
            let dst_offset = region.offset(image_index as u32) + offset;

            gpu.transfer_pool().single_time_command(gpu.transfer_queue(), |cmd| {
                cmd.copy_buffer(
                    staging_buf,
                    dst_buf,
                    &[vk::BufferCopy { src_offset: *staging_offset, dst_offset, size: *size }],
                );
            })?;
            Ok(())
        }

        _ => unreachable!("DupEngine only ever stores DupUpload/DupCopy tasks"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::{BufferRegion, DatFlags};
    use crate::resources::BufferType;

    fn registry_with_dup_dat(sub_slices: u32) -> (Registry, DatHandle) {
        let mut registry = Registry::new();
        let buffer_handle = BufferHandle::default();
        let region = BufferRegion {
            buffer: buffer_handle,
            count: sub_slices,
            size: 16,
            aligned_size: 16,
            alignment: 16,
            offsets: (0..sub_slices).map(|i| i as vk::DeviceSize * 16).collect(),
        };
        let dat = Dat { flags: DatFlags::DUP | DatFlags::MAPPABLE, ty: BufferType::Vertex, region, staging: None };
        let handle = registry.insert_dat(dat);
        (registry, handle)
    }

    #[test]
    fn duplicate_key_replaces_and_resets_progress() {
        let (registry, dat) = registry_with_dup_dat(3);
        let mut engine = DupEngine::new(8, 3);

        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![1, 2, 3] }));
        assert_eq!(engine.occupied(), 1);
        engine.slots[0].as_mut().unwrap().done = vec![true, true, false];

        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![9, 9, 9] }));
        assert_eq!(engine.occupied(), 1);
        assert!(engine.slots[0].as_ref().unwrap().done.iter().all(|d| !d));
    }

    #[test]
    fn table_full_drops_new_entries_without_panicking() {
        let (registry, dat) = registry_with_dup_dat(2);
        let mut engine = DupEngine::new(1, 2);
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![1] }));
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 16, data: vec![2] }));
        assert_eq!(engine.occupied(), 1);
    }

    #[test]
    fn distinct_offsets_on_same_dat_get_distinct_slots() {
        let (registry, dat) = registry_with_dup_dat(2);
        let mut engine = DupEngine::new(8, 2);
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![1] }));
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 4, data: vec![2] }));
        assert_eq!(engine.occupied(), 2);
    }

    #[test]
    fn enqueue_keeps_a_chained_follow_up_on_the_slot() {
        use crate::transfer::task::Domain;

        let (registry, dat) = registry_with_dup_dat(1);
        let mut engine = DupEngine::new(8, 1);
        let queued = Queued::new(Task::DupUpload { dat, offset: 0, data: vec![1] })
            .then(Domain::Event, Task::UploadDone { transient_staging: None, ok: true });
        engine.enqueue(&registry, queued);

        let slot = engine.slots[0].as_ref().expect("slot occupied");
        assert!(slot.next.is_some(), "chained follow-up must survive enqueue, not be discarded");
    }

    #[test]
    fn replacing_a_slot_replaces_its_follow_up_too() {
        use crate::transfer::task::Domain;

        let (registry, dat) = registry_with_dup_dat(1);
        let mut engine = DupEngine::new(8, 1);
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![1] }).then(Domain::Event, Task::UploadDone { transient_staging: None, ok: true }));
        engine.enqueue(&registry, Queued::new(Task::DupUpload { dat, offset: 0, data: vec![2] }));

        let slot = engine.slots[0].as_ref().expect("slot occupied");
        assert!(slot.next.is_none(), "a superseding enqueue with no follow-up must drop the old one, not keep firing it");
    }
}
