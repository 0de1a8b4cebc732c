//! CPU-side descriptor heaps.
//!
//! A heap is a fixed run of slots at `start + index * increment`. Every write
//! bumps the slot's generation, so a handle taken before a view was replaced
//! never compares equal to, or resolves through, the new one.

use tracing::debug;

use crate::api::{Api, Device};
use crate::error::RhiResult;
use crate::types::DescriptorKind;

/// Handle to one descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// Slot address: `heap start + index * increment`.
    pub ptr: usize,
    /// Write count of the slot when the handle was taken.
    pub generation: u64,
}

struct Slot<V> {
    view: Option<V>,
    generation: u64,
}

/// Fixed-size table of views of one kind.
pub struct DescriptorHeap<A: Api> {
    kind: DescriptorKind,
    start: usize,
    increment: usize,
    slots: Vec<Slot<A::View>>,
}

impl<A: Api> DescriptorHeap<A> {
    /// Reserve `count` slots of `kind` on `device`.
    pub fn new(device: &A::Device, kind: DescriptorKind, count: u32) -> RhiResult<Self> {
        let start = device.reserve_descriptors(kind, count)?;
        let increment = device.descriptor_increment(kind);
        debug!(
            "Descriptor heap {:?}: {} slots at {:#x} (+{})",
            kind, count, start, increment
        );

        Ok(Self {
            kind,
            start,
            increment,
            slots: (0..count)
                .map(|_| Slot {
                    view: None,
                    generation: 0,
                })
                .collect(),
        })
    }

    #[inline]
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn increment(&self) -> usize {
        self.increment
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store `view` in slot `index` and return its fresh handle.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn write(&mut self, index: usize, view: A::View) -> DescriptorHandle {
        let slot = &mut self.slots[index];
        slot.view = Some(view);
        slot.generation += 1;
        self.handle(index)
    }

    /// Current handle of slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn handle(&self, index: usize) -> DescriptorHandle {
        DescriptorHandle {
            ptr: self.start + index * self.increment,
            generation: self.slots[index].generation,
        }
    }

    /// View behind `handle`, or `None` if the handle is stale or empty.
    pub fn resolve(&self, handle: DescriptorHandle) -> Option<&A::View> {
        let offset = handle.ptr.checked_sub(self.start)?;
        if offset % self.increment != 0 {
            return None;
        }
        let slot = self.slots.get(offset / self.increment)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.view.as_ref()
    }

    /// View in slot `index`, if written.
    pub fn view(&self, index: usize) -> Option<&A::View> {
        self.slots.get(index).and_then(|slot| slot.view.as_ref())
    }

    /// Drop every view. Generations are kept so old handles stay stale.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.view = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Instance;
    use crate::backend::headless::{DESCRIPTOR_INCREMENT, Headless, HeadlessConfig, HeadlessGpu};
    use crate::types::{DeviceDesc, Format, ResourceState, TextureDesc};

    #[test]
    fn test_handles_follow_increment_and_go_stale() {
        let gpu = HeadlessGpu::new(HeadlessConfig::default());
        let instance = gpu.instance();
        let adapters = instance.enumerate_adapters().unwrap();
        let device = instance
            .create_device(&adapters[0], &DeviceDesc::default())
            .unwrap();

        let texture = device
            .create_texture(&TextureDesc {
                width: 4,
                height: 4,
                format: Format::Rgba8Unorm,
                initial_state: ResourceState::Common,
                clear: Default::default(),
            })
            .unwrap();

        let mut heap = DescriptorHeap::<Headless>::new(&device, DescriptorKind::RenderTarget, 3).unwrap();
        assert_eq!(heap.len(), 3);

        let first = heap.write(2, device.create_render_target_view(&texture).unwrap());
        assert_eq!(first.ptr, heap.start() + 2 * DESCRIPTOR_INCREMENT);
        assert!(heap.resolve(first).is_some());

        heap.clear();
        assert!(heap.view(2).is_none());
        let second = heap.write(2, device.create_render_target_view(&texture).unwrap());

        assert_eq!(second.ptr, first.ptr);
        assert_ne!(second, first);
        assert!(heap.resolve(first).is_none());
        assert!(heap.resolve(second).is_some());
    }
}
