//! Shared buffer pool
//!
//! Fixed number of slots, each lazily backed by a shared-memory buffer on
//! first use. A buffer is `busy` from the moment it is committed until the
//! compositor releases it, and is never handed out for painting in between.

use std::fmt;

use tracing::{debug, info};

use crate::error::{PresentError, Result};
use crate::pixels::BYTES_PER_PIXEL;

/// Opaque buffer identity, used to match compositor release events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[cfg(test)]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dimensions shared by every buffer in a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
    pub width: u32,
    pub height: u32,
}

impl BufferGeometry {
    /// Rejects empty buffers and buffers whose byte size does not fit the
    /// signed 32-bit size wl_shm pools are created with.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let size = width as u64 * height as u64 * BYTES_PER_PIXEL as u64;
        if width == 0 || height == 0 || size > i32::MAX as u64 {
            return Err(PresentError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    pub fn byte_size(&self) -> usize {
        self.stride() as usize * self.height as usize
    }
}

/// Memory behind one buffer, writable by the client
pub trait BufferBacking {
    fn pixels_mut(&mut self) -> &mut [u8];
}

/// Creates the backing for a pool slot on first use
pub trait BufferAllocator {
    type Buffer: BufferBacking;

    fn allocate(&mut self, id: BufferId, geometry: BufferGeometry) -> Result<Self::Buffer>;
}

/// One allocated pool entry
pub struct SharedBuffer<B> {
    id: BufferId,
    backing: B,
    busy: bool,
}

impl<B: BufferBacking> SharedBuffer<B> {
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Writable pixels, refused while the compositor owns the buffer
    pub fn pixels_mut(&mut self) -> Result<&mut [u8]> {
        if self.busy {
            return Err(PresentError::BufferBusy(self.id));
        }
        Ok(self.backing.pixels_mut())
    }
}

pub struct BufferPool<B> {
    slots: Vec<Option<SharedBuffer<B>>>,
    geometry: BufferGeometry,
    /// Byte written over freshly allocated memory so padding is painted
    fill: u8,
    next_id: u32,
}

impl<B: BufferBacking> BufferPool<B> {
    pub fn new(capacity: usize, geometry: BufferGeometry) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            geometry,
            fill: 0xff,
            next_id: 0,
        }
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    /// Number of slots with memory behind them
    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn busy_count(&self) -> usize {
        self.buffers().filter(|b| b.busy).count()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &SharedBuffer<B>> {
        self.slots.iter().flatten()
    }

    #[cfg(test)]
    pub fn get(&self, id: BufferId) -> Option<&SharedBuffer<B>> {
        self.buffers().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut SharedBuffer<B>> {
        self.slots.iter_mut().flatten().find(|b| b.id == id)
    }

    /// First slot that is not busy, allocating its memory if it has none yet.
    ///
    /// Fails with `PoolExhausted` when every slot is busy. Allocation errors
    /// are passed through unchanged.
    pub fn acquire_free_buffer<A>(&mut self, allocator: &mut A) -> Result<&mut SharedBuffer<B>>
    where
        A: BufferAllocator<Buffer = B>,
    {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_none_or(|b| !b.busy))
            .ok_or(PresentError::PoolExhausted {
                capacity: self.capacity(),
            })?;

        let buffer = match self.slots[index].take() {
            Some(buffer) => buffer,
            None => {
                let id = BufferId::new(self.next_id);
                let mut backing = allocator.allocate(id, self.geometry)?;
                self.next_id += 1;

                backing.pixels_mut().fill(self.fill);

                info!(
                    "Allocated buffer {} in slot {} ({}x{}, stride {}, {} bytes)",
                    id,
                    index,
                    self.geometry.width,
                    self.geometry.height,
                    self.geometry.stride(),
                    self.geometry.byte_size()
                );

                SharedBuffer {
                    id,
                    backing,
                    busy: false,
                }
            }
        };

        Ok(self.slots[index].insert(buffer))
    }

    /// Buffer was attached and committed; the compositor owns it now
    pub fn mark_submitted(&mut self, id: BufferId) -> Result<()> {
        let buffer = self.get_mut(id).ok_or(PresentError::UnknownBuffer(id))?;
        buffer.busy = true;
        Ok(())
    }

    /// Compositor signalled it no longer reads the buffer
    pub fn on_release(&mut self, id: BufferId) -> Result<()> {
        let buffer = self.get_mut(id).ok_or(PresentError::UnknownBuffer(id))?;
        if !buffer.busy {
            return Err(PresentError::AlreadyReleased(id));
        }
        buffer.busy = false;
        debug!("Buffer {} released", id);
        Ok(())
    }

    /// Drop every allocated buffer, returning how many were freed
    pub fn release_all(&mut self) -> usize {
        let mut freed = 0;
        for slot in &mut self.slots {
            if let Some(buffer) = slot.take() {
                debug!("Destroying buffer {} (busy: {})", buffer.id, buffer.busy);
                freed += 1;
            }
        }
        freed
    }
}
