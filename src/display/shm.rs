//! wl_shm backed buffers

use std::env;
use std::fs::File;
use std::os::fd::AsFd;
use std::path::PathBuf;

use memmap2::MmapMut;
use tracing::debug;
use wayland_client::QueueHandle;
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::{self, WlShm};

use super::AppState;
use crate::error::{PresentError, Result};
use crate::present::pool::{BufferAllocator, BufferBacking, BufferGeometry, BufferId};

/// A mapped anonymous file shared with the compositor as one wl_buffer
pub struct ShmBuffer {
    buffer: WlBuffer,
    mmap: MmapMut,
}

impl ShmBuffer {
    pub fn wl_buffer(&self) -> &WlBuffer {
        &self.buffer
    }
}

impl BufferBacking for ShmBuffer {
    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

pub struct ShmAllocator {
    shm: WlShm,
    qh: QueueHandle<AppState>,
}

impl ShmAllocator {
    pub fn new(shm: WlShm, qh: QueueHandle<AppState>) -> Self {
        Self { shm, qh }
    }

    /// Unlinked file on the runtime tmpfs when there is one
    fn anonymous_file() -> std::io::Result<File> {
        match env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from) {
            Some(dir) if dir.is_dir() => tempfile::tempfile_in(dir),
            _ => tempfile::tempfile(),
        }
    }
}

impl BufferAllocator for ShmAllocator {
    type Buffer = ShmBuffer;

    fn allocate(&mut self, id: BufferId, geometry: BufferGeometry) -> Result<ShmBuffer> {
        let size = geometry.byte_size();
        let shm_error = |source| PresentError::ShmAllocation { size, source };

        let file = Self::anonymous_file().map_err(shm_error)?;
        file.set_len(size as u64).map_err(shm_error)?;

        // SAFETY: the file is private to this process and never truncated
        // while mapped; the compositor only reads it.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(shm_error)?;

        // geometry guarantees size, width, height and stride fit in i32
        let pool = self.shm.create_pool(file.as_fd(), size as i32, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            geometry.width as i32,
            geometry.height as i32,
            geometry.stride() as i32,
            wl_shm::Format::Argb8888,
            &self.qh,
            id,
        );
        // the buffer keeps the pool's memory alive
        pool.destroy();

        debug!("Created wl_shm buffer {} ({} bytes)", id, size);
        Ok(ShmBuffer { buffer, mmap })
    }
}
