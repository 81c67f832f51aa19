//! In-memory stand-ins for the compositor side of the core seams

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{PresentError, Result};
use crate::pixels::{Bitmap, PixelSource, SourceError};
use crate::present::pool::{BufferAllocator, BufferBacking, BufferGeometry, BufferId};
use crate::present::window::{Rect, SurfaceOps};

pub struct MemoryBuffer {
    pub id: BufferId,
    pub pixels: Vec<u8>,
    drops: Rc<Cell<usize>>,
}

impl BufferBacking for MemoryBuffer {
    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

impl Drop for MemoryBuffer {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[derive(Default)]
pub struct MemoryAllocator {
    allocations: Rc<RefCell<Vec<BufferId>>>,
    drops: Rc<Cell<usize>>,
    fail: bool,
}

impl MemoryAllocator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn allocations(&self) -> Vec<BufferId> {
        self.allocations.borrow().clone()
    }

    pub fn dropped(&self) -> usize {
        self.drops.get()
    }

    /// Handle that keeps observing after the allocator is moved away
    pub fn observer(&self) -> MemoryAllocator {
        MemoryAllocator {
            allocations: self.allocations.clone(),
            drops: self.drops.clone(),
            fail: self.fail,
        }
    }
}

impl BufferAllocator for MemoryAllocator {
    type Buffer = MemoryBuffer;

    fn allocate(&mut self, id: BufferId, geometry: BufferGeometry) -> Result<MemoryBuffer> {
        if self.fail {
            return Err(PresentError::ShmAllocation {
                size: geometry.byte_size(),
                source: std::io::Error::other("out of memory"),
            });
        }
        self.allocations.borrow_mut().push(id);
        Ok(MemoryBuffer {
            id,
            pixels: vec![0; geometry.byte_size()],
            drops: self.drops.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    InputRegionCleared,
    LayoutIntent,
    AckConfigure(u32),
    Pong(u32),
    Attach(BufferId),
    Damage(Rect),
    Frame,
    Commit,
    Destroy,
}

#[derive(Default)]
pub struct RecordingSurface {
    pub requests: Vec<Request>,
}

impl RecordingSurface {
    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.iter().filter(|r| pred(r)).count()
    }
}

impl SurfaceOps for RecordingSurface {
    type Buffer = MemoryBuffer;

    fn set_empty_input_region(&mut self) {
        self.requests.push(Request::InputRegionCleared);
    }

    fn set_layout_intent(&mut self) {
        self.requests.push(Request::LayoutIntent);
    }

    fn ack_configure(&mut self, serial: u32) {
        self.requests.push(Request::AckConfigure(serial));
    }

    fn pong(&mut self, serial: u32) {
        self.requests.push(Request::Pong(serial));
    }

    fn attach(&mut self, buffer: &MemoryBuffer, _x: i32, _y: i32) {
        self.requests.push(Request::Attach(buffer.id));
    }

    fn damage(&mut self, rect: Rect) {
        self.requests.push(Request::Damage(rect));
    }

    fn request_frame(&mut self) {
        self.requests.push(Request::Frame);
    }

    fn commit(&mut self) {
        self.requests.push(Request::Commit);
    }

    fn destroy(&mut self) {
        self.requests.push(Request::Destroy);
    }
}

/// Pixel source returning a fixed bitmap, or failing when it has none
pub struct StaticSource(pub Option<Bitmap>);

impl PixelSource for StaticSource {
    fn current(&mut self, _time: u32) -> std::result::Result<&Bitmap, SourceError> {
        self.0.as_ref().ok_or_else(|| SourceError::Io {
            path: "missing.png".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }
}
