//! Presentation core
//!
//! Ties the buffer pool, window state machine and frame scheduler together.
//! Protocol events arrive as [`Event`] values; nothing in here knows which
//! transport produced them.

pub mod pool;
pub mod scheduler;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use tracing::{debug, info, trace};

use crate::error::{PresentError, Result};
use crate::pixels::{self, PixelSource};
use pool::{BufferAllocator, BufferGeometry, BufferId, BufferPool};
use scheduler::{FrameScheduler, FrameToken};
use window::{SurfaceOps, Window, WindowState};

/// Everything the compositor can tell the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Layout configure, must be acknowledged with the same serial
    Configure { serial: u32 },
    /// Suggested toplevel size; the window keeps its fixed size
    ToplevelConfigure { width: i32, height: i32 },
    /// Liveness probe
    Ping { serial: u32 },
    /// The compositor asked the toplevel to close
    Close,
    BufferReleased(BufferId),
    /// Completion callback for the last committed frame
    FrameDone { time: u32 },
}

pub struct Presenter<S, A, P>
where
    A: BufferAllocator,
{
    window: Window<S>,
    pool: BufferPool<A::Buffer>,
    allocator: A,
    source: P,
    scheduler: FrameScheduler,
    close_requested: bool,
}

impl<S, A, P> Presenter<S, A, P>
where
    A: BufferAllocator,
    S: SurfaceOps<Buffer = A::Buffer>,
    P: PixelSource,
{
    pub fn new(
        window: Window<S>,
        allocator: A,
        source: P,
        pool_size: usize,
        report_interval: Duration,
    ) -> Result<Self> {
        let (width, height) = window.size();
        let geometry = BufferGeometry::new(width, height)?;

        Ok(Self {
            window,
            pool: BufferPool::new(pool_size, geometry),
            allocator,
            source,
            scheduler: FrameScheduler::new(report_interval),
            close_requested: false,
        })
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.pool = self.pool.with_fill(fill);
        self
    }

    pub fn window(&self) -> &Window<S> {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window<S> {
        &mut self.window
    }

    pub fn pool(&self) -> &BufferPool<A::Buffer> {
        &self.pool
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        if self.window.state() == WindowState::Destroyed {
            debug!("Dropping {:?} after teardown", event);
            return Ok(());
        }

        match event {
            Event::Configure { serial } => self.window.on_configure(serial),
            Event::ToplevelConfigure { width, height } => {
                let (w, h) = self.window.size();
                debug!(
                    "Toplevel configure {}x{} (keeping fixed {}x{})",
                    width, height, w, h
                );
            }
            Event::Ping { serial } => self.window.on_ping(serial),
            Event::Close => {
                info!("Compositor requested close");
                self.close_requested = true;
            }
            Event::BufferReleased(id) => self.pool.on_release(id)?,
            Event::FrameDone { time } => {
                let prior = self.scheduler.fire()?;
                self.redraw(Some(prior), time)?;
            }
        }
        Ok(())
    }

    /// Render and commit one frame.
    ///
    /// Called once at startup with no prior token, afterwards only from a
    /// fired completion callback.
    pub fn redraw(&mut self, prior: Option<FrameToken>, time: u32) -> Result<()> {
        if !self.window.is_configured() {
            return Err(PresentError::NotConfigured(self.window.state().name()));
        }
        if prior.is_none() && self.scheduler.pending().is_some() {
            return Err(PresentError::FrameAlreadyPending);
        }

        let geometry = self.pool.geometry();
        let buffer = self.pool.acquire_free_buffer(&mut self.allocator)?;
        let id = buffer.id();

        let bitmap = self.source.current(time).ok();
        pixels::paint_frame(buffer.pixels_mut()?, geometry.width, geometry.height, bitmap);

        self.window.attach(buffer.backing());
        self.window.damage_full();

        if let Some(prior) = prior {
            trace!("Frame callback {} consumed", prior.seq());
        }

        self.window.reassert_layout();

        let token = self.scheduler.arm()?;
        self.window.request_frame();
        self.window.commit();
        self.pool.mark_submitted(id)?;
        self.scheduler.record_frame();

        trace!(
            "Frame {} committed with buffer {} (time {})",
            token.seq(),
            id,
            time
        );
        Ok(())
    }

    /// Release buffers, then the surface. Safe to call more than once.
    pub fn teardown(&mut self) {
        let held = self.pool.busy_count();
        let freed = self.pool.release_all();
        self.scheduler.cancel();
        let destroyed = self.window.destroy();
        if freed > 0 || destroyed {
            info!(
                "Torn down {} buffers ({} held by compositor) after {} frames",
                freed,
                held,
                self.scheduler.frames_presented()
            );
        }
    }
}
