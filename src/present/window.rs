//! Surface / window state machine
//!
//! `Created -> AwaitingLayout -> Configured -> Destroyed`. The window owns the
//! protocol-facing surface through `SurfaceOps` and accumulates damage until
//! the next commit.

use tracing::{debug, info, warn};

/// Surface-local rectangle in buffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x + self.width).max(other.x + other.width);
        let y1 = (self.y + self.height).max(other.y + other.height);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Created,
    AwaitingLayout,
    Configured,
    Destroyed,
}

impl WindowState {
    pub fn name(self) -> &'static str {
        match self {
            WindowState::Created => "created",
            WindowState::AwaitingLayout => "awaiting layout",
            WindowState::Configured => "configured",
            WindowState::Destroyed => "destroyed",
        }
    }
}

/// Requests the window issues against its surface and layout objects
pub trait SurfaceOps {
    type Buffer;

    /// Install an empty input region: the surface accepts no pointer or touch
    fn set_empty_input_region(&mut self);
    /// No parent, maximized
    fn set_layout_intent(&mut self);
    fn ack_configure(&mut self, serial: u32);
    fn pong(&mut self, serial: u32);
    fn attach(&mut self, buffer: &Self::Buffer, x: i32, y: i32);
    fn damage(&mut self, rect: Rect);
    /// Ask for a one-shot completion callback for the next commit
    fn request_frame(&mut self);
    fn commit(&mut self);
    fn destroy(&mut self);
}

pub struct Window<S> {
    surface: S,
    state: WindowState,
    width: u32,
    height: u32,
    pending_damage: Option<Rect>,
    last_configure: Option<u32>,
}

impl<S: SurfaceOps> Window<S> {
    pub fn new(mut surface: S, width: u32, height: u32) -> Self {
        surface.set_empty_input_region();
        debug!("Window created ({}x{}), input region cleared", width, height);

        Self {
            surface,
            state: WindowState::Created,
            width,
            height,
            pending_damage: None,
            last_configure: None,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_configured(&self) -> bool {
        self.state == WindowState::Configured
    }

    #[cfg(test)]
    pub fn last_configure(&self) -> Option<u32> {
        self.last_configure
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Declare the layout intent and commit the empty surface so the
    /// compositor sends its initial configure.
    pub fn request_layout(&mut self) {
        if self.state != WindowState::Created {
            warn!("Layout already requested (window {})", self.state.name());
            return;
        }
        self.surface.set_layout_intent();
        self.surface.commit();
        self.state = WindowState::AwaitingLayout;
        debug!("Awaiting initial configure");
    }

    /// Every configure is acknowledged with its own serial. The first one
    /// moves the window to `Configured`.
    pub fn on_configure(&mut self, serial: u32) {
        if self.state == WindowState::Destroyed {
            debug!("Ignoring configure {} for destroyed window", serial);
            return;
        }

        self.surface.ack_configure(serial);
        self.last_configure = Some(serial);

        if self.state != WindowState::Configured {
            info!("Configure {} acknowledged, window configured", serial);
            self.state = WindowState::Configured;
        } else {
            debug!("Configure {} acknowledged", serial);
        }
    }

    /// Liveness probe, answered regardless of rendering state
    pub fn on_ping(&mut self, serial: u32) {
        debug!("Ping {}, sending pong", serial);
        self.surface.pong(serial);
    }

    /// Accumulate damage for the next commit, clipped to the surface
    pub fn damage(&mut self, rect: Rect) {
        let bounds = Rect::new(0, 0, self.width as i32, self.height as i32);
        let rect = rect.intersect(&bounds);
        if rect.is_empty() {
            return;
        }
        self.pending_damage = Some(match self.pending_damage {
            Some(pending) => pending.union(&rect),
            None => rect,
        });
    }

    pub fn damage_full(&mut self) {
        self.damage(Rect::new(0, 0, self.width as i32, self.height as i32));
    }

    #[cfg(test)]
    pub fn pending_damage(&self) -> Option<Rect> {
        self.pending_damage
    }

    pub fn attach(&mut self, buffer: &S::Buffer) {
        self.surface.attach(buffer, 0, 0);
    }

    /// Layout intent is re-asserted on every frame in case the compositor
    /// dropped the hint.
    pub fn reassert_layout(&mut self) {
        self.surface.set_layout_intent();
    }

    pub fn request_frame(&mut self) {
        self.surface.request_frame();
    }

    /// Flush accumulated damage as a single request, then commit
    pub fn commit(&mut self) {
        if let Some(rect) = self.pending_damage.take() {
            self.surface.damage(rect);
        }
        self.surface.commit();
    }

    /// Returns false if the window was already destroyed
    pub fn destroy(&mut self) -> bool {
        if self.state == WindowState::Destroyed {
            return false;
        }
        self.pending_damage = None;
        self.surface.destroy();
        self.state = WindowState::Destroyed;
        debug!("Window destroyed (last configure {:?})", self.last_configure);
        true
    }
}
