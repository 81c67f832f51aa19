//! Wayland connection and event loop
//!
//! Owns the connection, the bound globals and the presenter, and drives
//! protocol dispatch on the tokio reactor until shutdown.

mod dispatch;
mod event_stream;
pub mod registry;
mod shm;
mod surface;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_registry::WlRegistry;
use wayland_client::protocol::wl_shell::WlShell;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::{Connection, EventQueue, QueueHandle};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use crate::config::Config;
use crate::error::PresentError;
use crate::pixels::ImageFileSource;
use crate::present::Presenter;
use crate::present::window::Window;
use crate::shutdown::ShutdownToken;
use event_stream::WaylandEventStream;
use registry::{BindRequest, Capability, CapabilityRegistry, Handshake};
use shm::ShmAllocator;
use surface::WaylandSurface;

pub type WaylandPresenter = Presenter<WaylandSurface, ShmAllocator, ImageFileSource>;

/// Proxies for the globals this client binds
#[derive(Default)]
pub struct Globals {
    compositor: Option<WlCompositor>,
    shm: Option<WlShm>,
    wm_base: Option<XdgWmBase>,
    legacy_shell: Option<WlShell>,
}

impl Globals {
    fn bind(&mut self, registry: &WlRegistry, request: BindRequest, qh: &QueueHandle<AppState>) {
        let BindRequest { name, version, .. } = request;
        match request.capability {
            Capability::Compositor => {
                self.compositor = Some(registry.bind(name, version, qh, ()));
            }
            Capability::Shm => self.shm = Some(registry.bind(name, version, qh, ())),
            Capability::WmBase => self.wm_base = Some(registry.bind(name, version, qh, ())),
            Capability::LegacyShell => {
                self.legacy_shell = Some(registry.bind(name, version, qh, ()));
            }
        }
    }

    fn destroy(&mut self) {
        if let Some(wm_base) = self.wm_base.take() {
            wm_base.destroy();
        }
        // no destructor requests at the bound versions
        self.shm = None;
        self.compositor = None;
        self.legacy_shell = None;
    }
}

/// State handed to every protocol event handler
pub struct AppState {
    registry: CapabilityRegistry,
    globals: Globals,
    presenter: Option<WaylandPresenter>,
    shutdown: ShutdownToken,
}

pub struct Display {
    conn: Connection,
    stream: WaylandEventStream,
    queue: EventQueue<AppState>,
    qh: QueueHandle<AppState>,
    wl_registry: Option<WlRegistry>,
    state: AppState,
}

impl Display {
    /// Connect to the compositor named by the environment
    pub fn connect(shutdown: ShutdownToken) -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| PresentError::Connect(e.to_string()))?;
        info!("Connected to Wayland compositor");
        Self::from_connection(conn, shutdown)
    }

    /// Wrap an already established connection
    pub fn from_connection(conn: Connection, shutdown: ShutdownToken) -> Result<Self> {
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let stream = WaylandEventStream::new(&conn)
            .context("Failed to register Wayland socket with the reactor")?;

        Ok(Self {
            conn,
            stream,
            queue,
            qh,
            wl_registry: None,
            state: AppState {
                registry: CapabilityRegistry::new(),
                globals: Globals::default(),
                presenter: None,
                shutdown,
            },
        })
    }

    /// Bind compositor, shm and layout globals and verify the pixel formats
    pub fn enumerate_and_bind(&mut self) -> Result<()> {
        registry::enumerate_and_bind(self)?;
        Ok(())
    }

    /// Create the surface, its layout role and the buffer pool
    pub fn create_window(&mut self, config: &Config) -> Result<()> {
        let globals = &self.state.globals;
        let unbound = |c: Capability| PresentError::MissingCapability(c.interface());
        let compositor = globals.compositor.as_ref().ok_or(unbound(Capability::Compositor))?;
        let shm = globals.shm.as_ref().ok_or(unbound(Capability::Shm))?;
        let wm_base = globals.wm_base.as_ref().ok_or(unbound(Capability::WmBase))?;

        let surface = WaylandSurface::new(compositor, wm_base, &self.qh);
        let window = Window::new(surface, config.window.width, config.window.height);
        let allocator = ShmAllocator::new(shm.clone(), self.qh.clone());
        let source = ImageFileSource::new(&config.image.path);
        info!("Presenting {:?}", source.path());

        let presenter = Presenter::new(
            window,
            allocator,
            source,
            config.pool.size,
            config.logging.report_interval(),
        )?
        .with_fill(config.window.fill);

        self.state.presenter = Some(presenter);
        info!(
            "Window {}x{} created with {} buffer slots",
            config.window.width, config.window.height, config.pool.size
        );
        Ok(())
    }

    /// Declare the layout intent and dispatch until the first configure has
    /// been acknowledged. Returns false if shutdown was requested first.
    pub async fn await_configure(&mut self) -> Result<bool> {
        self.presenter_mut()?.window_mut().request_layout();
        self.dispatch_until(|state| {
            state
                .presenter
                .as_ref()
                .is_some_and(|p| p.window().is_configured())
        })
        .await
    }

    /// Present the first frame, which starts the frame callback chain
    pub fn present_first_frame(&mut self) -> Result<()> {
        let presenter = self.presenter_mut()?;
        presenter.window_mut().damage_full();
        presenter.redraw(None, 0)?;
        self.conn.flush().context("Failed to flush first frame")?;
        Ok(())
    }

    /// Dispatch until shutdown. Frames are driven entirely by callbacks.
    pub async fn run(&mut self) -> Result<()> {
        info!("Entering event loop");
        self.dispatch_until(|_| false).await?;
        Ok(())
    }

    async fn dispatch_until(&mut self, done: impl Fn(&AppState) -> bool) -> Result<bool> {
        let shutdown = self.state.shutdown.clone();

        loop {
            if shutdown.is_cancelled() {
                debug!("Shutdown requested, leaving dispatch");
                return Ok(false);
            }

            self.queue
                .dispatch_pending(&mut self.state)
                .context("Failed to dispatch Wayland events")?;
            if done(&self.state) {
                return Ok(true);
            }
            self.queue.flush().context("Failed to flush Wayland requests")?;

            // events already queued: dispatch them before blocking
            let Some(guard) = self.queue.prepare_read() else {
                continue;
            };

            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = self.stream.read(guard) => {
                    result.context("Failed to read from Wayland socket")?;
                }
            }
        }
    }

    fn presenter_mut(&mut self) -> Result<&mut WaylandPresenter> {
        self.state
            .presenter
            .as_mut()
            .context("Window has not been created")
    }

    /// Release buffers, surface and globals, then flush. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut presenter) = self.state.presenter.take() {
            debug!(
                "Tearing down after {} frames with {} buffers allocated",
                presenter.scheduler().frames_presented(),
                presenter.pool().allocated()
            );
            presenter.teardown();
        }
        self.state.globals.destroy();
        self.wl_registry = None;

        if let Err(e) = self.conn.flush() {
            warn!("Failed to flush teardown requests: {}", e);
        }
    }
}

impl Handshake for Display {
    fn request_listing(&mut self) -> crate::error::Result<()> {
        self.wl_registry = Some(self.conn.display().get_registry(&self.qh, ()));
        Ok(())
    }

    fn barrier(&mut self) -> crate::error::Result<()> {
        self.queue
            .roundtrip(&mut self.state)
            .map_err(|e| PresentError::Protocol(e.to_string()))?;
        Ok(())
    }

    fn registry_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.state.registry
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    /// Display over a socket pair whose compositor end never writes
    fn silent_display() -> (Display, ShutdownToken, UnixStream) {
        let (client, compositor) = UnixStream::pair().unwrap();
        let conn = Connection::from_socket(client).unwrap();
        let shutdown = ShutdownToken::new();
        let display = Display::from_connection(conn, shutdown.clone()).unwrap();
        (display, shutdown, compositor)
    }

    #[tokio::test]
    async fn test_run_exits_when_cancelled_before_start() {
        let (mut display, shutdown, _compositor) = silent_display();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), display.run())
            .await
            .expect("run did not observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_readiness_wait() {
        let (mut display, shutdown, _compositor) = silent_display();
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.cancel();
        };

        let (completed, ()) = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(display.dispatch_until(|_| false), cancel)
        })
        .await
        .expect("dispatch stayed blocked after cancellation");

        assert!(!completed.unwrap());
    }

    #[tokio::test]
    async fn test_satisfied_predicate_ends_dispatch() {
        let (mut display, _shutdown, _compositor) = silent_display();
        let done = display
            .dispatch_until(|state| state.presenter.is_none())
            .await
            .unwrap();
        assert!(done);
    }

    #[tokio::test]
    async fn test_teardown_without_window_is_harmless() {
        let (mut display, _shutdown, _compositor) = silent_display();
        display.teardown();
        display.teardown();
        assert!(display.state.presenter.is_none());
    }
}
