//! xdg-shell toplevel surface

use tracing::debug;
use wayland_client::QueueHandle;
use wayland_client::protocol::wl_callback::WlCallback;
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_protocols::xdg::shell::client::xdg_surface::XdgSurface;
use wayland_protocols::xdg::shell::client::xdg_toplevel::XdgToplevel;
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use super::AppState;
use super::shm::ShmBuffer;
use crate::present::window::{Rect, SurfaceOps};

pub const APP_ID: &str = "shm-present";

pub struct WaylandSurface {
    compositor: WlCompositor,
    wm_base: XdgWmBase,
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    frame: Option<WlCallback>,
    qh: QueueHandle<AppState>,
}

impl WaylandSurface {
    pub fn new(compositor: &WlCompositor, wm_base: &XdgWmBase, qh: &QueueHandle<AppState>) -> Self {
        let surface = compositor.create_surface(qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, qh, ());
        let toplevel = xdg_surface.get_toplevel(qh, ());
        toplevel.set_title(APP_ID.to_string());
        toplevel.set_app_id(APP_ID.to_string());

        Self {
            compositor: compositor.clone(),
            wm_base: wm_base.clone(),
            surface,
            xdg_surface,
            toplevel,
            frame: None,
            qh: qh.clone(),
        }
    }
}

impl SurfaceOps for WaylandSurface {
    type Buffer = ShmBuffer;

    fn set_empty_input_region(&mut self) {
        let region = self.compositor.create_region(&self.qh, ());
        region.add(0, 0, 0, 0);
        self.surface.set_input_region(Some(&region));
        region.destroy();
    }

    fn set_layout_intent(&mut self) {
        self.toplevel.set_parent(None);
        self.toplevel.set_maximized();
    }

    fn ack_configure(&mut self, serial: u32) {
        self.xdg_surface.ack_configure(serial);
    }

    fn pong(&mut self, serial: u32) {
        self.wm_base.pong(serial);
    }

    fn attach(&mut self, buffer: &ShmBuffer, x: i32, y: i32) {
        self.surface.attach(Some(buffer.wl_buffer()), x, y);
    }

    fn damage(&mut self, rect: Rect) {
        self.surface.damage(rect.x, rect.y, rect.width, rect.height);
    }

    fn request_frame(&mut self) {
        self.frame = Some(self.surface.frame(&self.qh, ()));
    }

    fn commit(&mut self) {
        self.surface.commit();
    }

    // role objects go before the wl_surface they were created from
    fn destroy(&mut self) {
        self.frame = None;
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
        debug!("Surface destroyed");
    }
}
