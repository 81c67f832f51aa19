//! Protocol event handlers
//!
//! Every handler translates its event into registry updates or a
//! [`Event`] and hands it to the presenter.

use tracing::{error, warn};
use wayland_client::protocol::wl_buffer::{self, WlBuffer};
use wayland_client::protocol::wl_callback::{self, WlCallback};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_region::WlRegion;
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_shell::WlShell;
use wayland_client::protocol::wl_shm::{self, WlShm};
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, Dispatch, QueueHandle, WEnum, delegate_noop};
use wayland_protocols::xdg::shell::client::xdg_surface::{self, XdgSurface};
use wayland_protocols::xdg::shell::client::xdg_toplevel::{self, XdgToplevel};
use wayland_protocols::xdg::shell::client::xdg_wm_base::{self, XdgWmBase};

use super::AppState;
use crate::pixels::PixelFormat;
use crate::present::Event;
use crate::present::pool::BufferId;

impl AppState {
    fn deliver(&mut self, event: Event) {
        let Some(presenter) = self.presenter.as_mut() else {
            warn!("No window for {:?}", event);
            return;
        };
        if let Err(e) = presenter.handle_event(event) {
            // no frame can follow a failed one: the chain of callbacks ends here
            if e.is_contract_violation() {
                error!("Protocol contract violated while handling {:?}: {}", event, e);
            } else {
                error!("Failed to handle {:?}: {}", event, e);
            }
            std::process::abort();
        }

        if presenter.close_requested() {
            self.shutdown.cancel();
        }
    }
}

impl Dispatch<WlRegistry, ()> for AppState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if let Some(request) = state.registry.on_global(name, &interface, version) {
                    state.globals.bind(registry, request, qh);
                }
            }
            wl_registry::Event::GlobalRemove { name } => state.registry.on_global_remove(name),
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for AppState {
    fn event(
        state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            let code = match format {
                WEnum::Value(format) => u32::from(format),
                WEnum::Unknown(code) => code,
            };
            state.registry.on_format(PixelFormat::from_code(code));
        }
    }
}

impl Dispatch<XdgWmBase, ()> for AppState {
    fn event(
        state: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            if state.presenter.is_some() {
                state.deliver(Event::Ping { serial });
            } else {
                // pinged before the window exists
                wm_base.pong(serial);
            }
        }
    }
}

impl Dispatch<XdgSurface, ()> for AppState {
    fn event(
        state: &mut Self,
        _surface: &XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            state.deliver(Event::Configure { serial });
        }
    }
}

impl Dispatch<XdgToplevel, ()> for AppState {
    fn event(
        state: &mut Self,
        _toplevel: &XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                state.deliver(Event::ToplevelConfigure { width, height });
            }
            xdg_toplevel::Event::Close => state.deliver(Event::Close),
            _ => {}
        }
    }
}

impl Dispatch<WlBuffer, BufferId> for AppState {
    fn event(
        state: &mut Self,
        _buffer: &WlBuffer,
        event: wl_buffer::Event,
        id: &BufferId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.deliver(Event::BufferReleased(*id));
        }
    }
}

impl Dispatch<WlCallback, ()> for AppState {
    fn event(
        state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { callback_data } = event {
            state.deliver(Event::FrameDone {
                time: callback_data,
            });
        }
    }
}

delegate_noop!(AppState: ignore WlCompositor);
delegate_noop!(AppState: ignore WlSurface);
delegate_noop!(AppState: ignore WlShmPool);
delegate_noop!(AppState: ignore WlRegion);
delegate_noop!(AppState: ignore WlShell);
