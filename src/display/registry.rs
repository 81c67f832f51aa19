//! Capability registry
//!
//! Records which advertised globals are bound and which pixel formats the
//! shared-memory factory supports. Binding happens while the first barrier
//! dispatches advertisements; the formats those binds trigger are only
//! guaranteed to be processed after a second barrier. The registry is sealed
//! after that and never changes again.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{PresentError, Result};
use crate::pixels::PixelFormat;

/// Globals this client knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Surface and region factory
    Compositor,
    /// Shared-memory buffer factory
    Shm,
    /// Layout negotiation (xdg-shell)
    WmBase,
    /// Pre-xdg shell, bound when present but never required
    LegacyShell,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Compositor,
        Capability::Shm,
        Capability::WmBase,
        Capability::LegacyShell,
    ];

    pub fn from_interface(interface: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.interface() == interface)
    }

    pub fn interface(self) -> &'static str {
        match self {
            Capability::Compositor => "wl_compositor",
            Capability::Shm => "wl_shm",
            Capability::WmBase => "xdg_wm_base",
            Capability::LegacyShell => "wl_shell",
        }
    }

    /// Highest version this client speaks
    pub fn max_version(self) -> u32 {
        match self {
            Capability::Compositor => 4,
            Capability::Shm => 1,
            Capability::WmBase => 5,
            Capability::LegacyShell => 1,
        }
    }

    pub fn required(self) -> bool {
        !matches!(self, Capability::LegacyShell)
    }
}

/// Formats every buffer format decision depends on
pub const REQUIRED_FORMATS: [PixelFormat; 2] = [PixelFormat::Argb8888, PixelFormat::Xrgb8888];

/// Bind the client should issue for an advertised global
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRequest {
    pub name: u32,
    pub capability: Capability,
    pub version: u32,
}

#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    bound: HashMap<Capability, BindRequest>,
    formats: HashSet<PixelFormat>,
    sealed: bool,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one advertisement, returning the bind to perform if the global
    /// is wanted and not yet bound
    pub fn on_global(&mut self, name: u32, interface: &str, version: u32) -> Option<BindRequest> {
        if self.sealed {
            debug!("Ignoring late global {} ({} v{})", name, interface, version);
            return None;
        }

        let Some(capability) = Capability::from_interface(interface) else {
            debug!("Skipping global {} ({} v{})", name, interface, version);
            return None;
        };

        if self.bound.contains_key(&capability) {
            debug!("Duplicate {} advertised as {}, keeping first", interface, name);
            return None;
        }

        let request = BindRequest {
            name,
            capability,
            version: version.min(capability.max_version()),
        };
        info!(
            "Binding {} (global {}, v{} of v{})",
            interface, name, request.version, version
        );
        self.bound.insert(capability, request);
        Some(request)
    }

    pub fn on_global_remove(&mut self, name: u32) {
        if let Some(request) = self.bound.values().find(|r| r.name == name) {
            warn!(
                "Compositor removed bound global {} ({})",
                name,
                request.capability.interface()
            );
        } else {
            debug!("Global {} removed", name);
        }
    }

    pub fn on_format(&mut self, format: PixelFormat) {
        if self.sealed {
            debug!("Ignoring late pixel format {}", format);
            return;
        }
        if self.formats.insert(format) {
            debug!(
                "Compositor supports pixel format {} (code {:#x})",
                format,
                format.code()
            );
        }
    }

    pub fn is_bound(&self, capability: Capability) -> bool {
        self.bound.contains_key(&capability)
    }

    #[cfg(test)]
    pub fn binding(&self, capability: Capability) -> Option<BindRequest> {
        self.bound.get(&capability).copied()
    }

    pub fn supports(&self, format: PixelFormat) -> bool {
        self.formats.contains(&format)
    }

    #[cfg(test)]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Freeze the registry and check that everything buffer and surface
    /// creation depends on is present
    pub fn seal(&mut self) -> Result<()> {
        self.sealed = true;

        for capability in Capability::ALL.into_iter().filter(|c| c.required()) {
            if !self.is_bound(capability) {
                return Err(PresentError::MissingCapability(capability.interface()));
            }
        }

        for format in REQUIRED_FORMATS {
            if !self.supports(format) {
                return Err(PresentError::MissingFormat(format));
            }
        }

        info!(
            "Registry sealed: {} globals bound, {} pixel formats",
            self.bound.len(),
            self.formats.len()
        );
        Ok(())
    }
}

/// The transport side of the bootstrap handshake
pub trait Handshake {
    /// Ask the compositor for its global listing
    fn request_listing(&mut self) -> Result<()>;

    /// Block until every request sent so far has been processed by the
    /// compositor and every resulting event has been dispatched
    fn barrier(&mut self) -> Result<()>;

    fn registry_mut(&mut self) -> &mut CapabilityRegistry;
}

/// Enumerate globals, bind the wanted ones and collect their formats.
///
/// Two dependent rounds (advertise -> bind -> sub-advertise) need two
/// barriers before the result can be trusted.
pub fn enumerate_and_bind<H: Handshake>(handshake: &mut H) -> Result<()> {
    handshake.request_listing()?;

    handshake.barrier()?;
    debug!("Global listing processed");

    handshake.barrier()?;
    debug!("Bound global events processed");

    handshake.registry_mut().seal()
}
