//! Error taxonomy for the presentation client
//!
//! Startup failures bubble up to `main` and end the process with status 1.
//! Contract violations are raised from inside protocol dispatch, where there
//! is no safe way to continue, and abort the process.

use thiserror::Error;

use crate::pixels::PixelFormat;
use crate::present::pool::BufferId;

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("failed to connect to the compositor: {0}")]
    Connect(String),

    #[error("compositor does not advertise required global `{0}`")]
    MissingCapability(&'static str),

    #[error("compositor does not support pixel format {0}")]
    MissingFormat(PixelFormat),

    #[error("shared memory allocation of {size} bytes failed: {source}")]
    ShmAllocation {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid buffer geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    /// Every slot in the pool is still owned by the compositor.
    #[error("all {capacity} buffers busy at redraw, compositor never released one")]
    PoolExhausted { capacity: usize },

    #[error("release for unknown buffer {0}")]
    UnknownBuffer(BufferId),

    #[error("compositor released buffer {0} which was not busy")]
    AlreadyReleased(BufferId),

    #[error("buffer {0} is owned by the compositor and must not be written")]
    BufferBusy(BufferId),

    #[error("frame callback requested while another is outstanding")]
    FrameAlreadyPending,

    #[error("frame callback fired with none outstanding")]
    UnexpectedFrame,

    #[error("surface is {0}, cannot render")]
    NotConfigured(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PresentError {
    /// Errors that mean the compositor or this client broke the protocol
    /// contract. No frame can safely follow one of these.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PresentError::PoolExhausted { .. }
                | PresentError::UnknownBuffer(_)
                | PresentError::AlreadyReleased(_)
                | PresentError::BufferBusy(_)
                | PresentError::FrameAlreadyPending
                | PresentError::UnexpectedFrame
        )
    }
}

pub type Result<T> = std::result::Result<T, PresentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_classification() {
        assert!(PresentError::PoolExhausted { capacity: 2 }.is_contract_violation());
        assert!(PresentError::AlreadyReleased(BufferId::new(3)).is_contract_violation());
        assert!(PresentError::FrameAlreadyPending.is_contract_violation());

        assert!(!PresentError::MissingCapability("wl_shm").is_contract_violation());
        assert!(!PresentError::MissingFormat(PixelFormat::Xrgb8888).is_contract_violation());
        assert!(!PresentError::Connect("no socket".into()).is_contract_violation());
    }

    #[test]
    fn test_messages_name_the_culprit() {
        let err = PresentError::MissingCapability("xdg_wm_base");
        assert!(err.to_string().contains("xdg_wm_base"));

        let err = PresentError::MissingFormat(PixelFormat::Argb8888);
        assert!(err.to_string().contains("ARGB8888"));
    }
}
