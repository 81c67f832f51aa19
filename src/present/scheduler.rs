//! Frame scheduler
//!
//! Redraws are driven only by compositor completion callbacks. At most one
//! callback is outstanding; the token for it must fire before the next frame
//! may be composited.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{PresentError, Result};

/// Handle for one requested completion callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameToken {
    seq: u64,
}

impl FrameToken {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

pub struct FrameScheduler {
    pending: Option<FrameToken>,
    next_seq: u64,
    presented: u64,
    /// Start of the current rate window
    window_start: Instant,
    /// Frames committed inside the current rate window
    window_frames: u32,
    report_interval: Duration,
}

impl FrameScheduler {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            pending: None,
            next_seq: 0,
            presented: 0,
            window_start: Instant::now(),
            window_frames: 0,
            report_interval,
        }
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    /// Register a new completion request for the frame about to be committed
    pub fn arm(&mut self) -> Result<FrameToken> {
        if self.pending.is_some() {
            return Err(PresentError::FrameAlreadyPending);
        }
        let token = FrameToken { seq: self.next_seq };
        self.next_seq += 1;
        self.pending = Some(token);
        Ok(token)
    }

    /// The outstanding callback fired; hands back its token
    pub fn fire(&mut self) -> Result<FrameToken> {
        self.pending.take().ok_or(PresentError::UnexpectedFrame)
    }

    /// Forget the outstanding callback without it firing (teardown)
    pub fn cancel(&mut self) -> Option<FrameToken> {
        self.pending.take()
    }

    /// Count a committed frame. Once per report interval the achieved rate
    /// is logged and returned.
    pub fn record_frame(&mut self) -> Option<f64> {
        self.presented += 1;
        self.window_frames += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed < self.report_interval {
            return None;
        }

        let fps = self.window_frames as f64 / elapsed.as_secs_f64();
        self.window_frames = 0;
        self.window_start = Instant::now();
        debug!("Presenting at {:.1} fps ({} frames total)", fps, self.presented);
        Some(fps)
    }
}
