//! Wayland Async Event Stream
//!
//! Waits for the compositor socket to become readable on the tokio reactor
//! and reads whatever arrived into the event queue.

use std::io;
use std::os::fd::OwnedFd;

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use wayland_client::Connection;
use wayland_client::backend::{ReadEventsGuard, WaylandError};

pub struct WaylandEventStream {
    // duplicate of the connection socket, owned by the reactor registration
    fd: AsyncFd<OwnedFd>,
}

impl WaylandEventStream {
    /// Register a duplicate of the connection's socket with the reactor
    pub fn new(conn: &Connection) -> io::Result<Self> {
        let fd = conn.backend().poll_fd().try_clone_to_owned()?;
        Ok(Self {
            fd: AsyncFd::with_interest(fd, Interest::READABLE)?,
        })
    }

    /// Wait for readability, then read into the queue.
    ///
    /// Returns the number of events read. Zero means the wakeup was spurious
    /// and the caller should prepare a fresh read.
    pub async fn read(&self, guard: ReadEventsGuard) -> Result<usize, WaylandError> {
        let mut ready = self.fd.readable().await.map_err(WaylandError::Io)?;

        match guard.read() {
            Ok(n) => Ok(n),
            Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                // edge-triggered: only forget readiness once the socket is drained
                ready.clear_ready();
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}
