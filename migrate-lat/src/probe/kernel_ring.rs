//! [`EventSource`] over the kernel `EVENTS` ring buffer

use aya::maps::{MapData, RingBuf};
use migrate_lat_common::EVENT_RING_BYTES;
use std::io;
use std::os::fd::AsRawFd;
use std::time::Duration;

use crate::channel::slots_for;
use crate::poller::EventSource;

/// Records taken per drain; anything published meanwhile waits for the next poll
#[must_use]
pub fn max_drain() -> usize {
    slots_for(EVENT_RING_BYTES as usize)
}

pub struct KernelRing {
    ring: RingBuf<MapData>,
}

impl KernelRing {
    #[must_use]
    pub fn new(ring: RingBuf<MapData>) -> Self {
        Self { ring }
    }

    fn drain(&mut self, on_record: &mut dyn FnMut(&[u8])) -> usize {
        let limit = max_drain();
        let mut seen = 0;
        while seen < limit {
            let Some(item) = self.ring.next() else { break };
            on_record(&item);
            seen += 1;
        }
        seen
    }
}

impl EventSource for KernelRing {
    fn poll(&mut self, timeout: Duration, on_record: &mut dyn FnMut(&[u8])) -> io::Result<usize> {
        let seen = self.drain(on_record);
        if seen > 0 {
            return Ok(seen);
        }
        if !wait_readable(self.ring.as_raw_fd(), timeout)? {
            return Ok(0);
        }
        Ok(self.drain(on_record))
    }
}

/// Block until `fd` is readable or `timeout` passes
///
/// A signal landing mid-wait counts as a timeout.
fn wait_readable(fd: i32, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    // SAFETY: `pollfd` is a valid, initialized array of length 1 for the whole call
    #[allow(unsafe_code)]
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}
