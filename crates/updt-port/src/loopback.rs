//! In-memory transport pair for running both sides of a session in one process.
//!
//! Each direction is a bounded byte queue guarded by a mutex. `send` blocks while the queue
//! is full and `receive` blocks while it is empty, unless the peer is gone, in which case
//! the call fails with [`Error::PeerClosed`]. Bytes already queued by a closed peer are
//! still delivered.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use log::trace;

use crate::{Result, Transport, err::Error};

/// Receive queue size used by [`Loopback::pair`] when none is given.
pub const DEFAULT_CAPACITY: usize = 1024;

struct Queue {
    bytes: VecDeque<u8>,
    capacity: usize,
    sender_closed: bool,
    receiver_closed: bool,
}

/// One direction of a connection
struct Pipe {
    queue: Mutex<Queue>,
    changed: Condvar,
}

impl Pipe {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(Queue {
                bytes: VecDeque::with_capacity(capacity),
                capacity,
                sender_closed: false,
                receiver_closed: false,
            }),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Queue>) -> MutexGuard<'a, Queue> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loopback transport endpoint.
///
/// Create two endpoints and join them with [`Loopback::connect`], or use
/// [`Loopback::pair`]. Dropping an endpoint closes it.
pub struct Loopback {
    capacity: usize,
    tx: Option<Arc<Pipe>>,
    rx: Option<Arc<Pipe>>,
}

impl Loopback {
    /// Unconnected endpoint that buffers up to `capacity` inbound bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tx: None,
            rx: None,
        }
    }

    /// Two endpoints already connected to each other.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let mut a = Self::new(capacity);
        let mut b = Self::new(capacity);
        Self::connect(&mut a, &mut b);
        (a, b)
    }

    /// Bind `a`'s outbound stream to `b`'s inbound stream and vice versa.
    ///
    /// Any previous connection of either endpoint is closed first.
    pub fn connect(a: &mut Self, b: &mut Self) {
        a.close();
        b.close();

        let a_to_b = Pipe::new(b.capacity);
        let b_to_a = Pipe::new(a.capacity);

        a.tx = Some(a_to_b.clone());
        b.rx = Some(a_to_b);
        b.tx = Some(b_to_a.clone());
        a.rx = Some(b_to_a);
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    /// Close both directions. The peer's pending and future calls fail with
    /// [`Error::PeerClosed`] once it has drained what was already sent.
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.lock().sender_closed = true;
            tx.changed.notify_all();
        }

        if let Some(rx) = self.rx.take() {
            rx.lock().receiver_closed = true;
            rx.changed.notify_all();
        }
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Drop for Loopback {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for Loopback {
    fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let pipe = self.tx.as_ref().ok_or(Error::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut queue = pipe.lock();
        loop {
            if queue.receiver_closed {
                return Err(Error::PeerClosed);
            }

            let space = queue.capacity - queue.bytes.len();
            if space > 0 {
                let n = space.min(buf.len());
                queue.bytes.extend(&buf[..n]);
                pipe.changed.notify_all();
                trace!("loopback: queued {n} of {} bytes", buf.len());
                return Ok(n);
            }

            queue = pipe.wait(queue);
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pipe = self.rx.as_ref().ok_or(Error::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut queue = pipe.lock();
        loop {
            if !queue.bytes.is_empty() {
                let n = queue.bytes.len().min(buf.len());
                for (dst, src) in buf.iter_mut().zip(queue.bytes.drain(..n)) {
                    *dst = src;
                }
                pipe.changed.notify_all();
                return Ok(n);
            }

            if queue.sender_closed {
                return Err(Error::PeerClosed);
            }

            queue = pipe.wait(queue);
        }
    }
}
