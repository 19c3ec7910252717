//! Bounded channel built on two event signal sources.
//!
//! The buffer lives behind a lock; suspension is expressed entirely through
//! [`Event`]s. An accepted write notifies [`Channel::readable`] and an
//! accepted read notifies [`Channel::writable`]. Notification is level-style:
//! it wakes one parked body or leaves a single signal banked, so the events
//! never accumulate signals with traffic. A body that finds the channel
//! empty (or full) waits on the matching event and retries the `try_`
//! operation after it wakes, since another body may have taken the slot in
//! between.
//!
//! A zero-capacity channel is a rendezvous slot: a write parks one value
//! until a reader takes it, and a read with no parked value reports
//! [`ErrorKind::ReadBeforeWrite`]. The error is returned to the reader and
//! the channel stays usable.
//!
//! [`Channel::close`] rejects further writes with [`TrySendError::Closed`]
//! and latches both events, so every parked or later waiter wakes and
//! observes the close. Readers drain what is buffered and then see
//! [`ErrorKind::ChannelClosed`].

use core::fmt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::event::Event;

/// Error returned by [`Channel::try_write`]. The rejected value is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// Every slot is taken; wait on [`Channel::writable`] and retry.
    Full(T),
    /// The channel was closed; no write will ever succeed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Returns the rejected value.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }

    /// Returns true if the channel was closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Returns the matching error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Full(_) => ErrorKind::ChannelFull,
            Self::Closed(_) => ErrorKind::ChannelClosed,
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "writing to a full channel"),
            Self::Closed(_) => write!(f, "writing to a closed channel"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

impl<T> From<TrySendError<T>> for Error {
    fn from(err: TrySendError<T>) -> Self {
        Self::new(err.kind())
    }
}

#[derive(Debug)]
struct Buffer<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    capacity: usize,
    buffer: Mutex<Buffer<T>>,
    readable: Event,
    writable: Event,
}

impl<T> Shared<T> {
    /// Slots available to writers; a rendezvous channel holds one parked value.
    fn slots(&self) -> usize {
        self.capacity.max(1)
    }
}

/// A clonable handle to a bounded multi-producer multi-consumer channel.
pub struct Channel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Creates a channel holding at most `capacity` values.
    ///
    /// A capacity of zero makes a rendezvous channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            capacity,
            buffer: Mutex::new(Buffer {
                queue: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            readable: Event::new(false),
            writable: Event::new(false),
        });
        debug!(capacity, "channel created");
        Self { shared }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns the number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().queue.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.buffer.lock().closed
    }

    /// Event notified after an accepted write; latched on close.
    #[must_use]
    pub fn readable(&self) -> &Event {
        &self.shared.readable
    }

    /// Event notified after a freed slot; latched on close.
    #[must_use]
    pub fn writable(&self) -> &Event {
        &self.shared.writable
    }

    /// Buffers `value` if there is room.
    ///
    /// A full channel hands the value back in [`TrySendError::Full`], a
    /// closed one in [`TrySendError::Closed`].
    pub fn try_write(&self, value: T) -> std::result::Result<(), TrySendError<T>> {
        {
            let mut buffer = self.shared.buffer.lock();
            if buffer.closed {
                trace!("channel write after close");
                return Err(TrySendError::Closed(value));
            }
            if buffer.queue.len() >= self.shared.slots() {
                trace!(len = buffer.queue.len(), "channel write rejected: full");
                return Err(TrySendError::Full(value));
            }
            buffer.queue.push_back(value);
        }
        self.shared.readable.notify();
        Ok(())
    }

    /// Takes the oldest buffered value.
    ///
    /// Returns `Ok(None)` when a buffered channel is empty. A rendezvous
    /// channel with no parked value reports `ReadBeforeWrite`; a closed and
    /// drained channel reports `ChannelClosed`.
    pub fn try_read(&self) -> Result<Option<T>> {
        let value = {
            let mut buffer = self.shared.buffer.lock();
            match buffer.queue.pop_front() {
                Some(value) => value,
                None if buffer.closed => {
                    return Err(Error::new(ErrorKind::ChannelClosed));
                }
                None if self.shared.capacity == 0 => {
                    debug!("read before write on rendezvous channel");
                    return Err(Error::new(ErrorKind::ReadBeforeWrite)
                        .with_message("no writer parked a value"));
                }
                None => return Ok(None),
            }
        };
        self.shared.writable.notify();
        Ok(Some(value))
    }

    /// Rejects further writes and wakes every parked waiter.
    ///
    /// Both events stay signaled afterwards, so a body that registers a
    /// wait after the close resolves at once and observes it on retry.
    /// Returns true if this call closed the channel.
    pub fn close(&self) -> bool {
        {
            let mut buffer = self.shared.buffer.lock();
            if buffer.closed {
                return false;
            }
            buffer.closed = true;
        }
        debug!("channel closed");
        self.shared.readable.latch();
        self.shared.writable.latch();
        true
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (len, closed) = self
            .shared
            .buffer
            .try_lock()
            .map_or((None, None), |b| (Some(b.queue.len()), Some(b.closed)));
        f.debug_struct("Channel")
            .field("capacity", &self.shared.capacity)
            .field("len", &len)
            .field("closed", &closed)
            .finish_non_exhaustive()
    }
}
