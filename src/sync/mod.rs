//! Synchronization primitives for coroutine bodies.
//!
//! - [`Mutex`]: async mutex whose guard may be held across suspensions

pub mod mutex;

pub use mutex::{Mutex, MutexGuard};
