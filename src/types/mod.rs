//! Core types for the resumef runtime.
//!
//! - [`id`]: Identifier types (`StateId`, `SchedulerId`, `TaskId`, `FrameId`, `EventId`)

pub mod id;

pub use id::{EventId, FrameId, SchedulerId, StateId, TaskId};
