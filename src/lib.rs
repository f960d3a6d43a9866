//! gerrit-stream - Watch a Gerrit `stream-events` feed and republish its
//! events to in-process listeners.

pub mod broadcast;
pub mod config;
pub mod display;
pub mod emitter;
pub mod naming;
pub mod runner;
pub mod stream;

pub use broadcast::{Broadcaster, EventPayload, STREAM_END_EVENT, STREAM_WRITE_EVENT};
pub use emitter::{LifecycleState, StreamEmitter};
pub use naming::camelize;
pub use runner::{RunOutcome, RunnerError, StreamRunner};
