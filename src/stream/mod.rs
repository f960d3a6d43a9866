//! Stream plumbing: the connection interface, the SSH connector and line
//! decoding.

mod buffer;
mod connection;
mod decoder;
mod ssh;

pub use buffer::{LineBuffer, DEFAULT_MAX_LINE_BYTES};
pub use connection::{ConnectError, SignalSink, StreamConnector, StreamHandle, StreamSignal};
pub use decoder::{decode, DecodeError, EventRecord, TYPE_FIELD};
pub use ssh::{SshConnector, DEFAULT_TERMINATE_TIMEOUT, STREAM_EVENTS_COMMAND};
