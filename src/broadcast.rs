//! In-process publish/subscribe register.
//!
//! Listeners are keyed by event name. The name space is open-ended: domain
//! event names are derived from type tags at runtime, so dispatch is by
//! string rather than a fixed enum of variants.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Event carrying every raw chunk read from the stream.
pub const STREAM_WRITE_EVENT: &str = "gerritStreamWrite";

/// Event carrying the end payload when the stream closes.
pub const STREAM_END_EVENT: &str = "gerritStreamEnd";

/// Payload handed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Raw text, used by the stream write/end events.
    Text(String),
    /// A decoded stream record, echoed verbatim.
    Record(Map<String, Value>),
}

impl EventPayload {
    /// Returns the text if this is a `Text` payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Record(_) => None,
        }
    }

    /// Returns the record if this is a `Record` payload.
    #[must_use]
    pub fn as_record(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Record(record) => Some(record),
            Self::Text(_) => None,
        }
    }

    /// Look up a field of a `Record` payload.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_record().and_then(|record| record.get(key))
    }
}

/// Listener for a single event name.
pub type Listener = Box<dyn FnMut(&EventPayload) + Send>;

/// Listener receiving every published event along with its name.
pub type CatchAllListener = Box<dyn FnMut(&str, &EventPayload) + Send>;

/// Named listener register with synchronous fan-out.
#[derive(Default)]
pub struct Broadcaster {
    listeners: HashMap<String, Vec<Listener>>,
    catch_all: Vec<CatchAllListener>,
}

impl Broadcaster {
    /// Create an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`.
    pub fn subscribe<F>(&mut self, event: impl Into<String>, listener: F)
    where
        F: FnMut(&EventPayload) + Send + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(listener));
    }

    /// Append a listener that sees every event.
    pub fn subscribe_all<F>(&mut self, listener: F)
    where
        F: FnMut(&str, &EventPayload) + Send + 'static,
    {
        self.catch_all.push(Box::new(listener));
    }

    /// Invoke every listener for `event`, in subscription order, then every
    /// catch-all listener.
    ///
    /// Publishing to a name with no listeners does nothing. Listener panics
    /// are not caught.
    pub fn publish(&mut self, event: &str, payload: &EventPayload) {
        if let Some(listeners) = self.listeners.get_mut(event) {
            for listener in listeners.iter_mut() {
                listener(payload);
            }
        }
        for listener in &mut self.catch_all {
            listener(event, payload);
        }
    }

    /// Number of listeners subscribed to `event` by name.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Remove every listener for `event`.
    pub fn clear(&mut self, event: &str) {
        self.listeners.remove(event);
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<(&str, usize)> = self
            .listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        events.sort_unstable();
        f.debug_struct("Broadcaster")
            .field("events", &events)
            .field("catch_all", &self.catch_all.len())
            .finish()
    }
}
