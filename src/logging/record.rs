use std::{borrow::Borrow, fmt, panic::Location};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::Level;

/// Identifier a sink is registered and activated under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SinkName(String);

impl SinkName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uses `default` when `name` is empty, the way sinks fall back to their kind's name.
    pub fn or_default(name: impl Into<String>, default: &str) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self(default.to_string())
        } else {
            Self(name)
        }
    }
}

impl fmt::Display for SinkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SinkName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SinkName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for SinkName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SinkName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single log entry as handed to a sink.
#[derive(Debug, Clone)]
pub struct Record {
    level: Level,
    message: Value,
    location: &'static Location<'static>,
    created: DateTime<Utc>,
}

impl Record {
    /// Captures the caller's location, or the nearest caller not marked `#[track_caller]`.
    #[track_caller]
    pub fn new(level: Level, message: impl Into<Value>) -> Self {
        Self::with_location(level, message, Location::caller())
    }

    pub fn with_location(
        level: Level,
        message: impl Into<Value>,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            location,
            created: Utc::now(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &Value {
        &self.message
    }

    /// Strings come out bare, every other payload as compact JSON.
    pub fn message_text(&self) -> String {
        match &self.message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Call site to attribute the record to; a call depth of 0 means "don't".
    pub fn location_for(&self, call_depth: usize) -> Option<&'static Location<'static>> {
        (call_depth > 0).then_some(self.location)
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}
