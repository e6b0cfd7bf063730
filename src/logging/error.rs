use std::io;

/// Failure to bring a sink up. Once a sink exists, failures are reported through its own
/// diagnostics and never through this type.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{what} is unavailable")]
    ResourceUnavailable {
        what: String,
        #[source]
        source: io::Error,
    },
}

impl SinkError {
    pub(crate) fn unavailable(what: impl Into<String>, source: io::Error) -> Self {
        SinkError::ResourceUnavailable {
            what: what.into(),
            source,
        }
    }
}

/// Transport failure observed by a broker sink after construction.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker queue is full, record dropped")]
    QueueFull,
    #[error("broker transport is closed, record dropped")]
    Closed,
    #[error("failed encoding broker message")]
    Encode(#[from] serde_json::Error),
    #[error("gave up on {count} queued records")]
    Abandoned { count: usize },
    #[error("failed writing to broker {addr}")]
    Write {
        addr: String,
        #[source]
        source: io::Error,
    },
}
