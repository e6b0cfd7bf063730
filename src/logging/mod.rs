mod broker;
mod error;
mod formatters;
mod level;
mod record;
mod registry;
mod sinks;

pub use broker::{BrokerConfig, BrokerSink, BROKER};
pub use error::{BrokerError, SinkError};
pub use formatters::{Config, DefaultFormatter};
pub use level::{accepts, InvalidLevel, Level};
pub use record::{Record, SinkName};
pub use registry::Registry;
pub use sinks::{ConsoleSink, FanoutSink, FileSink, CONSOLE, FILE};

pub trait LogFormatter: Sync + Send {
    fn format(&self, record: &Record, call_depth: usize) -> String;
}

/// A destination the registry can route records to.
///
/// Severity filtering happens in the [`Registry`]; a sink writes whatever it is handed.
/// Sinks are shared across threads behind an `Arc`, so every mutator takes `&self`.
pub trait Sink: Sync + Send {
    fn name(&self) -> &SinkName;

    /// Writes `record`, attributing it to its call site unless `call_depth` is 0.
    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool;

    fn write(&self, record: &Record) -> bool {
        self.write_with_call_depth(record, self.call_depth())
    }

    fn set_call_depth(&self, call_depth: usize);

    fn call_depth(&self) -> usize;

    fn is_ready(&self) -> bool {
        true
    }

    /// Releases the sink's resources. Errors are logged, not returned.
    fn shutdown(&self) {}
}
