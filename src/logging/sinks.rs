use std::{
    fs::File,
    io::{LineWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use super::{LogFormatter, Record, Sink, SinkError, SinkName};

pub const CONSOLE: &str = "Console";
pub const FILE: &str = "File";

pub struct FileSink {
    name: SinkName,
    file: Mutex<Option<LineWriter<File>>>,
    file_path: PathBuf,
    formatter: Box<dyn LogFormatter>,
    call_depth: AtomicUsize,
}

impl FileSink {
    /// Opens `path` for appending, creating it if needed. An empty `name` becomes `File`.
    pub fn new(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        call_depth: usize,
        formatter: Box<dyn LogFormatter>,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::unavailable(format!("log file {}", path.display()), e))?;

        Ok(Self {
            name: SinkName::or_default(name, FILE),
            file: Mutex::new(Some(LineWriter::new(file))),
            file_path: path.to_path_buf(),
            formatter,
            call_depth: AtomicUsize::new(call_depth),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl Sink for FileSink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = file.as_mut() else {
            tracing::debug!(target: "logswitch", sink = %self.name, "write after shutdown ignored");
            return false;
        };

        let line = self.formatter.format(record, call_depth);
        if let Err(err) = writeln!(writer, "{}", line) {
            tracing::warn!(
                target: "logswitch",
                sink = %self.name,
                path = %self.file_path.display(),
                "failed writing log line: {}", err
            );
        }

        true
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::Relaxed);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn shutdown(&self) {
        let writer = self
            .file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut writer) = writer {
            if let Err(err) = writer.flush() {
                tracing::warn!(target: "logswitch", sink = %self.name, "failed flushing log file: {}", err);
            }
        }
    }
}

pub struct ConsoleSink {
    name: SinkName,
    handle: std::io::Stderr,
    formatter: Box<dyn LogFormatter>,
    call_depth: AtomicUsize,
}

impl ConsoleSink {
    /// Writes to stderr. An empty `name` becomes `Console`.
    pub fn new(name: impl Into<String>, call_depth: usize, formatter: Box<dyn LogFormatter>) -> Self {
        Self {
            name: SinkName::or_default(name, CONSOLE),
            handle: std::io::stderr(),
            formatter,
            call_depth: AtomicUsize::new(call_depth),
        }
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool {
        let line = self.formatter.format(record, call_depth);
        let mut writer = self.handle.lock();

        if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!(target: "logswitch", sink = %self.name, "failed writing to stderr: {}", err);
        }

        true
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::Relaxed);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::Relaxed)
    }
}

/// Writes every record to each of its ready members.
pub struct FanoutSink {
    name: SinkName,
    sinks: Vec<Arc<dyn Sink>>,
    call_depth: AtomicUsize,
}

impl FanoutSink {
    pub fn new(name: impl Into<SinkName>, sinks: Vec<Arc<dyn Sink>>, call_depth: usize) -> Self {
        Self {
            name: name.into(),
            sinks,
            call_depth: AtomicUsize::new(call_depth),
        }
    }
}

impl Sink for FanoutSink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    /// Succeeds when at least one member accepted the record.
    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool {
        self.sinks
            .iter()
            .filter(|sink| sink.is_ready())
            .fold(false, |delivered, sink| {
                sink.write_with_call_depth(record, call_depth) || delivered
            })
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::Relaxed);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.sinks.iter().any(|sink| sink.is_ready())
    }

    fn shutdown(&self) {
        for sink in &self.sinks {
            sink.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::logging::{Config, DefaultFormatter, Level};
    use crate::test_support::MemorySink;

    use super::*;

    fn plain() -> Box<dyn LogFormatter> {
        Box::new(DefaultFormatter::new(Config::plain()))
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "existing\n").unwrap();

        let sink = FileSink::new(&path, "", 3, plain()).unwrap();
        assert_eq!(sink.name().as_str(), FILE);
        assert!(sink.is_ready());

        assert!(sink.write(&Record::new(Level::Error, "first")));
        assert!(sink.write_with_call_depth(&Record::new(Level::Info, "second"), 0));
        sink.shutdown();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "existing");
        assert!(lines[1].starts_with("ERROR : "));
        assert!(lines[1].contains(file!()));
        assert!(lines[1].ends_with("first"));
        assert!(!lines[2].contains(file!()));
    }

    #[test]
    fn file_sink_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let sink = FileSink::new(&path, "audit", 1, plain()).unwrap();

        sink.shutdown();
        assert!(!sink.is_ready());
        sink.shutdown();
        assert!(!sink.write(&Record::new(Level::Fatal, "late")));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn file_sink_reports_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("app.log");

        let err = FileSink::new(&path, "File", 3, plain()).err().unwrap();
        assert!(matches!(err, SinkError::ResourceUnavailable { .. }));
    }

    #[test]
    fn call_depth_is_adjustable() {
        let sink = ConsoleSink::new("", 3, plain());
        assert_eq!(sink.name().as_str(), CONSOLE);
        assert_eq!(sink.call_depth(), 3);

        sink.set_call_depth(1);
        assert_eq!(sink.call_depth(), 1);
        assert!(sink.write(&Record::new(Level::Debug, "to stderr")));
    }

    #[test]
    fn fanout_writes_to_ready_members() {
        let first = MemorySink::new("first");
        let second = MemorySink::new("second");
        let down = MemorySink::new("down");
        down.set_ready(false);

        let members: Vec<Arc<dyn Sink>> = vec![first.clone(), second.clone(), down.clone()];
        let fanout = FanoutSink::new("Both", members, 4);
        assert!(fanout.is_ready());
        assert!(fanout.write(&Record::new(Level::Warn, "copied")));

        assert_eq!(first.messages(), vec!["copied"]);
        assert_eq!(second.depths(), vec![4]);
        assert!(down.messages().is_empty());

        fanout.shutdown();
        assert_eq!(first.shutdowns() + second.shutdowns() + down.shutdowns(), 3);
    }

    #[test]
    fn fanout_fails_when_no_member_delivers() {
        let only = MemorySink::new("only");
        only.set_result(false);
        let fanout = FanoutSink::new("Only", vec![only.clone() as Arc<dyn Sink>], 1);

        assert!(!fanout.write(&Record::new(Level::Warn, "lost")));

        only.set_ready(false);
        assert!(!fanout.is_ready());
    }
}
