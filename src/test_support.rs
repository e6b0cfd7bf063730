use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::logging::{Record, Sink, SinkName};

/// In-memory sink with switchable readiness and write result.
pub(crate) struct MemorySink {
    name: SinkName,
    ready: AtomicBool,
    result: AtomicBool,
    call_depth: AtomicUsize,
    shutdowns: AtomicUsize,
    records: Mutex<Vec<(Record, usize)>>,
}

impl MemorySink {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: SinkName::from(name),
            ready: AtomicBool::new(true),
            result: AtomicBool::new(true),
            call_depth: AtomicUsize::new(2),
            shutdowns: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub(crate) fn set_result(&self, result: bool) {
        self.result.store(result, Ordering::SeqCst);
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(record, _)| record.message_text())
            .collect()
    }

    pub(crate) fn depths(&self) -> Vec<usize> {
        self.records.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool {
        self.records
            .lock()
            .unwrap()
            .push((record.clone(), call_depth));
        self.result.load(Ordering::SeqCst)
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::SeqCst);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
