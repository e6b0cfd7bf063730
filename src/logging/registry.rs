use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use serde_json::Value;

use super::{level::accepts, Level, Record, Sink, SinkName};

#[derive(Default)]
struct State {
    sinks: HashMap<SinkName, Arc<dyn Sink>>,
    active: Option<Arc<dyn Sink>>,
    fallback: Option<Arc<dyn Sink>>,
}

/// Routes records to the active sink, gated by a global threshold.
///
/// The sink map, the active sink and the fallback live behind one `RwLock`: dispatch and
/// queries share it, `register`, `activate` and `set_fallback` take it exclusively. The threshold
/// is a plain atomic; a record racing a threshold change sees either the old or the new value.
pub struct Registry {
    state: RwLock<State>,
    threshold: AtomicU8,
}

impl Registry {
    /// Empty registry with threshold `NONE`, so nothing is delivered until a level is set.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            threshold: AtomicU8::new(Level::None.rank()),
        }
    }

    pub fn with_threshold(self, threshold: Level) -> Self {
        self.threshold.store(threshold.rank(), Ordering::Relaxed);
        self
    }

    /// Sink used whenever the active one reports it isn't ready.
    pub fn with_fallback(self, fallback: Arc<dyn Sink>) -> Self {
        self.write_state().fallback = Some(fallback);
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `sinks`, replacing any sink already registered under the same name.
    ///
    /// Replaced sinks are not shut down. When nothing is active yet, the first sink of the batch
    /// becomes active.
    pub fn register<I>(&self, sinks: I)
    where
        I: IntoIterator<Item = Arc<dyn Sink>>,
    {
        let mut state = self.write_state();
        let mut first: Option<SinkName> = None;

        for sink in sinks {
            let name = sink.name().clone();
            tracing::debug!(target: "logswitch", sink = %name, "registering sink");

            let replaces_active = state
                .active
                .as_ref()
                .is_some_and(|active| active.name() == &name);
            if replaces_active {
                state.active = Some(sink.clone());
            }

            first.get_or_insert_with(|| name.clone());
            state.sinks.insert(name, sink);
        }

        if state.active.is_none() {
            if let Some(first) = first {
                state.active = state.sinks.get(&first).cloned();
            }
        }
    }

    /// Accepts a [`Level`] or a level name; returns false and keeps the threshold on anything
    /// else.
    pub fn set_threshold<L>(&self, level: L) -> bool
    where
        L: TryInto<Level>,
    {
        match level.try_into() {
            Ok(level) => {
                self.threshold.store(level.rank(), Ordering::Relaxed);
                tracing::debug!(target: "logswitch", threshold = %level, "threshold changed");
                true
            }
            Err(_) => false,
        }
    }

    /// Stores `level` and returns the threshold it replaced.
    pub fn swap_threshold(&self, level: Level) -> Level {
        let old = self.threshold.swap(level.rank(), Ordering::Relaxed);
        tracing::debug!(target: "logswitch", threshold = %level, "threshold changed");
        Level::from_rank(old).unwrap_or(Level::None)
    }

    pub fn threshold(&self) -> Level {
        Level::from_rank(self.threshold.load(Ordering::Relaxed)).unwrap_or(Level::None)
    }

    pub fn activate(&self, name: &str) -> bool {
        let mut state = self.write_state();

        match state.sinks.get(name).cloned() {
            Some(sink) => {
                tracing::debug!(target: "logswitch", sink = %name, "activating sink");
                state.active = Some(sink);
                true
            }
            None => false,
        }
    }

    pub fn active_sink_name(&self) -> Option<SinkName> {
        self.read_state()
            .active
            .as_ref()
            .map(|sink| sink.name().clone())
    }

    pub fn active_sink(&self) -> Option<Arc<dyn Sink>> {
        self.read_state().active.clone()
    }

    pub fn set_fallback(&self, fallback: Option<Arc<dyn Sink>>) {
        self.write_state().fallback = fallback;
    }

    pub fn fallback_name(&self) -> Option<SinkName> {
        self.read_state()
            .fallback
            .as_ref()
            .map(|sink| sink.name().clone())
    }

    pub fn sink(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.read_state().sinks.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn sink_names(&self) -> Vec<SinkName> {
        let mut names: Vec<SinkName> = self.read_state().sinks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read_state().sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().sinks.is_empty()
    }

    /// Dispatches `message` using the active sink's own call depth.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<Value>) -> bool {
        self.dispatch(level, None, message)
    }

    #[track_caller]
    pub fn log_with_call_depth(
        &self,
        level: Level,
        call_depth: usize,
        message: impl Into<Value>,
    ) -> bool {
        self.dispatch(level, Some(call_depth), message)
    }

    #[track_caller]
    fn dispatch(&self, level: Level, call_depth: Option<usize>, message: impl Into<Value>) -> bool {
        // Handles are cloned so the lock is released before any sink I/O.
        let (active, fallback) = {
            let state = self.read_state();
            (state.active.clone(), state.fallback.clone())
        };

        let Some(active) = active else {
            return false;
        };

        if !accepts(self.threshold(), level) {
            return false;
        }

        let target = if active.is_ready() {
            active
        } else {
            match fallback {
                Some(fallback) => {
                    tracing::trace!(
                        target: "logswitch",
                        sink = %active.name(),
                        fallback = %fallback.name(),
                        "active sink not ready, using fallback"
                    );
                    fallback
                }
                None => return false,
            }
        };

        let record = Record::new(level, message);
        match call_depth {
            Some(call_depth) => target.write_with_call_depth(&record, call_depth),
            None => target.write(&record),
        }
    }

    /// Shuts down every registered sink and the fallback. Sinks stay registered.
    pub fn shutdown_all(&self) {
        let state = self.read_state();

        for (name, sink) in &state.sinks {
            tracing::debug!(target: "logswitch", sink = %name, "shutting down sink");
            sink.shutdown();
        }

        if let Some(fallback) = &state.fallback {
            if !state.sinks.contains_key(fallback.name()) {
                fallback.shutdown();
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
