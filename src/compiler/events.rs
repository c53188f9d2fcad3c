//! Change tracking for optimization passes.
//!
//! Passes record one [`Event`] per change they make. The log is append-only and shared
//! between the worker threads of the scheduler, so recording takes `&self`.
//!
//! ```rust
//! use dexflow::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::DeadCodeEliminated).message("const v1 2");
//! log.record(EventKind::CallSiteInlined);
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.count(EventKind::DeadCodeEliminated), 1);
//! ```

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::ir::MethodRef;

/// What kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    /// An instruction was removed because its result was never used.
    DeadCodeEliminated,
    /// Blocks the entry could no longer reach were removed.
    UnreachableCodeRemoved,
    /// A call site was replaced by the body of its callee.
    CallSiteInlined,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The kind of change.
    pub kind: EventKind,
    /// The method that changed, if known.
    pub method: Option<MethodRef>,
    /// Free-form detail.
    pub message: Option<String>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(method) = &self.method {
            write!(f, " in {method}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Builder returned by [`EventLog::record`]. The event is appended when the builder is
/// dropped, so a bare `log.record(kind);` statement records it.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Attributes the event to `method`.
    pub fn method(mut self, method: &MethodRef) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.method = Some(method.clone());
        }
        self
    }

    /// Attaches a message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = self.event.as_mut() {
            event.message = Some(message.into());
        }
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

/// Per-kind totals over an [`EventLog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Instructions removed as dead.
    pub dead_instructions: usize,
    /// Unreachable-block removals.
    pub unreachable_removals: usize,
    /// Call sites inlined.
    pub inlined_call_sites: usize,
}

impl DerivedStats {
    /// Sum over all kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        self.dead_instructions + self.unreachable_removals + self.inlined_call_sites
    }
}

/// Append-only, thread-safe event log.
#[derive(Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event of `kind`.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event {
                kind,
                method: None,
                message: None,
            }),
        }
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, event)| event)
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Totals per kind.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        let mut stats = DerivedStats::default();
        for event in self.iter() {
            match event.kind {
                EventKind::DeadCodeEliminated => stats.dead_instructions += 1,
                EventKind::UnreachableCodeRemoved => stats.unreachable_removals += 1,
                EventKind::CallSiteInlined => stats.inlined_call_sites += 1,
            }
        }
        stats
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::ir::RefPool;

    #[test]
    fn builder_records_on_drop() {
        let pool = RefPool::new();
        let method = pool.method_from_signature("LFoo;.bar:()V").unwrap();
        let log = EventLog::new();
        log.record(EventKind::CallSiteInlined)
            .method(&method)
            .message("LFoo;.baz:()V");

        let event = log.iter().next().unwrap();
        assert_eq!(event.method.as_ref(), Some(&method));
        assert_eq!(
            event.to_string(),
            "call-site-inlined in LFoo;.bar:()V: LFoo;.baz:()V"
        );
    }

    #[test]
    fn concurrent_recording() {
        let log = Arc::new(EventLog::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                let log = Arc::clone(&log);
                s.spawn(move || {
                    for _ in 0..100 {
                        log.record(EventKind::DeadCodeEliminated);
                    }
                });
            }
        });
        assert_eq!(log.len(), 400);
        assert_eq!(log.stats().dead_instructions, 400);
        assert_eq!(log.stats().total(), 400);
    }

    #[test]
    fn kind_names() {
        let names: Vec<String> = EventKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(names.len(), EventKind::COUNT);
        assert!(names.contains(&"unreachable-code-removed".to_string()));
    }
}
