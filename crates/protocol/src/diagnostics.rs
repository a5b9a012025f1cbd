//! Where human-readable status and error text ends up. Not part of core
//! correctness; the coordinator reports through whichever sink it was given.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub source: String,
    pub message: String,
}

pub trait DiagnosticsSink {
    fn report(&self, level: Level, source: &str, message: &str);

    fn status(&self, source: &str, message: &str) {
        self.report(Level::Status, source, message);
    }

    fn warning(&self, source: &str, message: &str) {
        self.report(Level::Warning, source, message);
    }

    fn error(&self, source: &str, message: &str) {
        self.report(Level::Error, source, message);
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, level: Level, source: &str, message: &str) {
        match level {
            Level::Status => tracing::info!(source, "{message}"),
            Level::Warning => tracing::warn!(source, "{message}"),
            Level::Error => tracing::error!(source, "{message}"),
        }
    }
}

/// Keeps every diagnostic in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries().iter().filter(|d| d.level == level).count()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|d| d.level == level && d.message.contains(needle))
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, level: Level, source: &str, message: &str) {
        let entry = Diagnostic {
            level,
            source: source.to_owned(),
            message: message.to_owned(),
        };
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for &T {
    fn report(&self, level: Level, source: &str, message: &str) {
        (**self).report(level, source, message);
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for std::sync::Arc<T> {
    fn report(&self, level: Level, source: &str, message: &str) {
        (**self).report(level, source, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.status("physics", "initialized");
        sink.warning("coordinator", "shared surface");
        sink.error("render", "link failed");

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].level, Level::Status);
        assert_eq!(entries[2].source, "render");
        assert_eq!(sink.count(Level::Warning), 1);
        assert!(sink.contains(Level::Error, "link"));
    }

    #[test]
    fn references_forward_to_the_sink() {
        let sink = MemorySink::new();
        let by_ref: &dyn DiagnosticsSink = &sink;
        (&by_ref).status("x", "y");
        assert_eq!(sink.count(Level::Status), 1);
    }
}
