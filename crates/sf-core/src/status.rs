//! Diagnostic status reporting for non-fatal runtime conditions.
//!
//! Components report dropped objects, clamped values and similar best-effort
//! recoveries through a [`StatusSink`] installed on the signal flow. Every
//! such event also bumps a counter so hosts can poll instead of subscribing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic event, naming the component that produced it.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub severity: Severity,
    pub component: String,
    pub text: String,
}

/// Callback receiving diagnostic events.
pub type StatusCallback = Box<dyn FnMut(&StatusMessage)>;

/// Counters for every best-effort recovery taken during processing.
///
/// No silent failures: each dropped or clamped value increments exactly one
/// of these.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticCounters {
    /// Messages discarded because a queue was full.
    pub dropped_messages: u64,
    /// Parameter values clamped into their admissible range.
    pub clamped_values: u64,
    /// Scene objects ignored (malformed, out of range, unroutable).
    pub invalid_objects: u64,
    /// Objects rejected because an allocator was at capacity.
    pub allocator_overflows: u64,
}

/// Shared diagnostic endpoint handed to every component of a flow.
///
/// Cloning is cheap; all clones feed the same sink and counters. The graph is
/// single-threaded inside the audio callback, so interior mutability via
/// `RefCell` is sufficient.
#[derive(Clone, Default)]
pub struct StatusSink {
    inner: Rc<RefCell<SinkInner>>,
}

#[derive(Default)]
struct SinkInner {
    callback: Option<StatusCallback>,
    counters: DiagnosticCounters,
    log_fallback: bool,
}

impl StatusSink {
    pub fn new() -> Self {
        let sink = Self::default();
        sink.inner.borrow_mut().log_fallback = true;
        sink
    }

    /// Install a callback; replaces any previous one.
    pub fn set_callback(&self, callback: StatusCallback) {
        let mut inner = self.inner.borrow_mut();
        inner.callback = Some(callback);
        inner.log_fallback = false;
    }

    /// Report a diagnostic event.
    pub fn report(&self, severity: Severity, component: &str, text: impl Into<String>) {
        let message = StatusMessage {
            severity,
            component: component.to_string(),
            text: text.into(),
        };
        let mut inner = self.inner.borrow_mut();
        if let Some(cb) = inner.callback.as_mut() {
            cb(&message);
        } else if inner.log_fallback {
            match severity {
                Severity::Info => log::info!("{}: {}", message.component, message.text),
                Severity::Warning => log::warn!("{}: {}", message.component, message.text),
                Severity::Error => log::error!("{}: {}", message.component, message.text),
            }
        }
    }

    pub fn count_dropped_message(&self) {
        self.inner.borrow_mut().counters.dropped_messages += 1;
    }

    pub fn count_clamped_value(&self) {
        self.inner.borrow_mut().counters.clamped_values += 1;
    }

    pub fn count_invalid_object(&self) {
        self.inner.borrow_mut().counters.invalid_objects += 1;
    }

    pub fn count_allocator_overflow(&self) {
        self.inner.borrow_mut().counters.allocator_overflows += 1;
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> DiagnosticCounters {
        self.inner.borrow().counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_receives_messages() {
        let sink = StatusSink::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let r = received.clone();
        sink.set_callback(Box::new(move |m| r.borrow_mut().push(m.clone())));

        sink.report(Severity::Warning, "DelayVector", "delay clamped");
        assert_eq!(received.borrow().len(), 1);
        assert_eq!(received.borrow()[0].component, "DelayVector");
    }

    #[test]
    fn counters_accumulate() {
        let sink = StatusSink::new();
        sink.count_dropped_message();
        sink.count_dropped_message();
        sink.count_invalid_object();
        let c = sink.counters();
        assert_eq!(c.dropped_messages, 2);
        assert_eq!(c.invalid_objects, 1);
        assert_eq!(c.clamped_values, 0);
    }
}
