//! Process-wide diagnostics sink.
//!
//! Everything the engine reports goes to `tracing`. A host can additionally
//! register one callback to receive the same messages; registering a new
//! one replaces the old.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Message severity, ordered from least to most severe. The discriminant is
/// the host log level, so `severity as i32` gives 0 (trace) to 4 (error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

type Sink = Arc<dyn Fn(Severity, &str) + Send + Sync>;

static SINK: RwLock<Option<Sink>> = parking_lot::const_rwlock(None);

/// Register the diagnostics callback, replacing any previous one.
pub fn set_sink<F>(sink: F)
where
    F: Fn(Severity, &str) + Send + Sync + 'static,
{
    *SINK.write() = Some(Arc::new(sink));
}

/// Remove the diagnostics callback.
pub fn clear_sink() {
    *SINK.write() = None;
}

pub fn has_sink() -> bool {
    SINK.read().is_some()
}

/// Log through `tracing` and forward to the registered sink, if any.
pub(crate) fn emit(severity: Severity, message: &str) {
    match severity {
        Severity::Trace => tracing::trace!("{}", message),
        Severity::Debug => tracing::debug!("{}", message),
        Severity::Info => tracing::info!("{}", message),
        Severity::Warn => tracing::warn!("{}", message),
        Severity::Error => tracing::error!("{}", message),
    }

    // The lock is released before calling out so a sink may log or re-register
    let sink = SINK.read().clone();
    if let Some(sink) = sink {
        sink(severity, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Serializes tests that touch the global sink.
    static SINK_TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_levels() {
        assert_eq!(Severity::Trace as i32, 0);
        assert_eq!(Severity::Error as i32, 4);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn test_emit_without_sink() {
        let _guard = SINK_TEST_LOCK.lock();
        clear_sink();
        assert!(!has_sink());
        emit(Severity::Info, "nobody listening");
    }

    #[test]
    fn test_sink_receives_and_is_replaced() {
        let _guard = SINK_TEST_LOCK.lock();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&first);
        set_sink(move |sev, msg| log.lock().push((sev, msg.to_string())));
        assert!(has_sink());
        emit(Severity::Warn, "one");

        let log = Arc::clone(&second);
        set_sink(move |sev, msg| log.lock().push((sev, msg.to_string())));
        emit(Severity::Error, "two");
        clear_sink();
        emit(Severity::Error, "three");

        // Other tests may emit concurrently, so look only for our messages
        let seen = |log: &Mutex<Vec<(Severity, String)>>, msg: &str| {
            log.lock().iter().any(|(_, m)| m == msg)
        };
        assert!(seen(&first, "one"));
        assert!(!seen(&first, "two"));
        assert!(seen(&second, "two"));
        assert!(!seen(&second, "three"));
        assert!(second
            .lock()
            .iter()
            .any(|(sev, m)| m == "two" && *sev == Severity::Error));
    }

    #[test]
    fn test_sink_may_reenter() {
        let _guard = SINK_TEST_LOCK.lock();
        set_sink(|_, _| clear_sink());
        emit(Severity::Debug, "clears itself");
        assert!(!has_sink());
    }
}
