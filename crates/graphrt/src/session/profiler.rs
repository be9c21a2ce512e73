//! Per-session profiler emitting Chrome trace events.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// One complete (`ph = "X"`) trace event. Times are microseconds since session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub cat: String,
    pub ph: String,
    pub ts: u64,
    pub dur: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

/// Profile of a session in Chrome trace format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub trace_events: Vec<TraceEvent>,
    pub display_time_unit: String,
    pub session_log_id: String,
}

impl ProfileReport {
    pub fn node_events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.trace_events.iter().filter(|event| event.cat == "Node")
    }
}

pub(crate) struct Profiler {
    enabled: bool,
    origin: Instant,
    events: Mutex<Vec<TraceEvent>>,
}

impl Profiler {
    pub(crate) fn new(enabled: bool) -> Self {
        Profiler {
            enabled,
            origin: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    /// Start timestamp for an event, or `None` when profiling is off.
    pub(crate) fn start(&self) -> Option<Instant> {
        self.enabled.then(Instant::now)
    }

    pub(crate) fn record_session(&self, name: &str, started: Option<Instant>) {
        self.record(name, "Session", started, BTreeMap::new());
    }

    pub(crate) fn record_node(&self, node: &str, op_type: &str, provider: &str, started: Option<Instant>) {
        let args = BTreeMap::from([
            ("op_type".to_string(), op_type.to_string()),
            ("provider".to_string(), provider.to_string()),
        ]);
        self.record(node, "Node", started, args);
    }

    fn record(&self, name: &str, cat: &str, started: Option<Instant>, args: BTreeMap<String, String>) {
        let Some(started) = started else {
            return;
        };
        let event = TraceEvent {
            name: name.to_string(),
            cat: cat.to_string(),
            ph: "X".to_string(),
            ts: started.saturating_duration_since(self.origin).as_micros() as u64,
            dur: started.elapsed().as_micros() as u64,
            args,
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Drains the recorded events into a report.
    pub(crate) fn take_report(&self, session_log_id: &str) -> ProfileReport {
        let trace_events = std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner));
        ProfileReport {
            trace_events,
            display_time_unit: "ms".to_string(),
            session_log_id: session_log_id.to_string(),
        }
    }

    pub(crate) fn snapshot(&self, session_log_id: &str) -> ProfileReport {
        ProfileReport {
            trace_events: self.events.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            display_time_unit: "ms".to_string(),
            session_log_id: session_log_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn events_survive_a_poisoned_lock() {
        let profiler = Profiler::new(true);
        profiler.record_session("load", profiler.start());
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = profiler.events.lock().unwrap();
                    panic!("recorder died while holding the event list");
                })
                .join();
        });

        profiler.record_node("add", "Add", "CPUExecutionProvider", profiler.start());
        assert_eq!(profiler.snapshot("s").trace_events.len(), 2);
        let report = profiler.take_report("s");
        assert_eq!(report.trace_events[1].name, "add");
        assert!(profiler.snapshot("s").trace_events.is_empty());
    }
}
