//! Verbosity levels and the tracing spans sessions log under.
//!
//! The engine only emits `tracing` events; installing a subscriber is left to the application.

use tracing::{Level, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Info,
    /// Adds one event per executed node.
    Debug,
    Trace,
}

impl Verbosity {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Quiet,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    /// Effective verbosity of a run: the louder of the session and run settings.
    pub fn for_run(session_level: u8, run_level: u8) -> Self {
        Self::from_level(session_level.max(run_level))
    }

    pub fn level(self) -> Option<Level> {
        match self {
            Verbosity::Quiet => None,
            Verbosity::Info => Some(Level::INFO),
            Verbosity::Debug => Some(Level::DEBUG),
            Verbosity::Trace => Some(Level::TRACE),
        }
    }

    pub fn traces_nodes(self) -> bool {
        self >= Verbosity::Debug
    }
}

pub(crate) fn session_span(log_id: &str) -> Span {
    tracing::info_span!("session", log_id = %log_id)
}

pub(crate) fn run_span(log_id: &str, run_tag: &str) -> Span {
    tracing::info_span!("run", log_id = %log_id, run_tag = %run_tag)
}
