//! Logger interface injected into every component.
//!
//! Components never reach for a process-wide logger of their own; they
//! hold an `Arc<dyn Logger>` handed to them at construction. The
//! production implementation, [`TracingLogger`], forwards to `tracing`,
//! so whatever subscriber the composition root installs receives the
//! records with a `component` field attached.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Observability collaborator. Must never panic and never block meaningfully.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, component: &str, message: &str);

    fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }

    fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    fn warn(&self, component: &str, message: &str) {
        self.log(LogLevel::Warn, component, message);
    }

    fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }
}

/// Forwards every record to the installed `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(component, "{message}"),
            LogLevel::Info => tracing::info!(component, "{message}"),
            LogLevel::Warn => tracing::warn!(component, "{message}"),
            LogLevel::Error => tracing::error!(component, "{message}"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _component: &str, _message: &str) {}
}
