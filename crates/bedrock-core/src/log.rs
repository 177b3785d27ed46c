//! Log levels, log records, and the pluggable log sink.
//!
//! Every thread context carries one active [`LogFn`]. Consumers log through
//! the context rather than through a global logger so that a thread can
//! temporarily redirect its output (e.g. into a test recorder) without
//! affecting other threads.

use std::fmt;
use std::rc::Rc;

/// Severity of a log record, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    /// Very chatty tracing output.
    Verbose,
    /// Developer diagnostics.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected that the program recovered from.
    Warning,
    /// An operation failed.
    Error,
    /// The program cannot continue.
    Fatal,
}

impl LogLevel {
    /// All levels in ascending severity.
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// Short uppercase name, as printed in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message handed to a log sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogRecord<'a> {
    /// The formatted message text.
    pub message: &'a str,
    /// Severity.
    pub level: LogLevel,
    /// Source file that produced the message.
    pub file: &'a str,
    /// Source line that produced the message.
    pub line: u32,
}

impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{}: {}",
            self.level, self.file, self.line, self.message
        )
    }
}

/// A log sink.
///
/// Reference-counted so that swapping sinks can hand the previous one back
/// to the caller. Sinks are thread-confined (`!Send`), like the thread
/// context that owns them.
pub type LogFn = Rc<dyn Fn(&LogRecord<'_>)>;

/// Forward one record to the `tracing` ecosystem.
///
/// `Verbose` maps to `TRACE`; `Fatal` has no `tracing` counterpart and is
/// emitted at `ERROR` with `fatal = true`.
pub fn forward_to_tracing(record: &LogRecord<'_>) {
    let LogRecord {
        message,
        level,
        file,
        line,
    } = *record;
    match level {
        LogLevel::Verbose => tracing::trace!(file, line, "{message}"),
        LogLevel::Debug => tracing::debug!(file, line, "{message}"),
        LogLevel::Info => tracing::info!(file, line, "{message}"),
        LogLevel::Warning => tracing::warn!(file, line, "{message}"),
        LogLevel::Error => tracing::error!(file, line, "{message}"),
        LogLevel::Fatal => tracing::error!(file, line, fatal = true, "{message}"),
    }
}

/// The default sink: every record goes to [`forward_to_tracing`].
pub fn tracing_sink() -> LogFn {
    Rc::new(forward_to_tracing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn levels_are_ordered_by_severity() {
        for pair in LogLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn record_display_includes_location() {
        let record = LogRecord {
            message: "disk full",
            level: LogLevel::Error,
            file: "src/io.rs",
            line: 42,
        };
        assert_eq!(record.to_string(), "[ERROR] src/io.rs:42: disk full");
    }

    #[test]
    fn custom_sink_receives_records() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let captured = Rc::clone(&seen);
        let sink: LogFn = Rc::new(move |r: &LogRecord<'_>| {
            captured.borrow_mut().push((r.level, r.message.to_string()));
        });
        sink(&LogRecord {
            message: "hello",
            level: LogLevel::Info,
            file: file!(),
            line: line!(),
        });
        assert_eq!(&*seen.borrow(), &[(LogLevel::Info, "hello".to_string())]);
    }

    #[test]
    fn tracing_sink_accepts_every_level() {
        // No subscriber installed: forwarding must still be a silent no-op.
        let sink = tracing_sink();
        for level in LogLevel::ALL {
            sink(&LogRecord {
                message: "probe",
                level,
                file: file!(),
                line: line!(),
            });
        }
    }
}
