//! Test fixtures and mock subsystems for Bedrock development.
//!
//! Provides a recording log sink ([`RecordingLog`]), a recorder for
//! delivered errors ([`RecordingHandler`]), and an instrumented memory
//! subsystem ([`CountingSubsystem`]).

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod subsystem;

use std::cell::RefCell;
use std::rc::Rc;

use bedrock_core::{LogFn, LogLevel, LogRecord};

pub use subsystem::CountingSubsystem;

/// An owned copy of a [`LogRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedLog {
    pub level: LogLevel,
    pub message: String,
    pub file: String,
    pub line: u32,
}

/// Log sink that keeps every record it receives.
///
/// Clones share the same record list, so keep one clone for assertions and
/// hand [`sink`](RecordingLog::sink) to the code under test.
#[derive(Clone, Debug, Default)]
pub struct RecordingLog {
    records: Rc<RefCell<Vec<RecordedLog>>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> LogFn {
        let records = Rc::clone(&self.records);
        Rc::new(move |record: &LogRecord<'_>| {
            records.borrow_mut().push(RecordedLog {
                level: record.level,
                message: record.message.to_string(),
                file: record.file.to_string(),
                line: record.line,
            });
        })
    }

    pub fn records(&self) -> Vec<RecordedLog> {
        self.records.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.borrow().iter().map(|r| r.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

/// An owned copy of a delivered error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedError {
    pub text: String,
    pub file: &'static str,
    pub line: u32,
}

/// Collects errors delivered to an unhandled-error handler.
///
/// Wrap [`record`](RecordingHandler::record) in the handler closure:
///
/// ```ignore
/// let rec = RecordingHandler::new();
/// let sink = rec.clone();
/// ctx.set_unhandled_error_handler(Some(Rc::new(move |e| sink.record(e.text, e.file, e.line))));
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    errors: Rc<RefCell<Vec<RecordedError>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, text: &str, file: &'static str, line: u32) {
        self.errors.borrow_mut().push(RecordedError {
            text: text.to_string(),
            file,
            line,
        });
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        self.errors.borrow().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.errors.borrow().iter().map(|e| e.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }
}
