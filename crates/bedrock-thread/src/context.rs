//! The per-thread context: scratch arenas, log function, error channel.
//!
//! Each OS thread owns at most one context, registered in thread-local
//! storage by [`ThreadContext::init`] and reached again through
//! [`ThreadContext::current`]. The handle is reference-counted and
//! `!Send`, so it can never leave its thread.
//!
//! # Error channel
//!
//! The channel holds at most one pending error. Pushing a new one first
//! delivers the old one to the unhandled-error handler:
//!
//! ```text
//! push_error(a)  → slot: a
//! push_error(b)  → handler(a), slot: b
//! pop_error(dst) → copy b into dst, slot: empty
//! flush_errors() → handler(pending), slot: empty
//! ```
//!
//! Error text lives in a small fixed arena owned by the context and is
//! truncated to fit it. Handlers must not push, pop, or flush errors on
//! the context that is calling them; doing so panics.

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use bedrock_arena::{
    os_memory_subsystem, ArenaError, ArenaMarker, ArenaSpan, MemoryArena, TempMemory,
};
use bedrock_core::log::forward_to_tracing;
use bedrock_core::{ArenaId, ContextId, LogFn, LogLevel, LogRecord};

use crate::config::ContextConfig;
use crate::error::ContextError;

thread_local! {
    static CONTEXT: RefCell<Option<Rc<ContextState>>> = const { RefCell::new(None) };
}

/// An error delivered to a handler or returned by
/// [`ThreadContext::pop_error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadError<'a> {
    /// Message text.
    pub text: &'a str,
    /// Source file that pushed the error.
    pub file: &'static str,
    /// Source line that pushed the error.
    pub line: u32,
}

impl fmt::Display for ThreadError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.text)
    }
}

/// Receives errors that were pushed but never popped.
pub type ErrorHandler = Rc<dyn Fn(&ThreadError<'_>)>;

/// The handler installed by [`ThreadContext::init`].
///
/// Logs `"{file}:{line}: {text}"` at [`LogLevel::Error`] through the
/// current thread's log function, or straight to `tracing` when the thread
/// has no context (during thread exit).
pub fn default_error_handler() -> ErrorHandler {
    Rc::new(|error: &ThreadError<'_>| {
        let message = error.to_string();
        match ThreadContext::current() {
            Some(ctx) => ctx.log(LogLevel::Error, &message, error.file, error.line),
            None => forward_to_tracing(&LogRecord {
                message: &message,
                level: LogLevel::Error,
                file: error.file,
                line: error.line,
            }),
        }
    })
}

#[derive(Clone, Copy, Debug)]
struct PendingError {
    span: ArenaSpan,
    file: &'static str,
    line: u32,
}

struct ErrorSlot {
    arena: MemoryArena,
    base: ArenaMarker,
    pending: Option<PendingError>,
}

impl ErrorSlot {
    fn text(&self, pending: &PendingError) -> &str {
        self.arena
            .span_bytes(pending.span)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    fn store(&mut self, text: &str, file: &'static str, line: u32) {
        self.arena.reset_to_marker(self.base);
        let text = truncate_to_boundary(text, self.arena.capacity());
        match self.arena.push_copy_span(text.as_bytes()) {
            Ok(span) => self.pending = Some(PendingError { span, file, line }),
            Err(err) => tracing::error!(%err, file, line, "error text could not be stored"),
        }
    }

    fn clear(&mut self) {
        self.pending = None;
        self.arena.reset_to_marker(self.base);
    }
}

/// Longest prefix of `text` no longer than `max` bytes that ends on a char
/// boundary.
fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

struct ContextState {
    id: ContextId,
    scratch_ids: [ArenaId; 2],
    scratch: [RefCell<MemoryArena>; 2],
    errors: RefCell<ErrorSlot>,
    log: RefCell<LogFn>,
    handler: RefCell<Option<ErrorHandler>>,
    torn_down: Cell<bool>,
}

impl Drop for ContextState {
    // Thread exit without `teardown`: deliver whatever is still pending.
    fn drop(&mut self) {
        if self.torn_down.get() {
            return;
        }
        let slot = self.errors.get_mut();
        let Some(pending) = slot.pending.take() else {
            return;
        };
        if let Some(handler) = self.handler.get_mut().take() {
            handler(&ThreadError {
                text: slot.text(&pending),
                file: pending.file,
                line: pending.line,
            });
        }
    }
}

/// Ends the scratch temp memory even if the closure unwinds.
struct ScratchScope<'a> {
    arena: RefMut<'a, MemoryArena>,
    temp: Option<TempMemory>,
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            self.arena.end_temp(temp);
        }
    }
}

/// Handle to the calling thread's context.
///
/// Cheap to clone. All clones refer to the same context and none can be
/// sent to another thread.
#[derive(Clone)]
pub struct ThreadContext {
    state: Rc<ContextState>,
}

impl ThreadContext {
    /// Register a context for the calling thread with default sizes.
    ///
    /// The two scratch arenas are moved into the context. Fails with
    /// [`ContextError::AlreadyInitialized`] if the thread already has one.
    pub fn init(
        scratch0: MemoryArena,
        scratch1: MemoryArena,
        log: LogFn,
    ) -> Result<Self, ContextError> {
        Self::init_with_config(scratch0, scratch1, log, &ContextConfig::default())
    }

    /// Like [`init`](Self::init), with an explicit configuration.
    pub fn init_with_config(
        scratch0: MemoryArena,
        scratch1: MemoryArena,
        log: LogFn,
        config: &ContextConfig,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        CONTEXT.with(|slot| {
            if slot.borrow().is_some() {
                return Err(ContextError::AlreadyInitialized);
            }
            let arena = MemoryArena::fixed(os_memory_subsystem(), config.error_arena_size)?;
            let base = arena.create_marker();
            let state = Rc::new(ContextState {
                id: ContextId::next(),
                scratch_ids: [scratch0.id(), scratch1.id()],
                scratch: [RefCell::new(scratch0), RefCell::new(scratch1)],
                errors: RefCell::new(ErrorSlot {
                    arena,
                    base,
                    pending: None,
                }),
                log: RefCell::new(log),
                handler: RefCell::new(Some(default_error_handler())),
                torn_down: Cell::new(false),
            });
            *slot.borrow_mut() = Some(Rc::clone(&state));
            tracing::debug!(context = %state.id, "thread context initialised");
            Ok(Self { state })
        })
    }

    /// Register a context whose scratch arenas are reserved from the OS
    /// memory subsystem, with default sizes.
    pub fn init_default(log: LogFn) -> Result<Self, ContextError> {
        Self::init_default_with_config(log, &ContextConfig::default())
    }

    /// Like [`init_default`](Self::init_default), with an explicit
    /// configuration.
    pub fn init_default_with_config(
        log: LogFn,
        config: &ContextConfig,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        if Self::current().is_some() {
            return Err(ContextError::AlreadyInitialized);
        }
        let scratch0 = MemoryArena::create(os_memory_subsystem(), config.scratch_reserve)?;
        let scratch1 = MemoryArena::create(os_memory_subsystem(), config.scratch_reserve)?;
        Self::init_with_config(scratch0, scratch1, log, config)
    }

    /// The calling thread's context, if it has one.
    pub fn current() -> Option<Self> {
        CONTEXT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
            .map(|state| Self { state })
    }

    /// Like [`current`](Self::current), failing with
    /// [`ContextError::NotInitialized`] when the thread has no context.
    pub fn require_current() -> Result<Self, ContextError> {
        Self::current().ok_or(ContextError::NotInitialized)
    }

    fn state(&self) -> &ContextState {
        assert!(
            !self.state.torn_down.get(),
            "thread context {} used after teardown",
            self.state.id
        );
        &self.state
    }

    /// Identity of this context.
    pub fn id(&self) -> ContextId {
        self.state.id
    }

    /// Ids of the two scratch arenas.
    pub fn scratch_ids(&self) -> [ArenaId; 2] {
        self.state().scratch_ids
    }

    // ── Scratch ────────────────────────────────────────────────────

    /// Run `f` with a scratch arena that is not `conflict`.
    ///
    /// Takes the first scratch arena unless `conflict` names it, in which
    /// case the second is used. Pass the id of the scratch arena a caller
    /// is already allocating its results in, and the callee's temporaries
    /// land in the other one. Everything pushed inside `f` is rewound when
    /// `f` returns.
    ///
    /// # Panics
    ///
    /// If the selected scratch arena is already lent out by an enclosing
    /// call.
    pub fn with_scratch<R>(
        &self,
        conflict: Option<ArenaId>,
        f: impl FnOnce(&mut MemoryArena) -> R,
    ) -> R {
        let state = self.state();
        let index = usize::from(conflict == Some(state.scratch_ids[0]));
        let Ok(mut arena) = state.scratch[index].try_borrow_mut() else {
            panic!(
                "scratch arena {} is already in use; pass its id as the conflict",
                state.scratch_ids[index]
            );
        };
        let temp = arena.begin_temp();
        let mut scope = ScratchScope {
            arena,
            temp: Some(temp),
        };
        f(&mut scope.arena)
    }

    // ── Logging ────────────────────────────────────────────────────

    /// Install a new log function, returning the previous one.
    pub fn set_log_function(&self, log: LogFn) -> LogFn {
        self.state().log.replace(log)
    }

    /// The current log function.
    pub fn log_function(&self) -> LogFn {
        Rc::clone(&self.state().log.borrow())
    }

    /// Send a message to the current log function.
    pub fn log(&self, level: LogLevel, message: &str, file: &str, line: u32) {
        let log = self.log_function();
        log(&LogRecord {
            message,
            level,
            file,
            line,
        });
    }

    /// Formatted variant of [`log`](Self::log); see
    /// [`context_log!`](crate::context_log).
    pub fn log_fmt(&self, level: LogLevel, args: fmt::Arguments<'_>, file: &str, line: u32) {
        match args.as_str() {
            Some(message) => self.log(level, message, file, line),
            None => self.log(level, &args.to_string(), file, line),
        }
    }

    // ── Error channel ──────────────────────────────────────────────

    fn slot_mut(&self) -> RefMut<'_, ErrorSlot> {
        match self.state().errors.try_borrow_mut() {
            Ok(slot) => slot,
            Err(_) => panic!("error channel used re-entrantly from an error handler"),
        }
    }

    /// Record an error, delivering any older pending error to the handler
    /// first.
    pub fn push_error(&self, text: &str, file: &'static str, line: u32) {
        self.flush_errors();
        self.slot_mut().store(text, file, line);
    }

    /// Formatted variant of [`push_error`](Self::push_error); see
    /// [`push_error!`](crate::push_error).
    pub fn push_error_fmt(&self, args: fmt::Arguments<'_>, file: &'static str, line: u32) {
        match args.as_str() {
            Some(text) => self.push_error(text, file, line),
            None => self.push_error(&args.to_string(), file, line),
        }
    }

    /// Whether an error is pending.
    pub fn has_error(&self) -> bool {
        self.state().errors.borrow().pending.is_some()
    }

    /// Take the pending error, copying its text (NUL-terminated) into
    /// `dest`.
    ///
    /// Returns `Ok(None)` when nothing is pending. If `dest` cannot hold
    /// the text, the arena error is returned and the error stays pending.
    pub fn pop_error<'a>(
        &self,
        dest: &'a mut MemoryArena,
    ) -> Result<Option<ThreadError<'a>>, ArenaError> {
        let mut slot = self.slot_mut();
        let Some(pending) = slot.pending else {
            return Ok(None);
        };
        let span = dest.push_str_span(slot.text(&pending))?;
        slot.clear();
        drop(slot);

        let dest: &'a MemoryArena = dest;
        let text = dest
            .span_bytes(span)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default();
        Ok(Some(ThreadError {
            text,
            file: pending.file,
            line: pending.line,
        }))
    }

    /// Deliver the pending error, if any, to the handler and empty the
    /// channel. With no handler installed the error is dropped.
    pub fn flush_errors(&self) {
        let state = self.state();
        let pending = self.slot_mut().pending.take();
        if let Some(pending) = pending {
            let handler = state.handler.borrow().clone();
            if let Some(handler) = handler {
                let slot = state.errors.borrow();
                handler(&ThreadError {
                    text: slot.text(&pending),
                    file: pending.file,
                    line: pending.line,
                });
            }
        }
        self.slot_mut().clear();
    }

    /// Replace the unhandled-error handler, returning the previous one.
    ///
    /// A pending error is flushed through the previous handler first.
    pub fn set_unhandled_error_handler(
        &self,
        handler: Option<ErrorHandler>,
    ) -> Option<ErrorHandler> {
        self.flush_errors();
        self.state().handler.replace(handler)
    }

    /// The current unhandled-error handler.
    pub fn unhandled_error_handler(&self) -> Option<ErrorHandler> {
        self.state().handler.borrow().clone()
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Flush pending errors, release every arena, and unregister the
    /// context from the thread.
    ///
    /// Other handles to the same context panic if used afterwards.
    pub fn teardown(self) {
        self.flush_errors();
        let state = &self.state;
        state.torn_down.set(true);
        for arena in &state.scratch {
            arena.borrow_mut().release();
        }
        state.errors.borrow_mut().arena.release();
        let _ = CONTEXT.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref().is_some_and(|s| Rc::ptr_eq(s, state)) {
                *slot = None;
            }
        });
        tracing::debug!(context = %state.id, "thread context torn down");
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.state.id)
            .field("scratch_ids", &self.state.scratch_ids)
            .field("torn_down", &self.state.torn_down.get())
            .finish_non_exhaustive()
    }
}
