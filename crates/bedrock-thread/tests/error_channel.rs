//! Cross-thread behaviour of thread contexts and their error channels.

use std::rc::Rc;
use std::sync::{Arc, Barrier};
use std::thread;

use bedrock_arena::{os_memory_subsystem, MemoryArena};
use bedrock_core::LogLevel;
use bedrock_test_utils::{RecordingHandler, RecordingLog};
use bedrock_thread::{push_error, ContextError, ThreadContext, ThreadError};

fn scratch() -> MemoryArena {
    MemoryArena::create(os_memory_subsystem(), 1 << 20).unwrap()
}

#[test]
fn threads_keep_independent_errors() {
    let barrier = Arc::new(Barrier::new(2));
    let spawn = |tag: &'static str| {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let ctx = ThreadContext::init(scratch(), scratch(), RecordingLog::new().sink()).unwrap();
            push_error!(ctx, "error from {tag}");
            // Both threads hold a pending error at the same time.
            barrier.wait();
            assert!(ctx.has_error());
            let mut dest = scratch();
            let text = ctx.pop_error(&mut dest).unwrap().unwrap().text.to_string();
            barrier.wait();
            ctx.teardown();
            text
        })
    };
    let a = spawn("a");
    let b = spawn("b");
    assert_eq!(a.join().unwrap(), "error from a");
    assert_eq!(b.join().unwrap(), "error from b");
}

#[test]
fn contexts_are_per_thread() {
    thread::spawn(|| {
        let ctx = ThreadContext::init_default(RecordingLog::new().sink()).unwrap();
        let id = ctx.id();
        let other = thread::spawn(|| ThreadContext::current().is_none())
            .join()
            .unwrap();
        assert!(other);
        assert_eq!(ThreadContext::current().map(|c| c.id()), Some(id));
        assert_eq!(
            ThreadContext::init_default(RecordingLog::new().sink()).unwrap_err(),
            ContextError::AlreadyInitialized
        );
    })
    .join()
    .unwrap();
}

#[test]
fn error_lifecycle_end_to_end() {
    thread::spawn(|| {
        let log = RecordingLog::new();
        let ctx = ThreadContext::init(scratch(), scratch(), log.sink()).unwrap();
        let rec = RecordingHandler::new();

        // Default handler: first error goes to the log when the second
        // arrives.
        ctx.push_error("first", "one.rs", 1);
        ctx.push_error("second", "two.rs", 2);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Error);
        assert_eq!(records[0].message, "one.rs:1: first");

        // Swapping handlers flushes "second" through the default one.
        let sink = rec.clone();
        ctx.set_unhandled_error_handler(Some(Rc::new(move |e: &ThreadError<'_>| {
            sink.record(e.text, e.file, e.line)
        })));
        assert_eq!(log.len(), 2);
        assert!(!ctx.has_error());

        // Scratch arena as the pop destination.
        ctx.push_error("third", "three.rs", 3);
        let popped = ctx.with_scratch(None, |dest| {
            let e = ctx.pop_error(dest).unwrap().unwrap();
            (e.text.to_string(), e.file, e.line)
        });
        assert_eq!(popped, ("third".to_string(), "three.rs", 3));

        ctx.push_error("fourth", "four.rs", 4);
        ctx.teardown();
        assert_eq!(rec.texts(), vec!["fourth".to_string()]);
        assert!(ThreadContext::current().is_none());
    })
    .join()
    .unwrap();
}
