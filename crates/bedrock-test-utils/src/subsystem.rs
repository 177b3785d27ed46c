//! An instrumented memory subsystem.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bedrock_arena::{ArenaError, MemorySubsystem, VirtualMemory};
use rustix::io::Errno;

/// [`VirtualMemory`] that counts every call and can be told to refuse
/// reservations or commits.
#[derive(Debug, Default)]
pub struct CountingSubsystem {
    inner: VirtualMemory,
    reserves: AtomicUsize,
    commits: AtomicUsize,
    committed_bytes: AtomicUsize,
    decommits: AtomicUsize,
    releases: AtomicUsize,
    fail_reserves: AtomicBool,
    fail_commits: AtomicBool,
}

impl CountingSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserves(&self) -> usize {
        self.reserves.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn committed_bytes(&self) -> usize {
        self.committed_bytes.load(Ordering::SeqCst)
    }

    pub fn decommits(&self) -> usize {
        self.decommits.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn fail_reserves(&self, fail: bool) {
        self.fail_reserves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl MemorySubsystem for CountingSubsystem {
    fn reserve(&self, size: usize) -> Option<NonNull<u8>> {
        if self.fail_reserves.load(Ordering::SeqCst) {
            return None;
        }
        self.reserves.fetch_add(1, Ordering::SeqCst);
        self.inner.reserve(size)
    }

    unsafe fn commit(&self, addr: NonNull<u8>, size: usize) -> Result<(), ArenaError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(ArenaError::CommitFailed {
                size,
                source: Errno::NOMEM,
            });
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.committed_bytes.fetch_add(size, Ordering::SeqCst);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.inner.commit(addr, size) }
    }

    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize) {
        self.decommits.fetch_add(1, Ordering::SeqCst);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.inner.decommit(addr, size) }
    }

    unsafe fn release(&self, addr: NonNull<u8>, size: usize) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.inner.release(addr, size) }
    }

    fn allows_separate_commit(&self) -> bool {
        true
    }
}
