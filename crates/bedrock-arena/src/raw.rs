//! Low-level primitives for address-space operations.
//!
//! Every raw OS call in this crate goes through this module. Each `unsafe`
//! block carries a `// SAFETY:` comment; callers above this layer deal in
//! `NonNull<u8>` and sizes, never in `c_void` or file descriptors.

#![allow(unsafe_code)]

use std::ffi::{c_void, CStr};
use std::ptr::{self, NonNull};

use rustix::fd::{AsFd, OwnedFd};
use rustix::io::Errno;
use rustix::mm::{Advice, MapFlags, MprotectFlags, ProtFlags};

fn non_null(addr: *mut c_void) -> Result<NonNull<u8>, Errno> {
    NonNull::new(addr.cast::<u8>()).ok_or(Errno::NOMEM)
}

/// Reserve `size` bytes of inaccessible address space.
pub(crate) fn reserve(size: usize) -> Result<NonNull<u8>, Errno> {
    // SAFETY: a null hint without MAP_FIXED lets the kernel choose a fresh
    // range, so no existing mapping can be replaced.
    let addr = unsafe {
        rustix::mm::mmap_anonymous(
            ptr::null_mut(),
            size,
            ProtFlags::empty(),
            MapFlags::PRIVATE | MapFlags::NORESERVE,
        )?
    };
    non_null(addr)
}

/// Map `size` bytes of zeroed, read/write memory.
pub(crate) fn map_read_write(size: usize) -> Result<NonNull<u8>, Errno> {
    // SAFETY: as in `reserve`, the kernel picks a fresh range.
    let addr = unsafe {
        rustix::mm::mmap_anonymous(
            ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::PRIVATE,
        )?
    };
    non_null(addr)
}

/// Make a reserved range readable and writable.
///
/// # Safety
///
/// `[addr, addr + size)` must lie inside a live mapping owned by the caller.
pub(crate) unsafe fn protect_read_write(addr: NonNull<u8>, size: usize) -> Result<(), Errno> {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        rustix::mm::mprotect(
            addr.as_ptr().cast(),
            size,
            MprotectFlags::READ | MprotectFlags::WRITE,
        )
    }
}

/// Make a range inaccessible. Any later access faults.
///
/// # Safety
///
/// `[addr, addr + size)` must lie inside a live mapping owned by the caller,
/// and no live reference may point into it.
pub(crate) unsafe fn protect_none(addr: NonNull<u8>, size: usize) -> Result<(), Errno> {
    // SAFETY: forwarded from the caller's contract.
    unsafe { rustix::mm::mprotect(addr.as_ptr().cast(), size, MprotectFlags::empty()) }
}

/// Drop the physical pages behind a range; the range stays mapped.
///
/// # Safety
///
/// Same as [`protect_none`]. Contents are lost.
pub(crate) unsafe fn discard(addr: NonNull<u8>, size: usize) -> Result<(), Errno> {
    // SAFETY: forwarded from the caller's contract.
    unsafe { rustix::mm::madvise(addr.as_ptr().cast(), size, Advice::LinuxDontNeed) }
}

/// Unmap a range.
///
/// # Safety
///
/// `[addr, addr + size)` must have been mapped by this module and must not
/// be referenced after the call.
pub(crate) unsafe fn unmap(addr: NonNull<u8>, size: usize) -> Result<(), Errno> {
    // SAFETY: forwarded from the caller's contract.
    unsafe { rustix::mm::munmap(addr.as_ptr().cast(), size) }
}

/// Create an anonymous memory file of exactly `size` bytes.
pub(crate) fn create_memfd(name: &CStr, size: usize) -> Result<OwnedFd, Errno> {
    let fd = rustix::fs::memfd_create(name, rustix::fs::MemfdFlags::CLOEXEC)?;
    rustix::fs::ftruncate(&fd, size as u64)?;
    Ok(fd)
}

/// Map the first `size` bytes of `fd` read/write at exactly `addr`,
/// replacing whatever was mapped there.
///
/// # Safety
///
/// `[addr, addr + size)` must be a range reserved by the caller that holds
/// no live references.
pub(crate) unsafe fn map_shared_fixed(
    addr: NonNull<u8>,
    size: usize,
    fd: impl AsFd,
) -> Result<(), Errno> {
    // SAFETY: MAP_FIXED only replaces the caller's own reservation, per the
    // caller's contract.
    let mapped = unsafe {
        rustix::mm::mmap(
            addr.as_ptr().cast(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED | MapFlags::FIXED,
            fd,
            0,
        )?
    };
    debug_assert_eq!(mapped.cast::<u8>(), addr.as_ptr());
    Ok(())
}
