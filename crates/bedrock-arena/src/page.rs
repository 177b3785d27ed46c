//! Page granularity and address arithmetic.
//!
//! All alignment helpers require a power-of-two alignment. They operate on
//! plain integers; conversions between addresses and pointers happen only
//! at the OS boundary in `raw`.

use std::sync::OnceLock;

/// Page size assumed when the platform reports something unusable.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The platform page size, queried once per process.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        let reported = rustix::param::page_size();
        if reported.is_power_of_two() {
            reported
        } else {
            tracing::warn!(reported, "platform page size is not a power of two, using 4096");
            FALLBACK_PAGE_SIZE
        }
    })
}

/// Round `value` up to the next multiple of `align`.
///
/// Returns `None` on overflow.
#[inline]
pub fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Round `value` up to the next multiple of `align`.
///
/// # Panics
///
/// Panics if the result does not fit in `usize`.
#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    match checked_align_up(value, align) {
        Some(aligned) => aligned,
        None => panic!("align_up({value}, {align}) overflowed usize"),
    }
}

/// Round `value` down to the previous multiple of `align`.
#[inline]
pub fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
    value & !(align - 1)
}

/// Round `size` up to whole pages.
#[inline]
pub fn page_round(size: usize) -> usize {
    align_up(size, page_size())
}

/// Alignments accepted by arenas and guarded allocations: a power of two
/// no larger than one page.
#[inline]
pub fn is_valid_alignment(align: usize) -> bool {
    align.is_power_of_two() && align <= page_size()
}
