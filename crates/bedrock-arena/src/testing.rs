//! Test-only memory-map inspection.

/// Permission string (`"rw-p"`, `"---p"`, ...) of the mapping containing
/// `addr`, or `None` if nothing is mapped there.
pub(crate) fn protection_at(addr: usize) -> Option<String> {
    let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
    maps.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let (lo, hi) = parts.next()?.split_once('-')?;
        let perms = parts.next()?;
        let lo = usize::from_str_radix(lo, 16).ok()?;
        let hi = usize::from_str_radix(hi, 16).ok()?;
        (lo..hi).contains(&addr).then(|| perms.to_string())
    })
}
