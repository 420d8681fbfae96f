use crate::util::constants::BYTES_IN_PAGE;
use crate::util::conversions::raw_is_aligned;
use crate::util::Address;
use std::io::{Error, ErrorKind, Result};

/// Set `len` bytes starting at `start` to zero.
pub fn zero(start: Address, len: usize) {
    unsafe { std::ptr::write_bytes(start.to_mut_ptr::<u8>(), 0, len) }
}

/// Reserve `size` bytes of demand-zero virtual memory aligned to `align`.
/// The memory is not backed by swap until it is touched.
pub fn reserve_aligned(size: usize, align: usize) -> Result<Address> {
    if !align.is_power_of_two() || !raw_is_aligned(size, BYTES_IN_PAGE) {
        return Err(Error::new(ErrorKind::InvalidInput, "bad size or alignment"));
    }
    let align = align.max(BYTES_IN_PAGE);
    let total = size
        .checked_add(align)
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "reservation too large"))?;
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), total, prot, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(Error::last_os_error());
    }
    let raw = Address::from_mut_ptr(ptr);
    let start = raw.align_up(align);
    // Trim the unaligned head and the unused tail.
    let head = start - raw;
    if head > 0 {
        try_munmap(raw, head)?;
    }
    let tail = total - head - size;
    if tail > 0 {
        try_munmap(start + size, tail)?;
    }
    Ok(start)
}

/// Give a reservation back to the OS.
pub fn release(start: Address, size: usize) -> Result<()> {
    try_munmap(start, size)
}

/// Give the physical pages of a range back to the OS. The range reads as zero afterwards.
pub fn decommit(start: Address, size: usize) {
    debug_assert!(start.is_aligned_to(BYTES_IN_PAGE));
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            let ret = unsafe { libc::madvise(start.to_mut_ptr(), size, libc::MADV_DONTNEED) };
            if ret != 0 {
                warn!(
                    "madvise({}, {}) failed: {}. Zeroing instead.",
                    start,
                    size,
                    Error::last_os_error()
                );
                zero(start, size);
            }
        } else {
            zero(start, size);
        }
    }
}

fn try_munmap(start: Address, size: usize) -> Result<()> {
    let result = unsafe { libc::munmap(start.to_mut_ptr(), size) };
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}
