use crate::util::constants::*;
use crate::util::Address;

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

pub fn page_align_down(address: Address) -> Address {
    address.align_down(BYTES_IN_PAGE)
}

pub fn bytes_to_pages_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_PAGE - 1) >> LOG_BYTES_IN_PAGE
}

/// Round a requested object size up to a legal object size.
pub const fn object_size_align_up(bytes: usize) -> usize {
    let aligned = raw_align_up(bytes, MIN_OBJECT_ALIGNMENT);
    if aligned < MIN_OBJECT_SIZE {
        MIN_OBJECT_SIZE
    } else {
        aligned
    }
}

/// The number of `unit`-sized pieces needed to hold `bytes`.
pub const fn units_up(bytes: usize, log_unit: u8) -> usize {
    (bytes + (1 << log_unit) - 1) >> log_unit
}

/// Parse a byte size such as `4096`, `64K`, `32M` or `1G`.
pub fn parse_byte_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last()? {
        'k' | 'K' => (&s[..s.len() - 1], LOG_BYTES_IN_KBYTE),
        'm' | 'M' => (&s[..s.len() - 1], LOG_BYTES_IN_MBYTE),
        'g' | 'G' => (&s[..s.len() - 1], LOG_BYTES_IN_GBYTE),
        _ => (s, 0),
    };
    let value: usize = digits.parse().ok()?;
    value.checked_mul(1usize << shift)
}
