use super::allocator::{align_allocation, fill_alignment_gap};
use crate::object;
use crate::util::alloc::Allocator;
use crate::util::constants::*;
use crate::util::Address;

const NUM_BUCKETS: usize = usize::BITS as usize;

/// A segregated free-list allocator for tenured space.
///
/// Free chunks live in the heap and describe themselves (see `object::fill_gap`),
/// so a tenured region is always parseable. Bucket `i` holds chunks whose size is in
/// `[2^i, 2^(i+1))`. Allocation splits the first fitting chunk and puts the remainder back.
pub struct FreeListAllocator {
    buckets: Vec<Vec<Address>>,
    free_bytes: usize,
    max_allocation_size: usize,
}

fn bucket_of(size: usize) -> usize {
    debug_assert!(size > 0);
    (usize::BITS - 1 - size.leading_zeros()) as usize
}

impl FreeListAllocator {
    pub fn new(max_allocation_size: usize) -> Self {
        FreeListAllocator {
            buckets: (0..NUM_BUCKETS).map(|_| vec![]).collect(),
            free_bytes: 0,
            max_allocation_size,
        }
    }

    /// Bytes in listed chunks.
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// The size of the largest listed chunk.
    pub fn largest_chunk(&self) -> usize {
        self.buckets
            .iter()
            .rev()
            .find(|b| !b.is_empty())
            .and_then(|b| b.iter().filter_map(|&c| object::free_chunk_size(c)).max())
            .unwrap_or(0)
    }

    /// Forget every chunk. The memory is untouched; the sweeper rebuilds the lists.
    pub fn reset(&mut self) {
        for b in self.buckets.iter_mut() {
            b.clear();
        }
        self.free_bytes = 0;
    }

    /// Forget the chunks inside `[start, end)`, e.g. because the region is released or compacted.
    pub fn remove_range(&mut self, start: Address, end: Address) {
        let mut removed = 0;
        for b in self.buckets.iter_mut() {
            b.retain(|&c| {
                let inside = c >= start && c < end;
                if inside {
                    removed += object::free_chunk_size(c).unwrap_or(0);
                }
                !inside
            });
        }
        self.free_bytes -= removed;
    }

    /// Add `[start, end)` as free memory.
    pub fn add_chunk(&mut self, start: Address, end: Address) {
        if end > start {
            self.free(start, end - start);
        }
    }

    fn take_chunk(&mut self, need: usize) -> Option<(Address, usize)> {
        for b in bucket_of(need)..NUM_BUCKETS {
            let bucket = &mut self.buckets[b];
            let found = bucket.iter().rposition(|&c| {
                object::free_chunk_size(c).map_or(false, |size| size >= need)
            });
            if let Some(pos) = found {
                let chunk = bucket.swap_remove(pos);
                let size = object::free_chunk_size(chunk).unwrap_or(0);
                self.free_bytes -= size;
                return Some((chunk, size));
            }
        }
        None
    }
}

impl Allocator for FreeListAllocator {
    fn alloc(&mut self, size: usize, align: usize) -> Option<Address> {
        debug_assert!(size >= MIN_OBJECT_SIZE && size % BYTES_IN_WORD == 0);
        // Padding in front of an aligned object must be either 0 or at least a word.
        let need = size + (align - MIN_OBJECT_ALIGNMENT);
        let (chunk, chunk_size) = self.take_chunk(need)?;
        let chunk_end = chunk + chunk_size;
        let result = align_allocation(chunk, align);
        fill_alignment_gap(chunk, result);
        let end = result + size;
        // Zero first, then give the remainder back, so the remainder's header survives.
        object::zero_bytes(result, size);
        if chunk_end > end {
            self.free(end, chunk_end - end);
        }
        trace!("Free-list allocation {} bytes at {}", size, result);
        Some(result)
    }

    fn free(&mut self, addr: Address, size: usize) {
        object::fill_gap(addr, addr + size);
        if size >= MIN_OBJECT_SIZE {
            self.buckets[bucket_of(size)].push(addr);
            self.free_bytes += size;
        }
    }

    fn max_allocation_size(&self) -> usize {
        self.max_allocation_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(words: usize) -> (Vec<usize>, Address) {
        let mut mem = vec![0usize; words];
        let start = Address::from_mut_ptr(mem.as_mut_ptr());
        (mem, start)
    }

    #[test]
    fn split_and_reuse() {
        let (_mem, start) = arena(64);
        let mut a = FreeListAllocator::new(512);
        a.add_chunk(start, start + 512usize);
        assert_eq!(a.free_bytes(), 512);

        let x = a.alloc(64, 8).unwrap();
        assert_eq!(x, start);
        assert_eq!(a.free_bytes(), 448);
        let y = a.alloc(400, 8).unwrap();
        assert_eq!(y, start + 64usize);
        // 48 bytes left
        assert_eq!(a.free_bytes(), 48);
        assert_eq!(a.alloc(56, 8), None);

        a.free(x, 64);
        assert_eq!(a.alloc(64, 8), Some(x));
    }

    #[test]
    fn allocated_memory_is_zero() {
        let (mut mem, start) = arena(64);
        for w in mem.iter_mut() {
            *w = 0xdead;
        }
        let mut a = FreeListAllocator::new(512);
        a.add_chunk(start, start + 512usize);
        let x = a.alloc(128, 8).unwrap();
        for i in (0..128).step_by(8) {
            assert_eq!(unsafe { (x + i).load::<usize>() }, 0);
        }
    }

    #[test]
    fn eight_byte_remainder_becomes_filler() {
        let (_mem, start) = arena(8);
        let mut a = FreeListAllocator::new(64);
        a.add_chunk(start, start + 32usize);
        assert_eq!(a.alloc(24, 8), Some(start));
        assert_eq!(a.free_bytes(), 0);
        assert_eq!(a.alloc(16, 8), None);
    }

    #[test]
    fn remove_range_and_reset() {
        let (_mem, start) = arena(64);
        let mut a = FreeListAllocator::new(512);
        a.add_chunk(start, start + 256usize);
        a.add_chunk(start + 256usize, start + 512usize);
        assert_eq!(a.largest_chunk(), 256);
        a.remove_range(start, start + 256usize);
        assert_eq!(a.free_bytes(), 256);
        a.reset();
        assert_eq!(a.free_bytes(), 0);
        assert_eq!(a.alloc(16, 8), None);
    }

    #[test]
    fn bucket_index() {
        assert_eq!(bucket_of(16), 4);
        assert_eq!(bucket_of(31), 4);
        assert_eq!(bucket_of(32), 5);
    }
}
