//! One bit per possible IPv4 address.
//!
//! [`PresenceSet`] is shared by every worker during a scan and updated with a
//! compare-and-swap loop per word. [`Bitmap`] is the single-threaded
//! equivalent used by the sequential counter.
//!
//! Both allocate all 2^32 bits (512 MiB) up front through a zeroing
//! allocation, so pages no address ever lands in are never touched by a write.

use std::{
    alloc::{self, Layout},
    ptr,
    sync::atomic::{AtomicU64, Ordering},
};

/// Number of distinct IPv4 addresses
pub const ADDRESS_SPACE: u64 = 1 << 32;

const WORD_SHIFT: u32 = u64::BITS.trailing_zeros();
const WORD_COUNT: usize = (ADDRESS_SPACE >> WORD_SHIFT) as usize;

/// Returns the word index and the bit mask within that word for `addr`
#[inline(always)]
fn locate(addr: u32) -> (usize, u64) {
    ((addr >> WORD_SHIFT) as usize, 1u64 << (addr & (u64::BITS - 1)))
}

/// Lock-free bit-per-address set. Bits are only ever set, never cleared.
pub struct PresenceSet {
    words: Box<[AtomicU64]>,
}

impl PresenceSet {
    /// Allocates an empty set covering the whole address space.
    pub fn new() -> Self {
        // SAFETY: an all-zero AtomicU64 is a valid AtomicU64 holding 0
        let words = unsafe { alloc_zeroed_words::<AtomicU64>(WORD_COUNT) };
        Self { words }
    }

    /// Marks `addr` as present. Returns true only for the call that flipped the
    /// bit, so exactly one caller wins per address across all threads.
    #[inline]
    pub fn test_and_set(&self, addr: u32) -> bool {
        let (idx, mask) = locate(addr);
        let word = &self.words[idx];
        // Per-word modification order is all that's needed here; joining the
        // workers publishes the final words to the aggregate pass.
        let mut current = word.load(Ordering::Relaxed);
        loop {
            if current & mask != 0 {
                return false;
            }
            match word.compare_exchange_weak(
                current,
                current | mask,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        let (idx, mask) = locate(addr);
        self.words[idx].load(Ordering::Relaxed) & mask != 0
    }

    /// Number of distinct addresses set. Taking `&mut self` guarantees no
    /// worker is still writing.
    pub fn count(&mut self) -> u64 {
        self.words
            .iter_mut()
            .map(|w| w.get_mut().count_ones() as u64)
            .sum()
    }
}

impl Default for PresenceSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-threaded bit-per-address set.
pub struct Bitmap {
    words: Box<[u64]>,
}

impl Bitmap {
    pub fn new() -> Self {
        Self {
            words: vec![0u64; WORD_COUNT].into_boxed_slice(),
        }
    }

    /// Returns true if `addr` was not present before.
    #[inline]
    pub fn insert(&mut self, addr: u32) -> bool {
        let (idx, mask) = locate(addr);
        let word = &mut self.words[idx];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        let (idx, mask) = locate(addr);
        self.words[idx] & mask != 0
    }

    pub fn count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates `len` zeroed words in one allocation.
///
/// # Safety
/// The all-zero bit pattern must be a valid `T`.
unsafe fn alloc_zeroed_words<T>(len: usize) -> Box<[T]> {
    let layout = match Layout::array::<T>(len) {
        Ok(layout) => layout,
        Err(_) => panic!("{len} words exceed the maximum allocation size"),
    };
    let raw = alloc::alloc_zeroed(layout) as *mut T;
    if raw.is_null() {
        alloc::handle_alloc_error(layout);
    }
    // the layout matches what Box<[T]> deallocates with
    Box::from_raw(ptr::slice_from_raw_parts_mut(raw, len))
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::{locate, Bitmap, PresenceSet, WORD_COUNT};

    #[test]
    fn word_geometry() {
        assert_eq!(WORD_COUNT, 1 << 26);
        assert_eq!(locate(0), (0, 1u64));
        assert_eq!(locate(63), (0, 1u64 << 63));
        assert_eq!(locate(64), (1, 1u64));
        assert_eq!(locate(u32::MAX), (WORD_COUNT - 1, 1u64 << 63));
    }

    #[test]
    fn first_observation_wins() {
        let mut set = PresenceSet::new();
        assert!(!set.contains(42));
        assert!(set.test_and_set(42));
        assert!(!set.test_and_set(42));
        assert!(set.contains(42));
        assert!(!set.contains(43));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn extremes_of_the_address_space() {
        let mut set = PresenceSet::new();
        assert!(set.test_and_set(0));
        assert!(set.test_and_set(u32::MAX));
        assert!(!set.test_and_set(0));
        assert!(!set.test_and_set(u32::MAX));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn bits_in_one_word_are_independent() {
        let mut set = PresenceSet::new();
        for addr in 128..192 {
            assert!(set.test_and_set(addr), "address {addr} should be new");
        }
        for addr in 128..192 {
            assert!(!set.test_and_set(addr), "address {addr} should be seen");
        }
        assert_eq!(set.count(), 64);
    }

    #[test]
    fn concurrent_writers_in_shared_words() {
        // every thread sets an interleaved slice of the same few words, then
        // all threads race over the full range; each address must have exactly
        // one winner and no update may be lost
        const THREADS: u32 = 8;
        const RANGE: u32 = 64 * 16;
        let mut set = PresenceSet::new();

        let wins: u64 = thread::scope(|s| {
            let handles = (0..THREADS)
                .map(|t| {
                    let set = &set;
                    s.spawn(move || {
                        let mut won = 0u64;
                        for addr in (t..RANGE).step_by(THREADS as usize) {
                            won += set.test_and_set(addr) as u64;
                        }
                        for addr in 0..RANGE {
                            won += set.test_and_set(addr) as u64;
                        }
                        won
                    })
                })
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(wins, RANGE as u64);
        assert_eq!(set.count(), RANGE as u64);
        assert!((0..RANGE).all(|addr| set.contains(addr)));
    }

    #[test]
    fn bitmap_matches_presence_set() {
        let mut bitmap = Bitmap::new();
        let mut set = PresenceSet::new();
        for addr in [0, 1, 1, 64, 65, 0xC0A8_0001, 0xC0A8_0001, u32::MAX] {
            assert_eq!(bitmap.insert(addr), set.test_and_set(addr), "address {addr}");
        }
        assert!(bitmap.contains(64));
        assert!(!bitmap.contains(2));
        assert_eq!(bitmap.count(), 6);
        assert_eq!(bitmap.count(), set.count());
    }
}
