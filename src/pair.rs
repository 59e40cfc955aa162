//! Pair records: one allocator block per stored key/value.
//!
//! Two record shapes share the table:
//! - `PairPtr<K, V>`: a typed `{hash, key, value}` block.
//! - `BytePair`: a run-time sized `{hash, key_len, val_len}` header followed
//!   by the key bytes and then the value bytes.
//!
//! Both are linear owners. A block must leave the table through `release`
//! or `PairBlock::free`, which hand it back to the allocator it came from;
//! dropping one any other way leaks the block and trips a debug assertion.

use crate::alloc::{AllocError, RawAlloc};
use core::alloc::Layout;
use core::ptr::{self, NonNull};
use core::slice;

/// A pair block owned by a table slot.
pub(crate) trait PairBlock: Sized {
    /// Hash computed once at insertion.
    fn hash(&self) -> u64;

    /// Drop the contents and return the block.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator (or a clone of it) the block came from.
    unsafe fn free<A: RawAlloc>(self, alloc: &A);
}

/// The stored record. `hash` is computed once on insertion and reused for
/// every relocation, so user hashing never runs during growth.
#[derive(Debug)]
pub(crate) struct Pair<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

pub(crate) struct PairPtr<K, V> {
    ptr: NonNull<Pair<K, V>>,
}

// SAFETY: PairPtr uniquely owns its pair, like Box.
unsafe impl<K: Send, V: Send> Send for PairPtr<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for PairPtr<K, V> {}

impl<K, V> PairPtr<K, V> {
    const LAYOUT: Layout = Layout::new::<Pair<K, V>>();

    /// Move `pair` into a fresh block from `alloc`. On failure `pair` is
    /// dropped and nothing is allocated.
    pub(crate) fn try_new_in<A: RawAlloc>(pair: Pair<K, V>, alloc: &A) -> Result<Self, AllocError> {
        let ptr = alloc.allocate(Self::LAYOUT)?.cast::<Pair<K, V>>();
        // SAFETY: fresh block sized and aligned for Pair<K, V>.
        unsafe { ptr.as_ptr().write(pair) };
        Ok(Self { ptr })
    }

    #[inline]
    pub(crate) fn get(&self) -> &Pair<K, V> {
        // SAFETY: the block is live and initialized for as long as self exists.
        unsafe { self.ptr.as_ref() }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut Pair<K, V> {
        // SAFETY: as in get; &mut self is exclusive.
        unsafe { self.ptr.as_mut() }
    }

    /// Move the record out and return its block to `alloc`.
    ///
    /// # Safety
    ///
    /// `alloc` must be the allocator (or a clone of it) that produced this
    /// pair in `try_new_in`.
    pub(crate) unsafe fn release<A: RawAlloc>(self, alloc: &A) -> Pair<K, V> {
        let ptr = self.ptr;
        core::mem::forget(self);
        // SAFETY: the block is initialized; it is read once and then freed
        // with the layout it was allocated with.
        unsafe {
            let pair = ptr.as_ptr().read();
            alloc.deallocate(ptr.cast(), Self::LAYOUT);
            pair
        }
    }
}

impl<K, V> PairBlock for PairPtr<K, V> {
    #[inline]
    fn hash(&self) -> u64 {
        self.get().hash
    }

    unsafe fn free<A: RawAlloc>(self, alloc: &A) {
        drop(unsafe { self.release(alloc) })
    }
}

impl<K, V> Drop for PairPtr<K, V> {
    fn drop(&mut self) {
        // Only `release` may end a pair's life; reaching here leaks the block.
        debug_assert!(
            std::thread::panicking(),
            "pair block dropped without being released to its allocator"
        );
    }
}

#[repr(C)]
struct ByteHeader {
    hash: u64,
    key_len: usize,
    val_len: usize,
}

/// Key and value bytes copied into one block behind a small header.
pub(crate) struct BytePair {
    ptr: NonNull<ByteHeader>,
}

// SAFETY: BytePair uniquely owns plain bytes.
unsafe impl Send for BytePair {}
unsafe impl Sync for BytePair {}

impl BytePair {
    fn layout(key_len: usize, val_len: usize) -> Result<Layout, AllocError> {
        let bytes = key_len
            .checked_add(val_len)
            .ok_or(AllocError::CapacityOverflow)?;
        let data = Layout::array::<u8>(bytes).map_err(|_| AllocError::CapacityOverflow)?;
        let (layout, offset) = Layout::new::<ByteHeader>()
            .extend(data)
            .map_err(|_| AllocError::CapacityOverflow)?;
        debug_assert_eq!(offset, core::mem::size_of::<ByteHeader>());
        Ok(layout.pad_to_align())
    }

    /// Copy `key` and `value` into a fresh block from `alloc`.
    pub(crate) fn try_new_in<A: RawAlloc>(
        hash: u64,
        key: &[u8],
        value: &[u8],
        alloc: &A,
    ) -> Result<Self, AllocError> {
        let layout = Self::layout(key.len(), value.len())?;
        let ptr = alloc.allocate(layout)?.cast::<ByteHeader>();
        // SAFETY: the block holds a header followed by key_len + val_len
        // bytes; the sources are caller slices and cannot overlap it.
        unsafe {
            ptr.as_ptr().write(ByteHeader {
                hash,
                key_len: key.len(),
                val_len: value.len(),
            });
            let data = ptr.as_ptr().add(1).cast::<u8>();
            ptr::copy_nonoverlapping(key.as_ptr(), data, key.len());
            ptr::copy_nonoverlapping(value.as_ptr(), data.add(key.len()), value.len());
        }
        Ok(Self { ptr })
    }

    #[inline]
    fn header(&self) -> &ByteHeader {
        // SAFETY: the header is written before the BytePair exists.
        unsafe { self.ptr.as_ref() }
    }

    #[inline]
    fn data(&self) -> *mut u8 {
        // SAFETY: the bytes start right after the header, inside the block.
        unsafe { self.ptr.as_ptr().add(1).cast::<u8>() }
    }

    pub(crate) fn key(&self) -> &[u8] {
        let h = self.header();
        // SAFETY: key_len initialized bytes at the start of the data.
        unsafe { slice::from_raw_parts(self.data(), h.key_len) }
    }

    pub(crate) fn value(&self) -> &[u8] {
        let h = self.header();
        // SAFETY: val_len initialized bytes right after the key.
        unsafe { slice::from_raw_parts(self.data().add(h.key_len), h.val_len) }
    }

    pub(crate) fn value_mut(&mut self) -> &mut [u8] {
        let (key_len, val_len) = (self.header().key_len, self.header().val_len);
        // SAFETY: as in value; &mut self is exclusive.
        unsafe { slice::from_raw_parts_mut(self.data().add(key_len), val_len) }
    }
}

impl PairBlock for BytePair {
    #[inline]
    fn hash(&self) -> u64 {
        self.header().hash
    }

    unsafe fn free<A: RawAlloc>(self, alloc: &A) {
        let h = self.header();
        let Ok(layout) = Self::layout(h.key_len, h.val_len) else {
            unreachable!("byte pair layout was valid at allocation");
        };
        let ptr = self.ptr;
        core::mem::forget(self);
        // SAFETY: allocated from `alloc` with this layout; the contents
        // are plain bytes.
        unsafe { alloc.deallocate(ptr.cast(), layout) }
    }
}

impl Drop for BytePair {
    fn drop(&mut self) {
        debug_assert!(
            std::thread::panicking(),
            "byte pair dropped without being freed to its allocator"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::CountingAlloc;

    /// A pair occupies exactly one block, and releasing it hands back the
    /// record intact.
    #[test]
    fn one_block_per_pair() {
        let a = CountingAlloc::new();
        let p = PairPtr::try_new_in(
            Pair {
                hash: 9,
                key: "k".to_string(),
                value: vec![1, 2, 3],
            },
            &a,
        )
        .unwrap();
        assert_eq!(a.live_blocks(), 1);
        assert_eq!(a.live_bytes(), core::mem::size_of::<Pair<String, Vec<i32>>>());
        assert_eq!(p.hash(), 9);

        let Pair { key, value, .. } = unsafe { p.release(&a) };
        assert_eq!(key, "k");
        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(a.live_blocks(), 0);
    }

    /// Allocation failure allocates nothing.
    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let a = CountingAlloc::with_budget(0);
        let r = PairPtr::try_new_in(
            Pair {
                hash: 0,
                key: 1u32,
                value: 2u32,
            },
            &a,
        );
        assert!(r.is_err());
        assert_eq!(a.live_blocks(), 0);
    }

    #[test]
    fn value_is_mutable_in_place() {
        let a = CountingAlloc::new();
        let mut p = PairPtr::try_new_in(
            Pair {
                hash: 1,
                key: 5u8,
                value: 10u8,
            },
            &a,
        )
        .unwrap();
        p.get_mut().value += 1;
        assert_eq!(p.get().value, 11);
        let _ = unsafe { p.release(&a) };
    }

    /// Key and value share one block sized for the header plus both
    /// widths.
    #[test]
    fn byte_pair_is_one_block() {
        let a = CountingAlloc::new();
        let mut p = BytePair::try_new_in(42, b"abc", b"hello", &a).unwrap();
        assert_eq!(a.live_blocks(), 1);
        assert_eq!(a.live_bytes(), BytePair::layout(3, 5).unwrap().size());
        assert!(a.live_bytes() >= core::mem::size_of::<ByteHeader>() + 8);
        assert_eq!(p.hash(), 42);
        assert_eq!(p.key(), b"abc");
        assert_eq!(p.value(), b"hello");

        p.value_mut().copy_from_slice(b"world");
        assert_eq!(p.key(), b"abc");
        assert_eq!(p.value(), b"world");
        unsafe { p.free(&a) };
        assert_eq!(a.live_blocks(), 0);
        assert_eq!(a.live_bytes(), 0);
    }

    #[test]
    fn byte_pair_refused_allocation() {
        let a = CountingAlloc::with_budget(0);
        assert!(BytePair::try_new_in(0, &[1], &[2], &a).is_err());
        assert_eq!(a.live_blocks(), 0);
        assert_eq!(
            BytePair::layout(usize::MAX, 1).unwrap_err(),
            AllocError::CapacityOverflow
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    fn dropping_without_release_panics() {
        let a = CountingAlloc::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let p = PairPtr::try_new_in(
                Pair {
                    hash: 0,
                    key: 0u8,
                    value: 0u8,
                },
                &a,
            )
            .unwrap();
            drop(p);
        }));
        assert!(res.is_err(), "expected panic when a pair is dropped unreleased");
    }
}
