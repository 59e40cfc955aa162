//! AllocVec: growable contiguous array backed by a `RawAlloc`.
//!
//! Serves as the pair table's slot storage. Every fallible growth path
//! leaves the array as it was when the allocator refuses.

use crate::alloc::{AllocError, Global, RawAlloc};
use core::alloc::Layout;
use core::borrow::{Borrow, BorrowMut};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

/// Capacity of the first block a growing array asks for.
pub const INITIAL_CAPACITY: usize = 16;

pub struct AllocVec<T, A: RawAlloc = Global> {
    ptr: NonNull<T>,
    cap: usize,
    len: usize,
    alloc: A,
    _owns: PhantomData<T>,
}

// SAFETY: AllocVec uniquely owns its elements, like Vec.
unsafe impl<T: Send, A: RawAlloc + Send> Send for AllocVec<T, A> {}
unsafe impl<T: Sync, A: RawAlloc + Sync> Sync for AllocVec<T, A> {}

impl<T> AllocVec<T> {
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<T> Default for AllocVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: RawAlloc> AllocVec<T, A> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Empty array; allocates nothing until the first element arrives.
    pub fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            len: 0,
            alloc,
            _owns: PhantomData,
        }
    }

    pub fn try_with_capacity_in(capacity: usize, alloc: A) -> Result<Self, AllocError> {
        let mut v = Self::new_in(alloc);
        v.grow_exact(capacity)?;
        Ok(v)
    }

    /// Array of `len` elements produced by `f(0), f(1), ...`, in a single
    /// allocation.
    pub fn try_from_fn_in<F>(len: usize, mut f: F, alloc: A) -> Result<Self, AllocError>
    where
        F: FnMut(usize) -> T,
    {
        let mut v = Self::try_with_capacity_in(len, alloc)?;
        for i in 0..len {
            // SAFETY: capacity >= len and slot i is past the initialized prefix.
            unsafe { v.ptr.as_ptr().add(i).write(f(i)) };
            v.len = i + 1;
        }
        Ok(v)
    }

    /// Exact-size copy of `src`.
    pub fn try_copy_from_slice_in(src: &[T], alloc: A) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        let mut v = Self::try_with_capacity_in(src.len(), alloc)?;
        v.try_extend_from_slice(src)?;
        Ok(v)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Size in bytes of one element.
    #[inline]
    pub fn elem_size(&self) -> usize {
        mem::size_of::<T>()
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid (or dangling with len 0) for len initialized elements.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in as_slice, and &mut self gives exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Make room for at least `additional` more elements.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        if required <= self.cap {
            return Ok(());
        }
        let doubled = self.cap.saturating_mul(2).max(INITIAL_CAPACITY);
        self.grow_exact(required.max(doubled))
    }

    /// Append one element, doubling the storage when full. On failure the
    /// array is unchanged and `value` is dropped.
    pub fn try_push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len == self.cap {
            self.try_reserve(1)?;
        }
        // SAFETY: len < cap after the reserve above.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn try_extend_from_slice(&mut self, src: &[T]) -> Result<(), AllocError>
    where
        T: Clone,
    {
        self.try_reserve(src.len())?;
        for item in src {
            // SAFETY: reserved above; len advances per element so a panicking
            // clone leaves only initialized elements counted.
            unsafe { self.ptr.as_ptr().add(self.len).write(item.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at the old last index is initialized and now
        // outside the counted prefix.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    /// Remove the element at `index`, moving the last element into its place.
    pub fn swap_remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        let last = self.len - 1;
        self.as_mut_slice().swap(index, last);
        self.pop()
    }

    pub fn truncate(&mut self, len: usize) {
        while self.len > len {
            drop(self.pop());
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn try_clone(&self) -> Result<Self, AllocError>
    where
        T: Clone,
        A: Clone,
    {
        Self::try_copy_from_slice_in(self.as_slice(), self.alloc.clone())
    }

    /// Release the elements and the storage block.
    pub fn free(self) {
        drop(self)
    }

    fn layout_for(cap: usize) -> Result<Layout, AllocError> {
        Layout::array::<T>(cap).map_err(|_| AllocError::CapacityOverflow)
    }

    // Move the contents into a block of exactly `new_cap` slots. Nothing
    // changes if the allocator refuses.
    fn grow_exact(&mut self, new_cap: usize) -> Result<(), AllocError> {
        if Self::IS_ZST || new_cap <= self.cap {
            return Ok(());
        }
        let new_layout = Self::layout_for(new_cap)?;
        let old_layout = Self::layout_for(self.cap)?;
        let new_ptr = self.alloc.allocate(new_layout)?.cast::<T>();
        if self.cap != 0 {
            // SAFETY: both blocks hold at least len elements and do not overlap;
            // the old block came from this allocator with old_layout.
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len);
                self.alloc.deallocate(self.ptr.cast(), old_layout);
            }
        }
        self.ptr = new_ptr;
        self.cap = new_cap;
        Ok(())
    }
}

impl<T, A: RawAlloc> Drop for AllocVec<T, A> {
    fn drop(&mut self) {
        // SAFETY: the counted prefix is initialized and dropped exactly once.
        unsafe { ptr::drop_in_place(self.as_mut_slice()) };
        if !Self::IS_ZST && self.cap != 0 {
            if let Ok(layout) = Self::layout_for(self.cap) {
                // SAFETY: the block came from this allocator with this layout.
                unsafe { self.alloc.deallocate(self.ptr.cast(), layout) };
            }
        }
    }
}

impl<T, A: RawAlloc> Deref for AllocVec<T, A> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: RawAlloc> DerefMut for AllocVec<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, A: RawAlloc> Borrow<[T]> for AllocVec<T, A> {
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: RawAlloc> BorrowMut<[T]> for AllocVec<T, A> {
    fn borrow_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug, A: RawAlloc> fmt::Debug for AllocVec<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, A: RawAlloc, B: RawAlloc> PartialEq<AllocVec<T, B>> for AllocVec<T, A> {
    fn eq(&self, other: &AllocVec<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: RawAlloc> Eq for AllocVec<T, A> {}

// Must agree with `[T]: Hash` so lookups through `Borrow<[T]>` find entries.
impl<T: Hash, A: RawAlloc> Hash for AllocVec<T, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}
