//! Allocator capability threaded through every container.
//!
//! Containers never touch the process allocator directly: every block they
//! own is obtained from, and returned to, the `RawAlloc` they were built
//! with. Requests are never zero-sized.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;
use thiserror::Error;

/// Failure to obtain memory for a container.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum AllocError {
    #[error("allocator refused a request for {size} bytes (align {align})")]
    Exhausted { size: usize, align: usize },
    #[error("requested capacity overflows the address space")]
    CapacityOverflow,
}

impl AllocError {
    pub(crate) fn exhausted(layout: Layout) -> Self {
        AllocError::Exhausted {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// A source of raw memory blocks.
///
/// # Safety
///
/// `allocate` must return a block valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, that stays valid
/// until it is passed back to `deallocate` on the same allocator (or a
/// clone of it).
pub unsafe trait RawAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same
    /// `layout`, and must not have been released already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<A: RawAlloc + ?Sized> RawAlloc for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// The process allocator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Global;

unsafe impl RawAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() != 0);
        // SAFETY: containers never request zero-sized layouts.
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw).ok_or_else(|| AllocError::exhausted(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Allocation half of an `FnAlloc` pair; `None` means out of memory.
pub type AllocFn = fn(Layout) -> Option<NonNull<u8>>;

/// Release half of an `FnAlloc` pair.
pub type DeallocFn = unsafe fn(NonNull<u8>, Layout);

/// An allocator made of two caller-supplied functions.
///
/// The functions must honor the `RawAlloc` contract; `FnAlloc::new` is
/// unsafe for that reason.
#[derive(Copy, Clone, Debug)]
pub struct FnAlloc {
    alloc: AllocFn,
    dealloc: DeallocFn,
}

impl FnAlloc {
    /// # Safety
    ///
    /// `alloc` must return blocks that satisfy the requested layout, and
    /// `dealloc` must accept exactly those blocks back.
    pub const unsafe fn new(alloc: AllocFn, dealloc: DeallocFn) -> Self {
        Self { alloc, dealloc }
    }
}

unsafe impl RawAlloc for FnAlloc {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (self.alloc)(layout).ok_or_else(|| AllocError::exhausted(layout))
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (self.dealloc)(ptr, layout) }
    }
}

/// Process allocator wrapper that keeps block accounting and can be told
/// to start refusing requests.
///
/// Single-threaded; share it by reference (`&CountingAlloc` is itself an
/// allocator).
#[derive(Debug, Default)]
pub struct CountingAlloc {
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    allocations: Cell<usize>,
    failures: Cell<usize>,
    // Remaining requests to grant; `None` is unlimited.
    budget: Cell<Option<usize>>,
}

impl CountingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `n` more requests, then refuse every further one.
    pub fn with_budget(n: usize) -> Self {
        let a = Self::default();
        a.set_budget(Some(n));
        a
    }

    pub fn set_budget(&self, budget: Option<usize>) {
        self.budget.set(budget);
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget.get()
    }

    /// Blocks handed out and not yet returned.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.get()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    /// Successful allocations over the allocator's lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Requests refused because the budget ran out.
    pub fn failures(&self) -> usize {
        self.failures.get()
    }
}

unsafe impl RawAlloc for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.budget.get() {
            Some(0) => {
                self.failures.set(self.failures.get() + 1);
                return Err(AllocError::exhausted(layout));
            }
            Some(n) => self.budget.set(Some(n - 1)),
            None => {}
        }
        let ptr = Global.allocate(layout)?;
        self.allocations.set(self.allocations.get() + 1);
        self.live_blocks.set(self.live_blocks.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + layout.size());
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let live = self.live_blocks.get();
        assert!(live > 0, "CountingAlloc: release of an unknown block");
        self.live_blocks.set(live - 1);
        self.live_bytes.set(self.live_bytes.get() - layout.size());
        unsafe { Global.deallocate(ptr, layout) }
    }
}
