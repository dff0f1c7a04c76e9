//  Source of raw memory for the arena pages and segment arrays.

use std::{alloc::Layout, ptr::NonNull};

use crate::error::DictionaryError;

/// A provider of raw memory blocks.
///
/// The `Dictionary` never frees individual nodes: each block obtained from the provider is released exactly once,
/// with the very layout it was requested with, when the `Dictionary` is dropped.
///
/// #   Safety
///
/// Implementations must return blocks which are valid for reads and writes of `layout.size()` bytes, aligned to
/// `layout.align()`, and which remain valid until passed to `deallocate`.
pub unsafe trait MemoryProvider {
    /// Allocates a block of memory fitting `layout`.
    ///
    /// `layout.size()` is never 0.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DictionaryError>;

    /// Releases a block of memory.
    ///
    /// #   Safety
    ///
    /// -   `pointer` must have been obtained from `allocate` on this instance, and not released since.
    /// -   `layout` must be the layout `pointer` was allocated with.
    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout);
}

/// The process-wide allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

//  Safety:
//  -   Forwards to the global allocator, which upholds the same contract.
unsafe impl MemoryProvider for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DictionaryError> {
        debug_assert!(layout.size() > 0);

        //  Safety:
        //  -   `layout` has a non-zero size.
        let pointer = unsafe { std::alloc::alloc(layout) };

        NonNull::new(pointer).ok_or(DictionaryError::AllocationFailure)
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        //  Safety:
        //  -   `pointer` was allocated by the global allocator, with `layout`.
        unsafe { std::alloc::dealloc(pointer.as_ptr(), layout) }
    }
}

//  Safety:
//  -   Forwards to the referenced provider.
unsafe impl<P> MemoryProvider for &P
where
    P: MemoryProvider + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DictionaryError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        //  Safety:
        //  -   Forwarded as is.
        unsafe { (**self).deallocate(pointer, layout) }
    }
}

#[cfg(test)]
pub(crate) mod counting {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A provider counting allocations, and optionally failing after a given number of them.
    #[derive(Debug)]
    pub(crate) struct CountingProvider {
        allocations: AtomicUsize,
        deallocations: AtomicUsize,
        live_bytes: AtomicUsize,
        limit: usize,
    }

    impl CountingProvider {
        pub(crate) fn failing_after(limit: usize) -> Self {
            Self {
                allocations: AtomicUsize::new(0),
                deallocations: AtomicUsize::new(0),
                live_bytes: AtomicUsize::new(0),
                limit,
            }
        }

        pub(crate) fn allocations(&self) -> usize {
            self.allocations.load(Ordering::Relaxed)
        }

        pub(crate) fn deallocations(&self) -> usize {
            self.deallocations.load(Ordering::Relaxed)
        }

        pub(crate) fn live_bytes(&self) -> usize {
            self.live_bytes.load(Ordering::Relaxed)
        }
    }

    impl Default for CountingProvider {
        fn default() -> Self {
            Self::failing_after(usize::MAX)
        }
    }

    //  Safety:
    //  -   Forwards to `Global`.
    unsafe impl MemoryProvider for CountingProvider {
        fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, DictionaryError> {
            if self.allocations() >= self.limit {
                return Err(DictionaryError::AllocationFailure);
            }

            let pointer = Global.allocate(layout)?;

            self.allocations.fetch_add(1, Ordering::Relaxed);
            self.live_bytes.fetch_add(layout.size(), Ordering::Relaxed);

            Ok(pointer)
        }

        unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
            self.deallocations.fetch_add(1, Ordering::Relaxed);
            self.live_bytes.fetch_sub(layout.size(), Ordering::Relaxed);

            //  Safety:
            //  -   Allocated by `Global`, with `layout`.
            unsafe { Global.deallocate(pointer, layout) }
        }
    }
} // mod counting

// mod tests
